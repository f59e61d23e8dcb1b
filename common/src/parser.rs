//! 行テーブル → レコードへの復元（集計の逆変換）
//!
//! 行をレコードIDでまとめ（最初に現れた順）、幅・高さ・パスは先頭行から、
//! アノテーションは各行から組み立てる。

use crate::class_map::ClassMap;
use crate::error::{Error, Result};
use crate::types::{Annotation, AnnotationRow, Record};
use std::collections::HashMap;

/// アノテーションの復元方法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnnotationDecoder {
    #[default]
    BoundingBox,
    /// 行テーブルにマスクは保存されないため未対応
    Mask,
}

impl AnnotationDecoder {
    fn decode(&self, row: &AnnotationRow) -> Result<Annotation> {
        match self {
            AnnotationDecoder::BoundingBox => Ok(Annotation {
                label: row.label_num,
                bbox: row.bbox(),
                score: row.score,
                mask: None,
            }),
            AnnotationDecoder::Mask => Err(Error::UnsupportedCapability(
                "mask annotations cannot be rebuilt from a row table".into(),
            )),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecordTableParser {
    decoder: AnnotationDecoder,
}

impl RecordTableParser {
    pub fn new(decoder: AnnotationDecoder) -> Self {
        Self { decoder }
    }

    pub fn parse(&self, rows: &[AnnotationRow]) -> Result<Vec<Record>> {
        let mut records: Vec<Record> = Vec::new();
        let mut index_by_id: HashMap<&str, usize> = HashMap::new();

        for row in rows {
            let annotation = self.decoder.decode(row)?;
            let index = *index_by_id.entry(row.id.as_str()).or_insert_with(|| {
                records.push(Record::new(&row.id, &row.filepath, row.width, row.height));
                records.len() - 1
            });
            records[index].annotations.push(annotation);
        }

        Ok(records)
    }
}

/// 行テーブルからクラスマップを推定（label_num → label）
///
/// 欠番は `unknown_<id>` で埋める。
pub fn infer_class_map(rows: &[AnnotationRow]) -> Result<ClassMap> {
    let mut pairs: HashMap<usize, String> = HashMap::new();
    for row in rows {
        pairs.entry(row.label_num).or_insert_with(|| row.label.clone());
    }
    ClassMap::from_pairs(pairs)
}

/// レコードに現れるクラスIDだけからクラスマップを作る（名前はすべてプレースホルダ）
pub fn placeholder_class_map(records: &[Record]) -> Result<ClassMap> {
    let max = records
        .iter()
        .flat_map(|r| r.annotations.iter().map(|a| a.label))
        .max();
    let len = max.map(|m| m + 1).unwrap_or(0);
    ClassMap::new((0..len).map(crate::class_map::placeholder_label))
}
