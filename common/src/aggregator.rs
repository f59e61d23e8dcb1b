//! レコード → アノテーション単位の行テーブル（"data" ビュー）
//!
//! 行順は (レコード順, レコード内のアノテーション順) のまま。並べ替えはしない。
//! ファイルのタイムスタンプだけは `FileMetadataProvider` から取得するため、
//! 同じプロバイダを渡せば結果は毎回同じになる。

use crate::class_map::ClassMap;
use crate::error::{Error, Result};
use crate::types::{AnnotationRow, BBox, Record};
use chrono::{DateTime, Utc};
use std::path::Path;

/// ファイルの作成・更新日時
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileTimestamps {
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
}

/// ファイルメタデータの取得元
pub trait FileMetadataProvider {
    fn timestamps(&self, path: &Path) -> Result<FileTimestamps>;
}

/// 常に同じ値を返すプロバイダ（テスト・オフライン集計用）
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedMetadataProvider(pub FileTimestamps);

impl FileMetadataProvider for FixedMetadataProvider {
    fn timestamps(&self, _path: &Path) -> Result<FileTimestamps> {
        Ok(self.0)
    }
}

/// 幅 / 高さ。高さ0のときは例外にせず ±inf を返す
pub fn bbox_ratio(width: f64, height: f64) -> f64 {
    if height == 0.0 {
        if width < 0.0 {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        }
    } else {
        width / height
    }
}

/// 1アノテーション分の幾何量
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxGeometry {
    pub width: f64,
    pub height: f64,
    pub area: f64,
    pub area_normalized: f64,
    pub bbox_ratio: f64,
}

impl BoxGeometry {
    pub fn new(bbox: &BBox, image_width: u32, image_height: u32) -> Self {
        let width = bbox.width();
        let height = bbox.height();
        let area = width * height;
        Self {
            width,
            height,
            area,
            area_normalized: area / (image_width as f64 * image_height as f64),
            bbox_ratio: bbox_ratio(width, height),
        }
    }
}

/// 行を組み立てるための共通部分（結果テーブルでも使う）
pub(crate) struct RowContext<'a> {
    pub id: &'a str,
    pub filepath: &'a str,
    pub width: u32,
    pub height: u32,
    pub record_index: usize,
    pub num_annotations: usize,
    pub timestamps: FileTimestamps,
}

impl RowContext<'_> {
    pub(crate) fn row(&self, label: String, label_num: usize, bbox: &BBox, score: Option<f64>) -> AnnotationRow {
        let geometry = BoxGeometry::new(bbox, self.width, self.height);
        AnnotationRow {
            id: self.id.to_string(),
            filepath: self.filepath.to_string(),
            width: self.width,
            height: self.height,
            label,
            label_num,
            score,
            bbox_xmin: bbox.xmin,
            bbox_ymin: bbox.ymin,
            bbox_xmax: bbox.xmax,
            bbox_ymax: bbox.ymax,
            bbox_width: geometry.width,
            bbox_height: geometry.height,
            area: geometry.area,
            area_normalized: geometry.area_normalized,
            area_square_root: geometry.area.sqrt(),
            area_square_root_normalized: geometry.area_normalized.sqrt(),
            bbox_ratio: geometry.bbox_ratio,
            record_index: self.record_index,
            num_annotations: self.num_annotations,
            creation_date: self.timestamps.created,
            modification_date: self.timestamps.modified,
        }
    }
}

/// レコード列を行テーブルに展開
///
/// クラスマップ未設定なら `NotConfigured`。途中でメタデータ取得に失敗した場合は
/// 部分的なテーブルを返さず、そのエラーで全体を中断する。
pub fn aggregate(
    records: &[Record],
    class_map: Option<&ClassMap>,
    metadata: &dyn FileMetadataProvider,
) -> Result<Vec<AnnotationRow>> {
    let class_map = class_map
        .ok_or_else(|| Error::NotConfigured("class map is required to aggregate records".into()))?;

    let capacity = records.iter().map(|r| r.annotations.len()).sum();
    let mut rows = Vec::with_capacity(capacity);

    for (index, record) in records.iter().enumerate() {
        if record.annotations.is_empty() {
            continue;
        }

        let context = RowContext {
            id: &record.id,
            filepath: &record.filepath,
            width: record.width,
            height: record.height,
            record_index: index,
            num_annotations: record.annotations.len(),
            timestamps: metadata.timestamps(Path::new(&record.filepath))?,
        };

        for annotation in &record.annotations {
            rows.push(context.row(
                class_map.get_by_id(annotation.label),
                annotation.label,
                &annotation.bbox,
                annotation.score,
            ));
        }
    }

    Ok(rows)
}
