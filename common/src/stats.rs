//! 行テーブルからの集計ビュー
//!
//! すべて行テーブルだけを入力とする純粋関数。
//! 丸め（小数2桁）は表示用の `rounded()` でのみ行い、保持する値は丸めない。

use crate::types::AnnotationRow;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;

/// 小数2桁に丸める（表示用）
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// データセット全体の概要（1行）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub no_imgs: usize,
    pub no_classes: usize,
    /// ソート済み・重複なし
    pub classes: Vec<String>,
    pub area_min: Option<f64>,
    pub area_max: Option<f64>,
    pub num_annotations_min: Option<usize>,
    pub num_annotations_max: Option<usize>,
    pub name: Option<String>,
    pub description: Option<String>,
}

pub fn dataset_summary(
    rows: &[AnnotationRow],
    name: Option<&str>,
    description: Option<&str>,
) -> DatasetSummary {
    let classes: BTreeSet<&str> = rows.iter().map(|r| r.label.as_str()).collect();

    DatasetSummary {
        no_imgs: distinct_images(rows),
        no_classes: classes.len(),
        classes: classes.into_iter().map(String::from).collect(),
        area_min: rows.iter().map(|r| r.area).reduce(f64::min),
        area_max: rows.iter().map(|r| r.area).reduce(f64::max),
        num_annotations_min: rows.iter().map(|r| r.num_annotations).min(),
        num_annotations_max: rows.iter().map(|r| r.num_annotations).max(),
        name: name.map(String::from),
        description: description.map(String::from),
    }
}

impl fmt::Display for DatasetSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn opt<T: fmt::Display>(value: &Option<T>) -> String {
            value.as_ref().map(|v| v.to_string()).unwrap_or_else(|| "-".into())
        }

        write!(
            f,
            "no_imgs: {} | no_classes: {} | classes: [{}] | area_min: {} | area_max: {} | \
             num_annotations_min: {} | num_annotations_max: {} | name: {} | description: {}",
            self.no_imgs,
            self.no_classes,
            self.classes.join(", "),
            opt(&self.area_min),
            opt(&self.area_max),
            opt(&self.num_annotations_min),
            opt(&self.num_annotations_max),
            opt(&self.name),
            opt(&self.description),
        )
    }
}

/// 画像単位の統計（1行）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSummary {
    pub num_images: usize,
    pub min_objects: Option<usize>,
    pub max_objects: Option<usize>,
    /// 画像1枚あたりの平均アノテーション数
    pub mean_objects: Option<f64>,
}

impl ImageSummary {
    pub fn rounded(&self) -> Self {
        Self {
            mean_objects: self.mean_objects.map(round2),
            ..self.clone()
        }
    }
}

/// 平均は画像ごとに1サンプル
///
/// 行単位の `num_annotations` の平均とは異なる（そちらはアノテーションの多い画像ほど
/// 重くなる）。ここでは画像1枚あたりの平均を返す。
pub fn image_summary(rows: &[AnnotationRow]) -> ImageSummary {
    let mut per_image: HashMap<&str, usize> = HashMap::new();
    for row in rows {
        per_image.entry(row.filepath.as_str()).or_insert(row.num_annotations);
    }

    let counts: Vec<usize> = per_image.into_values().collect();
    let mean = if counts.is_empty() {
        None
    } else {
        Some(counts.iter().sum::<usize>() as f64 / counts.len() as f64)
    };

    ImageSummary {
        num_images: counts.len(),
        min_objects: counts.iter().copied().min(),
        max_objects: counts.iter().copied().max(),
        mean_objects: mean,
    }
}

/// クラス単位の統計（クラスごとに1行）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassSummary {
    pub class: String,
    /// このクラスを含む画像数
    pub imgs: usize,
    pub objects: usize,
    pub avg_objects_per_img: f64,
    /// 全オブジェクトに占める割合
    pub frac_of_labels: f64,
}

impl ClassSummary {
    pub fn rounded(&self) -> Self {
        Self {
            avg_objects_per_img: round2(self.avg_objects_per_img),
            frac_of_labels: round2(self.frac_of_labels),
            ..self.clone()
        }
    }
}

/// クラス名順
pub fn class_summary(rows: &[AnnotationRow]) -> Vec<ClassSummary> {
    let mut groups: BTreeMap<&str, (HashSet<&str>, usize)> = BTreeMap::new();
    for row in rows {
        let (images, objects) = groups.entry(row.label.as_str()).or_default();
        images.insert(row.filepath.as_str());
        *objects += 1;
    }

    let total = rows.len() as f64;
    groups
        .into_iter()
        .map(|(class, (images, objects))| ClassSummary {
            class: class.to_string(),
            imgs: images.len(),
            objects,
            avg_objects_per_img: objects as f64 / images.len() as f64,
            frac_of_labels: objects as f64 / total,
        })
        .collect()
}

/// ギャラリー表示用の列
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GalleryRow {
    pub id: String,
    #[serde(with = "crate::float_repr")]
    pub area: f64,
    pub num_annotations: usize,
    pub label: String,
    #[serde(with = "crate::float_repr")]
    pub bbox_ratio: f64,
    #[serde(with = "crate::float_repr")]
    pub bbox_width: f64,
    #[serde(with = "crate::float_repr")]
    pub bbox_height: f64,
    pub width: u32,
    pub height: u32,
}

impl GalleryRow {
    fn from_row(row: &AnnotationRow) -> Self {
        Self {
            id: row.id.clone(),
            area: row.area,
            num_annotations: row.num_annotations,
            label: row.label.clone(),
            bbox_ratio: row.bbox_ratio,
            bbox_width: row.bbox_width,
            bbox_height: row.bbox_height,
            width: row.width,
            height: row.height,
        }
    }

    /// 重複判定用（f64はビット列で比較）
    fn dedup_key(&self) -> (String, [u64; 4], usize, String, u32, u32) {
        (
            self.id.clone(),
            [
                self.area.to_bits(),
                self.bbox_ratio.to_bits(),
                self.bbox_width.to_bits(),
                self.bbox_height.to_bits(),
            ],
            self.num_annotations,
            self.label.clone(),
            self.width,
            self.height,
        )
    }
}

/// 列を絞って重複を除いたもの。最初の出現順を保ち、添字は0からの連番になる
pub fn gallery(rows: &[AnnotationRow]) -> Vec<GalleryRow> {
    let mut seen = HashSet::new();
    rows.iter()
        .map(GalleryRow::from_row)
        .filter(|row| seen.insert(row.dedup_key()))
        .collect()
}

fn distinct_images(rows: &[AnnotationRow]) -> usize {
    rows.iter()
        .map(|r| r.filepath.as_str())
        .collect::<HashSet<_>>()
        .len()
}
