//! 推論結果テーブル（予測 + 正解 + 損失）
//!
//! 予測ボックスと正解ボックスは同じ推論空間にあるため、どちらも同じ
//! `CoordinateCorrector` で元画像の座標へ戻してから行にする。

use crate::aggregator::{FileMetadataProvider, RowContext};
use crate::class_map::ClassMap;
use crate::coords::{CoordinateCorrector, ImageSize, Preprocessing};
use crate::error::{Error, Result};
use crate::parser::RecordTableParser;
use crate::types::{Annotation, AnnotationRow, Record};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// 学習時の損失
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Losses {
    pub loss_classifier: f64,
    pub loss_box_reg: f64,
    pub loss_objectness: f64,
    pub loss_rpn_box_reg: f64,
    pub loss_total: f64,
}

/// 1画像分の予測（スコア付きアノテーション）
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Prediction {
    pub annotations: Vec<Annotation>,
}

/// 推論に使ったサンプルと損失
///
/// `scaled` はパディング前のリサイズ後サイズ（パディング後・元画像のサイズではない）。
#[derive(Debug, Clone, PartialEq)]
pub struct SampleWithLoss {
    pub image_id: String,
    pub filepath: String,
    pub scaled: ImageSize,
    pub annotations: Vec<Annotation>,
    pub losses: Losses,
}

/// 結果テーブルの1行
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    pub row: AnnotationRow,
    pub filename: String,
    pub is_prediction: bool,
    pub losses: Losses,
}

/// 元画像サイズの取得元
pub trait ImageSizeProvider {
    fn image_size(&self, path: &Path) -> Result<ImageSize>;
}

/// パスごとに固定のサイズを返す（テスト用）
#[derive(Debug, Clone, Default)]
pub struct FixedImageSizes(pub HashMap<String, ImageSize>);

impl ImageSizeProvider for FixedImageSizes {
    fn image_size(&self, path: &Path) -> Result<ImageSize> {
        let key = path.to_string_lossy();
        self.0.get(key.as_ref()).copied().ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no image size for {}", key),
            ))
        })
    }
}

/// 予測とサンプルの組から結果テーブルを作る
///
/// クラスマップがなければラベル名はクラスIDの文字列になる。
pub fn build_result_rows(
    predictions: &[Prediction],
    samples: &[SampleWithLoss],
    preprocessing: Preprocessing,
    class_map: Option<&ClassMap>,
    image_sizes: &dyn ImageSizeProvider,
    metadata: &dyn FileMetadataProvider,
) -> Result<Vec<ResultRow>> {
    if predictions.len() != samples.len() {
        return Err(Error::Config(format!(
            "{} predictions for {} samples",
            predictions.len(),
            samples.len()
        )));
    }

    let label_name = |label: usize| match class_map {
        Some(map) => map.get_by_id(label),
        None => label.to_string(),
    };

    let mut rows = Vec::new();
    for (index, (prediction, sample)) in predictions.iter().zip(samples).enumerate() {
        let path = Path::new(&sample.filepath);
        let original = image_sizes.image_size(path)?;
        let corrector = CoordinateCorrector::new(original, sample.scaled, preprocessing)?;
        let timestamps = metadata.timestamps(path)?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let sides = [
            (true, &prediction.annotations),
            (false, &sample.annotations),
        ];
        for (is_prediction, annotations) in sides {
            let context = RowContext {
                id: &sample.image_id,
                filepath: &sample.filepath,
                width: original.width,
                height: original.height,
                record_index: index,
                num_annotations: annotations.len(),
                timestamps,
            };
            for annotation in annotations.iter() {
                let bbox = corrector.correct(&annotation.bbox);
                let score = if is_prediction { annotation.score } else { None };
                rows.push(ResultRow {
                    row: context.row(label_name(annotation.label), annotation.label, &bbox, score),
                    filename: filename.clone(),
                    is_prediction,
                    losses: sample.losses,
                });
            }
        }
    }

    Ok(rows)
}

/// 結果テーブル内の (label, label_num) からクラスマップを作る
pub fn class_map_from_results(rows: &[ResultRow]) -> Result<ClassMap> {
    let plain: Vec<AnnotationRow> = rows.iter().map(|r| r.row.clone()).collect();
    crate::parser::infer_class_map(&plain)
}

/// 描画用に1画像分を (正解, 予測) のレコードに分ける
///
/// 予測が1件もない画像は、正解レコードからアノテーションを除いたものを予測側とする。
/// 画像IDが見つからなければ `None`。
pub fn image_pair(rows: &[ResultRow], image_id: &str) -> Result<Option<(Record, Record)>> {
    let side = |prediction: bool| -> Vec<AnnotationRow> {
        rows.iter()
            .filter(|r| r.row.id == image_id && r.is_prediction == prediction)
            .map(|r| r.row.clone())
            .collect()
    };

    let parser = RecordTableParser::default();
    let ground_truth = parser.parse(&side(false))?.into_iter().next();
    let predicted = parser.parse(&side(true))?.into_iter().next();

    Ok(match (ground_truth, predicted) {
        (Some(gt), Some(pred)) => Some((gt, pred)),
        (Some(gt), None) => {
            let empty = Record {
                annotations: Vec::new(),
                ..gt.clone()
            };
            Some((gt, empty))
        }
        (None, Some(pred)) => {
            let empty = Record {
                annotations: Vec::new(),
                ..pred.clone()
            };
            Some((empty, pred))
        }
        (None, None) => None,
    })
}

/// 結果テーブルの概要
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultsSummary {
    pub num_images: usize,
    pub num_predictions: usize,
    pub num_ground_truth: usize,
    /// 画像ごとの total loss の平均
    pub mean_loss_total: Option<f64>,
}

pub fn results_summary(rows: &[ResultRow]) -> ResultsSummary {
    let mut loss_per_image: HashMap<&str, f64> = HashMap::new();
    for r in rows {
        loss_per_image.entry(r.row.id.as_str()).or_insert(r.losses.loss_total);
    }
    let num_predictions = rows.iter().filter(|r| r.is_prediction).count();
    let mean_loss_total = if loss_per_image.is_empty() {
        None
    } else {
        Some(loss_per_image.values().sum::<f64>() / loss_per_image.len() as f64)
    };

    ResultsSummary {
        num_images: loss_per_image.len(),
        num_predictions,
        num_ground_truth: rows.len() - num_predictions,
        mean_loss_total,
    }
}

/// 適合率・再現率テーブルの1行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRow {
    pub label: String,
    pub iou_threshold: f64,
    pub precision: f64,
    pub recall: f64,
}

/// 指標計算（外部実装を差し込む）
pub trait MetricEngine {
    fn compute(&self, rows: &[ResultRow], iou_thresholds: &[f64]) -> Result<Vec<MetricRow>>;
}

/// 0.50, 0.55, ..., 0.95
pub fn default_iou_thresholds() -> Vec<f64> {
    (0..10).map(|i| (50 + i * 5) as f64 / 100.0).collect()
}
