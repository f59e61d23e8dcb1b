//! データセットの型定義
//!
//! - Record: 1枚の画像とそのアノテーション
//! - Annotation: ラベル + バウンディングボックス（+ スコア）
//! - AnnotationRow: 集計ビュー（"data"）の1行。アノテーション1件につき1行

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// バウンディングボックス（ピクセル座標、min/max形式）
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BBox {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

impl BBox {
    pub fn from_xyxy(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Self {
        Self { xmin, ymin, xmax, ymax }
    }

    pub fn width(&self) -> f64 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> f64 {
        self.ymax - self.ymin
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }
}

/// RLE形式のマスク
///
/// 保持はするが、集計・復元では扱わない（パーサはUnsupportedCapabilityを返す）
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Mask {
    pub counts: Vec<u32>,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Annotation {
    /// クラスID
    pub label: usize,
    pub bbox: BBox,
    /// 推論結果の場合のみ
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub mask: Option<Mask>,
}

impl Annotation {
    pub fn new(label: usize, bbox: BBox) -> Self {
        Self {
            label,
            bbox,
            score: None,
            mask: None,
        }
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }
}

/// アノテーション付き画像1枚
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub filepath: String,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

impl Record {
    pub fn new(id: impl Into<String>, filepath: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            id: id.into(),
            filepath: filepath.into(),
            width,
            height,
            annotations: Vec::new(),
        }
    }

    pub fn with_annotation(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    /// 画像面積（正規化用）
    pub fn image_area(&self) -> f64 {
        self.width as f64 * self.height as f64
    }
}

/// 集計テーブルの1行（アノテーション単位）
///
/// 再計算でまとめて作り直されるもので、個別に書き換えることはない。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationRow {
    /// レコードID
    pub id: String,
    pub filepath: String,
    pub width: u32,
    pub height: u32,
    /// 表示用クラス名
    pub label: String,
    /// 生のクラスID
    pub label_num: usize,
    #[serde(default)]
    pub score: Option<f64>,
    // 反転・非有限の座標もそのまま保存できるよう、幾何量はすべて float_repr
    #[serde(with = "crate::float_repr")]
    pub bbox_xmin: f64,
    #[serde(with = "crate::float_repr")]
    pub bbox_ymin: f64,
    #[serde(with = "crate::float_repr")]
    pub bbox_xmax: f64,
    #[serde(with = "crate::float_repr")]
    pub bbox_ymax: f64,
    #[serde(with = "crate::float_repr")]
    pub bbox_width: f64,
    #[serde(with = "crate::float_repr")]
    pub bbox_height: f64,
    #[serde(with = "crate::float_repr")]
    pub area: f64,
    #[serde(with = "crate::float_repr")]
    pub area_normalized: f64,
    #[serde(with = "crate::float_repr")]
    pub area_square_root: f64,
    #[serde(with = "crate::float_repr")]
    pub area_square_root_normalized: f64,
    #[serde(with = "crate::float_repr")]
    pub bbox_ratio: f64,
    /// 入力列内でのレコード位置
    pub record_index: usize,
    /// このレコードのアノテーション総数
    pub num_annotations: usize,
    #[serde(default)]
    pub creation_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub modification_date: Option<DateTime<Utc>>,
}

impl AnnotationRow {
    pub fn bbox(&self) -> BBox {
        BBox::from_xyxy(self.bbox_xmin, self.bbox_ymin, self.bbox_xmax, self.bbox_ymax)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox_geometry() {
        let bbox = BBox::from_xyxy(10.0, 10.0, 60.0, 30.0);
        assert_eq!(bbox.width(), 50.0);
        assert_eq!(bbox.height(), 20.0);
        assert_eq!(bbox.area(), 1000.0);
    }

    #[test]
    fn test_record_builder() {
        let record = Record::new("img1", "/data/img1.jpg", 200, 100)
            .with_annotation(Annotation::new(0, BBox::from_xyxy(0.0, 0.0, 1.0, 1.0)))
            .with_annotation(Annotation::new(1, BBox::default()).with_score(0.9));

        assert_eq!(record.annotations.len(), 2);
        assert_eq!(record.annotations[1].score, Some(0.9));
        assert_eq!(record.image_area(), 20000.0);
    }

    #[test]
    fn test_record_deserialize_missing_annotations() {
        let json = r#"{"id": "a", "filepath": "a.jpg", "width": 10, "height": 20}"#;
        let record: Record = serde_json::from_str(json).expect("デシリアライズ失敗");
        assert!(record.annotations.is_empty());
    }
}
