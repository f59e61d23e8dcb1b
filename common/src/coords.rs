//! 推論空間 → 元画像ピクセル空間への座標補正
//!
//! 推論時の画像は長辺を目標サイズに合わせてリサイズし、短辺側を対称にパディングして
//! 正方形にしている。予測ボックス（と同じ空間にある正解ボックス）をこの逆変換で
//! 元画像の座標に戻す。
//!
//! ```text
//! factor  = max(W, H) / max(sw, sh)
//! padding = max(sw, sh) - min(sw, sh)
//! x' = factor * (x - x_shift)   // x_shift = padding/2 （パディングあり かつ sw < sh）
//! y' = factor * (y - y_shift)   // y_shift = padding/2 （パディングあり かつ sw > sh）
//! ```

use crate::error::{Error, Result};
use crate::types::BBox;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 画像サイズ（ピクセル）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    fn longest(&self) -> f64 {
        self.width.max(self.height) as f64
    }

    fn shortest(&self) -> f64 {
        self.width.min(self.height) as f64
    }
}

/// 推論前の前処理。長辺リサイズ（+対称パディング）以外は扱わない
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preprocessing {
    /// 長辺リサイズ + 短辺の対称パディング
    #[default]
    ResizeAndPad,
    /// 長辺リサイズのみ
    Resize,
}

impl Preprocessing {
    pub fn from_padding_flag(padded_along_shortest: bool) -> Self {
        if padded_along_shortest {
            Preprocessing::ResizeAndPad
        } else {
            Preprocessing::Resize
        }
    }

    pub fn is_padded(&self) -> bool {
        matches!(self, Preprocessing::ResizeAndPad)
    }
}

impl FromStr for Preprocessing {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "resize_and_pad" | "letterbox" => Ok(Preprocessing::ResizeAndPad),
            "resize" => Ok(Preprocessing::Resize),
            other => Err(Error::UnsupportedPreprocessing(format!(
                "{}: only resize_and_pad or resize can be corrected",
                other
            ))),
        }
    }
}

impl fmt::Display for Preprocessing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Preprocessing::ResizeAndPad => write!(f, "resize_and_pad"),
            Preprocessing::Resize => write!(f, "resize"),
        }
    }
}

/// 1画像分の補正パラメータ
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateCorrector {
    factor: f64,
    x_shift: f64,
    y_shift: f64,
}

impl CoordinateCorrector {
    /// `original` は元画像、`scaled` はパディング前のリサイズ後サイズ
    ///
    /// 縦横比が一致しない（長辺リサイズでは説明できない）組み合わせは
    /// 誤った補正をせず `UnsupportedPreprocessing` で失敗する。
    pub fn new(original: ImageSize, scaled: ImageSize, preprocessing: Preprocessing) -> Result<Self> {
        if original.width == 0 || original.height == 0 || scaled.width == 0 || scaled.height == 0 {
            return Err(Error::UnsupportedPreprocessing(format!(
                "zero-sized image (original {}x{}, scaled {}x{})",
                original.width, original.height, scaled.width, scaled.height
            )));
        }

        let factor = original.longest() / scaled.longest();

        // 整数化による誤差はリサイズ後の1ピクセル分まで許容
        let tolerance = factor + 1e-9;
        let dw = (scaled.width as f64 * factor - original.width as f64).abs();
        let dh = (scaled.height as f64 * factor - original.height as f64).abs();
        if dw > tolerance || dh > tolerance {
            return Err(Error::UnsupportedPreprocessing(format!(
                "scaled sample {}x{} is not an aspect-preserving resize of {}x{}",
                scaled.width, scaled.height, original.width, original.height
            )));
        }

        let padding = scaled.longest() - scaled.shortest();
        let padded = preprocessing.is_padded();
        let x_shift = if padded && scaled.width < scaled.height { padding / 2.0 } else { 0.0 };
        let y_shift = if padded && scaled.width > scaled.height { padding / 2.0 } else { 0.0 };

        Ok(Self { factor, x_shift, y_shift })
    }

    pub fn factor(&self) -> f64 {
        self.factor
    }

    pub fn correct_x(&self, x: f64) -> f64 {
        self.factor * (x - self.x_shift)
    }

    pub fn correct_y(&self, y: f64) -> f64 {
        self.factor * (y - self.y_shift)
    }

    pub fn correct(&self, bbox: &BBox) -> BBox {
        BBox {
            xmin: self.correct_x(bbox.xmin),
            ymin: self.correct_y(bbox.ymin),
            xmax: self.correct_x(bbox.xmax),
            ymax: self.correct_y(bbox.ymax),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_portrait_letterbox_correction() {
        // 元画像 300x600、リサイズ後 50x100、横方向に25pxずつパディング
        let corrector = CoordinateCorrector::new(
            ImageSize::new(300, 600),
            ImageSize::new(50, 100),
            Preprocessing::ResizeAndPad,
        )
        .unwrap();

        assert_eq!(corrector.factor(), 6.0);
        let corrected = corrector.correct(&BBox::from_xyxy(25.0, 10.0, 75.0, 90.0));
        assert_eq!(corrected, BBox::from_xyxy(0.0, 60.0, 300.0, 540.0));
    }

    #[test]
    fn test_landscape_letterbox_shifts_y() {
        let corrector = CoordinateCorrector::new(
            ImageSize::new(800, 400),
            ImageSize::new(100, 50),
            Preprocessing::ResizeAndPad,
        )
        .unwrap();

        assert_eq!(corrector.correct_x(10.0), 80.0);
        assert_eq!(corrector.correct_y(25.0), 0.0);
        assert_eq!(corrector.correct_y(75.0), 400.0);
    }

    #[test]
    fn test_resize_without_padding() {
        let corrector = CoordinateCorrector::new(
            ImageSize::new(300, 600),
            ImageSize::new(50, 100),
            Preprocessing::Resize,
        )
        .unwrap();

        assert_eq!(corrector.correct_x(25.0), 150.0);
        assert_eq!(corrector.correct_y(10.0), 60.0);
    }

    #[test]
    fn test_square_image_has_no_shift() {
        let corrector = CoordinateCorrector::new(
            ImageSize::new(640, 640),
            ImageSize::new(320, 320),
            Preprocessing::ResizeAndPad,
        )
        .unwrap();

        let corrected = corrector.correct(&BBox::from_xyxy(10.0, 20.0, 30.0, 40.0));
        assert_eq!(corrected, BBox::from_xyxy(20.0, 40.0, 60.0, 80.0));
    }

    #[test]
    fn test_rounded_scaled_size_accepted() {
        // 333x500 → 長辺100: 66.6 → 67
        let result = CoordinateCorrector::new(
            ImageSize::new(333, 500),
            ImageSize::new(67, 100),
            Preprocessing::ResizeAndPad,
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_stretched_resize_rejected() {
        let result = CoordinateCorrector::new(
            ImageSize::new(300, 600),
            ImageSize::new(100, 100),
            Preprocessing::ResizeAndPad,
        );
        assert!(matches!(result, Err(Error::UnsupportedPreprocessing(_))));
    }

    #[test]
    fn test_zero_size_rejected() {
        let result = CoordinateCorrector::new(
            ImageSize::new(300, 600),
            ImageSize::new(0, 100),
            Preprocessing::Resize,
        );
        assert!(matches!(result, Err(Error::UnsupportedPreprocessing(_))));
    }

    #[test]
    fn test_preprocessing_from_str() {
        assert_eq!("resize_and_pad".parse::<Preprocessing>().unwrap(), Preprocessing::ResizeAndPad);
        assert_eq!("Resize".parse::<Preprocessing>().unwrap(), Preprocessing::Resize);
        assert!(matches!(
            "center_crop".parse::<Preprocessing>(),
            Err(Error::UnsupportedPreprocessing(_))
        ));
    }

    #[test]
    fn test_preprocessing_from_padding_flag() {
        assert!(Preprocessing::from_padding_flag(true).is_padded());
        assert!(!Preprocessing::from_padding_flag(false).is_padded());
    }
}
