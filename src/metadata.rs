//! ファイルシステムから読む外部情報（タイムスタンプ・元画像サイズ）

use chrono::{DateTime, Utc};
use record_stats_common::{
    Error, FileMetadataProvider, FileTimestamps, ImageSize, ImageSizeProvider, Result,
};
use std::path::Path;
use tracing::warn;

/// `std::fs::metadata` からタイムスタンプを取る
///
/// 作成日時はOS・ファイルシステムによっては取得できない（その場合は `None`）。
#[derive(Debug, Clone, Copy, Default)]
pub struct FsMetadataProvider {
    /// trueならファイルが見つからなくてもエラーにせず空のタイムスタンプを返す
    lenient: bool,
}

impl FsMetadataProvider {
    pub fn strict() -> Self {
        Self { lenient: false }
    }

    pub fn lenient() -> Self {
        Self { lenient: true }
    }
}

impl FileMetadataProvider for FsMetadataProvider {
    fn timestamps(&self, path: &Path) -> Result<FileTimestamps> {
        match std::fs::metadata(path) {
            Ok(meta) => Ok(FileTimestamps {
                created: meta.created().ok().map(DateTime::<Utc>::from),
                modified: meta.modified().ok().map(DateTime::<Utc>::from),
            }),
            Err(e) if self.lenient => {
                warn!(path = %path.display(), error = %e, "file metadata unavailable");
                Ok(FileTimestamps::default())
            }
            Err(e) => Err(Error::Io(e)),
        }
    }
}

/// 画像ヘッダから元画像のサイズを読む（デコードはしない）
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageFileSizes;

impl ImageSizeProvider for ImageFileSizes {
    fn image_size(&self, path: &Path) -> Result<ImageSize> {
        let (width, height) = image::image_dimensions(path).map_err(|e| {
            Error::Io(std::io::Error::other(format!("{}: {}", path.display(), e)))
        })?;
        Ok(ImageSize::new(width, height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_strict_missing_file_is_error() {
        let result = FsMetadataProvider::strict().timestamps(Path::new("/nonexistent/img.jpg"));
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[test]
    fn test_lenient_missing_file_is_empty() {
        let stamps = FsMetadataProvider::lenient()
            .timestamps(Path::new("/nonexistent/img.jpg"))
            .unwrap();
        assert_eq!(stamps, FileTimestamps::default());
    }

    #[test]
    fn test_existing_file_has_modified_time() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("a.jpg");
        std::fs::write(&path, b"fake").unwrap();

        let stamps = FsMetadataProvider::strict().timestamps(&path).unwrap();
        assert!(stamps.modified.is_some());
    }

    #[test]
    fn test_image_size_reads_header() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("small.png");
        image::RgbImage::new(30, 20).save(&path).expect("PNG保存失敗");

        let size = ImageFileSizes.image_size(&path).unwrap();
        assert_eq!(size, ImageSize::new(30, 20));
    }

    #[test]
    fn test_image_size_of_non_image_fails() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("not_an_image.png");
        std::fs::write(&path, b"not png").unwrap();

        assert!(ImageFileSizes.image_size(&path).is_err());
    }
}
