//! データセットのJSON保存・読み込み
//!
//! 形式: `{"name", "description", "class_map": [ラベル...], "data": [行...]}`
//! 読み込み時は行テーブルをレコードIDでまとめてレコードに戻す。

use super::Dataset;
use crate::error::Result;
use crate::metadata::FsMetadataProvider;
use record_stats_common::{
    AnnotationRow, ClassMap, Error, FileMetadataProvider, RecordTableParser,
};
use serde::{Deserialize, Deserializer, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::info;

const DEFAULT_SAVE_NAME: &str = "dataset";

#[derive(Serialize)]
struct PersistedDatasetRef<'a> {
    name: &'a str,
    description: &'a str,
    class_map: &'a ClassMap,
    data: &'a [AnnotationRow],
}

/// `name` と `description` はキー必須（値は null 可）
#[derive(Deserialize)]
struct PersistedDataset {
    #[serde(deserialize_with = "nullable_string")]
    name: Option<String>,
    #[serde(deserialize_with = "nullable_string")]
    description: Option<String>,
    class_map: ClassMap,
    data: Vec<AnnotationRow>,
}

fn nullable_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer)
}

impl Dataset {
    /// 保存済みデータセットを読み込む（タイムスタンプは実ファイルから再取得）
    ///
    /// ファイルが開けない場合は `Io` エラーをそのまま返す。
    pub fn load(path: &Path) -> Result<Self> {
        Self::load_with_provider(path, Rc::new(FsMetadataProvider::strict()))
    }

    pub fn load_with_provider(path: &Path, metadata: Rc<dyn FileMetadataProvider>) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let persisted: PersistedDataset = serde_json::from_reader(reader)
            .map_err(|e| Error::Deserialization(format!("{}: {}", path.display(), e)))?;

        if persisted.data.is_empty() {
            return Err(Error::Deserialization(format!(
                "{}: data table is empty",
                path.display()
            ))
            .into());
        }

        let records = RecordTableParser::default().parse(&persisted.data)?;
        info!(
            path = %path.display(),
            records = records.len(),
            rows = persisted.data.len(),
            "dataset loaded"
        );

        Ok(Self::assemble(
            records,
            persisted.class_map,
            persisted.name.filter(|s| !s.is_empty()),
            persisted.description.filter(|s| !s.is_empty()),
            metadata,
        ))
    }

    /// フォルダに `<name>.json` として保存し、書き込んだパスを返す
    ///
    /// 同名ファイルがあれば `<name>(1).json`, `<name>(2).json`, ... とずらす。
    /// 存在確認と書き込みの間に他のプロセスが同名で書く可能性は考慮しない。
    pub fn save(&self, folder: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(folder)?;

        let stem = self.name().unwrap_or(DEFAULT_SAVE_NAME);
        let path = unique_save_path(folder, stem, "json");

        let data = self.data()?;
        let persisted = PersistedDatasetRef {
            name: self.name().unwrap_or_default(),
            description: self.description().unwrap_or_default(),
            class_map: &self.class_map,
            data: &data,
        };

        let writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer_pretty(writer, &persisted)?;
        info!(path = %path.display(), rows = data.len(), "dataset saved");
        Ok(path)
    }
}

/// 既存ファイルと衝突しない保存先
pub fn unique_save_path(folder: &Path, stem: &str, extension: &str) -> PathBuf {
    let candidate = folder.join(format!("{}.{}", stem, extension));
    if !candidate.exists() {
        return candidate;
    }

    (1..)
        .map(|n| folder.join(format!("{}({}).{}", stem, n, extension)))
        .find(|path| !path.exists())
        .unwrap_or(candidate)
}
