use crate::error::{RecordStatsError, Result};
use crate::metadata::FsMetadataProvider;
use record_stats_common::results::default_iou_thresholds;
use record_stats_common::{FileMetadataProvider, Preprocessing};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::rc::Rc;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// filter/split の出力先（省略時は入力ファイルと同じフォルダ）
    pub default_save_dir: Option<PathBuf>,
    /// 推論時に短辺側へ対称パディングしているか
    pub padded_along_shortest: bool,
    /// 画像ファイルが見つからなくてもタイムスタンプなしで集計を続ける
    pub lenient_timestamps: bool,
    pub iou_thresholds: Vec<f64>,
    /// RUST_LOG 未設定時のログフィルタ
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let content = std::fs::read_to_string(config_path)?;
            let config: Config = serde_json::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default_config())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| RecordStatsError::Config("ホームディレクトリが見つかりません".into()))?;
        Ok(home.join(".config").join("record-stats").join("config.json"))
    }

    fn default_config() -> Self {
        Self {
            default_save_dir: None,
            padded_along_shortest: true,
            lenient_timestamps: false,
            iou_thresholds: default_iou_thresholds(),
            log_filter: "record_stats=info,record_stats_common=info".into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.iou_thresholds.is_empty() {
            return Err(RecordStatsError::Config("iou_thresholds が空です".into()));
        }
        if let Some(bad) = self.iou_thresholds.iter().find(|t| !(0.0..=1.0).contains(*t)) {
            return Err(RecordStatsError::Config(format!(
                "iou_thresholds は 0.0〜1.0 の範囲で指定してください: {}",
                bad
            )));
        }
        Ok(())
    }

    pub fn preprocessing(&self) -> Preprocessing {
        Preprocessing::from_padding_flag(self.padded_along_shortest)
    }

    pub fn metadata_provider(&self) -> Rc<dyn FileMetadataProvider> {
        if self.lenient_timestamps {
            Rc::new(FsMetadataProvider::lenient())
        } else {
            Rc::new(FsMetadataProvider::strict())
        }
    }
}
