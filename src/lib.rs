//! Record Stats
//!
//! アノテーション付き画像データセットを読み込み、統計ビュー（概要・画像別・クラス別・
//! ギャラリー）をキャッシュ付きで提供する。推論結果（予測 + 正解）のテーブルも扱う。

pub mod cli;
pub mod config;
pub mod dataset;
pub mod error;
pub mod metadata;
pub mod results;

pub use dataset::{Dataset, DatasetBuilder, DatasetView};
pub use error::{RecordStatsError, Result};
pub use results::{ResultsDataset, ResultsView};
