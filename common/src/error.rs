//! エラー型定義

use thiserror::Error;

/// 共通エラー型
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// 構築時に必須の設定（クラスマップ、デコーダ等）が欠けている
    #[error("Config error: {0}")]
    Config(String),

    /// 永続化テーブルが壊れている・不完全
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// 依存する状態が未設定のままビューが読まれた
    #[error("Not configured: {0}")]
    NotConfigured(String),

    /// 座標補正が対応していない前処理
    #[error("Unsupported preprocessing: {0}")]
    UnsupportedPreprocessing(String),

    /// 未実装のアノテーション形式（マスク等）
    #[error("Unsupported capability: {0}")]
    UnsupportedCapability(String),
}

/// Result型エイリアス
pub type Result<T> = std::result::Result<T, Error>;
