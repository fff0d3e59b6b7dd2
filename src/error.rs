use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/Oエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSONパースエラー ファイル: {file_path:?}, 詳細: {source}")]
    JsonParse {
        file_path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("入力検証エラー: {0}")]
    InputValidation(String),

    /// ノードまたはエクスプローラとの通信失敗。元のメッセージをそのまま保持する。
    #[error("外部サービスエラー ({service}): {message}")]
    Collaborator {
        service: &'static str,
        message: String,
    },

    #[error("入力金額の照合エラー: {0}")]
    Reconciliation(String),

    #[error("資金不足: 利用可能な総額 {available} sats, 手数料 {fee} sats")]
    InsufficientFunds { available: u64, fee: u64 },

    #[error("無効な金額: 入力総額 {available} sats, 手数料 {fee} sats")]
    InvalidAmount { available: u64, fee: u64 },

    #[error("署名が完了していません: {0}")]
    SigningIncomplete(String),

    #[error("内部エラー: {0}")]
    Internal(String),
}

impl AppError {
    pub fn node(message: impl Into<String>) -> Self {
        AppError::Collaborator {
            service: "node",
            message: message.into(),
        }
    }

    pub fn explorer(message: impl Into<String>) -> Self {
        AppError::Collaborator {
            service: "explorer",
            message: message.into(),
        }
    }
}
