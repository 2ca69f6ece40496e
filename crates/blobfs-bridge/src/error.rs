//! ブリッジエラー型

use std::io;

use blobfs_codec::CodecError;

use crate::StreamId;

/// ネイティブブリッジ操作のエラー
///
/// ネイティブ側はリクエストを黙って捨ててはならず、失敗は必ずこの型で報告する。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// パスが存在しない
    NotFound(String),
    /// パスが既に存在する（createFile）
    AlreadyExists(String),
    /// 権限・デバイス・容量不足などの I/O 失敗
    Io(String),
    /// 書き込みハンドルが未知、または既に閉じている
    StreamClosed,
    /// 読み込みハンドルが未知（コアとブリッジの不整合）
    UnknownStream(StreamId),
    /// ネイティブ側に渡すデータが不正
    InvalidInput(String),
    /// ネイティブモジュールがメソッドを提供していない
    Unsupported(String),
}

impl BridgeError {
    pub fn io(msg: impl Into<String>) -> Self {
        BridgeError::Io(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, BridgeError::NotFound(_))
    }
}

impl core::fmt::Display for BridgeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            BridgeError::NotFound(path) => write!(f, "No such file or directory: {}", path),
            BridgeError::AlreadyExists(path) => write!(f, "File already exists: {}", path),
            BridgeError::Io(msg) => write!(f, "I/O error: {}", msg),
            BridgeError::StreamClosed => write!(f, "Stream is closed"),
            BridgeError::UnknownStream(id) => write!(f, "Unknown stream identifier: {}", id),
            BridgeError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            BridgeError::Unsupported(method) => {
                write!(f, "Native module does not provide `{}`", method)
            }
        }
    }
}

impl std::error::Error for BridgeError {}

impl From<io::Error> for BridgeError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => BridgeError::NotFound(err.to_string()),
            io::ErrorKind::AlreadyExists => BridgeError::AlreadyExists(err.to_string()),
            _ => BridgeError::Io(err.to_string()),
        }
    }
}

impl From<CodecError> for BridgeError {
    fn from(err: CodecError) -> Self {
        BridgeError::InvalidInput(err.to_string())
    }
}
