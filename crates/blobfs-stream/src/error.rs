//! ストリームエラー型

use blobfs_bridge::{BridgeError, StreamId};
use blobfs_codec::CodecError;

/// ストリーム操作のエラー
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// 読み込み対象のパスが存在しない
    NotFound(String),
    /// 権限・デバイス・容量不足などのネイティブ I/O 失敗
    Io(String),
    /// 開いていないストリームへの操作
    StreamClosed,
    /// チャンクが宣言されたエンコーディングと一致しない
    InvalidEncodingInput(CodecError),
    /// ブリッジとコアの不整合（正常動作では発生しない。発生したらストリームを閉じる）
    UnknownStreamIdentifier(StreamId),
    /// 引数の形式が不正（空のパス、バッファサイズ 0 など）
    InvalidArgument(String),
}

impl StreamError {
    /// ストリームを終了させる I/O 由来の失敗か
    pub fn is_io(&self) -> bool {
        matches!(self, StreamError::Io(_) | StreamError::NotFound(_))
    }
}

impl core::fmt::Display for StreamError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            StreamError::NotFound(path) => write!(f, "No such file: {}", path),
            StreamError::Io(msg) => write!(f, "I/O error: {}", msg),
            StreamError::StreamClosed => write!(f, "Stream is closed"),
            StreamError::InvalidEncodingInput(e) => write!(f, "{}", e),
            StreamError::UnknownStreamIdentifier(id) => {
                write!(f, "Unknown stream identifier: {}", id)
            }
            StreamError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
        }
    }
}

impl std::error::Error for StreamError {}

impl From<CodecError> for StreamError {
    fn from(err: CodecError) -> Self {
        StreamError::InvalidEncodingInput(err)
    }
}

impl From<BridgeError> for StreamError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::NotFound(path) => StreamError::NotFound(path),
            BridgeError::StreamClosed => StreamError::StreamClosed,
            BridgeError::UnknownStream(id) => StreamError::UnknownStreamIdentifier(id),
            BridgeError::AlreadyExists(path) => {
                StreamError::Io(format!("file already exists: {}", path))
            }
            BridgeError::Io(msg) | BridgeError::InvalidInput(msg) => StreamError::Io(msg),
            BridgeError::Unsupported(method) => {
                StreamError::Io(format!("native module does not provide `{}`", method))
            }
        }
    }
}
