//! ファサードのエラー型

use blobfs_bridge::BridgeError;
use blobfs_codec::CodecError;
use blobfs_session::SessionError;
use blobfs_stream::StreamError;

/// `FileSystem` の操作エラー
///
/// JS 側には `Display` の文字列を持つ `JsError` として渡る。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsError {
    /// 空のパスなど、ネイティブ層に渡す前に弾いた引数
    InvalidArgument(String),
    /// データが宣言されたエンコーディングと一致しない
    InvalidEncodingInput(CodecError),
    NotFound(String),
    AlreadyExists(String),
    Io(String),
    Stream(StreamError),
    Session(SessionError),
    /// 設定 JSON の解析・検証の失敗
    Config(String),
}

impl core::fmt::Display for FsError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            FsError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            FsError::InvalidEncodingInput(e) => write!(f, "{}", e),
            FsError::NotFound(path) => write!(f, "No such file or directory: {}", path),
            FsError::AlreadyExists(path) => write!(f, "File already exists: {}", path),
            FsError::Io(msg) => write!(f, "I/O error: {}", msg),
            FsError::Stream(e) => write!(f, "{}", e),
            FsError::Session(e) => write!(f, "{}", e),
            FsError::Config(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for FsError {}

impl From<BridgeError> for FsError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::NotFound(path) => FsError::NotFound(path),
            BridgeError::AlreadyExists(path) => FsError::AlreadyExists(path),
            BridgeError::Io(msg) => FsError::Io(msg),
            BridgeError::InvalidInput(msg) => FsError::InvalidArgument(msg),
            BridgeError::Unsupported(method) => {
                FsError::Io(format!("native module does not provide `{}`", method))
            }
            other @ (BridgeError::StreamClosed | BridgeError::UnknownStream(_)) => {
                FsError::Stream(other.into())
            }
        }
    }
}

impl From<CodecError> for FsError {
    fn from(err: CodecError) -> Self {
        FsError::InvalidEncodingInput(err)
    }
}

impl From<StreamError> for FsError {
    fn from(err: StreamError) -> Self {
        FsError::Stream(err)
    }
}

impl From<SessionError> for FsError {
    fn from(err: SessionError) -> Self {
        FsError::Session(err)
    }
}
