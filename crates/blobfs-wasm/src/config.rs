//! ファサードの設定

use blobfs_codec::Encoding;
use blobfs_stream::DEFAULT_BUFFER_SIZE;
use serde::{Deserialize, Serialize};

use crate::error::FsError;

/// 引数が省略されたときの既定値
///
/// JSON ではすべてのフィールドが省略可能:
/// ```json
/// { "defaultEncoding": "base64", "defaultBufferSize": 8192, "appendByDefault": false }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FsConfig {
    pub default_encoding: Encoding,
    /// 読み込みストリームのバッファサイズ（バイト）
    pub default_buffer_size: usize,
    pub append_by_default: bool,
}

impl Default for FsConfig {
    fn default() -> Self {
        FsConfig {
            default_encoding: Encoding::Utf8,
            default_buffer_size: DEFAULT_BUFFER_SIZE,
            append_by_default: false,
        }
    }
}

impl FsConfig {
    /// JSON 文字列から読み込んで検証する
    ///
    /// # エラー
    /// - `FsError::Config`: JSON が不正、またはバッファサイズが 0
    pub fn from_json(json: &str) -> Result<Self, FsError> {
        let config: FsConfig =
            serde_json::from_str(json).map_err(|e| FsError::Config(format!("{}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), FsError> {
        if self.default_buffer_size == 0 {
            return Err(FsError::Config(
                "defaultBufferSize must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}
