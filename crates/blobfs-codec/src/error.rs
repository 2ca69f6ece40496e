//! コーデックエラー型

use alloc::string::String;

use crate::Encoding;

/// エンコード/デコードのエラー
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// チャンクの形が宣言されたエンコーディングと一致しない
    /// （ascii に文字列、utf8 に配列、範囲外のバイト値など）
    InvalidEncodingInput {
        /// 宣言されたエンコーディング
        encoding: Encoding,
        /// 何が不正だったか
        reason: String,
    },
    /// 未知のエンコーディング名
    UnknownEncoding(String),
    /// base64 テキストのデコードに失敗
    InvalidBase64,
    /// バイト列が UTF-8 として不正
    InvalidUtf8,
}

impl CodecError {
    pub(crate) fn invalid_input(encoding: Encoding, reason: impl Into<String>) -> Self {
        CodecError::InvalidEncodingInput {
            encoding,
            reason: reason.into(),
        }
    }
}

impl core::fmt::Display for CodecError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            CodecError::InvalidEncodingInput { encoding, reason } => {
                write!(f, "Invalid input for encoding `{}`: {}", encoding, reason)
            }
            CodecError::UnknownEncoding(name) => {
                write!(f, "Unknown encoding `{}` (expected utf8, base64 or ascii)", name)
            }
            CodecError::InvalidBase64 => write!(f, "Invalid Base64 data"),
            CodecError::InvalidUtf8 => write!(f, "Invalid UTF-8 data"),
        }
    }
}
