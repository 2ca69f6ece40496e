//! セッションエラー型

use alloc::string::String;

/// セッション操作のエラー
///
/// 未登録の名前はエラーにしない（読み出し時に空の集合を作る）。
/// 失敗するのはパスの形が不正なときだけ。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// 空のパス、または NUL を含むパス
    InvalidPath(String),
}

impl core::fmt::Display for SessionError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            SessionError::InvalidPath(reason) => write!(f, "Invalid session path: {}", reason),
        }
    }
}
