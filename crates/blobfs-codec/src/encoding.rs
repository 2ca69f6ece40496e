//! エンコーディング種別

use alloc::string::ToString;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CodecError;

/// ストリームのエンコーディング
///
/// ストリームを開いた時点で固定され、以後変わらない。
/// - `Utf8`: テキスト文字列をそのまま渡す
/// - `Base64`: base64 テキスト（ネイティブ側でデコード/エンコード）
/// - `Ascii`: 0〜255 の整数配列
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    #[default]
    Utf8,
    Base64,
    Ascii,
}

impl Encoding {
    /// ネイティブモジュールに渡す名前
    pub fn as_str(&self) -> &'static str {
        match self {
            Encoding::Utf8 => "utf8",
            Encoding::Base64 => "base64",
            Encoding::Ascii => "ascii",
        }
    }

    /// チャンクがテキスト（文字列）で表現されるか
    pub fn is_text(&self) -> bool {
        !matches!(self, Encoding::Ascii)
    }
}

impl FromStr for Encoding {
    type Err = CodecError;

    /// 大文字小文字を区別せずに解析する（`"UTF8"` や `"utf-8"` も受け付ける）
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("utf8") || s.eq_ignore_ascii_case("utf-8") {
            Ok(Encoding::Utf8)
        } else if s.eq_ignore_ascii_case("base64") {
            Ok(Encoding::Base64)
        } else if s.eq_ignore_ascii_case("ascii") {
            Ok(Encoding::Ascii)
        } else {
            Err(CodecError::UnknownEncoding(s.to_string()))
        }
    }
}

impl core::fmt::Display for Encoding {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
