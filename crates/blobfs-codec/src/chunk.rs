//! チャンク型とワイヤ表現
//!
//! ```text
//! 書き込み: serde_json::Value ──encode──▶ WireData ──▶ ネイティブ appendChunk
//! 読み込み: ネイティブ data イベント ──▶ WireData ──decode──▶ Chunk ──▶ onData
//! ```

use alloc::string::String;
use alloc::vec::Vec;

use base64::Engine as _;
use serde_json::Value;

use crate::error::CodecError;
use crate::Encoding;

/// ネイティブ境界を越えるデータ表現
///
/// utf8 / base64 は文字列、ascii はバイト配列。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireData {
    Text(String),
    Bytes(Vec<u8>),
}

impl WireData {
    /// ネイティブ側で読み取った生バイト列をワイヤ表現に変換する
    ///
    /// # エラー
    /// - `CodecError::InvalidUtf8`: utf8 指定でバイト列が UTF-8 として不正
    pub fn from_bytes(bytes: &[u8], encoding: Encoding) -> Result<Self, CodecError> {
        match encoding {
            Encoding::Utf8 => core::str::from_utf8(bytes)
                .map(|s| WireData::Text(String::from(s)))
                .map_err(|_| CodecError::InvalidUtf8),
            Encoding::Base64 => Ok(WireData::Text(
                base64::engine::general_purpose::STANDARD.encode(bytes),
            )),
            Encoding::Ascii => Ok(WireData::Bytes(bytes.to_vec())),
        }
    }

    /// ワイヤ表現をファイルに書き込む生バイト列に変換する
    ///
    /// # エラー
    /// - `CodecError::InvalidBase64`: base64 テキストのデコード失敗
    /// - `CodecError::InvalidEncodingInput`: 表現とエンコーディングの不一致
    pub fn into_bytes(self, encoding: Encoding) -> Result<Vec<u8>, CodecError> {
        match (encoding, self) {
            (Encoding::Utf8, WireData::Text(text)) => Ok(text.into_bytes()),
            (Encoding::Base64, WireData::Text(text)) => base64::engine::general_purpose::STANDARD
                .decode(text.as_bytes())
                .map_err(|_| CodecError::InvalidBase64),
            (Encoding::Ascii, WireData::Bytes(bytes)) => Ok(bytes),
            (Encoding::Ascii, WireData::Text(_)) => {
                Err(CodecError::invalid_input(encoding, "expected a byte array, got text"))
            }
            (_, WireData::Bytes(_)) => {
                Err(CodecError::invalid_input(encoding, "expected text, got a byte array"))
            }
        }
    }

    /// ファイル上のバイト数（base64 はデコード後の長さ）
    pub fn decoded_len(&self, encoding: Encoding) -> usize {
        match (self, encoding) {
            (WireData::Text(text), Encoding::Base64) => base64_decoded_len(text),
            _ => self.len(),
        }
    }

    /// 表現の長さ（文字列ならバイト長、配列なら要素数）
    pub fn len(&self) -> usize {
        match self {
            WireData::Text(text) => text.len(),
            WireData::Bytes(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// ストリーム利用者が扱うデコード済みチャンク
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    /// utf8 / base64 のチャンク
    Text(String),
    /// ascii のチャンク（0〜255 の値の列）
    Bytes(Vec<u8>),
}

impl Chunk {
    /// デコード後のバイト数
    ///
    /// base64 はデコードした場合のバイト数を返す（パディングを考慮）。
    pub fn byte_len(&self, encoding: Encoding) -> usize {
        match (self, encoding) {
            (Chunk::Text(text), Encoding::Base64) => base64_decoded_len(text),
            (Chunk::Text(text), _) => text.len(),
            (Chunk::Bytes(bytes), _) => bytes.len(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Chunk::Text(text) => Some(text),
            Chunk::Bytes(_) => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Chunk::Bytes(bytes) => Some(bytes),
            Chunk::Text(_) => None,
        }
    }

    /// JSON 値に変換する（ascii は数値配列になる）
    pub fn into_value(self) -> Value {
        match self {
            Chunk::Text(text) => Value::String(text),
            Chunk::Bytes(bytes) => Value::Array(bytes.into_iter().map(Value::from).collect()),
        }
    }
}

impl From<Chunk> for Value {
    fn from(chunk: Chunk) -> Self {
        chunk.into_value()
    }
}

/// 論理チャンクをワイヤ表現に変換する
///
/// 入力はホストから来た任意の値なので `serde_json::Value` で受ける。
/// - utf8 / base64: 文字列のみ受け付ける。base64 の再エンコードはしない
/// - ascii: 0〜255 の整数配列のみ受け付ける。文字列はそのままでは拒否する
///
/// # エラー
/// - `CodecError::InvalidEncodingInput`: 入力の形がエンコーディングと一致しない
pub fn encode(chunk: &Value, encoding: Encoding) -> Result<WireData, CodecError> {
    let result = match (encoding, chunk) {
        (Encoding::Utf8 | Encoding::Base64, Value::String(text)) => {
            Ok(WireData::Text(text.clone()))
        }
        (Encoding::Utf8 | Encoding::Base64, _) => {
            Err(CodecError::invalid_input(encoding, "expected a string"))
        }
        (Encoding::Ascii, Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(index, item)| byte_value(item, index, encoding))
            .collect::<Result<Vec<u8>, _>>()
            .map(WireData::Bytes),
        (Encoding::Ascii, _) => Err(CodecError::invalid_input(
            encoding,
            "expected an array of byte values (0-255)",
        )),
    };

    if let Err(err) = &result {
        log::trace!("encode rejected: {}", err);
    }
    result
}

/// ワイヤ表現を論理チャンクに変換する
///
/// # エラー
/// - `CodecError::InvalidEncodingInput`: 表現の種類がエンコーディングと一致しない
pub fn decode(wire: WireData, encoding: Encoding) -> Result<Chunk, CodecError> {
    match (encoding, wire) {
        (Encoding::Utf8 | Encoding::Base64, WireData::Text(text)) => Ok(Chunk::Text(text)),
        (Encoding::Ascii, WireData::Bytes(bytes)) => Ok(Chunk::Bytes(bytes)),
        (Encoding::Ascii, WireData::Text(_)) => {
            Err(CodecError::invalid_input(encoding, "native layer delivered text"))
        }
        (_, WireData::Bytes(_)) => {
            Err(CodecError::invalid_input(encoding, "native layer delivered a byte array"))
        }
    }
}

/// base64 テキストをデコードしたときのバイト数（パディングを除いた桁数から求める）
fn base64_decoded_len(text: &str) -> usize {
    text.trim_end_matches('=').len() * 3 / 4
}

/// 配列要素を 1 バイトに変換する（整数かつ 0〜255 のみ）
fn byte_value(item: &Value, index: usize, encoding: Encoding) -> Result<u8, CodecError> {
    let out_of_range =
        || CodecError::invalid_input(encoding, alloc::format!("element {} is out of range 0-255", index));

    match item {
        Value::Number(number) => {
            if let Some(value) = number.as_u64() {
                u8::try_from(value).map_err(|_| out_of_range())
            } else if number.as_i64().is_some() {
                // 負の整数
                Err(out_of_range())
            } else {
                // 浮動小数点: 整数値のものだけ許容する（JS の数値は f64）
                let value = number.as_f64().unwrap_or(f64::NAN);
                let in_range = (0.0..=255.0).contains(&value);
                if in_range && f64::from(value as u8) == value {
                    Ok(value as u8)
                } else if in_range {
                    Err(CodecError::invalid_input(
                        encoding,
                        alloc::format!("element {} is not an integer", index),
                    ))
                } else {
                    Err(out_of_range())
                }
            }
        }
        _ => Err(CodecError::invalid_input(
            encoding,
            alloc::format!("element {} is not a number", index),
        )),
    }
}
