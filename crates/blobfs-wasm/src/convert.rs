//! JsValue と Rust 側の型の相互変換

use blobfs_bridge::{BridgeError, Encoding, WireData};
use blobfs_codec::Chunk;
use js_sys::{Array, Reflect, Uint8Array, JSON};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use wasm_bindgen::{JsCast, JsValue};

/// JS の値を JSON 経由でデシリアライズする
pub(crate) fn from_js<T: DeserializeOwned>(value: &JsValue) -> Result<T, BridgeError> {
    let json = JSON::stringify(value)
        .map_err(|e| js_error(&e))?
        .as_string()
        .ok_or_else(|| BridgeError::InvalidInput("value is not JSON-serializable".into()))?;
    serde_json::from_str(&json).map_err(|e| BridgeError::InvalidInput(format!("{}", e)))
}

/// Rust の値を JSON 経由で JS の値にする
pub(crate) fn to_js<T: Serialize>(value: &T) -> Result<JsValue, BridgeError> {
    let json = serde_json::to_string(value)
        .map_err(|e| BridgeError::InvalidInput(format!("{}", e)))?;
    JSON::parse(&json).map_err(|e| js_error(&e))
}

/// 書き込みに渡された値（文字列・数値配列・Uint8Array）を変換する
pub(crate) fn chunk_input(value: &JsValue) -> Result<Value, BridgeError> {
    if let Some(text) = value.as_string() {
        return Ok(Value::String(text));
    }
    if let Some(bytes) = value.dyn_ref::<Uint8Array>() {
        return Ok(Value::Array(
            bytes.to_vec().into_iter().map(Value::from).collect(),
        ));
    }
    from_js(value)
}

/// 配信用チャンクを JS の値にする（ascii は数値配列）
pub(crate) fn chunk_to_js(chunk: &Chunk) -> JsValue {
    match chunk {
        Chunk::Text(text) => JsValue::from_str(text),
        Chunk::Bytes(bytes) => bytes_to_array(bytes).into(),
    }
}

pub(crate) fn bytes_to_array(bytes: &[u8]) -> Array {
    bytes.iter().map(|b| JsValue::from(*b)).collect()
}

pub(crate) fn wire_to_js(data: &WireData) -> JsValue {
    match data {
        WireData::Text(text) => JsValue::from_str(text),
        WireData::Bytes(bytes) => bytes_to_array(bytes).into(),
    }
}

/// ネイティブ側から届いた値をワイヤ表現にする
pub(crate) fn js_to_wire(value: &JsValue, encoding: Encoding) -> Result<WireData, BridgeError> {
    if encoding.is_text() {
        return value.as_string().map(WireData::Text).ok_or_else(|| {
            BridgeError::InvalidInput(format!("expected a string for {} data", encoding))
        });
    }
    js_to_bytes(value).map(WireData::Bytes)
}

fn js_to_bytes(value: &JsValue) -> Result<Vec<u8>, BridgeError> {
    if let Some(bytes) = value.dyn_ref::<Uint8Array>() {
        return Ok(bytes.to_vec());
    }
    if !Array::is_array(value) {
        return Err(BridgeError::InvalidInput(
            "expected an array of byte values".into(),
        ));
    }
    Array::from(value)
        .iter()
        .map(|v| {
            v.as_f64()
                .and_then(byte_value)
                .ok_or_else(|| BridgeError::InvalidInput(format!("{:?} is not a byte", v)))
        })
        .collect()
}

/// 0〜255 の整数だけをバイトとして受け付ける
fn byte_value(n: f64) -> Option<u8> {
    if n.fract() == 0.0 && (0.0..=255.0).contains(&n) {
        Some(n as u8)
    } else {
        None
    }
}

/// JS のエラー値を `BridgeError` にする
///
/// `code` が `ENOENT` / `EEXIST` なら対応する種別に、それ以外は I/O エラーにする。
pub(crate) fn js_error(err: &JsValue) -> BridgeError {
    let message = err
        .as_string()
        .or_else(|| {
            Reflect::get(err, &"message".into())
                .ok()
                .and_then(|m| m.as_string())
        })
        .unwrap_or_else(|| format!("{:?}", err));
    let code = if err.is_object() {
        Reflect::get(err, &"code".into())
            .ok()
            .and_then(|c| c.as_string())
    } else {
        None
    };

    error_for_code(code.as_deref(), message)
}

fn error_for_code(code: Option<&str>, message: String) -> BridgeError {
    match code {
        Some("ENOENT") => BridgeError::NotFound(message),
        Some("EEXIST") => BridgeError::AlreadyExists(message),
        _ => BridgeError::Io(message),
    }
}
