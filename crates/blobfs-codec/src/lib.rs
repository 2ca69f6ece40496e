//! # blobfs-codec
//!
//! ストリームのエンコーディング変換（utf8 / base64 / ascii）
//!
//! 状態を持たない純粋な変換のみを提供する。すべてのストリームで共有される。
//! `no_std` + `alloc` 環境（WASM を含む）で動作する。
//!
//! ## エンコーディングごとの表現
//!
//! ```text
//! encoding | 利用者が扱うチャンク        | ネイティブ境界のワイヤ表現
//! ---------+-----------------------------+-----------------------------
//! utf8     | 文字列                      | 文字列（そのまま）
//! base64   | base64 文字列               | base64 文字列（再エンコードしない）
//! ascii    | 0〜255 の整数配列           | バイト配列
//! ```

#![no_std]
extern crate alloc;

mod chunk;
mod encoding;
mod error;

pub use chunk::{decode, encode, Chunk, WireData};
pub use encoding::Encoding;
pub use error::CodecError;
