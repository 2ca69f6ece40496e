//! # blobfs-wasm
//!
//! wasm-bindgen エクスポート：ホストアプリ（JS）から呼び出す公開 API。
//!
//! ## 使用方法（TypeScript）
//!
//! ```typescript
//! import { BlobFs, init_panic_hook, initLogging } from './blobfs-wasm-pkg/blobfs_wasm';
//!
//! // パニック時のスタックトレースを有効化（開発時）
//! init_panic_hook();
//! initLogging("debug");
//!
//! const fs = new BlobFs(NativeModules.BlobFs);
//!
//! // ネイティブ側の読み込みイベントを戻す
//! emitter.addListener("BlobFsStream", (e) => fs.dispatchEvent(e.streamId, e.event, e.detail));
//!
//! // 書き込み（await しなくても呼び出し順に書かれる）
//! const ws = await fs.writeStream(path, "utf8", false);
//! ws.write("hello");
//! ws.write(" world");
//! await ws.close();
//!
//! // 読み込み
//! const rs = fs.readStream(path, "ascii", 4096);
//! rs.onData((chunk) => consume(chunk));
//! rs.onEnd(() => done());
//! await rs.open();
//!
//! // セッション
//! fs.session("upload").addPath(path);
//! await fs.purgeSession("upload");
//! ```
//!
//! Rust から使う場合は `FileSystem` に `NativeBridge + FileOps` の実装を渡す。

use wasm_bindgen::prelude::*;

pub mod config;
mod convert;
pub mod error;
pub mod fs;
pub mod handles;
pub mod js_bridge;
mod logger;

pub use config::FsConfig;
pub use error::FsError;
pub use fs::FileSystem;
pub use handles::{BlobFs, ReadStreamHandle, SessionHandle, WriteStreamHandle};
pub use js_bridge::JsBridge;

/// パニック時にブラウザコンソールにスタックトレースを出力する
///
/// 開発時に必ず呼び出すこと。本番ビルドでは feature flag で無効化可能。
#[wasm_bindgen]
pub fn init_panic_hook() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// `log` の出力をコンソールに転送する
///
/// # 引数
/// - `level`: `"off" | "error" | "warn" | "info" | "debug" | "trace"`。省略時は `"info"`
///
/// # エラー
/// - レベル名が不正
#[wasm_bindgen(js_name = "initLogging")]
pub fn init_logging(level: Option<String>) -> Result<(), JsError> {
    let level = match level {
        Some(name) => name
            .parse::<log::LevelFilter>()
            .map_err(|_| JsError::new(&format!("Unknown log level: {}", name)))?,
        None => log::LevelFilter::Info,
    };
    logger::install(level);
    Ok(())
}
