//! wasm-bindgen エクスポート
//!
//! ホストアプリ（JS）から呼び出す公開 API。非同期の操作はすべて Promise を返す。
//!
//! ## 内部アーキテクチャ
//!
//! ```text
//! BlobFs
//!   ├── FileSystem<JsBridge>   ストリーム・セッション・単発操作
//!   │     ├── JsBridge         ネイティブモジュール呼び出し + EventHub
//!   │     └── SessionRegistry  名前付きパス集合（BlobFs ごとに 1 つ）
//!   │
//!   ├── WriteStreamHandle      write / close
//!   ├── ReadStreamHandle       onData / onEnd / onError / open / pause / resume / close
//!   └── SessionHandle          addPath / removePath / list / dispose
//! ```

use std::cell::Cell;
use std::rc::Rc;
use std::str::FromStr;

use blobfs_bridge::{ScanTarget, StreamId};
use blobfs_codec::Encoding;
use blobfs_session::Session;
use blobfs_stream::{ReadState, ReadStream, WriteStream};
use js_sys::{Array, Function, Object, Promise};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{future_to_promise, spawn_local};

use crate::config::FsConfig;
use crate::convert::{chunk_input, chunk_to_js, from_js, to_js};
use crate::error::FsError;
use crate::fs::FileSystem;
use crate::js_bridge::JsBridge;

fn reject(err: impl Into<FsError>) -> JsValue {
    JsError::from(err.into()).into()
}

fn parse_encoding(encoding: Option<String>) -> Result<Option<Encoding>, FsError> {
    encoding
        .map(|name| Encoding::from_str(&name).map_err(FsError::from))
        .transpose()
}

/// ファイルシステム API の入口
///
/// ## スレッド安全性
///
/// WASM はシングルスレッドのため、`!Send + !Sync` を満たす。
/// JS からは単一スレッドで呼び出される前提。
#[wasm_bindgen]
pub struct BlobFs {
    fs: Rc<FileSystem<JsBridge>>,
}

#[wasm_bindgen]
impl BlobFs {
    /// ネイティブモジュールをラップする
    ///
    /// # 引数
    /// - `native`: Node 形式のコールバックを取るネイティブモジュール
    /// - `config`: `FsConfig` の JSON。省略時は既定値
    ///
    /// # 例（TypeScript）
    /// ```typescript
    /// const fs = new BlobFs(NativeModules.BlobFs, '{"defaultEncoding":"base64"}');
    /// ```
    #[wasm_bindgen(constructor)]
    pub fn new(native: Object, config: Option<String>) -> Result<BlobFs, JsError> {
        let config = match config {
            Some(json) => FsConfig::from_json(&json)?,
            None => FsConfig::default(),
        };
        let bridge = Rc::new(JsBridge::new(native));
        Ok(BlobFs {
            fs: Rc::new(FileSystem::new(bridge, config)),
        })
    }

    /// ネイティブ側の読み込みイベントを渡す
    ///
    /// # 引数
    /// - `event`: `"data"` / `"end"` / `"error"`
    ///
    /// # 戻り値
    /// 配送できたかどうか（close 済みのストリーム宛てなら `false`）
    #[wasm_bindgen(js_name = "dispatchEvent")]
    pub fn dispatch_event(
        &self,
        stream_id: &str,
        event: &str,
        detail: JsValue,
    ) -> Result<bool, JsError> {
        let delivered = self
            .fs
            .bridge()
            .dispatch(&StreamId::new(stream_id), event, &detail)
            .map_err(FsError::from)?;
        Ok(delivered)
    }

    /// 書き込みストリームを開く
    ///
    /// # 戻り値
    /// `Promise<WriteStreamHandle>`
    #[wasm_bindgen(js_name = "writeStream")]
    pub fn write_stream(
        &self,
        path: String,
        encoding: Option<String>,
        append: Option<bool>,
    ) -> Promise {
        let fs = Rc::clone(&self.fs);
        future_to_promise(async move {
            let encoding = parse_encoding(encoding).map_err(reject)?;
            let stream = fs
                .open_write_stream(&path, encoding, append)
                .await
                .map_err(reject)?;
            Ok(WriteStreamHandle { stream }.into())
        })
    }

    /// 読み込みストリームを生成する（`open()` を呼ぶまでネイティブ I/O はしない）
    #[wasm_bindgen(js_name = "readStream")]
    pub fn read_stream(
        &self,
        path: &str,
        encoding: Option<String>,
        buffer_size: Option<u32>,
    ) -> Result<ReadStreamHandle, JsError> {
        let encoding = parse_encoding(encoding)?;
        let stream = self
            .fs
            .open_read_stream(path, encoding, buffer_size.map(|b| b as usize))?;
        Ok(ReadStreamHandle {
            stream,
            loop_started: Rc::new(Cell::new(false)),
        })
    }

    /// 名前付きセッションを取得する（なければ空で作る）
    #[wasm_bindgen]
    pub fn session(&self, name: &str) -> SessionHandle {
        let session = self.fs.session(name);
        // 参照した時点で登録する
        session.list();
        SessionHandle { session }
    }

    /// セッションのファイルを削除してからセッションを破棄する
    ///
    /// # 戻り値
    /// `Promise<string[]>` 削除対象だったパス
    #[wasm_bindgen(js_name = "purgeSession")]
    pub fn purge_session(&self, name: String) -> Promise {
        let fs = Rc::clone(&self.fs);
        future_to_promise(async move {
            let paths = fs.purge_session(&name).await.map_err(reject)?;
            Ok(paths.iter().map(|p| JsValue::from_str(p)).collect::<Array>().into())
        })
    }

    #[wasm_bindgen]
    pub fn mkdir(&self, path: String) -> Promise {
        let fs = Rc::clone(&self.fs);
        future_to_promise(async move {
            fs.mkdir(&path).await.map_err(reject)?;
            Ok(JsValue::UNDEFINED)
        })
    }

    /// # 戻り値
    /// `Promise<{ filename, path, size, type, lastModified }>`
    #[wasm_bindgen]
    pub fn stat(&self, path: String) -> Promise {
        let fs = Rc::clone(&self.fs);
        future_to_promise(async move {
            let record = fs.stat(&path).await.map_err(reject)?;
            to_js(&record).map_err(reject)
        })
    }

    #[wasm_bindgen]
    pub fn lstat(&self, path: String) -> Promise {
        let fs = Rc::clone(&self.fs);
        future_to_promise(async move {
            let records = fs.lstat(&path).await.map_err(reject)?;
            to_js(&records).map_err(reject)
        })
    }

    #[wasm_bindgen]
    pub fn ls(&self, path: String) -> Promise {
        let fs = Rc::clone(&self.fs);
        future_to_promise(async move {
            let names = fs.ls(&path).await.map_err(reject)?;
            to_js(&names).map_err(reject)
        })
    }

    #[wasm_bindgen]
    pub fn cp(&self, path: String, dest: String) -> Promise {
        let fs = Rc::clone(&self.fs);
        future_to_promise(async move {
            fs.cp(&path, &dest).await.map_err(reject)?;
            Ok(JsValue::UNDEFINED)
        })
    }

    #[wasm_bindgen]
    pub fn mv(&self, path: String, dest: String) -> Promise {
        let fs = Rc::clone(&self.fs);
        future_to_promise(async move {
            fs.mv(&path, &dest).await.map_err(reject)?;
            Ok(JsValue::UNDEFINED)
        })
    }

    #[wasm_bindgen]
    pub fn unlink(&self, path: String) -> Promise {
        let fs = Rc::clone(&self.fs);
        future_to_promise(async move {
            fs.unlink(&path).await.map_err(reject)?;
            Ok(JsValue::UNDEFINED)
        })
    }

    /// # 戻り値
    /// `Promise<{ exists: boolean, isDir: boolean }>`
    #[wasm_bindgen]
    pub fn exists(&self, path: String) -> Promise {
        let fs = Rc::clone(&self.fs);
        future_to_promise(async move {
            let existence = fs.exists(&path).await.map_err(reject)?;
            to_js(&existence).map_err(reject)
        })
    }

    #[wasm_bindgen(js_name = "isDir")]
    pub fn is_dir(&self, path: String) -> Promise {
        let fs = Rc::clone(&self.fs);
        future_to_promise(async move {
            let is_dir = fs.is_dir(&path).await.map_err(reject)?;
            Ok(JsValue::from_bool(is_dir))
        })
    }

    /// # 引数
    /// - `data`: utf8 / base64 なら文字列、ascii なら数値配列
    #[wasm_bindgen(js_name = "createFile")]
    pub fn create_file(&self, path: String, data: JsValue, encoding: Option<String>) -> Promise {
        let fs = Rc::clone(&self.fs);
        let data = chunk_input(&data);
        future_to_promise(async move {
            let encoding = parse_encoding(encoding).map_err(reject)?;
            let data = data.map_err(reject)?;
            fs.create_file(&path, &data, encoding).await.map_err(reject)?;
            Ok(JsValue::UNDEFINED)
        })
    }

    #[wasm_bindgen(js_name = "writeFile")]
    pub fn write_file(&self, path: String, encoding: String, data: JsValue) -> Promise {
        let fs = Rc::clone(&self.fs);
        let data = chunk_input(&data);
        future_to_promise(async move {
            let encoding = Encoding::from_str(&encoding).map_err(reject)?;
            let data = data.map_err(reject)?;
            fs.write_file(&path, encoding, &data).await.map_err(reject)?;
            Ok(JsValue::UNDEFINED)
        })
    }

    /// # 戻り値
    /// `Promise<string | number[]>`
    #[wasm_bindgen(js_name = "readFile")]
    pub fn read_file(&self, path: String, encoding: Option<String>) -> Promise {
        let fs = Rc::clone(&self.fs);
        future_to_promise(async move {
            let encoding = parse_encoding(encoding).map_err(reject)?;
            let chunk = fs.read_file(&path, encoding).await.map_err(reject)?;
            Ok(chunk_to_js(&chunk))
        })
    }

    /// # 引数
    /// - `pairs`: `[{ path, mime? }, ...]`
    #[wasm_bindgen(js_name = "scanFile")]
    pub fn scan_file(&self, pairs: JsValue) -> Promise {
        let fs = Rc::clone(&self.fs);
        let targets = from_js::<Vec<ScanTarget>>(&pairs);
        future_to_promise(async move {
            let targets = targets.map_err(reject)?;
            fs.scan_file(&targets).await.map_err(reject)?;
            Ok(JsValue::UNDEFINED)
        })
    }

    /// 既知ディレクトリ `{ DocumentDir, CacheDir, ... }`
    #[wasm_bindgen]
    pub fn dirs(&self) -> Result<JsValue, JsError> {
        Ok(to_js(&self.fs.dirs()).map_err(FsError::from)?)
    }
}

/// 書き込みストリームのハンドル
#[wasm_bindgen]
pub struct WriteStreamHandle {
    stream: WriteStream,
}

#[wasm_bindgen]
impl WriteStreamHandle {
    /// チャンクを書き込む
    ///
    /// 呼び出した順に書き込まれる。前の Promise を待たずに続けて呼んでよい。
    #[wasm_bindgen]
    pub fn write(&self, chunk: JsValue) -> Promise {
        let write = chunk_input(&chunk).map(|value| self.stream.write(value));
        future_to_promise(async move {
            write.map_err(reject)?.await.map_err(reject)?;
            Ok(JsValue::UNDEFINED)
        })
    }

    /// ストリームを閉じる（冪等）
    #[wasm_bindgen]
    pub fn close(&self) -> Promise {
        let stream = self.stream.clone();
        future_to_promise(async move {
            stream.close().await.map_err(reject)?;
            Ok(JsValue::UNDEFINED)
        })
    }

    #[wasm_bindgen(getter)]
    pub fn id(&self) -> String {
        self.stream.id().to_string()
    }

    #[wasm_bindgen(getter)]
    pub fn encoding(&self) -> String {
        self.stream.encoding().to_string()
    }

    #[wasm_bindgen(getter, js_name = "isOpen")]
    pub fn is_open(&self) -> bool {
        self.stream.is_open()
    }

    #[wasm_bindgen(getter, js_name = "bytesWritten")]
    pub fn bytes_written(&self) -> f64 {
        self.stream.bytes_written() as f64
    }
}

/// 読み込みストリームのハンドル
#[wasm_bindgen]
pub struct ReadStreamHandle {
    stream: ReadStream,
    /// tick ループを spawn 済みか（2 回目以降の open では spawn しない）
    loop_started: Rc<Cell<bool>>,
}

#[wasm_bindgen]
impl ReadStreamHandle {
    /// `callback(chunk)`: utf8 / base64 なら文字列、ascii なら数値配列
    #[wasm_bindgen(js_name = "onData")]
    pub fn on_data(&self, callback: Function) {
        self.stream.on_data(move |chunk| {
            if let Err(e) = callback.call1(&JsValue::NULL, &chunk_to_js(chunk)) {
                log::warn!("onData callback threw: {:?}", e);
            }
        });
    }

    #[wasm_bindgen(js_name = "onEnd")]
    pub fn on_end(&self, callback: Function) {
        self.stream.on_end(move || {
            if let Err(e) = callback.call0(&JsValue::NULL) {
                log::warn!("onEnd callback threw: {:?}", e);
            }
        });
    }

    /// `callback(error)`: `Error` オブジェクト
    #[wasm_bindgen(js_name = "onError")]
    pub fn on_error(&self, callback: Function) {
        self.stream.on_error(move |err| {
            let err: JsValue = JsError::new(&err.to_string()).into();
            if let Err(e) = callback.call1(&JsValue::NULL, &err) {
                log::warn!("onError callback threw: {:?}", e);
            }
        });
    }

    /// ハンドルを開き、tick ループを開始する
    ///
    /// Promise はハンドルを開いた時点で解決する。以降のチャンクは `onData`、
    /// 終端は `onEnd`、失敗は `onError` に届く。
    /// 2 回目以降の呼び出しはハンドルが開くのを待つだけで、ループは増やさない。
    #[wasm_bindgen]
    pub fn open(&self) -> Promise {
        let stream = self.stream.clone();
        let loop_started = Rc::clone(&self.loop_started);
        future_to_promise(async move {
            stream.open().await.map_err(reject)?;
            if loop_started.replace(true) {
                return Ok(JsValue::UNDEFINED);
            }
            let runner = stream.clone();
            spawn_local(async move {
                // 失敗は onError に配送済み
                if let Err(e) = runner.run().await {
                    log::debug!("read stream on {} ended with {}", runner.path(), e);
                }
            });
            Ok(JsValue::UNDEFINED)
        })
    }

    /// 次のチャンクを 1 つ読む（コールバックは呼ばれない）
    ///
    /// # 戻り値
    /// `Promise<string | number[] | null>` 終端なら `null`
    #[wasm_bindgen(js_name = "nextChunk")]
    pub fn next_chunk(&self) -> Promise {
        let stream = self.stream.clone();
        future_to_promise(async move {
            let chunk = stream.next_chunk().await.map_err(reject)?;
            Ok(chunk.as_ref().map(chunk_to_js).unwrap_or(JsValue::NULL))
        })
    }

    #[wasm_bindgen]
    pub fn pause(&self) {
        self.stream.pause();
    }

    #[wasm_bindgen]
    pub fn resume(&self) {
        self.stream.resume();
    }

    /// ストリームを閉じる（冪等）。以降のイベントは破棄する
    #[wasm_bindgen]
    pub fn close(&self) -> Promise {
        let stream = self.stream.clone();
        future_to_promise(async move {
            stream.close().await.map_err(reject)?;
            Ok(JsValue::UNDEFINED)
        })
    }

    #[wasm_bindgen]
    pub fn cancel(&self) -> Promise {
        self.close()
    }

    /// `"idle" | "opening" | "open" | "ticking" | "paused" | "closed" | "error"`
    #[wasm_bindgen(getter)]
    pub fn state(&self) -> String {
        match self.stream.state() {
            ReadState::Idle => "idle",
            ReadState::Opening => "opening",
            ReadState::Open => "open",
            ReadState::Ticking => "ticking",
            ReadState::Paused => "paused",
            ReadState::Closed => "closed",
            ReadState::Errored => "error",
        }
        .to_string()
    }

    #[wasm_bindgen(getter)]
    pub fn id(&self) -> Option<String> {
        self.stream.id().map(|id| id.to_string())
    }

    #[wasm_bindgen(getter, js_name = "bytesRead")]
    pub fn bytes_read(&self) -> f64 {
        self.stream.bytes_read() as f64
    }
}

/// セッションのハンドル
#[wasm_bindgen]
pub struct SessionHandle {
    session: Session,
}

#[wasm_bindgen]
impl SessionHandle {
    #[wasm_bindgen(getter)]
    pub fn name(&self) -> String {
        self.session.name().to_string()
    }

    /// # 戻り値
    /// 追加したかどうか（既に含まれていれば `false`）
    #[wasm_bindgen(js_name = "addPath")]
    pub fn add_path(&self, path: &str) -> Result<bool, JsError> {
        Ok(self.session.add_path(path).map_err(FsError::from)?)
    }

    #[wasm_bindgen(js_name = "removePath")]
    pub fn remove_path(&self, path: &str) -> Result<bool, JsError> {
        Ok(self.session.remove_path(path).map_err(FsError::from)?)
    }

    /// 挿入順のパス一覧
    #[wasm_bindgen]
    pub fn list(&self) -> Array {
        self.session
            .list()
            .iter()
            .map(|p| JsValue::from_str(p))
            .collect()
    }

    /// レジストリから外す（ファイルは削除しない）
    #[wasm_bindgen]
    pub fn dispose(&self) {
        self.session.dispose();
    }

    #[wasm_bindgen(getter)]
    pub fn length(&self) -> u32 {
        self.session.len() as u32
    }
}

#[cfg(all(test, target_arch = "wasm32"))]
mod wasm_tests {
    use super::*;
    use js_sys::Reflect;
    use wasm_bindgen_test::*;

    fn blob_fs(native: Object) -> BlobFs {
        BlobFs::new(native, None).ok().expect("default config is valid")
    }

    #[wasm_bindgen_test]
    fn wasm_constructor_validates_config() {
        assert!(BlobFs::new(Object::new(), Some(r#"{"defaultBufferSize":0}"#.into())).is_err());
        assert!(BlobFs::new(Object::new(), Some("{}".into())).is_ok());
    }

    #[wasm_bindgen_test]
    fn wasm_session_handle_tracks_paths() {
        let fs = blob_fs(Object::new());
        let session = fs.session("upload");
        assert_eq!(session.name(), "upload");
        assert_eq!(session.add_path("/a").ok(), Some(true));
        assert_eq!(session.add_path("/a").ok(), Some(false));
        assert!(session.add_path("").is_err());

        // 同じ名前のハンドルは同じ集合を見る
        let again = fs.session("upload");
        assert_eq!(again.length(), 1);
        assert_eq!(again.list().get(0).as_string().as_deref(), Some("/a"));

        session.dispose();
        assert_eq!(fs.session("upload").length(), 0);
    }

    #[wasm_bindgen_test]
    fn wasm_dispatch_event_rejects_unknown_events() {
        let fs = blob_fs(Object::new());
        assert_eq!(fs.dispatch_event("rs-1", "data", "x".into()).ok(), Some(false));
        assert!(fs.dispatch_event("rs-1", "bogus", JsValue::UNDEFINED).is_err());
    }

    #[wasm_bindgen_test]
    fn wasm_read_stream_state_starts_idle() {
        let native = Object::new();
        Reflect::set(&native, &"CacheDir".into(), &"/cache".into()).unwrap();
        let fs = blob_fs(native);

        let stream = fs
            .read_stream("/a.txt", Some("ascii".into()), Some(4))
            .ok()
            .expect("valid arguments");
        assert_eq!(stream.state(), "idle");
        assert_eq!(stream.id(), None);
        assert!(fs.read_stream("/a.txt", Some("latin1".into()), None).is_err());

        let dirs = fs.dirs().ok().expect("dirs serialize");
        let cache = Reflect::get(&dirs, &"CacheDir".into()).unwrap();
        assert_eq!(cache.as_string().as_deref(), Some("/cache"));
    }
}
