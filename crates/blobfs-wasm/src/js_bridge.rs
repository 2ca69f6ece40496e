//! JS のネイティブモジュールによるブリッジ実装
//!
//! ホストアプリが渡すネイティブモジュールは Node 形式のコールバックを取る:
//!
//! ```text
//! writeStream(path, encoding, append, cb(err, streamId))
//! writeChunk(streamId, text, cb(err))          writeArrayChunk(streamId, bytes, cb(err))
//! closeStream(streamId, cb(err))
//! readStream(path, encoding, bufferSize, cb(err, streamId))
//! readStreamTick(streamId)                     同期。結果は dispatchEvent で届く
//! closeReadStream(streamId, cb(err))
//!
//! mkdir / stat / lstat / ls / cp / mv / unlink / readFile / scanFile   cb(err, result)
//! createFile(path, text, encoding, cb)         createFileASCII(path, bytes, cb)
//! writeFile(path, encoding, text, cb)          writeFileArray(path, bytes, cb)
//! exists(path, cb(exists, isDir))
//! DocumentDir / CacheDir / ... / DCIMDir       定数プロパティ
//! ```
//!
//! 読み込みイベントはネイティブ側の一本のイベントチャンネルから
//! `BlobFs.dispatchEvent(streamId, event, detail)` で戻ってくる。

use std::cell::RefCell;
use std::collections::HashMap;

use async_trait::async_trait;
use blobfs_bridge::{
    BridgeError, Dirs, Encoding, EventHub, Existence, FileOps, NativeBridge, ScanTarget,
    StatRecord, StreamEvent, StreamId, WireData,
};
use futures::channel::oneshot;
use js_sys::{Array, Function, Object, Reflect};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;

use crate::convert::{bytes_to_array, from_js, js_error, js_to_wire, to_js, wire_to_js};

/// JS のネイティブモジュールをラップしたブリッジ
pub struct JsBridge {
    module: Object,
    events: EventHub,
    /// 開いている読み込みハンドルのエンコーディング（data の変換に使う）
    readers: RefCell<HashMap<StreamId, Encoding>>,
}

impl JsBridge {
    pub fn new(module: Object) -> Self {
        JsBridge {
            module,
            events: EventHub::new(),
            readers: RefCell::new(HashMap::new()),
        }
    }

    /// ネイティブ側の読み込みイベントを受け取り、識別子の受信キューに積む
    ///
    /// # 引数
    /// - `event`: `"data"` / `"end"` / `"error"`
    /// - `detail`: data ならチャンク、error ならエラー値
    ///
    /// # 戻り値
    /// 配送できたかどうか（close 済みのストリーム宛てなら `false`）
    pub fn dispatch(
        &self,
        id: &StreamId,
        event: &str,
        detail: &JsValue,
    ) -> Result<bool, BridgeError> {
        let event = match event {
            "data" => {
                let Some(encoding) = self.readers.borrow().get(id).copied() else {
                    log::debug!("discarding data for unknown read handle {}", id);
                    return Ok(false);
                };
                match js_to_wire(detail, encoding) {
                    Ok(data) => StreamEvent::Data(data),
                    Err(e) => {
                        // 形の合わない data はストリームを失敗させる。
                        // ネイティブ側のハンドルは開いたままなので解放を依頼する
                        self.readers.borrow_mut().remove(id);
                        self.release_read(id);
                        StreamEvent::Error(e)
                    }
                }
            }
            "end" => {
                self.readers.borrow_mut().remove(id);
                StreamEvent::End
            }
            "error" => {
                self.readers.borrow_mut().remove(id);
                StreamEvent::Error(js_error(detail))
            }
            other => {
                return Err(BridgeError::InvalidInput(format!(
                    "unknown stream event `{}`",
                    other
                )))
            }
        };
        Ok(self.events.emit(id, event))
    }

    /// 結果を待たずに closeReadStream を発行する
    fn release_read(&self, id: &StreamId) {
        let label = id.to_string();
        let callback = Closure::once_into_js(move |err: JsValue| {
            if !(err.is_null() || err.is_undefined()) {
                log::debug!("releasing read handle {}: {:?}", label, err);
            }
        });
        let released = self.method("closeReadStream").and_then(|func| {
            func.call2(&self.module, &id_arg(id), &callback)
                .map_err(|e| js_error(&e))
        });
        match released {
            Ok(_) => log::debug!("released read handle {} after malformed data", id),
            Err(e) => log::warn!("could not release read handle {}: {}", id, e),
        }
    }

    fn method(&self, name: &str) -> Result<Function, BridgeError> {
        Reflect::get(&self.module, &name.into())
            .ok()
            .and_then(|f| f.dyn_into::<Function>().ok())
            .ok_or_else(|| BridgeError::Unsupported(name.to_string()))
    }

    /// メソッドを呼び、コールバックの最初の 2 引数を待つ
    async fn invoke(
        &self,
        name: &str,
        args: &[JsValue],
    ) -> Result<(JsValue, JsValue), BridgeError> {
        let func = self.method(name)?;
        let (tx, rx) = oneshot::channel();
        let callback = Closure::once_into_js(move |first: JsValue, second: JsValue| {
            // 呼び出し側が先に破棄されていれば結果は捨てる
            let _ = tx.send((first, second));
        });

        let call_args: Array = args.iter().collect();
        call_args.push(&callback);
        Reflect::apply(&func, &self.module, &call_args).map_err(|e| js_error(&e))?;

        rx.await
            .map_err(|_| BridgeError::io(format!("`{}` dropped its callback", name)))
    }

    /// Node 形式 `cb(err, result)` のメソッドを呼ぶ
    async fn call(&self, name: &str, args: &[JsValue]) -> Result<JsValue, BridgeError> {
        let (err, value) = self.invoke(name, args).await?;
        if err.is_null() || err.is_undefined() {
            Ok(value)
        } else {
            log::debug!("native `{}` failed: {:?}", name, err);
            Err(js_error(&err))
        }
    }

    async fn call_for_id(&self, name: &str, args: &[JsValue]) -> Result<StreamId, BridgeError> {
        self.call(name, args)
            .await?
            .as_string()
            .map(StreamId::new)
            .ok_or_else(|| BridgeError::io(format!("`{}` returned no stream id", name)))
    }

    fn constant(&self, name: &str) -> Option<String> {
        Reflect::get(&self.module, &name.into())
            .ok()
            .and_then(|v| v.as_string())
    }
}

fn id_arg(id: &StreamId) -> JsValue {
    JsValue::from_str(id.as_str())
}

#[async_trait(?Send)]
impl NativeBridge for JsBridge {
    async fn open_write(
        &self,
        path: &str,
        encoding: Encoding,
        append: bool,
    ) -> Result<StreamId, BridgeError> {
        let args = [
            JsValue::from_str(path),
            JsValue::from_str(encoding.as_str()),
            JsValue::from_bool(append),
        ];
        self.call_for_id("writeStream", &args).await
    }

    async fn append_chunk(&self, id: &StreamId, data: WireData) -> Result<(), BridgeError> {
        let method = match data {
            WireData::Text(_) => "writeChunk",
            WireData::Bytes(_) => "writeArrayChunk",
        };
        self.call(method, &[id_arg(id), wire_to_js(&data)]).await?;
        Ok(())
    }

    async fn close_write(&self, id: &StreamId) -> Result<(), BridgeError> {
        self.call("closeStream", &[id_arg(id)]).await?;
        Ok(())
    }

    async fn open_read(
        &self,
        path: &str,
        encoding: Encoding,
        buffer_size: usize,
    ) -> Result<StreamId, BridgeError> {
        let args = [
            JsValue::from_str(path),
            JsValue::from_str(encoding.as_str()),
            JsValue::from_f64(buffer_size as f64),
        ];
        let id = self.call_for_id("readStream", &args).await?;
        self.readers.borrow_mut().insert(id.clone(), encoding);
        Ok(id)
    }

    fn tick(&self, id: &StreamId) -> Result<(), BridgeError> {
        if !self.readers.borrow().contains_key(id) {
            return Err(BridgeError::UnknownStream(id.clone()));
        }
        self.method("readStreamTick")?
            .call1(&self.module, &id_arg(id))
            .map_err(|e| js_error(&e))?;
        Ok(())
    }

    async fn close_read(&self, id: &StreamId) -> Result<(), BridgeError> {
        self.readers.borrow_mut().remove(id);
        self.call("closeReadStream", &[id_arg(id)]).await?;
        Ok(())
    }

    fn events(&self) -> &EventHub {
        &self.events
    }
}

#[async_trait(?Send)]
impl FileOps for JsBridge {
    async fn mkdir(&self, path: &str) -> Result<(), BridgeError> {
        self.call("mkdir", &[JsValue::from_str(path)]).await?;
        Ok(())
    }

    async fn stat(&self, path: &str) -> Result<StatRecord, BridgeError> {
        from_js(&self.call("stat", &[JsValue::from_str(path)]).await?)
    }

    async fn lstat(&self, path: &str) -> Result<Vec<StatRecord>, BridgeError> {
        from_js(&self.call("lstat", &[JsValue::from_str(path)]).await?)
    }

    async fn ls(&self, path: &str) -> Result<Vec<String>, BridgeError> {
        from_js(&self.call("ls", &[JsValue::from_str(path)]).await?)
    }

    async fn cp(&self, path: &str, dest: &str) -> Result<(), BridgeError> {
        self.call("cp", &[JsValue::from_str(path), JsValue::from_str(dest)]).await?;
        Ok(())
    }

    async fn mv(&self, path: &str, dest: &str) -> Result<(), BridgeError> {
        self.call("mv", &[JsValue::from_str(path), JsValue::from_str(dest)]).await?;
        Ok(())
    }

    async fn unlink(&self, path: &str) -> Result<(), BridgeError> {
        self.call("unlink", &[JsValue::from_str(path)]).await?;
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<Existence, BridgeError> {
        // exists だけはコールバックが (exists, isDir)
        let (exists, is_dir) = self.invoke("exists", &[JsValue::from_str(path)]).await?;
        Ok(Existence {
            exists: exists.is_truthy(),
            is_dir: is_dir.is_truthy(),
        })
    }

    async fn create_file(
        &self,
        path: &str,
        data: WireData,
        encoding: Encoding,
    ) -> Result<(), BridgeError> {
        match data {
            WireData::Text(text) => {
                let args = [
                    JsValue::from_str(path),
                    JsValue::from(text),
                    JsValue::from_str(encoding.as_str()),
                ];
                self.call("createFile", &args).await?
            }
            WireData::Bytes(bytes) => {
                let args = [JsValue::from_str(path), JsValue::from(bytes_to_array(&bytes))];
                self.call("createFileASCII", &args).await?
            }
        };
        Ok(())
    }

    async fn write_file(
        &self,
        path: &str,
        encoding: Encoding,
        data: WireData,
    ) -> Result<(), BridgeError> {
        match data {
            WireData::Text(text) => {
                let args = [
                    JsValue::from_str(path),
                    JsValue::from_str(encoding.as_str()),
                    JsValue::from(text),
                ];
                self.call("writeFile", &args).await?
            }
            WireData::Bytes(bytes) => {
                let args = [JsValue::from_str(path), JsValue::from(bytes_to_array(&bytes))];
                self.call("writeFileArray", &args).await?
            }
        };
        Ok(())
    }

    async fn read_file(&self, path: &str, encoding: Encoding) -> Result<WireData, BridgeError> {
        let args = [JsValue::from_str(path), JsValue::from_str(encoding.as_str())];
        js_to_wire(&self.call("readFile", &args).await?, encoding)
    }

    async fn scan_file(&self, targets: &[ScanTarget]) -> Result<(), BridgeError> {
        self.call("scanFile", &[to_js(&targets)?]).await?;
        Ok(())
    }

    fn dirs(&self) -> Dirs {
        Dirs {
            document_dir: self.constant("DocumentDir"),
            cache_dir: self.constant("CacheDir"),
            picture_dir: self.constant("PictureDir"),
            music_dir: self.constant("MusicDir"),
            movie_dir: self.constant("MovieDir"),
            download_dir: self.constant("DownloadDir"),
            dcim_dir: self.constant("DCIMDir"),
        }
    }
}
