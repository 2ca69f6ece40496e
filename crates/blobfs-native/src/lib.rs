//! # blobfs-native
//!
//! ローカルファイルシステムによるネイティブブリッジ実装
//!
//! モバイルのネイティブモジュールと同じ契約（`NativeBridge` + `FileOps`）を
//! `std::fs` の上に実装する。デスクトップでの利用とテストで使う。
//!
//! ## ハンドル管理
//!
//! ```text
//! LocalBridge
//!   ├── writers: StreamId → (File, Encoding)        open_write で登録、close / 失敗で解放
//!   ├── readers: StreamId → ChunkReader             open_read で登録、close / end / error で解放
//!   └── events:  EventHub                           tick の結果を識別子付きで配送
//! ```
//!
//! tick は同期的にファイルを読み、結果のイベントをその場で `EventHub` に積む。

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use async_trait::async_trait;
use blobfs_bridge::{
    BridgeError, Dirs, Encoding, EventHub, IdAllocator, NativeBridge, StreamEvent, StreamId,
    WireData,
};

mod ops;
mod reader;

use reader::ChunkReader;

/// 開いている書き込みハンドル
struct Writer {
    file: File,
    encoding: Encoding,
}

/// `std::fs` によるネイティブブリッジ
pub struct LocalBridge {
    events: EventHub,
    write_ids: IdAllocator,
    read_ids: IdAllocator,
    writers: RefCell<HashMap<StreamId, Writer>>,
    readers: RefCell<HashMap<StreamId, ChunkReader>>,
    dirs: Dirs,
}

impl LocalBridge {
    /// 既知ディレクトリとして一時ディレクトリだけを持つブリッジを生成する
    pub fn new() -> Self {
        let temp = std::env::temp_dir().to_string_lossy().into_owned();
        Self::with_dirs(Dirs {
            cache_dir: Some(temp),
            ..Dirs::default()
        })
    }

    pub fn with_dirs(dirs: Dirs) -> Self {
        LocalBridge {
            events: EventHub::new(),
            write_ids: IdAllocator::new("blobfs-ws-"),
            read_ids: IdAllocator::new("blobfs-rs-"),
            writers: RefCell::new(HashMap::new()),
            readers: RefCell::new(HashMap::new()),
            dirs,
        }
    }

    /// 開いている書き込みハンドル数
    pub fn open_writers(&self) -> usize {
        self.writers.borrow().len()
    }

    /// 開いている読み込みハンドル数
    pub fn open_readers(&self) -> usize {
        self.readers.borrow().len()
    }
}

impl Default for LocalBridge {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait(?Send)]
impl NativeBridge for LocalBridge {
    async fn open_write(
        &self,
        path: &str,
        encoding: Encoding,
        append: bool,
    ) -> Result<StreamId, BridgeError> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() && !parent.is_dir() {
                return Err(BridgeError::io(format!(
                    "parent directory does not exist: {}",
                    parent.display()
                )));
            }
        }

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .append(append)
            .truncate(!append)
            .open(path)?;

        let id = self.write_ids.allocate();
        log::debug!("opened write handle {} for {} ({}, append={})", id, path, encoding, append);
        self.writers
            .borrow_mut()
            .insert(id.clone(), Writer { file, encoding });
        Ok(id)
    }

    async fn append_chunk(&self, id: &StreamId, data: WireData) -> Result<(), BridgeError> {
        let mut writers = self.writers.borrow_mut();
        let writer = writers.get_mut(id).ok_or(BridgeError::StreamClosed)?;
        let bytes = data.into_bytes(writer.encoding)?;

        if let Err(e) = writer.file.write_all(&bytes) {
            // 部分書き込み後のハンドルは信用しない
            writers.remove(id);
            log::warn!("write handle {} failed and was released: {}", id, e);
            return Err(e.into());
        }
        log::trace!("appended {} bytes to {}", bytes.len(), id);
        Ok(())
    }

    async fn close_write(&self, id: &StreamId) -> Result<(), BridgeError> {
        let Some(mut writer) = self.writers.borrow_mut().remove(id) else {
            return Ok(());
        };
        log::debug!("closed write handle {}", id);
        writer.file.flush()?;
        Ok(())
    }

    async fn open_read(
        &self,
        path: &str,
        encoding: Encoding,
        buffer_size: usize,
    ) -> Result<StreamId, BridgeError> {
        let file = File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => BridgeError::NotFound(path.to_string()),
            _ => BridgeError::from(e),
        })?;
        if file.metadata()?.is_dir() {
            return Err(BridgeError::io(format!("{} is a directory", path)));
        }

        let id = self.read_ids.allocate();
        log::debug!("opened read handle {} for {} ({}, buffer={})", id, path, encoding, buffer_size);
        self.readers
            .borrow_mut()
            .insert(id.clone(), ChunkReader::new(file, encoding, buffer_size));
        Ok(id)
    }

    fn tick(&self, id: &StreamId) -> Result<(), BridgeError> {
        let outcome = {
            let mut readers = self.readers.borrow_mut();
            let reader = readers
                .get_mut(id)
                .ok_or_else(|| BridgeError::UnknownStream(id.clone()))?;
            reader.next_chunk()
        };

        let event = match outcome {
            Ok(Some(data)) => StreamEvent::Data(data),
            Ok(None) => {
                self.readers.borrow_mut().remove(id);
                log::debug!("read handle {} reached end of file", id);
                StreamEvent::End
            }
            Err(e) => {
                self.readers.borrow_mut().remove(id);
                log::warn!("read handle {} failed: {}", id, e);
                StreamEvent::Error(e)
            }
        };
        self.events.emit(id, event);
        Ok(())
    }

    async fn close_read(&self, id: &StreamId) -> Result<(), BridgeError> {
        if self.readers.borrow_mut().remove(id).is_some() {
            log::debug!("closed read handle {}", id);
        }
        Ok(())
    }

    fn events(&self) -> &EventHub {
        &self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use futures::StreamExt;

    #[test]
    fn test_write_then_close_releases_handle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        let path = path.to_str().unwrap();
        let bridge = LocalBridge::new();

        block_on(async {
            let id = bridge.open_write(path, Encoding::Utf8, false).await.unwrap();
            bridge.append_chunk(&id, WireData::Text("hello".into())).await.unwrap();
            bridge.append_chunk(&id, WireData::Text(" world".into())).await.unwrap();
            assert_eq!(bridge.open_writers(), 1);
            bridge.close_write(&id).await.unwrap();
            assert_eq!(bridge.open_writers(), 0);
            // 冪等
            bridge.close_write(&id).await.unwrap();
            // 閉じた後の追記は StreamClosed
            assert_eq!(
                bridge.append_chunk(&id, WireData::Text("x".into())).await,
                Err(BridgeError::StreamClosed)
            );
        });

        assert_eq!(std::fs::read_to_string(path).unwrap(), "hello world");
    }

    #[test]
    fn test_append_flag_extends_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.txt");
        std::fs::write(&path, "one").unwrap();
        let path = path.to_str().unwrap();
        let bridge = LocalBridge::new();

        block_on(async {
            let id = bridge.open_write(path, Encoding::Utf8, true).await.unwrap();
            bridge.append_chunk(&id, WireData::Text("two".into())).await.unwrap();
            bridge.close_write(&id).await.unwrap();
        });
        assert_eq!(std::fs::read_to_string(path).unwrap(), "onetwo");
    }

    #[test]
    fn test_open_write_missing_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("a.txt");
        let bridge = LocalBridge::new();
        let result = block_on(bridge.open_write(path.to_str().unwrap(), Encoding::Utf8, false));
        assert!(matches!(result, Err(BridgeError::Io(_))));
    }

    #[test]
    fn test_open_read_missing_file() {
        let bridge = LocalBridge::new();
        let result = block_on(bridge.open_read("/definitely/not/here", Encoding::Utf8, 16));
        assert!(matches!(result, Err(BridgeError::NotFound(_))));
    }

    #[test]
    fn test_tick_unknown_stream() {
        let bridge = LocalBridge::new();
        let id = StreamId::new("blobfs-rs-404");
        assert_eq!(bridge.tick(&id), Err(BridgeError::UnknownStream(id.clone())));
        // close は未知の識別子でも安全
        assert_eq!(block_on(bridge.close_read(&id)), Ok(()));
    }

    #[test]
    fn test_tick_emits_one_event_per_request() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ten.bin");
        std::fs::write(&path, b"0123456789").unwrap();
        let bridge = LocalBridge::new();

        block_on(async {
            let id = bridge
                .open_read(path.to_str().unwrap(), Encoding::Ascii, 4)
                .await
                .unwrap();
            let mut rx = bridge.events().subscribe(&id);

            let mut sizes = Vec::new();
            loop {
                bridge.tick(&id).unwrap();
                match rx.next().await.unwrap() {
                    StreamEvent::Data(data) => sizes.push(data.len()),
                    StreamEvent::End => break,
                    StreamEvent::Error(e) => panic!("unexpected error: {}", e),
                }
            }
            assert_eq!(sizes, vec![4, 4, 2]);
            // end で自動的に閉じる
            assert_eq!(bridge.open_readers(), 0);
            assert!(matches!(bridge.tick(&id), Err(BridgeError::UnknownStream(_))));
        });
    }
}
