//! 書き込みストリーム

use std::cell::Cell;
use std::rc::Rc;

use blobfs_bridge::{NativeBridge, StreamId};
use blobfs_codec::{encode, Encoding, WireData};
use futures::future::{FutureExt, LocalBoxFuture};
use serde_json::Value;

use crate::error::StreamError;
use crate::turnstile::{Ticket, Turnstile};

/// 書き込みストリームの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteState {
    /// 書き込みを受け付ける
    Open,
    /// close 済み。close より前に発行された書き込みの完了を待っている
    Closing,
    /// ハンドル解放済み
    Closed,
}

struct Inner {
    bridge: Rc<dyn NativeBridge>,
    id: StreamId,
    path: String,
    encoding: Encoding,
    append: bool,
    state: Cell<WriteState>,
    turnstile: Rc<Turnstile>,
    bytes_written: Cell<u64>,
}

/// 1 つのネイティブ書き込みハンドルに束縛された追記専用シンク
///
/// ## 順序保証
///
/// `write()` は呼び出した時点で順番が確定し、前の書き込みの ack（成功/失敗）を
/// 観測してから次の書き込みのバイトをネイティブ側に渡す。呼び出し側が
/// await せずに複数の `write()` を並行に発行しても、ファイルの内容は呼び出し順の連結になる。
///
/// ## 失敗時
///
/// `append_chunk` が失敗するとハンドルは使えないものとみなし、ストリームを閉じる。
/// エラーはその `write()` の呼び出し元に返し、自動再試行はしない。
///
/// `Clone` はハンドルを共有する（同じストリームへの参照が増えるだけ）。
#[derive(Clone)]
pub struct WriteStream {
    inner: Rc<Inner>,
}

impl WriteStream {
    /// ネイティブ書き込みハンドルを開く
    ///
    /// # 引数
    /// - `append`: `true` なら追記、`false` なら切り詰め
    ///
    /// # エラー
    /// - `StreamError::InvalidArgument`: パスが空
    /// - `StreamError::Io`: 親ディレクトリがない、権限がない
    pub async fn open(
        bridge: Rc<dyn NativeBridge>,
        path: &str,
        encoding: Encoding,
        append: bool,
    ) -> Result<Self, StreamError> {
        if path.is_empty() {
            return Err(StreamError::InvalidArgument(
                "cannot open a write stream with an empty path".into(),
            ));
        }

        let id = bridge.open_write(path, encoding, append).await?;
        log::debug!("write stream {} opened on {}", id, path);

        Ok(WriteStream {
            inner: Rc::new(Inner {
                bridge,
                id,
                path: path.to_string(),
                encoding,
                append,
                state: Cell::new(WriteState::Open),
                turnstile: Turnstile::new(),
                bytes_written: Cell::new(0),
            }),
        })
    }

    /// チャンクを書き込む
    ///
    /// 状態チェックとエンコードは呼び出した時点で同期的に行う。
    /// 返される future は前の書き込みが完了するまで待ってから追記する。
    /// 先に発行した future を駆動しないまま後の future だけを await すると進まないので、
    /// 並行に発行した場合は `join` するか executor に spawn すること
    /// （破棄された future は順番から外れる）。
    ///
    /// # 引数
    /// - `chunk`: utf8 / base64 なら文字列、ascii なら 0〜255 の数値配列
    ///
    /// # エラー
    /// - `StreamError::StreamClosed`: ストリームが開いていない
    /// - `StreamError::InvalidEncodingInput`: チャンクの形が不正（ストリームは開いたまま）
    /// - `StreamError::Io`: 追記失敗（ストリームは閉じる）
    pub fn write(&self, chunk: impl Into<Value>) -> LocalBoxFuture<'static, Result<(), StreamError>> {
        let inner = Rc::clone(&self.inner);
        let prepared = inner.prepare(&chunk.into());

        async move {
            let (ticket, data) = prepared?;
            ticket.wait().await;
            let result = inner.append(data).await;
            // ここで次の書き込みに順番が移る
            drop(ticket);
            result
        }
        .boxed_local()
    }

    /// ストリームを閉じる（冪等）
    ///
    /// 新しい書き込みは即座に拒否する。close より前に発行した書き込みは
    /// 順番通りに完了させてから、ネイティブハンドルを解放する。
    ///
    /// 待機中に future が破棄されても `Closing` のまま残るだけで、
    /// もう一度 `close()` を呼べば解放まで進む。
    pub async fn close(&self) -> Result<(), StreamError> {
        let inner = &self.inner;
        if inner.state.get() == WriteState::Closed {
            return Ok(());
        }
        inner.state.set(WriteState::Closing);

        let ticket = inner.turnstile.take();
        ticket.wait().await;

        if inner.state.get() == WriteState::Closed {
            // 途中の書き込み失敗か、先の close で解放済み
            return Ok(());
        }
        log::debug!(
            "write stream {} closed after {} bytes",
            inner.id,
            inner.bytes_written.get()
        );
        let released = inner.bridge.close_write(&inner.id).await;
        // 解放の応答を受けてから Closed にする
        inner.state.set(WriteState::Closed);
        drop(ticket);
        released?;
        Ok(())
    }

    pub fn id(&self) -> &StreamId {
        &self.inner.id
    }

    pub fn path(&self) -> &str {
        &self.inner.path
    }

    pub fn encoding(&self) -> Encoding {
        self.inner.encoding
    }

    pub fn is_append(&self) -> bool {
        self.inner.append
    }

    pub fn state(&self) -> WriteState {
        self.inner.state.get()
    }

    pub fn is_open(&self) -> bool {
        self.state() == WriteState::Open
    }

    /// ネイティブ側に受理されたバイト数（デコード後）
    pub fn bytes_written(&self) -> u64 {
        self.inner.bytes_written.get()
    }
}

impl Inner {
    /// 呼び出し時点での検証と整理券の取得
    fn prepare(self: &Rc<Self>, chunk: &Value) -> Result<(Ticket, WireData), StreamError> {
        if self.state.get() != WriteState::Open {
            return Err(StreamError::StreamClosed);
        }
        let data = encode(chunk, self.encoding)?;
        Ok((self.turnstile.take(), data))
    }

    async fn append(&self, data: WireData) -> Result<(), StreamError> {
        // 前の書き込みが失敗していれば、ここに来た時点で閉じている
        if self.state.get() == WriteState::Closed {
            return Err(StreamError::StreamClosed);
        }

        let bytes = data.decoded_len(self.encoding) as u64;
        match self.bridge.append_chunk(&self.id, data).await {
            Ok(()) => {
                self.bytes_written.set(self.bytes_written.get() + bytes);
                log::trace!("write stream {} appended {} bytes", self.id, bytes);
                Ok(())
            }
            Err(e) => {
                log::warn!("write stream {} failed, closing: {}", self.id, e);
                self.state.set(WriteState::Closed);
                if let Err(close_err) = self.bridge.close_write(&self.id).await {
                    log::debug!("releasing failed handle {}: {}", self.id, close_err);
                }
                Err(e.into())
            }
        }
    }
}
