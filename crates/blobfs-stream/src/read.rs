//! 読み込みストリーム
//!
//! ```text
//! idle ──open()──▶ open ──run()──▶ ticking ◀──resume()── paused
//!   │               │                │  └──pause()──────────▲
//!   │               │                ├── end   ──▶ closed
//!   └───────────────┴────────────────┴── error ──▶ errored
//!                        close() はどの状態からでも closed へ
//! ```
//!
//! 1 回の tick につき 1 つのイベントを待つ明示的なプル方式。
//! 消費側のコールバックが戻るまで次の tick を発行しないため、
//! デコード済みチャンクがメモリに溜まらない。

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use blobfs_bridge::{EventReceiver, NativeBridge, StreamEvent, StreamId};
use blobfs_codec::{decode, Chunk, Encoding};
use futures::StreamExt;

use crate::error::StreamError;
use crate::turnstile::Turnstile;

/// 読み込みストリームの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadState {
    /// 生成直後。ネイティブ I/O はまだ何もしていない
    Idle,
    /// `openRead` の応答待ち
    Opening,
    /// ハンドルを開いた。tick ループは動いていない
    Open,
    /// tick ループが動いている
    Ticking,
    /// 一時停止中（処理中の tick は完了させる）
    Paused,
    /// 終端に達した、または close された
    Closed,
    /// 失敗で終了した
    Errored,
}

impl ReadState {
    /// もう何も配送しない状態か
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReadState::Closed | ReadState::Errored)
    }
}

type DataHandler = Box<dyn FnMut(&Chunk)>;
type EndHandler = Box<dyn FnMut()>;
type ErrorHandler = Box<dyn FnMut(&StreamError)>;

#[derive(Default)]
struct Handlers {
    data: Vec<DataHandler>,
    end: Vec<EndHandler>,
    error: Vec<ErrorHandler>,
}

/// 1 回の tick の結果
enum Tick {
    Data(Chunk),
    End,
    /// 待っている間に close された（届いたイベントは破棄）
    Closed,
}

struct Inner {
    bridge: Rc<dyn NativeBridge>,
    path: String,
    encoding: Encoding,
    buffer_size: usize,
    state: Cell<ReadState>,
    id: RefCell<Option<StreamId>>,
    events: RefCell<Option<EventReceiver>>,
    handlers: RefCell<Handlers>,
    /// open と tick を呼び出し順に 1 つずつ実行する
    turnstile: Rc<Turnstile>,
    resume_waker: RefCell<Option<Waker>>,
    /// `run()` の tick ループが動いているか（ループは常に 1 本）
    running: Cell<bool>,
    bytes_read: Cell<u64>,
}

/// 1 つのネイティブ読み込みハンドルに束縛されたチャンク列
///
/// 生成してもネイティブ I/O は行わない。`open()`、`next_chunk()`、`run()` の
/// いずれかを最初に呼んだ時点でハンドルを開く。
///
/// ## 使い方
///
/// - コールバック: `on_data` / `on_end` / `on_error` を登録して `run()` を await する
/// - プル: `next_chunk()` を `None` が返るまで繰り返す（コールバックは呼ばれない）
///
/// `Clone` はハンドルを共有する。`run()` の実行中に別のクローンから
/// `pause()` / `resume()` / `close()` を呼べる。
#[derive(Clone)]
pub struct ReadStream {
    inner: Rc<Inner>,
}

impl ReadStream {
    /// 読み込みストリームを生成する（まだ開かない）
    ///
    /// # 引数
    /// - `buffer_size`: 1 チャンクの最大バイト数（デコード前）
    pub fn new(
        bridge: Rc<dyn NativeBridge>,
        path: &str,
        encoding: Encoding,
        buffer_size: usize,
    ) -> Self {
        ReadStream {
            inner: Rc::new(Inner {
                bridge,
                path: path.to_string(),
                encoding,
                buffer_size,
                state: Cell::new(ReadState::Idle),
                id: RefCell::new(None),
                events: RefCell::new(None),
                handlers: RefCell::new(Handlers::default()),
                turnstile: Turnstile::new(),
                resume_waker: RefCell::new(None),
                running: Cell::new(false),
                bytes_read: Cell::new(0),
            }),
        }
    }

    /// ネイティブ読み込みハンドルを開く（最初の成功以降は何もしない）
    ///
    /// 最初の tick より前に識別子のイベントチャンネルを購読する。
    ///
    /// # エラー
    /// - `StreamError::NotFound`: パスが存在しない
    /// - `StreamError::Io`: 権限・デバイスの失敗
    /// - `StreamError::InvalidArgument`: パスが空、またはバッファサイズが 0
    /// - `StreamError::StreamClosed`: close 済み、または失敗で終了済み
    ///
    /// 失敗するとストリームは `Errored` になる。
    pub async fn open(&self) -> Result<(), StreamError> {
        let ticket = self.inner.turnstile.take();
        ticket.wait().await;

        match self.inner.state.get() {
            ReadState::Idle => self.inner.open_now().await,
            ReadState::Closed | ReadState::Errored => Err(StreamError::StreamClosed),
            _ => Ok(()),
        }
    }

    /// チャンクを受け取るコールバックを登録する
    ///
    /// チャンクはネイティブ側が発行した順に、1 tick につき 1 つ届く。
    pub fn on_data(&self, handler: impl FnMut(&Chunk) + 'static) {
        self.inner.handlers.borrow_mut().data.push(Box::new(handler));
    }

    /// 終端に達したときのコールバックを登録する
    pub fn on_end(&self, handler: impl FnMut() + 'static) {
        self.inner.handlers.borrow_mut().end.push(Box::new(handler));
    }

    /// ストリームが失敗で終了したときのコールバックを登録する
    pub fn on_error(&self, handler: impl FnMut(&StreamError) + 'static) {
        self.inner.handlers.borrow_mut().error.push(Box::new(handler));
    }

    /// 次のチャンクを 1 つ読む
    ///
    /// 開いていなければ先に開く。tick を 1 回発行し、その結果を返す。
    ///
    /// # 戻り値
    /// - `Ok(Some(chunk))`: 次のチャンク
    /// - `Ok(None)`: 終端に達した、または close 済み
    pub async fn next_chunk(&self) -> Result<Option<Chunk>, StreamError> {
        let inner = &self.inner;
        let ticket = inner.turnstile.take();
        ticket.wait().await;

        if inner.state.get() == ReadState::Idle {
            inner.open_now().await?;
        }
        match inner.state.get() {
            ReadState::Closed => return Ok(None),
            ReadState::Errored => return Err(StreamError::StreamClosed),
            _ => {}
        }

        match inner.tick_once().await? {
            Tick::Data(chunk) => Ok(Some(chunk)),
            Tick::End | Tick::Closed => Ok(None),
        }
    }

    /// tick ループを回し、イベントを登録済みコールバックに配送する
    ///
    /// `on_data` のコールバックが戻ってから次の tick を発行する。
    /// 一時停止中は `resume()` か `close()` まで待つ。
    ///
    /// # 戻り値
    /// - `Ok(())`: 終端に達した、または close された
    /// - `Err(e)`: 失敗で終了した（`on_error` にも同じエラーを配送済み）
    ///
    /// 別の `run()` が既にループを回している間に呼ぶと、何もせずに `Ok(())` を返す。
    pub async fn run(&self) -> Result<(), StreamError> {
        let inner = &self.inner;
        if inner.running.replace(true) {
            log::debug!("tick loop on {} is already running", inner.path);
            return Ok(());
        }
        let _running = Running { inner };
        {
            let ticket = inner.turnstile.take();
            ticket.wait().await;
            if inner.state.get() == ReadState::Idle {
                if let Err(e) = inner.open_now().await {
                    inner.dispatch_error(&e);
                    return Err(e);
                }
            }
        }
        if inner.state.get() == ReadState::Open {
            inner.state.set(ReadState::Ticking);
        }

        loop {
            Resumed { inner }.await;

            let ticket = inner.turnstile.take();
            ticket.wait().await;
            match inner.state.get() {
                ReadState::Closed => return Ok(()),
                ReadState::Errored => return Err(StreamError::StreamClosed),
                _ => {}
            }
            let outcome = inner.tick_once().await;
            drop(ticket);

            match outcome {
                Ok(Tick::Data(chunk)) => inner.dispatch_data(&chunk),
                Ok(Tick::End) => {
                    inner.dispatch_end();
                    return Ok(());
                }
                Ok(Tick::Closed) => return Ok(()),
                Err(e) => {
                    inner.dispatch_error(&e);
                    return Err(e);
                }
            }
        }
    }

    /// 以降の tick を止める。処理中の tick は完了させ、そのイベントも配送する
    pub fn pause(&self) {
        let state = &self.inner.state;
        if matches!(state.get(), ReadState::Open | ReadState::Ticking) {
            state.set(ReadState::Paused);
            log::trace!("read stream on {} paused", self.inner.path);
        }
    }

    /// 一時停止を解除する
    pub fn resume(&self) {
        let inner = &self.inner;
        if inner.state.get() != ReadState::Paused {
            return;
        }
        inner.state.set(ReadState::Ticking);
        log::trace!("read stream on {} resumed", inner.path);
        if let Some(waker) = inner.resume_waker.borrow_mut().take() {
            waker.wake();
        }
    }

    /// ストリームを閉じる（冪等）
    ///
    /// 状態は即座に `Closed` になり、以降この識別子宛てに届いたイベントは破棄する。
    /// ネイティブハンドルの解放は `closeRead` に依頼する。
    pub async fn close(&self) -> Result<(), StreamError> {
        let inner = &self.inner;
        let previous = inner.state.replace(ReadState::Closed);
        if previous.is_terminal() {
            inner.state.set(previous);
            return Ok(());
        }

        inner.events.borrow_mut().take();
        let id = inner.id.borrow().clone();
        if let Some(id) = &id {
            inner.bridge.events().unsubscribe(id);
        }
        if let Some(waker) = inner.resume_waker.borrow_mut().take() {
            waker.wake();
        }

        // Opening 中なら open 側が応答を受け取った時点で解放する
        let Some(id) = id else {
            return Ok(());
        };
        log::debug!(
            "read stream {} closed after {} bytes",
            id,
            inner.bytes_read.get()
        );
        inner.bridge.close_read(&id).await?;
        Ok(())
    }

    /// `close()` の別名
    pub async fn cancel(&self) -> Result<(), StreamError> {
        self.close().await
    }

    pub fn state(&self) -> ReadState {
        self.inner.state.get()
    }

    /// `run()` の tick ループが動いているか
    pub fn is_running(&self) -> bool {
        self.inner.running.get()
    }

    /// ネイティブ側が発行した識別子（開く前は `None`）
    pub fn id(&self) -> Option<StreamId> {
        self.inner.id.borrow().clone()
    }

    pub fn path(&self) -> &str {
        &self.inner.path
    }

    pub fn encoding(&self) -> Encoding {
        self.inner.encoding
    }

    pub fn buffer_size(&self) -> usize {
        self.inner.buffer_size
    }

    /// 配送済みチャンクの合計バイト数（デコード後）
    pub fn bytes_read(&self) -> u64 {
        self.inner.bytes_read.get()
    }
}

impl Inner {
    /// 呼び出し側が整理券を持っている前提でハンドルを開く
    async fn open_now(&self) -> Result<(), StreamError> {
        if self.path.is_empty() {
            self.state.set(ReadState::Errored);
            return Err(StreamError::InvalidArgument(
                "cannot open a read stream with an empty path".into(),
            ));
        }
        if self.buffer_size == 0 {
            self.state.set(ReadState::Errored);
            return Err(StreamError::InvalidArgument(
                "buffer size must be greater than zero".into(),
            ));
        }

        self.state.set(ReadState::Opening);
        let id = match self
            .bridge
            .open_read(&self.path, self.encoding, self.buffer_size)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                if self.state.get() != ReadState::Closed {
                    self.state.set(ReadState::Errored);
                }
                log::debug!("failed to open {} for reading: {}", self.path, e);
                return Err(e.into());
            }
        };

        if self.state.get() == ReadState::Closed {
            // 応答待ちの間に close された
            if let Err(e) = self.bridge.close_read(&id).await {
                log::debug!("releasing read handle {}: {}", id, e);
            }
            return Err(StreamError::StreamClosed);
        }

        let rx = self.bridge.events().subscribe(&id);
        log::debug!(
            "read stream {} opened on {} ({}, buffer={})",
            id,
            self.path,
            self.encoding,
            self.buffer_size
        );
        *self.events.borrow_mut() = Some(rx);
        *self.id.borrow_mut() = Some(id);
        self.state.set(ReadState::Open);
        Ok(())
    }

    /// tick を 1 回発行し、その識別子のイベントを 1 つ待つ
    async fn tick_once(&self) -> Result<Tick, StreamError> {
        let Some(id) = self.id.borrow().clone() else {
            return Err(StreamError::StreamClosed);
        };
        let Some(mut rx) = self.events.borrow_mut().take() else {
            return Ok(Tick::Closed);
        };

        if let Err(e) = self.bridge.tick(&id) {
            return Err(self.fail(&id, e.into()).await);
        }
        let event = rx.next().await;

        if self.state.get() == ReadState::Closed {
            log::debug!("discarding event for closed read stream {}", id);
            return Ok(Tick::Closed);
        }
        *self.events.borrow_mut() = Some(rx);

        match event {
            Some(StreamEvent::Data(data)) => match decode(data, self.encoding) {
                Ok(chunk) => {
                    let bytes = chunk.byte_len(self.encoding) as u64;
                    self.bytes_read.set(self.bytes_read.get() + bytes);
                    log::trace!("read stream {} delivered {} bytes", id, bytes);
                    Ok(Tick::Data(chunk))
                }
                Err(e) => Err(self.fail(&id, e.into()).await),
            },
            Some(StreamEvent::End) => {
                // end でネイティブハンドルは自動的に閉じている
                self.detach(&id);
                self.state.set(ReadState::Closed);
                log::debug!(
                    "read stream {} reached end after {} bytes",
                    id,
                    self.bytes_read.get()
                );
                Ok(Tick::End)
            }
            Some(StreamEvent::Error(e)) => {
                self.detach(&id);
                self.state.set(ReadState::Errored);
                log::warn!("read stream {} failed: {}", id, e);
                Err(e.into())
            }
            None => {
                // 購読が外部から外された。ブリッジとの不整合
                let err = StreamError::UnknownStreamIdentifier(id.clone());
                Err(self.fail(&id, err).await)
            }
        }
    }

    /// 回復不能な失敗。ストリームを終了させハンドルの解放を依頼する
    async fn fail(&self, id: &StreamId, err: StreamError) -> StreamError {
        self.detach(id);
        self.state.set(ReadState::Errored);
        match &err {
            StreamError::UnknownStreamIdentifier(_) => {
                log::error!("read stream {} lost sync with the native bridge", id)
            }
            other => log::warn!("read stream {} failed: {}", id, other),
        }
        if let Err(e) = self.bridge.close_read(id).await {
            log::debug!("releasing read handle {}: {}", id, e);
        }
        err
    }

    fn detach(&self, id: &StreamId) {
        self.events.borrow_mut().take();
        self.bridge.events().unsubscribe(id);
    }

    // コールバックの中から新しいコールバックを登録できるよう、
    // 呼び出し中はリストを取り出しておく

    fn dispatch_data(&self, chunk: &Chunk) {
        let mut list = std::mem::take(&mut self.handlers.borrow_mut().data);
        for handler in list.iter_mut() {
            handler(chunk);
        }
        let mut handlers = self.handlers.borrow_mut();
        list.append(&mut handlers.data);
        handlers.data = list;
    }

    fn dispatch_end(&self) {
        let mut list = std::mem::take(&mut self.handlers.borrow_mut().end);
        for handler in list.iter_mut() {
            handler();
        }
        let mut handlers = self.handlers.borrow_mut();
        list.append(&mut handlers.end);
        handlers.end = list;
    }

    fn dispatch_error(&self, err: &StreamError) {
        let mut list = std::mem::take(&mut self.handlers.borrow_mut().error);
        for handler in list.iter_mut() {
            handler(err);
        }
        let mut handlers = self.handlers.borrow_mut();
        list.append(&mut handlers.error);
        handlers.error = list;
    }
}

/// 一時停止が解除されるまで待つ
struct Resumed<'a> {
    inner: &'a Inner,
}

impl Future for Resumed<'_> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.inner.state.get() == ReadState::Paused {
            *self.inner.resume_waker.borrow_mut() = Some(cx.waker().clone());
            Poll::Pending
        } else {
            Poll::Ready(())
        }
    }
}

/// `run()` を抜けるとき（破棄を含む）にループ実行中の印を外す
struct Running<'a> {
    inner: &'a Inner,
}

impl Drop for Running<'_> {
    fn drop(&mut self) {
        self.inner.running.set(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blobfs_native::LocalBridge;
    use futures::executor::block_on;

    fn bridge() -> Rc<LocalBridge> {
        Rc::new(LocalBridge::new())
    }

    #[test]
    fn test_new_is_lazy() {
        let bridge = bridge();
        let stream = ReadStream::new(bridge.clone(), "/definitely/not/here", Encoding::Utf8, 16);
        assert_eq!(stream.state(), ReadState::Idle);
        assert_eq!(stream.id(), None);
        assert_eq!(bridge.open_readers(), 0);
    }

    #[test]
    fn test_open_failure_leaves_errored() {
        let stream = ReadStream::new(bridge(), "/definitely/not/here", Encoding::Utf8, 16);
        let result = block_on(stream.open());
        assert!(matches!(result, Err(StreamError::NotFound(_))));
        assert_eq!(stream.state(), ReadState::Errored);
        // 失敗後の close は何もしない
        assert_eq!(block_on(stream.close()), Ok(()));
        assert_eq!(stream.state(), ReadState::Errored);
    }

    #[test]
    fn test_zero_buffer_rejected() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let stream = ReadStream::new(
            bridge(),
            file.path().to_str().unwrap(),
            Encoding::Ascii,
            0,
        );
        assert!(matches!(
            block_on(stream.open()),
            Err(StreamError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_open_is_idempotent() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let bridge = bridge();
        let stream = ReadStream::new(bridge.clone(), file.path().to_str().unwrap(), Encoding::Utf8, 8);
        block_on(async {
            stream.open().await.unwrap();
            let id = stream.id();
            stream.open().await.unwrap();
            assert_eq!(stream.id(), id);
        });
        assert_eq!(bridge.open_readers(), 1);
        assert_eq!(stream.state(), ReadState::Open);
    }

    #[test]
    fn test_pause_only_from_active_states() {
        let stream = ReadStream::new(bridge(), "/x", Encoding::Utf8, 8);
        stream.pause();
        assert_eq!(stream.state(), ReadState::Idle);
        stream.resume();
        assert_eq!(stream.state(), ReadState::Idle);
    }
}
