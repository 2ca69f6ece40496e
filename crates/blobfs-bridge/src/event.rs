//! 識別子ごとのイベントチャンネル
//!
//! ネイティブ側の読み込みイベント（data / end / error）は一本のチャンネルで届き、
//! ストリーム識別子だけで振り分けられる。`EventHub` は識別子ごとに
//! 受信キューを用意し、イベントを到着順に積む。
//!
//! ```text
//! native tick ──▶ EventHub::emit(id, event)
//!                    │
//!                    ├─ id が購読中 ──▶ そのストリームの受信キュー（FIFO）
//!                    └─ id が未購読 ──▶ 破棄（close 後に届いた遅延イベント）
//! ```

use std::cell::RefCell;
use std::collections::HashMap;

use blobfs_codec::WireData;
use futures::channel::mpsc;

use crate::{BridgeError, StreamId};

/// 読み込みストリームのイベント
///
/// 1 回の tick に対してネイティブ側はこのうち 1 つだけを発行する。
/// `End` と `Error` の後、ネイティブハンドルは自動的に閉じられている。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Data(WireData),
    End,
    Error(BridgeError),
}

/// 1 ストリーム分のイベント受信キュー
pub type EventReceiver = mpsc::UnboundedReceiver<StreamEvent>;

/// 識別子でイベントを振り分けるハブ
///
/// WASM はシングルスレッドのため内部可変性は `RefCell` で十分。
#[derive(Debug, Default)]
pub struct EventHub {
    routes: RefCell<HashMap<StreamId, mpsc::UnboundedSender<StreamEvent>>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// 識別子の受信キューを作成して返す
    ///
    /// 既存の購読があれば置き換える（古い受信側は終端を受け取る）。
    /// 最初の tick を発行する前に呼ぶこと。
    pub fn subscribe(&self, id: &StreamId) -> EventReceiver {
        let (tx, rx) = mpsc::unbounded();
        if self.routes.borrow_mut().insert(id.clone(), tx).is_some() {
            log::warn!("stream {} subscribed twice, previous receiver dropped", id);
        }
        rx
    }

    /// 購読を解除する。以後この識別子宛てのイベントは破棄される
    ///
    /// # 戻り値
    /// 購読が存在したかどうか
    pub fn unsubscribe(&self, id: &StreamId) -> bool {
        self.routes.borrow_mut().remove(id).is_some()
    }

    /// イベントを識別子の受信キューに積む
    ///
    /// # 戻り値
    /// 配送できたかどうか。未購読・受信側破棄済みなら `false`（イベントは破棄）
    pub fn emit(&self, id: &StreamId, event: StreamEvent) -> bool {
        let mut routes = self.routes.borrow_mut();
        let Some(tx) = routes.get(id) else {
            log::debug!("discarding event for unsubscribed stream {}", id);
            return false;
        };
        if tx.unbounded_send(event).is_err() {
            // 受信側が既に破棄されている
            routes.remove(id);
            log::debug!("discarding event for dropped stream {}", id);
            return false;
        }
        true
    }

    pub fn is_subscribed(&self, id: &StreamId) -> bool {
        self.routes.borrow().contains_key(id)
    }

    /// 購読中のストリーム数
    pub fn len(&self) -> usize {
        self.routes.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.borrow().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use futures::StreamExt;

    #[test]
    fn test_events_arrive_in_order() {
        let hub = EventHub::new();
        let id = StreamId::new("rs-1");
        let mut rx = hub.subscribe(&id);

        assert!(hub.emit(&id, StreamEvent::Data(WireData::Text("a".into()))));
        assert!(hub.emit(&id, StreamEvent::Data(WireData::Text("b".into()))));
        assert!(hub.emit(&id, StreamEvent::End));

        block_on(async {
            assert_eq!(rx.next().await, Some(StreamEvent::Data(WireData::Text("a".into()))));
            assert_eq!(rx.next().await, Some(StreamEvent::Data(WireData::Text("b".into()))));
            assert_eq!(rx.next().await, Some(StreamEvent::End));
        });
    }

    #[test]
    fn test_unknown_stream_is_discarded() {
        let hub = EventHub::new();
        assert!(!hub.emit(&StreamId::new("nobody"), StreamEvent::End));
    }

    #[test]
    fn test_streams_are_isolated() {
        let hub = EventHub::new();
        let a = StreamId::new("rs-a");
        let b = StreamId::new("rs-b");
        let mut rx_a = hub.subscribe(&a);
        let mut rx_b = hub.subscribe(&b);

        hub.emit(&b, StreamEvent::End);
        hub.emit(&a, StreamEvent::Data(WireData::Bytes(vec![1])));

        block_on(async {
            assert_eq!(rx_a.next().await, Some(StreamEvent::Data(WireData::Bytes(vec![1]))));
            assert_eq!(rx_b.next().await, Some(StreamEvent::End));
        });
    }

    #[test]
    fn test_unsubscribe_ends_receiver() {
        let hub = EventHub::new();
        let id = StreamId::new("rs-1");
        let mut rx = hub.subscribe(&id);
        assert!(hub.unsubscribe(&id));
        assert!(!hub.emit(&id, StreamEvent::End));
        assert_eq!(block_on(rx.next()), None);
        assert!(hub.is_empty());
    }

    #[test]
    fn test_dropped_receiver_removes_route() {
        let hub = EventHub::new();
        let id = StreamId::new("rs-1");
        drop(hub.subscribe(&id));
        assert!(!hub.emit(&id, StreamEvent::End));
        assert!(!hub.is_subscribed(&id));
    }
}
