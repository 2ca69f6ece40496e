//! ネイティブブリッジの契約
//!
//! ストリーム層はこの trait だけを通してプラットフォームのファイル I/O に到達する。
//! 実装はプラットフォーム側（JS ネイティブモジュール、ローカルファイルシステムなど）が提供する。

use async_trait::async_trait;
use blobfs_codec::{Encoding, WireData};

use crate::{BridgeError, EventHub, StreamId};

/// ストリーム用のネイティブプリミティブ
///
/// すべての操作は未知の識別子でも安全に呼び出せなければならず、
/// ハングやクラッシュではなく `BridgeError` で失敗を報告する。
///
/// シングルスレッド（WASM / JS イベントループ）前提のため `?Send`。
#[async_trait(?Send)]
pub trait NativeBridge {
    /// 書き込みハンドルを開く
    ///
    /// # 引数
    /// - `append`: `true` なら既存内容の末尾に追記、`false` なら切り詰める
    ///
    /// # エラー
    /// - `BridgeError::Io`: 親ディレクトリが存在しない、権限がない
    async fn open_write(
        &self,
        path: &str,
        encoding: Encoding,
        append: bool,
    ) -> Result<StreamId, BridgeError>;

    /// 書き込みハンドルにデータを追記する
    ///
    /// # エラー
    /// - `BridgeError::StreamClosed`: 識別子が未知、または既に閉じている
    /// - `BridgeError::Io`: 書き込み失敗（容量不足など）
    async fn append_chunk(&self, id: &StreamId, data: WireData) -> Result<(), BridgeError>;

    /// 書き込みハンドルを閉じる（冪等）
    async fn close_write(&self, id: &StreamId) -> Result<(), BridgeError>;

    /// 読み込みハンドルを開く
    ///
    /// # 引数
    /// - `buffer_size`: 1 チャンクあたりのバイト数（デコード前）
    ///
    /// # エラー
    /// - `BridgeError::NotFound`: パスが存在しない
    /// - `BridgeError::Io`: 権限・デバイスエラー
    async fn open_read(
        &self,
        path: &str,
        encoding: Encoding,
        buffer_size: usize,
    ) -> Result<StreamId, BridgeError>;

    /// 次のチャンクの配送を要求する
    ///
    /// 結果は `events()` の識別子チャンネルに `Data` / `End` / `Error` の
    /// いずれか 1 つとして届く。`End` / `Error` の後ハンドルは自動で閉じる。
    ///
    /// # エラー
    /// - `BridgeError::UnknownStream`: 識別子が未知
    fn tick(&self, id: &StreamId) -> Result<(), BridgeError>;

    /// 読み込みハンドルを閉じる（冪等。end / error 発行後でも安全）
    async fn close_read(&self, id: &StreamId) -> Result<(), BridgeError>;

    /// 識別子ごとのイベントチャンネル
    fn events(&self) -> &EventHub;
}
