//! # blobfs-stream
//!
//! ネイティブブリッジ上の順序付きストリーム
//!
//! ネイティブ側は識別子ごとのコールバック呼び出しとイベントしか提供しない。
//! このクレートはその上に、呼び出し順を守る書き込みと
//! tick 駆動の読み込みを組み立てる。
//!
//! ## データフロー
//!
//! ```text
//! 書き込み:
//!   1. WriteStream::open → openWrite → 識別子
//!   2. write(chunk) → Codec で検証・変換 → 整理券 → appendChunk
//!   3. close() → 先行する書き込みの完了を待つ → closeWrite
//!
//! 読み込み:
//!   1. ReadStream::open → openRead → 識別子 → EventHub を購読
//!   2. tick → data / end / error のどれか 1 つ → Codec でデコード → on_data
//!   3. end / error / close() → 購読解除（以降のイベントは破棄）
//! ```
//!
//! ## 並行性
//!
//! シングルスレッドの協調的スケジューリングを前提とする（`Rc` + `Cell`）。
//! 別々のストリームのイベントは任意に交互に届くが、
//! 1 つのストリームの中では書き込みもイベントも厳密に順番通り。

mod error;
mod read;
mod turnstile;
mod write;

pub use error::StreamError;
pub use read::{ReadState, ReadStream};
pub use write::{WriteState, WriteStream};

/// 読み込みストリームの既定のバッファサイズ（バイト）
pub const DEFAULT_BUFFER_SIZE: usize = 4096;
