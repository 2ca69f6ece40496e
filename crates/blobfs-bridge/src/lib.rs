//! # blobfs-bridge
//!
//! ネイティブブリッジの契約
//!
//! ストリーム層とプラットフォームのファイル I/O の間にある唯一の継ぎ目。
//! ハンドルはネイティブ側だけが所有し、ストリームは識別子（非所有参照）だけを持つ。
//!
//! ## 構成
//!
//! ```text
//! WriteStream / ReadStream (blobfs-stream)
//!        │  識別子付きの呼び出し
//!        ▼
//! NativeBridge ── open_write / append_chunk / close_write
//!              ── open_read / tick / close_read
//!              ── events(): EventHub ◀── data / end / error（識別子付き）
//!
//! FileOps ── mkdir / stat / lstat / ls / cp / mv / unlink / exists
//!         ── create_file / write_file / read_file / scan_file / dirs
//! ```

mod error;
mod event;
mod id;
mod native;
mod ops;

pub use error::BridgeError;
pub use event::{EventHub, EventReceiver, StreamEvent};
pub use id::{IdAllocator, StreamId};
pub use native::NativeBridge;
pub use ops::{Dirs, EntryKind, Existence, FileOps, ScanTarget, StatRecord};

pub use blobfs_codec::{Encoding, WireData};
