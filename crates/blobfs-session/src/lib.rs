//! # blobfs-session
//!
//! 名前付きのファイルパス集合（セッション）
//!
//! 一時ファイルのまとまりなど、複数の操作で作られたファイルを
//! 名前で束ねて後からまとめて参照・削除するためのレジストリ。
//!
//! ## 性質
//!
//! ```text
//! get("x")            → []            未登録なら空の集合を作って登録する
//! add_path("x", "/a") → ["/a"]
//! add_path("x", "/a") → ["/a"]        重複は追加しない（順序も変えない）
//! dispose("x")        → 登録解除のみ。ディスク上のファイルには触れない
//! get("x")            → []            新しい空の集合
//! ```
//!
//! セッションはどのストリームの寿命にも縛られない。レジストリは
//! グローバル変数ではなく、呼び出し側が `Rc` で共有して渡す。

#![no_std]
extern crate alloc;

pub mod error;
pub mod registry;

pub use error::SessionError;
pub use registry::{Session, SessionRegistry};
