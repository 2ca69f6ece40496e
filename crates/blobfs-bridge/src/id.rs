//! ストリーム識別子

use std::cell::Cell;
use std::fmt;

/// ネイティブ側が発行する不透明なストリーム識別子
///
/// ハンドルが開いている間は一意。以降の操作とイベントはすべてこの値で振り分けられる。
/// 中身の文字列を解析してはならない。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(String);

impl StreamId {
    pub fn new(id: impl Into<String>) -> Self {
        StreamId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StreamId {
    fn from(id: &str) -> Self {
        StreamId::new(id)
    }
}

impl From<String> for StreamId {
    fn from(id: String) -> Self {
        StreamId(id)
    }
}

/// 単調増加カウンタによる識別子の払い出し
///
/// 一度払い出した値は二度と使わないため、閉じたストリーム宛ての遅延イベントが
/// 新しいストリームに誤配送されることはない。
#[derive(Debug)]
pub struct IdAllocator {
    prefix: &'static str,
    next: Cell<u64>,
}

impl IdAllocator {
    pub fn new(prefix: &'static str) -> Self {
        IdAllocator {
            prefix,
            next: Cell::new(1),
        }
    }

    /// 次の識別子を払い出す
    pub fn allocate(&self) -> StreamId {
        let n = self.next.get();
        self.next.set(n + 1);
        StreamId(format!("{}{}", self.prefix, n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocator_never_repeats() {
        let ids = IdAllocator::new("ws-");
        let a = ids.allocate();
        let b = ids.allocate();
        assert_ne!(a, b);
        assert_eq!(a.as_str(), "ws-1");
        assert_eq!(b.to_string(), "ws-2");
    }
}
