//! 読み込みハンドルのチャンク切り出し

use std::fs::File;
use std::io::{self, Read};

use blobfs_bridge::{BridgeError, Encoding, WireData};

/// 開いている読み込みハンドル
///
/// tick ごとに最大 `chunk_size` バイトを読み、ワイヤ表現に変換する。
/// - base64: チャンクサイズを 3 の倍数に丸め、各チャンクが単独でデコードできるようにする
/// - utf8: マルチバイト文字をチャンク境界で分断しない（不完全な末尾は次のチャンクに持ち越す）。
///   持ち越し分を含めても `chunk_size` を超えない。1 文字が `chunk_size` より長いときだけ、
///   その 1 文字のチャンクになる
pub(crate) struct ChunkReader {
    file: File,
    encoding: Encoding,
    chunk_size: usize,
    /// utf8 で持ち越した不完全なバイト列
    carry: Vec<u8>,
    /// 不正な UTF-8 の手前までを配送済み。次の tick でエラーにする
    invalid: bool,
}

impl ChunkReader {
    pub(crate) fn new(file: File, encoding: Encoding, buffer_size: usize) -> Self {
        ChunkReader {
            file,
            encoding,
            chunk_size: chunk_size_for(encoding, buffer_size),
            carry: Vec::new(),
            invalid: false,
        }
    }

    /// 次のチャンクを読む
    ///
    /// # 戻り値
    /// - `Ok(Some(data))`: 次のチャンク
    /// - `Ok(None)`: ファイル終端
    pub(crate) fn next_chunk(&mut self) -> Result<Option<WireData>, BridgeError> {
        if self.encoding == Encoding::Utf8 {
            return self.next_text();
        }

        let mut buf = vec![0u8; self.chunk_size];
        let n = read_full(&mut self.file, &mut buf)?;
        if n == 0 {
            return Ok(None);
        }
        buf.truncate(n);
        Ok(Some(WireData::from_bytes(&buf, self.encoding)?))
    }

    fn next_text(&mut self) -> Result<Option<WireData>, BridgeError> {
        if self.invalid {
            return Err(invalid_utf8());
        }

        loop {
            let want = self.chunk_size.saturating_sub(self.carry.len()).max(1);
            let mut buf = vec![0u8; want];
            let n = read_full(&mut self.file, &mut buf)?;
            self.carry.extend_from_slice(&buf[..n]);
            if self.carry.is_empty() {
                return Ok(None);
            }

            let valid = match std::str::from_utf8(&self.carry) {
                Ok(_) => self.carry.len(),
                // 末尾が文字の途中で切れているだけなら続きを待つ
                Err(e) if e.error_len().is_none() && n > 0 => e.valid_up_to(),
                Err(e) => {
                    if e.valid_up_to() == 0 {
                        return Err(invalid_utf8());
                    }
                    self.invalid = true;
                    e.valid_up_to()
                }
            };
            if valid == 0 {
                continue;
            }

            let rest = self.carry.split_off(valid);
            let complete = std::mem::replace(&mut self.carry, rest);
            let text = String::from_utf8(complete).map_err(|_| invalid_utf8())?;
            return Ok(Some(WireData::Text(text)));
        }
    }
}

fn invalid_utf8() -> BridgeError {
    BridgeError::io("file is not valid UTF-8")
}

/// エンコーディングに応じた 1 チャンクのバイト数
pub(crate) fn chunk_size_for(encoding: Encoding, buffer_size: usize) -> usize {
    match encoding {
        Encoding::Base64 => (buffer_size / 3 * 3).max(3),
        Encoding::Utf8 | Encoding::Ascii => buffer_size.max(1),
    }
}

/// バッファが埋まるかファイル終端に達するまで読む
fn read_full(file: &mut File, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn reader_over(content: &[u8], encoding: Encoding, buffer_size: usize) -> ChunkReader {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(content).unwrap();
        use std::io::Seek;
        file.rewind().unwrap();
        ChunkReader::new(file, encoding, buffer_size)
    }

    fn drain(reader: &mut ChunkReader) -> Vec<WireData> {
        let mut chunks = Vec::new();
        while let Some(chunk) = reader.next_chunk().unwrap() {
            chunks.push(chunk);
        }
        chunks
    }

    #[test]
    fn test_chunk_size_rounding() {
        assert_eq!(chunk_size_for(Encoding::Base64, 4096), 4095);
        assert_eq!(chunk_size_for(Encoding::Base64, 2), 3);
        assert_eq!(chunk_size_for(Encoding::Ascii, 4), 4);
        assert_eq!(chunk_size_for(Encoding::Utf8, 0), 1);
    }

    #[test]
    fn test_ascii_chunks() {
        let mut reader = reader_over(b"0123456789", Encoding::Ascii, 4);
        let chunks = drain(&mut reader);
        assert_eq!(
            chunks,
            vec![
                WireData::Bytes(b"0123".to_vec()),
                WireData::Bytes(b"4567".to_vec()),
                WireData::Bytes(b"89".to_vec()),
            ]
        );
    }

    #[test]
    fn test_utf8_never_splits_characters() {
        let text = "héllo wörld ✓";
        let mut reader = reader_over(text.as_bytes(), Encoding::Utf8, 2);
        let chunks = drain(&mut reader);
        let joined: String = chunks
            .into_iter()
            .map(|c| match c {
                WireData::Text(t) => t,
                WireData::Bytes(_) => panic!("utf8 delivered bytes"),
            })
            .collect();
        assert_eq!(joined, text);
    }

    #[test]
    fn test_utf8_truncated_file_is_error() {
        // "é" の 1 バイト目だけ
        let mut reader = reader_over(&[b'a', 0xc3], Encoding::Utf8, 1);
        assert_eq!(reader.next_chunk().unwrap(), Some(WireData::Text("a".into())));
        assert!(reader.next_chunk().is_err());
    }

    #[test]
    fn test_utf8_chunks_stay_within_buffer_size() {
        let mut reader = reader_over("ab✓✓".as_bytes(), Encoding::Utf8, 4);
        let sizes: Vec<usize> = drain(&mut reader).iter().map(|c| c.len()).collect();
        assert_eq!(sizes, vec![2, 3, 3]);
    }

    #[test]
    fn test_utf8_delivers_valid_prefix_before_error() {
        let mut reader = reader_over(b"abc\xffdef", Encoding::Utf8, 8);
        assert_eq!(reader.next_chunk().unwrap(), Some(WireData::Text("abc".into())));
        assert!(reader.next_chunk().is_err());
    }

    #[test]
    fn test_base64_chunks_decode_independently() {
        let content = b"abcdefghij";
        let mut reader = reader_over(content, Encoding::Base64, 4);
        let mut decoded = Vec::new();
        for chunk in drain(&mut reader) {
            decoded.extend(chunk.into_bytes(Encoding::Base64).unwrap());
        }
        assert_eq!(decoded, content);
    }

    #[test]
    fn test_empty_file_ends_immediately() {
        let mut reader = reader_over(b"", Encoding::Utf8, 8);
        assert_eq!(reader.next_chunk().unwrap(), None);
    }
}
