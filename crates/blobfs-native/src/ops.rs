//! 単発ファイル操作のローカル実装

use std::fs::{self, Metadata, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use blobfs_bridge::{
    BridgeError, Dirs, Encoding, EntryKind, Existence, FileOps, ScanTarget, StatRecord, WireData,
};

use crate::LocalBridge;

#[async_trait(?Send)]
impl FileOps for LocalBridge {
    async fn mkdir(&self, path: &str) -> Result<(), BridgeError> {
        if Path::new(path).exists() {
            return Err(BridgeError::AlreadyExists(path.to_string()));
        }
        fs::create_dir_all(path)?;
        Ok(())
    }

    async fn stat(&self, path: &str) -> Result<StatRecord, BridgeError> {
        let metadata = fs::metadata(path).map_err(|e| not_found_or(e, path))?;
        Ok(stat_record(Path::new(path), &metadata))
    }

    async fn lstat(&self, path: &str) -> Result<Vec<StatRecord>, BridgeError> {
        let root = Path::new(path);
        let metadata = fs::metadata(root).map_err(|e| not_found_or(e, path))?;
        if !metadata.is_dir() {
            return Ok(vec![stat_record(root, &metadata)]);
        }

        let mut records = Vec::new();
        for entry in fs::read_dir(root)? {
            let entry = entry?;
            records.push(stat_record(&entry.path(), &entry.metadata()?));
        }
        records.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(records)
    }

    async fn ls(&self, path: &str) -> Result<Vec<String>, BridgeError> {
        let mut names = fs::read_dir(path)
            .map_err(|e| not_found_or(e, path))?
            .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
            .collect::<Result<Vec<_>, _>>()?;
        names.sort();
        Ok(names)
    }

    async fn cp(&self, path: &str, dest: &str) -> Result<(), BridgeError> {
        fs::copy(path, dest).map_err(|e| not_found_or(e, path))?;
        Ok(())
    }

    async fn mv(&self, path: &str, dest: &str) -> Result<(), BridgeError> {
        fs::rename(path, dest).map_err(|e| not_found_or(e, path))?;
        Ok(())
    }

    async fn unlink(&self, path: &str) -> Result<(), BridgeError> {
        let metadata = fs::metadata(path).map_err(|e| not_found_or(e, path))?;
        if metadata.is_dir() {
            fs::remove_dir_all(path)?;
        } else {
            fs::remove_file(path)?;
        }
        log::debug!("unlinked {}", path);
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<Existence, BridgeError> {
        match fs::metadata(path) {
            Ok(metadata) => Ok(Existence {
                exists: true,
                is_dir: metadata.is_dir(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Existence::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_file(
        &self,
        path: &str,
        data: WireData,
        encoding: Encoding,
    ) -> Result<(), BridgeError> {
        let bytes = data.into_bytes(encoding)?;
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => BridgeError::AlreadyExists(path.to_string()),
                _ => BridgeError::from(e),
            })?;
        file.write_all(&bytes)?;
        Ok(())
    }

    async fn write_file(
        &self,
        path: &str,
        encoding: Encoding,
        data: WireData,
    ) -> Result<(), BridgeError> {
        let bytes = data.into_bytes(encoding)?;
        fs::write(path, bytes)?;
        Ok(())
    }

    async fn read_file(&self, path: &str, encoding: Encoding) -> Result<WireData, BridgeError> {
        let bytes = fs::read(path).map_err(|e| not_found_or(e, path))?;
        Ok(WireData::from_bytes(&bytes, encoding)?)
    }

    async fn scan_file(&self, targets: &[ScanTarget]) -> Result<(), BridgeError> {
        // デスクトップにはメディアスキャナがない
        log::debug!("scan_file ignored for {} path(s)", targets.len());
        Ok(())
    }

    fn dirs(&self) -> Dirs {
        self.dirs.clone()
    }
}

fn not_found_or(err: std::io::Error, path: &str) -> BridgeError {
    match err.kind() {
        std::io::ErrorKind::NotFound => BridgeError::NotFound(path.to_string()),
        _ => BridgeError::from(err),
    }
}

fn stat_record(path: &Path, metadata: &Metadata) -> StatRecord {
    let last_modified = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    let kind = if metadata.is_dir() {
        EntryKind::Directory
    } else {
        EntryKind::File
    };

    StatRecord {
        filename: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        path: path.to_string_lossy().into_owned(),
        size: if metadata.is_dir() { 0 } else { metadata.len() },
        kind,
        last_modified,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;

    fn path_in(dir: &tempfile::TempDir, name: &str) -> String {
        dir.path().join(name).to_str().unwrap().to_string()
    }

    #[test]
    fn test_create_file_refuses_existing() {
        let dir = tempfile::tempdir().unwrap();
        let path = path_in(&dir, "new.txt");
        let bridge = LocalBridge::new();

        block_on(async {
            bridge
                .create_file(&path, WireData::Text("aGk=".into()), Encoding::Base64)
                .await
                .unwrap();
            let again = bridge
                .create_file(&path, WireData::Text("x".into()), Encoding::Utf8)
                .await;
            assert!(matches!(again, Err(BridgeError::AlreadyExists(_))));
        });
        assert_eq!(fs::read_to_string(&path).unwrap(), "hi");
    }

    #[test]
    fn test_stat_ls_and_lstat() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.txt"), "bb").unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        let root = dir.path().to_str().unwrap();
        let bridge = LocalBridge::new();

        block_on(async {
            assert_eq!(bridge.ls(root).await.unwrap(), vec!["a.txt", "b.txt", "sub"]);

            let stat = bridge.stat(&path_in(&dir, "b.txt")).await.unwrap();
            assert_eq!(stat.filename, "b.txt");
            assert_eq!(stat.size, 2);
            assert_eq!(stat.kind, EntryKind::File);

            let records = bridge.lstat(root).await.unwrap();
            assert_eq!(records.len(), 3);
            assert_eq!(records[2].kind, EntryKind::Directory);

            assert!(matches!(
                bridge.stat(&path_in(&dir, "nope")).await,
                Err(BridgeError::NotFound(_))
            ));
        });
    }

    #[test]
    fn test_exists_cp_mv_unlink() {
        let dir = tempfile::tempdir().unwrap();
        let src = path_in(&dir, "src.txt");
        let copy = path_in(&dir, "copy.txt");
        let moved = path_in(&dir, "moved.txt");
        fs::write(&src, "data").unwrap();
        let bridge = LocalBridge::new();

        block_on(async {
            let info = bridge.exists(&src).await.unwrap();
            assert!(info.exists && !info.is_dir);
            assert!(bridge.exists(dir.path().to_str().unwrap()).await.unwrap().is_dir);

            bridge.cp(&src, &copy).await.unwrap();
            bridge.mv(&copy, &moved).await.unwrap();
            assert!(!bridge.exists(&copy).await.unwrap().exists);
            assert_eq!(fs::read_to_string(&moved).unwrap(), "data");

            bridge.unlink(&moved).await.unwrap();
            assert!(!bridge.exists(&moved).await.unwrap().exists);
            assert!(bridge.unlink(&moved).await.unwrap_err().is_not_found());
        });
    }

    #[test]
    fn test_write_and_read_file_in_ascii() {
        let dir = tempfile::tempdir().unwrap();
        let path = path_in(&dir, "bytes.bin");
        let bridge = LocalBridge::new();

        block_on(async {
            bridge
                .write_file(&path, Encoding::Ascii, WireData::Bytes(vec![0, 255, 10]))
                .await
                .unwrap();
            let data = bridge.read_file(&path, Encoding::Ascii).await.unwrap();
            assert_eq!(data, WireData::Bytes(vec![0, 255, 10]));
        });
    }

    #[test]
    fn test_mkdir_refuses_existing() {
        let dir = tempfile::tempdir().unwrap();
        let nested = path_in(&dir, "x/y");
        let bridge = LocalBridge::new();

        block_on(async {
            bridge.mkdir(&nested).await.unwrap();
            assert!(matches!(bridge.mkdir(&nested).await, Err(BridgeError::AlreadyExists(_))));
        });
    }
}
