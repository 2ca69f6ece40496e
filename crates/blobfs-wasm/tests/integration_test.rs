//! blobfs-wasm 統合テスト
//!
//! codec + bridge + stream + session をファサード経由で組み合わせ、
//! ローカルファイルシステムのブリッジで実際に読み書きする。

use std::cell::RefCell;
use std::rc::Rc;

use blobfs_bridge::{EntryKind, ScanTarget};
use blobfs_codec::{Chunk, CodecError, Encoding};
use blobfs_native::LocalBridge;
use blobfs_stream::{ReadState, StreamError};
use blobfs_wasm::{FileSystem, FsConfig, FsError};
use futures::executor::block_on;
use serde_json::json;

// ==============================================================
// ヘルパー
// ==============================================================

fn setup() -> (tempfile::TempDir, FileSystem<LocalBridge>) {
    let dir = tempfile::tempdir().unwrap();
    let fs = FileSystem::new(Rc::new(LocalBridge::new()), FsConfig::default());
    (dir, fs)
}

fn path_in(dir: &tempfile::TempDir, name: &str) -> String {
    dir.path().join(name).to_str().unwrap().to_string()
}

// ==============================================================
// ストリーム
// ==============================================================

#[test]
fn test_write_then_read_back_with_callbacks() {
    let (dir, fs) = setup();
    let path = path_in(&dir, "hello.txt");

    block_on(async {
        let ws = fs.open_write_stream(&path, None, None).await.unwrap();
        let (a, b) = futures::join!(ws.write("hello"), ws.write(" world"));
        a.unwrap();
        b.unwrap();
        ws.close().await.unwrap();
        assert_eq!(ws.bytes_written(), 11);
    });
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello world");

    let rs = fs.open_read_stream(&path, None, Some(4)).unwrap();
    let text = Rc::new(RefCell::new(String::new()));
    let ends = Rc::new(RefCell::new(0));
    {
        let text = text.clone();
        rs.on_data(move |chunk| text.borrow_mut().push_str(chunk.as_text().unwrap()));
        let ends = ends.clone();
        rs.on_end(move || *ends.borrow_mut() += 1);
    }

    block_on(rs.run()).unwrap();
    assert_eq!(text.borrow().as_str(), "hello world");
    assert_eq!(*ends.borrow(), 1);
    assert_eq!(rs.state(), ReadState::Closed);
    assert_eq!(rs.bytes_read(), 11);
    // end でネイティブハンドルは解放済み
    assert_eq!(fs.bridge().open_readers(), 0);
}

#[test]
fn test_append_by_default_from_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = path_in(&dir, "log.txt");
    std::fs::write(&path, "one,").unwrap();

    let config = FsConfig::from_json(r#"{"appendByDefault":true}"#).unwrap();
    let fs = FileSystem::new(Rc::new(LocalBridge::new()), config);

    block_on(async {
        let ws = fs.open_write_stream(&path, None, None).await.unwrap();
        assert!(ws.is_append());
        ws.write("two").await.unwrap();
        ws.close().await.unwrap();

        // 明示した引数が設定より優先される
        let ws = fs.open_write_stream(&path, None, Some(false)).await.unwrap();
        ws.write("three").await.unwrap();
        ws.close().await.unwrap();
    });
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "three");
}

#[test]
fn test_ascii_pull_reading_uses_default_encoding() {
    let dir = tempfile::tempdir().unwrap();
    let path = path_in(&dir, "ten.bin");
    std::fs::write(&path, b"0123456789").unwrap();

    let config =
        FsConfig::from_json(r#"{"defaultEncoding":"ascii","defaultBufferSize":4}"#).unwrap();
    let fs = FileSystem::new(Rc::new(LocalBridge::new()), config);
    let rs = fs.open_read_stream(&path, None, None).unwrap();
    assert_eq!(rs.encoding(), Encoding::Ascii);
    assert_eq!(rs.buffer_size(), 4);

    let sizes = block_on(async {
        let mut sizes = Vec::new();
        while let Some(chunk) = rs.next_chunk().await.unwrap() {
            sizes.push(chunk.as_bytes().unwrap().len());
        }
        sizes
    });
    assert_eq!(sizes, vec![4, 4, 2]);
    assert_eq!(rs.bytes_read(), 10);
}

#[test]
fn test_read_stream_argument_validation() {
    let (dir, fs) = setup();
    let path = path_in(&dir, "x.txt");

    assert!(matches!(
        fs.open_read_stream(&path, None, Some(0)),
        Err(FsError::InvalidArgument(_))
    ));
    assert!(matches!(
        fs.open_read_stream("", None, None),
        Err(FsError::InvalidArgument(_))
    ));

    // 生成は遅延。存在しないパスは最初の open で失敗する
    let rs = fs.open_read_stream(&path, None, None).unwrap();
    assert!(matches!(block_on(rs.open()), Err(StreamError::NotFound(_))));
    assert_eq!(rs.state(), ReadState::Errored);
}

#[test]
fn test_write_stream_rejects_empty_path() {
    let (_dir, fs) = setup();
    let result = block_on(fs.open_write_stream("", None, None));
    assert!(matches!(result, Err(FsError::InvalidArgument(_))));
}

// ==============================================================
// セッション
// ==============================================================

#[test]
fn test_purge_session_deletes_files_and_forgets_session() {
    let (dir, fs) = setup();
    let kept = path_in(&dir, "kept.txt");
    let a = path_in(&dir, "a.txt");
    let b = path_in(&dir, "b.txt");
    std::fs::write(&kept, "k").unwrap();
    std::fs::write(&a, "a").unwrap();
    std::fs::write(&b, "b").unwrap();

    let session = fs.session("upload");
    session.add_path(&a).unwrap();
    session.add_path(&b).unwrap();
    // 既に消えているファイルは無視される
    session.add_path(&path_in(&dir, "gone.txt")).unwrap();

    let purged = block_on(fs.purge_session("upload")).unwrap();
    assert_eq!(purged.len(), 3);
    assert!(!std::path::Path::new(&a).exists());
    assert!(!std::path::Path::new(&b).exists());
    assert!(std::path::Path::new(&kept).exists());
    assert!(!fs.sessions().contains("upload"));
}

#[test]
fn test_dispose_leaves_files_on_disk() {
    let (dir, fs) = setup();
    let a = path_in(&dir, "a.txt");
    std::fs::write(&a, "a").unwrap();

    let session = fs.session("drafts");
    session.add_path(&a).unwrap();
    assert_eq!(session.list(), vec![a.clone()]);

    session.dispose();
    assert!(!fs.sessions().contains("drafts"));
    assert!(std::path::Path::new(&a).exists());

    // 同じ名前を再度引くと空のセッションになる
    assert!(fs.session("drafts").is_empty());
}

#[test]
fn test_purge_unknown_session_is_empty() {
    let (_dir, fs) = setup();
    assert_eq!(block_on(fs.purge_session("nothing")).unwrap(), Vec::<String>::new());
    assert!(!fs.sessions().contains("nothing"));
}

// ==============================================================
// 単発操作
// ==============================================================

#[test]
fn test_create_file_validation() {
    let (dir, fs) = setup();
    let path = path_in(&dir, "new.bin");

    block_on(async {
        // ascii に文字列は渡せない（ファイルは作られない）
        let err = fs
            .create_file(&path, &json!("abc"), Some(Encoding::Ascii))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FsError::InvalidEncodingInput(CodecError::InvalidEncodingInput {
                encoding: Encoding::Ascii,
                ..
            })
        ));
        assert!(!fs.exists(&path).await.unwrap().exists);

        fs.create_file(&path, &json!([104, 105]), Some(Encoding::Ascii))
            .await
            .unwrap();
        assert_eq!(
            fs.create_file(&path, &json!("again"), None).await,
            Err(FsError::AlreadyExists(path.clone()))
        );
    });
    assert_eq!(std::fs::read(&path).unwrap(), b"hi");
}

#[test]
fn test_write_and_read_file() {
    let (dir, fs) = setup();
    let path = path_in(&dir, "data.txt");

    block_on(async {
        fs.write_file(&path, Encoding::Base64, &json!("aGVsbG8="))
            .await
            .unwrap();
        assert_eq!(
            fs.read_file(&path, None).await.unwrap(),
            Chunk::Text("hello".into())
        );
        assert_eq!(
            fs.read_file(&path, Some(Encoding::Ascii)).await.unwrap(),
            Chunk::Bytes(b"hello".to_vec())
        );
        assert!(matches!(
            fs.read_file(&path_in(&dir, "missing"), None).await,
            Err(FsError::NotFound(_))
        ));
    });
}

#[test]
fn test_directory_operations() {
    let (dir, fs) = setup();
    let sub = path_in(&dir, "sub");
    let file = format!("{}/f.txt", sub);
    let moved = format!("{}/g.txt", sub);

    block_on(async {
        fs.mkdir(&sub).await.unwrap();
        assert!(fs.is_dir(&sub).await.unwrap());
        assert!(!fs.is_dir(&path_in(&dir, "none")).await.unwrap());

        fs.write_file(&file, Encoding::Utf8, &json!("12345")).await.unwrap();
        assert!(!fs.is_dir(&file).await.unwrap());

        let stat = fs.stat(&file).await.unwrap();
        assert_eq!(stat.filename, "f.txt");
        assert_eq!(stat.size, 5);
        assert_eq!(stat.kind, EntryKind::File);

        fs.cp(&file, &moved).await.unwrap();
        let mut names = fs.ls(&sub).await.unwrap();
        names.sort();
        assert_eq!(names, vec!["f.txt".to_string(), "g.txt".to_string()]);
        assert_eq!(fs.lstat(&sub).await.unwrap().len(), 2);

        fs.unlink(&file).await.unwrap();
        assert!(matches!(fs.unlink(&file).await, Err(FsError::NotFound(_))));
        assert!(matches!(fs.cp(&moved, "").await, Err(FsError::InvalidArgument(_))));
    });
}

#[test]
fn test_scan_file_and_dirs() {
    let (dir, fs) = setup();
    let targets = vec![ScanTarget {
        path: path_in(&dir, "photo.jpg"),
        mime: Some("image/jpeg".into()),
    }];
    block_on(fs.scan_file(&targets)).unwrap();

    let empty = vec![ScanTarget {
        path: String::new(),
        mime: None,
    }];
    assert!(matches!(block_on(fs.scan_file(&empty)), Err(FsError::InvalidArgument(_))));

    assert!(fs.dirs().cache_dir.is_some());
}
