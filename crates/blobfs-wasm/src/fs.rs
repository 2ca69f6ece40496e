//! ファイルシステムのファサード
//!
//! ストリーム・セッション・単発操作を 1 つの入口にまとめる。
//! ネイティブ側は `NativeBridge + FileOps` を実装していれば何でもよい
//! （JS のネイティブモジュール、ローカルファイルシステムなど）。

use std::rc::Rc;

use blobfs_bridge::{Dirs, Existence, FileOps, NativeBridge, ScanTarget, StatRecord};
use blobfs_codec::{decode, encode, Chunk, Encoding};
use blobfs_session::{Session, SessionRegistry};
use blobfs_stream::{ReadStream, WriteStream};
use serde_json::Value;

use crate::config::FsConfig;
use crate::error::FsError;

/// ストリームと単発操作の入口
pub struct FileSystem<B> {
    bridge: Rc<B>,
    sessions: Rc<SessionRegistry>,
    config: FsConfig,
}

impl<B: NativeBridge + FileOps + 'static> FileSystem<B> {
    /// 専用のセッションレジストリを持つファサードを生成する
    pub fn new(bridge: Rc<B>, config: FsConfig) -> Self {
        Self::with_registry(bridge, Rc::new(SessionRegistry::new()), config)
    }

    /// 既存のセッションレジストリを共有するファサードを生成する
    pub fn with_registry(bridge: Rc<B>, sessions: Rc<SessionRegistry>, config: FsConfig) -> Self {
        FileSystem {
            bridge,
            sessions,
            config,
        }
    }

    pub fn bridge(&self) -> &Rc<B> {
        &self.bridge
    }

    pub fn sessions(&self) -> &Rc<SessionRegistry> {
        &self.sessions
    }

    pub fn config(&self) -> &FsConfig {
        &self.config
    }

    // ==============================================================
    // ストリーム
    // ==============================================================

    /// 書き込みストリームを開く
    ///
    /// # 引数
    /// - `encoding`: 省略時は `defaultEncoding`
    /// - `append`: 省略時は `appendByDefault`
    pub async fn open_write_stream(
        &self,
        path: &str,
        encoding: Option<Encoding>,
        append: Option<bool>,
    ) -> Result<WriteStream, FsError> {
        require_path(path)?;
        let stream = WriteStream::open(
            self.native(),
            path,
            encoding.unwrap_or(self.config.default_encoding),
            append.unwrap_or(self.config.append_by_default),
        )
        .await?;
        Ok(stream)
    }

    /// 読み込みストリームを生成する（開くのは最初の open / tick 時）
    ///
    /// # エラー
    /// - `FsError::InvalidArgument`: パスが空、またはバッファサイズが 0
    pub fn open_read_stream(
        &self,
        path: &str,
        encoding: Option<Encoding>,
        buffer_size: Option<usize>,
    ) -> Result<ReadStream, FsError> {
        require_path(path)?;
        let buffer_size = buffer_size.unwrap_or(self.config.default_buffer_size);
        if buffer_size == 0 {
            return Err(FsError::InvalidArgument(
                "buffer size must be greater than zero".into(),
            ));
        }
        Ok(ReadStream::new(
            self.native(),
            path,
            encoding.unwrap_or(self.config.default_encoding),
            buffer_size,
        ))
    }

    // ==============================================================
    // セッション
    // ==============================================================

    pub fn session(&self, name: &str) -> Session {
        self.sessions.session(name)
    }

    /// セッションのファイルをすべて削除してからセッションを登録解除する
    ///
    /// 既に存在しないファイルは無視する。途中で失敗した場合は、
    /// 削除できたパスだけをセッションから外し、残りは登録したまま返す。
    ///
    /// # 戻り値
    /// 削除対象だったパス一覧
    pub async fn purge_session(&self, name: &str) -> Result<Vec<String>, FsError> {
        let paths = self.sessions.get(name);
        for path in &paths {
            match self.bridge.unlink(path).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => log::debug!("purge {}: {} already gone", name, path),
                Err(e) => {
                    log::warn!("purge {} stopped at {}: {}", name, path, e);
                    return Err(e.into());
                }
            }
            self.sessions.remove_path(name, path)?;
        }
        self.sessions.dispose(name);
        log::debug!("session {} purged ({} paths)", name, paths.len());
        Ok(paths)
    }

    // ==============================================================
    // 単発操作
    // ==============================================================

    pub async fn mkdir(&self, path: &str) -> Result<(), FsError> {
        require_path(path)?;
        Ok(self.bridge.mkdir(path).await?)
    }

    pub async fn stat(&self, path: &str) -> Result<StatRecord, FsError> {
        require_path(path)?;
        Ok(self.bridge.stat(path).await?)
    }

    /// ディレクトリ直下の各エントリの stat
    pub async fn lstat(&self, path: &str) -> Result<Vec<StatRecord>, FsError> {
        require_path(path)?;
        Ok(self.bridge.lstat(path).await?)
    }

    pub async fn ls(&self, path: &str) -> Result<Vec<String>, FsError> {
        require_path(path)?;
        Ok(self.bridge.ls(path).await?)
    }

    pub async fn cp(&self, path: &str, dest: &str) -> Result<(), FsError> {
        require_path(path)?;
        require_path(dest)?;
        Ok(self.bridge.cp(path, dest).await?)
    }

    pub async fn mv(&self, path: &str, dest: &str) -> Result<(), FsError> {
        require_path(path)?;
        require_path(dest)?;
        Ok(self.bridge.mv(path, dest).await?)
    }

    pub async fn unlink(&self, path: &str) -> Result<(), FsError> {
        require_path(path)?;
        Ok(self.bridge.unlink(path).await?)
    }

    pub async fn exists(&self, path: &str) -> Result<Existence, FsError> {
        require_path(path)?;
        Ok(self.bridge.exists(path).await?)
    }

    /// ディレクトリかどうか（存在しなければ `false`）
    pub async fn is_dir(&self, path: &str) -> Result<bool, FsError> {
        Ok(self.exists(path).await?.is_dir)
    }

    /// 新しいファイルを作る
    ///
    /// # 引数
    /// - `data`: utf8 / base64 なら文字列、ascii なら 0〜255 の数値配列
    ///
    /// # エラー
    /// - `FsError::InvalidEncodingInput`: データの形がエンコーディングと合わない
    /// - `FsError::AlreadyExists`: ファイルが既に存在する
    pub async fn create_file(
        &self,
        path: &str,
        data: &Value,
        encoding: Option<Encoding>,
    ) -> Result<(), FsError> {
        require_path(path)?;
        let encoding = encoding.unwrap_or(self.config.default_encoding);
        let wire = encode(data, encoding)?;
        if self.bridge.exists(path).await?.exists {
            return Err(FsError::AlreadyExists(path.to_string()));
        }
        Ok(self.bridge.create_file(path, wire, encoding).await?)
    }

    /// ファイルの内容を置き換える
    pub async fn write_file(
        &self,
        path: &str,
        encoding: Encoding,
        data: &Value,
    ) -> Result<(), FsError> {
        require_path(path)?;
        let wire = encode(data, encoding)?;
        Ok(self.bridge.write_file(path, encoding, wire).await?)
    }

    /// ファイル全体を 1 つのチャンクとして読む
    pub async fn read_file(&self, path: &str, encoding: Option<Encoding>) -> Result<Chunk, FsError> {
        require_path(path)?;
        let encoding = encoding.unwrap_or(self.config.default_encoding);
        let wire = self.bridge.read_file(path, encoding).await?;
        Ok(decode(wire, encoding)?)
    }

    /// メディアスキャナに登録を依頼する（対応していないプラットフォームでは何もしない）
    pub async fn scan_file(&self, targets: &[ScanTarget]) -> Result<(), FsError> {
        for target in targets {
            require_path(&target.path)?;
        }
        Ok(self.bridge.scan_file(targets).await?)
    }

    pub fn dirs(&self) -> Dirs {
        self.bridge.dirs()
    }

    fn native(&self) -> Rc<dyn NativeBridge> {
        self.bridge.clone()
    }
}

fn require_path(path: &str) -> Result<(), FsError> {
    if path.is_empty() {
        return Err(FsError::InvalidArgument("`path` must not be empty".into()));
    }
    Ok(())
}
