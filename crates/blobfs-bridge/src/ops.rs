//! 単発ファイル操作の契約
//!
//! mkdir / stat / ls / cp / mv / unlink などは 1 回の非同期呼び出しと
//! 1 回の成功/失敗コールバックだけで完結する。ストリームやセッションの
//! 順序保証はここには加えない。

use async_trait::async_trait;
use blobfs_codec::{Encoding, WireData};
use serde::{Deserialize, Serialize};

use crate::BridgeError;

/// エントリの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

/// stat の結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatRecord {
    /// ファイル名（パスの最後の要素）
    pub filename: String,
    /// フルパス
    pub path: String,
    /// バイト数（ディレクトリは 0）
    pub size: u64,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    /// 最終更新時刻（UNIX エポックからのミリ秒）
    pub last_modified: u64,
}

/// exists の結果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Existence {
    pub exists: bool,
    pub is_dir: bool,
}

/// メディアスキャン要求の 1 件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanTarget {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,
}

/// プラットフォームの既知ディレクトリ
///
/// プラットフォームに存在しないものは `None`。
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Dirs {
    pub document_dir: Option<String>,
    pub cache_dir: Option<String>,
    pub picture_dir: Option<String>,
    pub music_dir: Option<String>,
    pub movie_dir: Option<String>,
    pub download_dir: Option<String>,
    #[serde(rename = "DCIMDir")]
    pub dcim_dir: Option<String>,
}

/// 単発ファイル操作プロバイダ
#[async_trait(?Send)]
pub trait FileOps {
    /// ディレクトリを作成する（親も含めて作成する）
    async fn mkdir(&self, path: &str) -> Result<(), BridgeError>;

    async fn stat(&self, path: &str) -> Result<StatRecord, BridgeError>;

    /// ディレクトリなら直下の全エントリ、ファイルならそのファイルだけの stat
    async fn lstat(&self, path: &str) -> Result<Vec<StatRecord>, BridgeError>;

    /// ディレクトリ直下のエントリ名
    async fn ls(&self, path: &str) -> Result<Vec<String>, BridgeError>;

    async fn cp(&self, path: &str, dest: &str) -> Result<(), BridgeError>;

    async fn mv(&self, path: &str, dest: &str) -> Result<(), BridgeError>;

    /// ファイルを削除する（ディレクトリなら中身ごと削除する）
    async fn unlink(&self, path: &str) -> Result<(), BridgeError>;

    async fn exists(&self, path: &str) -> Result<Existence, BridgeError>;

    /// 新しいファイルを作成する
    ///
    /// # エラー
    /// - `BridgeError::AlreadyExists`: 既にファイルが存在する
    async fn create_file(
        &self,
        path: &str,
        data: WireData,
        encoding: Encoding,
    ) -> Result<(), BridgeError>;

    /// ファイル全体を書き換える（存在しなければ作成する）
    async fn write_file(
        &self,
        path: &str,
        encoding: Encoding,
        data: WireData,
    ) -> Result<(), BridgeError>;

    /// ファイル全体を読み込む
    async fn read_file(&self, path: &str, encoding: Encoding) -> Result<WireData, BridgeError>;

    /// メディアスキャナにファイルを登録する（対応しないプラットフォームでは何もしない）
    async fn scan_file(&self, targets: &[ScanTarget]) -> Result<(), BridgeError>;

    fn dirs(&self) -> Dirs;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stat_record_json_shape() {
        let record = StatRecord {
            filename: "a.txt".into(),
            path: "/tmp/a.txt".into(),
            size: 11,
            kind: EntryKind::File,
            last_modified: 1_700_000_000_000,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], "file");
        assert_eq!(json["lastModified"], 1_700_000_000_000u64);
        assert_eq!(json["filename"], "a.txt");
    }

    #[test]
    fn test_dirs_json_names() {
        let dirs = Dirs {
            document_dir: Some("/data/docs".into()),
            dcim_dir: Some("/sdcard/DCIM".into()),
            ..Dirs::default()
        };
        let json = serde_json::to_value(&dirs).unwrap();
        assert_eq!(json["DocumentDir"], "/data/docs");
        assert_eq!(json["DCIMDir"], "/sdcard/DCIM");
        assert!(json["CacheDir"].is_null());
    }
}
