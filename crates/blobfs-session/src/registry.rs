//! セッションレジストリ

use alloc::collections::BTreeMap;
use alloc::format;
use alloc::rc::Rc;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::cell::RefCell;

use crate::error::SessionError;

/// 名前 → 挿入順を保つパス集合
///
/// 各操作は借用の中で完結するため、同じ名前への追加と削除が
/// 交互に呼ばれても更新が失われることはない。
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RefCell<BTreeMap<String, Vec<String>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 名前付きセッションへのハンドルを返す
    pub fn session(self: &Rc<Self>, name: &str) -> Session {
        Session {
            registry: Rc::clone(self),
            name: name.to_string(),
        }
    }

    /// セッションのパス一覧を返す（未登録なら空の集合を登録する）
    pub fn get(&self, name: &str) -> Vec<String> {
        self.sessions
            .borrow_mut()
            .entry(name.to_string())
            .or_insert_with(|| {
                log::debug!("session {} created", name);
                Vec::new()
            })
            .clone()
    }

    /// パスを末尾に追加する
    ///
    /// # 戻り値
    /// 追加したかどうか。既に含まれていれば `false`（順序は変えない）
    ///
    /// # エラー
    /// - `SessionError::InvalidPath`: パスが空、または NUL を含む
    pub fn add_path(&self, name: &str, path: &str) -> Result<bool, SessionError> {
        validate_path(path)?;
        let mut sessions = self.sessions.borrow_mut();
        let paths = sessions.entry(name.to_string()).or_default();
        if paths.iter().any(|p| p == path) {
            return Ok(false);
        }
        paths.push(path.to_string());
        log::trace!("session {} += {}", name, path);
        Ok(true)
    }

    /// パスを取り除く
    ///
    /// # 戻り値
    /// 取り除いたかどうか。含まれていなければ `false`
    pub fn remove_path(&self, name: &str, path: &str) -> Result<bool, SessionError> {
        validate_path(path)?;
        let mut sessions = self.sessions.borrow_mut();
        let Some(paths) = sessions.get_mut(name) else {
            return Ok(false);
        };
        let Some(index) = paths.iter().position(|p| p == path) else {
            return Ok(false);
        };
        paths.remove(index);
        log::trace!("session {} -= {}", name, path);
        Ok(true)
    }

    /// パス集合を丸ごと置き換える（重複は最初の出現だけ残す）
    ///
    /// 1 つでも不正なパスがあれば何も変更しない。
    pub fn set<I, S>(&self, name: &str, paths: I) -> Result<(), SessionError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for path in paths {
            let path = path.into();
            validate_path(&path)?;
            if !unique.contains(&path) {
                unique.push(path);
            }
        }
        self.sessions.borrow_mut().insert(name.to_string(), unique);
        Ok(())
    }

    /// セッションを登録解除する。ファイルは削除しない
    ///
    /// # 戻り値
    /// 登録されていたパス一覧（未登録なら `None`）
    pub fn dispose(&self, name: &str) -> Option<Vec<String>> {
        let removed = self.sessions.borrow_mut().remove(name);
        if let Some(paths) = &removed {
            log::debug!("session {} disposed ({} paths)", name, paths.len());
        }
        removed
    }

    /// 登録されているセッション名（辞書順）
    pub fn names(&self) -> Vec<String> {
        self.sessions.borrow().keys().cloned().collect()
    }

    /// セッションが登録されているか（登録はしない）
    pub fn contains(&self, name: &str) -> bool {
        self.sessions.borrow().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.sessions.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.borrow().is_empty()
    }
}

fn validate_path(path: &str) -> Result<(), SessionError> {
    if path.is_empty() {
        return Err(SessionError::InvalidPath("path is empty".into()));
    }
    if path.contains('\0') {
        return Err(SessionError::InvalidPath(format!(
            "path contains a NUL byte: {:?}",
            path
        )));
    }
    Ok(())
}

/// 1 つのセッションへのハンドル
///
/// 状態はレジストリ側にあるので、同じ名前のハンドルはいくつあってもよい。
#[derive(Debug, Clone)]
pub struct Session {
    registry: Rc<SessionRegistry>,
    name: String,
}

impl Session {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_path(&self, path: &str) -> Result<bool, SessionError> {
        self.registry.add_path(&self.name, path)
    }

    pub fn remove_path(&self, path: &str) -> Result<bool, SessionError> {
        self.registry.remove_path(&self.name, path)
    }

    /// 挿入順のパス一覧
    pub fn list(&self) -> Vec<String> {
        self.registry.get(&self.name)
    }

    /// レジストリから外す（ファイルは残る）
    pub fn dispose(&self) -> Option<Vec<String>> {
        self.registry.dispose(&self.name)
    }

    pub fn len(&self) -> usize {
        self.list().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, path: &str) -> bool {
        self.list().iter().any(|p| p == path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_get_creates_empty_session() {
        let registry = SessionRegistry::new();
        assert!(!registry.contains("x"));
        assert!(registry.get("x").is_empty());
        assert!(registry.contains("x"));
        assert_eq!(registry.names(), vec!["x"]);
    }

    #[test]
    fn test_add_path_deduplicates() {
        let registry = SessionRegistry::new();
        assert_eq!(registry.add_path("x", "/a"), Ok(true));
        assert_eq!(registry.add_path("x", "/b"), Ok(true));
        assert_eq!(registry.add_path("x", "/a"), Ok(false));
        assert_eq!(registry.get("x"), vec!["/a", "/b"]);
    }

    #[test]
    fn test_remove_path() {
        let registry = SessionRegistry::new();
        registry.set("x", ["/a", "/b", "/c"]).unwrap();
        assert_eq!(registry.remove_path("x", "/b"), Ok(true));
        assert_eq!(registry.remove_path("x", "/b"), Ok(false));
        assert_eq!(registry.get("x"), vec!["/a", "/c"]);
        // 未登録の名前は何もしないし登録もしない
        assert_eq!(registry.remove_path("y", "/a"), Ok(false));
        assert!(!registry.contains("y"));
    }

    #[test]
    fn test_dispose_then_get_is_fresh() {
        let registry = SessionRegistry::new();
        registry.add_path("x", "/a").unwrap();
        assert_eq!(registry.dispose("x"), Some(vec!["/a".to_string()]));
        assert_eq!(registry.dispose("x"), None);
        assert!(registry.get("x").is_empty());
    }

    #[test]
    fn test_invalid_paths_fail_fast() {
        let registry = SessionRegistry::new();
        assert!(matches!(
            registry.add_path("x", ""),
            Err(SessionError::InvalidPath(_))
        ));
        assert!(matches!(
            registry.add_path("x", "/a\0b"),
            Err(SessionError::InvalidPath(_))
        ));
        registry.add_path("x", "/keep").unwrap();
        // 不正なパスを含む set は何も変更しない
        assert!(registry.set("x", ["/new", ""]).is_err());
        assert_eq!(registry.get("x"), vec!["/keep"]);
    }

    #[test]
    fn test_set_keeps_first_occurrence() {
        let registry = SessionRegistry::new();
        registry.set("x", ["/b", "/a", "/b"]).unwrap();
        assert_eq!(registry.get("x"), vec!["/b", "/a"]);
    }

    #[test]
    fn test_sessions_are_independent() {
        let registry = Rc::new(SessionRegistry::new());
        let uploads = registry.session("uploads");
        let thumbs = registry.session("thumbs");
        uploads.add_path("/u/1").unwrap();
        thumbs.add_path("/t/1").unwrap();
        thumbs.add_path("/t/2").unwrap();

        assert_eq!(uploads.len(), 1);
        assert_eq!(thumbs.list(), vec!["/t/1", "/t/2"]);
        assert!(thumbs.contains("/t/2"));
        assert!(!uploads.contains("/t/2"));

        thumbs.dispose();
        assert_eq!(registry.names(), vec!["uploads"]);
        // 同じ名前のハンドルは同じ集合を見る
        assert_eq!(registry.session("uploads").list(), vec!["/u/1"]);
    }
}
