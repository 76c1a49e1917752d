use parking_lot::RwLock;
use serde_derive::{Deserialize, Serialize};
use std::{
    fs, io,
    path::{Path, PathBuf},
};

pub const ACCESS_TOKEN_KEY: &str = "arena_access_token";
pub const REFRESH_TOKEN_KEY: &str = "arena_refresh_token";

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token file io error: {0}")]
    Io(#[from] io::Error),
    #[error("token file is not valid json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Durable storage for the two bearer tokens. Both tokens are always written and
/// cleared together.
pub trait TokenStore: Send + Sync {
    fn access_token(&self) -> Option<String>;
    fn refresh_token(&self) -> Option<String>;
    fn set_tokens(&self, access_token: &str, refresh_token: &str) -> Result<(), TokenError>;
    fn clear_tokens(&self) -> Result<(), TokenError>;
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, Eq, PartialEq)]
struct StoredTokens {
    #[serde(rename = "arena_access_token", default)]
    access_token: Option<String>,
    #[serde(rename = "arena_refresh_token", default)]
    refresh_token: Option<String>,
}

#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    tokens: RwLock<StoredTokens>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tokens(access_token: &str, refresh_token: &str) -> Self {
        Self {
            tokens: RwLock::new(StoredTokens {
                access_token: Some(access_token.to_owned()),
                refresh_token: Some(refresh_token.to_owned()),
            }),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn access_token(&self) -> Option<String> {
        self.tokens.read().access_token.clone()
    }

    fn refresh_token(&self) -> Option<String> {
        self.tokens.read().refresh_token.clone()
    }

    fn set_tokens(&self, access_token: &str, refresh_token: &str) -> Result<(), TokenError> {
        *self.tokens.write() = StoredTokens {
            access_token: Some(access_token.to_owned()),
            refresh_token: Some(refresh_token.to_owned()),
        };
        Ok(())
    }

    fn clear_tokens(&self) -> Result<(), TokenError> {
        *self.tokens.write() = StoredTokens::default();
        Ok(())
    }
}

/// Keeps the tokens in a small JSON document keyed by [`ACCESS_TOKEN_KEY`] and
/// [`REFRESH_TOKEN_KEY`]. Writes land in a sibling temp file and are renamed into
/// place so a crash never leaves one token updated without the other.
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
    cached: RwLock<StoredTokens>,
}

impl FileTokenStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, TokenError> {
        let path = path.into();
        let cached = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => StoredTokens::default(),
            Err(err) => return Err(err.into()),
        };
        Ok(Self {
            path,
            cached: RwLock::new(cached),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl TokenStore for FileTokenStore {
    fn access_token(&self) -> Option<String> {
        self.cached.read().access_token.clone()
    }

    fn refresh_token(&self) -> Option<String> {
        self.cached.read().refresh_token.clone()
    }

    fn set_tokens(&self, access_token: &str, refresh_token: &str) -> Result<(), TokenError> {
        let tokens = StoredTokens {
            access_token: Some(access_token.to_owned()),
            refresh_token: Some(refresh_token.to_owned()),
        };
        let mut cached = self.cached.write();
        let temp = self.temp_path();
        fs::write(&temp, serde_json::to_vec(&tokens)?)?;
        fs::rename(&temp, &self.path)?;
        *cached = tokens;
        Ok(())
    }

    fn clear_tokens(&self) -> Result<(), TokenError> {
        let mut cached = self.cached.write();
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        *cached = StoredTokens::default();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_sets_and_clears_together() {
        let store = MemoryTokenStore::new();
        assert_eq!(store.access_token(), None);

        store.set_tokens("access", "refresh").unwrap();
        assert_eq!(store.access_token().as_deref(), Some("access"));
        assert_eq!(store.refresh_token().as_deref(), Some("refresh"));

        store.clear_tokens().unwrap();
        assert_eq!(store.access_token(), None);
        assert_eq!(store.refresh_token(), None);
    }

    #[test]
    fn file_store_persists_under_fixed_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");

        let store = FileTokenStore::open(&path).unwrap();
        assert_eq!(store.access_token(), None);
        store.set_tokens("a-1", "r-1").unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw[ACCESS_TOKEN_KEY], "a-1");
        assert_eq!(raw[REFRESH_TOKEN_KEY], "r-1");
        assert!(!dir.path().join("tokens.json.tmp").exists());

        let reopened = FileTokenStore::open(&path).unwrap();
        assert_eq!(reopened.access_token().as_deref(), Some("a-1"));
        assert_eq!(reopened.refresh_token().as_deref(), Some("r-1"));
    }

    #[test]
    fn file_store_clear_removes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        let store = FileTokenStore::open(&path).unwrap();

        // Clearing before anything was written is fine.
        store.clear_tokens().unwrap();

        store.set_tokens("a", "r").unwrap();
        store.clear_tokens().unwrap();
        assert!(!path.exists());
        assert_eq!(store.access_token(), None);
        assert_eq!(FileTokenStore::open(&path).unwrap().refresh_token(), None);
    }

    #[test]
    fn corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        std::fs::write(&path, b"not json").unwrap();
        assert!(matches!(FileTokenStore::open(&path), Err(TokenError::Json(_))));
    }
}
