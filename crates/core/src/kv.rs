//! Persistent local key/value store.
//!
//! Replaces the browser's localStorage from the original deployment: auth
//! flag, verified API key, image base URL, cached theme and the memory blob
//! all live in one JSON document on disk. Keys carry the `acnt::` namespace
//! uniformly (the historical code mixed prefixed and bare keys; one scheme
//! is used here).

use crate::error::PersistenceError;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const KEY_AUTHENTICATED: &str = "acnt::authenticated";
pub const KEY_API_KEY: &str = "acnt::api_key";
pub const KEY_IMG_BASE_URL: &str = "acnt::img_base_url";
pub const KEY_THEME: &str = "acnt::theme";
pub const KEY_MEMORY: &str = "acnt::memory";

/// Read-through cached JSON key/value file. Every mutation writes through to
/// disk immediately; concurrent writers are not coordinated (last writer
/// wins, matching the single-event-loop access pattern).
pub struct CredentialStore {
    path: PathBuf,
    cache: BTreeMap<String, String>,
}

impl CredentialStore {
    /// Opens the store at `path`, loading the existing document if present.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let path = path.as_ref().to_path_buf();
        let cache = if path.exists() {
            let content = fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            BTreeMap::new()
        };
        Ok(Self { path, cache })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.cache.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: &str, value: &str) -> Result<(), PersistenceError> {
        self.cache.insert(key.to_string(), value.to_string());
        self.flush()
    }

    pub fn remove(&mut self, key: &str) -> Result<(), PersistenceError> {
        self.cache.remove(key);
        self.flush()
    }

    /// Drops every stored key. Used on logout.
    pub fn clear(&mut self) -> Result<(), PersistenceError> {
        self.cache.clear();
        self.flush()
    }

    fn flush(&self) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(&self.cache)?;
        fs::write(&self.path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn set_then_reopen_reads_back() -> Result<(), PersistenceError> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("credentials.json");

        let mut store = CredentialStore::open(&path)?;
        store.set(KEY_API_KEY, "sk-test")?;
        store.set(KEY_AUTHENTICATED, "true")?;

        let reopened = CredentialStore::open(&path)?;
        assert_eq!(reopened.get(KEY_API_KEY), Some("sk-test"));
        assert_eq!(reopened.get(KEY_AUTHENTICATED), Some("true"));
        Ok(())
    }

    #[test]
    fn clear_removes_everything() -> Result<(), PersistenceError> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("credentials.json");

        let mut store = CredentialStore::open(&path)?;
        store.set(KEY_THEME, "{\"id\":\"001\"}")?;
        store.clear()?;

        let reopened = CredentialStore::open(&path)?;
        assert_eq!(reopened.get(KEY_THEME), None);
        Ok(())
    }

    #[test]
    fn missing_file_starts_empty() -> Result<(), PersistenceError> {
        let dir = tempdir().unwrap();
        let store = CredentialStore::open(dir.path().join("nope.json"))?;
        assert_eq!(store.get(KEY_API_KEY), None);
        Ok(())
    }
}
