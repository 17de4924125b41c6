//! Durable key/value facts about the user.
//!
//! Facts arrive through the `record_memory_fact` tool, persist through the
//! credential store on every mutation, and feed the prompt builder at the
//! start of the next session. Last writer wins; only one tool callback runs
//! at a time on the session's event loop.

use crate::error::PersistenceError;
use crate::kv::{CredentialStore, KEY_MEMORY};
use std::collections::BTreeMap;

pub struct MemoryStore {
    records: BTreeMap<String, String>,
    store: CredentialStore,
}

impl MemoryStore {
    /// Loads the memory blob out of the credential store. A missing or
    /// unparseable blob starts the store empty rather than failing startup.
    pub fn load(store: CredentialStore) -> Self {
        let records = store
            .get(KEY_MEMORY)
            .and_then(|raw| match serde_json::from_str(raw) {
                Ok(map) => Some(map),
                Err(e) => {
                    tracing::warn!("discarding unreadable memory blob: {}", e);
                    None
                }
            })
            .unwrap_or_default();
        Self { records, store }
    }

    /// Records a fact and writes the whole blob through immediately.
    pub fn remember(&mut self, key: &str, value: &str) -> Result<(), PersistenceError> {
        self.records.insert(key.to_string(), value.to_string());
        let blob = serde_json::to_string(&self.records)?;
        self.store.set(KEY_MEMORY, &blob)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.records.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// The serialized blob handed to the prompt builder. BTreeMap keeps the
    /// key order stable so prompt output stays byte-identical.
    pub fn snapshot_json(&self) -> String {
        serde_json::to_string(&self.records).unwrap_or_else(|_| "{}".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store_in(dir: &tempfile::TempDir) -> CredentialStore {
        CredentialStore::open(dir.path().join("credentials.json")).unwrap()
    }

    #[test]
    fn remember_persists_across_reload() {
        let dir = tempdir().unwrap();

        let mut memory = MemoryStore::load(store_in(&dir));
        memory.remember("favorite_season", "autumn").unwrap();
        memory.remember("hometown", "Dayton").unwrap();

        let reloaded = MemoryStore::load(store_in(&dir));
        assert_eq!(reloaded.get("favorite_season"), Some("autumn"));
        assert_eq!(reloaded.get("hometown"), Some("Dayton"));
    }

    #[test]
    fn snapshot_is_deterministic() {
        let dir = tempdir().unwrap();
        let mut memory = MemoryStore::load(store_in(&dir));
        memory.remember("b_key", "2").unwrap();
        memory.remember("a_key", "1").unwrap();

        assert_eq!(memory.snapshot_json(), r#"{"a_key":"1","b_key":"2"}"#);
        assert_eq!(memory.snapshot_json(), memory.snapshot_json());
    }

    #[test]
    fn last_writer_wins() {
        let dir = tempdir().unwrap();
        let mut memory = MemoryStore::load(store_in(&dir));
        memory.remember("pet", "cat").unwrap();
        memory.remember("pet", "dog").unwrap();

        assert_eq!(memory.get("pet"), Some("dog"));
        assert_eq!(memory.len(), 1);
    }
}
