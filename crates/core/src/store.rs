//! Persistence for session summaries.
//!
//! Summary records are queryable by user and ordered by session number. The
//! session number is assigned inside the store's critical section, so two
//! sessions finishing at once cannot both read the same count and collide
//! (the historical read-then-write assignment could).

use crate::error::PersistenceError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub user_id: String,

    /// Monotonic per user, starting at 1.
    pub session_number: u32,

    pub summary: String,

    pub timestamp: DateTime<Utc>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SummaryStore: Send + Sync {
    /// Appends a summary for `user_id`, assigning the next session number.
    async fn append(&self, user_id: &str, summary: &str)
        -> Result<SessionSummary, PersistenceError>;

    /// All summaries for `user_id`, ordered by session number ascending.
    async fn list(&self, user_id: &str) -> Result<Vec<SessionSummary>, PersistenceError>;
}

/// File-backed store: one JSON document holding every record. Fine for the
/// record counts a single companion produces.
pub struct JsonSummaryStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonSummaryStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    async fn read_all(&self) -> Result<Vec<SessionSummary>, PersistenceError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = tokio::fs::read_to_string(&self.path).await?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    async fn write_all(&self, records: &[SessionSummary]) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let content = serde_json::to_string_pretty(records)?;
        tokio::fs::write(&self.path, content).await?;
        Ok(())
    }
}

#[async_trait]
impl SummaryStore for JsonSummaryStore {
    async fn append(
        &self,
        user_id: &str,
        summary: &str,
    ) -> Result<SessionSummary, PersistenceError> {
        // Number assignment and the write happen under one lock.
        let _guard = self.lock.lock().await;

        let mut records = self.read_all().await?;
        let next_number = records
            .iter()
            .filter(|r| r.user_id == user_id)
            .map(|r| r.session_number)
            .max()
            .unwrap_or(0)
            + 1;

        let record = SessionSummary {
            user_id: user_id.to_string(),
            session_number: next_number,
            summary: summary.to_string(),
            timestamp: Utc::now(),
        };
        records.push(record.clone());
        self.write_all(&records).await?;
        Ok(record)
    }

    async fn list(&self, user_id: &str) -> Result<Vec<SessionSummary>, PersistenceError> {
        let _guard = self.lock.lock().await;

        let mut records: Vec<SessionSummary> = self
            .read_all()
            .await?
            .into_iter()
            .filter(|r| r.user_id == user_id)
            .collect();
        records.sort_by_key(|r| r.session_number);
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn append_assigns_monotonic_session_numbers() {
        let dir = tempdir().unwrap();
        let store = JsonSummaryStore::new(dir.path().join("summaries.json"));

        let first = store.append("grace", "first visit").await.unwrap();
        let second = store.append("grace", "second visit").await.unwrap();
        let other = store.append("henry", "a different user").await.unwrap();

        assert_eq!(first.session_number, 1);
        assert_eq!(second.session_number, 2);
        assert_eq!(other.session_number, 1);
    }

    #[tokio::test]
    async fn concurrent_appends_never_collide() {
        let dir = tempdir().unwrap();
        let store = std::sync::Arc::new(JsonSummaryStore::new(dir.path().join("summaries.json")));

        let a = {
            let store = store.clone();
            tokio::spawn(async move { store.append("grace", "racer a").await.unwrap() })
        };
        let b = {
            let store = store.clone();
            tokio::spawn(async move { store.append("grace", "racer b").await.unwrap() })
        };
        let (a, b) = (a.await.unwrap(), b.await.unwrap());

        assert_ne!(a.session_number, b.session_number);
        let numbers: Vec<u32> = store
            .list("grace")
            .await
            .unwrap()
            .iter()
            .map(|r| r.session_number)
            .collect();
        assert_eq!(numbers, vec![1, 2]);
    }

    #[tokio::test]
    async fn list_is_ordered_and_scoped_to_the_user() {
        let dir = tempdir().unwrap();
        let store = JsonSummaryStore::new(dir.path().join("summaries.json"));

        store.append("grace", "one").await.unwrap();
        store.append("henry", "noise").await.unwrap();
        store.append("grace", "two").await.unwrap();

        let records = store.list("grace").await.unwrap();
        let texts: Vec<&str> = records.iter().map(|r| r.summary.as_str()).collect();
        assert_eq!(texts, vec!["one", "two"]);
        assert!(records.iter().all(|r| r.user_id == "grace"));
    }

    #[tokio::test]
    async fn missing_file_lists_empty() {
        let dir = tempdir().unwrap();
        let store = JsonSummaryStore::new(dir.path().join("summaries.json"));
        assert!(store.list("grace").await.unwrap().is_empty());
    }
}
