use crate::services::error::StorageError;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde_json::Value;
use std::collections::HashMap;

/// Attributes held by one session
pub type SessionData = HashMap<String, Value>;

/// Server-side key/value container whose contents survive across requests of
/// the same logical client.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Reads one attribute. Unknown sessions and attributes both yield `None`.
    async fn get(&self, session_id: &str, key: &str) -> Result<Option<Value>, StorageError>;

    /// Writes one attribute, creating the session if needed.
    async fn set(&self, session_id: &str, key: &str, value: Value) -> Result<(), StorageError>;

    /// Removes every session idle past its lifetime and hands back its data.
    async fn drain_expired(&self, now: DateTime<Utc>) -> Vec<(String, SessionData)>;

    /// Number of live sessions
    async fn count(&self) -> usize;
}

struct SessionEntry {
    data: SessionData,
    last_seen: DateTime<Utc>,
}

/// In-process session container
pub struct MemorySessionStore {
    sessions: DashMap<String, SessionEntry>,
    ttl: Duration,
}

impl MemorySessionStore {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl: Duration::try_seconds(i64::try_from(ttl_secs).unwrap_or(i64::MAX))
                .unwrap_or(Duration::MAX),
        }
    }

    fn is_expired(&self, entry: &SessionEntry, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(entry.last_seen) > self.ttl
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, session_id: &str, key: &str) -> Result<Option<Value>, StorageError> {
        let Some(mut entry) = self.sessions.get_mut(session_id) else {
            return Ok(None);
        };
        entry.last_seen = Utc::now();
        Ok(entry.data.get(key).cloned())
    }

    async fn set(&self, session_id: &str, key: &str, value: Value) -> Result<(), StorageError> {
        if session_id.is_empty() {
            return Err(StorageError::Session(format!(
                "refusing to write {} without a session id",
                key
            )));
        }

        let mut entry = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionEntry {
                data: SessionData::new(),
                last_seen: Utc::now(),
            });
        entry.last_seen = Utc::now();
        entry.data.insert(key.to_string(), value);
        Ok(())
    }

    async fn drain_expired(&self, now: DateTime<Utc>) -> Vec<(String, SessionData)> {
        // Collect first; removing while iterating would deadlock the shard
        let expired: Vec<String> = self
            .sessions
            .iter()
            .filter(|e| self.is_expired(e.value(), now))
            .map(|e| e.key().clone())
            .collect();

        expired
            .into_iter()
            .filter_map(|id| {
                self.sessions
                    .remove_if(&id, |_, entry| self.is_expired(entry, now))
                    .map(|(id, entry)| (id, entry.data))
            })
            .collect()
    }

    async fn count(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_get_unknown_session_is_none() {
        let store = MemorySessionStore::new(60);
        assert!(store.get("nope", "upload_storage").await.unwrap().is_none());
        assert_eq!(store.count().await, 0);
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let store = MemorySessionStore::new(60);
        store.set("s1", "k", json!({"a": 1})).await.unwrap();

        assert_eq!(store.get("s1", "k").await.unwrap(), Some(json!({"a": 1})));
        assert!(store.get("s1", "other").await.unwrap().is_none());
        assert!(store.get("s2", "k").await.unwrap().is_none());
        assert_eq!(store.count().await, 1);
    }

    #[tokio::test]
    async fn test_set_without_session_id_fails() {
        let store = MemorySessionStore::new(60);
        let err = store.set("", "k", json!(1)).await.unwrap_err();
        assert!(matches!(err, StorageError::Session(_)));
        assert_eq!(store.count().await, 0);
    }

    #[tokio::test]
    async fn test_drain_expired_only_takes_idle_sessions() {
        let store = MemorySessionStore::new(60);
        store.set("old", "k", json!(1)).await.unwrap();
        store.set("new", "k", json!(2)).await.unwrap();

        if let Some(mut entry) = store.sessions.get_mut("old") {
            entry.last_seen = Utc::now() - Duration::seconds(120);
        }

        let drained = store.drain_expired(Utc::now()).await;
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].0, "old");
        assert_eq!(drained[0].1.get("k"), Some(&json!(1)));

        assert!(store.get("old", "k").await.unwrap().is_none());
        assert_eq!(store.get("new", "k").await.unwrap(), Some(json!(2)));
    }
}
