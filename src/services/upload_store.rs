use crate::models::FileDescriptor;
use crate::services::error::StorageError;
use crate::services::file_ops::{DeleteOutcome, FileOps};
use crate::services::session::{SessionData, SessionStore};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;

/// Session attribute holding the stored uploads
pub const STORAGE_SESSION_KEY: &str = "upload_storage";

pub type Snapshot = BTreeMap<String, FileDescriptor>;

/// Session-bound registry of stored uploads.
///
/// One instance lives for one request. The snapshot is read from the session
/// container by [`UploadStore::initialize`] and written back only by an
/// explicit [`UploadStore::save`].
pub struct UploadStore {
    sessions: Arc<dyn SessionStore>,
    session_id: String,
    snapshot: Snapshot,
    /// Keys stored while handling the current request
    current_cycle: HashSet<String>,
    initialized: bool,
}

impl UploadStore {
    pub fn new(sessions: Arc<dyn SessionStore>, session_id: impl Into<String>) -> Self {
        Self {
            sessions,
            session_id: session_id.into(),
            snapshot: Snapshot::new(),
            current_cycle: HashSet::new(),
            initialized: false,
        }
    }

    /// Loads the snapshot on first call; later calls do nothing.
    pub async fn initialize(&mut self) -> Result<(), StorageError> {
        if self.initialized {
            return Ok(());
        }

        self.snapshot = match self
            .sessions
            .get(&self.session_id, STORAGE_SESSION_KEY)
            .await?
        {
            Some(value) => parse_snapshot(value),
            None => Snapshot::new(),
        };
        self.initialized = true;

        tracing::debug!(
            "Upload store for session {} loaded with {} entries",
            self.session_id,
            self.snapshot.len()
        );
        Ok(())
    }

    /// Writes the snapshot back to the session container.
    pub async fn save(&self) -> Result<(), StorageError> {
        let value = serde_json::to_value(&self.snapshot)?;
        self.sessions
            .set(&self.session_id, STORAGE_SESSION_KEY, value)
            .await
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn has(&self, key: &str) -> bool {
        self.snapshot.contains_key(key)
    }

    pub fn has_in_current_cycle(&self, key: &str) -> bool {
        self.current_cycle.contains(key)
    }

    pub fn get(&self, key: &str) -> Option<&FileDescriptor> {
        self.snapshot.get(key)
    }

    pub fn entries(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn put(&mut self, key: &str, descriptor: FileDescriptor) {
        self.snapshot.insert(key.to_string(), descriptor);
        self.current_cycle.insert(key.to_string());
    }

    /// Forgets `key` and hands back its descriptor; the backing file is left alone.
    pub fn take(&mut self, key: &str) -> Option<FileDescriptor> {
        self.current_cycle.remove(key);
        self.snapshot.remove(key)
    }

    /// Puts back a descriptor loaded from an earlier request.
    pub fn restore(&mut self, key: &str, descriptor: FileDescriptor) {
        self.snapshot.insert(key.to_string(), descriptor);
    }

    /// Deletes the backing file, then forgets `key`. `None` when nothing was stored.
    pub async fn remove(&mut self, key: &str) -> Option<DeleteOutcome> {
        let descriptor = self.take(key)?;

        let outcome = FileOps::delete_if_exists(&descriptor.content_path).await;
        if outcome == DeleteOutcome::Failed {
            tracing::warn!(
                "Stored upload {} left behind at {}",
                key,
                descriptor.content_path.display()
            );
        }
        Some(outcome)
    }

    /// True when `path` backs one of the stored descriptors.
    pub fn is_temp_path_known(&self, path: &Path) -> bool {
        self.snapshot.values().any(|d| d.content_path == path)
    }
}

/// Stored uploads held by a detached session, e.g. one that expired.
pub fn snapshot_from_session(data: &SessionData) -> Snapshot {
    data.get(STORAGE_SESSION_KEY)
        .cloned()
        .map(parse_snapshot)
        .unwrap_or_default()
}

fn parse_snapshot(value: serde_json::Value) -> Snapshot {
    serde_json::from_value(value).unwrap_or_else(|e| {
        tracing::warn!("Discarding unreadable upload storage: {}", e);
        Snapshot::new()
    })
}
