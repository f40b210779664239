use crate::services::file_ops::{DeleteOutcome, FileOps};
use crate::services::session::SessionStore;
use crate::services::upload_store::snapshot_from_session;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{Duration, sleep};

/// Drops idle sessions and the files they still hold.
pub struct SessionSweeper {
    sessions: Arc<dyn SessionStore>,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl SessionSweeper {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        interval_secs: u64,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            sessions,
            interval: Duration::from_secs(interval_secs.max(1)),
            shutdown,
        }
    }

    pub async fn run(mut self) {
        tracing::info!("🚀 Session sweeper started");

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    tracing::info!("🛑 Session sweeper shutting down");
                    break;
                }
                _ = sleep(self.interval) => {
                    self.sweep().await;
                }
            }
        }
    }

    /// Runs one pass; returns the number of stored files removed.
    pub async fn sweep(&self) -> usize {
        let expired = self.sessions.drain_expired(Utc::now()).await;
        if expired.is_empty() {
            return 0;
        }

        let mut removed = 0;
        for (session_id, data) in expired {
            let snapshot = snapshot_from_session(&data);
            let paths: Vec<PathBuf> = snapshot
                .values()
                .map(|d| d.content_path.clone())
                .collect();

            for (path, outcome) in FileOps::delete_many(paths).await {
                match outcome {
                    DeleteOutcome::Deleted => removed += 1,
                    DeleteOutcome::AlreadyMissing => {}
                    DeleteOutcome::Failed => {
                        tracing::error!(
                            "Failed to remove {} of expired session {}",
                            path.display(),
                            session_id
                        );
                    }
                }
            }
            tracing::info!("Expired session {}", session_id);
        }

        tracing::info!("✅ Session sweep removed {} stored files", removed);
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FileDescriptor, UploadError};
    use crate::services::session::MemorySessionStore;
    use crate::services::upload_store::STORAGE_SESSION_KEY;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_sweep_deletes_files_of_expired_sessions() {
        let dir = TempDir::new().unwrap();
        let path = FileOps::copy_to_temp(b"x", None, Some(dir.path()))
            .await
            .unwrap();
        let descriptor = FileDescriptor::rejected("file", "a.png", "image/png", UploadError::Ok)
            .rehomed(path.clone());

        // ttl of zero: anything older than "now" is expired
        let sessions: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new(0));
        sessions
            .set("s1", STORAGE_SESSION_KEY, json!({ "file": descriptor }))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let (_tx, rx) = watch::channel(false);
        let sweeper = SessionSweeper::new(sessions.clone(), 60, rx);

        assert_eq!(sweeper.sweep().await, 1);
        assert!(!path.exists());
        assert_eq!(sessions.count().await, 0);
    }

    #[tokio::test]
    async fn test_sweep_keeps_live_sessions() {
        let sessions: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new(3600));
        sessions.set("s1", "k", json!(1)).await.unwrap();

        let (_tx, rx) = watch::channel(false);
        let sweeper = SessionSweeper::new(sessions.clone(), 60, rx);

        assert_eq!(sweeper.sweep().await, 0);
        assert_eq!(sessions.count().await, 1);
    }

    fn assert_send<T: Send>(_: &T) {}

    #[tokio::test]
    async fn test_sweep_future_is_send() {
        let sessions: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new(0));
        let (_tx, rx) = watch::channel(false);
        let sweeper = SessionSweeper::new(sessions, 60, rx);

        let sweep = sweeper.sweep();
        assert_send(&sweep);
        sweep.await;
        assert_send(&sweeper.run());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let sessions: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new(3600));
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(SessionSweeper::new(sessions, 3600, rx).run());

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
