use crate::models::FileDescriptor;
use crate::services::error::StorageError;
use crate::services::file_ops::{DeleteOutcome, FileOps};
use crate::services::transport::RequestUploads;
use crate::services::upload_store::{Snapshot, UploadStore};
use std::collections::BTreeMap;

/// Entry point for request handlers and validation rules.
///
/// Callers see one view of uploads regardless of whether a file was posted
/// with the current request or kept from an earlier one.
pub struct UploadFacade {
    store: UploadStore,
    uploads: RequestUploads,
    file_ops: FileOps,
}

impl UploadFacade {
    /// Binds the current request's uploads to the session's stored ones.
    pub async fn attach(
        mut store: UploadStore,
        uploads: RequestUploads,
        file_ops: FileOps,
    ) -> Result<Self, StorageError> {
        store.initialize().await?;
        Ok(Self {
            store,
            uploads,
            file_ops,
        })
    }

    /// Stored uploads overlaid with the ones posted in this request.
    pub fn all(&self) -> BTreeMap<String, FileDescriptor> {
        let mut merged: Snapshot = self.store.entries().clone();
        for (key, descriptor) in self.uploads.fresh_entries() {
            merged.insert(key.clone(), descriptor.clone());
        }
        merged
    }

    /// Freshly posted data for `key`, else the stored descriptor.
    pub fn get(&mut self, key: &str) -> Option<FileDescriptor> {
        if let Some(fresh) = self.uploads.fresh(key) {
            return Some(fresh.clone());
        }

        let stored = self.store.get(key)?.clone();
        self.uploads.surface(stored.clone());
        Some(stored)
    }

    /// Re-homes the posted file for `key` so it outlives this request.
    ///
    /// Within one request only the first call copies bytes. Returns `None` when
    /// the request carries no usable file for `key`.
    pub async fn store(&mut self, key: &str) -> Result<Option<FileDescriptor>, StorageError> {
        if self.store.has_in_current_cycle(key) {
            return Ok(self.store.get(key).cloned());
        }

        let Some(fresh) = self.uploads.fresh(key).cloned() else {
            return Ok(None);
        };
        if !fresh.upload_error.is_ok() {
            tracing::debug!("Not storing {}: upload failed with {:?}", key, fresh.upload_error);
            return Ok(None);
        }

        let bytes = tokio::fs::read(&fresh.content_path)
            .await
            .map_err(|source| StorageError::ReadUpload {
                path: fresh.content_path.clone(),
                source,
            })?;
        let path = self.file_ops.temp(&bytes).await?;
        let descriptor = fresh.rehomed(path);

        // The copy kept from an earlier request stays on disk until the new one is saved
        let replaced = self.store.take(key);
        self.store.put(key, descriptor.clone());
        if let Err(e) = self.store.save().await {
            self.store.take(key);
            if let Some(old) = replaced {
                self.store.restore(key, old);
            }
            FileOps::delete_if_exists(&descriptor.content_path).await;
            return Err(e);
        }

        if let Some(old) = replaced {
            let outcome = FileOps::delete_if_exists(&old.content_path).await;
            tracing::debug!("Replaced stored upload {} ({:?})", key, outcome);
        }

        tracing::info!(
            "Stored upload '{}' for field {} in session {}",
            descriptor.original_name,
            key,
            self.store.session_id()
        );
        Ok(Some(descriptor))
    }

    /// Forgets the given keys and deletes their files. Unknown keys are skipped.
    pub async fn delete(&mut self, keys: &[&str]) -> Result<(), StorageError> {
        let mut changed = false;
        for key in keys {
            if let Some(outcome) = self.store.remove(key).await {
                changed = true;
                if outcome != DeleteOutcome::Failed {
                    tracing::info!("Deleted stored upload {}", key);
                }
            }
        }

        if changed {
            self.store.save().await?;
        }
        Ok(())
    }

    /// Whether `key` is stored; with `current_cycle_only`, only if stored during this request.
    pub fn stored(&self, key: &str, current_cycle_only: bool) -> bool {
        if current_cycle_only {
            self.store.has_in_current_cycle(key)
        } else {
            self.store.has(key)
        }
    }

    /// The descriptor held in storage for `key`, ignoring this request's uploads.
    pub fn stored_descriptor(&self, key: &str) -> Option<&FileDescriptor> {
        self.store.get(key)
    }

    /// True for a successful upload that was either posted with this request
    /// or kept in storage from an earlier one.
    pub fn is_usable_upload(&self, file: &FileDescriptor) -> bool {
        file.upload_error.is_ok()
            && !file.content_path.as_os_str().is_empty()
            && (self.uploads.is_uploaded_file(&file.content_path)
                || self.store.is_temp_path_known(&file.content_path))
    }

    pub fn uploads(&self) -> &RequestUploads {
        &self.uploads
    }
}
