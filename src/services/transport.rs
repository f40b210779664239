//! Per-request upload data.
//!
//! File parts of the current request are spooled to request-scoped temp files
//! that disappear when the [`RequestUploads`] value is dropped, i.e. when the
//! request ends. Anything that must outlive the request has to be re-homed by
//! the upload store.

use crate::models::{FileDescriptor, UploadError};
use crate::services::error::StorageError;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tempfile::TempPath;

const RECEIVE_PREFIX: &str = "upl_";

pub struct RequestUploads {
    dir: PathBuf,
    /// Files posted with this request
    fresh: BTreeMap<String, FileDescriptor>,
    /// Stored files surfaced into this request's view
    resurrected: BTreeMap<String, FileDescriptor>,
    received: Vec<TempPath>,
}

impl RequestUploads {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            fresh: BTreeMap::new(),
            resurrected: BTreeMap::new(),
            received: Vec::new(),
        }
    }

    /// Spools a posted file part to a request-scoped temp file.
    pub async fn receive(
        &mut self,
        key: &str,
        original_name: &str,
        content_type: Option<&str>,
        bytes: &[u8],
    ) -> Result<&FileDescriptor, StorageError> {
        let write_err = |source: std::io::Error| StorageError::TempWrite {
            dir: self.dir.clone(),
            source,
        };

        let temp_path = tempfile::Builder::new()
            .prefix(RECEIVE_PREFIX)
            .tempfile_in(&self.dir)
            .map_err(write_err)?
            .into_temp_path();
        tokio::fs::write(&temp_path, bytes)
            .await
            .map_err(write_err)?;

        let descriptor = FileDescriptor {
            key: key.to_string(),
            original_name: original_name.to_string(),
            content_path: temp_path.to_path_buf(),
            mime_type: detect_mime(content_type, bytes),
            size_bytes: bytes.len() as u64,
            upload_error: UploadError::Ok,
        };
        tracing::debug!(
            "Received upload '{}' ({} bytes) for field {}",
            original_name,
            bytes.len(),
            key
        );

        self.received.push(temp_path);
        self.resurrected.remove(key);
        self.fresh.insert(key.to_string(), descriptor);
        Ok(&self.fresh[key])
    }

    /// Records a part the transport layer could not accept.
    pub fn reject(
        &mut self,
        key: &str,
        original_name: &str,
        content_type: Option<&str>,
        error: UploadError,
    ) {
        let mime_type = content_type
            .map(str::to_string)
            .unwrap_or_else(|| mime::APPLICATION_OCTET_STREAM.to_string());
        tracing::debug!("Rejected upload for field {}: {:?}", key, error);
        self.fresh.insert(
            key.to_string(),
            FileDescriptor::rejected(key, original_name, &mime_type, error),
        );
    }

    /// Transport data posted with this request for `key`
    pub fn fresh(&self, key: &str) -> Option<&FileDescriptor> {
        self.fresh.get(key)
    }

    pub fn fresh_entries(&self) -> impl Iterator<Item = (&String, &FileDescriptor)> {
        self.fresh.iter()
    }

    /// Fresh data first, then anything surfaced from storage.
    pub fn view(&self, key: &str) -> Option<&FileDescriptor> {
        self.fresh.get(key).or_else(|| self.resurrected.get(key))
    }

    /// Makes a stored descriptor visible to later readers of this request.
    pub fn surface(&mut self, descriptor: FileDescriptor) {
        if !self.fresh.contains_key(&descriptor.key) {
            self.resurrected.insert(descriptor.key.clone(), descriptor);
        }
    }

    /// True only for files spooled by this request.
    pub fn is_uploaded_file(&self, path: &Path) -> bool {
        self.received.iter().any(|p| &**p == path)
    }
}

fn detect_mime(content_type: Option<&str>, bytes: &[u8]) -> String {
    content_type
        .and_then(|ct| ct.parse::<mime::Mime>().ok())
        .map(|m| m.essence_str().to_string())
        .or_else(|| infer::get(bytes).map(|t| t.mime_type().to_string()))
        .unwrap_or_else(|| mime::APPLICATION_OCTET_STREAM.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PNG_HEADER: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

    #[tokio::test]
    async fn test_receive_spools_bytes() {
        let dir = TempDir::new().unwrap();
        let mut uploads = RequestUploads::new(dir.path().to_path_buf());

        let path = uploads
            .receive("file", "a.txt", Some("text/plain"), b"hello")
            .await
            .unwrap()
            .content_path
            .clone();

        let fresh = uploads.fresh("file").unwrap();
        assert_eq!(fresh.original_name, "a.txt");
        assert_eq!(fresh.mime_type, "text/plain");
        assert_eq!(fresh.size_bytes, 5);
        assert_eq!(std::fs::read(&path).unwrap(), b"hello");
        assert!(uploads.is_uploaded_file(&path));
    }

    #[tokio::test]
    async fn test_request_temp_files_are_reclaimed_on_drop() {
        let dir = TempDir::new().unwrap();
        let mut uploads = RequestUploads::new(dir.path().to_path_buf());
        let path = uploads
            .receive("file", "a.txt", None, b"hello")
            .await
            .unwrap()
            .content_path
            .clone();
        assert!(path.exists());

        drop(uploads);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_mime_falls_back_to_magic_bytes() {
        let dir = TempDir::new().unwrap();
        let mut uploads = RequestUploads::new(dir.path().to_path_buf());

        uploads.receive("img", "a.png", None, PNG_HEADER).await.unwrap();
        uploads.receive("blob", "a.bin", None, b"\x00\x01").await.unwrap();

        assert_eq!(uploads.fresh("img").unwrap().mime_type, "image/png");
        assert_eq!(
            uploads.fresh("blob").unwrap().mime_type,
            "application/octet-stream"
        );
    }

    #[test]
    fn test_reject_records_error_without_file() {
        let mut uploads = RequestUploads::new(std::env::temp_dir());
        uploads.reject("file", "big.iso", None, UploadError::FormSize);

        let fresh = uploads.fresh("file").unwrap();
        assert_eq!(fresh.upload_error, UploadError::FormSize);
        assert!(!uploads.is_uploaded_file(&fresh.content_path));
    }

    #[test]
    fn test_surface_does_not_shadow_fresh_data() {
        let mut uploads = RequestUploads::new(std::env::temp_dir());
        uploads.reject("file", "new.png", None, UploadError::Partial);

        let stored = FileDescriptor::rejected("file", "old.png", "image/png", UploadError::Ok)
            .rehomed(PathBuf::from("/tmp/ftmp_old"));
        uploads.surface(stored.clone());
        assert_eq!(uploads.view("file").unwrap().original_name, "new.png");

        let mut other = stored;
        other.key = "other".to_string();
        uploads.surface(other);
        assert_eq!(uploads.view("other").unwrap().original_name, "old.png");
        assert!(uploads.fresh("other").is_none());
    }
}
