use crate::services::error::StorageError;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const TEMP_PREFIX: &str = "ftmp_";

/// Result of a best-effort file deletion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// Nothing at the path; counts as deleted
    AlreadyMissing,
    /// The OS refused the deletion
    Failed,
}

impl DeleteOutcome {
    pub fn is_gone(self) -> bool {
        !matches!(self, DeleteOutcome::Failed)
    }
}

/// Filesystem primitives backing the upload store.
#[derive(Debug, Clone)]
pub struct FileOps {
    temp_dir: PathBuf,
    permissions: Option<u32>,
}

impl FileOps {
    pub fn new(temp_dir: PathBuf, permissions: Option<u32>) -> Self {
        Self {
            temp_dir,
            permissions,
        }
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    /// Copies `bytes` into a new temp file using the configured directory and mode.
    pub async fn temp(&self, bytes: &[u8]) -> Result<PathBuf, StorageError> {
        Self::copy_to_temp(bytes, self.permissions, Some(&self.temp_dir)).await
    }

    /// Writes `bytes` to a freshly created, uniquely named file under `directory`
    /// (system temp dir when `None`). The caller owns the returned path until it
    /// deletes it.
    pub async fn copy_to_temp(
        bytes: &[u8],
        permissions: Option<u32>,
        directory: Option<&Path>,
    ) -> Result<PathBuf, StorageError> {
        let dir = directory
            .map(Path::to_path_buf)
            .unwrap_or_else(std::env::temp_dir);
        let write_err = |source: std::io::Error| StorageError::TempWrite {
            dir: dir.clone(),
            source,
        };

        // TempPath removes the file if we bail out before `keep`
        let temp_path = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempfile_in(&dir)
            .map_err(write_err)?
            .into_temp_path();

        tokio::fs::write(&temp_path, bytes)
            .await
            .map_err(write_err)?;

        if let Some(mode) = permissions {
            apply_permissions(&temp_path, mode).await.map_err(write_err)?;
        }

        let path = temp_path.keep().map_err(|e| write_err(e.error))?;
        tracing::debug!("Wrote {} bytes to {}", bytes.len(), path.display());
        Ok(path)
    }

    /// Deletes `path`, treating a missing file as success.
    pub async fn delete_if_exists(path: &Path) -> DeleteOutcome {
        match tokio::fs::remove_file(path).await {
            Ok(()) => DeleteOutcome::Deleted,
            Err(e) if e.kind() == ErrorKind::NotFound => DeleteOutcome::AlreadyMissing,
            Err(e) => {
                tracing::warn!("Failed to delete {}: {}", path.display(), e);
                DeleteOutcome::Failed
            }
        }
    }

    /// Applies [`FileOps::delete_if_exists`] to each path, in order.
    pub async fn delete_many<I, P>(paths: I) -> Vec<(PathBuf, DeleteOutcome)>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut results = Vec::new();
        for path in paths {
            let path = path.as_ref();
            let outcome = Self::delete_if_exists(path).await;
            results.push((path.to_path_buf(), outcome));
        }
        results
    }
}

#[cfg(unix)]
async fn apply_permissions(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await
}

#[cfg(not(unix))]
async fn apply_permissions(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_copy_to_temp_writes_bytes() {
        let dir = TempDir::new().unwrap();
        let ops = FileOps::new(dir.path().to_path_buf(), None);

        let path = ops.temp(b"payload").await.unwrap();

        assert!(path.starts_with(dir.path()));
        assert!(
            path.file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with(TEMP_PREFIX)
        );
        assert_eq!(std::fs::read(&path).unwrap(), b"payload");
    }

    #[tokio::test]
    async fn test_copy_to_temp_paths_are_unique() {
        let dir = TempDir::new().unwrap();
        let a = FileOps::copy_to_temp(b"x", None, Some(dir.path())).await.unwrap();
        let b = FileOps::copy_to_temp(b"x", None, Some(dir.path())).await.unwrap();
        assert_ne!(a, b);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_copy_to_temp_applies_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = FileOps::copy_to_temp(b"secret", Some(0o600), Some(dir.path()))
            .await
            .unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn test_copy_to_temp_fails_for_missing_directory() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("does-not-exist");

        let err = FileOps::copy_to_temp(b"x", None, Some(&missing))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::TempWrite { .. }));
    }

    #[tokio::test]
    async fn test_delete_if_exists_outcomes() {
        let dir = TempDir::new().unwrap();
        let path = FileOps::copy_to_temp(b"x", None, Some(dir.path())).await.unwrap();

        assert_eq!(FileOps::delete_if_exists(&path).await, DeleteOutcome::Deleted);
        assert!(!path.exists());
        assert_eq!(
            FileOps::delete_if_exists(&path).await,
            DeleteOutcome::AlreadyMissing
        );
    }

    #[tokio::test]
    async fn test_delete_if_exists_reports_failure_instead_of_erroring() {
        let dir = TempDir::new().unwrap();
        // remove_file refuses directories
        let outcome = FileOps::delete_if_exists(dir.path()).await;
        assert_eq!(outcome, DeleteOutcome::Failed);
        assert!(!outcome.is_gone());
        assert!(dir.path().exists());
    }

    #[tokio::test]
    async fn test_delete_many_keeps_order() {
        let dir = TempDir::new().unwrap();
        let first = FileOps::copy_to_temp(b"1", None, Some(dir.path())).await.unwrap();
        let missing = dir.path().join("never-existed");

        let results = FileOps::delete_many([first.clone(), missing.clone()]).await;

        assert_eq!(
            results,
            vec![
                (first, DeleteOutcome::Deleted),
                (missing, DeleteOutcome::AlreadyMissing),
            ]
        );
    }
}
