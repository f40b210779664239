use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to write temp file in {dir}: {source}")]
    TempWrite {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read upload at {path}: {source}")]
    ReadUpload {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Session backend error: {0}")]
    Session(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
