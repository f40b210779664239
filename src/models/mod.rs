use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use utoipa::ToSchema;

/// Transport-level outcome of a single file upload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum UploadError {
    #[default]
    Ok,
    /// File exceeded the server-wide size limit
    IniSize,
    /// File exceeded the limit configured for the form
    FormSize,
    /// Body ended before the file part was complete
    Partial,
    NoFile,
    NoTmpDir,
    CantWrite,
    /// Upload stopped by an extension of the web layer
    Extension,
}

impl UploadError {
    pub fn is_ok(self) -> bool {
        self == UploadError::Ok
    }
}

/// One uploaded or stored file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FileDescriptor {
    /// Form field name
    pub key: String,
    /// Filename as sent by the client, display only
    pub original_name: String,
    /// Path owning the bytes
    #[schema(value_type = String)]
    pub content_path: PathBuf,
    pub mime_type: String,
    pub size_bytes: u64,
    pub upload_error: UploadError,
}

impl FileDescriptor {
    /// Descriptor for a part the transport layer refused; it has no backing file.
    pub fn rejected(key: &str, original_name: &str, mime_type: &str, error: UploadError) -> Self {
        Self {
            key: key.to_string(),
            original_name: original_name.to_string(),
            content_path: PathBuf::new(),
            mime_type: mime_type.to_string(),
            size_bytes: 0,
            upload_error: error,
        }
    }

    /// Same file, bytes now living at `path`.
    pub fn rehomed(&self, path: PathBuf) -> Self {
        Self {
            content_path: path,
            ..self.clone()
        }
    }
}
