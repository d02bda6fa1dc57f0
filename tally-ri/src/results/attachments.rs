//! Attachment store
//!
//! Uploaded files land in `data/uploads/` under a fresh unique name, so
//! concurrent uploads never collide and need no locking. Results cells refer
//! to them by the relative reference `data/uploads/<name>`.
//!
//! Nothing is ever deleted here: an upload whose submission later fails
//! stays behind as an orphan.

use super::error::{ResultsError, ResultsResult};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

/// Prefix of every attachment reference stored in a results cell
pub const ATTACHMENT_PREFIX: &str = "data/uploads/";

/// Longest extension kept from an uploaded file name
const MAX_EXTENSION_LEN: usize = 16;

#[derive(Debug, Clone)]
pub struct AttachmentStore {
    uploads_dir: PathBuf,
}

impl AttachmentStore {
    /// Store rooted at `<data_dir>/uploads`
    pub fn new(data_dir: &Path) -> Self {
        Self {
            uploads_dir: data_dir.join("uploads"),
        }
    }

    pub fn uploads_dir(&self) -> &Path {
        &self.uploads_dir
    }

    /// Write `bytes` under a new unique name and return its reference
    pub async fn persist(&self, original_name: &str, bytes: &[u8]) -> ResultsResult<String> {
        tokio::fs::create_dir_all(&self.uploads_dir).await?;

        let file_name = format!("{}{}", Uuid::new_v4().simple(), extension_of(original_name));
        let path = self.uploads_dir.join(&file_name);

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;

        debug!(
            original = original_name,
            stored = %file_name,
            bytes = bytes.len(),
            "Attachment persisted"
        );
        Ok(format!("{}{}", ATTACHMENT_PREFIX, file_name))
    }

    /// Path of a stored attachment, validated but not checked for existence
    pub fn resolve(&self, file_name: &str) -> ResultsResult<PathBuf> {
        let invalid = file_name.is_empty()
            || file_name == "."
            || file_name.contains("..")
            || file_name.contains(['/', '\\', '\0']);
        if invalid {
            return Err(ResultsError::InvalidAttachmentName(file_name.to_string()));
        }
        Ok(self.uploads_dir.join(file_name))
    }

    /// Bytes of a stored attachment
    pub async fn open(&self, file_name: &str) -> ResultsResult<Vec<u8>> {
        let path = self.resolve(file_name)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ResultsError::AttachmentNotFound(file_name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Whether the referenced attachment is present
    pub async fn exists(&self, reference: &str) -> ResultsResult<bool> {
        let Some(file_name) = file_name_of(reference) else {
            return Ok(false);
        };
        let path = self.resolve(file_name)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }
}

/// Cell value points into the attachment store
pub fn is_reference(cell: &str) -> bool {
    cell.starts_with(ATTACHMENT_PREFIX)
}

/// Stored file name of a reference, `None` if `reference` is not one
pub fn file_name_of(reference: &str) -> Option<&str> {
    reference
        .strip_prefix(ATTACHMENT_PREFIX)
        .filter(|name| !name.is_empty())
}

/// `.ext` of the original name, restricted to ASCII alphanumerics
fn extension_of(original_name: &str) -> String {
    let base = original_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(original_name);
    match base.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => {
            let ext: String = ext
                .chars()
                .filter(|c| c.is_ascii_alphanumeric())
                .take(MAX_EXTENSION_LEN)
                .collect::<String>()
                .to_ascii_lowercase();
            if ext.is_empty() {
                String::new()
            } else {
                format!(".{}", ext)
            }
        }
        _ => String::new(),
    }
}
