//! Results engine error taxonomy
//!
//! Every filesystem failure is classified here before it leaves the engine:
//! transient (lock contention), validation, not-found, or fatal I/O.

use thiserror::Error;

pub type ResultsResult<T> = Result<T, ResultsError>;

#[derive(Debug, Error)]
pub enum ResultsError {
    /// Survey id is not a numeric key (validation)
    #[error("Invalid survey ID: {0}")]
    InvalidSurveyId(String),

    /// Attachment file name is empty or tries to leave the uploads folder (validation)
    #[error("Invalid attachment name: {0}")]
    InvalidAttachmentName(String),

    /// No results table, or a table without data rows (not-found)
    #[error("No results recorded for survey {0}")]
    NoData(String),

    /// Referenced attachment is missing from the uploads folder (not-found)
    #[error("Attachment not found: {0}")]
    AttachmentNotFound(String),

    /// Lock marker stayed held for the whole retry budget (transient)
    #[error("Results lock not acquired for {table} after {attempts} attempts")]
    LockTimeout { table: String, attempts: u32 },

    /// Table text could not be parsed
    #[error("Malformed results table: {0}")]
    Malformed(String),

    /// Zip packaging failed
    #[error("Archive error: {0}")]
    Archive(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ResultsError {
    /// Caller should resubmit the whole request
    pub fn is_transient(&self) -> bool {
        matches!(self, ResultsError::LockTimeout { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ResultsError::NoData(_) | ResultsError::AttachmentNotFound(_)
        )
    }

    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ResultsError::InvalidSurveyId(_) | ResultsError::InvalidAttachmentName(_)
        )
    }
}

impl From<zip::result::ZipError> for ResultsError {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(io) => ResultsError::Io(io),
            other => ResultsError::Archive(other.to_string()),
        }
    }
}
