//! Error types for tally-ri
//!
//! Engine errors are classified once, here, into an HTTP status and a
//! stable error code. Respondents never see file paths: transient and I/O
//! failures on the submission path answer with a fixed retry message, and
//! the details go to the log.

use crate::results::ResultsError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Shown to respondents when a submission could not be merged
pub const SUBMIT_FAILED_MESSAGE: &str = "Could not save your response, please try again";

/// Shown when results could not be read or exported
pub const EXPORT_FAILED_MESSAGE: &str = "Could not generate results";

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Survey has no results yet (404)
    #[error("No data: {0}")]
    NoData(String),

    /// Results table busy; the whole request may be retried (500)
    #[error("Try again: {0}")]
    TryAgain(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Classify an engine error raised while ingesting a submission
    pub fn ingestion(err: ResultsError) -> Self {
        Self::classify(err, SUBMIT_FAILED_MESSAGE)
    }

    /// Classify an engine error raised while reading or exporting results
    pub fn export(err: ResultsError) -> Self {
        Self::classify(err, EXPORT_FAILED_MESSAGE)
    }

    fn classify(err: ResultsError, failure_message: &str) -> Self {
        match err {
            ResultsError::InvalidSurveyId(_) | ResultsError::InvalidAttachmentName(_) => {
                ApiError::BadRequest(err.to_string())
            }
            ResultsError::NoData(_) => ApiError::NoData(err.to_string()),
            ResultsError::AttachmentNotFound(_) => ApiError::NotFound(err.to_string()),
            ResultsError::LockTimeout { .. } => {
                error!("Transient results failure: {}", err);
                ApiError::TryAgain(failure_message.to_string())
            }
            ResultsError::Malformed(_)
            | ResultsError::Archive(_)
            | ResultsError::Io(_)
            | ResultsError::Json(_) => {
                error!("Results failure: {}", err);
                ApiError::Internal(failure_message.to_string())
            }
        }
    }
}

impl From<ResultsError> for ApiError {
    fn from(err: ResultsError) -> Self {
        ApiError::export(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::NoData(msg) => (StatusCode::NOT_FOUND, "NO_DATA", msg),
            ApiError::TryAgain(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "TRY_AGAIN", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
