//! Results storage engine
//!
//! One comma-separated results table per survey, `data/<id>-results.csv`.
//! The table has no predeclared schema: its header grows as submissions
//! bring new question labels, and rows written under an older, narrower
//! header read back as empty strings for the columns added later.
//!
//! Write path: [`IngestionEngine`] persists attachments, stamps the
//! submission, takes the per-table [`ResultsGate`], merges via the
//! [`schema`] resolver and [`codec`], and commits by append or by atomic
//! rewrite.
//!
//! Read path: [`ResultsReader`] for raw / decoded rows,
//! [`ArchiveAssembler`] for zip export with attachments.

pub mod archive;
pub mod attachments;
pub mod codec;
pub mod engine;
pub mod error;
pub mod gate;
pub mod reader;
pub mod record;
pub mod schema;
pub mod snapshot;

pub use archive::{Archive, ArchiveAssembler};
pub use attachments::{AttachmentStore, ATTACHMENT_PREFIX};
pub use engine::{IngestReceipt, IngestionEngine, Upload};
pub use error::{ResultsError, ResultsResult};
pub use gate::{GateGuard, GatePolicy, ResultsGate};
pub use reader::{ResultSet, ResultsReader};
pub use record::Record;

use std::path::{Path, PathBuf};

/// Reserved column stamped on every submission by the engine
pub const TIMESTAMP_COLUMN: &str = "Timestamp";

/// Survey ids are numeric keys; anything else is rejected before touching disk.
pub fn validate_survey_id(survey_id: &str) -> ResultsResult<()> {
    let valid = !survey_id.is_empty()
        && survey_id.len() <= 20
        && survey_id.bytes().all(|b| b.is_ascii_digit());
    if valid {
        Ok(())
    } else {
        Err(ResultsError::InvalidSurveyId(survey_id.to_string()))
    }
}

/// `data/<id>-results.csv`
pub fn table_path(data_dir: &Path, survey_id: &str) -> PathBuf {
    data_dir.join(format!("{}-results.csv", survey_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_survey_id() {
        assert!(validate_survey_id("1733828700000").is_ok());
        assert!(validate_survey_id("7").is_ok());

        for bad in ["", "abc", "12a", "../1", "1/2", "-5", "123456789012345678901"] {
            assert!(
                matches!(validate_survey_id(bad), Err(ResultsError::InvalidSurveyId(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_table_path() {
        assert_eq!(
            table_path(Path::new("/srv/data"), "42"),
            PathBuf::from("/srv/data/42-results.csv")
        );
    }
}
