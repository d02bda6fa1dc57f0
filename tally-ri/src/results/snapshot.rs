//! Per-submission JSON snapshots
//!
//! Every processed submission is also kept as its own pretty-printed JSON
//! file under `data/submissions/`, independent of the results table.

use super::error::ResultsResult;
use super::record::Record;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    dir: PathBuf,
}

impl SnapshotWriter {
    /// Writer rooted at `<data_dir>/submissions`
    pub fn new(data_dir: &Path) -> Self {
        Self {
            dir: data_dir.join("submissions"),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `record` and return the snapshot path
    pub async fn write(
        &self,
        title: &str,
        at: DateTime<Utc>,
        record: &Record,
    ) -> ResultsResult<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let file_name = format!(
            "{}-{}-{}.json",
            super::archive::sanitize_title(title),
            tally_common::time::filename_stamp(at),
            Uuid::new_v4()
        );
        let path = self.dir.join(file_name);
        let json = serde_json::to_vec_pretty(record)?;
        tokio::fs::write(&path, json).await?;
        Ok(path)
    }
}
