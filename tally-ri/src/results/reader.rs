//! Read path for results tables
//!
//! Readers take no lock. Writers only ever append one whole line or swap the
//! file by rename, so a read sees either the state before or after a write.

use super::codec;
use super::error::{ResultsError, ResultsResult};
use super::record::Record;
use super::{table_path, validate_survey_id};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Decoded table: header plus rows keyed by it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResultSet {
    pub header: Vec<String>,
    pub rows: Vec<Record>,
}

impl ResultSet {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct ResultsReader {
    data_dir: PathBuf,
}

impl ResultsReader {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            data_dir: data_dir.to_path_buf(),
        }
    }

    /// Exact bytes of the table as text
    pub async fn raw_table(&self, survey_id: &str) -> ResultsResult<String> {
        validate_survey_id(survey_id)?;
        match tokio::fs::read_to_string(table_path(&self.data_dir, survey_id)).await {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ResultsError::NoData(survey_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Decoded rows; a table holding only a header yields an empty set
    pub async fn rows(&self, survey_id: &str) -> ResultsResult<ResultSet> {
        let text = self.raw_table(survey_id).await?;
        Ok(codec::parse_table(&text)?
            .map(|table| ResultSet {
                header: table.header,
                rows: table.rows,
            })
            .unwrap_or_default())
    }
}
