//! Survey definitions and the read-only survey catalog
//!
//! Surveys are authored elsewhere and stored as a JSON array in
//! `data/surveys.json`. Tally only ever reads that file: to resolve a
//! survey's title for snapshot and archive names.
//!
//! A field's `question` label is the column identity in the results table.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One question in a survey form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FormField {
    Text {
        question: String,
        #[serde(default)]
        required: bool,
    },
    #[serde(rename = "textarea")]
    TextArea {
        question: String,
        #[serde(default)]
        required: bool,
    },
    Radio {
        question: String,
        #[serde(default)]
        options: Vec<String>,
        #[serde(default)]
        required: bool,
    },
    Checkbox {
        question: String,
        #[serde(default)]
        options: Vec<String>,
        #[serde(default)]
        required: bool,
    },
    Date {
        question: String,
        #[serde(default)]
        required: bool,
    },
    Number {
        question: String,
        #[serde(default)]
        required: bool,
    },
    File {
        question: String,
        #[serde(default)]
        required: bool,
    },
    Email {
        question: String,
        #[serde(default)]
        required: bool,
    },
}

/// Survey definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Survey {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub visible: bool,
    #[serde(default)]
    pub form_fields: Vec<FormField>,
}

/// Read-only view of `surveys.json`
#[derive(Debug, Clone)]
pub struct SurveyCatalog {
    path: PathBuf,
}

impl SurveyCatalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All surveys; a missing or blank catalog file is an empty catalog
    pub async fn list(&self) -> Result<Vec<Survey>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    pub async fn get_survey(&self, id: i64) -> Result<Option<Survey>> {
        Ok(self.list().await?.into_iter().find(|s| s.id == id))
    }

    /// Like `get_survey` but takes the id as it appears in URLs
    pub async fn get_survey_by_key(&self, key: &str) -> Result<Option<Survey>> {
        let id: i64 = key
            .parse()
            .map_err(|_| Error::InvalidInput(format!("Invalid survey ID: {}", key)))?;
        self.get_survey(id).await
    }
}
