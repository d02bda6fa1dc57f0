//! Ingestion engine
//!
//! Accepts one submission at a time from any number of concurrent callers.
//! Everything up to the gate runs in parallel: attachment persistence,
//! stamping, the JSON snapshot. Inside the gate the table is read, the
//! header merged, and the result committed:
//!
//! - new table, or a widened header: the complete new text is written to a
//!   temporary file beside the table and renamed over it
//! - unchanged header: one encoded line is appended with a single write
//!
//! A failed ingestion never leaves a partially written table behind.

use super::attachments::{self, AttachmentStore};
use super::codec;
use super::error::{ResultsError, ResultsResult};
use super::gate::ResultsGate;
use super::record::Record;
use super::schema;
use super::snapshot::SnapshotWriter;
use super::{table_path, validate_survey_id, TIMESTAMP_COLUMN};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tally_common::{EventBus, SurveyCatalog, TallyEvent};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// One uploaded file part of a submission
#[derive(Debug, Clone)]
pub struct Upload {
    /// Question label the file answers
    pub field: String,
    /// File name as sent by the client, used only for its extension
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Acknowledgement of a merged submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReceipt {
    pub survey_id: String,
    /// Data rows in the table after the merge
    pub row_count: usize,
    /// Table was rewritten under a widened header
    pub migrated: bool,
    pub header: Vec<String>,
    /// Value stamped into the `Timestamp` column
    pub timestamp: String,
}

struct Commit {
    header: Vec<String>,
    row_count: usize,
    migrated: bool,
}

#[derive(Debug, Clone)]
pub struct IngestionEngine {
    data_dir: PathBuf,
    attachments: AttachmentStore,
    snapshots: SnapshotWriter,
    catalog: SurveyCatalog,
    gate: ResultsGate,
    event_bus: EventBus,
}

impl IngestionEngine {
    pub fn new(data_dir: &Path, gate: ResultsGate, event_bus: EventBus) -> Self {
        Self {
            data_dir: data_dir.to_path_buf(),
            attachments: AttachmentStore::new(data_dir),
            snapshots: SnapshotWriter::new(data_dir),
            catalog: SurveyCatalog::new(data_dir.join("surveys.json")),
            gate,
            event_bus,
        }
    }

    pub fn gate(&self) -> &ResultsGate {
        &self.gate
    }

    /// Merge one submission into the survey's results table
    ///
    /// `fields` holds the text answers in submission order. Each upload
    /// replaces its field's value with the stored attachment reference;
    /// several uploads for one field share a single `", "`-joined cell.
    /// A caller-supplied `Timestamp` is overwritten.
    pub async fn ingest(
        &self,
        survey_id: &str,
        fields: Record,
        uploads: Vec<Upload>,
    ) -> ResultsResult<IngestReceipt> {
        validate_survey_id(survey_id)?;
        self.check_references(&fields).await?;

        let mut submission = fields;
        let mut references: Vec<(String, Vec<String>)> = Vec::new();
        for upload in uploads {
            let reference = self
                .attachments
                .persist(&upload.file_name, &upload.bytes)
                .await?;
            match references.iter_mut().find(|(field, _)| *field == upload.field) {
                Some((_, refs)) => refs.push(reference),
                None => references.push((upload.field, vec![reference])),
            }
        }
        for (field, refs) in references {
            submission.insert(field, refs.join(", "));
        }

        let now = tally_common::time::now();
        let timestamp = tally_common::time::minute_stamp(now);
        submission.insert(TIMESTAMP_COLUMN, timestamp.clone());

        self.write_snapshot(survey_id, now, &submission).await;

        tokio::fs::create_dir_all(&self.data_dir).await?;
        let table = table_path(&self.data_dir, survey_id);
        let mut guard = self.gate.acquire(&table).await?;
        let committed = commit(&table, &submission).await;
        guard.release().await;
        let commit = committed?;

        info!(
            survey_id,
            row_count = commit.row_count,
            migrated = commit.migrated,
            columns = commit.header.len(),
            "Submission recorded"
        );
        self.event_bus.emit_lossy(TallyEvent::SubmissionRecorded {
            survey_id: survey_id.to_string(),
            row_count: commit.row_count,
            migrated: commit.migrated,
            timestamp: now,
        });

        Ok(IngestReceipt {
            survey_id: survey_id.to_string(),
            row_count: commit.row_count,
            migrated: commit.migrated,
            header: commit.header,
            timestamp,
        })
    }

    /// Text answers that already carry attachment references must point at stored files
    async fn check_references(&self, fields: &Record) -> ResultsResult<()> {
        for value in fields.values() {
            for part in value.split(',').map(str::trim) {
                if !attachments::is_reference(part) {
                    continue;
                }
                if !self.attachments.exists(part).await? {
                    return Err(ResultsError::AttachmentNotFound(part.to_string()));
                }
            }
        }
        Ok(())
    }

    async fn write_snapshot(&self, survey_id: &str, at: chrono::DateTime<chrono::Utc>, submission: &Record) {
        let title = match self.catalog.get_survey_by_key(survey_id).await {
            Ok(Some(survey)) => survey.title,
            Ok(None) => "survey".to_string(),
            Err(e) => {
                warn!(survey_id, error = %e, "Survey catalog unreadable, using default title");
                "survey".to_string()
            }
        };

        match self.snapshots.write(&title, at, submission).await {
            Ok(path) => debug!(survey_id, path = %path.display(), "Submission snapshot written"),
            Err(e) => warn!(survey_id, error = %e, "Failed to write submission snapshot"),
        }
    }
}

/// Read, merge and write. Caller holds the gate.
async fn commit(table: &Path, submission: &Record) -> ResultsResult<Commit> {
    let existing = match tokio::fs::read_to_string(table).await {
        Ok(text) => Some(text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => return Err(e.into()),
    };
    let parsed = match &existing {
        Some(text) => codec::parse_table(text)?,
        None => None,
    };

    let keys: Vec<&str> = submission.keys().collect();
    let resolution = schema::resolve(parsed.as_ref().map(|t| t.header.as_slice()), keys.as_slice());
    let header = resolution.merged_header;
    let new_line = codec::encode_record(&header, submission);

    let (row_count, migrated) = match parsed {
        None => {
            let text = format!("{}\n{}\n", codec::encode_header(&header), new_line);
            write_atomic(table, text.as_bytes()).await?;
            debug!(table = %table.display(), "Results table created");
            (1, false)
        }
        Some(current) if resolution.migration_required => {
            let mut text = codec::encode_header(&header);
            text.push('\n');
            for row in &current.rows {
                text.push_str(&codec::encode_record(&header, row));
                text.push('\n');
            }
            text.push_str(&new_line);
            text.push('\n');
            write_atomic(table, text.as_bytes()).await?;
            debug!(
                table = %table.display(),
                added = ?resolution.added_columns,
                rows = current.rows.len(),
                "Results table migrated"
            );
            (current.rows.len() + 1, true)
        }
        Some(current) => {
            let needs_separator = existing
                .as_deref()
                .is_some_and(|text| !text.is_empty() && !text.ends_with('\n'));
            let line = if needs_separator {
                format!("\n{}\n", new_line)
            } else {
                format!("{}\n", new_line)
            };
            append_line(table, &line).await?;
            (current.rows.len() + 1, false)
        }
    };

    Ok(Commit {
        header,
        row_count,
        migrated,
    })
}

async fn append_line(table: &Path, line: &str) -> ResultsResult<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .append(true)
        .open(table)
        .await?;
    file.write_all(line.as_bytes()).await?;
    file.sync_data().await?;
    Ok(())
}

/// Write to a sibling temp file, sync, then rename over `path`
async fn write_atomic(path: &Path, bytes: &[u8]) -> ResultsResult<()> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("results.csv");
    let tmp = path.with_file_name(format!(".{}.{}.tmp", file_name, Uuid::new_v4().simple()));

    let written: std::io::Result<()> = async {
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        tokio::fs::rename(&tmp, path).await
    }
    .await;

    if let Err(e) = written {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}
