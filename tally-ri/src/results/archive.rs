//! Export archive assembly
//!
//! Packs a survey's results into one zip: the raw table at the root as
//! `<base>.csv`, plus every attachment referenced from any cell, staged
//! under the same relative path the cell uses (`data/uploads/<name>`).
//! `<base>` is `<sanitized-title>-<timestamp>`.

use super::attachments::{self, AttachmentStore};
use super::codec;
use super::error::{ResultsError, ResultsResult};
use super::reader::ResultsReader;
use super::record::Record;
use super::TIMESTAMP_COLUMN;
use std::io::{Cursor, Write};
use std::path::Path;
use tally_common::SurveyCatalog;
use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Finished archive, held in memory
#[derive(Debug, Clone)]
pub struct Archive {
    /// `<base>.zip`
    pub file_name: String,
    /// `<base>.csv`, the table's name inside the zip
    pub table_name: String,
    pub bytes: Vec<u8>,
    pub attachment_count: usize,
}

#[derive(Debug, Clone)]
pub struct ArchiveAssembler {
    reader: ResultsReader,
    attachments: AttachmentStore,
    catalog: SurveyCatalog,
}

impl ArchiveAssembler {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            reader: ResultsReader::new(data_dir),
            attachments: AttachmentStore::new(data_dir),
            catalog: SurveyCatalog::new(data_dir.join("surveys.json")),
        }
    }

    /// Build the export archive for `survey_id`
    ///
    /// `progress` receives `0.0` first, then non-decreasing fractions as
    /// entries are staged, and `1.0` last. A survey without data rows fails
    /// with [`ResultsError::NoData`] instead of producing an empty archive.
    pub async fn build_archive(
        &self,
        survey_id: &str,
        progress: &mut (dyn FnMut(f64) + Send),
    ) -> ResultsResult<Archive> {
        progress(0.0);

        let raw = self.reader.raw_table(survey_id).await?;
        let rows = match codec::parse_table(&raw)? {
            Some(table) if !table.rows.is_empty() => table.rows,
            _ => return Err(ResultsError::NoData(survey_id.to_string())),
        };

        let base = format!(
            "{}-{}",
            sanitize_title(&self.survey_title(survey_id).await),
            archive_stamp(&rows)
        );
        let table_name = format!("{}.csv", base);
        let references = referenced_files(&rows);
        let total = references.len() + 1;

        let mut staged = Vec::with_capacity(references.len());
        for file_name in &references {
            let bytes = self.attachments.open(file_name).await?;
            staged.push((format!("{}{}", attachments::ATTACHMENT_PREFIX, file_name), bytes));
        }

        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

        zip.start_file(table_name.as_str(), options)?;
        zip.write_all(raw.as_bytes())?;
        progress(1.0 / (total + 1) as f64);

        for (index, (entry, bytes)) in staged.iter().enumerate() {
            zip.start_file(entry.as_str(), options)?;
            zip.write_all(bytes)?;
            debug!(survey_id, entry = %entry, bytes = bytes.len(), "Attachment staged");
            progress((index + 2) as f64 / (total + 1) as f64);
        }

        let bytes = zip.finish()?.into_inner();
        progress(1.0);

        info!(
            survey_id,
            file = %base,
            rows = rows.len(),
            attachments = references.len(),
            bytes = bytes.len(),
            "Archive assembled"
        );

        Ok(Archive {
            file_name: format!("{}.zip", base),
            table_name,
            bytes,
            attachment_count: references.len(),
        })
    }

    async fn survey_title(&self, survey_id: &str) -> String {
        match self.catalog.get_survey_by_key(survey_id).await {
            Ok(Some(survey)) => survey.title,
            Ok(None) => "survey".to_string(),
            Err(e) => {
                warn!(survey_id, error = %e, "Survey catalog unreadable, using default title");
                "survey".to_string()
            }
        }
    }
}

/// Lowercase, collapse every run of non-`[a-z0-9]` to `-`, trim `-`.
/// Falls back to `survey` when nothing is left.
pub fn sanitize_title(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut pending_dash = false;
    for c in title.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c);
        } else {
            pending_dash = true;
        }
    }
    if out.is_empty() {
        "survey".to_string()
    } else {
        out
    }
}

/// First row's `Timestamp` (minute part) or the current time, filename-safe
fn archive_stamp(rows: &[Record]) -> String {
    let first = rows
        .first()
        .and_then(|row| row.get(TIMESTAMP_COLUMN))
        .filter(|ts| !ts.is_empty());
    let stamp = match first {
        Some(ts) => ts.chars().take(16).collect(),
        None => tally_common::time::minute_stamp(tally_common::time::now()),
    };
    tally_common::time::filename_safe(&stamp)
}

/// Distinct stored file names referenced anywhere, first-seen order
fn referenced_files(rows: &[Record]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for row in rows {
        for value in row.values() {
            for part in value.split(',').map(str::trim) {
                let Some(name) = attachments::file_name_of(part) else {
                    continue;
                };
                if name.contains(['/', '\\']) || name.contains("..") {
                    warn!(reference = part, "Skipping attachment reference outside uploads");
                    continue;
                }
                if !names.iter().any(|n| n == name) {
                    names.push(name.to_string());
                }
            }
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_title() {
        assert_eq!(sanitize_title("Customer Feedback 2025!"), "customer-feedback-2025");
        assert_eq!(sanitize_title("  --Hello,  World--  "), "hello-world");
        assert_eq!(sanitize_title("Café Menu"), "caf-menu");
        assert_eq!(sanitize_title("!!!"), "survey");
        assert_eq!(sanitize_title(""), "survey");
    }

    #[test]
    fn test_archive_stamp_prefers_first_row() {
        let rows: Vec<Record> = vec![
            [("Timestamp", "2025-12-10T11:05")].into_iter().collect(),
            [("Timestamp", "2025-12-11T09:00")].into_iter().collect(),
        ];
        assert_eq!(archive_stamp(&rows), "2025-12-10T11-05");

        let long: Vec<Record> = vec![[("Timestamp", "2025-12-10T11:05:42.123Z")].into_iter().collect()];
        assert_eq!(archive_stamp(&long), "2025-12-10T11-05");
    }

    #[test]
    fn test_archive_stamp_falls_back_to_now() {
        let rows: Vec<Record> = vec![[("Name", "Alice"), ("Timestamp", "")].into_iter().collect()];
        let stamp = archive_stamp(&rows);
        assert_eq!(stamp.len(), 16);
        assert!(!stamp.contains(':'));
    }

    #[test]
    fn test_referenced_files_are_distinct_and_ordered() {
        let rows: Vec<Record> = vec![
            [
                ("Photo", "data/uploads/b.png"),
                ("Docs", "data/uploads/a.pdf, data/uploads/b.png"),
            ]
            .into_iter()
            .collect(),
            [
                ("Photo", "data/uploads/c.jpg"),
                ("Docs", "not, a reference"),
                ("Evil", "data/uploads/../surveys.json"),
            ]
            .into_iter()
            .collect(),
        ];
        assert_eq!(referenced_files(&rows), vec!["b.png", "a.pdf", "c.jpg"]);
    }
}
