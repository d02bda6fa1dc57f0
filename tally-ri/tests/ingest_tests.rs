//! Integration tests for results ingestion
//!
//! Tests cover:
//! - Table creation, append and header widening (Scenarios A, B)
//! - Legacy tables without a Timestamp column (Scenario C)
//! - Multi-select answers stored as one joined cell (Scenario D)
//! - Append-only header evolution over a sequence of submissions
//! - Attachment references and per-submission snapshots

use std::path::Path;
use tally_common::EventBus;
use tally_ri::results::{
    codec, table_path, GatePolicy, IngestionEngine, Record, ResultsGate, ResultsReader, Upload,
    ATTACHMENT_PREFIX,
};
use tempfile::TempDir;

/// Test helper: engine over a temp data folder
fn setup_engine(data_dir: &Path) -> IngestionEngine {
    IngestionEngine::new(
        data_dir,
        ResultsGate::new(GatePolicy::default()),
        EventBus::new(100),
    )
}

/// Test helper: text answers in submission order
fn answers(pairs: &[(&str, &str)]) -> Record {
    pairs.iter().copied().collect()
}

fn read_table(data_dir: &Path, survey_id: &str) -> codec::ParsedTable {
    let text = std::fs::read_to_string(table_path(data_dir, survey_id)).unwrap();
    codec::parse_table(&text).unwrap().unwrap()
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn test_scenario_a_first_submission_creates_table() {
    let temp_dir = TempDir::new().unwrap();
    let engine = setup_engine(temp_dir.path());

    let receipt = engine
        .ingest("1001", answers(&[("Name", "Alice"), ("Email", "a@x.com")]), vec![])
        .await
        .unwrap();

    assert_eq!(receipt.row_count, 1);
    assert!(!receipt.migrated);

    let table = read_table(temp_dir.path(), "1001");
    assert_eq!(table.header, vec!["Name", "Email", "Timestamp"]);
    assert_eq!(table.rows.len(), 1);
    assert_eq!(table.rows[0].get("Name"), Some("Alice"));
    assert_eq!(table.rows[0].get("Email"), Some("a@x.com"));
    assert_eq!(table.rows[0].get("Timestamp"), Some(receipt.timestamp.as_str()));
}

#[tokio::test]
async fn test_scenario_b_new_column_migrates_table() {
    let temp_dir = TempDir::new().unwrap();
    let engine = setup_engine(temp_dir.path());

    engine
        .ingest("1001", answers(&[("Name", "Alice"), ("Email", "a@x.com")]), vec![])
        .await
        .unwrap();
    let receipt = engine
        .ingest(
            "1001",
            answers(&[("Name", "Bob"), ("Email", "b@x.com"), ("Phone", "555")]),
            vec![],
        )
        .await
        .unwrap();

    assert!(receipt.migrated);
    assert_eq!(receipt.row_count, 2);
    assert_eq!(receipt.header, vec!["Name", "Email", "Timestamp", "Phone"]);

    let table = read_table(temp_dir.path(), "1001");
    assert_eq!(table.header, vec!["Name", "Email", "Timestamp", "Phone"]);
    assert_eq!(table.rows[0].get("Name"), Some("Alice"));
    assert_eq!(table.rows[0].get("Phone"), Some(""));
    assert_eq!(table.rows[1].get("Name"), Some("Bob"));
    assert_eq!(table.rows[1].get("Phone"), Some("555"));

    // Every physical line is fully quoted after the rewrite
    let text = std::fs::read_to_string(table_path(temp_dir.path(), "1001")).unwrap();
    for line in text.lines() {
        assert!(line.starts_with('"') && line.ends_with('"'), "unquoted line {line:?}");
    }
}

#[tokio::test]
async fn test_scenario_c_legacy_table_gains_timestamp() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(
        table_path(temp_dir.path(), "7"),
        "Name,Email\nAlice,a@x.com\n\"Carol, Jr.\",c@x.com\n",
    )
    .unwrap();

    let receipt = setup_engine(temp_dir.path())
        .ingest("7", answers(&[("Name", "Bob")]), vec![])
        .await
        .unwrap();
    assert!(receipt.migrated);
    assert_eq!(receipt.row_count, 3);

    let table = read_table(temp_dir.path(), "7");
    assert_eq!(table.header, vec!["Name", "Email", "Timestamp"]);
    assert_eq!(table.rows[0].get("Email"), Some("a@x.com"));
    assert_eq!(table.rows[0].get("Timestamp"), Some(""));
    assert_eq!(table.rows[1].get("Name"), Some("Carol, Jr."));
    assert_eq!(table.rows[1].get("Timestamp"), Some(""));
    assert_eq!(table.rows[2].get("Name"), Some("Bob"));
    assert_eq!(table.rows[2].get("Email"), Some(""));
    assert!(!table.rows[2].get("Timestamp").unwrap().is_empty());
}

#[tokio::test]
async fn test_scenario_d_multi_select_is_one_cell() {
    let temp_dir = TempDir::new().unwrap();
    setup_engine(temp_dir.path())
        .ingest("3", answers(&[("Colours", "Red, Blue")]), vec![])
        .await
        .unwrap();

    let text = std::fs::read_to_string(table_path(temp_dir.path(), "3")).unwrap();
    assert!(text.lines().nth(1).unwrap().starts_with(r#""Red, Blue","#));

    let set = ResultsReader::new(temp_dir.path()).rows("3").await.unwrap();
    assert_eq!(set.rows[0].get("Colours"), Some("Red, Blue"));
}

// =============================================================================
// Schema evolution
// =============================================================================

#[tokio::test]
async fn test_header_only_grows_and_old_rows_keep_values() {
    let temp_dir = TempDir::new().unwrap();
    let engine = setup_engine(temp_dir.path());

    let submissions: [&[(&str, &str)]; 4] = [
        &[("Q1", "a1")],
        &[("Q2", "b2"), ("Q1", "b1")],
        &[("Q1", "c1")],
        &[("Q3", "d3 \"quoted\""), ("Q2", "d2\nsecond line")],
    ];

    let mut previous: Vec<String> = Vec::new();
    for pairs in submissions {
        let receipt = engine.ingest("11", answers(pairs), vec![]).await.unwrap();
        assert_eq!(&receipt.header[..previous.len()], previous.as_slice());
        previous = receipt.header;
    }
    assert_eq!(previous, vec!["Q1", "Timestamp", "Q2", "Q3"]);

    let table = read_table(temp_dir.path(), "11");
    assert_eq!(table.rows.len(), 4);
    let column = |name: &str| -> Vec<&str> {
        table.rows.iter().map(|r| r.get(name).unwrap()).collect()
    };
    assert_eq!(column("Q1"), vec!["a1", "b1", "c1", ""]);
    assert_eq!(column("Q2"), vec!["", "b2", "", "d2\nsecond line"]);
    assert_eq!(column("Q3"), vec!["", "", "", "d3 \"quoted\""]);
}

#[tokio::test]
async fn test_subset_submission_does_not_rewrite() {
    let temp_dir = TempDir::new().unwrap();
    let engine = setup_engine(temp_dir.path());
    engine
        .ingest("12", answers(&[("Name", "Alice"), ("Email", "a@x.com")]), vec![])
        .await
        .unwrap();

    let before = std::fs::read_to_string(table_path(temp_dir.path(), "12")).unwrap();
    let receipt = engine
        .ingest("12", answers(&[("Name", "Bob")]), vec![])
        .await
        .unwrap();
    assert!(!receipt.migrated);

    let after = std::fs::read_to_string(table_path(temp_dir.path(), "12")).unwrap();
    assert!(after.starts_with(&before), "existing bytes must be untouched by an append");
}

// =============================================================================
// Attachments and snapshots
// =============================================================================

#[tokio::test]
async fn test_upload_reference_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let engine = setup_engine(temp_dir.path());

    let upload = Upload {
        field: "Receipt".to_string(),
        file_name: "scan.PNG".to_string(),
        bytes: vec![0x89, b'P', b'N', b'G'],
    };
    engine
        .ingest("21", answers(&[("Name", "Alice")]), vec![upload])
        .await
        .unwrap();

    let table = read_table(temp_dir.path(), "21");
    let reference = table.rows[0].get("Receipt").unwrap();
    assert!(reference.starts_with(ATTACHMENT_PREFIX));
    assert!(reference.ends_with(".png"));

    // The reference is relative to the root folder holding `data/`
    let stored = temp_dir
        .path()
        .join("uploads")
        .join(reference.strip_prefix(ATTACHMENT_PREFIX).unwrap());
    assert_eq!(std::fs::read(stored).unwrap(), vec![0x89, b'P', b'N', b'G']);

    // A later submission may point at the stored file by reference
    engine
        .ingest("21", answers(&[("Receipt", reference)]), vec![])
        .await
        .unwrap();
}

#[tokio::test]
async fn test_snapshot_written_per_submission() {
    let temp_dir = TempDir::new().unwrap();
    let engine = setup_engine(temp_dir.path());

    engine.ingest("31", answers(&[("A", "1")]), vec![]).await.unwrap();
    engine.ingest("31", answers(&[("A", "2")]), vec![]).await.unwrap();

    let snapshots: Vec<_> = std::fs::read_dir(temp_dir.path().join("submissions"))
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(snapshots.len(), 2);

    for path in snapshots {
        let value: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert!(value["Timestamp"].is_string());
        assert!(value["A"] == "1" || value["A"] == "2");
    }
}

#[tokio::test]
async fn test_no_lock_marker_left_behind() {
    let temp_dir = TempDir::new().unwrap();
    let engine = setup_engine(temp_dir.path());

    engine.ingest("41", answers(&[("A", "1")]), vec![]).await.unwrap();
    engine.ingest("41", answers(&[("B", "2")]), vec![]).await.unwrap();

    let marker = ResultsGate::marker_path(&table_path(temp_dir.path(), "41"));
    assert!(!marker.exists());
}
