//! Schema evolution for results tables
//!
//! Headers only ever grow: existing columns keep their names and positions,
//! and labels seen for the first time are appended at the end. A rewrite of
//! the whole table (migration) happens only when a column is actually
//! added, or when the table predates the reserved `Timestamp` column.

use super::TIMESTAMP_COLUMN;

/// Outcome of merging a submission's keys into a table header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub merged_header: Vec<String>,
    /// Existing rows must be re-encoded under `merged_header`
    pub migration_required: bool,
    /// Columns appended by this merge, in order
    pub added_columns: Vec<String>,
}

/// Merge `incoming` keys into the `existing` header (absent for a new table)
pub fn resolve<S: AsRef<str>>(existing: Option<&[String]>, incoming: &[S]) -> Resolution {
    let Some(existing) = existing else {
        let mut merged_header: Vec<String> = Vec::with_capacity(incoming.len());
        for key in incoming {
            let key = key.as_ref();
            if !merged_header.iter().any(|c| c == key) {
                merged_header.push(key.to_string());
            }
        }
        return Resolution {
            merged_header,
            migration_required: false,
            added_columns: Vec::new(),
        };
    };

    let legacy = !existing.iter().any(|c| c == TIMESTAMP_COLUMN);

    let mut merged_header = existing.to_vec();
    let mut added_columns = Vec::new();
    for key in incoming {
        let key = key.as_ref();
        if !merged_header.iter().any(|c| c == key) {
            merged_header.push(key.to_string());
            added_columns.push(key.to_string());
        }
    }

    Resolution {
        migration_required: legacy || !added_columns.is_empty(),
        merged_header,
        added_columns,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(columns: &[&str]) -> Vec<String> {
        columns.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_new_table_uses_submission_order() {
        let res = resolve(None, &["Name", "Email", "Timestamp"]);
        assert_eq!(res.merged_header, cols(&["Name", "Email", "Timestamp"]));
        assert!(!res.migration_required);
        assert!(res.added_columns.is_empty());
    }

    #[test]
    fn test_subset_appends_in_place() {
        let existing = cols(&["Name", "Email", "Timestamp"]);
        let res = resolve(Some(&existing), &["Email", "Timestamp"]);
        assert_eq!(res.merged_header, existing);
        assert!(!res.migration_required);
    }

    #[test]
    fn test_new_column_appended_at_end() {
        let existing = cols(&["Name", "Email", "Timestamp"]);
        let res = resolve(Some(&existing), &["Name", "Email", "Phone", "Timestamp"]);
        assert_eq!(res.merged_header, cols(&["Name", "Email", "Timestamp", "Phone"]));
        assert!(res.migration_required);
        assert_eq!(res.added_columns, cols(&["Phone"]));
    }

    #[test]
    fn test_legacy_header_forces_migration() {
        let existing = cols(&["Name", "Email"]);
        let res = resolve(Some(&existing), &["Name", "Email", "Timestamp"]);
        assert_eq!(res.merged_header, cols(&["Name", "Email", "Timestamp"]));
        assert!(res.migration_required);

        // Even when the incoming keys add nothing new
        let res = resolve(Some(&existing), &["Name"]);
        assert_eq!(res.merged_header, existing);
        assert!(res.migration_required);
        assert!(res.added_columns.is_empty());
    }

    #[test]
    fn test_duplicate_incoming_keys_collapse() {
        let res = resolve(None, &["A", "B", "A"]);
        assert_eq!(res.merged_header, cols(&["A", "B"]));

        let existing = cols(&["A", "Timestamp"]);
        let res = resolve(Some(&existing), &["C", "C"]);
        assert_eq!(res.added_columns, cols(&["C"]));
    }

    #[test]
    fn test_header_only_grows_over_a_sequence() {
        let submissions: [&[&str]; 4] = [
            &["Name", "Timestamp"],
            &["Name", "Age", "Timestamp"],
            &["Name", "Timestamp"],
            &["City", "Name", "Age", "Timestamp"],
        ];

        let mut header: Option<Vec<String>> = None;
        for keys in submissions {
            let res = resolve(header.as_deref(), keys);
            if let Some(previous) = &header {
                assert_eq!(&res.merged_header[..previous.len()], previous.as_slice());
            }
            header = Some(res.merged_header);
        }
        assert_eq!(header.unwrap(), cols(&["Name", "Timestamp", "Age", "City"]));
    }
}
