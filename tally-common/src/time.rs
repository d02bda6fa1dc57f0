//! Timestamp utilities
//!
//! Results tables store submission times at minute granularity
//! (`YYYY-MM-DDTHH:MM`). File names derived from times must not contain
//! `:` or `.`, so the filename helpers substitute `-`.

use chrono::{DateTime, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Minute-granularity display stamp, e.g. `2025-12-10T11:05`
pub fn minute_stamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M").to_string()
}

/// Full-precision stamp safe for file names, e.g. `2025-12-10T11-05-42-123Z`
pub fn filename_stamp(at: DateTime<Utc>) -> String {
    filename_safe(&at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
}

/// Replace characters that are awkward in file names (`:` and `.`) with `-`
pub fn filename_safe(stamp: &str) -> String {
    stamp.replace([':', '.'], "-")
}
