//! Row codec for results tables
//!
//! Writing: every field is wrapped in double quotes and embedded quotes are
//! doubled, so commas, quotes and line breaks inside answers survive.
//! Fields are always emitted one per header column; a column missing from
//! the record becomes `""`.
//!
//! Reading: accepts quoted and unquoted fields (older tables were written
//! with minimal quoting), `\n` and `\r\n` record separators, and line breaks
//! inside quoted fields. Values are never type-inferred.

use super::error::{ResultsError, ResultsResult};
use super::record::Record;

/// Quote one field
pub fn encode_field(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if c == '"' {
            out.push('"');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Header line, without the trailing newline
pub fn encode_header(header: &[String]) -> String {
    header
        .iter()
        .map(|column| encode_field(column))
        .collect::<Vec<_>>()
        .join(",")
}

/// Data line against `header`, without the trailing newline
pub fn encode_record(header: &[String], record: &Record) -> String {
    header
        .iter()
        .map(|column| encode_field(record.get(column).unwrap_or("")))
        .collect::<Vec<_>>()
        .join(",")
}

/// Decode a header line into column names
pub fn decode_header(line: &str) -> ResultsResult<Vec<String>> {
    decode_line(line)
}

/// Decode exactly one logical record
pub fn decode_line(line: &str) -> ResultsResult<Vec<String>> {
    let parsed = parse_record(line, 0)?;
    if !line[parsed.end..].trim_end_matches(['\r', '\n']).is_empty() {
        return Err(ResultsError::Malformed(
            "expected a single record, found more".to_string(),
        ));
    }
    Ok(parsed.fields)
}

/// Decode every non-blank record of a table text, header included
pub fn decode_records(text: &str) -> ResultsResult<Vec<Vec<String>>> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut records = Vec::new();
    let mut pos = 0;
    while pos < text.len() {
        let parsed = parse_record(text, pos)?;
        if !parsed.blank {
            records.push(parsed.fields);
        }
        pos = parsed.end;
    }
    Ok(records)
}

/// Header plus rows keyed by that header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTable {
    pub header: Vec<String>,
    pub rows: Vec<Record>,
}

/// Parse a whole table. `None` when the text holds no header at all.
///
/// Short rows read back as `""` for the missing trailing columns; values
/// beyond the header width are dropped.
pub fn parse_table(text: &str) -> ResultsResult<Option<ParsedTable>> {
    let mut records = decode_records(text)?.into_iter();
    let Some(header) = records.next() else {
        return Ok(None);
    };

    let rows = records.map(|values| row_to_record(&header, values)).collect();
    Ok(Some(ParsedTable { header, rows }))
}

/// Key positional values by `header`
pub fn row_to_record(header: &[String], values: Vec<String>) -> Record {
    let mut values = values.into_iter();
    header
        .iter()
        .map(|column| (column.clone(), values.next().unwrap_or_default()))
        .collect()
}

struct ParsedRecord {
    fields: Vec<String>,
    /// Byte offset just past the record separator
    end: usize,
    /// Physical line was empty
    blank: bool,
}

fn parse_record(input: &str, start: usize) -> ResultsResult<ParsedRecord> {
    let bytes = input.as_bytes();
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut quoted = false;
    let mut chars = input[start..].char_indices().peekable();
    let mut end = input.len();

    while let Some((offset, c)) = chars.next() {
        let at = start + offset;
        if in_quotes {
            if c == '"' {
                if chars.peek().map(|&(_, next)| next) == Some('"') {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(c);
            }
            continue;
        }

        match c {
            ',' => {
                fields.push(std::mem::take(&mut field));
                quoted = false;
            }
            '"' if field.is_empty() && !quoted => {
                in_quotes = true;
                quoted = true;
            }
            '\n' => {
                end = at + 1;
                break;
            }
            '\r' => {
                end = if bytes.get(at + 1) == Some(&b'\n') {
                    at + 2
                } else {
                    at + 1
                };
                break;
            }
            other => field.push(other),
        }
    }

    if in_quotes {
        return Err(ResultsError::Malformed(format!(
            "unterminated quoted field starting near byte {}",
            start
        )));
    }

    let blank = fields.is_empty() && field.is_empty() && !quoted;
    fields.push(field);
    Ok(ParsedRecord { fields, end, blank })
}
