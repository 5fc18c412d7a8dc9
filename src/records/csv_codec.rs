//! CSV codec for shard files.
//!
//! Parses and formats RFC 4180 CSV: values containing `,`, `"`, or newlines
//! are wrapped in double-quotes with internal `"` doubled. Columns are matched
//! to record fields by header name, so shards written with columns in any
//! order parse identically; unknown columns are ignored and missing columns
//! read as `None`. The formatter always emits the canonical header, which is
//! what the repair worker writes back when it rewrites a shard.

use super::Record;
use thiserror::Error;

/// Canonical column order for written shards (`dataType` on the wire).
const HEADER: &str = "id,url,text,likes,dataType,timestamp";

/// A shard file that could not be parsed as CSV.
#[derive(Debug, Error)]
pub enum CsvError {
    #[error("shard file is empty (no header row)")]
    MissingHeader,

    #[error("unterminated quoted value starting near byte {0}")]
    UnterminatedQuote(usize),

    #[error("value is not valid UTF-8 near byte {0}")]
    InvalidUtf8(usize),

    #[error("row {row}: '{value}' is not a valid likes count")]
    InvalidLikes { row: usize, value: String },
}

/// Parse a shard file's bytes into records, tagging each with `shard_file`.
///
/// The first row is the header; every following non-empty row becomes one
/// record. A trailing newline does not produce an empty record.
pub fn parse_records(input: &[u8], shard_file: &str) -> Result<Vec<Record>, CsvError> {
    let rows = split_rows(input)?;
    let mut rows = rows.into_iter();

    let header = rows.next().ok_or(CsvError::MissingHeader)?;
    let columns: Vec<Column> = header.iter().map(|name| Column::from_name(name)).collect();

    let mut records = Vec::new();
    for (row_idx, cells) in rows.enumerate() {
        let mut record = Record::empty(shard_file);
        for (cell, column) in cells.into_iter().zip(columns.iter()) {
            if cell.is_empty() {
                continue;
            }
            match column {
                Column::Id => record.id = Some(cell),
                Column::Url => record.url = Some(cell),
                Column::Text => record.text = Some(cell),
                Column::Likes => {
                    record.likes = Some(parse_likes(&cell).ok_or_else(|| {
                        CsvError::InvalidLikes {
                            // +2: one for the header row, one for 1-based counting
                            row: row_idx + 2,
                            value: cell.clone(),
                        }
                    })?)
                }
                Column::DataType => record.data_type = Some(cell),
                Column::Timestamp => record.timestamp = Some(cell),
                Column::Unknown => {}
            }
        }
        records.push(record);
    }

    Ok(records)
}

/// Format records as shard-file bytes with the canonical header.
///
/// Row order is preserved exactly; the repair worker relies on this when it
/// rewrites a shard minus its duplicates.
pub fn format_records(records: &[Record]) -> Vec<u8> {
    // 64 bytes per cell is a comfortable overestimate for scraped rows
    let mut out = Vec::with_capacity(HEADER.len() + 1 + records.len() * 6 * 64);
    out.extend_from_slice(HEADER.as_bytes());
    out.push(b'\n');

    let mut likes_buf = String::new();
    for record in records {
        write_cell(&mut out, record.id.as_deref());
        out.push(b',');
        write_cell(&mut out, record.url.as_deref());
        out.push(b',');
        write_cell(&mut out, record.text.as_deref());
        out.push(b',');
        likes_buf.clear();
        if let Some(likes) = record.likes {
            likes_buf = likes.to_string();
        }
        write_cell(&mut out, Some(likes_buf.as_str()).filter(|s| !s.is_empty()));
        out.push(b',');
        write_cell(&mut out, record.data_type.as_deref());
        out.push(b',');
        write_cell(&mut out, record.timestamp.as_deref());
        out.push(b'\n');
    }

    out
}

/// Known shard columns, plus a sink for anything unrecognized.
enum Column {
    Id,
    Url,
    Text,
    Likes,
    DataType,
    Timestamp,
    Unknown,
}

impl Column {
    fn from_name(name: &str) -> Self {
        match name {
            "id" => Column::Id,
            "url" => Column::Url,
            "text" => Column::Text,
            "likes" => Column::Likes,
            "dataType" => Column::DataType,
            "timestamp" => Column::Timestamp,
            _ => Column::Unknown,
        }
    }
}

/// Parse a likes count, tolerating the `12.0` float renderings some upstream
/// writers produce for integer columns.
fn parse_likes(cell: &str) -> Option<i64> {
    if let Ok(n) = cell.parse::<i64>() {
        return Some(n);
    }
    match cell.parse::<f64>() {
        Ok(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Some(f as i64),
        _ => None,
    }
}

/// Split raw CSV bytes into rows of unescaped cells.
///
/// Handles quoted values (including embedded delimiters, quotes, and
/// newlines), both `\n` and `\r\n` row endings, and a trailing newline.
fn split_rows(input: &[u8]) -> Result<Vec<Vec<String>>, CsvError> {
    let mut rows = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut cell: Vec<u8> = Vec::new();
    // Distinguishes a truly empty trailing line from a row ending in an
    // empty cell ("a,b," has three cells, "" after "a,b,\n" has none).
    let mut row_started = false;

    let mut i = 0;
    let n = input.len();
    while i < n {
        let b = input[i];

        // A quote only opens a quoted cell at a cell boundary; quotes inside
        // an unquoted value are taken literally (lenient, matching common
        // CSV writers).
        if b == b'"' && cell.is_empty() {
            // Quoted cell: scan to the closing quote, unescaping doubled quotes
            let quote_start = i;
            i += 1;
            let mut closed = false;
            while i < n {
                match input[i] {
                    b'"' if i + 1 < n && input[i + 1] == b'"' => {
                        cell.push(b'"');
                        i += 2;
                    }
                    b'"' => {
                        i += 1;
                        closed = true;
                        break;
                    }
                    other => {
                        cell.push(other);
                        i += 1;
                    }
                }
            }
            if !closed {
                return Err(CsvError::UnterminatedQuote(quote_start));
            }
            row_started = true;
            continue;
        }

        match b {
            b',' => {
                row.push(take_cell(&mut cell, i)?);
                row_started = true;
                i += 1;
            }
            b'\r' if i + 1 < n && input[i + 1] == b'\n' => {
                finish_row(&mut rows, &mut row, &mut cell, &mut row_started, i)?;
                i += 2;
            }
            b'\n' | b'\r' => {
                finish_row(&mut rows, &mut row, &mut cell, &mut row_started, i)?;
                i += 1;
            }
            other => {
                cell.push(other);
                row_started = true;
                i += 1;
            }
        }
    }

    // Final row without a trailing newline
    if row_started || !row.is_empty() {
        row.push(take_cell(&mut cell, n)?);
        rows.push(std::mem::take(&mut row));
    }

    Ok(rows)
}

fn take_cell(cell: &mut Vec<u8>, pos: usize) -> Result<String, CsvError> {
    String::from_utf8(std::mem::take(cell)).map_err(|_| CsvError::InvalidUtf8(pos))
}

fn finish_row(
    rows: &mut Vec<Vec<String>>,
    row: &mut Vec<String>,
    cell: &mut Vec<u8>,
    row_started: &mut bool,
    pos: usize,
) -> Result<(), CsvError> {
    if *row_started || !row.is_empty() {
        row.push(take_cell(cell, pos)?);
        rows.push(std::mem::take(row));
    }
    *row_started = false;
    Ok(())
}

/// Write one cell with RFC 4180 quoting: wrap in double-quotes when the value
/// contains `,`, `"`, `\n`, or `\r`, doubling any internal `"`.
fn write_cell(out: &mut Vec<u8>, value: Option<&str>) {
    let Some(value) = value else {
        return;
    };
    let bytes = value.as_bytes();
    let needs_quoting = bytes
        .iter()
        .any(|&b| b == b',' || b == b'"' || b == b'\n' || b == b'\r');

    if !needs_quoting {
        out.extend_from_slice(bytes);
        return;
    }

    out.push(b'"');
    for &b in bytes {
        if b == b'"' {
            out.push(b'"');
        }
        out.push(b);
    }
    out.push(b'"');
}
