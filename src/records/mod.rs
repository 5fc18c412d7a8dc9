//! Record schema and batch operations.
//!
//! Shards are CSV files sharing one fixed schema across sources; every field
//! is optional because the upstream scrapers do not populate all columns for
//! every source. Each parsed record carries the name of the shard file it came
//! from (provenance) so the repair worker can target the exact file that
//! contributed a duplicate. Provenance is dropped when the final response is
//! assembled.

pub mod csv_codec;

use indexmap::IndexSet;
use serde::Serialize;

// Link to test module (only compiled during tests)
#[cfg(test)]
#[path = "tests/mod.rs"]
mod tests;

/// One logical record parsed from a shard file.
///
/// The content URL doubles as the record's identity for duplicate detection:
/// two records with the same `url` are the same logical record regardless of
/// which shard they were read from. A record without a URL carries no content
/// identity and never participates in duplicate detection.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: Option<String>,
    pub url: Option<String>,
    pub text: Option<String>,
    pub likes: Option<i64>,
    pub data_type: Option<String>,
    pub timestamp: Option<String>,
    /// Originating shard file name (provenance). Not part of the content.
    pub shard_file: String,
}

impl Record {
    /// An empty record tagged with its originating shard file.
    pub fn empty(shard_file: &str) -> Self {
        Record {
            id: None,
            url: None,
            text: None,
            likes: None,
            data_type: None,
            timestamp: None,
            shard_file: shard_file.to_string(),
        }
    }
}

/// An ordered sequence of records drawn from one or more shards.
#[derive(Debug, Clone, Default)]
pub struct RecordBatch {
    pub records: Vec<Record>,
}

impl RecordBatch {
    pub fn new(records: Vec<Record>) -> Self {
        RecordBatch { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Append another batch, preserving arrival order.
    pub fn concat(&mut self, other: RecordBatch) {
        self.records.extend(other.records);
    }
}

/// A record in the final response: the contiguous global row index leads,
/// provenance is gone, and the remaining columns keep their original order.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct IndexedRecord {
    pub index: u64,
    pub id: Option<String>,
    pub url: Option<String>,
    pub text: Option<String>,
    pub likes: Option<i64>,
    #[serde(rename = "dataType")]
    pub data_type: Option<String>,
    pub timestamp: Option<String>,
}

impl IndexedRecord {
    pub fn from_record(record: Record, index: u64) -> Self {
        IndexedRecord {
            index,
            id: record.id,
            url: record.url,
            text: record.text,
            likes: record.likes,
            data_type: record.data_type,
            timestamp: record.timestamp,
        }
    }
}

/// Splits `records` into kept records and duplicates, keyed by content URL.
///
/// First occurrence (by arrival order) wins; later records with an
/// already-seen URL land in the duplicate list. Records without a URL are
/// always kept. Relative order is preserved on both sides.
///
/// Running this twice is idempotent: a second pass over the kept records
/// finds zero duplicates.
pub fn dedup_by_url(records: Vec<Record>) -> (Vec<Record>, Vec<Record>) {
    let mut seen: IndexSet<String> = IndexSet::with_capacity(records.len());
    let mut kept = Vec::with_capacity(records.len());
    let mut duplicates = Vec::new();

    for record in records {
        match &record.url {
            Some(url) => {
                if seen.insert(url.clone()) {
                    kept.push(record);
                } else {
                    duplicates.push(record);
                }
            }
            None => kept.push(record),
        }
    }

    (kept, duplicates)
}
