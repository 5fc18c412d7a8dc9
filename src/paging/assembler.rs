//! Page assembler.
//!
//! Turns a concatenated shard batch into the exact requested row window and,
//! on the final pass, into the caller-visible page: a contiguous global row
//! index is assigned and moved to the leading position, provenance is
//! dropped, and the remaining columns keep their original order. Surviving
//! rows are never reordered relative to each other.

use crate::records::{IndexedRecord, Record};

/// Trim a concatenated batch to the requested window.
///
/// `last_row_number` is the cumulative end row of the last shard included in
/// the batch, so the batch physically covers virtual rows
/// `[last_row_number - len + 1, last_row_number]`. Rows past `upper_bound`
/// are cut from the tail (`cut_tail = max(last_row_number - upper_bound, 0)`)
/// and rows before `lower_bound` from the head
/// (`cut_start = max(len - (last_row_number - lower_bound) - 1, 0)`).
pub fn trim_to_window(
    mut records: Vec<Record>,
    lower_bound: u64,
    upper_bound: u64,
    last_row_number: u64,
) -> Vec<Record> {
    let total = records.len() as i64;
    let last = last_row_number as i64;

    let cut_tail = (last - upper_bound as i64).max(0) as usize;
    let cut_start = (total - (last - lower_bound as i64) - 1).max(0) as usize;

    records.truncate(records.len().saturating_sub(cut_tail));
    if cut_start > 0 {
        records.drain(..cut_start.min(records.len()));
    }
    records
}

/// Count how many records in a raw batch are duplicates of an earlier record
/// (same content URL, first occurrence not counted).
///
/// The expansion loop uses this pre-trim count to size its large skip: a
/// dense duplicate region in the raw batch means the window should jump well
/// past it instead of re-scanning.
pub fn count_duplicates(records: &[Record]) -> usize {
    let mut seen = hashbrown::HashSet::with_capacity(records.len());
    records
        .iter()
        .filter_map(|r| r.url.as_deref())
        .filter(|url| !seen.insert(*url))
        .count()
}

/// Produce the final page: assign the contiguous index column
/// `[lower_bound ..]`, truncate to the page size, and drop provenance.
///
/// At end of data the page simply runs shorter than requested; the index run
/// is `[lower_bound .. lower_bound + len - 1]` either way.
pub fn finalize(records: Vec<Record>, lower_bound: u64, page_size: usize) -> Vec<IndexedRecord> {
    records
        .into_iter()
        .take(page_size)
        .enumerate()
        .map(|(offset, record)| IndexedRecord::from_record(record, lower_bound + offset as u64))
        .collect()
}
