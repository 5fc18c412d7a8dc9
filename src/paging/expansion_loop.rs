//! Duplicate-expansion loop.
//!
//! Orchestrates resolver → fetcher → assembler until the requested window is
//! filled with unique rows: `FETCHING → DEDUPING → {DONE | EXPAND_AND_REFETCH}`.
//! When a cycle's dedup finds duplicates inside the window, the window
//! advances past them and the cycle repeats; when a cycle finds none (or the
//! resolver runs out of intersecting shards) the loop stops with whatever
//! was accumulated.
//!
//! Termination is deterministic: every expansion strictly advances the
//! window's lower bound, and the source's shard set is finite, so the
//! resolver eventually returns no files even under pathological
//! all-duplicate data.

use crate::error::AccessError;
use crate::metadata_store::{MetadataStore, SortDirection};
use crate::paging::assembler::{count_duplicates, trim_to_window};
use crate::paging::fetcher::ShardFetcher;
use crate::paging::resolver::ShardIndexResolver;
use crate::records::{dedup_by_url, Record};
use crate::repair::RepairPlan;
use crate::PagerConfig;
use indexmap::IndexSet;
use object_store::ObjectStore;
use std::sync::Arc;
use std::time::Instant;

/// What one full loop run produced.
#[derive(Debug)]
pub struct LoopOutcome {
    /// Deduplicated rows covering the requested window, in ascending
    /// virtual-row order. May run short at end of data.
    pub records: Vec<Record>,
    /// Total shard files read across all cycles (re-reads counted).
    pub files_read: usize,
    /// Time spent in metadata-store queries.
    pub metadata_seconds: f64,
    /// Time spent fetching and parsing shard files.
    pub object_store_seconds: f64,
    /// Shards flagged for background repair along the way.
    pub repair_plan: RepairPlan,
}

/// One page request's expansion loop over a single source.
pub struct ExpansionLoop<'a> {
    metadata_store: &'a dyn MetadataStore,
    object_store: Arc<dyn ObjectStore>,
    prefix: String,
    config: &'a PagerConfig,
}

impl<'a> ExpansionLoop<'a> {
    pub fn new(
        metadata_store: &'a dyn MetadataStore,
        object_store: Arc<dyn ObjectStore>,
        prefix: &str,
        config: &'a PagerConfig,
    ) -> Self {
        ExpansionLoop {
            metadata_store,
            object_store,
            prefix: prefix.to_string(),
            config,
        }
    }

    /// Run the loop for the window `[initial_lower, initial_upper]`.
    ///
    /// Any resolver or fetcher error aborts the whole request: no partial
    /// pages. Repair flagging is a side record only; nothing is written to
    /// either store here.
    #[allow(clippy::too_many_arguments)]
    pub async fn run(
        &self,
        source_name: &str,
        sort_key: Option<&str>,
        search_key: Option<&str>,
        sort_direction: SortDirection,
        initial_lower: u64,
        initial_upper: u64,
    ) -> Result<LoopOutcome, AccessError> {
        let resolver =
            ShardIndexResolver::new(self.metadata_store, self.config.min_unsearched_row_count);
        let fetcher = ShardFetcher::new(
            Arc::clone(&self.object_store),
            &self.prefix,
            self.config.fetch_concurrency,
        );

        let mut lower_bound = initial_lower;
        let mut upper_bound = initial_upper;
        let mut page: Vec<Record> = Vec::new();
        let mut empty_files: IndexSet<String> = IndexSet::new();
        let mut duplicate_files: IndexSet<String> = IndexSet::new();
        let mut files_read = 0usize;
        let mut metadata_seconds = 0f64;
        let mut object_store_seconds = 0f64;

        loop {
            let started = Instant::now();
            let resolved = resolver
                .resolve(
                    sort_key,
                    search_key,
                    sort_direction,
                    lower_bound,
                    upper_bound,
                    source_name,
                )
                .await?;
            metadata_seconds += started.elapsed().as_secs_f64();

            empty_files.extend(resolved.empty_file_names.iter().cloned());

            // Data exhausted: the expanded window intersects nothing. Stop
            // with whatever was accumulated, even if duplicates persisted.
            if resolved.file_names.is_empty() {
                break;
            }
            files_read += resolved.file_names.len();

            let started = Instant::now();
            let batch = fetcher.fetch(&resolved.file_names).await?;
            object_store_seconds += started.elapsed().as_secs_f64();

            // Raw (pre-trim) duplicate density steers the large skip below
            let raw_duplicates = count_duplicates(&batch.records);

            page.extend(trim_to_window(
                batch.records,
                lower_bound,
                upper_bound,
                resolved.last_row_number,
            ));

            // Dedup the full accumulated result, not just the newest fetch:
            // a new fetch can duplicate rows kept in an earlier cycle
            let (kept, duplicates) = dedup_by_url(std::mem::take(&mut page));
            page = kept;

            if duplicates.is_empty() {
                break;
            }

            for duplicate in &duplicates {
                duplicate_files.insert(duplicate.shard_file.clone());
            }

            // Advance the window past the duplicates just discovered. A dense
            // duplicate region (raw count past the threshold) gets jumped
            // over entirely instead of being re-scanned window by window.
            let needed = duplicates.len() as u64;
            if raw_duplicates > self.config.large_skip_threshold {
                lower_bound = upper_bound + raw_duplicates as u64 + 1;
                upper_bound = upper_bound + raw_duplicates as u64 + needed;
            } else {
                lower_bound = upper_bound + 1;
                upper_bound += needed;
            }
        }

        Ok(LoopOutcome {
            records: page,
            files_read,
            metadata_seconds,
            object_store_seconds,
            repair_plan: RepairPlan {
                source_name: source_name.to_string(),
                empty_files: empty_files.into_iter().collect(),
                duplicate_files: duplicate_files.into_iter().collect(),
            },
        })
    }
}
