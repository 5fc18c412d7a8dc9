//! Shardpage - Paginated, Deduplicated Access to CSV Shards
//!
//! A data access layer over a large append-only collection of CSV shard
//! files in object storage, indexed by per-shard metadata descriptors in a
//! document store. Callers ask for logical pages (search key, sort key, sort
//! direction, page size, page number); the crate resolves which shards
//! intersect the requested row range, fetches only those, eliminates
//! cross-shard duplicate records while preserving global row numbering, and
//! expands the search window until a full page of unique rows is assembled.
//! Duplicates and empty shards discovered along the way are repaired in the
//! background after the response is returned.
//!
//! # Overview
//!
//! - **Virtual row index**: a monotonic global row numbering recomputed per
//!   query from cumulative shard row counts, never stored and never locked
//! - **Self-healing**: duplicate shards are rewritten and empty shards
//!   deleted by a fire-and-forget repair worker whose failures never reach
//!   callers
//! - **Bounded fetch pool**: shard downloads run three at a time, a
//!   deliberate throttle against upstream storage rate limits
//! - **Injected seams**: the document store, object store, and billing gate
//!   sit behind traits, so test doubles and real drivers plug in alike
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use shardpage::metadata_store::InMemoryMetadataStore;
//! use shardpage::credit_gate::InMemoryCreditGate;
//! use shardpage::{DataService, PageRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let metadata = Arc::new(InMemoryMetadataStore::new());
//!     let gate = Arc::new(InMemoryCreditGate::new());
//!     let service = DataService::new(metadata, gate);
//!
//!     let response = service
//!         .get_page(&PageRequest::latest("reddit", 1, 100), "my-api-key")
//!         .await?;
//!     println!("{} rows from {} shard files", response.data.len(), response.files_read);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Consistency
//!
//! Within one response, rows arrive in ascending virtual-row order. No
//! ordering is promised across separate requests: background repair shrinks
//! shard row counts, which can shift virtual-row boundaries between calls.
//! This eventual-consistency caveat is the price of maintaining the index
//! without global locks.
pub mod credit_gate;
pub mod error;
pub mod metadata_store;
pub mod paging;
pub mod records;
pub mod repair;
#[cfg(test)]
pub mod unit_tests;
pub mod utils;

use crate::credit_gate::CreditGate;
use crate::error::AccessError;
use crate::metadata_store::{MetadataStore, SortDirection};
use crate::paging::expansion_loop::ExpansionLoop;
use crate::records::IndexedRecord;
use crate::repair::ShardRepairWorker;
use crate::utils::object_store_cache::store_for_bucket;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

// ============================================================================
// Public Types
// ============================================================================

/// Tuning knobs for the read path and repair worker.
///
/// The defaults mirror the production constants; the skip thresholds in
/// particular are empirically chosen and exposed here rather than hard-coded.
#[derive(Debug, Clone)]
pub struct PagerConfig {
    /// Appended to the source name to form its bucket (`redditscrapingbucket`).
    pub bucket_suffix: String,
    /// Concurrent shard downloads per request.
    pub fetch_concurrency: usize,
    /// Above this many duplicates in one cycle's raw fetch, the expansion
    /// loop jumps past the whole duplicate region instead of advancing
    /// incrementally.
    pub large_skip_threshold: usize,
    /// Shards smaller than this are skipped when no search key is given
    /// (zero disables).
    pub min_unsearched_row_count: u64,
    /// Extra attempts for repair metadata mutations before log-and-abandon.
    pub repair_retry_budget: u32,
}

impl Default for PagerConfig {
    fn default() -> Self {
        PagerConfig {
            bucket_suffix: "scrapingbucket".to_string(),
            fetch_concurrency: 3,
            large_skip_threshold: 100,
            min_unsearched_row_count: 10,
            repair_retry_budget: 5,
        }
    }
}

impl PagerConfig {
    /// Bucket holding a source's shards.
    pub fn bucket_for(&self, source_name: &str) -> String {
        format!("{source_name}{}", self.bucket_suffix)
    }

    /// Key prefix for a source's shards inside its bucket.
    pub fn prefix_for(&self, source_name: &str) -> String {
        format!("{source_name}/")
    }
}

/// One logical page request as accepted at the boundary.
#[derive(Debug, Clone)]
pub struct PageRequest {
    /// Logical collection to page over (`reddit`, `twitter`, `test`, ...).
    pub source_name: String,
    pub page_size: u64,
    /// 1-based page number.
    pub page_number: u64,
    /// Descriptor field to sort shards by; defaults to newest-first by
    /// creation time when absent.
    pub sort_key: Option<String>,
    /// Restrict to shards tagged with this search key
    /// (case/accent-insensitive).
    pub search_key: Option<String>,
    pub sort_direction: SortDirection,
}

impl PageRequest {
    /// A plain "latest data" request: default ordering, no search filter.
    pub fn latest(source_name: &str, page_number: u64, page_size: u64) -> Self {
        PageRequest {
            source_name: source_name.to_string(),
            page_size,
            page_number,
            sort_key: None,
            search_key: None,
            sort_direction: SortDirection::default(),
        }
    }

    /// First virtual row of the requested page (1-based, inclusive).
    pub fn lower_bound(&self) -> u64 {
        (self.page_number - 1) * self.page_size + 1
    }

    /// Last virtual row of the requested page (inclusive).
    pub fn upper_bound(&self) -> u64 {
        self.lower_bound() + self.page_size - 1
    }
}

/// The caller-visible result of one page request.
#[derive(Debug, Serialize)]
pub struct PageResponse {
    /// Shard files read across all expansion cycles.
    pub files_read: usize,
    /// End-to-end time in seconds.
    pub total_duration: f64,
    /// Time spent querying the metadata store, in seconds.
    pub metadata_store_duration: f64,
    /// Time spent fetching and parsing shard files, in seconds.
    pub object_store_duration: f64,
    /// The page rows, leading global row index first.
    pub data: Vec<IndexedRecord>,
}

// ============================================================================
// Service
// ============================================================================

/// The paginated data access service.
///
/// Holds the injected store and gate handles (constructed once, reused for
/// every request) plus the pager configuration. Object stores are resolved
/// per source bucket through the process-wide cache.
pub struct DataService {
    metadata_store: Arc<dyn MetadataStore>,
    credit_gate: Arc<dyn CreditGate>,
    config: PagerConfig,
}

impl DataService {
    pub fn new(metadata_store: Arc<dyn MetadataStore>, credit_gate: Arc<dyn CreditGate>) -> Self {
        Self::with_config(metadata_store, credit_gate, PagerConfig::default())
    }

    pub fn with_config(
        metadata_store: Arc<dyn MetadataStore>,
        credit_gate: Arc<dyn CreditGate>,
        config: PagerConfig,
    ) -> Self {
        DataService {
            metadata_store,
            credit_gate,
            config,
        }
    }

    pub fn config(&self) -> &PagerConfig {
        &self.config
    }

    /// Serve one page request.
    ///
    /// Validates the request, runs the duplicate-expansion loop, consumes one
    /// credit for `api_key`, kicks off background repair for any flagged
    /// shards, and returns the assembled page with timing detail.
    ///
    /// # Errors
    ///
    /// - `InvalidQuery`: empty-string search/sort key, or a zero page size
    ///   or page number; rejected before any store access
    /// - `MetadataUnavailable`: the descriptor query failed
    /// - `ObjectStore`: a shard fetch or parse failed (the whole page is
    ///   aborted; no partial results)
    /// - `CreditGate`: the gate refused; the assembled page is withheld
    ///
    /// Repair failures never appear here: they are logged and abandoned
    /// inside the detached worker.
    pub async fn get_page(
        &self,
        request: &PageRequest,
        api_key: &str,
    ) -> Result<PageResponse, AccessError> {
        validate_request(request)?;
        let started = Instant::now();

        let bucket = self.config.bucket_for(&request.source_name);
        let prefix = self.config.prefix_for(&request.source_name);
        let object_store = store_for_bucket(&bucket).map_err(AccessError::object_store)?;

        let outcome = ExpansionLoop::new(
            self.metadata_store.as_ref(),
            Arc::clone(&object_store),
            &prefix,
            &self.config,
        )
        .run(
            &request.source_name,
            request.sort_key.as_deref(),
            request.search_key.as_deref(),
            request.sort_direction,
            request.lower_bound(),
            request.upper_bound(),
        )
        .await?;

        let data = paging::assembler::finalize(
            outcome.records,
            request.lower_bound(),
            request.page_size as usize,
        );

        // Repair what the request discovered, detached from this response
        if !outcome.repair_plan.is_empty() {
            ShardRepairWorker::new(
                Arc::clone(&self.metadata_store),
                object_store,
                &prefix,
                self.config.repair_retry_budget,
            )
            .spawn(outcome.repair_plan);
        }

        // The gate is consumed once per completed request, before the result
        // is released
        self.credit_gate
            .consume(api_key)
            .await
            .map_err(|error| AccessError::CreditGate(error.to_string()))?;

        Ok(PageResponse {
            files_read: outcome.files_read,
            total_duration: started.elapsed().as_secs_f64(),
            metadata_store_duration: outcome.metadata_seconds,
            object_store_duration: outcome.object_store_seconds,
            data,
        })
    }
}

fn validate_request(request: &PageRequest) -> Result<(), AccessError> {
    if request.page_size == 0 {
        return Err(AccessError::InvalidQuery(
            "page size must be at least 1".into(),
        ));
    }
    if request.page_number == 0 {
        return Err(AccessError::InvalidQuery("page number is 1-based".into()));
    }
    if request.search_key.as_deref() == Some("") || request.sort_key.as_deref() == Some("") {
        return Err(AccessError::InvalidQuery(
            "searchKey and sortKey must not be empty; omit the parameter or URL-encode special characters"
                .into(),
        ));
    }
    Ok(())
}
