//! Background shard repair.
//!
//! Runs after the caller-visible response is produced, fire-and-forget: its
//! failures never surface to any caller. Two independent, idempotent tasks:
//!
//! - **Empty-shard cleanup**: delete the shard object, then its metadata
//!   descriptor.
//! - **Duplicate-shard rewrite**: re-download the shard, recompute its
//!   deduplicated content, and when the row count actually changed, re-upload
//!   under the same key and shrink the descriptor's row count. An unchanged
//!   recompute means a concurrent repair got there first; skip with no write.
//!
//! Metadata mutations get a bounded immediate-retry budget; past it the
//! failure is logged and abandoned. The metadata stays inconsistent until a
//! later pass revisits it, which is acceptable because the resolver treats
//! zero-row descriptors specially regardless of source. Concurrent repair
//! workers on the same shard are safe under last-writer-wins; no distributed
//! lock is used, an explicit accepted risk.

pub mod retry;

use crate::error::RepairError;
use crate::metadata_store::MetadataStore;
use crate::records::csv_codec::{format_records, parse_records};
use crate::records::dedup_by_url;
use crate::repair::retry::retry_immediate;
use crate::utils::object_store_cache::shard_path;
use object_store::ObjectStore;
use std::sync::Arc;


/// Shards flagged during one page request, accumulated across all expansion
/// cycles: distinct provenance files that contributed duplicate rows, and
/// descriptors recorded with zero rows.
#[derive(Debug, Clone, Default)]
pub struct RepairPlan {
    pub source_name: String,
    pub empty_files: Vec<String>,
    pub duplicate_files: Vec<String>,
}

impl RepairPlan {
    pub fn is_empty(&self) -> bool {
        self.empty_files.is_empty() && self.duplicate_files.is_empty()
    }
}

/// How a single duplicate-shard rewrite ended.
#[derive(Debug, PartialEq, Eq)]
enum RewriteOutcome {
    /// Shard rewritten and descriptor row count updated.
    Rewritten { row_count: u64 },
    /// Recompute found nothing to drop (race with a concurrent repair).
    Unchanged,
    /// Shard object already gone.
    Missing,
}

/// Best-effort repairer for one source's shards.
pub struct ShardRepairWorker {
    metadata_store: Arc<dyn MetadataStore>,
    object_store: Arc<dyn ObjectStore>,
    prefix: String,
    /// Extra metadata-mutation attempts after the first failure.
    retry_budget: u32,
}

impl ShardRepairWorker {
    pub fn new(
        metadata_store: Arc<dyn MetadataStore>,
        object_store: Arc<dyn ObjectStore>,
        prefix: &str,
        retry_budget: u32,
    ) -> Self {
        ShardRepairWorker {
            metadata_store,
            object_store,
            prefix: prefix.to_string(),
            retry_budget,
        }
    }

    /// Spawn the repair run detached from the request/response cycle.
    pub fn spawn(self, plan: RepairPlan) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move { self.run(&plan).await })
    }

    /// Run both repair tasks for the plan, logging every outcome.
    pub async fn run(&self, plan: &RepairPlan) {
        for file_name in &plan.empty_files {
            match self.delete_empty_shard(&plan.source_name, file_name).await {
                Ok(()) => {
                    tracing::info!(%file_name, "deleted zero-row shard and its metadata");
                }
                Err(error) => {
                    tracing::error!(%file_name, %error, "abandoning empty-shard cleanup");
                }
            }
        }

        for file_name in &plan.duplicate_files {
            match self
                .rewrite_duplicate_shard(&plan.source_name, file_name)
                .await
            {
                Ok(RewriteOutcome::Rewritten { row_count }) => {
                    tracing::info!(%file_name, row_count, "rewrote shard without duplicates");
                }
                Ok(RewriteOutcome::Unchanged) => {
                    tracing::info!(%file_name, "shard already deduplicated, skipping");
                }
                Ok(RewriteOutcome::Missing) => {
                    tracing::info!(%file_name, "shard object already gone, skipping");
                }
                Err(error) => {
                    tracing::error!(%file_name, %error, "abandoning duplicate-shard rewrite");
                }
            }
        }
    }

    /// Delete a zero-row shard's object, then its descriptor.
    ///
    /// Deleting an object or descriptor that is already gone counts as
    /// success, so re-running a plan is harmless.
    async fn delete_empty_shard(
        &self,
        source_name: &str,
        file_name: &str,
    ) -> Result<(), RepairError> {
        let path = shard_path(&self.prefix, file_name);
        match self.object_store.delete(&path).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => {}
            Err(error) => return Err(RepairError::object(file_name, error)),
        }

        retry_immediate(self.retry_budget, || {
            self.metadata_store.delete_descriptor(source_name, file_name)
        })
        .await
        .map_err(|error| RepairError::metadata(file_name, error))
    }

    /// Re-download a shard, drop its duplicate rows, and write back the
    /// shrunken file and row count.
    async fn rewrite_duplicate_shard(
        &self,
        source_name: &str,
        file_name: &str,
    ) -> Result<RewriteOutcome, RepairError> {
        let path = shard_path(&self.prefix, file_name);

        let bytes = match self.object_store.get(&path).await {
            Ok(result) => result
                .bytes()
                .await
                .map_err(|error| RepairError::object(file_name, error))?,
            Err(object_store::Error::NotFound { .. }) => return Ok(RewriteOutcome::Missing),
            Err(error) => return Err(RepairError::object(file_name, error)),
        };

        let records = parse_records(&bytes, file_name)
            .map_err(|error| RepairError::object(file_name, error))?;
        let row_count_before = records.len();

        let (kept, _duplicates) = dedup_by_url(records);
        if kept.len() == row_count_before {
            return Ok(RewriteOutcome::Unchanged);
        }
        let row_count = kept.len() as u64;

        // Same key: readers between the put and the metadata update see a
        // shorter file with a stale row count until the next repair pass
        // reconciles it (the accepted last-writer-wins window)
        self.object_store
            .put(&path, format_records(&kept).into())
            .await
            .map_err(|error| RepairError::object(file_name, error))?;

        retry_immediate(self.retry_budget, || {
            self.metadata_store
                .set_row_count(source_name, file_name, row_count)
        })
        .await
        .map_err(|error| RepairError::metadata(file_name, error))?;

        Ok(RewriteOutcome::Rewritten { row_count })
    }
}
