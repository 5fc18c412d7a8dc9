//! Shard fetcher.
//!
//! Downloads the resolved shard files from object storage and parses each
//! into records tagged with their originating file name. Fetches run on a
//! small fixed-size worker pool (a throttle against upstream storage rate
//! limits, not a throughput maximization) but results are concatenated in
//! the requested file order regardless of completion order: the assembler's
//! virtual-row trim arithmetic depends on the batch matching descriptor
//! order.

use crate::error::AccessError;
use crate::records::csv_codec::parse_records;
use crate::records::{Record, RecordBatch};
use crate::utils::object_store_cache::shard_path;
use futures::stream::{self, StreamExt};
use object_store::ObjectStore;
use std::sync::Arc;

/// Fetches and parses shard files for one source.
pub struct ShardFetcher {
    store: Arc<dyn ObjectStore>,
    /// Key prefix inside the bucket, trailing separator included.
    prefix: String,
    concurrency: usize,
}

impl ShardFetcher {
    pub fn new(store: Arc<dyn ObjectStore>, prefix: &str, concurrency: usize) -> Self {
        ShardFetcher {
            store,
            prefix: prefix.to_string(),
            concurrency: concurrency.max(1),
        }
    }

    /// Fetch every named shard and concatenate the parsed records.
    ///
    /// All-or-nothing: any individual fetch or parse failure aborts the whole
    /// batch with an `ObjectStore` error carrying the underlying cause;
    /// partial batches are never returned.
    pub async fn fetch(&self, file_names: &[String]) -> Result<RecordBatch, AccessError> {
        let mut fetches = stream::iter(file_names.iter().cloned().map(|file_name| {
            let store = Arc::clone(&self.store);
            let path = shard_path(&self.prefix, &file_name);
            async move {
                let bytes = store.get(&path).await?.bytes().await?;
                let records = parse_records(&bytes, &file_name).map_err(|e| {
                    AccessError::ObjectStore(format!("shard '{file_name}': {e}"))
                })?;
                Ok::<Vec<Record>, AccessError>(records)
            }
        }))
        // buffered, not buffer_unordered: results must land in request order
        .buffered(self.concurrency);

        let mut batch = RecordBatch::default();
        while let Some(result) = fetches.next().await {
            batch.records.extend(result?);
        }
        Ok(batch)
    }
}
