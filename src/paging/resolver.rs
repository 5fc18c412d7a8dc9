//! Shard index resolver.
//!
//! Walks the source's shard descriptors in query order, layering a monotonic
//! virtual row index over the physically variable-length shard files: each
//! descriptor occupies the row range `[running + 1, running + row_count]`.
//! The virtual index is never stored: it is recomputed from the descriptors
//! on every call, which is what keeps the read path consistent without locks
//! (for a fixed ordering and a consistent set of row counts, the same record
//! always maps to the same virtual row number).

use crate::error::AccessError;
use crate::metadata_store::{DescriptorQuery, MetadataStore, SortDirection};

/// The resolver's answer for one window.
#[derive(Debug, Clone, Default)]
pub struct ResolvedWindow {
    /// Cumulative end row of the last descriptor walked (end of data when the
    /// walk was not short-circuited). The assembler's trim arithmetic hangs
    /// off this value.
    pub last_row_number: u64,
    /// Shard files whose occupied row ranges overlap the requested window,
    /// in descriptor order.
    pub file_names: Vec<String>,
    /// Shards recorded with zero rows: excluded from row accounting and
    /// flagged for deletion by the repair worker.
    pub empty_file_names: Vec<String>,
}

/// Resolves which shard files intersect a virtual row window.
pub struct ShardIndexResolver<'a> {
    store: &'a dyn MetadataStore,
    /// Descriptors below this row count are skipped entirely (excluded from
    /// row accounting) when no search key is given. Zero disables the skip.
    min_unsearched_row_count: u64,
}

impl<'a> ShardIndexResolver<'a> {
    pub fn new(store: &'a dyn MetadataStore, min_unsearched_row_count: u64) -> Self {
        ShardIndexResolver {
            store,
            min_unsearched_row_count,
        }
    }

    /// Resolve the shard files whose row ranges overlap
    /// `[lower_bound, upper_bound]` for `source_name`.
    ///
    /// Descriptors are walked in the query's sort order (by `sort_key` and
    /// `sort_direction` when given, else newest-first by creation time),
    /// accumulating a running end-exclusive row offset. The walk
    /// short-circuits as soon as a descriptor's starting row exceeds
    /// `upper_bound`, since later descriptors in sort order cannot intersect the
    /// window.
    ///
    /// # Errors
    ///
    /// `MetadataUnavailable` when the descriptor query fails. Not retried
    /// here; the caller decides.
    pub async fn resolve(
        &self,
        sort_key: Option<&str>,
        search_key: Option<&str>,
        sort_direction: SortDirection,
        lower_bound: u64,
        upper_bound: u64,
        source_name: &str,
    ) -> Result<ResolvedWindow, AccessError> {
        let query = DescriptorQuery {
            source_name: source_name.to_string(),
            search_key: search_key.map(str::to_string),
            sort_key: sort_key.map(str::to_string),
            sort_direction,
        };
        let descriptors = self
            .store
            .find_descriptors(&query)
            .await
            .map_err(AccessError::metadata)?;

        let mut resolved = ResolvedWindow::default();
        let mut last_row_number = 0u64;

        for descriptor in descriptors {
            if descriptor.row_count == 0 {
                resolved.empty_file_names.push(descriptor.file_name);
                continue;
            }
            if search_key.is_none() && descriptor.row_count < self.min_unsearched_row_count {
                continue;
            }

            let first_row_number = last_row_number + 1;
            last_row_number = first_row_number + descriptor.row_count - 1;

            if first_row_number > upper_bound {
                // Revert to the previous cumulative end; this descriptor and
                // everything after it lie past the window
                last_row_number = first_row_number - 1;
                break;
            }
            if last_row_number < lower_bound {
                continue;
            }
            resolved.file_names.push(descriptor.file_name);
        }

        resolved.last_row_number = last_row_number;
        Ok(resolved)
    }
}
