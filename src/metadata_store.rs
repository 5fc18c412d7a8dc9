//! Shard descriptor store trait and in-memory implementation.
//!
//! The metadata store is an external document store; this crate only consumes
//! a narrow query surface from it: find descriptors by source (optionally
//! filtered by search key with case/accent-insensitive collation, optionally
//! sorted by a named field), delete one descriptor, and update one
//! descriptor's row count. The trait mirrors that surface exactly so real
//! drivers and test doubles plug in behind the same seam.
//!
//! Write operations are only ever invoked by the repair worker; the read path
//! is a pure consumer. Both mutations are idempotent: deleting a descriptor
//! that is already gone and updating one that no longer exists succeed as
//! no-ops, which keeps concurrent repair workers safe under last-writer-wins.

use crate::error::BoxError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// One stored shard file's metadata, as kept in the document store.
///
/// Created by the out-of-scope ingestion process when a shard is written.
/// `row_count` is authoritative only up to eventual repair: the repair worker
/// shrinks it after deduplication and deletes the whole descriptor when the
/// shard becomes empty. Row counts only shrink, never reorder surviving
/// records, which is what keeps virtual row numbering stable for a fixed
/// descriptor ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShardDescriptor {
    pub source_name: String,
    pub file_name: String,
    pub row_count: u64,
    pub search_keys: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Sort direction for descriptor queries. Defaults to ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    /// Parse the boundary's `sortDirection` query parameter; anything other
    /// than `"desc"` means ascending.
    pub fn from_param(param: Option<&str>) -> Self {
        match param {
            Some("desc") => SortDirection::Descending,
            _ => SortDirection::Ascending,
        }
    }
}

/// A descriptor query as built by the resolver.
#[derive(Debug, Clone)]
pub struct DescriptorQuery {
    pub source_name: String,
    /// When present, only descriptors whose `search_keys` contain this value
    /// under case/accent-insensitive comparison are returned.
    pub search_key: Option<String>,
    /// Field to sort by. When absent, descriptors are returned by
    /// `created_at` descending (newest shards first), the system default.
    pub sort_key: Option<String>,
    pub sort_direction: SortDirection,
}

/// Query surface consumed from the document store.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Find descriptors matching the query, in the query's sort order.
    async fn find_descriptors(
        &self,
        query: &DescriptorQuery,
    ) -> Result<Vec<ShardDescriptor>, BoxError>;

    /// Delete one descriptor by source and file name. Deleting a descriptor
    /// that does not exist is a success.
    async fn delete_descriptor(&self, source_name: &str, file_name: &str)
        -> Result<(), BoxError>;

    /// Set one descriptor's `row_count`. Updating a descriptor that does not
    /// exist is a success (the repair race was lost to a delete).
    async fn set_row_count(
        &self,
        source_name: &str,
        file_name: &str,
        row_count: u64,
    ) -> Result<(), BoxError>;
}

/// Case/accent-insensitive key folding, approximating a strength-1 `en_US`
/// collation: Unicode lowercase plus an ASCII fold for the Latin-1 /
/// Latin Extended-A accented letters that show up in scraped search keys.
pub fn fold_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for c in key.chars() {
        for lower in c.to_lowercase() {
            out.push(match lower {
                'à'..='å' | 'ā' | 'ă' | 'ą' => 'a',
                'ç' | 'ć' | 'ĉ' | 'ċ' | 'č' => 'c',
                'è'..='ë' | 'ē' | 'ĕ' | 'ė' | 'ę' | 'ě' => 'e',
                'ì'..='ï' | 'ĩ' | 'ī' | 'ĭ' | 'į' | 'ı' => 'i',
                'ñ' | 'ń' | 'ņ' | 'ň' => 'n',
                'ò'..='ö' | 'ø' | 'ō' | 'ŏ' | 'ő' => 'o',
                'ù'..='ü' | 'ũ' | 'ū' | 'ŭ' | 'ů' | 'ű' | 'ų' => 'u',
                'ý' | 'ÿ' => 'y',
                'ś' | 'ŝ' | 'ş' | 'š' => 's',
                'ź' | 'ż' | 'ž' => 'z',
                other => other,
            });
        }
    }
    out
}

/// In-memory descriptor store.
///
/// The test double the resolver and repair worker are exercised against, and
/// a usable store for embedded setups. Holds descriptors in insertion order
/// behind an async `RwLock`; queries scan, filter, and stable-sort clones.
#[derive(Debug, Default)]
pub struct InMemoryMetadataStore {
    descriptors: RwLock<Vec<ShardDescriptor>>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a descriptor, as the ingestion process would.
    pub async fn insert(&self, descriptor: ShardDescriptor) {
        self.descriptors.write().await.push(descriptor);
    }

    /// Snapshot of all descriptors, in insertion order.
    pub async fn all(&self) -> Vec<ShardDescriptor> {
        self.descriptors.read().await.clone()
    }

    /// Look up a single descriptor.
    pub async fn get(&self, source_name: &str, file_name: &str) -> Option<ShardDescriptor> {
        self.descriptors
            .read()
            .await
            .iter()
            .find(|d| d.source_name == source_name && d.file_name == file_name)
            .cloned()
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn find_descriptors(
        &self,
        query: &DescriptorQuery,
    ) -> Result<Vec<ShardDescriptor>, BoxError> {
        let folded_key = query.search_key.as_deref().map(fold_key);

        let mut matches: Vec<ShardDescriptor> = self
            .descriptors
            .read()
            .await
            .iter()
            .filter(|d| d.source_name == query.source_name)
            .filter(|d| match &folded_key {
                Some(key) => d.search_keys.iter().any(|k| fold_key(k) == *key),
                None => true,
            })
            .cloned()
            .collect();

        match query.sort_key.as_deref() {
            Some("created_at") => matches.sort_by_key(|d| d.created_at),
            Some("file_name") => matches.sort_by(|a, b| a.file_name.cmp(&b.file_name)),
            Some("row_count") => matches.sort_by_key(|d| d.row_count),
            // Unknown sort field: every document "misses" the field, so the
            // order is left as stored (what a document store does too)
            Some(_) => {}
            None => {
                // System default: newest shards first
                matches.sort_by_key(|d| std::cmp::Reverse(d.created_at));
                return Ok(matches);
            }
        }

        if query.sort_direction == SortDirection::Descending {
            matches.reverse();
        }
        Ok(matches)
    }

    async fn delete_descriptor(
        &self,
        source_name: &str,
        file_name: &str,
    ) -> Result<(), BoxError> {
        self.descriptors
            .write()
            .await
            .retain(|d| !(d.source_name == source_name && d.file_name == file_name));
        Ok(())
    }

    async fn set_row_count(
        &self,
        source_name: &str,
        file_name: &str,
        row_count: u64,
    ) -> Result<(), BoxError> {
        let mut descriptors = self.descriptors.write().await;
        if let Some(descriptor) = descriptors
            .iter_mut()
            .find(|d| d.source_name == source_name && d.file_name == file_name)
        {
            descriptor.row_count = row_count;
        }
        Ok(())
    }
}
