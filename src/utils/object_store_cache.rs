//! Per-bucket object store construction and caching.
//!
//! Each source keeps its shards in its own bucket, and every request touches
//! exactly one bucket. Stores are constructed once and reused process-wide:
//! recreating an S3 store involves credential fetching and potentially the
//! EC2 metadata service, so the cache is keyed by bucket name and shared
//! lock-free via DashMap.
//!
//! Credentials come from `AmazonS3Builder::from_env()`, which uses the AWS
//! credential provider chain (environment variables, credentials file,
//! instance/task/pod roles, SSO) with automatic refresh where the provider
//! supports it. Non-AWS S3-compatible endpoints (e.g. Wasabi) are selected
//! with the standard `AWS_ENDPOINT` environment variable.

use crate::error::BoxError;
use dashmap::DashMap;
use object_store::{
    aws::AmazonS3Builder, memory::InMemory, path::Path as ObjectPath, ObjectStore,
};
use once_cell::sync::Lazy;
use std::sync::Arc;

/// Global cache of object stores, keyed by bucket name.
static BUCKET_STORE_CACHE: Lazy<DashMap<String, Arc<dyn ObjectStore>>> = Lazy::new(DashMap::new);

/// Gets or creates the cached store for a bucket.
///
/// The first access to a bucket creates the store (credential fetching
/// included); later accesses return the cached instance without blocking
/// other buckets.
///
/// # Errors
///
/// Returns an error if the bucket name is invalid or the AWS credential
/// chain cannot produce credentials on first access.
pub fn store_for_bucket(bucket: &str) -> Result<Arc<dyn ObjectStore>, BoxError> {
    let entry = BUCKET_STORE_CACHE.entry(bucket.to_string());
    let store = entry.or_try_insert_with(|| create_s3_store(bucket))?;
    Ok(Arc::clone(store.value()))
}

/// Creates a fresh (uncached) S3 store for a bucket.
pub fn create_s3_store(bucket: &str) -> Result<Arc<dyn ObjectStore>, BoxError> {
    let s3_store = AmazonS3Builder::from_env().with_bucket_name(bucket).build()?;
    Ok(Arc::new(s3_store))
}

/// Installs an in-memory store under a bucket name and returns it.
///
/// Lets tests and embedded setups route a source's bucket to process memory;
/// subsequent `store_for_bucket` calls for that name hit the same instance.
/// Installing over an existing entry replaces it.
pub fn install_memory_bucket(bucket: &str) -> Arc<dyn ObjectStore> {
    let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
    BUCKET_STORE_CACHE.insert(bucket.to_string(), Arc::clone(&store));
    store
}

/// Builds the object key for a shard file: `prefix` + `file_name`.
///
/// The prefix carries its own trailing separator (`"reddit/"`), matching how
/// the ingestion process lays out keys.
pub fn shard_path(prefix: &str, file_name: &str) -> ObjectPath {
    ObjectPath::from(format!("{prefix}{file_name}"))
}
