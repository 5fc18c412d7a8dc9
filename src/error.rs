//! Error taxonomy for the page-access path and the background repair path.
//!
//! Request-path failures (`AccessError`) abort the entire page request; a
//! caller never receives a partial page. Repair-path failures (`RepairError`)
//! stay inside the repair worker: they are retried a bounded number of times,
//! then logged and abandoned.

use thiserror::Error;

/// Boxed error type used at the injected-dependency seams (metadata store,
/// credit gate). Matches the transport the `object_store` crate and the rest
/// of the codebase use for opaque upstream failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A failure on the caller-visible request path.
///
/// Every variant carries a human-readable cause string so the API layer can
/// surface a single structured error with diagnostics attached.
#[derive(Debug, Error)]
pub enum AccessError {
    /// The metadata-store query failed. Not retried by the core; the caller
    /// or API layer decides whether to try again.
    #[error("failed to query shard metadata store: {0}")]
    MetadataUnavailable(String),

    /// A shard fetch, parse, or mutation against object storage failed.
    /// Aborts the whole page request; partial batches are never returned.
    #[error("failed to read shard files from object storage: {0}")]
    ObjectStore(String),

    /// An empty-string search or sort key was supplied where a value was
    /// expected. Rejected before any store access.
    #[error("invalid query parameter: {0}")]
    InvalidQuery(String),

    /// The credit gate refused the request or could not be reached. The
    /// assembled page is withheld from the caller.
    #[error("credit gate rejected the request: {0}")]
    CreditGate(String),
}

impl AccessError {
    /// Wrap an opaque metadata-store failure.
    pub fn metadata(err: impl std::fmt::Display) -> Self {
        AccessError::MetadataUnavailable(err.to_string())
    }

    /// Wrap an opaque object-store failure.
    pub fn object_store(err: impl std::fmt::Display) -> Self {
        AccessError::ObjectStore(err.to_string())
    }
}

impl From<object_store::Error> for AccessError {
    fn from(err: object_store::Error) -> Self {
        AccessError::ObjectStore(err.to_string())
    }
}

/// A failure inside the background repair worker. Never surfaced to callers.
#[derive(Debug, Error)]
pub enum RepairError {
    /// Deleting or rewriting the shard object failed.
    #[error("shard object mutation failed for '{file_name}': {message}")]
    Object { file_name: String, message: String },

    /// Updating or deleting the shard's metadata descriptor failed.
    #[error("shard metadata mutation failed for '{file_name}': {message}")]
    Metadata { file_name: String, message: String },
}

impl RepairError {
    pub fn object(file_name: &str, err: impl std::fmt::Display) -> Self {
        RepairError::Object {
            file_name: file_name.to_string(),
            message: err.to_string(),
        }
    }

    pub fn metadata(file_name: &str, err: impl std::fmt::Display) -> Self {
        RepairError::Metadata {
            file_name: file_name.to_string(),
            message: err.to_string(),
        }
    }
}
