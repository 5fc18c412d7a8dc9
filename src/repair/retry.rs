//! Bounded retry-then-give-up combinator.
//!
//! The repair paths retry their metadata mutations a fixed number of extra
//! times with no backoff, then hand the last error back to be logged and
//! abandoned. Shared by both the empty-shard cleanup and the
//! duplicate-shard rewrite.

use std::future::Future;

/// Run `op` once, retrying immediately up to `extra_attempts` more times on
/// failure. Returns the first success or the last error.
pub async fn retry_immediate<T, E, F, Fut>(extra_attempts: u32, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut last_error = None;
    for _ in 0..=extra_attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(error) => last_error = Some(error),
        }
    }
    Err(last_error.expect("retry loop makes at least one attempt"))
}
