//! The paginated read path: resolver, fetcher, assembler, and the
//! duplicate-expansion loop that orchestrates them.
//!
//! One coordinating task handles a logical page request end to end; the only
//! internal parallelism is the fetcher's bounded worker pool. The read path
//! never writes to either store; duplicates and empty shards it discovers
//! are handed to the repair worker as a [`RepairPlan`](crate::repair::RepairPlan)
//! after the response is produced.

pub mod assembler;
pub mod expansion_loop;
pub mod fetcher;
pub mod resolver;

// Link to test module (only compiled during tests)
#[cfg(test)]
#[path = "tests/mod.rs"]
mod tests;
