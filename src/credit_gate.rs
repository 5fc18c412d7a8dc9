//! Credit-consumption gate.
//!
//! Every completed data request consumes one credit from the caller's
//! credential before the result is released. Credit issuance, renewal, and
//! billing live in an external system; this crate only sees an opaque
//! pass/fail consume call, invoked exactly once per completed request.

use crate::error::BoxError;
use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;

/// Gate refusals, as reported by implementations.
#[derive(Debug, Error)]
pub enum GateRefusal {
    #[error("provided key is invalid")]
    UnknownKey,

    #[error("key charge is expired, please renew key")]
    Exhausted,
}

/// One-credit-per-request gate consumed from the billing system.
#[async_trait]
pub trait CreditGate: Send + Sync {
    /// Consume one credit for `api_key`. Returns the remaining charge on
    /// success; any error withholds the assembled page from the caller.
    async fn consume(&self, api_key: &str) -> Result<u64, BoxError>;
}

/// A gate that always passes. For diagnostic tools and embedded setups where
/// metering lives elsewhere (or nowhere).
#[derive(Debug, Default)]
pub struct UnmeteredGate;

#[async_trait]
impl CreditGate for UnmeteredGate {
    async fn consume(&self, _api_key: &str) -> Result<u64, BoxError> {
        Ok(u64::MAX)
    }
}

/// In-memory gate: a charge counter per key.
#[derive(Debug, Default)]
pub struct InMemoryCreditGate {
    charges: DashMap<String, u64>,
}

impl InMemoryCreditGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a key with an initial charge.
    pub fn issue(&self, api_key: &str, charge: u64) {
        self.charges.insert(api_key.to_string(), charge);
    }

    /// Remaining charge for a key, if it exists.
    pub fn remaining(&self, api_key: &str) -> Option<u64> {
        self.charges.get(api_key).map(|c| *c)
    }
}

#[async_trait]
impl CreditGate for InMemoryCreditGate {
    async fn consume(&self, api_key: &str) -> Result<u64, BoxError> {
        let mut entry = self
            .charges
            .get_mut(api_key)
            .ok_or(GateRefusal::UnknownKey)?;
        if *entry == 0 {
            return Err(GateRefusal::Exhausted.into());
        }
        *entry -= 1;
        Ok(*entry)
    }
}
