//! Storage backend abstraction for idempotency records.

mod memory;
mod redis_backend;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::record::Record;

pub use memory::InMemoryStorage;
pub use redis_backend::RedisStorage;

/// Outcome of a claim attempt.
#[derive(Debug, Clone)]
pub enum ClaimOutcome {
    /// No record existed (or it had expired); the caller now owns it.
    Claimed(Record),
    /// A record already exists under this key; returned as-is for the
    /// caller to interpret (`Processing`, `Completed`, or `Failed`).
    Existing(Record),
}

/// Persistence port for idempotency records.
///
/// Implementations must make `claim` atomic: when two callers race to
/// claim the same key, exactly one observes `ClaimOutcome::Claimed` and
/// the rest observe `ClaimOutcome::Existing`.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Look up the current record for `key`, if any and unexpired.
    async fn load(&self, key: &str) -> Result<Option<Record>>;

    /// Atomically claim `key` for processing. `ttl` bounds how long the
    /// record (in any terminal state) remains visible.
    async fn claim(&self, key: &str, ttl: Duration) -> Result<ClaimOutcome>;

    /// Persist a successful result for a previously claimed key.
    async fn save_result(&self, key: &str, result: Vec<u8>, ttl: Duration) -> Result<()>;

    /// Persist a failure for a previously claimed key.
    async fn save_error(&self, key: &str, message: &str, ttl: Duration) -> Result<()>;

    /// Release a claim without recording a terminal outcome, letting a
    /// later caller retry the key immediately. Used when a service
    /// cannot determine whether the claimed operation ran.
    async fn release(&self, key: &str) -> Result<()>;

    /// Cheap liveness probe for health reporting.
    async fn health_check(&self) -> Result<()>;
}
