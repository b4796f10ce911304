//! At-most-once execution of keyed operations across a distributed fleet.
//!
//! [`Service`] claims a key before running the caller's operation, then
//! persists the outcome so any later caller racing for the same key
//! observes the winner's result instead of re-running the work.
//!
//! ```ignore
//! use idempotency::{Service, storage::InMemoryStorage};
//! use std::sync::Arc;
//!
//! # async fn run() -> idempotency::error::Result<()> {
//! let service = Service::new(Arc::new(InMemoryStorage::new()));
//! let total: u32 = service.execute("charge-42", || async {
//!     Ok::<u32, String>(4200)
//! }).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

pub mod error;
pub mod keygen;
pub mod record;
pub mod serializer;
pub mod service;
pub mod storage;

pub use error::{IdempotencyError, IdempotencyErrorCode, Result};
pub use keygen::{ContentHashKeyGenerator, KeyGenerator, RandomKeyGenerator};
pub use record::{Record, Status};
pub use serializer::{JsonSerializer, Serializer};
pub use service::{DEFAULT_TTL, Service, execute};
pub use storage::{ClaimOutcome, InMemoryStorage, RedisStorage, Storage};
