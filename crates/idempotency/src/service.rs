//! The claim-execute-record protocol tying [`Storage`], [`Serializer`],
//! and [`KeyGenerator`] together.

use std::{future::Future, sync::Arc, time::Duration};

use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, warn};

use crate::error::{IdempotencyError, Result};
use crate::keygen::KeyGenerator;
use crate::record::Status;
use crate::serializer::{JsonSerializer, Serializer};
use crate::storage::{ClaimOutcome, Storage};

/// How long a completed, failed, or in-flight record remains visible
/// before the key becomes eligible for re-execution.
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Coordinates at-most-once execution of an operation per key.
///
/// `S` is the [`Serializer`] used to encode/decode typed results; it
/// defaults to [`JsonSerializer`] since `Serializer`'s generic methods
/// make it impossible to hold behind `dyn`.
pub struct Service<S: Serializer = JsonSerializer> {
    storage: Arc<dyn Storage>,
    serializer: S,
    key_generator: Option<Arc<dyn KeyGenerator>>,
    ttl: Duration,
}

impl Service<JsonSerializer> {
    /// Build a service over `storage` using the default JSON serializer
    /// and [`DEFAULT_TTL`].
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage, serializer: JsonSerializer, key_generator: None, ttl: DEFAULT_TTL }
    }
}

impl<S: Serializer> Service<S> {
    /// Replace the serializer.
    #[must_use]
    pub fn with_serializer<S2: Serializer>(self, serializer: S2) -> Service<S2> {
        Service { storage: self.storage, serializer, key_generator: self.key_generator, ttl: self.ttl }
    }

    /// Set the key generator used by [`Self::execute_generated`].
    #[must_use]
    pub fn with_key_generator(mut self, key_generator: Arc<dyn KeyGenerator>) -> Self {
        self.key_generator = Some(key_generator);
        self
    }

    /// Override the record TTL.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Report whether the backing storage is reachable.
    pub async fn health_check(&self) -> Result<()> {
        self.storage.health_check().await
    }

    /// Run `operation` under `key`, exactly once for as long as any
    /// record for `key` remains within its TTL.
    ///
    /// - If no record exists, this caller claims it, runs `operation`,
    ///   and persists either the result or the error.
    /// - If a record exists and is `Processing`, returns
    ///   [`IdempotencyError::AlreadyProcessing`] without running `operation`.
    /// - If a record exists and is `Completed`, decodes and returns the
    ///   stored result without running `operation`.
    /// - If a record exists and is `Failed`, returns
    ///   [`IdempotencyError::PreviouslyFailed`] without running `operation`.
    pub async fn execute<T, E, F, Fut>(&self, key: &str, operation: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        E: std::fmt::Display,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        match self.storage.claim(key, self.ttl).await? {
            ClaimOutcome::Existing(record) => match record.status {
                Status::Processing => {
                    debug!(key, "idempotency key already processing");
                    Err(IdempotencyError::AlreadyProcessing { key: key.to_string() })
                }
                Status::Completed => {
                    let bytes = record.result.unwrap_or_default();
                    self.serializer.decode(key, &bytes)
                }
                Status::Failed => {
                    let message = record.error_message.unwrap_or_default();
                    Err(IdempotencyError::PreviouslyFailed { key: key.to_string(), message })
                }
                Status::None => {
                    warn!(key, "storage returned an existing record with status None");
                    Err(IdempotencyError::StorageFailure {
                        key: key.to_string(),
                        reason: "existing record had status None".to_string(),
                    })
                }
            },
            ClaimOutcome::Claimed(_) => self.run_and_record(key, operation).await,
        }
    }

    /// Like [`Self::execute`], but derives the key from `input` via the
    /// configured [`KeyGenerator`] instead of accepting one from the
    /// caller. `input` is marshaled through this service's [`Serializer`]
    /// before the generator sees it, so a [`crate::keygen::ContentHashKeyGenerator`]
    /// hashes the same bytes regardless of the type the caller passed in.
    pub async fn execute_generated<I, T, E, F, Fut>(&self, input: &I, operation: F) -> Result<T>
    where
        I: Serialize,
        T: Serialize + DeserializeOwned,
        E: std::fmt::Display,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let generator = self.key_generator.as_ref().ok_or_else(|| IdempotencyError::KeyGeneration {
            reason: "no key generator configured".to_string(),
        })?;
        let marshaled = self
            .serializer
            .encode("<key-generation>", input)
            .map_err(|e| IdempotencyError::KeyGeneration { reason: e.to_string() })?;
        let key = generator.generate(&marshaled)?;
        self.execute(&key, operation).await
    }

    async fn run_and_record<T, E, F, Fut>(&self, key: &str, operation: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        E: std::fmt::Display,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        match operation().await {
            Ok(value) => match self.serializer.encode(key, &value) {
                Ok(bytes) => {
                    self.storage.save_result(key, bytes, self.ttl).await?;
                    Ok(value)
                }
                Err(encode_err) => {
                    // The operation itself succeeded but its result can't be
                    // persisted; commit a failure so the record doesn't sit
                    // `Processing` for the rest of its TTL and later callers
                    // see `PreviouslyFailed` instead of `AlreadyProcessing`.
                    if let Err(commit_err) = self.storage.save_error(key, "serialization failed", self.ttl).await {
                        warn!(key, error = %commit_err, "failed to commit serialization failure");
                    }
                    Err(encode_err)
                }
            },
            Err(err) => {
                let message = err.to_string();
                if let Err(commit_err) = self.storage.save_error(key, &message, self.ttl).await {
                    return Err(IdempotencyError::StorageFailure {
                        key: key.to_string(),
                        reason: format!("operation failed with '{message}', and committing that failure also failed: {commit_err}"),
                    });
                }
                Err(IdempotencyError::OperationFailed { key: key.to_string(), reason: message })
            }
        }
    }
}

/// Free-function form of [`Service::execute`] for call sites that would
/// rather pass the service by reference than hold a method handle.
pub async fn execute<S, T, E, F, Fut>(service: &Service<S>, key: &str, operation: F) -> Result<T>
where
    S: Serializer,
    T: Serialize + DeserializeOwned,
    E: std::fmt::Display,
    F: FnOnce() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
{
    service.execute(key, operation).await
}
