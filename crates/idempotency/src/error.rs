//! Idempotency error types and error code definitions.

use thiserror::Error;

/// Idempotency error type with structured error codes.
#[derive(Debug, Error, Clone)]
pub enum IdempotencyError {
    /// IDM001: another caller is currently executing this key
    #[error("IDM001: key '{key}' is already being processed")]
    AlreadyProcessing {
        /// The key in contention
        key: String,
    },

    /// IDM002: the storage backend failed
    #[error("IDM002: storage failure for key '{key}': {reason}")]
    StorageFailure {
        /// The key being operated on
        key: String,
        /// Underlying reason
        reason: String,
    },

    /// IDM003: marshal/unmarshal of the result value failed
    #[error("IDM003: serialization failure for key '{key}': {reason}")]
    SerializationFailure {
        /// The key being operated on
        key: String,
        /// Underlying reason
        reason: String,
    },

    /// IDM004: key generation failed
    #[error("IDM004: key generation failed: {reason}")]
    KeyGeneration {
        /// Underlying reason
        reason: String,
    },

    /// IDM005: a previous execution for this key failed and is cached
    #[error("IDM005: key '{key}' previously failed: {message}")]
    PreviouslyFailed {
        /// The key in contention
        key: String,
        /// The message stored by the failing execution
        message: String,
    },

    /// IDM006: the wrapped operation itself returned an error on this,
    /// the winning, execution
    #[error("IDM006: operation failed for key '{key}': {reason}")]
    OperationFailed {
        /// The key being operated on
        key: String,
        /// The operation's own error, stringified
        reason: String,
    },
}

/// Error code with classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdempotencyErrorCode {
    /// IDM001
    AlreadyProcessing,
    /// IDM002
    StorageFailure,
    /// IDM003
    SerializationFailure,
    /// IDM004
    KeyGeneration,
    /// IDM005
    PreviouslyFailed,
    /// IDM006
    OperationFailed,
}

impl IdempotencyErrorCode {
    /// Returns true if retrying immediately is pointless: the caller
    /// should apply its own backoff policy rather than loop tightly.
    #[must_use]
    pub const fn is_terminal_for_caller(self) -> bool {
        matches!(
            self,
            IdempotencyErrorCode::AlreadyProcessing | IdempotencyErrorCode::PreviouslyFailed
        )
    }
}

impl IdempotencyError {
    /// Get the error code for this error.
    #[must_use]
    pub const fn code(&self) -> IdempotencyErrorCode {
        match self {
            IdempotencyError::AlreadyProcessing { .. } => IdempotencyErrorCode::AlreadyProcessing,
            IdempotencyError::StorageFailure { .. } => IdempotencyErrorCode::StorageFailure,
            IdempotencyError::SerializationFailure { .. } => IdempotencyErrorCode::SerializationFailure,
            IdempotencyError::KeyGeneration { .. } => IdempotencyErrorCode::KeyGeneration,
            IdempotencyError::PreviouslyFailed { .. } => IdempotencyErrorCode::PreviouslyFailed,
            IdempotencyError::OperationFailed { .. } => IdempotencyErrorCode::OperationFailed,
        }
    }

    /// Returns true if this error is terminal for the caller (decide
    /// policy, do not spin).
    #[must_use]
    pub const fn is_terminal_for_caller(&self) -> bool {
        self.code().is_terminal_for_caller()
    }
}

impl From<redis::RedisError> for IdempotencyError {
    fn from(err: redis::RedisError) -> Self {
        IdempotencyError::StorageFailure { key: String::new(), reason: err.to_string() }
    }
}

/// Result type alias for idempotency operations.
pub type Result<T> = std::result::Result<T, IdempotencyError>;
