//! Notifier error types and error code definitions.

use thiserror::Error;

/// Notifier error type with structured error codes.
#[derive(Debug, Error, Clone)]
pub enum NotifierError {
    /// PGN001: channel name was empty
    #[error("PGN001: channel name must not be empty")]
    ChannelEmpty,

    /// PGN002: callback was nil/missing
    #[error("PGN002: callback must not be nil")]
    CallbackNil,

    /// PGN003: payload exceeded the configured maximum size
    #[error("PGN003: payload of {size} bytes exceeds MaxPayloadSize of {max}")]
    PayloadTooLarge {
        /// Actual payload size in bytes
        size: usize,
        /// Configured maximum
        max: usize,
    },

    /// PGN004: provider is not currently connected
    #[error("PGN004: provider is not connected")]
    NotConnected,

    /// PGN005: Start called on an already-running notifier
    #[error("PGN005: notifier already started")]
    AlreadyStarted,

    /// PGN006: Start called after the notifier has stopped
    #[error("PGN006: notifier already stopped")]
    AlreadyStopped,

    /// PGN007: Shutdown did not complete before the caller's deadline
    #[error("PGN007: shutdown timed out waiting for workers to drain")]
    ShutdownTimeout,

    /// PGN008: LISTEN failed against the provider
    #[error("PGN008: listen failed for channel '{channel}': {reason}")]
    ListenFailed {
        /// Channel that failed to LISTEN
        channel: String,
        /// Underlying reason
        reason:  String,
    },

    /// PGN009: UNLISTEN failed against the provider
    #[error("PGN009: unlisten failed for channel '{channel}': {reason}")]
    UnlistenFailed {
        /// Channel that failed to UNLISTEN
        channel: String,
        /// Underlying reason
        reason:  String,
    },

    /// PGN010: NOTIFY failed against the provider
    #[error("PGN010: notify failed for channel '{channel}': {reason}")]
    NotifyFailed {
        /// Channel that failed to NOTIFY
        channel: String,
        /// Underlying reason
        reason:  String,
    },

    /// PGN011: reconnect attempts exhausted
    #[error("PGN011: reconnect failed after {attempts} attempts: {reason}")]
    ReconnectFailed {
        /// Number of attempts made
        attempts: u32,
        /// Underlying reason of the final attempt
        reason:   String,
    },

    /// PGN012: invalid configuration
    #[error("PGN012: invalid configuration: {reason}")]
    InvalidConfig {
        /// Reason the configuration was rejected
        reason: String,
    },

    /// PGN013: provider-level connection error (ping, wait, etc.)
    #[error("PGN013: connection error: {reason}")]
    ConnectionError {
        /// Underlying reason
        reason: String,
    },

    /// Callback invocation panicked; recovered and synthesized here.
    #[error("PGN014: callback panicked: {message}")]
    CallbackPanicked {
        /// Panic payload, stringified
        message: String,
    },

    /// PGN015: callback returned an application error
    #[error("PGN015: callback for channel '{channel}' failed: {reason}")]
    CallbackFailed {
        /// Channel the failing callback was registered on
        channel: String,
        /// Stringified error returned by the callback
        reason:  String,
    },

    /// PGN016: callback exceeded its configured timeout
    #[error("PGN016: callback for channel '{channel}' exceeded its timeout")]
    CallbackTimedOut {
        /// Channel the timed-out callback was registered on
        channel: String,
    },
}

/// Error code with classification for retry/logging decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifierErrorCode {
    /// PGN001
    ChannelEmpty,
    /// PGN002
    CallbackNil,
    /// PGN003
    PayloadTooLarge,
    /// PGN004
    NotConnected,
    /// PGN005
    AlreadyStarted,
    /// PGN006
    AlreadyStopped,
    /// PGN007
    ShutdownTimeout,
    /// PGN008
    ListenFailed,
    /// PGN009
    UnlistenFailed,
    /// PGN010
    NotifyFailed,
    /// PGN011
    ReconnectFailed,
    /// PGN012
    InvalidConfig,
    /// PGN013
    ConnectionError,
    /// PGN014
    CallbackPanicked,
    /// PGN015
    CallbackFailed,
    /// PGN016
    CallbackTimedOut,
}

impl NotifierErrorCode {
    /// Returns true for transient infrastructure errors that the supervisor
    /// handles internally rather than surfacing as a hard failure.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(
            self,
            NotifierErrorCode::NotConnected
                | NotifierErrorCode::ConnectionError
                | NotifierErrorCode::ListenFailed
                | NotifierErrorCode::UnlistenFailed
                | NotifierErrorCode::NotifyFailed
        )
    }
}

impl NotifierError {
    /// Get the error code for this error.
    #[must_use]
    pub const fn code(&self) -> NotifierErrorCode {
        match self {
            NotifierError::ChannelEmpty => NotifierErrorCode::ChannelEmpty,
            NotifierError::CallbackNil => NotifierErrorCode::CallbackNil,
            NotifierError::PayloadTooLarge { .. } => NotifierErrorCode::PayloadTooLarge,
            NotifierError::NotConnected => NotifierErrorCode::NotConnected,
            NotifierError::AlreadyStarted => NotifierErrorCode::AlreadyStarted,
            NotifierError::AlreadyStopped => NotifierErrorCode::AlreadyStopped,
            NotifierError::ShutdownTimeout => NotifierErrorCode::ShutdownTimeout,
            NotifierError::ListenFailed { .. } => NotifierErrorCode::ListenFailed,
            NotifierError::UnlistenFailed { .. } => NotifierErrorCode::UnlistenFailed,
            NotifierError::NotifyFailed { .. } => NotifierErrorCode::NotifyFailed,
            NotifierError::ReconnectFailed { .. } => NotifierErrorCode::ReconnectFailed,
            NotifierError::InvalidConfig { .. } => NotifierErrorCode::InvalidConfig,
            NotifierError::ConnectionError { .. } => NotifierErrorCode::ConnectionError,
            NotifierError::CallbackPanicked { .. } => NotifierErrorCode::CallbackPanicked,
            NotifierError::CallbackFailed { .. } => NotifierErrorCode::CallbackFailed,
            NotifierError::CallbackTimedOut { .. } => NotifierErrorCode::CallbackTimedOut,
        }
    }

    /// Returns true if this error is transient (handled internally, not a
    /// programmer error).
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        self.code().is_transient()
    }
}

impl From<tokio_postgres::Error> for NotifierError {
    fn from(err: tokio_postgres::Error) -> Self {
        NotifierError::ConnectionError { reason: err.to_string() }
    }
}

/// Result type alias for notifier operations.
pub type Result<T> = std::result::Result<T, NotifierError>;
