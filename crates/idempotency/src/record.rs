//! The persisted state machine backing a single idempotency key.

use chrono::{DateTime, Utc};

/// Lifecycle status of a [`Record`]. Absence of a record is equivalent to
/// `None`.
///
/// Valid transitions: `None -> Processing`, `Processing -> Completed`,
/// `Processing -> Failed`. `Completed` and `Failed` are terminal until the
/// record's TTL expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// No record exists (or it expired).
    None,
    /// Claimed by a winning writer; execution in flight.
    Processing,
    /// Execution succeeded; `result` holds the serialized value.
    Completed,
    /// Execution failed; `error_message` holds the cause.
    Failed,
}

impl Status {
    /// The four literal wire strings used by the distributed backend's
    /// text encoding.
    #[must_use]
    pub const fn as_wire_str(self) -> &'static str {
        match self {
            Status::None => "none",
            Status::Processing => "processing",
            Status::Completed => "completed",
            Status::Failed => "failed",
        }
    }

    /// Parse one of the four literal wire strings.
    #[must_use]
    pub fn from_wire_str(s: &str) -> Option<Self> {
        match s {
            "none" => Some(Status::None),
            "processing" => Some(Status::Processing),
            "completed" => Some(Status::Completed),
            "failed" => Some(Status::Failed),
            _ => None,
        }
    }
}

/// A record persisted under a key for its TTL.
#[derive(Debug, Clone)]
pub struct Record {
    /// The key identity this record is stored under.
    pub key: String,
    /// Current lifecycle status.
    pub status: Status,
    /// Serialized result bytes; present only when `status == Completed`.
    pub result: Option<Vec<u8>>,
    /// Stored error message; present only when `status == Failed`.
    pub error_message: Option<String>,
    /// Creation timestamp (set on claim, never updated).
    pub created_at: DateTime<Utc>,
    /// Last-write timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Record {
    /// Construct a freshly claimed `Processing` record.
    #[must_use]
    pub fn claimed(key: impl Into<String>) -> Self {
        let now = Utc::now();
        Self { key: key.into(), status: Status::Processing, result: None, error_message: None, created_at: now, updated_at: now }
    }

    /// Transition to `Completed`, attaching the serialized result.
    #[must_use]
    pub fn completed(mut self, result: Vec<u8>) -> Self {
        self.status = Status::Completed;
        self.result = Some(result);
        self.error_message = None;
        self.updated_at = Utc::now();
        self
    }

    /// Transition to `Failed`, attaching the error message.
    #[must_use]
    pub fn failed(mut self, message: impl Into<String>) -> Self {
        self.status = Status::Failed;
        self.error_message = Some(message.into());
        self.result = None;
        self.updated_at = Utc::now();
        self
    }
}
