//! The immutable value delivered to subscribers.

use std::time::SystemTime;

/// A single notification received from the transport.
///
/// Produced exactly once by the [`crate::provider::ConnectionProvider`] and
/// never mutated afterward; the dispatcher clones it per subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Channel the notification arrived on.
    pub channel: String,
    /// Raw payload bytes, unmodified from the wire.
    pub payload: Vec<u8>,
    /// Wall-clock time the provider handed this notification to the
    /// receive loop.
    pub received_at: SystemTime,
}

impl Notification {
    /// Construct a notification stamped with the current time.
    #[must_use]
    pub fn new(channel: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self { channel: channel.into(), payload: payload.into(), received_at: SystemTime::now() }
    }

    /// Payload interpreted as UTF-8, lossily.
    #[must_use]
    pub fn payload_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // tests favor unwrap over explicit error handling
mod tests {
    use super::*;

    #[test]
    fn payload_str_round_trips_for_text() {
        let n = Notification::new("events", "hello".as_bytes().to_vec());
        assert_eq!(n.payload_str(), "hello");
        assert_eq!(n.channel, "events");
    }
}
