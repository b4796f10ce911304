//! In-process counters and timestamps.
//!
//! This is deliberately not an exporter: it holds atomics the facade can
//! snapshot into [`NotifierStatistics`]. Wiring those numbers to an
//! external sink (Prometheus, StatsD, ...) is the embedding service's job.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

use parking_lot::RwLock;

use crate::provider::ConnectionProvider;

/// Atomic counters and last-event timestamps for a single notifier.
#[derive(Default)]
pub struct MetricsCollector {
    notifications_received: AtomicU64,
    dispatch_errors: AtomicU64,
    reconnect_count: AtomicU64,
    last_notification_at: AtomicU64,
    last_disconnect_at: AtomicU64,
    last_reconnect_at: AtomicU64,
    connection_state: RwLock<ConnectionState>,
}

/// Point-in-time snapshot of [`MetricsCollector`], the facade's public
/// `GetStatistics` response shape.
#[derive(Debug, Clone)]
pub struct NotifierStatistics {
    /// Total notifications received across the connection's lifetime.
    pub notifications_received: u64,
    /// Total callback invocations that returned an error or panicked.
    pub dispatch_errors: u64,
    /// Total successful reconnects since the notifier started.
    pub reconnect_count: u64,
    /// Current connection state as observed by the supervisor.
    pub connection_state: ConnectionState,
    /// Number of distinct channels with at least one active subscriber.
    pub subscribed_channels: usize,
    /// Total subscriptions across all channels.
    pub total_subscriptions: usize,
}

/// Coarse connection state, surfaced on [`NotifierStatistics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Never connected yet.
    #[default]
    Unknown,
    /// Provider reports connected.
    Connected,
    /// Provider reports disconnected; supervisor is reconnecting.
    Disconnected,
}

impl MetricsCollector {
    /// Construct a fresh, zeroed collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_notification(&self) {
        self.notifications_received.fetch_add(1, Ordering::Relaxed);
        self.last_notification_at.store(now_unix(), Ordering::Relaxed);
    }

    pub(crate) fn record_dispatch_error(&self) {
        self.dispatch_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_disconnect(&self) {
        *self.connection_state.write() = ConnectionState::Disconnected;
        self.last_disconnect_at.store(now_unix(), Ordering::Relaxed);
    }

    pub(crate) fn record_connect(&self) {
        *self.connection_state.write() = ConnectionState::Connected;
        self.last_reconnect_at.store(now_unix(), Ordering::Relaxed);
    }

    pub(crate) fn record_reconnect_success(&self) {
        self.reconnect_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Produce a snapshot, filling in the channel counts from the current
    /// registry state.
    pub(crate) fn snapshot(
        &self,
        subscribed_channels: usize,
        total_subscriptions: usize,
        provider: &dyn ConnectionProvider,
    ) -> NotifierStatistics {
        let connection_state =
            if provider.is_connected() { ConnectionState::Connected } else { *self.connection_state.read() };
        NotifierStatistics {
            notifications_received: self.notifications_received.load(Ordering::Relaxed),
            dispatch_errors: self.dispatch_errors.load(Ordering::Relaxed),
            reconnect_count: self.reconnect_count.load(Ordering::Relaxed),
            connection_state,
            subscribed_channels,
            total_subscriptions,
        }
    }
}

fn now_unix() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}
