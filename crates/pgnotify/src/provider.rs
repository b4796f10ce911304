//! The driver-facing port the notifier is built against.

use std::{
    collections::HashSet,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    error::{NotifierError, Result},
    notification::Notification,
};

/// Abstraction over the database connection used for LISTEN/NOTIFY.
///
/// All methods accept a [`CancellationToken`] and must return promptly once
/// it is cancelled; `wait_for_notification` is the only method that may
/// otherwise block indefinitely. Implementors own reconnection plumbing
/// internally and must never panic across this boundary.
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    /// Issue `LISTEN <channel>`.
    async fn listen(&self, ctx: CancellationToken, channel: &str) -> Result<()>;

    /// Issue `UNLISTEN <channel>`.
    async fn unlisten(&self, ctx: CancellationToken, channel: &str) -> Result<()>;

    /// Issue the equivalent of `pg_notify(channel, payload)`.
    async fn notify(&self, ctx: CancellationToken, channel: &str, payload: &[u8]) -> Result<()>;

    /// Block until the next notification arrives or `ctx` is cancelled.
    async fn wait_for_notification(&self, ctx: CancellationToken) -> Result<Notification>;

    /// Lightweight liveness probe.
    async fn ping(&self, ctx: CancellationToken) -> Result<()>;

    /// Re-establish the underlying connection from scratch.
    async fn reconnect(&self, ctx: CancellationToken) -> Result<()>;

    /// Release the connection; idempotent.
    async fn close(&self) -> Result<()>;

    /// Non-blocking status read. May be stale but must never report
    /// connected after an observed fatal error.
    fn is_connected(&self) -> bool;
}

/// Quote a channel name as a PostgreSQL identifier for use in `LISTEN`
/// and `UNLISTEN`, which do not accept bind parameters.
fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// [`ConnectionProvider`] backed by a real `tokio-postgres` connection.
pub struct PgConnectionProvider {
    conninfo: String,
    connected: Arc<AtomicBool>,
    inner: Mutex<Option<Inner>>,
}

struct Inner {
    client: tokio_postgres::Client,
    notifications: tokio::sync::mpsc::UnboundedReceiver<Notification>,
}

impl PgConnectionProvider {
    /// Create a provider that is not yet connected; call `reconnect` (or
    /// let the supervisor do so) before use.
    #[must_use]
    pub fn new(conninfo: impl Into<String>) -> Self {
        Self { conninfo: conninfo.into(), connected: Arc::new(AtomicBool::new(false)), inner: Mutex::new(None) }
    }

    async fn connect(&self) -> Result<Inner> {
        let (client, mut connection) = tokio_postgres::connect(&self.conninfo, tokio_postgres::NoTls)
            .await
            .map_err(|e| NotifierError::ConnectionError { reason: e.to_string() })?;

        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        tokio::spawn(async move {
            use futures::future::poll_fn;
            loop {
                match poll_fn(|cx| connection.poll_message(cx)).await {
                    Some(Ok(tokio_postgres::AsyncMessage::Notification(n))) => {
                        let notification = Notification::new(n.channel().to_string(), n.payload().as_bytes().to_vec());
                        if tx.send(notification).is_err() {
                            break;
                        }
                    },
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        warn!(error = %e, "pgnotify connection error, terminating poll loop");
                        break;
                    },
                    None => break,
                }
            }
        });

        Ok(Inner { client, notifications: rx })
    }
}

#[async_trait]
impl ConnectionProvider for PgConnectionProvider {
    async fn listen(&self, _ctx: CancellationToken, channel: &str) -> Result<()> {
        let guard = self.inner.lock().await;
        let inner = guard.as_ref().ok_or(NotifierError::NotConnected)?;
        inner
            .client
            .batch_execute(&format!("LISTEN {}", quote_ident(channel)))
            .await
            .map_err(|e| NotifierError::ListenFailed { channel: channel.to_string(), reason: e.to_string() })
    }

    async fn unlisten(&self, _ctx: CancellationToken, channel: &str) -> Result<()> {
        let guard = self.inner.lock().await;
        let inner = guard.as_ref().ok_or(NotifierError::NotConnected)?;
        inner
            .client
            .batch_execute(&format!("UNLISTEN {}", quote_ident(channel)))
            .await
            .map_err(|e| NotifierError::UnlistenFailed { channel: channel.to_string(), reason: e.to_string() })
    }

    async fn notify(&self, _ctx: CancellationToken, channel: &str, payload: &[u8]) -> Result<()> {
        let guard = self.inner.lock().await;
        let inner = guard.as_ref().ok_or(NotifierError::NotConnected)?;
        let payload_str = String::from_utf8_lossy(payload);
        inner
            .client
            .execute("SELECT pg_notify($1, $2)", &[&channel, &payload_str.as_ref()])
            .await
            .map(|_| ())
            .map_err(|e| NotifierError::NotifyFailed { channel: channel.to_string(), reason: e.to_string() })
    }

    async fn wait_for_notification(&self, ctx: CancellationToken) -> Result<Notification> {
        let mut guard = self.inner.lock().await;
        let inner = guard.as_mut().ok_or(NotifierError::NotConnected)?;
        tokio::select! {
            biased;
            _ = ctx.cancelled() => Err(NotifierError::ConnectionError { reason: "cancelled".to_string() }),
            next = inner.notifications.recv() => {
                next.ok_or_else(|| {
                    self.connected.store(false, Ordering::SeqCst);
                    NotifierError::ConnectionError { reason: "connection stream closed".to_string() }
                })
            }
        }
    }

    async fn ping(&self, _ctx: CancellationToken) -> Result<()> {
        let guard = self.inner.lock().await;
        let inner = guard.as_ref().ok_or(NotifierError::NotConnected)?;
        inner
            .client
            .simple_query("SELECT 1")
            .await
            .map(|_| ())
            .map_err(|e| NotifierError::ConnectionError { reason: e.to_string() })
    }

    async fn reconnect(&self, _ctx: CancellationToken) -> Result<()> {
        let fresh = self.connect().await?;
        let mut guard = self.inner.lock().await;
        *guard = Some(fresh);
        self.connected.store(true, Ordering::SeqCst);
        debug!("pgnotify connection (re)established");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut guard = self.inner.lock().await;
        *guard = None;
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// In-memory [`ConnectionProvider`] for tests: `notify` loops straight back
/// into `wait_for_notification`, and disconnect/reconnect behavior can be
/// driven directly by the test.
pub struct InMemoryConnectionProvider {
    connected: AtomicBool,
    listened: Mutex<HashSet<String>>,
    tx: tokio::sync::mpsc::UnboundedSender<Notification>,
    rx: Mutex<tokio::sync::mpsc::UnboundedReceiver<Notification>>,
    fail_reconnect: AtomicBool,
    reconnect_attempts: AtomicU64,
}

impl Default for InMemoryConnectionProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryConnectionProvider {
    /// Construct a connected-by-default test provider.
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        Self {
            connected: AtomicBool::new(true),
            listened: Mutex::new(HashSet::new()),
            tx,
            rx: Mutex::new(rx),
            fail_reconnect: AtomicBool::new(false),
            reconnect_attempts: AtomicU64::new(0),
        }
    }

    /// Force the connected flag, simulating a transport-level drop.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Make every subsequent `reconnect` call fail until unset.
    pub fn set_fail_reconnect(&self, fail: bool) {
        self.fail_reconnect.store(fail, Ordering::SeqCst);
    }

    /// Number of `reconnect` calls observed so far.
    #[must_use]
    pub fn reconnect_attempts(&self) -> u64 {
        self.reconnect_attempts.load(Ordering::SeqCst)
    }

    /// Snapshot of channels currently LISTENed on this provider.
    #[must_use]
    pub async fn listened_channels(&self) -> Vec<String> {
        let mut channels: Vec<_> = self.listened.lock().await.iter().cloned().collect();
        channels.sort();
        channels
    }
}

#[async_trait]
impl ConnectionProvider for InMemoryConnectionProvider {
    async fn listen(&self, _ctx: CancellationToken, channel: &str) -> Result<()> {
        if !self.is_connected() {
            return Err(NotifierError::NotConnected);
        }
        self.listened.lock().await.insert(channel.to_string());
        Ok(())
    }

    async fn unlisten(&self, _ctx: CancellationToken, channel: &str) -> Result<()> {
        self.listened.lock().await.remove(channel);
        Ok(())
    }

    async fn notify(&self, _ctx: CancellationToken, channel: &str, payload: &[u8]) -> Result<()> {
        if !self.is_connected() {
            return Err(NotifierError::NotConnected);
        }
        let _ = self.tx.send(Notification::new(channel.to_string(), payload.to_vec()));
        Ok(())
    }

    async fn wait_for_notification(&self, ctx: CancellationToken) -> Result<Notification> {
        let mut rx = self.rx.lock().await;
        tokio::select! {
            biased;
            _ = ctx.cancelled() => Err(NotifierError::ConnectionError { reason: "cancelled".to_string() }),
            next = rx.recv() => next.ok_or(NotifierError::ConnectionError { reason: "closed".to_string() }),
        }
    }

    async fn ping(&self, _ctx: CancellationToken) -> Result<()> {
        if self.is_connected() { Ok(()) } else { Err(NotifierError::NotConnected) }
    }

    async fn reconnect(&self, _ctx: CancellationToken) -> Result<()> {
        self.reconnect_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_reconnect.load(Ordering::SeqCst) {
            return Err(NotifierError::ConnectionError { reason: "simulated reconnect failure".to_string() });
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // tests favor unwrap over explicit error handling
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_provider_round_trips_notify() {
        let provider = InMemoryConnectionProvider::new();
        let ctx = CancellationToken::new();
        provider.notify(ctx.clone(), "events", b"hello").await.unwrap();
        let n = provider.wait_for_notification(ctx).await.unwrap();
        assert_eq!(n.channel, "events");
        assert_eq!(n.payload, b"hello");
    }

    #[tokio::test]
    async fn in_memory_provider_tracks_listened_channels() {
        let provider = InMemoryConnectionProvider::new();
        let ctx = CancellationToken::new();
        provider.listen(ctx.clone(), "a").await.unwrap();
        provider.listen(ctx.clone(), "b").await.unwrap();
        assert_eq!(provider.listened_channels().await, vec!["a".to_string(), "b".to_string()]);
        provider.unlisten(ctx, "a").await.unwrap();
        assert_eq!(provider.listened_channels().await, vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn in_memory_provider_simulated_disconnect_rejects_listen() {
        let provider = InMemoryConnectionProvider::new();
        provider.set_connected(false);
        let ctx = CancellationToken::new();
        assert!(matches!(provider.listen(ctx, "a").await, Err(NotifierError::NotConnected)));
    }

    #[tokio::test]
    async fn in_memory_provider_reconnect_respects_failure_flag() {
        let provider = InMemoryConnectionProvider::new();
        provider.set_fail_reconnect(true);
        let ctx = CancellationToken::new();
        assert!(provider.reconnect(ctx.clone()).await.is_err());
        provider.set_fail_reconnect(false);
        assert!(provider.reconnect(ctx).await.is_ok());
        assert_eq!(provider.reconnect_attempts(), 2);
    }

    #[test]
    fn quote_ident_escapes_double_quotes() {
        assert_eq!(quote_ident("events"), "\"events\"");
        assert_eq!(quote_ident("weird\"name"), "\"weird\"\"name\"");
    }
}
