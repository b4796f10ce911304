//! The top-level facade composing provider, registry, dispatcher and
//! supervisor into a single supervised pub/sub client.

use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;
use tokio::{sync::watch, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    config::NotifierConfig,
    dispatcher::Dispatcher,
    error::{NotifierError, Result},
    hooks::Hooks,
    metrics::{MetricsCollector, NotifierStatistics},
    provider::ConnectionProvider,
    registry::{ChannelEmptyHook, SubscriptionManager},
    subscription::{Callback, Subscription},
    supervisor::ConnectionSupervisor,
};

const DISCONNECTED_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Created,
    Running,
    Stopped,
}

/// Supervised facade over a [`ConnectionProvider`].
///
/// `Notifier` owns the receive loop and the [`ConnectionSupervisor`], and
/// exposes `Publish`/`Subscribe` as the public pub/sub surface. Construct
/// with [`Notifier::new`], call [`Notifier::start`] to begin processing,
/// and [`Notifier::shutdown`] to drain and stop.
pub struct Notifier {
    provider: Arc<dyn ConnectionProvider>,
    registry: Arc<SubscriptionManager>,
    dispatcher: Arc<Dispatcher>,
    supervisor: Arc<ConnectionSupervisor>,
    hooks: Arc<Hooks>,
    metrics: Arc<MetricsCollector>,
    config: NotifierConfig,
    internal_ctx: CancellationToken,
    state: Mutex<State>,
    stopped_tx: watch::Sender<bool>,
    stopped_rx: watch::Receiver<bool>,
}

impl Notifier {
    /// Construct a notifier over `provider`, validating `config` eagerly.
    pub fn new(provider: Arc<dyn ConnectionProvider>, config: NotifierConfig, hooks: Hooks) -> Result<Arc<Self>> {
        config.validate()?;
        let registry = Arc::new(SubscriptionManager::new());
        let hooks = Arc::new(hooks);
        registry.set_hooks(Arc::clone(&hooks));
        let metrics = Arc::new(MetricsCollector::new());
        let dispatcher =
            Arc::new(Dispatcher::new(Arc::clone(&hooks), Arc::clone(&metrics), config.callback_timeout, config.buffer_size));
        let supervisor = Arc::new(ConnectionSupervisor::new(
            Arc::clone(&provider),
            Arc::clone(&registry),
            Arc::clone(&hooks),
            Arc::clone(&metrics),
            config.clone(),
        ));
        let (stopped_tx, stopped_rx) = watch::channel(false);

        let notifier = Arc::new(Self {
            provider,
            registry,
            dispatcher,
            supervisor,
            hooks,
            metrics,
            config,
            internal_ctx: CancellationToken::new(),
            state: Mutex::new(State::Created),
            stopped_tx,
            stopped_rx,
        });
        let notifier_as_hook: Arc<dyn ChannelEmptyHook> = Arc::clone(&notifier) as Arc<dyn ChannelEmptyHook>;
        let channel_empty_hook: std::sync::Weak<dyn ChannelEmptyHook> = Arc::downgrade(&notifier_as_hook);
        notifier.registry.set_channel_empty_hook(channel_empty_hook);
        Ok(notifier)
    }

    /// Publish `payload` on `channel`.
    pub async fn publish(&self, channel: &str, payload: &[u8]) -> Result<()> {
        if channel.is_empty() {
            return Err(NotifierError::ChannelEmpty);
        }
        if payload.len() > self.config.max_payload_size {
            return Err(NotifierError::PayloadTooLarge { size: payload.len(), max: self.config.max_payload_size });
        }
        if !self.provider.is_connected() {
            return Err(NotifierError::NotConnected);
        }
        self.provider.notify(CancellationToken::new(), channel, payload).await
    }

    /// Subscribe `callback` to `channel`, issuing `LISTEN` if this is the
    /// channel's first subscriber and the provider is connected.
    pub async fn subscribe(self: &Arc<Self>, channel: &str, callback: Callback) -> Result<Arc<Subscription>> {
        if channel.is_empty() {
            return Err(NotifierError::ChannelEmpty);
        }

        let was_empty = !self.registry.has_channel(channel);
        let subscription = self.registry.add(channel.to_string(), callback);

        if was_empty && self.provider.is_connected() {
            if let Err(e) = self.provider.listen(CancellationToken::new(), channel).await {
                self.registry.remove(channel, subscription.id);
                return Err(e);
            }
        }

        self.hooks.fire_subscribe(channel);
        Ok(subscription)
    }

    /// Start the receive loop and supervisor; blocks until `ctx` is
    /// cancelled, then waits for both workers to drain before returning.
    pub async fn start(self: &Arc<Self>, ctx: CancellationToken) -> Result<()> {
        {
            let mut state = self.state.lock();
            match *state {
                State::Running => return Err(NotifierError::AlreadyStarted),
                State::Stopped => return Err(NotifierError::AlreadyStopped),
                State::Created => *state = State::Running,
            }
        }

        let receive_handle: JoinHandle<()> = {
            let this = Arc::clone(self);
            let internal = self.internal_ctx.clone();
            tokio::spawn(async move { this.receive_loop(internal).await })
        };
        let supervisor_handle: JoinHandle<()> = {
            let supervisor = Arc::clone(&self.supervisor);
            let internal = self.internal_ctx.clone();
            tokio::spawn(async move { supervisor.run(internal).await })
        };

        // Either the caller's context or a direct `shutdown` call cancels
        // the internal context; whichever fires first wins.
        tokio::select! {
            () = ctx.cancelled() => self.internal_ctx.cancel(),
            () = self.internal_ctx.cancelled() => {}
        }

        let _ = tokio::join!(receive_handle, supervisor_handle);

        *self.state.lock() = State::Stopped;
        let _ = self.stopped_tx.send(true);
        Ok(())
    }

    /// Idempotent shutdown: cancels the internal context, waits for
    /// workers and in-flight dispatches to complete bounded by `ctx`, then
    /// closes the provider.
    pub async fn shutdown(&self, ctx: CancellationToken) -> Result<()> {
        {
            let mut state = self.state.lock();
            match *state {
                State::Stopped => return Ok(()),
                State::Created => {
                    *state = State::Stopped;
                    let _ = self.stopped_tx.send(true);
                    return Ok(());
                },
                State::Running => {},
            }
        }

        self.internal_ctx.cancel();

        let mut rx = self.stopped_rx.clone();
        if !*rx.borrow() {
            tokio::select! {
                biased;
                () = ctx.cancelled() => return Err(NotifierError::ShutdownTimeout),
                result = rx.changed() => {
                    if result.is_err() {
                        warn!("stopped watch channel closed before shutdown observed completion");
                    }
                }
            }
        }

        if !self.dispatcher.drain(ctx).await {
            return Err(NotifierError::ShutdownTimeout);
        }

        self.provider.close().await?;
        info!("pgnotify notifier shut down");
        Ok(())
    }

    /// Whether the notifier is running and its provider reports connected.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        *self.state.lock() == State::Running && self.provider.is_connected()
    }

    /// Snapshot of counters and connection state.
    #[must_use]
    pub fn get_statistics(&self) -> NotifierStatistics {
        self.metrics.snapshot(self.registry.channels().len(), self.registry.count(), self.provider.as_ref())
    }

    /// Issue `UNLISTEN` for `channel` if the provider is connected. Run as
    /// a detached task since `remove` (and `Subscription::drop`) cannot
    /// await; losing a best-effort `UNLISTEN` on a connected-but-racing
    /// provider is logged rather than surfaced, since there is no caller
    /// left to receive the error.
    fn spawn_unlisten(&self, channel: &str) {
        if !self.provider.is_connected() {
            return;
        }
        let provider = Arc::clone(&self.provider);
        let hooks = Arc::clone(&self.hooks);
        let channel = channel.to_string();
        tokio::spawn(async move {
            if let Err(e) = provider.unlisten(CancellationToken::new(), &channel).await {
                warn!(channel, error = %e, "UNLISTEN failed after last subscriber removed");
                hooks.fire_error(&e, &channel);
            }
        });
    }

    async fn receive_loop(self: Arc<Self>, ctx: CancellationToken) {
        loop {
            if ctx.is_cancelled() {
                return;
            }

            if !self.provider.is_connected() {
                tokio::select! {
                    biased;
                    () = ctx.cancelled() => return,
                    () = tokio::time::sleep(DISCONNECTED_POLL_INTERVAL) => {}
                }
                continue;
            }

            match self.provider.wait_for_notification(ctx.child_token()).await {
                Ok(notification) => {
                    self.metrics.record_notification();
                    let subscribers = self.registry.get(&notification.channel);
                    self.dispatcher.dispatch(notification, subscribers).await;
                },
                Err(e) => {
                    if ctx.is_cancelled() {
                        return;
                    }
                    warn!(error = %e, "wait_for_notification failed; supervisor will detect disconnection");
                    tokio::time::sleep(Duration::from_millis(50)).await;
                },
            }
        }
    }
}

impl ChannelEmptyHook for Notifier {
    fn on_channel_emptied(&self, channel: &str) {
        self.spawn_unlisten(channel);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // tests favor unwrap over explicit error handling
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use super::*;
    use crate::provider::InMemoryConnectionProvider;

    fn counting_callback(counter: Arc<AtomicUsize>) -> Callback {
        Arc::new(move |_n| {
            let counter = Arc::clone(&counter);
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        })
    }

    #[tokio::test]
    async fn publish_rejects_empty_channel() {
        let provider = Arc::new(InMemoryConnectionProvider::new());
        let notifier = Notifier::new(provider, NotifierConfig::default(), Hooks::builder()).unwrap();
        assert!(matches!(notifier.publish("", b"x").await, Err(NotifierError::ChannelEmpty)));
    }

    #[tokio::test]
    async fn publish_rejects_oversize_payload() {
        let provider = Arc::new(InMemoryConnectionProvider::new());
        let mut config = NotifierConfig::default();
        config.max_payload_size = 4;
        let notifier = Notifier::new(provider, config, Hooks::builder()).unwrap();
        assert!(matches!(notifier.publish("ch", b"too long").await, Err(NotifierError::PayloadTooLarge { .. })));
    }

    #[tokio::test]
    async fn publish_rejects_when_disconnected() {
        let provider = Arc::new(InMemoryConnectionProvider::new());
        provider.set_connected(false);
        let notifier = Notifier::new(provider, NotifierConfig::default(), Hooks::builder()).unwrap();
        assert!(matches!(notifier.publish("ch", b"x").await, Err(NotifierError::NotConnected)));
    }

    #[tokio::test]
    async fn subscribe_issues_listen_for_first_subscriber_only() {
        let provider = Arc::new(InMemoryConnectionProvider::new());
        let notifier = Notifier::new(provider.clone(), NotifierConfig::default(), Hooks::builder()).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        notifier.subscribe("events", counting_callback(Arc::clone(&counter))).await.unwrap();
        notifier.subscribe("events", counting_callback(Arc::clone(&counter))).await.unwrap();
        assert_eq!(provider.listened_channels().await, vec!["events".to_string()]);
    }

    #[tokio::test]
    async fn unsubscribe_through_notifier_fires_hook() {
        let provider = Arc::new(InMemoryConnectionProvider::new());
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = Arc::clone(&fired);
        let hooks = Hooks::builder().on_unsubscribe(move |_ch| {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        });
        let notifier = Notifier::new(provider, NotifierConfig::default(), hooks).unwrap();

        let counter = Arc::new(AtomicUsize::new(0));
        let subscription = notifier.subscribe("events", counting_callback(counter)).await.unwrap();
        subscription.unsubscribe();

        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unsubscribe_of_last_subscriber_issues_unlisten() {
        let provider = Arc::new(InMemoryConnectionProvider::new());
        let notifier = Notifier::new(provider.clone(), NotifierConfig::default(), Hooks::builder()).unwrap();

        let counter = Arc::new(AtomicUsize::new(0));
        let subscription = notifier.subscribe("events", counting_callback(counter)).await.unwrap();
        assert_eq!(provider.listened_channels().await, vec!["events".to_string()]);

        subscription.unsubscribe();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(provider.listened_channels().await.is_empty());
    }

    #[tokio::test]
    async fn unsubscribe_of_one_of_several_does_not_unlisten() {
        let provider = Arc::new(InMemoryConnectionProvider::new());
        let notifier = Notifier::new(provider.clone(), NotifierConfig::default(), Hooks::builder()).unwrap();

        let counter = Arc::new(AtomicUsize::new(0));
        let a = notifier.subscribe("events", counting_callback(Arc::clone(&counter))).await.unwrap();
        let _b = notifier.subscribe("events", counting_callback(counter)).await.unwrap();

        a.unsubscribe();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(provider.listened_channels().await, vec!["events".to_string()]);
    }

    #[tokio::test]
    async fn round_trip_publish_delivers_to_subscriber() {
        let provider = Arc::new(InMemoryConnectionProvider::new());
        let notifier = Notifier::new(provider, NotifierConfig::default(), Hooks::builder()).unwrap();

        let counter = Arc::new(AtomicUsize::new(0));
        notifier.subscribe("events", counting_callback(Arc::clone(&counter))).await.unwrap();

        let notifier_clone = Arc::clone(&notifier);
        let ctx = CancellationToken::new();
        let ctx_clone = ctx.clone();
        let handle = tokio::spawn(async move { notifier_clone.start(ctx_clone).await });

        notifier.publish("events", b"Hello, World!").await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(counter.load(Ordering::SeqCst), 1);

        ctx.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn start_twice_returns_already_started() {
        let provider = Arc::new(InMemoryConnectionProvider::new());
        let notifier = Notifier::new(provider, NotifierConfig::default(), Hooks::builder()).unwrap();
        let ctx = CancellationToken::new();
        let notifier_clone = Arc::clone(&notifier);
        let ctx_clone = ctx.clone();
        let handle = tokio::spawn(async move { notifier_clone.start(ctx_clone).await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(matches!(notifier.start(CancellationToken::new()).await, Err(NotifierError::AlreadyStarted)));

        ctx.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn start_after_shutdown_returns_already_stopped() {
        let provider = Arc::new(InMemoryConnectionProvider::new());
        let notifier = Notifier::new(provider, NotifierConfig::default(), Hooks::builder()).unwrap();
        notifier.shutdown(CancellationToken::new()).await.unwrap();
        assert!(matches!(notifier.start(CancellationToken::new()).await, Err(NotifierError::AlreadyStopped)));
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let provider = Arc::new(InMemoryConnectionProvider::new());
        let notifier = Notifier::new(provider, NotifierConfig::default(), Hooks::builder()).unwrap();
        notifier.shutdown(CancellationToken::new()).await.unwrap();
        notifier.shutdown(CancellationToken::new()).await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_drains_running_notifier() {
        let provider = Arc::new(InMemoryConnectionProvider::new());
        let notifier = Notifier::new(provider, NotifierConfig::default(), Hooks::builder()).unwrap();
        let notifier_clone = Arc::clone(&notifier);
        let handle = tokio::spawn(async move { notifier_clone.start(CancellationToken::new()).await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        notifier.shutdown(CancellationToken::new()).await.unwrap();
        handle.await.unwrap().unwrap();
        assert!(!notifier.is_healthy());
    }
}
