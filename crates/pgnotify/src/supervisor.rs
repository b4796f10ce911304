//! Periodic health checks and capped-exponential-backoff reconnection.

use std::{sync::Arc, time::Duration};

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    config::NotifierConfig, error::NotifierError, hooks::Hooks, metrics::MetricsCollector,
    provider::ConnectionProvider, registry::SubscriptionManager,
};

const RECONNECT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);
const RELISTEN_TIMEOUT: Duration = Duration::from_secs(10);

/// Watches connection health and drives reconnection when it degrades.
///
/// Runs as a single long-lived task per notifier: wakes every
/// `ping_interval`, and on disconnection runs a reconnect loop with
/// exponential backoff capped at `max_reconnect_interval`, re-registering
/// every channel the [`SubscriptionManager`] tracks once the connection is
/// restored.
pub struct ConnectionSupervisor {
    provider: Arc<dyn ConnectionProvider>,
    registry: Arc<SubscriptionManager>,
    hooks: Arc<Hooks>,
    metrics: Arc<MetricsCollector>,
    config: NotifierConfig,
}

impl ConnectionSupervisor {
    /// Construct a supervisor over `provider`, re-listening against
    /// `registry` after each successful reconnect.
    #[must_use]
    pub fn new(
        provider: Arc<dyn ConnectionProvider>,
        registry: Arc<SubscriptionManager>,
        hooks: Arc<Hooks>,
        metrics: Arc<MetricsCollector>,
        config: NotifierConfig,
    ) -> Self {
        Self { provider, registry, hooks, metrics, config }
    }

    /// Run the supervision loop until `ctx` is cancelled.
    pub async fn run(&self, ctx: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.ping_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await; // first tick fires immediately; skip it

        loop {
            tokio::select! {
                biased;
                () = ctx.cancelled() => return,
                _ = ticker.tick() => {
                    if let Err(err) = self.check_health(ctx.child_token()).await {
                        self.handle_disconnect(ctx.clone(), err).await;
                    }
                }
            }
        }
    }

    async fn check_health(&self, ctx: CancellationToken) -> Result<(), NotifierError> {
        if !self.provider.is_connected() {
            return Err(NotifierError::NotConnected);
        }
        self.provider.ping(ctx).await
    }

    async fn handle_disconnect(&self, ctx: CancellationToken, err: NotifierError) {
        warn!(error = %err, "pgnotify connection lost, entering reconnect loop");
        self.metrics.record_disconnect();
        self.hooks.fire_disconnect(&err);
        self.reconnect_loop(ctx).await;
    }

    async fn reconnect_loop(&self, ctx: CancellationToken) {
        let mut attempt: u32 = 0;
        let mut backoff = self.config.reconnect_interval;
        let mut last_reason = String::new();

        loop {
            if ctx.is_cancelled() {
                return;
            }

            if self.config.max_reconnect_attempts > 0 && attempt >= self.config.max_reconnect_attempts {
                let err = NotifierError::ReconnectFailed { attempts: attempt, reason: last_reason };
                self.hooks.fire_reconnect_failed(attempt, &err);
                return;
            }

            attempt += 1;
            self.hooks.fire_reconnect_attempt(attempt, backoff);

            tokio::select! {
                biased;
                () = ctx.cancelled() => return,
                () = tokio::time::sleep(backoff) => {}
            }

            let attempt_ctx = ctx.child_token();
            let outcome = tokio::time::timeout(RECONNECT_ATTEMPT_TIMEOUT, self.provider.reconnect(attempt_ctx)).await;

            match outcome {
                Ok(Ok(())) => {
                    self.metrics.record_connect();
                    self.metrics.record_reconnect_success();
                    self.hooks.fire_connect();
                    self.hooks.fire_reconnect_success(attempt);
                    info!(attempt, "pgnotify reconnected, re-registering listeners");
                    self.relisten_all(ctx.clone()).await;
                    return;
                },
                Ok(Err(e)) => {
                    last_reason = e.to_string();
                    backoff = next_backoff(backoff, self.config.reconnect_backoff_multiplier, self.config.max_reconnect_interval);
                },
                Err(_elapsed) => {
                    last_reason = "reconnect attempt timed out".to_string();
                    backoff = next_backoff(backoff, self.config.reconnect_backoff_multiplier, self.config.max_reconnect_interval);
                },
            }
        }
    }

    async fn relisten_all(&self, ctx: CancellationToken) {
        let channels = self.registry.channels();
        let relisten_ctx = ctx.child_token();
        let relisten = async {
            for channel in channels {
                if let Err(e) = self.provider.listen(relisten_ctx.clone(), &channel).await {
                    warn!(channel = %channel, error = %e, "failed to re-register listener after reconnect");
                }
            }
        };
        let _ = tokio::time::timeout(RELISTEN_TIMEOUT, relisten).await;
    }
}

fn next_backoff(current: Duration, multiplier: f64, cap: Duration) -> Duration {
    current.mul_f64(multiplier).min(cap)
}
