//! Fans a received notification out to its channel's subscribers.

use std::{panic::AssertUnwindSafe, sync::Arc, time::Duration};

use futures::FutureExt;
use tokio::{sync::Mutex, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::{
    error::NotifierError,
    hooks::Hooks,
    metrics::MetricsCollector,
    notification::Notification,
    subscription::Subscription,
};

/// Dispatches notifications to subscribers on independent tasks.
///
/// Each dispatched callback runs under its own timeout and is isolated
/// from panics; no callback's failure or slowness affects siblings or the
/// caller of [`Dispatcher::dispatch`]. A semaphore bounds how many callback
/// tasks may be in flight at once, regardless of subscriber count.
pub struct Dispatcher {
    hooks: Arc<Hooks>,
    metrics: Arc<MetricsCollector>,
    callback_timeout: Duration,
    semaphore: Arc<tokio::sync::Semaphore>,
    tasks: Mutex<JoinSet<()>>,
}

impl Dispatcher {
    /// Construct a dispatcher bounded by `buffer_size` concurrent callback
    /// tasks and `callback_timeout` per callback (zero disables the
    /// per-callback bound).
    #[must_use]
    pub fn new(
        hooks: Arc<Hooks>,
        metrics: Arc<MetricsCollector>,
        callback_timeout: Duration,
        buffer_size: usize,
    ) -> Self {
        Self {
            hooks,
            metrics,
            callback_timeout,
            semaphore: Arc::new(tokio::sync::Semaphore::new(buffer_size)),
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    /// Fire the `OnNotification` hook, then spawn one task per active
    /// subscriber in `subscribers` (a pre-snapshotted, insertion-ordered
    /// list).
    pub async fn dispatch(&self, notification: Notification, subscribers: Vec<Arc<Subscription>>) {
        self.hooks.fire_notification(&notification);

        let mut tasks = self.tasks.lock().await;
        for subscription in subscribers {
            if !subscription.is_active() {
                continue;
            }
            let semaphore = Arc::clone(&self.semaphore);
            let hooks = Arc::clone(&self.hooks);
            let metrics = Arc::clone(&self.metrics);
            let timeout = self.callback_timeout;
            let notification = notification.clone();

            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire().await else { return };
                if !subscription.is_active() {
                    return;
                }
                run_one(&subscription, notification, timeout, &hooks, &metrics).await;
            });
        }
    }

    /// Wait for every in-flight callback task to finish, bounded by `ctx`.
    /// Returns `false` if `ctx` fired before all tasks drained.
    pub async fn drain(&self, ctx: CancellationToken) -> bool {
        let mut tasks = self.tasks.lock().await;
        loop {
            if tasks.is_empty() {
                return true;
            }
            tokio::select! {
                biased;
                _ = ctx.cancelled() => return false,
                joined = tasks.join_next() => {
                    if let Some(Err(e)) = joined {
                        warn!(error = %e, "dispatcher task join failed");
                    }
                }
            }
        }
    }
}

async fn run_one(
    subscription: &Subscription,
    notification: Notification,
    timeout: Duration,
    hooks: &Hooks,
    metrics: &MetricsCollector,
) {
    let channel = notification.channel.clone();
    let callback = Arc::clone(&subscription.callback);
    let invocation = AssertUnwindSafe(callback(notification)).catch_unwind();

    let outcome = if timeout.is_zero() {
        invocation.await
    } else {
        match tokio::time::timeout(timeout, invocation).await {
            Ok(outcome) => outcome,
            Err(_) => {
                metrics.record_dispatch_error();
                hooks.fire_error(&NotifierError::CallbackTimedOut { channel: channel.clone() }, &channel);
                return;
            },
        }
    };

    match outcome {
        Ok(Ok(())) => {},
        Ok(Err(err)) => {
            metrics.record_dispatch_error();
            hooks.fire_error(
                &NotifierError::CallbackFailed { channel: channel.clone(), reason: err.to_string() },
                &channel,
            );
        },
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            metrics.record_dispatch_error();
            hooks.fire_error(&NotifierError::CallbackPanicked { message }, &channel);
        },
    }
}
