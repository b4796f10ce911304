//! Optional, panic-isolated lifecycle callbacks.

use std::{panic::AssertUnwindSafe, sync::Arc, time::Duration};

use tracing::error;

use crate::{error::NotifierError, notification::Notification};

type NotificationHook = Arc<dyn Fn(&Notification) + Send + Sync>;
type ErrorHook = Arc<dyn Fn(&NotifierError, &str) + Send + Sync>;
type ChannelHook = Arc<dyn Fn(&str) + Send + Sync>;
type ConnectHook = Arc<dyn Fn() + Send + Sync>;
type DisconnectHook = Arc<dyn Fn(&NotifierError) + Send + Sync>;
type ReconnectAttemptHook = Arc<dyn Fn(u32, Duration) + Send + Sync>;
type ReconnectSuccessHook = Arc<dyn Fn(u32) + Send + Sync>;
type ReconnectFailedHook = Arc<dyn Fn(u32, &NotifierError) + Send + Sync>;

/// Observability hooks, each optional and each invoked with panics caught
/// so a buggy hook can never take down the receive loop or supervisor.
#[derive(Clone, Default)]
pub struct Hooks {
    on_notification: Option<NotificationHook>,
    on_error: Option<ErrorHook>,
    on_subscribe: Option<ChannelHook>,
    on_unsubscribe: Option<ChannelHook>,
    on_connect: Option<ConnectHook>,
    on_disconnect: Option<DisconnectHook>,
    on_reconnect_attempt: Option<ReconnectAttemptHook>,
    on_reconnect_success: Option<ReconnectSuccessHook>,
    on_reconnect_failed: Option<ReconnectFailedHook>,
}

impl Hooks {
    /// Start building a hook set with nothing registered.
    #[must_use]
    pub fn builder() -> Self {
        Self::default()
    }

    /// Fired once per received notification, before dispatch.
    #[must_use]
    pub fn on_notification(mut self, f: impl Fn(&Notification) + Send + Sync + 'static) -> Self {
        self.on_notification = Some(Arc::new(f));
        self
    }

    /// Fired once per failed or panicking callback invocation.
    #[must_use]
    pub fn on_error(mut self, f: impl Fn(&NotifierError, &str) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// Fired after a successful `Subscribe`.
    #[must_use]
    pub fn on_subscribe(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_subscribe = Some(Arc::new(f));
        self
    }

    /// Fired after an `Unsubscribe`.
    #[must_use]
    pub fn on_unsubscribe(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_unsubscribe = Some(Arc::new(f));
        self
    }

    /// Fired when the supervisor (re)establishes a connection.
    #[must_use]
    pub fn on_connect(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_connect = Some(Arc::new(f));
        self
    }

    /// Fired once per disconnect episode.
    #[must_use]
    pub fn on_disconnect(mut self, f: impl Fn(&NotifierError) + Send + Sync + 'static) -> Self {
        self.on_disconnect = Some(Arc::new(f));
        self
    }

    /// Fired before each reconnect attempt's backoff sleep.
    #[must_use]
    pub fn on_reconnect_attempt(mut self, f: impl Fn(u32, Duration) + Send + Sync + 'static) -> Self {
        self.on_reconnect_attempt = Some(Arc::new(f));
        self
    }

    /// Fired once a reconnect attempt succeeds.
    #[must_use]
    pub fn on_reconnect_success(mut self, f: impl Fn(u32) + Send + Sync + 'static) -> Self {
        self.on_reconnect_success = Some(Arc::new(f));
        self
    }

    /// Fired when `max_reconnect_attempts` is reached without success.
    #[must_use]
    pub fn on_reconnect_failed(mut self, f: impl Fn(u32, &NotifierError) + Send + Sync + 'static) -> Self {
        self.on_reconnect_failed = Some(Arc::new(f));
        self
    }

    pub(crate) fn fire_notification(&self, n: &Notification) {
        if let Some(hook) = &self.on_notification {
            guard("on_notification", || hook(n));
        }
    }

    pub(crate) fn fire_error(&self, err: &NotifierError, channel: &str) {
        if let Some(hook) = &self.on_error {
            guard("on_error", || hook(err, channel));
        }
    }

    pub(crate) fn fire_subscribe(&self, channel: &str) {
        if let Some(hook) = &self.on_subscribe {
            guard("on_subscribe", || hook(channel));
        }
    }

    pub(crate) fn fire_unsubscribe(&self, channel: &str) {
        if let Some(hook) = &self.on_unsubscribe {
            guard("on_unsubscribe", || hook(channel));
        }
    }

    pub(crate) fn fire_connect(&self) {
        if let Some(hook) = &self.on_connect {
            guard("on_connect", || hook());
        }
    }

    pub(crate) fn fire_disconnect(&self, err: &NotifierError) {
        if let Some(hook) = &self.on_disconnect {
            guard("on_disconnect", || hook(err));
        }
    }

    pub(crate) fn fire_reconnect_attempt(&self, attempt: u32, next_delay: Duration) {
        if let Some(hook) = &self.on_reconnect_attempt {
            guard("on_reconnect_attempt", || hook(attempt, next_delay));
        }
    }

    pub(crate) fn fire_reconnect_success(&self, attempt: u32) {
        if let Some(hook) = &self.on_reconnect_success {
            guard("on_reconnect_success", || hook(attempt));
        }
    }

    pub(crate) fn fire_reconnect_failed(&self, attempts: u32, err: &NotifierError) {
        if let Some(hook) = &self.on_reconnect_failed {
            guard("on_reconnect_failed", || hook(attempts, err));
        }
    }
}

/// Run `f`, catching any panic so a misbehaving hook never escapes this
/// boundary.
fn guard(name: &str, f: impl FnOnce()) {
    if let Err(payload) = std::panic::catch_unwind(AssertUnwindSafe(f)) {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        error!(hook = name, panic = %message, "hook panicked, isolated");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // tests favor unwrap over explicit error handling
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[test]
    fn panicking_hook_is_isolated() {
        let hooks = Hooks::builder().on_connect(|| panic!("boom"));
        hooks.fire_connect();
    }

    #[test]
    fn registered_hook_is_invoked() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);
        let hooks = Hooks::builder().on_connect(move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });
        hooks.fire_connect();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unregistered_hook_is_a_no_op() {
        let hooks = Hooks::builder();
        hooks.fire_connect();
        hooks.fire_disconnect(&NotifierError::NotConnected);
    }
}
