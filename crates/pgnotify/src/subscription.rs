//! Subscriber callbacks and the handle returned to callers.

use std::{
    future::Future,
    pin::Pin,
    sync::{
        Arc, Weak,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use crate::{notification::Notification, registry::SubscriptionManager};

/// Outcome of a callback invocation, boxed so callers can wrap any error
/// type without the trait depending on it.
pub type CallbackResult = std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Future returned by a subscriber callback.
pub type CallbackFuture = Pin<Box<dyn Future<Output = CallbackResult> + Send>>;

/// A subscriber callback: receives an owned notification, returns a future
/// resolving to success or a boxed error.
pub type Callback = Arc<dyn Fn(Notification) -> CallbackFuture + Send + Sync>;

static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

/// A single registered subscriber.
///
/// Holds its own callback reference and active flag; the dispatcher skips
/// invoking a subscription once `active` is false, so `Unsubscribe` racing
/// a concurrent dispatch never invokes a callback after cancellation.
pub struct Subscription {
    pub(crate) id: u64,
    pub(crate) channel: String,
    pub(crate) callback: Callback,
    pub(crate) active: Arc<AtomicBool>,
    manager: Weak<SubscriptionManager>,
}

impl Subscription {
    pub(crate) fn new(channel: String, callback: Callback, manager: Weak<SubscriptionManager>) -> Self {
        Self {
            id: NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed),
            channel,
            callback,
            active: Arc::new(AtomicBool::new(true)),
            manager,
        }
    }

    /// Channel this subscription was registered for.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Whether this subscription is still active (not yet unsubscribed).
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Remove this subscription from its notifier's registry.
    ///
    /// Idempotent: repeated calls, including concurrent ones, are no-ops
    /// after the first. Safe to call even after the owning notifier has
    /// been dropped (the weak reference to the registry simply fails to
    /// upgrade).
    pub fn unsubscribe(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            if let Some(manager) = self.manager.upgrade() {
                manager.remove(&self.channel, self.id);
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
