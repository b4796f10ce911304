//! Thread-safe registry mapping channel names to their active subscribers.

use std::{
    collections::HashMap,
    sync::{Arc, Weak},
};

use parking_lot::RwLock;

use crate::hooks::Hooks;
use crate::subscription::{Callback, Subscription};

/// Notified when a channel's last subscriber is removed, so the holder can
/// issue `UNLISTEN` against the provider. Implemented by
/// [`crate::notifier::Notifier`]; the registry itself has no provider to
/// call.
pub(crate) trait ChannelEmptyHook: Send + Sync {
    fn on_channel_emptied(&self, channel: &str);
}

/// Registry of channel -> ordered subscriber list.
///
/// Guarded by a readers-writer lock; every list retrieval returns a
/// defensive copy (a cloned `Vec<Arc<Subscription>>`) so dispatch never
/// holds the lock across a callback invocation and mutation never races a
/// snapshot in progress.
#[derive(Default)]
pub struct SubscriptionManager {
    channels: RwLock<HashMap<String, Vec<Arc<Subscription>>>>,
    hooks: RwLock<Option<Arc<Hooks>>>,
    channel_emptied: RwLock<Option<Weak<dyn ChannelEmptyHook>>>,
}

impl SubscriptionManager {
    /// Construct an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self { channels: RwLock::new(HashMap::new()), hooks: RwLock::new(None), channel_emptied: RwLock::new(None) }
    }

    /// Wire hooks so `remove` can fire `OnUnsubscribe`. Called once by
    /// [`crate::notifier::Notifier::new`]; a registry with no hooks set
    /// simply fires none.
    pub(crate) fn set_hooks(&self, hooks: Arc<Hooks>) {
        *self.hooks.write() = Some(hooks);
    }

    /// Wire the holder to notify when a channel's subscriber list empties,
    /// so it can issue `UNLISTEN`. Held weakly so the registry never keeps
    /// the notifier alive.
    pub(crate) fn set_channel_empty_hook(&self, hook: Weak<dyn ChannelEmptyHook>) {
        *self.channel_emptied.write() = Some(hook);
    }

    /// Register a new subscriber for `channel`, appended after any existing
    /// subscribers (insertion order is dispatch order).
    ///
    /// The registry does not know its own `Arc` at construction time, so
    /// callers must wrap the manager in an `Arc` before calling `add` if
    /// they want `Subscription::unsubscribe` to be able to reach back in;
    /// [`crate::notifier::Notifier`] does this internally.
    pub fn add(self: &Arc<Self>, channel: String, callback: Callback) -> Arc<Subscription> {
        let subscription = Arc::new(Subscription::new(channel.clone(), callback, Arc::downgrade(self)));
        self.channels.write().entry(channel).or_default().push(Arc::clone(&subscription));
        subscription
    }

    /// Remove the subscription with `id` from `channel`, if present.
    ///
    /// Returns true if the channel's subscriber list became empty as a
    /// result, for callers that want to observe it directly; the
    /// `UNLISTEN` itself is triggered internally via
    /// [`Self::set_channel_empty_hook`], not by the caller. Removes the
    /// channel entry entirely once empty so `has_channel`/`channels` never
    /// report a dead channel.
    pub fn remove(&self, channel: &str, id: u64) -> bool {
        let mut channels = self.channels.write();
        let Some(subs) = channels.get_mut(channel) else {
            return false;
        };
        let before = subs.len();
        subs.retain(|s| s.id != id);
        let removed = subs.len() != before;
        let now_empty = subs.is_empty();
        if now_empty {
            channels.remove(channel);
        }
        drop(channels);

        if removed {
            if let Some(hooks) = self.hooks.read().as_ref() {
                hooks.fire_unsubscribe(channel);
            }
        }
        if removed && now_empty {
            if let Some(hook) = self.channel_emptied.read().as_ref().and_then(Weak::upgrade) {
                hook.on_channel_emptied(channel);
            }
        }
        now_empty
    }

    /// Snapshot of the current subscribers for `channel`, in insertion
    /// order. Empty if the channel has no subscribers or does not exist.
    #[must_use]
    pub fn get(&self, channel: &str) -> Vec<Arc<Subscription>> {
        self.channels.read().get(channel).cloned().unwrap_or_default()
    }

    /// Snapshot of all channel names with at least one active subscriber.
    #[must_use]
    pub fn channels(&self) -> Vec<String> {
        self.channels.read().keys().cloned().collect()
    }

    /// Whether `channel` currently has any subscribers.
    #[must_use]
    pub fn has_channel(&self, channel: &str) -> bool {
        self.channels.read().contains_key(channel)
    }

    /// Total number of subscriptions across all channels.
    #[must_use]
    pub fn count(&self) -> usize {
        self.channels.read().values().map(Vec::len).sum()
    }

    /// Remove every subscription from every channel.
    pub fn clear(&self) {
        self.channels.write().clear();
    }
}
