//! State-change subscription channel
//!
//! Subscribing delivers the current snapshot synchronously, then registers
//! the callback for every future broadcast in mutation order.

use shaping_plugin_api::PluginState;
use std::sync::{Arc, Mutex, PoisonError};

/// Callback invoked with each plugin state snapshot.
pub type StateCallback = Box<dyn Fn(&PluginState) + Send + Sync>;

/// Handle identifying a registered callback, usable to unsubscribe it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscription(usize);

/// Publish/subscribe channel for plugin state broadcasts.
///
/// Callbacks run synchronously on the publishing thread and must not call
/// back into the publisher.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Mutex<BusInner>>,
}

#[derive(Default)]
struct BusInner {
    /// Slots are tombstoned on unsubscribe so handles stay stable.
    subscribers: Vec<Option<StateCallback>>,
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `current` to `callback` immediately, then register it for all
    /// future broadcasts.
    pub fn subscribe(&self, current: &PluginState, callback: StateCallback) -> Subscription {
        callback(current);
        let mut inner = self.lock();
        inner.subscribers.push(Some(callback));
        Subscription(inner.subscribers.len() - 1)
    }

    /// Remove a previously registered callback. Returns false if the handle
    /// was already removed.
    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        let mut inner = self.lock();
        match inner.subscribers.get_mut(subscription.0) {
            Some(slot) if slot.is_some() => {
                *slot = None;
                true
            }
            _ => false,
        }
    }

    /// Broadcast a snapshot to every registered callback.
    pub fn publish(&self, state: &PluginState) {
        let inner = self.lock();
        for callback in inner.subscribers.iter().flatten() {
            callback(state);
        }
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.iter().flatten().count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BusInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
