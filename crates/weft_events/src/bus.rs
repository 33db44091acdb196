//! Publish/subscribe event feed.
//!
//! Named subscribers are called synchronously, in subscription order, on
//! the publishing task. A broadcast tap additionally lets async consumers
//! follow every event without blocking the publisher.

use crate::event::{Event, EventKind};
use indexmap::IndexMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;

/// Default capacity of the broadcast tap
pub const DEFAULT_TAP_CAPACITY: usize = 256;

/// Callback invoked for each matching event
pub type EventHandler = Arc<dyn Fn(&Event) + Send + Sync>;

/// Handle returned by `subscribe`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// Process-wide event channel injected into the registry and engine
pub trait EventFeed: Send + Sync {
    /// Deliver an event to every subscriber of its kind
    fn publish(&self, event: Event);

    /// Register a handler for one event kind
    fn subscribe(&self, kind: EventKind, handler: EventHandler) -> SubscriptionId;

    /// Remove a handler, returning whether it was registered
    fn unsubscribe(&self, id: SubscriptionId) -> bool;
}

struct Subscription {
    kind: EventKind,
    handler: EventHandler,
}

/// In-process event bus
pub struct EventBus {
    subscriptions: RwLock<IndexMap<SubscriptionId, Subscription>>,
    next_id: AtomicU64,
    tap: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a bus with the default tap capacity
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TAP_CAPACITY)
    }

    /// Create a bus whose broadcast tap buffers `capacity` events
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (tap, _) = broadcast::channel(capacity.max(1));
        Self {
            subscriptions: RwLock::new(IndexMap::new()),
            next_id: AtomicU64::new(1),
            tap,
        }
    }

    /// Follow every published event asynchronously.
    ///
    /// Slow receivers observe `RecvError::Lagged` rather than blocking the
    /// publisher.
    #[must_use]
    pub fn subscribe_all(&self) -> broadcast::Receiver<Event> {
        self.tap.subscribe()
    }

    /// Number of named subscriptions for a kind
    #[must_use]
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|s| s.kind == kind)
            .count()
    }

    fn handlers_for(&self, kind: EventKind) -> Vec<EventHandler> {
        // Clone out so handlers may subscribe or unsubscribe re-entrantly
        self.subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|s| s.kind == kind)
            .map(|s| Arc::clone(&s.handler))
            .collect()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventFeed for EventBus {
    fn publish(&self, event: Event) {
        let kind = event.kind();
        for handler in self.handlers_for(kind) {
            if catch_unwind(AssertUnwindSafe(|| handler(&event))).is_err() {
                tracing::warn!(event = kind.as_str(), "event handler panicked");
            }
        }
        // No receivers is not an error
        let _ = self.tap.send(event);
        tracing::trace!(event = kind.as_str(), "event published");
    }

    fn subscribe(&self, kind: EventKind, handler: EventHandler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Subscription { kind, handler });
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .shift_remove(&id)
            .is_some()
    }
}
