//! Recording feed for asserting on published events.

use crate::bus::{EventBus, EventFeed, EventHandler, SubscriptionId};
use crate::event::{Event, EventKind};
use std::sync::{Mutex, PoisonError};

/// Feed that keeps every published event in order, then forwards it to an
/// inner bus so subscriptions still work
#[derive(Default)]
pub struct RecordingFeed {
    events: Mutex<Vec<Event>>,
    inner: EventBus,
}

impl RecordingFeed {
    /// Create an empty recording feed
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every event published so far
    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Names of the events published so far, in order
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(Event::name)
            .collect()
    }

    /// Events of one kind
    #[must_use]
    pub fn of_kind(&self, kind: EventKind) -> Vec<Event> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.kind() == kind)
            .cloned()
            .collect()
    }

    /// Forget recorded events
    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl EventFeed for RecordingFeed {
    fn publish(&self, event: Event) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
        self.inner.publish(event);
    }

    fn subscribe(&self, kind: EventKind, handler: EventHandler) -> SubscriptionId {
        self.inner.subscribe(kind, handler)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.unsubscribe(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EngineLifecycle, ProtocolUnregistered};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use weft_core::Timestamp;

    #[test]
    fn test_records_in_order_and_forwards() {
        let feed = RecordingFeed::new();
        let forwarded = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&forwarded);
        feed.subscribe(
            EventKind::EngineStarted,
            Arc::new(move |_e: &Event| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        feed.publish(Event::EngineStarted(EngineLifecycle {
            protocol_count: 0,
            timestamp: Timestamp::now(),
        }));
        feed.publish(Event::ProtocolUnregistered(ProtocolUnregistered {
            protocol_id: "a".to_string(),
            timestamp: Timestamp::now(),
        }));

        assert_eq!(feed.names(), vec!["engine:started", "protocol:unregistered"]);
        assert_eq!(feed.of_kind(EventKind::ProtocolUnregistered).len(), 1);
        assert_eq!(forwarded.load(Ordering::SeqCst), 1);

        feed.clear();
        assert!(feed.events().is_empty());
    }
}
