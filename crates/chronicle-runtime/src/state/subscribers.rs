//! Event subscribers with snapshot-then-catch-up delivery.
//!
//! Appended events are mirrored into a [`Timeline`] that readers can walk
//! without the conversation lock. Each subscriber owns a cursor into it;
//! delivery advances the cursor under the subscriber's own mutex, so every
//! event reaches every subscriber exactly once and in append order, whether
//! it arrives through catch-up or through post-append dispatch.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chronicle_core::events::Event;
use parking_lot::{Mutex, RwLock};
use tracing::trace;

/// Callback invoked for each delivered event.
pub type EventCallback = Box<dyn Fn(&Arc<Event>) + Send + Sync>;

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Append-ordered mirror of the event log for lock-free readers.
#[derive(Default)]
pub(crate) struct Timeline {
    events: RwLock<Vec<Arc<Event>>>,
}

impl Timeline {
    pub(crate) fn push(&self, event: Arc<Event>) {
        self.events.write().push(event);
    }

    pub(crate) fn len(&self) -> usize {
        self.events.read().len()
    }

    pub(crate) fn since(&self, position: usize) -> Vec<Arc<Event>> {
        let events = self.events.read();
        events.get(position..).map(<[_]>::to_vec).unwrap_or_default()
    }
}

struct Subscriber {
    id: SubscriptionId,
    callback: EventCallback,
    /// Next timeline position to deliver.
    cursor: Mutex<usize>,
}

impl Subscriber {
    fn deliver(&self, timeline: &Timeline) -> usize {
        let mut cursor = self.cursor.lock();
        let pending = timeline.since(*cursor);
        for event in &pending {
            (self.callback)(event);
        }
        *cursor += pending.len();
        pending.len()
    }
}

/// Registered subscribers.
#[derive(Default)]
pub(crate) struct Subscribers {
    next_id: AtomicU64,
    registered: RwLock<Vec<Arc<Subscriber>>>,
}

impl Subscribers {
    /// Register `callback` and catch it up from position 0.
    pub(crate) fn subscribe(&self, timeline: &Timeline, callback: EventCallback) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let snapshot = timeline.len();
        let subscriber = Arc::new(Subscriber {
            id,
            callback,
            cursor: Mutex::new(0),
        });
        self.registered.write().push(Arc::clone(&subscriber));
        let delivered = subscriber.deliver(timeline);
        trace!(
            subscription = id.0,
            snapshot, delivered, "subscriber caught up"
        );
        id
    }

    pub(crate) fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut registered = self.registered.write();
        let before = registered.len();
        registered.retain(|s| s.id != id);
        registered.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.registered.read().len()
    }

    /// Deliver everything each subscriber has not seen yet.
    pub(crate) fn dispatch(&self, timeline: &Timeline) {
        let registered: Vec<Arc<Subscriber>> = self.registered.read().clone();
        for subscriber in registered {
            let _ = subscriber.deliver(timeline);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, EventCallback) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: EventCallback = Box::new(move |e: &Arc<Event>| sink.lock().push(e.to_text()));
        (seen, callback)
    }

    #[test]
    fn late_subscriber_catches_up_then_follows() {
        let timeline = Timeline::default();
        let subscribers = Subscribers::default();
        timeline.push(Arc::new(Event::user_message("one")));
        timeline.push(Arc::new(Event::user_message("two")));

        let (seen, callback) = recorder();
        let _ = subscribers.subscribe(&timeline, callback);
        assert_eq!(seen.lock().len(), 2);

        timeline.push(Arc::new(Event::user_message("three")));
        subscribers.dispatch(&timeline);
        subscribers.dispatch(&timeline);
        assert_eq!(
            *seen.lock(),
            vec!["[user] one", "[user] two", "[user] three"]
        );
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let timeline = Timeline::default();
        let subscribers = Subscribers::default();
        let (seen, callback) = recorder();
        let id = subscribers.subscribe(&timeline, callback);
        assert!(subscribers.unsubscribe(id));
        assert!(!subscribers.unsubscribe(id));
        assert_eq!(subscribers.len(), 0);

        timeline.push(Arc::new(Event::user_message("ignored")));
        subscribers.dispatch(&timeline);
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn since_past_end_is_empty() {
        let timeline = Timeline::default();
        assert!(timeline.since(5).is_empty());
    }
}
