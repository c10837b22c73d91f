//! Data-source invalidation tracking
//!
//! Coarse-grained pub/sub over the closed set of [`DataSource`]s. Mutations
//! report which sources they touched; subscribers get told the set and
//! re-query whatever they care about. Notifications carry no payload beyond
//! the source names, so a subscriber can never act on stale data by mistake.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// The closed set of invalidatable data sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataSource {
    /// Conversation rows and label membership
    Conversations,
    /// Message rows within conversations
    Messages,
    /// The label list itself
    Labels,
}

/// Callback fired when one or more data sources change
pub trait InvalidationCallback: Send + Sync {
    fn on_invalidated(&self, sources: &[DataSource]);
}

/// A live subscription to invalidation events
///
/// Dropping the subscription does not unsubscribe; call [`disconnect`]
/// explicitly. Disconnect is idempotent.
///
/// [`disconnect`]: InvalidationSubscription::disconnect
pub struct InvalidationSubscription {
    id: u64,
    tracker: Arc<InvalidationTracker>,
}

impl InvalidationSubscription {
    /// Stop receiving invalidation events
    pub fn disconnect(&self) {
        self.tracker.unsubscribe(self.id);
    }
}

/// Registry of invalidation subscribers
#[derive(Default)]
pub struct InvalidationTracker {
    subscribers: RwLock<HashMap<u64, Arc<dyn InvalidationCallback>>>,
    next_id: AtomicU64,
}

impl InvalidationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback; fires on every subsequent [`notify`]
    ///
    /// [`notify`]: InvalidationTracker::notify
    pub fn subscribe(
        self: &Arc<Self>,
        callback: Arc<dyn InvalidationCallback>,
    ) -> InvalidationSubscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.write().unwrap().insert(id, callback);
        InvalidationSubscription {
            id,
            tracker: Arc::clone(self),
        }
    }

    fn unsubscribe(&self, id: u64) {
        self.subscribers.write().unwrap().remove(&id);
    }

    /// Tell every subscriber which sources changed
    ///
    /// Callbacks run synchronously on the calling thread, outside the
    /// registry lock so a callback may subscribe or disconnect.
    pub fn notify(&self, sources: &[DataSource]) {
        if sources.is_empty() {
            return;
        }
        let snapshot: Vec<Arc<dyn InvalidationCallback>> = {
            let subscribers = self.subscribers.read().unwrap();
            subscribers.values().cloned().collect()
        };
        log::debug!(
            "invalidating {:?} for {} subscribers",
            sources,
            snapshot.len()
        );
        for callback in snapshot {
            callback.on_invalidated(sources);
        }
    }

    #[cfg(test)]
    fn subscriber_count(&self) -> usize {
        self.subscribers.read().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<Vec<DataSource>>>,
    }

    impl InvalidationCallback for Recorder {
        fn on_invalidated(&self, sources: &[DataSource]) {
            self.events.lock().unwrap().push(sources.to_vec());
        }
    }

    #[test]
    fn test_subscribers_receive_sources() {
        let tracker = Arc::new(InvalidationTracker::new());
        let recorder = Arc::new(Recorder::default());
        let _sub = tracker.subscribe(recorder.clone());

        tracker.notify(&[DataSource::Conversations, DataSource::Messages]);

        let events = recorder.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0],
            vec![DataSource::Conversations, DataSource::Messages]
        );
    }

    #[test]
    fn test_disconnect_stops_events() {
        let tracker = Arc::new(InvalidationTracker::new());
        let recorder = Arc::new(Recorder::default());
        let sub = tracker.subscribe(recorder.clone());

        sub.disconnect();
        sub.disconnect(); // idempotent
        tracker.notify(&[DataSource::Labels]);

        assert!(recorder.events.lock().unwrap().is_empty());
        assert_eq!(tracker.subscriber_count(), 0);
    }

    #[test]
    fn test_empty_notify_is_dropped() {
        let tracker = Arc::new(InvalidationTracker::new());
        let recorder = Arc::new(Recorder::default());
        let _sub = tracker.subscribe(recorder.clone());

        tracker.notify(&[]);

        assert!(recorder.events.lock().unwrap().is_empty());
    }
}
