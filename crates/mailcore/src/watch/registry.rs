//! Change-notification registry
//!
//! Mutations announce which conversations and labels they touched; the
//! registry fans that out to registered watchers. Notifications are unit
//! "something changed" signals with no payload; watchers re-read whatever
//! they display.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::models::{LocalConversationId, LocalLabelId};

/// What a watcher is watching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchKey {
    /// A single conversation
    Conversation(LocalConversationId),
    /// The conversation list of a label
    ConversationList(LocalLabelId),
}

/// Callback fired when the watched entity may have changed
///
/// Carries no data. The receiver pulls fresh state through its watcher.
pub trait ChangeCallback: Send + Sync {
    fn on_change(&self);
}

struct Registration {
    key: WatchKey,
    callback: Arc<dyn ChangeCallback>,
}

/// Registry of active watch registrations for one session
#[derive(Default)]
pub struct WatcherRegistry {
    registrations: RwLock<HashMap<u64, Registration>>,
    next_id: AtomicU64,
}

impl WatcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for a key
    ///
    /// The registration stays live until the returned handle is
    /// disconnected.
    pub fn register(
        self: &Arc<Self>,
        key: WatchKey,
        callback: Arc<dyn ChangeCallback>,
    ) -> WatchHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.registrations
            .write()
            .unwrap()
            .insert(id, Registration { key, callback });
        WatchHandle {
            id,
            registry: Arc::clone(self),
            active: AtomicBool::new(true),
        }
    }

    /// Fire watchers matching any of the touched conversations or labels
    ///
    /// Callbacks run synchronously on the calling thread, outside the
    /// registry lock so a callback may register or disconnect watchers.
    pub fn notify(&self, conversations: &[LocalConversationId], labels: &[LocalLabelId]) {
        let matched: Vec<Arc<dyn ChangeCallback>> = {
            let registrations = self.registrations.read().unwrap();
            registrations
                .values()
                .filter(|r| match r.key {
                    WatchKey::Conversation(id) => conversations.contains(&id),
                    WatchKey::ConversationList(label) => labels.contains(&label),
                })
                .map(|r| Arc::clone(&r.callback))
                .collect()
        };
        for callback in matched {
            callback.on_change();
        }
    }

    fn unregister(&self, id: u64) {
        self.registrations.write().unwrap().remove(&id);
    }

    pub fn registration_count(&self) -> usize {
        self.registrations.read().unwrap().len()
    }
}

/// Handle to one registration
///
/// Active until [`disconnect`] is called; disconnect is terminal and
/// idempotent. Dropping the handle without disconnecting leaves the
/// registration live.
///
/// [`disconnect`]: WatchHandle::disconnect
pub struct WatchHandle {
    id: u64,
    registry: Arc<WatcherRegistry>,
    active: AtomicBool,
}

impl WatchHandle {
    /// Remove the registration; no callbacks fire afterwards
    pub fn disconnect(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            self.registry.unregister(self.id);
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Counter(AtomicUsize);

    impl ChangeCallback for Counter {
        fn on_change(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl Counter {
        fn count(&self) -> usize {
            self.0.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn test_notify_matches_conversation_key() {
        let registry = Arc::new(WatcherRegistry::new());
        let counter = Arc::new(Counter::default());
        let _handle = registry.register(
            WatchKey::Conversation(LocalConversationId::new(1)),
            counter.clone(),
        );

        registry.notify(&[LocalConversationId::new(1)], &[]);
        registry.notify(&[LocalConversationId::new(2)], &[]);

        assert_eq!(counter.count(), 1);
    }

    #[test]
    fn test_notify_matches_list_key() {
        let registry = Arc::new(WatcherRegistry::new());
        let counter = Arc::new(Counter::default());
        let _handle = registry.register(
            WatchKey::ConversationList(LocalLabelId::new(7)),
            counter.clone(),
        );

        registry.notify(&[], &[LocalLabelId::new(7)]);
        registry.notify(&[], &[LocalLabelId::new(8)]);

        assert_eq!(counter.count(), 1);
    }

    #[test]
    fn test_disconnect_is_terminal_and_idempotent() {
        let registry = Arc::new(WatcherRegistry::new());
        let counter = Arc::new(Counter::default());
        let handle = registry.register(
            WatchKey::Conversation(LocalConversationId::new(1)),
            counter.clone(),
        );

        assert!(handle.is_active());
        handle.disconnect();
        handle.disconnect();
        assert!(!handle.is_active());

        registry.notify(&[LocalConversationId::new(1)], &[]);
        assert_eq!(counter.count(), 0);
        assert_eq!(registry.registration_count(), 0);
    }
}
