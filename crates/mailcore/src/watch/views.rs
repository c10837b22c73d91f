//! View-facing watchers
//!
//! A watcher pairs a registration in the [`WatcherRegistry`] with a pull
//! path back into storage. The callback only says "changed"; consumers call
//! [`ConversationWatcher::snapshot`] (or the list equivalent) to re-read
//! fresh state. Connecting again re-points the watcher and drops the old
//! registration.

use std::sync::{Arc, Mutex};

use crate::error::MailboxError;
use crate::models::{LocalConversation, LocalConversationId, LocalLabelId};
use crate::storage::MailboxStore;

use super::registry::{ChangeCallback, WatchHandle, WatchKey, WatcherRegistry};

struct ActiveWatch {
    store: Arc<dyn MailboxStore>,
    handle: WatchHandle,
}

impl ActiveWatch {
    fn disconnect(&self) {
        self.handle.disconnect();
    }
}

/// Watches a single conversation for changes
#[derive(Default)]
pub struct ConversationWatcher {
    target: Mutex<Option<(LocalConversationId, ActiveWatch)>>,
}

impl ConversationWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point the watcher at a conversation and return the current snapshot
    ///
    /// The whole re-key sequence runs under the watcher's lock: the previous
    /// registration is dropped strictly before the new one exists, so a
    /// watcher never holds two live registrations. A failed seed read leaves
    /// no registration behind.
    pub fn connect(
        &self,
        store: Arc<dyn MailboxStore>,
        registry: &Arc<WatcherRegistry>,
        id: LocalConversationId,
        callback: Arc<dyn ChangeCallback>,
    ) -> Result<Option<LocalConversation>, MailboxError> {
        let mut target = self.target.lock().unwrap();
        if let Some((_, old)) = target.take() {
            old.disconnect();
        }
        let handle = registry.register(WatchKey::Conversation(id), callback);
        let initial = match store.get_conversation(id) {
            Ok(initial) => initial,
            Err(e) => {
                handle.disconnect();
                return Err(e.into());
            }
        };
        *target = Some((id, ActiveWatch { store, handle }));
        Ok(initial)
    }

    /// Re-read the watched conversation
    ///
    /// Returns `None` when nothing is being watched or the conversation no
    /// longer exists.
    pub fn snapshot(&self) -> Result<Option<LocalConversation>, MailboxError> {
        let target = self.target.lock().unwrap();
        match target.as_ref() {
            Some((id, watch)) => Ok(watch.store.get_conversation(*id)?),
            None => Ok(None),
        }
    }

    /// Stop watching; no callbacks fire afterwards
    pub fn disconnect(&self) {
        let mut target = self.target.lock().unwrap();
        if let Some((_, watch)) = target.take() {
            watch.disconnect();
        }
    }

    pub fn is_connected(&self) -> bool {
        self.target.lock().unwrap().is_some()
    }
}

/// Watches a label's conversation list for changes
#[derive(Default)]
pub struct ConversationListWatcher {
    target: Mutex<Option<(LocalLabelId, usize, ActiveWatch)>>,
}

impl ConversationListWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point the watcher at a label and return the current first `limit` rows
    ///
    /// Runs under the watcher's lock with the same disconnect-first ordering
    /// as [`ConversationWatcher::connect`].
    pub fn connect(
        &self,
        store: Arc<dyn MailboxStore>,
        registry: &Arc<WatcherRegistry>,
        label: LocalLabelId,
        limit: usize,
        callback: Arc<dyn ChangeCallback>,
    ) -> Result<Vec<LocalConversation>, MailboxError> {
        let mut target = self.target.lock().unwrap();
        if let Some((_, _, old)) = target.take() {
            old.disconnect();
        }
        let handle = registry.register(WatchKey::ConversationList(label), callback);
        let initial = match store.list_conversations(label, limit, None) {
            Ok(initial) => initial,
            Err(e) => {
                handle.disconnect();
                return Err(e.into());
            }
        };
        *target = Some((label, limit, ActiveWatch { store, handle }));
        Ok(initial)
    }

    /// Re-read the watched list
    pub fn snapshot(&self) -> Result<Vec<LocalConversation>, MailboxError> {
        let target = self.target.lock().unwrap();
        match target.as_ref() {
            Some((label, limit, watch)) => {
                Ok(watch.store.list_conversations(*label, *limit, None)?)
            }
            None => Ok(Vec::new()),
        }
    }

    /// Stop watching; no callbacks fire afterwards
    pub fn disconnect(&self) {
        let mut target = self.target.lock().unwrap();
        if let Some((_, _, watch)) = target.take() {
            watch.disconnect();
        }
    }

    pub fn is_connected(&self) -> bool {
        self.target.lock().unwrap().is_some()
    }
}
