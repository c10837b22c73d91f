//! MailboxEngine facade for UniFFI export
//!
//! The high-level, FFI-friendly API the host app talks to. One engine holds
//! one [`SessionManager`]; sign-in opens a per-user SQLite store under the
//! engine's data directory.
//!
//! Mutation entry points here never throw: a mutation that cannot run (not
//! signed in, no active mailbox, storage failure) is logged and dropped, and
//! the UI simply never sees a change notification for it. Queries degrade
//! the same way, returning empty results. Lifecycle operations (sign-in,
//! mailbox switch, watch registration) do throw, since the host has to know
//! they failed.

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::error::MailboxError;
use crate::ffi::types::*;
use crate::invalidation::{DataSource, InvalidationCallback, InvalidationSubscription};
use crate::mailbox::MailboxHandle;
use crate::models::{LabelId, LocalConversationId, LocalMessageId, UserId};
use crate::pending::NoopRemoteBackend;
use crate::session::{SessionManager, SessionObserver, SessionObserverHandle};
use crate::storage::SqliteMailboxStore;
use crate::watch::{ChangeCallback, ConversationListWatcher, ConversationWatcher};

// ============================================================================
// Callback Adapters
// ============================================================================

struct WatchAdapter(Box<dyn WatchCallback>);

impl ChangeCallback for WatchAdapter {
    fn on_change(&self) {
        self.0.on_change();
    }
}

struct InvalidationAdapter(Box<dyn InvalidationListener>);

impl InvalidationCallback for InvalidationAdapter {
    fn on_invalidated(&self, sources: &[DataSource]) {
        self.0
            .on_invalidated(sources.iter().copied().map(FfiDataSource::from).collect());
    }
}

struct SessionAdapter(Box<dyn SessionCallback>);

impl SessionObserver for SessionAdapter {
    fn on_session_changed(&self, user: Option<&UserId>) {
        self.0
            .on_session_changed(user.map(|u| u.as_str().to_string()));
    }
}

// ============================================================================
// Watch Objects
// ============================================================================

/// Live watch on a single conversation
#[derive(uniffi::Object)]
pub struct ConversationWatch {
    inner: ConversationWatcher,
}

#[uniffi::export]
impl ConversationWatch {
    /// Re-read the watched conversation; `None` once disconnected or deleted
    pub fn snapshot(&self) -> Option<FfiConversation> {
        match self.inner.snapshot() {
            Ok(conversation) => conversation.map(FfiConversation::from),
            Err(e) => {
                log::error!("conversation snapshot failed: {}", e);
                None
            }
        }
    }

    /// Stop watching; terminal and idempotent
    pub fn disconnect(&self) {
        self.inner.disconnect();
    }
}

/// Live watch on a label's conversation list
#[derive(uniffi::Object)]
pub struct ConversationListWatch {
    inner: ConversationListWatcher,
}

#[uniffi::export]
impl ConversationListWatch {
    /// Re-read the watched list; empty once disconnected
    pub fn snapshot(&self) -> Vec<FfiConversation> {
        match self.inner.snapshot() {
            Ok(conversations) => conversations.into_iter().map(FfiConversation::from).collect(),
            Err(e) => {
                log::error!("conversation list snapshot failed: {}", e);
                Vec::new()
            }
        }
    }

    /// Stop watching; terminal and idempotent
    pub fn disconnect(&self) {
        self.inner.disconnect();
    }
}

/// Live subscription to data-source invalidations
#[derive(uniffi::Object)]
pub struct InvalidationHandle {
    inner: InvalidationSubscription,
}

#[uniffi::export]
impl InvalidationHandle {
    /// Stop receiving invalidation events; idempotent
    pub fn disconnect(&self) {
        self.inner.disconnect();
    }
}

/// Live subscription to sign-in/sign-out transitions
#[derive(uniffi::Object)]
pub struct SessionObservation {
    inner: SessionObserverHandle,
}

#[uniffi::export]
impl SessionObservation {
    /// Stop receiving session events; idempotent
    pub fn disconnect(&self) {
        self.inner.disconnect();
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Main entry point for Kotlin/Swift code
#[derive(uniffi::Object)]
pub struct MailboxEngine {
    data_dir: PathBuf,
    sessions: Arc<SessionManager>,
}

#[uniffi::export]
impl MailboxEngine {
    /// Create an engine rooted at `data_dir`
    ///
    /// Per-user databases are created under this directory on sign-in.
    #[uniffi::constructor]
    pub fn new(data_dir: String) -> Result<Arc<Self>, EngineError> {
        std::fs::create_dir_all(&data_dir).map_err(|e| EngineError::Storage {
            message: format!("Failed to create data directory {}: {}", data_dir, e),
        })?;

        let config = EngineConfig::load();
        log::info!("mailbox engine starting (data dir: {})", data_dir);
        Ok(Arc::new(Self {
            data_dir: PathBuf::from(data_dir),
            sessions: SessionManager::new(config),
        }))
    }

    // ========================================================================
    // Session Management
    // ========================================================================

    /// Sign a user in, replacing any existing session
    pub fn sign_in(&self, user_id: String) -> Result<(), EngineError> {
        let db_path = self.data_dir.join(format!("{}.db", sanitize(&user_id)));
        let store = SqliteMailboxStore::new(&db_path)?;
        self.sessions.sign_in(
            UserId::new(user_id),
            Arc::new(store),
            Arc::new(NoopRemoteBackend),
        );
        Ok(())
    }

    /// Sign the current user out; no-op when nobody is signed in
    pub fn sign_out(&self) {
        self.sessions.sign_out();
    }

    /// The signed-in user id, if any
    pub fn current_user(&self) -> Option<String> {
        self.sessions
            .current()
            .map(|s| s.user_id().as_str().to_string())
    }

    /// Observe sign-in/sign-out transitions
    pub fn observe_session(&self, callback: Box<dyn SessionCallback>) -> Arc<SessionObservation> {
        let handle = self.sessions.observe(Arc::new(SessionAdapter(callback)));
        Arc::new(SessionObservation { inner: handle })
    }

    /// Make `label_id` the active mailbox
    ///
    /// Idempotent for the already-active label; otherwise the previous
    /// mailbox handle is disconnected before the new one exists.
    pub fn switch_mailbox(&self, label_id: String) -> Result<(), EngineError> {
        let session = self.sessions.require_current()?;
        session.switch_mailbox(&LabelId::new(label_id))?;
        Ok(())
    }

    // ========================================================================
    // Mutations (never throw)
    // ========================================================================

    /// Mark conversations read
    pub fn mark_read(&self, conversation_ids: Vec<i64>) {
        self.mutate("mark_read", &conversation_ids, |m, ids| m.mark_read(ids));
    }

    /// Mark conversations unread
    pub fn mark_unread(&self, conversation_ids: Vec<i64>) {
        self.mutate("mark_unread", &conversation_ids, |m, ids| {
            m.mark_unread(ids)
        });
    }

    /// Star conversations
    pub fn star(&self, conversation_ids: Vec<i64>) {
        self.mutate("star", &conversation_ids, |m, ids| m.star(ids));
    }

    /// Unstar conversations
    pub fn unstar(&self, conversation_ids: Vec<i64>) {
        self.mutate("unstar", &conversation_ids, |m, ids| m.unstar(ids));
    }

    /// Delete conversations and their messages
    pub fn delete_conversations(&self, conversation_ids: Vec<i64>) {
        self.mutate("delete", &conversation_ids, |m, ids| m.delete(ids));
    }

    /// Move conversations from the active mailbox to another label
    pub fn move_conversations(&self, conversation_ids: Vec<i64>, to_label_id: String) {
        let to = LabelId::new(to_label_id);
        self.mutate("move", &conversation_ids, |m, ids| m.move_to(ids, &to));
    }

    /// Add a label to conversations
    pub fn add_label(&self, conversation_ids: Vec<i64>, label_id: String) {
        let label = LabelId::new(label_id);
        self.mutate("add_label", &conversation_ids, |m, ids| {
            m.add_label(ids, &label)
        });
    }

    /// Remove a label from conversations
    pub fn remove_label(&self, conversation_ids: Vec<i64>, label_id: String) {
        let label = LabelId::new(label_id);
        self.mutate("remove_label", &conversation_ids, |m, ids| {
            m.remove_label(ids, &label)
        });
    }

    // ========================================================================
    // Queries (safe defaults on failure)
    // ========================================================================

    /// Get a conversation by id
    pub fn conversation(&self, conversation_id: i64) -> Option<FfiConversation> {
        let mailbox = self.active_mailbox("conversation")?;
        match mailbox.conversation(LocalConversationId::new(conversation_id)) {
            Ok(conversation) => conversation.map(FfiConversation::from),
            Err(e) => {
                log::error!("conversation query failed: {}", e);
                None
            }
        }
    }

    /// Messages of a conversation, oldest first
    pub fn messages(&self, conversation_id: i64) -> Vec<FfiMessage> {
        let Some(mailbox) = self.active_mailbox("messages") else {
            return Vec::new();
        };
        match mailbox.messages(LocalConversationId::new(conversation_id)) {
            Ok(messages) => messages.into_iter().map(FfiMessage::from).collect(),
            Err(e) => {
                log::error!("messages query failed: {}", e);
                Vec::new()
            }
        }
    }

    /// Get a single message by id
    pub fn message(&self, message_id: i64) -> Option<FfiMessage> {
        let session = self.sessions.current()?;
        match session.store().get_message(LocalMessageId::new(message_id)) {
            Ok(message) => message.map(FfiMessage::from),
            Err(e) => {
                log::error!("message query failed: {:#}", e);
                None
            }
        }
    }

    /// Conversations in the active mailbox
    pub fn conversation_count(&self) -> u64 {
        let Some(mailbox) = self.active_mailbox("conversation_count") else {
            return 0;
        };
        match mailbox.conversation_count() {
            Ok(count) => count as u64,
            Err(e) => {
                log::error!("conversation count failed: {}", e);
                0
            }
        }
    }

    /// All labels known locally
    pub fn labels(&self) -> Vec<FfiLabel> {
        let Some(session) = self.sessions.current() else {
            return Vec::new();
        };
        match session.store().list_labels() {
            Ok(labels) => labels.into_iter().map(FfiLabel::from).collect(),
            Err(e) => {
                log::error!("label query failed: {:#}", e);
                Vec::new()
            }
        }
    }

    /// Conversations under a label, newest first
    ///
    /// A direct read that bypasses the paginator; `limit` caps the result.
    pub fn conversations(&self, label_id: String, limit: u32) -> Vec<FfiConversation> {
        let Some(session) = self.sessions.current() else {
            return Vec::new();
        };
        let list = session
            .store()
            .find_label(&LabelId::new(label_id))
            .and_then(|label| match label {
                Some(label) => session.store().list_conversations(label, limit as usize, None),
                None => Ok(Vec::new()),
            });
        match list {
            Ok(conversations) => conversations.into_iter().map(FfiConversation::from).collect(),
            Err(e) => {
                log::error!("conversations query failed: {:#}", e);
                Vec::new()
            }
        }
    }

    /// Load a page of the active mailbox's conversation list
    ///
    /// Requests addressed to another user or to a label that is no longer
    /// active are stale leftovers and get an empty page; so do requests
    /// while signed out.
    pub fn load_page(&self, user_id: String, key: FfiPageKey) -> Vec<FfiConversation> {
        let Some(session) = self.sessions.current() else {
            return Vec::new();
        };
        if session.user_id().as_str() != user_id {
            log::debug!("dropping page request addressed to signed-out user");
            return Vec::new();
        }
        match session.load_page(&key.into()) {
            Ok(page) => page.into_iter().map(FfiConversation::from).collect(),
            Err(e) => {
                log::error!("page load failed: {}", e);
                Vec::new()
            }
        }
    }

    /// Avatar bytes for a sender, if a source is wired in
    pub fn sender_image(&self, address: FfiEmailAddress, bimi_selector: Option<String>) -> Option<Vec<u8>> {
        let mailbox = self.active_mailbox("sender_image")?;
        match mailbox.sender_image(&address.into(), bimi_selector.as_deref()) {
            Ok(image) => image,
            Err(e) => {
                log::error!("sender image lookup failed: {}", e);
                None
            }
        }
    }

    // ========================================================================
    // Watchers and Invalidation
    // ========================================================================

    /// Watch a single conversation for changes
    pub fn watch_conversation(
        &self,
        conversation_id: i64,
        callback: Box<dyn WatchCallback>,
    ) -> Result<Arc<ConversationWatch>, EngineError> {
        let session = self.sessions.require_current()?;
        let watcher = ConversationWatcher::new();
        watcher.connect(
            Arc::clone(session.store()),
            session.watchers(),
            LocalConversationId::new(conversation_id),
            Arc::new(WatchAdapter(callback)),
        )?;
        Ok(Arc::new(ConversationWatch { inner: watcher }))
    }

    /// Watch a label's conversation list for changes
    ///
    /// `limit` caps how many rows each snapshot returns.
    pub fn watch_conversation_list(
        &self,
        label_id: String,
        limit: u32,
        callback: Box<dyn WatchCallback>,
    ) -> Result<Arc<ConversationListWatch>, EngineError> {
        let session = self.sessions.require_current()?;
        let label = session.resolve_label(&LabelId::new(label_id))?;
        let watcher = ConversationListWatcher::new();
        watcher.connect(
            Arc::clone(session.store()),
            session.watchers(),
            label,
            limit as usize,
            Arc::new(WatchAdapter(callback)),
        )?;
        Ok(Arc::new(ConversationListWatch { inner: watcher }))
    }

    /// Subscribe to coarse data-source invalidation events
    pub fn subscribe_invalidations(
        &self,
        callback: Box<dyn InvalidationListener>,
    ) -> Result<Arc<InvalidationHandle>, EngineError> {
        let session = self.sessions.require_current()?;
        let subscription = session
            .invalidation()
            .subscribe(Arc::new(InvalidationAdapter(callback)));
        Ok(Arc::new(InvalidationHandle {
            inner: subscription,
        }))
    }

    // ========================================================================
    // Pending Queue
    // ========================================================================

    /// Actions queued for remote execution, runnable or backed off
    pub fn pending_action_count(&self) -> u64 {
        let Some(session) = self.sessions.current() else {
            return 0;
        };
        match session.store().count_pending_actions() {
            Ok(count) => count as u64,
            Err(e) => {
                log::error!("pending count failed: {:#}", e);
                0
            }
        }
    }

    /// Synchronously drain everything runnable; returns how many actions ran
    pub fn flush_pending_actions(&self) -> u64 {
        match self.sessions.current() {
            Some(session) => session.executor().run_once() as u64,
            None => 0,
        }
    }

    /// Actions that exhausted their retry budget
    pub fn dead_letters(&self) -> Vec<FfiDeadLetter> {
        let Some(session) = self.sessions.current() else {
            return Vec::new();
        };
        match session.store().list_dead_letters() {
            Ok(letters) => letters.into_iter().map(FfiDeadLetter::from).collect(),
            Err(e) => {
                log::error!("dead letter query failed: {:#}", e);
                Vec::new()
            }
        }
    }
}

impl MailboxEngine {
    /// The active mailbox handle, logging why when there is none
    fn active_mailbox(&self, op: &str) -> Option<Arc<MailboxHandle>> {
        let Some(session) = self.sessions.current() else {
            log::warn!("{} ignored: not signed in", op);
            return None;
        };
        let Some(mailbox) = session.current_mailbox() else {
            log::warn!("{} ignored: no active mailbox", op);
            return None;
        };
        Some(mailbox)
    }

    /// Run a mutation against the active mailbox, swallowing failures
    fn mutate(
        &self,
        op: &str,
        conversation_ids: &[i64],
        f: impl FnOnce(&MailboxHandle, &[LocalConversationId]) -> Result<(), MailboxError>,
    ) {
        let Some(mailbox) = self.active_mailbox(op) else {
            return;
        };
        let ids: Vec<LocalConversationId> = conversation_ids
            .iter()
            .copied()
            .map(LocalConversationId::new)
            .collect();
        if let Err(e) = f(&mailbox, &ids) {
            log::error!("{} of {} conversations failed: {}", op, ids.len(), e);
        }
    }
}

/// Make a user id safe to use as a file name
fn sanitize(user_id: &str) -> String {
    user_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConversationDraft, EmailAddress};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingWatch(Arc<AtomicUsize>);

    impl WatchCallback for CountingWatch {
        fn on_change(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn engine_in(dir: &tempfile::TempDir) -> Arc<MailboxEngine> {
        MailboxEngine::new(dir.path().to_str().unwrap().to_string()).unwrap()
    }

    #[test]
    fn test_sanitize_keeps_safe_chars() {
        assert_eq!(sanitize("user@example.com"), "user_example.com");
        assert_eq!(sanitize("a-b.c"), "a-b.c");
        assert_eq!(sanitize("../../etc/passwd"), ".._.._etc_passwd");
    }

    #[test]
    fn test_watch_before_sign_in_fails_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_in(&dir);
        let fired = Arc::new(AtomicUsize::new(0));

        let result = engine.watch_conversation(1, Box::new(CountingWatch(fired.clone())));
        assert!(matches!(result, Err(EngineError::NotSignedIn)));

        // A session signed in afterwards starts with a clean registry and
        // the rejected callback never fires
        engine.sign_in("user@example.com".to_string()).unwrap();
        let session = engine.sessions.current().unwrap();
        assert_eq!(session.watchers().registration_count(), 0);

        let c = session
            .store()
            .insert_conversation(ConversationDraft::new(
                "hello",
                EmailAddress::new("a@example.com"),
            ))
            .unwrap();
        engine.switch_mailbox("INBOX".to_string()).unwrap();
        engine.mark_read(vec![c.id.raw()]);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_engine_mutation_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_in(&dir);
        engine.sign_in("user@example.com".to_string()).unwrap();
        engine.switch_mailbox("INBOX".to_string()).unwrap();

        let session = engine.sessions.current().unwrap();
        let inbox = session.resolve_label(&LabelId::new("INBOX")).unwrap();
        let c = session
            .store()
            .insert_conversation(
                ConversationDraft::new("hello", EmailAddress::new("a@example.com"))
                    .labels(vec![inbox]),
            )
            .unwrap();

        engine.mark_read(vec![c.id.raw()]);

        let fresh = engine.conversation(c.id.raw()).unwrap();
        assert!(fresh.is_read);
        assert_eq!(engine.conversation_count(), 1);
        assert_eq!(engine.current_user().as_deref(), Some("user@example.com"));
    }
}
