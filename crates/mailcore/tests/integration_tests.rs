//! Integration tests for the mailcore crate
//!
//! These tests drive the engine through its public surface: sign-in,
//! mailbox switching, local-first mutations, watchers, pagination, and the
//! pending-action queue draining against a remote backend.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration as StdDuration, Instant};

use anyhow::bail;
use chrono::Utc;
use mailcore::{
    ActionKind, ChangeCallback, ConversationDraft, ConversationWatcher, DataSource, EmailAddress,
    EngineConfig, InvalidationCallback, LabelId, LocalConversation, MailboxError, PageKey,
    PageToLoad, PendingAction, RemoteBackend, RetryPolicy, SessionManager, UserId, UserSession,
    WatchKey,
};
use mailcore::{InMemoryMailboxStore, MailboxStore};

/// Backend that records every executed action
#[derive(Default)]
struct RecordingBackend {
    executed: Mutex<Vec<ActionKind>>,
}

impl RemoteBackend for RecordingBackend {
    fn execute(&self, action: &PendingAction) -> anyhow::Result<()> {
        self.executed.lock().unwrap().push(action.kind.clone());
        Ok(())
    }
}

/// Backend that never succeeds
struct FailingBackend;

impl RemoteBackend for FailingBackend {
    fn execute(&self, _action: &PendingAction) -> anyhow::Result<()> {
        bail!("remote unreachable")
    }
}

#[derive(Default)]
struct CountingCallback(AtomicUsize);

impl ChangeCallback for CountingCallback {
    fn on_change(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

impl CountingCallback {
    fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

fn test_config() -> EngineConfig {
    EngineConfig {
        page_size: 2,
        retry: RetryPolicy {
            max_attempts: 2,
            base_backoff_ms: 0,
            batch_size: 16,
            poll_interval_ms: 10,
        },
    }
}

fn seed_conversation(
    session: &UserSession,
    subject: &str,
    age_hours: i64,
    label: &LabelId,
) -> LocalConversation {
    let local = session.store().resolve_label(label).unwrap();
    session
        .store()
        .insert_conversation(
            ConversationDraft::new(subject, EmailAddress::with_name("Test User", "test@example.com"))
                .snippet(format!("Snippet for {}", subject))
                .last_activity_at(Utc::now() - chrono::Duration::hours(age_hours))
                .labels(vec![local]),
        )
        .unwrap()
}

fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + StdDuration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        std::thread::sleep(StdDuration::from_millis(5));
    }
}

#[test]
fn test_local_first_mutation_reaches_remote() {
    let manager = SessionManager::new(test_config());
    let backend = Arc::new(RecordingBackend::default());
    let store = Arc::new(InMemoryMailboxStore::new());
    let session = manager.sign_in(UserId::new("test@example.com"), store, backend.clone());

    let c = seed_conversation(&session, "hello", 1, &LabelId::new("INBOX"));
    let mailbox = session.switch_mailbox(&LabelId::new("INBOX")).unwrap();

    mailbox.mark_read(&[c.id]).unwrap();

    // Local state changed before the remote side ever ran
    let fresh = mailbox.conversation(c.id).unwrap().unwrap();
    assert!(fresh.is_read);

    // The queued counterpart drains in the background
    wait_until("remote execution", || {
        backend.executed.lock().unwrap().contains(&ActionKind::MarkRead)
    });
    wait_until("queue drain", || {
        session.store().count_pending_actions().unwrap() == 0
    });
}

#[test]
fn test_mutation_notifies_watchers_with_fresh_state() {
    let manager = SessionManager::new(test_config());
    let session = manager.sign_in(
        UserId::new("test@example.com"),
        Arc::new(InMemoryMailboxStore::new()),
        Arc::new(RecordingBackend::default()),
    );

    let c = seed_conversation(&session, "watched", 1, &LabelId::new("INBOX"));
    let mailbox = session.switch_mailbox(&LabelId::new("INBOX")).unwrap();

    let callback = Arc::new(CountingCallback::default());
    let watcher = ConversationWatcher::new();
    let initial = watcher
        .connect(
            Arc::clone(session.store()),
            session.watchers(),
            c.id,
            callback.clone(),
        )
        .unwrap();
    assert!(!initial.unwrap().is_starred);

    mailbox.star(&[c.id]).unwrap();

    // The callback fired synchronously and a re-pull sees the new state
    assert_eq!(callback.count(), 1);
    assert!(watcher.snapshot().unwrap().unwrap().is_starred);

    watcher.disconnect();
    mailbox.unstar(&[c.id]).unwrap();
    assert_eq!(callback.count(), 1);
}

#[test]
fn test_list_watcher_fires_for_affected_labels_only() {
    let manager = SessionManager::new(test_config());
    let session = manager.sign_in(
        UserId::new("test@example.com"),
        Arc::new(InMemoryMailboxStore::new()),
        Arc::new(RecordingBackend::default()),
    );

    let c = seed_conversation(&session, "inbox mail", 1, &LabelId::new("INBOX"));
    let mailbox = session.switch_mailbox(&LabelId::new("INBOX")).unwrap();

    let archive = session
        .store()
        .resolve_label(&LabelId::new("ARCHIVE"))
        .unwrap();
    let drafts = session
        .store()
        .resolve_label(&LabelId::new("DRAFTS"))
        .unwrap();

    let archive_cb = Arc::new(CountingCallback::default());
    let drafts_cb = Arc::new(CountingCallback::default());
    let _h1 = session
        .watchers()
        .register(WatchKey::ConversationList(archive), archive_cb.clone());
    let _h2 = session
        .watchers()
        .register(WatchKey::ConversationList(drafts), drafts_cb.clone());

    mailbox.move_to(&[c.id], &LabelId::new("ARCHIVE")).unwrap();

    assert_eq!(archive_cb.count(), 1);
    assert_eq!(drafts_cb.count(), 0);
}

#[test]
fn test_pagination_covers_list_without_repeats() {
    let manager = SessionManager::new(test_config());
    let session = manager.sign_in(
        UserId::new("test@example.com"),
        Arc::new(InMemoryMailboxStore::new()),
        Arc::new(RecordingBackend::default()),
    );

    for i in 0..5 {
        seed_conversation(&session, &format!("c{}", i), i, &LabelId::new("INBOX"));
    }
    session.switch_mailbox(&LabelId::new("INBOX")).unwrap();

    let key = |page| PageKey {
        label: LabelId::new("INBOX"),
        page,
    };
    let mut seen = Vec::new();
    seen.extend(session.load_page(&key(PageToLoad::First)).unwrap());
    seen.extend(session.load_page(&key(PageToLoad::Next)).unwrap());
    seen.extend(session.load_page(&key(PageToLoad::Next)).unwrap());

    let mut ids: Vec<i64> = seen.iter().map(|c| c.id.raw()).collect();
    assert_eq!(ids.len(), 5);
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 5);

    // Ordered newest first across page boundaries
    let subjects: Vec<&str> = seen.iter().map(|c| c.subject.as_str()).collect();
    assert_eq!(subjects, vec!["c0", "c1", "c2", "c3", "c4"]);
}

#[test]
fn test_label_switch_replaces_handle_and_drops_stale_pages() {
    let manager = SessionManager::new(test_config());
    let session = manager.sign_in(
        UserId::new("test@example.com"),
        Arc::new(InMemoryMailboxStore::new()),
        Arc::new(RecordingBackend::default()),
    );
    let c = seed_conversation(&session, "hello", 1, &LabelId::new("INBOX"));

    let inbox = session.switch_mailbox(&LabelId::new("INBOX")).unwrap();
    session.load_page(&PageKey {
        label: LabelId::new("INBOX"),
        page: PageToLoad::First,
    })
    .unwrap();

    let archive = session.switch_mailbox(&LabelId::new("ARCHIVE")).unwrap();

    // The old handle died before the new one went live
    assert!(!inbox.is_connected());
    assert!(archive.is_connected());
    assert!(matches!(
        inbox.mark_read(&[c.id]),
        Err(MailboxError::Disconnected)
    ));

    // A page request still addressed to the old label gets an empty page
    let stale = session
        .load_page(&PageKey {
            label: LabelId::new("INBOX"),
            page: PageToLoad::Next,
        })
        .unwrap();
    assert!(stale.is_empty());
}

#[test]
fn test_failed_actions_retry_then_dead_letter() {
    let manager = SessionManager::new(test_config());
    let session = manager.sign_in(
        UserId::new("test@example.com"),
        Arc::new(InMemoryMailboxStore::new()),
        Arc::new(FailingBackend),
    );

    let c = seed_conversation(&session, "doomed", 1, &LabelId::new("INBOX"));
    let mailbox = session.switch_mailbox(&LabelId::new("INBOX")).unwrap();
    mailbox.delete(&[c.id]).unwrap();

    // Local deletion held even though the remote side never succeeded
    assert!(mailbox.conversation(c.id).unwrap().is_none());

    wait_until("dead letter", || {
        !session.store().list_dead_letters().unwrap().is_empty()
    });
    let dead = session.store().list_dead_letters().unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].kind, ActionKind::Delete);
    assert_eq!(dead[0].attempts, 2);
    assert!(dead[0].last_error.as_deref().unwrap().contains("unreachable"));
    assert_eq!(session.store().count_pending_actions().unwrap(), 0);
}

#[test]
fn test_invalidation_reports_touched_sources() {
    #[derive(Default)]
    struct Recorder(Mutex<Vec<Vec<DataSource>>>);

    impl InvalidationCallback for Recorder {
        fn on_invalidated(&self, sources: &[DataSource]) {
            self.0.lock().unwrap().push(sources.to_vec());
        }
    }

    let manager = SessionManager::new(test_config());
    let session = manager.sign_in(
        UserId::new("test@example.com"),
        Arc::new(InMemoryMailboxStore::new()),
        Arc::new(RecordingBackend::default()),
    );
    let c = seed_conversation(&session, "hello", 1, &LabelId::new("INBOX"));
    let mailbox = session.switch_mailbox(&LabelId::new("INBOX")).unwrap();

    let recorder = Arc::new(Recorder::default());
    let subscription = session.invalidation().subscribe(recorder.clone());

    mailbox.mark_unread(&[c.id]).unwrap();

    // One notification per affected source: the mailbox's list watcher
    // reports the conversation list, the mutation itself reports messages
    {
        let events = recorder.0.lock().unwrap();
        assert_eq!(
            *events,
            vec![vec![DataSource::Conversations], vec![DataSource::Messages]]
        );
    }

    subscription.disconnect();
    mailbox.mark_read(&[c.id]).unwrap();
    assert_eq!(recorder.0.lock().unwrap().len(), 2);
}

#[test]
fn test_sign_out_tears_the_session_down() {
    let manager = SessionManager::new(test_config());
    let session = manager.sign_in(
        UserId::new("test@example.com"),
        Arc::new(InMemoryMailboxStore::new()),
        Arc::new(RecordingBackend::default()),
    );
    let c = seed_conversation(&session, "hello", 1, &LabelId::new("INBOX"));
    let mailbox = session.switch_mailbox(&LabelId::new("INBOX")).unwrap();

    manager.sign_out();

    assert!(manager.current().is_none());
    assert!(!mailbox.is_connected());
    assert!(matches!(
        mailbox.mark_read(&[c.id]),
        Err(MailboxError::Disconnected)
    ));
}

#[test]
fn test_queued_actions_survive_sign_in_cycles() {
    // A session signed in over a store with leftover actions drains them
    let manager = SessionManager::new(test_config());
    let store = Arc::new(InMemoryMailboxStore::new());
    store
        .enqueue_action(ActionKind::Star, &[mailcore::LocalConversationId::new(9)])
        .unwrap();

    let backend = Arc::new(RecordingBackend::default());
    let session = manager.sign_in(UserId::new("test@example.com"), store, backend.clone());

    wait_until("leftover drain", || {
        session.store().count_pending_actions().unwrap() == 0
    });
    assert_eq!(
        *backend.executed.lock().unwrap(),
        vec![ActionKind::Star]
    );
}
