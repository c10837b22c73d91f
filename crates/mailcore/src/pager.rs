//! Cursor-based conversation pagination
//!
//! A [`Paginator`] is bound to one label. It keeps a cursor naming the last
//! row it handed out; requesting the next page continues strictly past that
//! cursor, so rows are never repeated or skipped even when new mail arrives
//! between pages. Switching labels does not mutate a paginator; the mailbox
//! handle that owns it is replaced wholesale.

use std::sync::{Arc, Mutex};

use crate::error::MailboxError;
use crate::invalidation::{DataSource, InvalidationTracker};
use crate::models::{LabelId, LocalConversation, LocalLabelId};
use crate::storage::{MailboxStore, PageCursor};
use crate::watch::{ChangeCallback, WatchHandle, WatchKey, WatcherRegistry};

/// Which slice of the list to load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageToLoad {
    /// Restart from the top of the list
    First,
    /// Continue past the last row handed out
    Next,
    /// Re-fetch every page loaded so far in one read
    All,
}

/// Names a page request against a specific label
///
/// Carrying the label lets the session reject requests addressed to a
/// mailbox that has since been switched away from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageKey {
    pub label: LabelId,
    pub page: PageToLoad,
}

#[derive(Default)]
struct PagerState {
    cursor: Option<PageCursor>,
    pages_loaded: usize,
    exhausted: bool,
}

/// Turns list-change callbacks into coarse invalidation events
///
/// Paged data sources downstream subscribe to invalidation, not to the
/// registry, so new data for a paged label has to be bridged across.
struct InvalidationBridge {
    invalidation: Arc<InvalidationTracker>,
}

impl ChangeCallback for InvalidationBridge {
    fn on_change(&self) {
        self.invalidation.notify(&[DataSource::Conversations]);
    }
}

/// Pages through one label's conversation list
///
/// Construction registers a list watcher for the label; any change to the
/// list (mutation or newly arrived data) raises a `Conversations`
/// invalidation so paged caches refetch. Disconnect releases that
/// registration.
pub struct Paginator {
    store: Arc<dyn MailboxStore>,
    label: LocalLabelId,
    page_size: usize,
    state: Mutex<PagerState>,
    watch: WatchHandle,
}

impl Paginator {
    pub fn new(
        store: Arc<dyn MailboxStore>,
        label: LocalLabelId,
        page_size: usize,
        registry: &Arc<WatcherRegistry>,
        invalidation: Arc<InvalidationTracker>,
    ) -> Self {
        let watch = registry.register(
            WatchKey::ConversationList(label),
            Arc::new(InvalidationBridge { invalidation }),
        );
        Self {
            store,
            label,
            page_size: page_size.max(1),
            state: Mutex::new(PagerState::default()),
            watch,
        }
    }

    pub fn label(&self) -> LocalLabelId {
        self.label
    }

    /// The underlying watch registration
    pub fn handle(&self) -> &WatchHandle {
        &self.watch
    }

    /// Release the watch registration; idempotent
    pub fn disconnect(&self) {
        self.watch.disconnect();
    }

    /// Whether the last load reached the end of the list
    pub fn is_exhausted(&self) -> bool {
        self.state.lock().unwrap().exhausted
    }

    /// Load the requested slice and advance the cursor
    ///
    /// `Next` before any `First` behaves like `First`. A `Next` at the end
    /// of the list returns an empty page and leaves the cursor in place.
    pub fn load(&self, page: PageToLoad) -> Result<Vec<LocalConversation>, MailboxError> {
        let mut state = self.state.lock().unwrap();
        let (cursor, limit) = match page {
            PageToLoad::First => (None, self.page_size),
            PageToLoad::Next => (state.cursor, self.page_size),
            PageToLoad::All => (None, self.page_size * state.pages_loaded.max(1)),
        };

        let rows = self.store.list_conversations(self.label, limit, cursor.as_ref())?;

        state.exhausted = rows.len() < limit;
        if let Some(last) = rows.last() {
            state.cursor = Some(PageCursor::after(last));
        } else if !matches!(page, PageToLoad::Next) {
            state.cursor = None;
        }
        state.pages_loaded = match page {
            PageToLoad::First => 1,
            PageToLoad::Next => state.pages_loaded + 1,
            PageToLoad::All => state.pages_loaded.max(1),
        };

        log::debug!(
            "loaded {:?} for label {}: {} rows (exhausted: {})",
            page,
            self.label.raw(),
            rows.len(),
            state.exhausted
        );
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invalidation::InvalidationCallback;
    use crate::models::{ConversationDraft, EmailAddress, LabelId};
    use crate::storage::InMemoryMailboxStore;
    use chrono::{Duration, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn seeded_store(count: usize) -> (Arc<InMemoryMailboxStore>, LocalLabelId) {
        let store = Arc::new(InMemoryMailboxStore::new());
        let label = store.resolve_label(&LabelId::new("INBOX")).unwrap();
        for i in 0..count {
            store
                .insert_conversation(
                    ConversationDraft::new(format!("c{}", i), EmailAddress::new("a@example.com"))
                        .last_activity_at(Utc::now() - Duration::hours(i as i64))
                        .labels(vec![label]),
                )
                .unwrap();
        }
        (store, label)
    }

    fn make_pager(store: Arc<InMemoryMailboxStore>, label: LocalLabelId, page_size: usize) -> Paginator {
        let registry = Arc::new(WatcherRegistry::new());
        let invalidation = Arc::new(InvalidationTracker::new());
        Paginator::new(store, label, page_size, &registry, invalidation)
    }

    #[test]
    fn test_pages_never_overlap() {
        let (store, label) = seeded_store(5);
        let pager = make_pager(store, label, 2);

        let p1 = pager.load(PageToLoad::First).unwrap();
        let p2 = pager.load(PageToLoad::Next).unwrap();
        let p3 = pager.load(PageToLoad::Next).unwrap();

        let mut seen: Vec<_> = p1.iter().chain(&p2).chain(&p3).map(|c| c.id).collect();
        assert_eq!(seen.len(), 5);
        seen.dedup();
        assert_eq!(seen.len(), 5);
        assert!(pager.is_exhausted());
    }

    #[test]
    fn test_next_before_first_starts_at_top() {
        let (store, label) = seeded_store(3);
        let pager = make_pager(store, label, 2);

        let page = pager.load(PageToLoad::Next).unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].subject, "c0");
    }

    #[test]
    fn test_all_refetches_loaded_range() {
        let (store, label) = seeded_store(6);
        let pager = make_pager(store.clone(), label, 2);

        pager.load(PageToLoad::First).unwrap();
        pager.load(PageToLoad::Next).unwrap();

        let all = pager.load(PageToLoad::All).unwrap();
        assert_eq!(all.len(), 4);
        assert_eq!(all[0].subject, "c0");

        // Cursor continues from the end of the refreshed range
        let next = pager.load(PageToLoad::Next).unwrap();
        assert_eq!(next[0].subject, "c4");
    }

    #[test]
    fn test_next_at_end_returns_empty() {
        let (store, label) = seeded_store(2);
        let pager = make_pager(store, label, 2);

        pager.load(PageToLoad::First).unwrap();
        let page = pager.load(PageToLoad::Next).unwrap();
        assert!(page.is_empty());
        assert!(pager.is_exhausted());
    }

    #[test]
    fn test_new_arrivals_do_not_repeat_rows() {
        let (store, label) = seeded_store(4);
        let pager = make_pager(store.clone(), label, 2);

        let p1 = pager.load(PageToLoad::First).unwrap();

        // New mail lands at the top between pages
        store
            .insert_conversation(
                ConversationDraft::new("fresh", EmailAddress::new("b@example.com"))
                    .last_activity_at(Utc::now() + Duration::hours(1))
                    .labels(vec![label]),
            )
            .unwrap();

        let p2 = pager.load(PageToLoad::Next).unwrap();
        for c in &p2 {
            assert!(!p1.iter().any(|prev| prev.id == c.id));
            assert_ne!(c.subject, "fresh");
        }
    }

    #[derive(Default)]
    struct Counter(AtomicUsize);

    impl InvalidationCallback for Counter {
        fn on_invalidated(&self, sources: &[DataSource]) {
            assert_eq!(sources, [DataSource::Conversations]);
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_list_changes_raise_conversation_invalidation() {
        let (store, label) = seeded_store(1);
        let registry = Arc::new(WatcherRegistry::new());
        let invalidation = Arc::new(InvalidationTracker::new());
        let counter = Arc::new(Counter::default());
        let _sub = invalidation.subscribe(counter.clone());

        let pager = Paginator::new(store, label, 2, &registry, Arc::clone(&invalidation));

        registry.notify(&[], &[label]);
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);

        pager.disconnect();
        registry.notify(&[], &[label]);
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }
}
