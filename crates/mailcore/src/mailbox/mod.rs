//! Mailbox handle: mutations and queries scoped to one label
//!
//! A handle is bound to a (user, label) pair for its whole life; switching
//! labels replaces the handle rather than re-pointing it. Every mutation is
//! local-first: apply to the store, enqueue the remote counterpart, notify
//! watchers and invalidation subscribers, then kick the executor. The
//! remote side catches up asynchronously.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::MailboxError;
use crate::invalidation::{DataSource, InvalidationTracker};
use crate::models::{
    EmailAddress, LabelId, LocalConversation, LocalConversationId, LocalLabelId, LocalMessage,
};
use crate::pager::Paginator;
use crate::pending::{ActionKind, PendingExecutor};
use crate::storage::MailboxStore;
use crate::watch::WatcherRegistry;

/// Live handle onto one label of one user's mailbox
///
/// Owns the label's paginator, whose list-watcher registration feeds the
/// invalidation tracker for the whole life of the handle.
pub struct MailboxHandle {
    label: LocalLabelId,
    remote_label: LabelId,
    store: Arc<dyn MailboxStore>,
    watchers: Arc<WatcherRegistry>,
    invalidation: Arc<InvalidationTracker>,
    executor: Arc<PendingExecutor>,
    paginator: Arc<Paginator>,
    disconnected: AtomicBool,
}

impl MailboxHandle {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        label: LocalLabelId,
        remote_label: LabelId,
        store: Arc<dyn MailboxStore>,
        watchers: Arc<WatcherRegistry>,
        invalidation: Arc<InvalidationTracker>,
        executor: Arc<PendingExecutor>,
        page_size: usize,
    ) -> Self {
        let paginator = Arc::new(Paginator::new(
            Arc::clone(&store),
            label,
            page_size,
            &watchers,
            Arc::clone(&invalidation),
        ));
        Self {
            label,
            remote_label,
            store,
            watchers,
            invalidation,
            executor,
            paginator,
            disconnected: AtomicBool::new(false),
        }
    }

    pub fn label(&self) -> LocalLabelId {
        self.label
    }

    pub fn remote_label(&self) -> &LabelId {
        &self.remote_label
    }

    pub fn is_connected(&self) -> bool {
        !self.disconnected.load(Ordering::SeqCst)
    }

    /// Detach the handle; every operation afterwards fails with
    /// [`MailboxError::Disconnected`]. Terminal and idempotent. Also
    /// releases the paginator's watch registration.
    pub fn disconnect(&self) {
        if !self.disconnected.swap(true, Ordering::SeqCst) {
            self.paginator.disconnect();
            log::debug!("mailbox handle for label {} disconnected", self.label.raw());
        }
    }

    fn ensure_connected(&self) -> Result<(), MailboxError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(MailboxError::Disconnected)
        }
    }

    /// The paginator for this handle's label
    pub fn paginator(&self) -> Result<Arc<Paginator>, MailboxError> {
        self.ensure_connected()?;
        Ok(Arc::clone(&self.paginator))
    }

    // === Queries ===

    pub fn conversation(
        &self,
        id: LocalConversationId,
    ) -> Result<Option<LocalConversation>, MailboxError> {
        self.ensure_connected()?;
        Ok(self.store.get_conversation(id)?)
    }

    pub fn messages(
        &self,
        conversation: LocalConversationId,
    ) -> Result<Vec<LocalMessage>, MailboxError> {
        self.ensure_connected()?;
        Ok(self.store.list_messages(conversation)?)
    }

    pub fn conversation_count(&self) -> Result<usize, MailboxError> {
        self.ensure_connected()?;
        Ok(self.store.count_conversations(self.label)?)
    }

    /// Avatar bytes for a sender, if a source is wired in
    ///
    /// TODO: port the BIMI fetch once a remote transport exists; until then
    /// every lookup misses.
    pub fn sender_image(
        &self,
        address: &EmailAddress,
        bimi_selector: Option<&str>,
    ) -> Result<Option<Vec<u8>>, MailboxError> {
        self.ensure_connected()?;
        log::debug!(
            "no sender image source for {} (selector {:?})",
            address.email,
            bimi_selector
        );
        Ok(None)
    }

    // === Mutations ===

    pub fn mark_read(&self, ids: &[LocalConversationId]) -> Result<(), MailboxError> {
        self.ensure_connected()?;
        let touched = self.touched_labels(ids)?;
        self.store.set_read(ids, true)?;
        self.finish_mutation(ActionKind::MarkRead, ids, &touched)
    }

    pub fn mark_unread(&self, ids: &[LocalConversationId]) -> Result<(), MailboxError> {
        self.ensure_connected()?;
        let touched = self.touched_labels(ids)?;
        self.store.set_read(ids, false)?;
        self.finish_mutation(ActionKind::MarkUnread, ids, &touched)
    }

    pub fn star(&self, ids: &[LocalConversationId]) -> Result<(), MailboxError> {
        self.ensure_connected()?;
        let touched = self.touched_labels(ids)?;
        self.store.set_starred(ids, true)?;
        self.finish_mutation(ActionKind::Star, ids, &touched)
    }

    pub fn unstar(&self, ids: &[LocalConversationId]) -> Result<(), MailboxError> {
        self.ensure_connected()?;
        let touched = self.touched_labels(ids)?;
        self.store.set_starred(ids, false)?;
        self.finish_mutation(ActionKind::Unstar, ids, &touched)
    }

    pub fn delete(&self, ids: &[LocalConversationId]) -> Result<(), MailboxError> {
        self.ensure_connected()?;
        // Collect memberships before the rows disappear
        let touched = self.touched_labels(ids)?;
        self.store.delete_conversations(ids)?;
        self.finish_mutation(ActionKind::Delete, ids, &touched)
    }

    /// Move conversations out of this label into another
    pub fn move_to(
        &self,
        ids: &[LocalConversationId],
        to: &LabelId,
    ) -> Result<(), MailboxError> {
        self.ensure_connected()?;
        let to_local = self.resolve_label(to)?;
        let mut touched = self.touched_labels(ids)?;
        touched.push(to_local);
        self.store.move_conversations(ids, self.label, to_local)?;
        self.finish_mutation(ActionKind::Move { to: to.clone() }, ids, &touched)
    }

    pub fn add_label(
        &self,
        ids: &[LocalConversationId],
        label: &LabelId,
    ) -> Result<(), MailboxError> {
        self.ensure_connected()?;
        let local = self.resolve_label(label)?;
        let mut touched = self.touched_labels(ids)?;
        touched.push(local);
        self.store.add_label(ids, local)?;
        self.finish_mutation(
            ActionKind::AddLabel {
                label: label.clone(),
            },
            ids,
            &touched,
        )
    }

    /// Remove a label from conversations
    ///
    /// Removing a label that was never seen is a caller error, not an
    /// occasion to allocate one.
    pub fn remove_label(
        &self,
        ids: &[LocalConversationId],
        label: &LabelId,
    ) -> Result<(), MailboxError> {
        self.ensure_connected()?;
        let local = self
            .store
            .find_label(label)?
            .ok_or_else(|| MailboxError::UnknownLabel(label.as_str().to_string()))?;
        let touched = self.touched_labels(ids)?;
        self.store.remove_label(ids, local)?;
        self.finish_mutation(
            ActionKind::RemoveLabel {
                label: label.clone(),
            },
            ids,
            &touched,
        )
    }

    /// Resolve a remote label, announcing newly allocated labels
    ///
    /// Allocation changes the label list, so subscribers watching it get a
    /// `Labels` invalidation.
    fn resolve_label(&self, label: &LabelId) -> Result<LocalLabelId, MailboxError> {
        if let Some(local) = self.store.find_label(label)? {
            return Ok(local);
        }
        let local = self.store.resolve_label(label)?;
        self.invalidation.notify(&[DataSource::Labels]);
        Ok(local)
    }

    /// Every label list a mutation of `ids` can affect, own label included
    fn touched_labels(
        &self,
        ids: &[LocalConversationId],
    ) -> Result<Vec<LocalLabelId>, MailboxError> {
        let mut labels: BTreeSet<LocalLabelId> = BTreeSet::new();
        labels.insert(self.label);
        for conversation in self.store.get_conversations(ids)? {
            labels.extend(conversation.labels);
        }
        Ok(labels.into_iter().collect())
    }

    /// Common tail of every mutation: queue the remote counterpart, fan out
    /// change notifications, wake the executor
    ///
    /// `touched` always contains the handle's own label, so the registry
    /// fan-out reaches the paginator's bridge and raises the
    /// `Conversations` invalidation exactly once; only `Messages` is
    /// reported here directly.
    fn finish_mutation(
        &self,
        kind: ActionKind,
        ids: &[LocalConversationId],
        touched: &[LocalLabelId],
    ) -> Result<(), MailboxError> {
        let action = self.store.enqueue_action(kind, ids)?;
        log::debug!(
            "applied {:?} to {} conversations (queued as action {})",
            action.kind,
            ids.len(),
            action.id
        );

        self.watchers.notify(ids, touched);
        self.invalidation.notify(&[DataSource::Messages]);
        self.executor.kick();
        Ok(())
    }
}
