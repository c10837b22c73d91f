//! In-memory storage implementation
//!
//! Used for tests and as a reference implementation of the store contract.
//! Uses HashMaps protected by RwLocks for thread-safe access; scales are
//! small enough that list queries just filter and sort.

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;

use super::traits::{MailboxStore, PageCursor};
use crate::models::{
    ConversationDraft, Label, LabelId, LocalConversation, LocalConversationId, LocalLabelId,
    LocalMessage, LocalMessageId, MessageDraft,
};
use crate::pending::{ActionKind, DeadLetter, PendingAction};

/// A queued action plus its retry gate
struct QueuedAction {
    action: PendingAction,
    retry_at: Option<DateTime<Utc>>,
}

/// In-memory implementation of MailboxStore
pub struct InMemoryMailboxStore {
    conversations: RwLock<HashMap<i64, LocalConversation>>,
    messages: RwLock<HashMap<i64, LocalMessage>>,
    /// remote label id -> local Label
    labels: RwLock<HashMap<String, Label>>,
    /// FIFO queue keyed by action id
    pending: RwLock<BTreeMap<i64, QueuedAction>>,
    dead_letters: RwLock<Vec<DeadLetter>>,
    next_conversation_id: AtomicI64,
    next_message_id: AtomicI64,
    next_label_id: AtomicI64,
    next_action_id: AtomicI64,
}

impl InMemoryMailboxStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self {
            conversations: RwLock::new(HashMap::new()),
            messages: RwLock::new(HashMap::new()),
            labels: RwLock::new(HashMap::new()),
            pending: RwLock::new(BTreeMap::new()),
            dead_letters: RwLock::new(Vec::new()),
            next_conversation_id: AtomicI64::new(1),
            next_message_id: AtomicI64::new(1),
            next_label_id: AtomicI64::new(1),
            next_action_id: AtomicI64::new(1),
        }
    }
}

impl Default for InMemoryMailboxStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MailboxStore for InMemoryMailboxStore {
    fn insert_conversation(&self, draft: ConversationDraft) -> Result<LocalConversation> {
        let id = self.next_conversation_id.fetch_add(1, Ordering::SeqCst);
        let conversation = LocalConversation {
            id: LocalConversationId::new(id),
            subject: draft.subject,
            snippet: draft.snippet,
            sender: draft.sender,
            last_activity_at: draft.last_activity_at,
            message_count: 0,
            is_read: draft.is_read,
            is_starred: draft.is_starred,
            labels: draft.labels,
        };
        let mut conversations = self.conversations.write().unwrap();
        conversations.insert(id, conversation.clone());
        Ok(conversation)
    }

    fn get_conversation(&self, id: LocalConversationId) -> Result<Option<LocalConversation>> {
        let conversations = self.conversations.read().unwrap();
        Ok(conversations.get(&id.raw()).cloned())
    }

    fn get_conversations(&self, ids: &[LocalConversationId]) -> Result<Vec<LocalConversation>> {
        let conversations = self.conversations.read().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| conversations.get(&id.raw()).cloned())
            .collect())
    }

    fn list_conversations(
        &self,
        label: LocalLabelId,
        limit: usize,
        after: Option<&PageCursor>,
    ) -> Result<Vec<LocalConversation>> {
        let conversations = self.conversations.read().unwrap();
        let mut matching: Vec<LocalConversation> = conversations
            .values()
            .filter(|c| c.labels.contains(&label))
            .cloned()
            .collect();

        // Newest first; id breaks timestamp ties
        matching.sort_by(|a, b| {
            (b.last_activity_at, b.id.raw()).cmp(&(a.last_activity_at, a.id.raw()))
        });

        let result = matching
            .into_iter()
            .filter(|c| match after {
                Some(cursor) => {
                    (c.last_activity_at.timestamp_millis(), c.id.raw())
                        < (cursor.last_activity_at_millis, cursor.id.raw())
                }
                None => true,
            })
            .take(limit)
            .collect();

        Ok(result)
    }

    fn count_conversations(&self, label: LocalLabelId) -> Result<usize> {
        let conversations = self.conversations.read().unwrap();
        Ok(conversations
            .values()
            .filter(|c| c.labels.contains(&label))
            .count())
    }

    fn insert_message(&self, draft: MessageDraft) -> Result<LocalMessage> {
        let id = self.next_message_id.fetch_add(1, Ordering::SeqCst);
        let message = LocalMessage {
            id: LocalMessageId::new(id),
            conversation_id: draft.conversation_id,
            from: draft.from,
            subject: draft.subject,
            body_preview: draft.body_preview,
            body_text: draft.body_text,
            received_at: draft.received_at,
            is_read: draft.is_read,
            is_starred: draft.is_starred,
            labels: draft.labels,
        };

        let mut messages = self.messages.write().unwrap();
        messages.insert(id, message.clone());
        drop(messages);

        // Keep the conversation summary consistent with its messages
        let mut conversations = self.conversations.write().unwrap();
        if let Some(c) = conversations.get_mut(&draft.conversation_id.raw()) {
            c.message_count += 1;
            if message.received_at > c.last_activity_at {
                c.last_activity_at = message.received_at;
                c.snippet = message.body_preview.clone();
            }
            if !message.is_read {
                c.is_read = false;
            }
            if message.is_starred {
                c.is_starred = true;
            }
        }

        Ok(message)
    }

    fn get_message(&self, id: LocalMessageId) -> Result<Option<LocalMessage>> {
        let messages = self.messages.read().unwrap();
        Ok(messages.get(&id.raw()).cloned())
    }

    fn list_messages(&self, conversation: LocalConversationId) -> Result<Vec<LocalMessage>> {
        let messages = self.messages.read().unwrap();
        let mut result: Vec<LocalMessage> = messages
            .values()
            .filter(|m| m.conversation_id == conversation)
            .cloned()
            .collect();

        result.sort_by(|a, b| (a.received_at, a.id.raw()).cmp(&(b.received_at, b.id.raw())));
        Ok(result)
    }

    fn set_read(&self, ids: &[LocalConversationId], read: bool) -> Result<()> {
        let mut conversations = self.conversations.write().unwrap();
        let mut messages = self.messages.write().unwrap();
        for id in ids {
            if let Some(c) = conversations.get_mut(&id.raw()) {
                c.is_read = read;
            }
            for m in messages.values_mut().filter(|m| m.conversation_id == *id) {
                m.is_read = read;
            }
        }
        Ok(())
    }

    fn set_starred(&self, ids: &[LocalConversationId], starred: bool) -> Result<()> {
        let mut conversations = self.conversations.write().unwrap();
        let mut messages = self.messages.write().unwrap();
        for id in ids {
            if let Some(c) = conversations.get_mut(&id.raw()) {
                c.is_starred = starred;
            }
            for m in messages.values_mut().filter(|m| m.conversation_id == *id) {
                m.is_starred = starred;
            }
        }
        Ok(())
    }

    fn delete_conversations(&self, ids: &[LocalConversationId]) -> Result<()> {
        let mut conversations = self.conversations.write().unwrap();
        let mut messages = self.messages.write().unwrap();
        for id in ids {
            conversations.remove(&id.raw());
            messages.retain(|_, m| m.conversation_id != *id);
        }
        Ok(())
    }

    fn add_label(&self, ids: &[LocalConversationId], label: LocalLabelId) -> Result<()> {
        let mut conversations = self.conversations.write().unwrap();
        let mut messages = self.messages.write().unwrap();
        for id in ids {
            if let Some(c) = conversations.get_mut(&id.raw())
                && !c.labels.contains(&label)
            {
                c.labels.push(label);
            }
            for m in messages.values_mut().filter(|m| m.conversation_id == *id) {
                if !m.labels.contains(&label) {
                    m.labels.push(label);
                }
            }
        }
        Ok(())
    }

    fn remove_label(&self, ids: &[LocalConversationId], label: LocalLabelId) -> Result<()> {
        let mut conversations = self.conversations.write().unwrap();
        let mut messages = self.messages.write().unwrap();
        for id in ids {
            if let Some(c) = conversations.get_mut(&id.raw()) {
                c.labels.retain(|l| *l != label);
            }
            for m in messages.values_mut().filter(|m| m.conversation_id == *id) {
                m.labels.retain(|l| *l != label);
            }
        }
        Ok(())
    }

    fn move_conversations(
        &self,
        ids: &[LocalConversationId],
        from: LocalLabelId,
        to: LocalLabelId,
    ) -> Result<()> {
        self.remove_label(ids, from)?;
        self.add_label(ids, to)
    }

    fn resolve_label(&self, remote: &LabelId) -> Result<LocalLabelId> {
        let mut labels = self.labels.write().unwrap();
        if let Some(label) = labels.get(remote.as_str()) {
            return Ok(label.id);
        }
        let id = LocalLabelId::new(self.next_label_id.fetch_add(1, Ordering::SeqCst));
        let label = Label::new(id, remote.clone(), remote.as_str());
        labels.insert(remote.as_str().to_string(), label);
        Ok(id)
    }

    fn find_label(&self, remote: &LabelId) -> Result<Option<LocalLabelId>> {
        let labels = self.labels.read().unwrap();
        Ok(labels.get(remote.as_str()).map(|l| l.id))
    }

    fn remote_label(&self, local: LocalLabelId) -> Result<Option<LabelId>> {
        let labels = self.labels.read().unwrap();
        Ok(labels
            .values()
            .find(|l| l.id == local)
            .map(|l| l.remote_id.clone()))
    }

    fn list_labels(&self) -> Result<Vec<Label>> {
        let labels = self.labels.read().unwrap();
        let mut result: Vec<Label> = labels.values().cloned().collect();
        result.sort_by_key(|l| l.id);
        Ok(result)
    }

    fn enqueue_action(
        &self,
        kind: ActionKind,
        ids: &[LocalConversationId],
    ) -> Result<PendingAction> {
        let id = self.next_action_id.fetch_add(1, Ordering::SeqCst);
        let action = PendingAction {
            id,
            kind,
            conversation_ids: ids.to_vec(),
            created_at: Utc::now(),
            attempts: 0,
            last_error: None,
        };
        let mut pending = self.pending.write().unwrap();
        pending.insert(
            id,
            QueuedAction {
                action: action.clone(),
                retry_at: None,
            },
        );
        Ok(action)
    }

    fn next_actions(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<PendingAction>> {
        let pending = self.pending.read().unwrap();
        Ok(pending
            .values()
            .filter(|q| q.retry_at.is_none_or(|at| at <= now))
            .take(limit)
            .map(|q| q.action.clone())
            .collect())
    }

    fn complete_action(&self, id: i64) -> Result<()> {
        let mut pending = self.pending.write().unwrap();
        pending.remove(&id);
        Ok(())
    }

    fn fail_action(&self, id: i64, error: &str, retry_at: DateTime<Utc>) -> Result<u32> {
        let mut pending = self.pending.write().unwrap();
        let Some(queued) = pending.get_mut(&id) else {
            return Ok(0);
        };
        queued.action.attempts += 1;
        queued.action.last_error = Some(error.to_string());
        queued.retry_at = Some(retry_at);
        Ok(queued.action.attempts)
    }

    fn dead_letter_action(&self, id: i64) -> Result<()> {
        let mut pending = self.pending.write().unwrap();
        let Some(queued) = pending.remove(&id) else {
            return Ok(());
        };
        drop(pending);

        let action = queued.action;
        let mut dead = self.dead_letters.write().unwrap();
        dead.push(DeadLetter {
            id: action.id,
            kind: action.kind,
            conversation_ids: action.conversation_ids,
            created_at: action.created_at,
            attempts: action.attempts,
            last_error: action.last_error,
            failed_at: Utc::now(),
        });
        Ok(())
    }

    fn count_pending_actions(&self) -> Result<usize> {
        let pending = self.pending.read().unwrap();
        Ok(pending.len())
    }

    fn list_dead_letters(&self) -> Result<Vec<DeadLetter>> {
        let dead = self.dead_letters.read().unwrap();
        Ok(dead.clone())
    }

    fn clear(&self) -> Result<()> {
        self.conversations.write().unwrap().clear();
        self.messages.write().unwrap().clear();
        self.labels.write().unwrap().clear();
        self.pending.write().unwrap().clear();
        self.dead_letters.write().unwrap().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EmailAddress;
    use chrono::Duration;

    fn seed_conversation(
        store: &InMemoryMailboxStore,
        subject: &str,
        age_hours: i64,
        labels: Vec<LocalLabelId>,
    ) -> LocalConversation {
        store
            .insert_conversation(
                ConversationDraft::new(subject, EmailAddress::new("sender@example.com"))
                    .snippet(format!("Snippet for {}", subject))
                    .last_activity_at(Utc::now() - Duration::hours(age_hours))
                    .labels(labels),
            )
            .unwrap()
    }

    #[test]
    fn test_list_conversations_orders_newest_first() {
        let store = InMemoryMailboxStore::new();
        let inbox = store.resolve_label(&LabelId::new("INBOX")).unwrap();

        seed_conversation(&store, "oldest", 3, vec![inbox]);
        seed_conversation(&store, "newest", 1, vec![inbox]);
        seed_conversation(&store, "middle", 2, vec![inbox]);

        let listed = store.list_conversations(inbox, 10, None).unwrap();
        let subjects: Vec<&str> = listed.iter().map(|c| c.subject.as_str()).collect();
        assert_eq!(subjects, vec!["newest", "middle", "oldest"]);
    }

    #[test]
    fn test_cursor_pagination_does_not_repeat() {
        let store = InMemoryMailboxStore::new();
        let inbox = store.resolve_label(&LabelId::new("INBOX")).unwrap();

        for i in 0..5 {
            seed_conversation(&store, &format!("c{}", i), i, vec![inbox]);
        }

        let page1 = store.list_conversations(inbox, 2, None).unwrap();
        let cursor = PageCursor::after(page1.last().unwrap());
        let page2 = store.list_conversations(inbox, 2, Some(&cursor)).unwrap();

        assert_eq!(page1.len(), 2);
        assert_eq!(page2.len(), 2);
        for c in &page1 {
            assert!(page2.iter().all(|d| d.id != c.id));
        }
    }

    #[test]
    fn test_set_read_applies_to_messages() {
        let store = InMemoryMailboxStore::new();
        let c = seed_conversation(&store, "conv", 1, vec![]);
        store
            .insert_message(MessageDraft::new(c.id, EmailAddress::new("a@example.com")))
            .unwrap();

        store.set_read(&[c.id], true).unwrap();

        let conv = store.get_conversation(c.id).unwrap().unwrap();
        assert!(conv.is_read);
        let messages = store.list_messages(c.id).unwrap();
        assert!(messages.iter().all(|m| m.is_read));
    }

    #[test]
    fn test_insert_message_refreshes_summary() {
        let store = InMemoryMailboxStore::new();
        let c = seed_conversation(&store, "conv", 5, vec![]);

        let newer = Utc::now();
        store
            .insert_message(
                MessageDraft::new(c.id, EmailAddress::new("a@example.com"))
                    .body_preview("latest preview")
                    .received_at(newer),
            )
            .unwrap();

        let conv = store.get_conversation(c.id).unwrap().unwrap();
        assert_eq!(conv.message_count, 1);
        assert_eq!(conv.snippet, "latest preview");
        assert_eq!(conv.last_activity_at, newer);
        assert!(!conv.is_read);
    }

    #[test]
    fn test_label_mapping_is_stable() {
        let store = InMemoryMailboxStore::new();
        let remote = LabelId::new("Label_42");

        let first = store.resolve_label(&remote).unwrap();
        let second = store.resolve_label(&remote).unwrap();
        assert_eq!(first, second);

        let back = store.remote_label(first).unwrap();
        assert_eq!(back, Some(remote));
    }

    #[test]
    fn test_find_label_never_allocates() {
        let store = InMemoryMailboxStore::new();
        assert_eq!(store.find_label(&LabelId::new("INBOX")).unwrap(), None);
        assert!(store.list_labels().unwrap().is_empty());

        let local = store.resolve_label(&LabelId::new("INBOX")).unwrap();
        assert_eq!(store.find_label(&LabelId::new("INBOX")).unwrap(), Some(local));
    }

    #[test]
    fn test_move_conversations_swaps_labels() {
        let store = InMemoryMailboxStore::new();
        let inbox = store.resolve_label(&LabelId::new("INBOX")).unwrap();
        let archive = store.resolve_label(&LabelId::new("ARCHIVE")).unwrap();
        let c = seed_conversation(&store, "conv", 1, vec![inbox]);

        store.move_conversations(&[c.id], inbox, archive).unwrap();

        let conv = store.get_conversation(c.id).unwrap().unwrap();
        assert!(!conv.labels.contains(&inbox));
        assert!(conv.labels.contains(&archive));
    }

    #[test]
    fn test_failed_action_respects_retry_gate() {
        let store = InMemoryMailboxStore::new();
        let action = store
            .enqueue_action(ActionKind::MarkRead, &[LocalConversationId::new(1)])
            .unwrap();

        let now = Utc::now();
        store
            .fail_action(action.id, "boom", now + Duration::seconds(60))
            .unwrap();

        // Not runnable until the retry gate passes
        assert!(store.next_actions(now, 10).unwrap().is_empty());
        let later = now + Duration::seconds(120);
        let runnable = store.next_actions(later, 10).unwrap();
        assert_eq!(runnable.len(), 1);
        assert_eq!(runnable[0].attempts, 1);
        assert_eq!(runnable[0].last_error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_dead_letter_removes_from_queue() {
        let store = InMemoryMailboxStore::new();
        let action = store
            .enqueue_action(ActionKind::Delete, &[LocalConversationId::new(1)])
            .unwrap();

        store.dead_letter_action(action.id).unwrap();

        assert_eq!(store.count_pending_actions().unwrap(), 0);
        let dead = store.list_dead_letters().unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].kind, ActionKind::Delete);
    }
}
