//! Storage trait definitions

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::models::{
    ConversationDraft, Label, LabelId, LocalConversation, LocalConversationId, LocalLabelId,
    LocalMessage, LocalMessageId, MessageDraft,
};
use crate::pending::{ActionKind, DeadLetter, PendingAction};

/// Cursor into a label's conversation list
///
/// Conversations are ordered by (last_activity_at, id) descending; the cursor
/// names the last row of the previous page so the next page can't repeat or
/// skip rows even when timestamps collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCursor {
    pub last_activity_at_millis: i64,
    pub id: LocalConversationId,
}

impl PageCursor {
    /// Cursor pointing at a conversation row
    pub fn after(conversation: &LocalConversation) -> Self {
        Self {
            last_activity_at_millis: conversation.last_activity_at.timestamp_millis(),
            id: conversation.id,
        }
    }
}

/// Trait for mailbox storage operations
///
/// Abstracts over the in-memory store used in tests and the SQLite store used
/// in production. All reads reflect prior writes on the same store
/// immediately (read-your-writes); the pending queue only gates remote
/// visibility, never local visibility.
pub trait MailboxStore: Send + Sync {
    // === Conversations ===

    /// Insert a conversation, assigning its id
    fn insert_conversation(&self, draft: ConversationDraft) -> Result<LocalConversation>;

    /// Get a conversation by id
    fn get_conversation(&self, id: LocalConversationId) -> Result<Option<LocalConversation>>;

    /// Get several conversations by id, skipping unknown ids
    fn get_conversations(&self, ids: &[LocalConversationId]) -> Result<Vec<LocalConversation>>;

    /// List conversations with the given label, newest first
    ///
    /// `after` resumes from a previous page; `None` starts at the top.
    fn list_conversations(
        &self,
        label: LocalLabelId,
        limit: usize,
        after: Option<&PageCursor>,
    ) -> Result<Vec<LocalConversation>>;

    /// Count conversations with the given label
    fn count_conversations(&self, label: LocalLabelId) -> Result<usize>;

    // === Messages ===

    /// Insert a message, assigning its id
    fn insert_message(&self, draft: MessageDraft) -> Result<LocalMessage>;

    /// Get a message by id
    fn get_message(&self, id: LocalMessageId) -> Result<Option<LocalMessage>>;

    /// List messages for a conversation, oldest first
    fn list_messages(&self, conversation: LocalConversationId) -> Result<Vec<LocalMessage>>;

    // === Mutations ===
    // Each applies to the named conversations and their messages.

    /// Set the read flag
    fn set_read(&self, ids: &[LocalConversationId], read: bool) -> Result<()>;

    /// Set the starred flag
    fn set_starred(&self, ids: &[LocalConversationId], starred: bool) -> Result<()>;

    /// Delete conversations and their messages
    fn delete_conversations(&self, ids: &[LocalConversationId]) -> Result<()>;

    /// Add a label to conversations
    fn add_label(&self, ids: &[LocalConversationId], label: LocalLabelId) -> Result<()>;

    /// Remove a label from conversations
    fn remove_label(&self, ids: &[LocalConversationId], label: LocalLabelId) -> Result<()>;

    /// Move conversations between labels (remove `from`, add `to`)
    fn move_conversations(
        &self,
        ids: &[LocalConversationId],
        from: LocalLabelId,
        to: LocalLabelId,
    ) -> Result<()>;

    // === Labels ===

    /// Map a remote label id to its local id, allocating on first sight
    fn resolve_label(&self, remote: &LabelId) -> Result<LocalLabelId>;

    /// Look up a remote label id without allocating
    fn find_label(&self, remote: &LabelId) -> Result<Option<LocalLabelId>>;

    /// Map a local label id back to its remote id
    fn remote_label(&self, local: LocalLabelId) -> Result<Option<LabelId>>;

    /// List all known labels
    fn list_labels(&self) -> Result<Vec<Label>>;

    // === Pending actions ===

    /// Append an action to the queue
    fn enqueue_action(
        &self,
        kind: ActionKind,
        ids: &[LocalConversationId],
    ) -> Result<PendingAction>;

    /// Actions runnable at `now`, FIFO, up to `limit`
    ///
    /// Actions whose retry backoff has not elapsed are excluded.
    fn next_actions(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<PendingAction>>;

    /// Remove an action after successful remote execution
    fn complete_action(&self, id: i64) -> Result<()>;

    /// Record a failed execution attempt; returns the new attempt count
    ///
    /// The action stays queued but is not runnable again before `retry_at`.
    fn fail_action(&self, id: i64, error: &str, retry_at: DateTime<Utc>) -> Result<u32>;

    /// Move an action out of the queue into the dead-letter list
    fn dead_letter_action(&self, id: i64) -> Result<()>;

    /// Count all queued actions, runnable or not
    fn count_pending_actions(&self) -> Result<usize>;

    /// List actions that exhausted their retry budget
    fn list_dead_letters(&self) -> Result<Vec<DeadLetter>>;

    // === Maintenance ===

    /// Clear all data (for testing)
    fn clear(&self) -> Result<()>;
}
