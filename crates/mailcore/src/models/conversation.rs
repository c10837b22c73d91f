//! Conversation model: an immutable local snapshot of a mail conversation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{EmailAddress, LocalLabelId};

/// Opaque 64-bit identifier for a locally-stored conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocalConversationId(pub i64);

impl LocalConversationId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn raw(&self) -> i64 {
        self.0
    }
}

impl From<i64> for LocalConversationId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// A conversation as currently known locally
///
/// Snapshots are immutable: mutations go through the mailbox handle and
/// produce a new snapshot on the next read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalConversation {
    /// Store-assigned id
    pub id: LocalConversationId,
    /// Subject line
    pub subject: String,
    /// Preview text of the latest message
    pub snippet: String,
    /// Sender of the latest message
    pub sender: EmailAddress,
    /// Timestamp of the most recent activity
    pub last_activity_at: DateTime<Utc>,
    /// Number of messages in the conversation
    pub message_count: usize,
    /// Whether every message has been read
    pub is_read: bool,
    /// Whether any message is starred
    pub is_starred: bool,
    /// Labels this conversation is a member of
    pub labels: Vec<LocalLabelId>,
}

/// Input for creating a conversation; the store assigns the id
#[derive(Debug, Clone)]
pub struct ConversationDraft {
    pub subject: String,
    pub snippet: String,
    pub sender: EmailAddress,
    pub last_activity_at: DateTime<Utc>,
    pub is_read: bool,
    pub is_starred: bool,
    pub labels: Vec<LocalLabelId>,
}

impl ConversationDraft {
    pub fn new(subject: impl Into<String>, sender: EmailAddress) -> Self {
        Self {
            subject: subject.into(),
            snippet: String::new(),
            sender,
            last_activity_at: Utc::now(),
            is_read: false,
            is_starred: false,
            labels: Vec::new(),
        }
    }

    pub fn snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = snippet.into();
        self
    }

    pub fn last_activity_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_activity_at = at;
        self
    }

    pub fn read(mut self, read: bool) -> Self {
        self.is_read = read;
        self
    }

    pub fn starred(mut self, starred: bool) -> Self {
        self.is_starred = starred;
        self
    }

    pub fn labels(mut self, labels: Vec<LocalLabelId>) -> Self {
        self.labels = labels;
        self
    }
}
