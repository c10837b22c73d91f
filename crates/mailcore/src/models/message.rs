//! Message model: an immutable local snapshot of a single mail message

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{LocalConversationId, LocalLabelId};

/// Opaque 64-bit identifier for a locally-stored message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocalMessageId(pub i64);

impl LocalMessageId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn raw(&self) -> i64 {
        self.0
    }
}

impl From<i64> for LocalMessageId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// An email address with optional display name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailAddress {
    /// Display name (e.g., "John Doe")
    pub name: Option<String>,
    /// Email address (e.g., "john@example.com")
    pub email: String,
}

impl EmailAddress {
    /// Create a new email address with just the email
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            name: None,
            email: email.into(),
        }
    }

    /// Create a new email address with a display name
    pub fn with_name(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            email: email.into(),
        }
    }

    /// Parse an email address from a string like "John Doe <john@example.com>"
    pub fn parse(s: &str) -> Self {
        let s = s.trim();

        if let Some(angle_start) = s.rfind('<')
            && let Some(angle_end) = s.rfind('>')
            && angle_start < angle_end
        {
            let name = s[..angle_start].trim();
            let email = s[angle_start + 1..angle_end].trim();
            return Self {
                name: if name.is_empty() {
                    None
                } else {
                    Some(name.to_string())
                },
                email: email.to_string(),
            };
        }

        Self {
            name: None,
            email: s.to_string(),
        }
    }

    /// Format the email address for display
    pub fn display(&self) -> String {
        match &self.name {
            Some(name) => format!("{} <{}>", name, self.email),
            None => self.email.clone(),
        }
    }
}

/// A single message within a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalMessage {
    /// Store-assigned id
    pub id: LocalMessageId,
    /// Conversation this message belongs to
    pub conversation_id: LocalConversationId,
    /// Sender
    pub from: EmailAddress,
    /// Subject line
    pub subject: String,
    /// Plain text preview of the body
    pub body_preview: String,
    /// Full plain text body, if stored
    pub body_text: Option<String>,
    /// When the message was received
    pub received_at: DateTime<Utc>,
    /// Whether the message has been read
    pub is_read: bool,
    /// Whether the message is starred
    pub is_starred: bool,
    /// Labels on this message
    pub labels: Vec<LocalLabelId>,
}

/// Input for creating a message; the store assigns the id
#[derive(Debug, Clone)]
pub struct MessageDraft {
    pub conversation_id: LocalConversationId,
    pub from: EmailAddress,
    pub subject: String,
    pub body_preview: String,
    pub body_text: Option<String>,
    pub received_at: DateTime<Utc>,
    pub is_read: bool,
    pub is_starred: bool,
    pub labels: Vec<LocalLabelId>,
}

impl MessageDraft {
    pub fn new(conversation_id: LocalConversationId, from: EmailAddress) -> Self {
        Self {
            conversation_id,
            from,
            subject: String::new(),
            body_preview: String::new(),
            body_text: None,
            received_at: Utc::now(),
            is_read: false,
            is_starred: false,
            labels: Vec::new(),
        }
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn body_preview(mut self, preview: impl Into<String>) -> Self {
        self.body_preview = preview.into();
        self
    }

    pub fn body_text(mut self, body: impl Into<String>) -> Self {
        self.body_text = Some(body.into());
        self
    }

    pub fn received_at(mut self, at: DateTime<Utc>) -> Self {
        self.received_at = at;
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_email_with_name() {
        let addr = EmailAddress::parse("John Doe <john@example.com>");
        assert_eq!(addr.name, Some("John Doe".to_string()));
        assert_eq!(addr.email, "john@example.com");
    }

    #[test]
    fn test_parse_email_without_name() {
        let addr = EmailAddress::parse("john@example.com");
        assert_eq!(addr.name, None);
        assert_eq!(addr.email, "john@example.com");
    }

    #[test]
    fn test_parse_email_with_angle_brackets_no_name() {
        let addr = EmailAddress::parse("<john@example.com>");
        assert_eq!(addr.name, None);
        assert_eq!(addr.email, "john@example.com");
    }

    #[test]
    fn test_display_with_name() {
        let addr = EmailAddress::with_name("John Doe", "john@example.com");
        assert_eq!(addr.display(), "John Doe <john@example.com>");
    }

    #[test]
    fn test_display_without_name() {
        let addr = EmailAddress::new("john@example.com");
        assert_eq!(addr.display(), "john@example.com");
    }
}
