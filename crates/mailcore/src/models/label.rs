//! Label models and the local/remote label id split
//!
//! The engine identifies labels two ways: `LabelId` is the remote-facing
//! string id the server knows about, `LocalLabelId` is the opaque row id
//! assigned by the local store. Translation between the two lives in the
//! store (`resolve_label` / `remote_label`); everything inside the engine
//! works on `LocalLabelId`.

use serde::{Deserialize, Serialize};

/// Remote-facing label identifier (server label ID)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LabelId(pub String);

impl LabelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    // Well-known system labels
    pub const INBOX: &'static str = "INBOX";
    pub const ARCHIVE: &'static str = "ARCHIVE";
    pub const SENT: &'static str = "SENT";
    pub const DRAFTS: &'static str = "DRAFTS";
    pub const TRASH: &'static str = "TRASH";
    pub const SPAM: &'static str = "SPAM";
    pub const STARRED: &'static str = "STARRED";
    pub const ALL_MAIL: &'static str = "ALL";
}

impl From<String> for LabelId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for LabelId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Opaque local label identifier assigned by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocalLabelId(pub i64);

impl LocalLabelId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn raw(&self) -> i64 {
        self.0
    }
}

impl From<i64> for LocalLabelId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// A label/folder as known locally
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Label {
    /// Local row id
    pub id: LocalLabelId,
    /// Remote-facing id (e.g., "INBOX", "Label_123")
    pub remote_id: LabelId,
    /// Display name
    pub name: String,
    /// Whether this is a system label
    pub is_system: bool,
}

impl Label {
    pub fn new(id: LocalLabelId, remote_id: impl Into<LabelId>, name: impl Into<String>) -> Self {
        let remote_id = remote_id.into();
        let is_system = is_system_label(remote_id.as_str());
        Self {
            id,
            remote_id,
            name: name.into(),
            is_system,
        }
    }
}

/// Whether a remote label id names one of the built-in system labels
pub fn is_system_label(remote_id: &str) -> bool {
    matches!(
        remote_id,
        LabelId::INBOX
            | LabelId::ARCHIVE
            | LabelId::SENT
            | LabelId::DRAFTS
            | LabelId::TRASH
            | LabelId::SPAM
            | LabelId::STARRED
            | LabelId::ALL_MAIL
    )
}
