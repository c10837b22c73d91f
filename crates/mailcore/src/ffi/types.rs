//! FFI-friendly type wrappers for UniFFI export
//!
//! These types convert internal Rust types to FFI-compatible versions:
//! - `DateTime<Utc>` → `i64` (Unix millis)
//! - Id newtypes → plain `i64`/`String`
//! - Callback traits → UniFFI callback interfaces

use crate::error::{MailboxError, SessionError};
use crate::invalidation::DataSource;
use crate::models::{EmailAddress, Label, LocalConversation, LocalMessage};
use crate::pager::{PageKey, PageToLoad};
use crate::pending::DeadLetter;

// ============================================================================
// Error Types
// ============================================================================

/// FFI-friendly error type
#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum EngineError {
    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Not signed in")]
    NotSignedIn,

    #[error("Unknown label: {label}")]
    UnknownLabel { label: String },

    #[error("Mailbox disconnected")]
    Disconnected,
}

impl From<anyhow::Error> for EngineError {
    fn from(e: anyhow::Error) -> Self {
        EngineError::Storage {
            message: format!("{:#}", e),
        }
    }
}

impl From<MailboxError> for EngineError {
    fn from(e: MailboxError) -> Self {
        match e {
            MailboxError::Storage(inner) => inner.into(),
            MailboxError::UnknownLabel(label) => EngineError::UnknownLabel { label },
            MailboxError::Disconnected => EngineError::Disconnected,
        }
    }
}

impl From<SessionError> for EngineError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::NotSignedIn => EngineError::NotSignedIn,
            SessionError::Storage(inner) => inner.into(),
        }
    }
}

// ============================================================================
// Email Address
// ============================================================================

/// FFI-friendly email address
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiEmailAddress {
    pub name: Option<String>,
    pub email: String,
}

impl From<EmailAddress> for FfiEmailAddress {
    fn from(e: EmailAddress) -> Self {
        Self {
            name: e.name,
            email: e.email,
        }
    }
}

impl From<FfiEmailAddress> for EmailAddress {
    fn from(e: FfiEmailAddress) -> Self {
        match e.name {
            Some(name) => EmailAddress::with_name(name, e.email),
            None => EmailAddress::new(e.email),
        }
    }
}

// ============================================================================
// Conversation and Message Types
// ============================================================================

/// FFI-friendly conversation representation
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiConversation {
    pub id: i64,
    pub subject: String,
    pub snippet: String,
    pub sender: FfiEmailAddress,
    /// Unix timestamp (milliseconds since epoch)
    pub last_activity_at: i64,
    pub message_count: u32,
    pub is_read: bool,
    pub is_starred: bool,
    /// Local label ids this conversation belongs to
    pub labels: Vec<i64>,
}

impl From<LocalConversation> for FfiConversation {
    fn from(c: LocalConversation) -> Self {
        Self {
            id: c.id.raw(),
            subject: c.subject,
            snippet: c.snippet,
            sender: c.sender.into(),
            last_activity_at: c.last_activity_at.timestamp_millis(),
            message_count: c.message_count as u32,
            is_read: c.is_read,
            is_starred: c.is_starred,
            labels: c.labels.iter().map(|l| l.raw()).collect(),
        }
    }
}

/// FFI-friendly message representation
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiMessage {
    pub id: i64,
    pub conversation_id: i64,
    pub from: FfiEmailAddress,
    pub subject: String,
    pub body_preview: String,
    pub body_text: Option<String>,
    /// Unix timestamp (milliseconds since epoch)
    pub received_at: i64,
    pub is_read: bool,
    pub is_starred: bool,
}

impl From<LocalMessage> for FfiMessage {
    fn from(m: LocalMessage) -> Self {
        Self {
            id: m.id.raw(),
            conversation_id: m.conversation_id.raw(),
            from: m.from.into(),
            subject: m.subject,
            body_preview: m.body_preview,
            body_text: m.body_text,
            received_at: m.received_at.timestamp_millis(),
            is_read: m.is_read,
            is_starred: m.is_starred,
        }
    }
}

// ============================================================================
// Label Types
// ============================================================================

/// FFI-friendly label representation
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiLabel {
    /// Local row id
    pub id: i64,
    /// Remote-facing id (e.g., "INBOX", "Label_123")
    pub remote_id: String,
    pub name: String,
    pub is_system: bool,
}

impl From<Label> for FfiLabel {
    fn from(l: Label) -> Self {
        Self {
            id: l.id.raw(),
            remote_id: l.remote_id.0,
            name: l.name,
            is_system: l.is_system,
        }
    }
}

// ============================================================================
// Pagination Types
// ============================================================================

/// Which slice of a conversation list to load
#[derive(Debug, Clone, Copy, uniffi::Enum)]
pub enum FfiPageToLoad {
    First,
    Next,
    All,
}

impl From<FfiPageToLoad> for PageToLoad {
    fn from(p: FfiPageToLoad) -> Self {
        match p {
            FfiPageToLoad::First => PageToLoad::First,
            FfiPageToLoad::Next => PageToLoad::Next,
            FfiPageToLoad::All => PageToLoad::All,
        }
    }
}

/// A page request addressed to a specific label
///
/// Requests for a label that is no longer the active mailbox return an
/// empty page.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPageKey {
    pub label_id: String,
    pub page: FfiPageToLoad,
}

impl From<FfiPageKey> for PageKey {
    fn from(k: FfiPageKey) -> Self {
        PageKey {
            label: k.label_id.into(),
            page: k.page.into(),
        }
    }
}

// ============================================================================
// Invalidation Types
// ============================================================================

/// The closed set of invalidatable data sources
#[derive(Debug, Clone, Copy, uniffi::Enum)]
pub enum FfiDataSource {
    Conversations,
    Messages,
    Labels,
}

impl From<DataSource> for FfiDataSource {
    fn from(s: DataSource) -> Self {
        match s {
            DataSource::Conversations => FfiDataSource::Conversations,
            DataSource::Messages => FfiDataSource::Messages,
            DataSource::Labels => FfiDataSource::Labels,
        }
    }
}

// ============================================================================
// Pending Queue Diagnostics
// ============================================================================

/// A queued action that exhausted its retry budget
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiDeadLetter {
    pub id: i64,
    /// JSON description of the remote operation
    pub operation: String,
    pub conversation_ids: Vec<i64>,
    pub attempts: u32,
    pub last_error: Option<String>,
    /// Unix timestamp (milliseconds since epoch)
    pub failed_at: i64,
}

impl From<DeadLetter> for FfiDeadLetter {
    fn from(d: DeadLetter) -> Self {
        Self {
            id: d.id,
            operation: serde_json::to_string(&d.kind).unwrap_or_else(|_| "{}".to_string()),
            conversation_ids: d.conversation_ids.iter().map(|id| id.raw()).collect(),
            attempts: d.attempts,
            last_error: d.last_error,
            failed_at: d.failed_at.timestamp_millis(),
        }
    }
}

// ============================================================================
// Callback Interfaces
// ============================================================================

/// Callback fired when a watched conversation or list may have changed
///
/// Carries no payload; pull fresh state through the watch object.
#[uniffi::export(callback_interface)]
pub trait WatchCallback: Send + Sync {
    fn on_change(&self);
}

/// Callback fired when one or more data sources change
#[uniffi::export(callback_interface)]
pub trait InvalidationListener: Send + Sync {
    fn on_invalidated(&self, sources: Vec<FfiDataSource>);
}

/// Callback fired when the signed-in user changes
#[uniffi::export(callback_interface)]
pub trait SessionCallback: Send + Sync {
    /// `user_id` is `None` after sign-out
    fn on_session_changed(&self, user_id: Option<String>);
}

// ============================================================================
// Log Callback
// ============================================================================

/// Log level for FFI callback
#[derive(Debug, Clone, Copy, uniffi::Enum)]
pub enum FfiLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<log::Level> for FfiLogLevel {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Error => FfiLogLevel::Error,
            log::Level::Warn => FfiLogLevel::Warn,
            log::Level::Info => FfiLogLevel::Info,
            log::Level::Debug => FfiLogLevel::Debug,
            log::Level::Trace => FfiLogLevel::Trace,
        }
    }
}

impl From<FfiLogLevel> for log::Level {
    fn from(level: FfiLogLevel) -> Self {
        match level {
            FfiLogLevel::Error => log::Level::Error,
            FfiLogLevel::Warn => log::Level::Warn,
            FfiLogLevel::Info => log::Level::Info,
            FfiLogLevel::Debug => log::Level::Debug,
            FfiLogLevel::Trace => log::Level::Trace,
        }
    }
}

/// Callback interface for receiving log messages from Rust
///
/// Kotlin should implement this using android.util.Log so engine logs land
/// in logcat.
#[uniffi::export(callback_interface)]
pub trait LogCallback: Send + Sync {
    /// Called when a log message is emitted
    ///
    /// # Arguments
    /// * `level` - The log level (error, warn, info, debug, trace)
    /// * `target` - The logging target (typically module path, e.g., "mailcore::session")
    /// * `message` - The log message
    fn on_log(&self, level: FfiLogLevel, target: String, message: String);
}
