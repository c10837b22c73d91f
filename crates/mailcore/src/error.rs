//! Error taxonomy for the engine
//!
//! Two families mirror the two scopes an operation can fail in: the session
//! (store open, sign-in bookkeeping) and a mailbox handle (mutations and
//! queries against one label). Both are typed so callers can decide what to
//! surface; the FFI boundary converts them to its own error enum and the
//! mutation entry points there log-and-swallow instead of throwing.

use thiserror::Error;

/// Failures scoped to the session layer
#[derive(Debug, Error)]
pub enum SessionError {
    /// No user is currently signed in
    #[error("no active session")]
    NotSignedIn,

    /// The underlying store failed
    #[error("session storage failure: {0}")]
    Storage(#[from] anyhow::Error),
}

/// Failures scoped to a mailbox handle operation
#[derive(Debug, Error)]
pub enum MailboxError {
    /// The underlying store failed
    #[error("mailbox storage failure: {0}")]
    Storage(#[from] anyhow::Error),

    /// A label id could not be resolved
    #[error("unknown label: {0}")]
    UnknownLabel(String),

    /// The handle was disconnected by a mailbox switch or sign-out
    #[error("mailbox handle disconnected")]
    Disconnected,
}
