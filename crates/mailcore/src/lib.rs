//! Mailbox session core - local-first mailbox engine for mail clients
//!
//! This crate provides the platform-independent session layer of a mail
//! client:
//! - Session management (one signed-in user, swap on sign-in/sign-out)
//! - Mailbox handles scoped to one label, with local-first mutations
//! - Cursor-based pagination over conversation lists
//! - Live-query watchers (unit "changed" callbacks, consumers re-pull)
//! - A pending-action queue that replays mutations against the remote side
//! - Coarse data-source invalidation for cache layers
//!
//! This crate has zero UI dependencies and exports its API surface to
//! Kotlin/Swift through UniFFI (see [`ffi`]).

pub mod config;
pub mod error;
pub mod ffi;
pub mod invalidation;
pub mod mailbox;
pub mod models;
pub mod pager;
pub mod pending;
pub mod session;
pub mod storage;
pub mod watch;

pub use config::EngineConfig;
pub use error::{MailboxError, SessionError};
pub use invalidation::{DataSource, InvalidationCallback, InvalidationSubscription, InvalidationTracker};
pub use mailbox::MailboxHandle;
pub use models::{
    is_system_label, ConversationDraft, EmailAddress, Label, LabelId, LocalConversation,
    LocalConversationId, LocalLabelId, LocalMessage, LocalMessageId, MessageDraft, UserId,
};
pub use pager::{PageKey, PageToLoad, Paginator};
pub use pending::{
    ActionKind, DeadLetter, NoopRemoteBackend, PendingAction, PendingExecutor, RemoteBackend,
    RetryPolicy,
};
pub use session::{SessionManager, SessionObserver, SessionObserverHandle, UserSession};
pub use storage::{InMemoryMailboxStore, MailboxStore, PageCursor, SqliteMailboxStore};
pub use watch::{
    ChangeCallback, ConversationListWatcher, ConversationWatcher, WatchHandle, WatchKey,
    WatcherRegistry,
};

uniffi::setup_scaffolding!();
