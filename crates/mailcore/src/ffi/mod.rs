//! FFI bindings for UniFFI export
//!
//! This module provides Kotlin/Swift bindings for the mailcore crate via
//! UniFFI.
//!
//! ## Usage from Kotlin
//!
//! ```kotlin
//! // Initialize logging first so engine logs reach logcat
//! initializeLogging(callback = LogcatLogger(), maxLevel = FfiLogLevel.DEBUG)
//!
//! // Create the engine and sign in
//! val engine = MailboxEngine(dataDir = context.filesDir.resolve("mail").path)
//! engine.signIn(userId = "user@example.com")
//! engine.switchMailbox(labelId = "INBOX")
//!
//! // Load the first page and watch the list
//! val page = engine.loadPage(
//!     userId = "user@example.com",
//!     key = FfiPageKey(labelId = "INBOX", page = FfiPageToLoad.FIRST),
//! )
//! val watch = engine.watchConversationList("INBOX", limit = 50u, callback = onListChanged)
//!
//! // Local-first mutation; remote catches up in the background
//! engine.markRead(conversationIds = listOf(page.first().id))
//! ```

mod logging;
mod service;
mod types;

// Re-export all FFI types and the MailboxEngine
pub use logging::{init_ffi_logger, initialize_logging, set_log_callback, set_log_level};
pub use service::*;
pub use types::*;
