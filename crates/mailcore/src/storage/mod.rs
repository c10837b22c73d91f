//! Mailbox storage backends
//!
//! All engine components talk to storage through the [`MailboxStore`] trait.
//! [`SqliteMailboxStore`] is the production backend; [`InMemoryMailboxStore`]
//! backs tests and ephemeral sessions.

mod memory;
mod sqlite;
mod traits;

pub use memory::InMemoryMailboxStore;
pub use sqlite::SqliteMailboxStore;
pub use traits::{MailboxStore, PageCursor};
