//! Live-query watchers
//!
//! Split between the registry (who is watching what, and fan-out on
//! mutation) and the view-facing watcher types that pair a registration
//! with a pull path back into storage.

mod registry;
mod views;

pub use registry::{ChangeCallback, WatchHandle, WatchKey, WatcherRegistry};
pub use views::{ConversationListWatcher, ConversationWatcher};
