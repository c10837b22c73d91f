//! Domain models for locally-stored mail entities

mod conversation;
mod label;
mod message;
mod user;

pub use conversation::{ConversationDraft, LocalConversation, LocalConversationId};
pub use label::{is_system_label, Label, LabelId, LocalLabelId};
pub use message::{EmailAddress, LocalMessage, LocalMessageId, MessageDraft};
pub use user::UserId;
