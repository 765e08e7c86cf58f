//! Conversation state: the locked event store and its lifecycle.

mod conversation;
mod execution;
mod restore;
mod subscribers;

pub use conversation::ConversationState;
pub use restore::{check_tool_compatibility, check_tools};
pub use subscribers::{EventCallback, SubscriptionId};
