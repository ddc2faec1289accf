//! Conversation threads owned by a single identity

mod store;
mod thread;

pub use store::{ConversationStore, ThreadSummary};
pub use thread::{
    ConversationThread, Message, Role, TITLE_MAX_CHARS, ThreadId, UNTITLED, derive_title,
};
