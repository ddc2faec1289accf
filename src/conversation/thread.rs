//! Conversation threads and their messages

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum title length in characters before truncation
pub const TITLE_MAX_CHARS: usize = 50;

/// Marker appended to truncated titles
pub const TITLE_ELLIPSIS: &str = "...";

/// Title shown for threads without a user message yet
pub const UNTITLED: &str = "New Chat";

/// Opaque thread identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadId(String);

impl ThreadId {
    /// Allocate a fresh random identifier
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Borrow the identifier as a string
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ThreadId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ThreadId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The signed-in person
    User,
    /// The generative backend
    Assistant,
}

/// One turn of a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Author
    pub role: Role,
    /// Message body
    pub text: String,
    /// Wall-clock time of the append (informational; order is positional)
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a message stamped with the current time
    #[must_use]
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// An ordered, independently addressable sequence of turns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationThread {
    /// Identifier
    pub id: ThreadId,
    /// Title derived from the first user message
    #[serde(default)]
    title: Option<String>,
    /// Messages in append order
    #[serde(default)]
    messages: Vec<Message>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl ConversationThread {
    /// Create an empty thread with a fresh id
    #[must_use]
    pub fn new() -> Self {
        Self::with_id(ThreadId::generate())
    }

    pub(crate) fn with_id(id: ThreadId) -> Self {
        Self {
            id,
            title: None,
            messages: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Title for display ("New Chat" until the first user message)
    #[must_use]
    pub fn title(&self) -> &str {
        self.title.as_deref().unwrap_or(UNTITLED)
    }

    /// Whether a title has been derived yet
    #[must_use]
    pub fn has_title(&self) -> bool {
        self.title.is_some()
    }

    /// Messages in append order
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Whether the thread holds no messages
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Number of messages
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Time of the newest message, or creation time when empty
    #[must_use]
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.messages
            .last()
            .map_or(self.created_at, |m| m.timestamp)
    }

    /// The last `n` messages, oldest first
    #[must_use]
    pub fn recent(&self, n: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(n);
        &self.messages[start..]
    }

    /// Append a message; the first user message fixes the title
    pub(crate) fn push(&mut self, message: Message) {
        if self.title.is_none() && message.role == Role::User {
            self.title = Some(derive_title(&message.text));
        }
        self.messages.push(message);
    }

    /// Remove the tail message
    ///
    /// The title is dropped again once no user message remains, so a
    /// rolled-back first message does not name the thread.
    pub(crate) fn pop(&mut self) -> Option<Message> {
        let popped = self.messages.pop()?;
        if !self.messages.iter().any(|m| m.role == Role::User) {
            self.title = None;
        }
        Some(popped)
    }

    /// Empty the thread in place, keeping its id
    pub(crate) fn clear(&mut self) {
        self.messages.clear();
        self.title = None;
    }

    /// Make sure the title reflects the first user message
    pub(crate) fn checkpoint(&mut self) {
        if self.title.is_none() {
            self.title = self
                .messages
                .iter()
                .find(|m| m.role == Role::User)
                .map(|m| derive_title(&m.text));
        }
    }
}

impl Default for ConversationThread {
    fn default() -> Self {
        Self::new()
    }
}

/// Derive a thread title from message text
///
/// Counts characters, not bytes, so multi-byte text never splits mid-glyph.
#[must_use]
pub fn derive_title(text: &str) -> String {
    let text = text.trim();
    if text.chars().count() > TITLE_MAX_CHARS {
        let head: String = text.chars().take(TITLE_MAX_CHARS).collect();
        format!("{head}{TITLE_ELLIPSIS}")
    } else {
        text.to_string()
    }
}
