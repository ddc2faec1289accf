//! Per-identity set of conversation threads
//!
//! Invariant: `active_thread_id`, when set, always keys an entry in
//! `threads`. Every mutation below preserves it, and a failed operation
//! leaves the store untouched.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::thread::{ConversationThread, Message, Role, ThreadId};
use crate::error::StoreError;

/// Listing entry for a thread
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThreadSummary {
    /// Identifier
    pub id: ThreadId,
    /// Display title
    pub title: String,
    /// Number of messages
    pub message_count: usize,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Time of the newest message
    pub last_activity: DateTime<Utc>,
    /// Whether this is the active thread
    pub active: bool,
}

/// All conversation threads of one identity
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationStore {
    threads: HashMap<ThreadId, ConversationThread>,
    active_thread_id: Option<ThreadId>,
    /// Thread created implicitly by the latest append, if nothing happened since
    #[serde(skip)]
    implicit_thread: Option<ThreadId>,
}

impl PartialEq for ConversationStore {
    fn eq(&self, other: &Self) -> bool {
        self.threads == other.threads && self.active_thread_id == other.active_thread_id
    }
}

impl Eq for ConversationStore {}

impl ConversationStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Identifier of the active thread
    #[must_use]
    pub fn active_thread_id(&self) -> Option<&ThreadId> {
        self.active_thread_id.as_ref()
    }

    /// The active thread
    #[must_use]
    pub fn active_thread(&self) -> Option<&ConversationThread> {
        self.active_thread_id
            .as_ref()
            .and_then(|id| self.threads.get(id))
    }

    /// Look up a thread by id
    #[must_use]
    pub fn thread(&self, id: &ThreadId) -> Option<&ConversationThread> {
        self.threads.get(id)
    }

    /// Number of threads, the active one included
    #[must_use]
    pub fn len(&self) -> usize {
        self.threads.len()
    }

    /// Whether the store holds no threads
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    /// Thread listing, most recently active first
    #[must_use]
    pub fn summaries(&self) -> Vec<ThreadSummary> {
        let mut summaries: Vec<ThreadSummary> = self
            .threads
            .values()
            .map(|t| ThreadSummary {
                id: t.id.clone(),
                title: t.title().to_string(),
                message_count: t.len(),
                created_at: t.created_at,
                last_activity: t.last_activity(),
                active: self.active_thread_id.as_ref() == Some(&t.id),
            })
            .collect();
        summaries.sort_by(|a, b| {
            b.last_activity
                .cmp(&a.last_activity)
                .then_with(|| a.id.cmp(&b.id))
        });
        summaries
    }

    /// The last `n` messages of the active thread
    #[must_use]
    pub fn recent_context(&self, n: usize) -> &[Message] {
        self.active_thread().map_or(&[], |t| t.recent(n))
    }

    /// Checkpoint the active thread and start a new empty one
    pub fn create_thread(&mut self) -> ThreadId {
        self.implicit_thread = None;
        self.checkpoint_active();

        let thread = ConversationThread::new();
        let id = thread.id.clone();
        self.threads.insert(id.clone(), thread);
        self.active_thread_id = Some(id.clone());

        debug!(thread = %id, "Created conversation thread");
        id
    }

    /// Make `id` the active thread
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` without touching the store when
    /// `id` is unknown.
    pub fn switch_thread(&mut self, id: &ThreadId) -> Result<(), StoreError> {
        if !self.threads.contains_key(id) {
            return Err(StoreError::NotFound(id.clone()));
        }
        if self.active_thread_id.as_ref() == Some(id) {
            return Ok(());
        }

        self.implicit_thread = None;
        self.checkpoint_active();
        self.active_thread_id = Some(id.clone());

        debug!(thread = %id, "Switched conversation thread");
        Ok(())
    }

    /// Append to the active thread, creating one when none is active
    pub fn append_message(&mut self, role: Role, text: impl Into<String>) -> &Message {
        let id = match self.active_thread_id.clone() {
            Some(id) => {
                self.implicit_thread = None;
                id
            }
            None => {
                let id = self.create_thread();
                self.implicit_thread = Some(id.clone());
                id
            }
        };
        let thread = self
            .threads
            .entry(id)
            .or_insert_with_key(|id| ConversationThread::with_id(id.clone()));
        thread.push(Message::new(role, text));
        &thread.messages()[thread.len() - 1]
    }

    /// Remove the most recently appended message of the active thread
    ///
    /// A thread that was created implicitly by the matching append is
    /// removed again, so undo exactly reverses that append.
    pub fn undo_last_append(&mut self) -> Option<Message> {
        let id = self.active_thread_id.clone()?;
        let thread = self.threads.get_mut(&id)?;
        let popped = thread.pop()?;
        if thread.is_empty() && self.implicit_thread.as_ref() == Some(&id) {
            self.threads.remove(&id);
            self.active_thread_id = None;
        }
        self.implicit_thread = None;
        debug!(thread = %id, role = ?popped.role, "Rolled back last message");
        Some(popped)
    }

    /// Empty the active thread in place
    ///
    /// Returns `false` when no thread is active.
    pub fn clear_active(&mut self) -> bool {
        let Some(thread) = self
            .active_thread_id
            .as_ref()
            .and_then(|id| self.threads.get_mut(id))
        else {
            return false;
        };
        thread.clear();
        self.implicit_thread = None;
        true
    }

    /// Restore the active-thread invariant after loading a stored copy
    ///
    /// A dangling active id falls back to the most recently used thread.
    pub(crate) fn repair(&mut self) {
        let dangling = self
            .active_thread_id
            .as_ref()
            .is_some_and(|id| !self.threads.contains_key(id));
        if dangling || self.active_thread_id.is_none() {
            self.active_thread_id = self
                .threads
                .values()
                .max_by_key(|t| t.last_activity())
                .map(|t| t.id.clone());
        }
        // Stored ids are the map keys; keep the embedded copies in sync
        for (id, thread) in &mut self.threads {
            if &thread.id != id {
                thread.id = id.clone();
            }
        }
    }

    /// Finalize the active thread before leaving it
    ///
    /// Empty threads are discarded instead of being kept as blank entries.
    fn checkpoint_active(&mut self) {
        let Some(id) = self.active_thread_id.take() else {
            return;
        };
        match self.threads.get_mut(&id) {
            Some(thread) if thread.is_empty() => {
                self.threads.remove(&id);
                debug!(thread = %id, "Discarded empty thread");
            }
            Some(thread) => thread.checkpoint(),
            None => {}
        }
    }
}
