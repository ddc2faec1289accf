//! Moderation of outgoing user text
//!
//! The gate is a pure function of the text and a policy table compiled
//! once from configuration. It never calls the network and never touches
//! the conversation store, so it can run before anything is appended.

mod denylist;
mod gate;

pub use gate::ModerationGate;

use serde::Serialize;

/// Why a message was blocked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    /// Empty or made only of punctuation and symbols
    Malformed,
    /// Matches the topic denylist
    Policy,
}

impl BlockReason {
    /// Fixed user-facing refusal for this reason
    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            Self::Malformed => {
                "I didn't quite catch that. Could you please ask a career-related question?"
            }
            Self::Policy => {
                "I'm Asha, your career guidance assistant. I focus on career development, \
                 skill building, resumes and interviews, scholarships, and industry insights. \
                 I don't engage in discussions about gender comparisons, political topics, \
                 or personal relationships. What career goal can I help you with today?"
            }
        }
    }

    /// Stable short name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::Policy => "policy",
        }
    }
}

impl std::fmt::Display for BlockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a moderation check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Text may be sent to the backend
    Allow,
    /// Text must not be stored or sent
    Block(BlockReason),
}
