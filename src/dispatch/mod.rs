//! Dispatch of allowed messages to the generative backend
//!
//! The backend is a black box behind [`GenerativeBackend`]. The
//! [`ResponseDispatcher`] bounds the context, applies the retry policy and
//! the overall timeout, classifies failures, and shapes the reply.

mod dispatcher;
mod gemini;
mod knowledge;

pub use dispatcher::{ResponseDispatcher, shape_reply};
pub use gemini::GeminiBackend;
pub use knowledge::lookup_topic;

use async_trait::async_trait;

use crate::conversation::Message;
use crate::error::DispatchError;

/// Persona used when no system instruction is configured
pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are Asha, a warm, supportive and practical \
career mentor focused on helping women succeed professionally. Speak like a helpful coach, \
not a formal chatbot: use a friendly tone, address the person as \"you\", and ask a natural \
follow-up question when something is unclear. Keep answers short (two or three paragraphs at \
most) and concrete, with specific tools, websites, communities and free resources. Prefer \
women-focused platforms such as HerKey and JobsForHer for job-related answers. Stay on \
careers, skills, jobs, scholarships and confidence-building.";

/// Everything the backend sees for one call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    /// Persona and behaviour instructions
    pub system_instruction: String,
    /// Bounded recent history, oldest first
    pub history: Vec<Message>,
    /// The new user message
    pub user_text: String,
}

/// A text generation service
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    /// Short name for logs and health reports
    fn name(&self) -> &str;

    /// Generate one reply, classifying any failure
    async fn generate(&self, prompt: &Prompt) -> Result<String, DispatchError>;
}
