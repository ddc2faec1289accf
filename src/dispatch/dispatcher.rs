//! Response dispatcher

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::knowledge::lookup_topic;
use super::{DEFAULT_SYSTEM_INSTRUCTION, GenerativeBackend, Prompt};
use crate::config::DispatchConfig;
use crate::conversation::Message;
use crate::error::DispatchError;
use crate::failsafe::{BackendHealth, HealthTracker, RetryPolicy, with_retry};

/// Sentences kept when a long reply is shortened
const SHAPED_SENTENCES: usize = 4;

/// Appended to a shortened reply
const ELABORATE_OFFER: &str = "Would you like me to elaborate on any specific point?";

/// Sends allowed messages to the backend and classifies the outcome
pub struct ResponseDispatcher {
    backend: Arc<dyn GenerativeBackend>,
    retry: RetryPolicy,
    health: HealthTracker,
    context_messages: usize,
    timeout: Duration,
    max_reply_chars: usize,
    system_instruction: String,
}

impl ResponseDispatcher {
    /// Create a dispatcher for `backend`
    #[must_use]
    pub fn new(backend: Arc<dyn GenerativeBackend>, config: &DispatchConfig) -> Self {
        let health = HealthTracker::new(backend.name());
        Self {
            backend,
            retry: RetryPolicy::new(&config.retry),
            health,
            context_messages: config.context_messages.max(1),
            timeout: config.timeout,
            max_reply_chars: config.max_reply_chars,
            system_instruction: config
                .system_instruction
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_INSTRUCTION.to_string()),
        }
    }

    /// How many recent messages are sent as context
    #[must_use]
    pub fn context_messages(&self) -> usize {
        self.context_messages
    }

    /// Current backend health
    #[must_use]
    pub fn health(&self) -> BackendHealth {
        self.health.snapshot()
    }

    /// Build the bounded prompt for one send
    #[must_use]
    pub fn prompt(&self, user_text: &str, recent_context: &[Message]) -> Prompt {
        let start = recent_context.len().saturating_sub(self.context_messages);
        Prompt {
            system_instruction: self.system_instruction.clone(),
            history: recent_context[start..].to_vec(),
            user_text: user_text.to_string(),
        }
    }

    /// Send `user_text` with at most N messages of `recent_context`
    ///
    /// Transient failures are retried with backoff, at most three attempts
    /// in total, all inside the configured timeout. An empty or malformed
    /// reply falls back to a canned answer when the question names a
    /// known topic.
    ///
    /// # Errors
    ///
    /// Returns the classified `DispatchError` of the last attempt, or
    /// `ServiceUnavailable` when the timeout elapses.
    pub async fn send(
        &self,
        user_text: &str,
        recent_context: &[Message],
    ) -> Result<String, DispatchError> {
        let prompt = self.prompt(user_text, recent_context);
        let started = Instant::now();

        let outcome = tokio::time::timeout(
            self.timeout,
            with_retry(&self.retry, self.backend.name(), || {
                self.backend.generate(&prompt)
            }),
        )
        .await
        .unwrap_or_else(|_| {
            Err(DispatchError::ServiceUnavailable(format!(
                "no reply within {}s",
                self.timeout.as_secs()
            )))
        });

        let reply = match outcome {
            Ok(reply) => {
                self.health.record_success(started.elapsed());
                reply
            }
            Err(e) => {
                self.health.record_failure(e.kind());
                match (&e, lookup_topic(user_text)) {
                    (DispatchError::Malformed(_), Some(answer)) => {
                        info!("Backend reply unusable, answering from knowledge base");
                        return Ok(answer.to_string());
                    }
                    _ => {
                        warn!(kind = e.kind(), error = %e, "Dispatch failed");
                        return Err(e);
                    }
                }
            }
        };

        debug!(
            latency_ms = started.elapsed().as_millis(),
            chars = reply.chars().count(),
            "Backend replied"
        );

        Ok(shape_reply(reply.trim(), self.max_reply_chars))
    }
}

/// Shorten long replies
///
/// A reply longer than `max_chars` with more than four sentences is cut to
/// its first four sentences followed by an offer to elaborate.
#[must_use]
pub fn shape_reply(reply: &str, max_chars: usize) -> String {
    if reply.chars().count() <= max_chars {
        return reply.to_string();
    }

    let sentences: Vec<&str> = reply.split(". ").collect();
    if sentences.len() <= SHAPED_SENTENCES {
        return reply.to_string();
    }

    format!(
        "{}.\n\n{ELABORATE_OFFER}",
        sentences[..SHAPED_SENTENCES].join(". ")
    )
}
