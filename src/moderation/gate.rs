//! Compiled moderation policy

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use super::denylist::{DEFAULT_DENIED_PATTERNS, DEFAULT_DENIED_PHRASES};
use super::{BlockReason, Verdict};
use crate::config::ModerationConfig;
use crate::{Error, Result};

/// Text with no word characters at all
static NON_WORD_ONLY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\W+$").expect("static regex"));

/// Moderation gate compiled from configuration
#[derive(Debug)]
pub struct ModerationGate {
    /// Lowercase denied phrases
    phrases: Vec<String>,
    /// Denied patterns, compiled case-insensitive
    patterns: Vec<Regex>,
    /// Whether to log blocked messages
    log_blocked: bool,
}

impl ModerationGate {
    /// Compile a gate from configuration
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if a configured pattern is not a valid regex.
    pub fn from_config(config: &ModerationConfig) -> Result<Self> {
        let mut phrases = Vec::new();
        let mut patterns = Vec::new();

        if config.use_default_denylist {
            phrases.extend(DEFAULT_DENIED_PHRASES.iter().map(|p| (*p).to_string()));
            for pattern in DEFAULT_DENIED_PATTERNS {
                patterns.push(compile(pattern)?);
            }
        }

        for phrase in &config.deny_phrases {
            let phrase = phrase.trim().to_lowercase();
            if !phrase.is_empty() {
                phrases.push(phrase);
            }
        }

        for pattern in &config.deny_patterns {
            patterns.push(compile(pattern)?);
        }

        debug!(
            phrases = phrases.len(),
            patterns = patterns.len(),
            "Compiled moderation policy"
        );

        Ok(Self {
            phrases,
            patterns,
            log_blocked: config.log_blocked,
        })
    }

    /// Check outgoing text
    ///
    /// Evaluation order, first match wins:
    /// 1. Empty after trimming, or no word characters: `Block(Malformed)`
    /// 2. Matches a denied phrase or pattern: `Block(Policy)`
    /// 3. Otherwise `Allow`
    #[must_use]
    pub fn check(&self, text: &str) -> Verdict {
        let trimmed = text.trim();

        if trimmed.is_empty() || is_non_word_only(trimmed) {
            return self.block(BlockReason::Malformed);
        }

        let lower = trimmed.to_lowercase();

        if self.phrases.iter().any(|p| lower.contains(p.as_str()))
            || self.patterns.iter().any(|re| re.is_match(&lower))
        {
            return self.block(BlockReason::Policy);
        }

        Verdict::Allow
    }

    fn block(&self, reason: BlockReason) -> Verdict {
        // Reason only: the text itself is user content
        if self.log_blocked {
            warn!(reason = %reason, "Message blocked by moderation policy");
        }
        Verdict::Block(reason)
    }
}

fn is_non_word_only(text: &str) -> bool {
    NON_WORD_ONLY.is_match(text)
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(&format!("(?i){pattern}"))
        .map_err(|e| Error::Config(format!("Invalid moderation pattern '{pattern}': {e}")))
}
