//! CSRF state token vault
//!
//! Process-wide table of outstanding OAuth `state` values. Every token is
//! single use: validation removes it from the table whether it succeeds or
//! not, so a replayed or expired value can never be accepted twice.

use std::time::{Duration, Instant};

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rand::Rng;
use tracing::{debug, warn};

use crate::error::StateError;

/// Random bytes per token (256 bits)
const STATE_BYTES: usize = 32;

/// An issued CSRF state token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateToken {
    /// Opaque random value sent as the `state` query parameter
    pub value: String,
    /// Wall-clock issuance time
    pub issued_at: DateTime<Utc>,
}

/// Server-side record of an outstanding token
#[derive(Debug, Clone)]
struct IssuedState {
    issued: Instant,
    visit: Option<String>,
}

/// Vault of outstanding state tokens
#[derive(Debug)]
pub struct StateTokenVault {
    ttl: Duration,
    tokens: DashMap<String, IssuedState>,
}

impl StateTokenVault {
    /// Create a vault whose tokens expire after `ttl`
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            tokens: DashMap::new(),
        }
    }

    /// Configured time-to-live
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a token not bound to any visit
    pub fn issue(&self) -> StateToken {
        self.issue_inner(None, Instant::now())
    }

    /// Issue a token bound to a browser visit, purged when that visit ends
    pub fn issue_for_visit(&self, visit: &str) -> StateToken {
        self.issue_inner(Some(visit.to_string()), Instant::now())
    }

    fn issue_inner(&self, visit: Option<String>, now: Instant) -> StateToken {
        self.purge_expired_at(now);

        let value = generate_state();
        self.tokens.insert(
            value.clone(),
            IssuedState {
                issued: now,
                visit,
            },
        );
        debug!(outstanding = self.tokens.len(), "Issued OAuth state token");

        StateToken {
            value,
            issued_at: Utc::now(),
        }
    }

    /// Validate and consume a candidate state value
    ///
    /// # Errors
    ///
    /// - `StateError::Unknown` if the value was never issued or was already used
    /// - `StateError::Expired` if the value outlived the TTL (it is consumed too)
    pub fn validate(&self, candidate: &str) -> Result<(), StateError> {
        self.validate_at(candidate, Instant::now())
    }

    pub(crate) fn validate_at(&self, candidate: &str, now: Instant) -> Result<(), StateError> {
        // Removal is the single atomic step; two concurrent validations of
        // the same value cannot both observe it.
        let Some((_, issued)) = self.tokens.remove(candidate) else {
            warn!("Rejected unknown OAuth state");
            return Err(StateError::Unknown);
        };

        if now.saturating_duration_since(issued.issued) > self.ttl {
            warn!("Rejected expired OAuth state");
            return Err(StateError::Expired);
        }

        Ok(())
    }

    /// Drop every token issued for `visit`
    pub fn purge_visit(&self, visit: &str) -> usize {
        let before = self.tokens.len();
        self.tokens
            .retain(|_, issued| issued.visit.as_deref() != Some(visit));
        let purged = before.saturating_sub(self.tokens.len());
        if purged > 0 {
            debug!(purged, "Purged state tokens of ended visit");
        }
        purged
    }

    /// Drop every token older than the TTL
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now())
    }

    fn purge_expired_at(&self, now: Instant) -> usize {
        let before = self.tokens.len();
        let ttl = self.ttl;
        self.tokens
            .retain(|_, issued| now.saturating_duration_since(issued.issued) <= ttl);
        before.saturating_sub(self.tokens.len())
    }

    /// Number of outstanding tokens
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.tokens.len()
    }
}

/// Generate a random state value
fn generate_state() -> String {
    let state_bytes: [u8; STATE_BYTES] = rand::rng().random();
    URL_SAFE_NO_PAD.encode(state_bytes)
}
