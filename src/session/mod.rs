//! Identity sessions
//!
//! An [`IdentitySession`] is the handle for one authenticated visit. All
//! sessions of the same identity share one user record behind a single
//! async mutex, so conversation mutations for an identity are serialized
//! while different identities never contend.

mod registry;

pub use registry::{SessionRegistry, Teardown};

use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use rand::Rng;
use tokio::sync::Mutex;

use crate::conversation::ThreadId;
use crate::oauth::IdentityAssertion;
use crate::storage::UserRecord;

/// Random bytes per session handle
const SESSION_ID_BYTES: usize = 32;

/// User record shared by every live session of one identity
pub type SharedRecord = Arc<Mutex<UserRecord>>;

/// The authenticated principal for one visit
#[derive(Debug)]
pub struct IdentitySession {
    id: String,
    assertion: IdentityAssertion,
    created_at: DateTime<Utc>,
    visit: Option<String>,
    record: SharedRecord,
}

impl IdentitySession {
    fn new(assertion: IdentityAssertion, visit: Option<String>, record: SharedRecord) -> Self {
        Self {
            id: generate_session_id(),
            assertion,
            created_at: Utc::now(),
            visit,
            record,
        }
    }

    /// Opaque session handle
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Verified identity
    #[must_use]
    pub fn assertion(&self) -> &IdentityAssertion {
        &self.assertion
    }

    /// Persistence key of the identity
    #[must_use]
    pub fn subject(&self) -> &str {
        self.assertion.subject_email()
    }

    /// When the session was established
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Browser visit the session was established from
    #[must_use]
    pub fn visit(&self) -> Option<&str> {
        self.visit.as_deref()
    }

    /// The identity's user record
    #[must_use]
    pub fn record(&self) -> &SharedRecord {
        &self.record
    }

    /// Currently active thread
    pub async fn active_thread_id(&self) -> Option<ThreadId> {
        self.record
            .lock()
            .await
            .conversations
            .active_thread_id()
            .cloned()
    }
}

fn generate_session_id() -> String {
    let mut bytes = [0u8; SESSION_ID_BYTES];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
