//! Live session table

use std::sync::Arc;

use dashmap::{DashMap, mapref::entry::Entry};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{IdentitySession, SharedRecord};
use crate::error::StoreError;
use crate::oauth::{IdentityAssertion, StateTokenVault};
use crate::storage::{Persistence, UserRecord, load_record, save_record};
use crate::{Error, Result};

/// What logout did
#[derive(Debug, Default)]
pub struct Teardown {
    /// State tokens of the visit that were still outstanding
    pub purged_states: usize,
    /// Set when the final save failed
    pub persist_error: Option<StoreError>,
}

/// Shared record of one identity and how many live sessions hold it
struct LiveRecord {
    record: SharedRecord,
    sessions: usize,
}

/// Table of live sessions
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<IdentitySession>>,
    /// Records of identities with at least one live session
    records: DashMap<String, LiveRecord>,
    persistence: Arc<dyn Persistence>,
    vault: Arc<StateTokenVault>,
}

impl SessionRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new(persistence: Arc<dyn Persistence>, vault: Arc<StateTokenVault>) -> Self {
        Self {
            sessions: DashMap::new(),
            records: DashMap::new(),
            persistence,
            vault,
        }
    }

    /// Number of live sessions
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session is live
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Establish a session for a verified identity
    ///
    /// Reuses the in-memory record of another live session of the same
    /// identity; otherwise the record is loaded from persistence, or
    /// started empty on first login. The active thread is the stored
    /// active thread, else the most recently used one, else none.
    pub fn establish(
        &self,
        assertion: IdentityAssertion,
        visit: Option<String>,
    ) -> Arc<IdentitySession> {
        // The count is taken under the entry lock so teardown can never
        // drop a record that a session is being attached to
        let record = {
            let mut live = self
                .records
                .entry(assertion.subject_email().to_string())
                .or_insert_with(|| {
                    let mut record =
                        load_record(self.persistence.as_ref(), assertion.subject_email());
                    record.profile.display_name = assertion.display_name().to_string();
                    if let Some(avatar) = assertion.avatar_ref() {
                        record.profile.avatar_ref = Some(avatar.to_string());
                    }
                    LiveRecord {
                        record: Arc::new(Mutex::new(record)),
                        sessions: 0,
                    }
                });
            live.sessions += 1;
            Arc::clone(&live.record)
        };

        let session = Arc::new(IdentitySession::new(assertion, visit, record));
        self.sessions
            .insert(session.id().to_string(), Arc::clone(&session));

        info!(
            subject = %session.subject(),
            live_sessions = self.sessions.len(),
            "Identity session established"
        );
        session
    }

    /// Look up a live session
    ///
    /// # Errors
    ///
    /// Returns `Error::SessionNotFound` for an unknown or ended session.
    pub fn get(&self, id: &str) -> Result<Arc<IdentitySession>> {
        self.sessions
            .get(id)
            .map(|s| Arc::clone(s.value()))
            .ok_or_else(|| Error::SessionNotFound(id.to_string()))
    }

    /// Save a session's record
    ///
    /// The caller holds the record lock and passes the guarded value in.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::PersistFailed` if the backend rejects the write.
    pub fn persist(
        &self,
        session: &IdentitySession,
        record: &mut UserRecord,
    ) -> std::result::Result<(), StoreError> {
        save_record(self.persistence.as_ref(), session.subject(), record).inspect_err(|e| {
            warn!(subject = %session.subject(), error = %e, "Failed to persist user record");
        })
    }

    /// End a session
    ///
    /// Discards the session, persists the record, and purges any state
    /// tokens still outstanding for its visit. A failed save is reported
    /// in the result but does not keep the session alive.
    ///
    /// # Errors
    ///
    /// Returns `Error::SessionNotFound` for an unknown session.
    pub async fn teardown(&self, id: &str) -> Result<Teardown> {
        let (_, session) = self
            .sessions
            .remove(id)
            .ok_or_else(|| Error::SessionNotFound(id.to_string()))?;

        let persist_error = {
            let mut record = session.record().lock().await;
            self.persist(&session, &mut record).err()
        };

        if let Entry::Occupied(mut live) = self.records.entry(session.subject().to_string()) {
            let remaining = live.get().sessions.saturating_sub(1);
            if remaining == 0 {
                live.remove();
            } else {
                live.get_mut().sessions = remaining;
            }
        }

        let purged_states = session
            .visit()
            .map_or(0, |visit| self.vault.purge_visit(visit));

        debug!(purged_states, "Purged visit state tokens");
        info!(subject = %session.subject(), "Identity session ended");

        Ok(Teardown {
            purged_states,
            persist_error,
        })
    }
}
