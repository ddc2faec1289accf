//! Pluggable persistence for per-identity user records
//!
//! A record bundles the conversation store with profile attributes and is
//! saved as one JSON blob keyed by the subject email. Backends only move
//! bytes; decoding, and the fallback for missing or corrupt blobs, lives
//! here so every backend tolerates them the same way.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{StorageBackend, StorageConfig};
use crate::conversation::ConversationStore;
use crate::error::StoreError;
use crate::Result;

/// Current record layout version
pub const RECORD_VERSION: u32 = 1;

/// Key-value persistence keyed by identity subject
pub trait Persistence: Send + Sync {
    /// Load the blob stored for `subject`, `None` on first login
    ///
    /// # Errors
    ///
    /// Returns `StoreError::PersistFailed` when the backend cannot be read.
    fn load(&self, subject: &str) -> std::result::Result<Option<Vec<u8>>, StoreError>;

    /// Replace the blob stored for `subject`
    ///
    /// # Errors
    ///
    /// Returns `StoreError::PersistFailed` when the backend cannot be written.
    fn save(&self, subject: &str, blob: &[u8]) -> std::result::Result<(), StoreError>;
}

/// Profile attributes kept alongside the conversations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    /// Name shown in the UI
    pub display_name: String,
    /// Avatar picture URL
    pub avatar_ref: Option<String>,
    /// Declared career stage (e.g. "returning after a break")
    pub career_stage: String,
    /// Declared interests
    pub interests: Vec<String>,
}

/// Everything persisted for one identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserRecord {
    /// Layout version
    pub version: u32,
    /// Profile attributes
    pub profile: Profile,
    /// Conversation threads and active thread id
    pub conversations: ConversationStore,
    /// Last save time
    pub last_updated: Option<DateTime<Utc>>,
}

impl Default for UserRecord {
    fn default() -> Self {
        Self {
            version: RECORD_VERSION,
            profile: Profile::default(),
            conversations: ConversationStore::default(),
            last_updated: None,
        }
    }
}

impl UserRecord {
    /// Decode a stored blob
    ///
    /// Missing fields take their defaults; a blob that is not a record at
    /// all yields an empty record instead of an error.
    #[must_use]
    pub fn decode(subject: &str, blob: &[u8]) -> Self {
        match serde_json::from_slice::<Self>(blob) {
            Ok(mut record) => {
                record.conversations.repair();
                record
            }
            Err(e) => {
                warn!(subject = %subject, error = %e, "Stored user record is corrupt, starting empty");
                Self::default()
            }
        }
    }

    /// Encode for storage
    ///
    /// # Errors
    ///
    /// Returns `StoreError::PersistFailed` if serialization fails.
    pub fn encode(&self) -> std::result::Result<Vec<u8>, StoreError> {
        serde_json::to_vec_pretty(self)
            .map_err(|e| StoreError::PersistFailed(format!("Failed to serialize record: {e}")))
    }
}

/// Load the record for `subject`, falling back to an empty one
///
/// Read failures are logged and treated like a first login so a broken
/// backend never prevents sign-in.
pub fn load_record(persistence: &dyn Persistence, subject: &str) -> UserRecord {
    match persistence.load(subject) {
        Ok(Some(blob)) => UserRecord::decode(subject, &blob),
        Ok(None) => {
            debug!(subject = %subject, "No stored user record");
            UserRecord::default()
        }
        Err(e) => {
            warn!(subject = %subject, error = %e, "Failed to load user record");
            UserRecord::default()
        }
    }
}

/// Stamp and save the record for `subject`
///
/// # Errors
///
/// Returns `StoreError::PersistFailed` if encoding or the backend fails.
pub fn save_record(
    persistence: &dyn Persistence,
    subject: &str,
    record: &mut UserRecord,
) -> std::result::Result<(), StoreError> {
    record.version = RECORD_VERSION;
    record.last_updated = Some(Utc::now());
    let blob = record.encode()?;
    persistence.save(subject, &blob)
}

/// Build the configured persistence backend
///
/// # Errors
///
/// Returns an error if the file backend directory cannot be created.
pub fn from_config(config: &StorageConfig) -> Result<Arc<dyn Persistence>> {
    match config.backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StorageBackend::File => {
            let store = match &config.directory {
                Some(dir) => FileStore::new(dir.clone())?,
                None => FileStore::default_location()?,
            };
            Ok(Arc::new(store))
        }
    }
}
