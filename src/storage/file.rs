//! File-backed persistence
//!
//! One JSON file per identity under a base directory. File names are a
//! hash of the subject so emails never appear on disk as paths.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use super::Persistence;
use crate::error::StoreError;
use crate::{Error, Result};

/// Persistence in a local directory
#[derive(Debug)]
pub struct FileStore {
    /// Base directory for user records
    base_dir: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `base_dir`, creating it if needed
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn new(base_dir: PathBuf) -> Result<Self> {
        if !base_dir.exists() {
            fs::create_dir_all(&base_dir)
                .map_err(|e| Error::Internal(format!("Failed to create user data dir: {e}")))?;
        }

        Ok(Self { base_dir })
    }

    /// Create a store in the default location (~/.asha/users)
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory is unknown or not writable.
    pub fn default_location() -> Result<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Internal("Cannot determine home directory".to_string()))?;

        Self::new(home.join(".asha").join("users"))
    }

    /// Generate a storage key for a subject
    fn storage_key(subject: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(subject.as_bytes());
        let hash = hex::encode(hasher.finalize());
        hash[..32].to_string()
    }

    /// Get the file path for a subject's record
    fn record_path(&self, subject: &str) -> PathBuf {
        let key = Self::storage_key(subject);
        self.base_dir.join(format!("{key}.json"))
    }
}

impl Persistence for FileStore {
    fn load(&self, subject: &str) -> std::result::Result<Option<Vec<u8>>, StoreError> {
        let path = self.record_path(subject);

        if !path.exists() {
            debug!(subject = %subject, "No stored record file");
            return Ok(None);
        }

        fs::read(&path).map(Some).map_err(|e| {
            warn!(subject = %subject, error = %e, "Failed to read record file");
            StoreError::PersistFailed(format!("Failed to read record file: {e}"))
        })
    }

    fn save(&self, subject: &str, blob: &[u8]) -> std::result::Result<(), StoreError> {
        let path = self.record_path(subject);
        let tmp_path = path.with_extension("json.tmp");

        // Write-then-rename so a crash never leaves a half-written record
        let write = || -> std::io::Result<()> {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(blob)?;
            file.sync_all()?;

            // Set restrictive permissions (owner read/write only)
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let perms = fs::Permissions::from_mode(0o600);
                let _ = fs::set_permissions(&tmp_path, perms);
            }

            fs::rename(&tmp_path, &path)
        };

        write().map_err(|e| {
            warn!(subject = %subject, error = %e, "Failed to write record file");
            StoreError::PersistFailed(format!("Failed to write record file: {e}"))
        })?;

        info!(subject = %subject, bytes = blob.len(), "Saved user record");
        Ok(())
    }
}
