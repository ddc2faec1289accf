//! In-process persistence, lost on restart

use dashmap::DashMap;

use super::Persistence;
use crate::error::StoreError;

/// Persistence in a concurrent map
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: DashMap<String, Vec<u8>>,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing is stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Persistence for MemoryStore {
    fn load(&self, subject: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.records.get(subject).map(|blob| blob.value().clone()))
    }

    fn save(&self, subject: &str, blob: &[u8]) -> Result<(), StoreError> {
        self.records.insert(subject.to_string(), blob.to_vec());
        Ok(())
    }
}
