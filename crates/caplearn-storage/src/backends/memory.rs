//! Volatile in-memory storage backend.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::{Result, StorageBackend, StorageError};

/// Configuration for MemoryBackend.
#[derive(Debug, Clone, Default, serde::Deserialize, serde::Serialize)]
pub struct MemoryBackendConfig {
    /// Maximum number of keys across all tables. `None` means unbounded.
    #[serde(default)]
    pub max_entries: Option<usize>,
}

/// In-memory backend keyed by `(table, key)`.
///
/// Nothing survives the process; used by tests and by hosts that only want
/// session-scoped learning.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: RwLock<BTreeMap<(String, String), Vec<u8>>>,
    max_entries: Option<usize>,
}

impl MemoryBackend {
    pub fn new(config: MemoryBackendConfig) -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            max_entries: config.max_entries,
        }
    }

    /// Number of stored keys across all tables.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl StorageBackend for MemoryBackend {
    fn write(&self, table: &str, key: &str, value: &[u8]) -> Result<()> {
        let mut entries = self.entries.write();
        let slot = (table.to_string(), key.to_string());

        if let Some(limit) = self.max_entries {
            if !entries.contains_key(&slot) && entries.len() >= limit {
                return Err(StorageError::Backend(format!(
                    "Memory backend full ({} entries)",
                    limit
                )));
            }
        }

        entries.insert(slot, value.to_vec());
        Ok(())
    }

    fn read(&self, table: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let entries = self.entries.read();
        Ok(entries.get(&(table.to_string(), key.to_string())).cloned())
    }

    fn delete(&self, table: &str, key: &str) -> Result<bool> {
        let mut entries = self.entries.write();
        Ok(entries.remove(&(table.to_string(), key.to_string())).is_some())
    }

    fn scan(&self, table: &str, prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
        let entries = self.entries.read();
        Ok(entries
            .iter()
            .filter(|((t, k), _)| t == table && k.starts_with(prefix))
            .map(|((_, k), v)| (k.clone(), v.clone()))
            .collect())
    }

    fn is_persistent(&self) -> bool {
        false
    }
}
