//! Redb storage backend implementation.
//!
//! All tables share one redb table; logical tables are namespaced into the
//! key as `table:key`, so scanning a logical table is a range scan.

use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use redb::backends::InMemoryBackend;
use redb::{Database, TableDefinition, TableError};

use crate::{Result, StorageBackend};

const UNIFIED_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("caplearn");

const DEFAULT_CACHE_CAPACITY: usize = 256;

/// Path value that selects a volatile redb database.
pub const MEMORY_PATH: &str = ":memory:";

/// Configuration for RedbBackend.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct RedbBackendConfig {
    /// Path to the database file, or `:memory:`.
    pub path: String,

    /// Create parent directories if they don't exist.
    #[serde(default = "default_create_dirs")]
    pub create_dirs: bool,

    /// LRU read cache capacity. 0 disables caching.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

fn default_create_dirs() -> bool {
    true
}

fn default_cache_capacity() -> usize {
    DEFAULT_CACHE_CAPACITY
}

impl RedbBackendConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            create_dirs: true,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }

    pub fn with_create_dirs(mut self, create_dirs: bool) -> Self {
        self.create_dirs = create_dirs;
        self
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Config for a volatile database held entirely in memory.
    pub fn memory() -> Self {
        Self {
            path: MEMORY_PATH.to_string(),
            create_dirs: false,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

fn make_key(table: &str, key: &str) -> String {
    let mut result = String::with_capacity(table.len() + key.len() + 1);
    result.push_str(table);
    result.push(':');
    result.push_str(key);
    result
}

/// redb-backed persistent storage with a write-through LRU read cache.
pub struct RedbBackend {
    db: Arc<Database>,
    path: String,
    cache: Option<Mutex<LruCache<String, Vec<u8>>>>,
}

impl RedbBackend {
    pub fn new(config: RedbBackendConfig) -> Result<Self> {
        let db = if config.path == MEMORY_PATH {
            Database::builder().create_with_backend(InMemoryBackend::new())?
        } else {
            let path = Path::new(&config.path);
            if config.create_dirs {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
            }
            Database::create(path)?
        };

        let cache = NonZeroUsize::new(config.cache_capacity).map(|cap| Mutex::new(LruCache::new(cap)));

        tracing::debug!(path = %config.path, "Opened redb profile storage");

        Ok(Self {
            db: Arc::new(db),
            path: config.path,
            cache,
        })
    }

    /// Open or create a redb backend at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::new(RedbBackendConfig::new(
            path.as_ref().to_string_lossy().to_string(),
        ))
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn cache_put(&self, key: String, value: Vec<u8>) {
        if let Some(cache) = &self.cache {
            cache.lock().put(key, value);
        }
    }

    fn cache_get(&self, key: &str) -> Option<Vec<u8>> {
        self.cache.as_ref().and_then(|c| c.lock().get(key).cloned())
    }

    fn cache_pop(&self, key: &str) {
        if let Some(cache) = &self.cache {
            cache.lock().pop(key);
        }
    }
}

impl StorageBackend for RedbBackend {
    fn write(&self, table: &str, key: &str, value: &[u8]) -> Result<()> {
        let namespaced = make_key(table, key);

        let txn = self.db.begin_write()?;
        {
            let mut t = txn.open_table(UNIFIED_TABLE)?;
            t.insert(namespaced.as_str(), value)?;
        }
        txn.commit()?;

        // Only cache after the commit succeeded
        self.cache_put(namespaced, value.to_vec());
        Ok(())
    }

    fn read(&self, table: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let namespaced = make_key(table, key);

        if let Some(cached) = self.cache_get(&namespaced) {
            return Ok(Some(cached));
        }

        let txn = self.db.begin_read()?;
        let t = match txn.open_table(UNIFIED_TABLE) {
            Ok(t) => t,
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let found = t.get(namespaced.as_str())?.map(|v| v.value().to_vec());
        if let Some(data) = &found {
            self.cache_put(namespaced, data.clone());
        }
        Ok(found)
    }

    fn delete(&self, table: &str, key: &str) -> Result<bool> {
        let namespaced = make_key(table, key);
        self.cache_pop(&namespaced);

        let txn = self.db.begin_write()?;
        let removed = {
            let mut t = txn.open_table(UNIFIED_TABLE)?;
            let previous = t.remove(namespaced.as_str())?;
            previous.is_some()
        };
        txn.commit()?;
        Ok(removed)
    }

    fn scan(&self, table: &str, prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
        let table_prefix = make_key(table, prefix);
        let strip = table.len() + 1;

        let txn = self.db.begin_read()?;
        let t = match txn.open_table(UNIFIED_TABLE) {
            Ok(t) => t,
            Err(TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut results = Vec::new();
        for item in t.range(table_prefix.as_str()..)? {
            let (key, value) = item?;
            let key = key.value();
            if !key.starts_with(&table_prefix) {
                break;
            }
            results.push((key[strip..].to_string(), value.value().to_vec()));
        }
        Ok(results)
    }

    fn is_persistent(&self) -> bool {
        self.path != MEMORY_PATH
    }
}

impl std::fmt::Debug for RedbBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbBackend")
            .field("path", &self.path)
            .field("cached", &self.cache.is_some())
            .finish()
    }
}
