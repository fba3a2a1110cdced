//! Key-value persistence for learned device profiles.
//!
//! The learning engine never talks to a database directly. It writes opaque
//! byte values into named tables through [`StorageBackend`], so the same
//! engine runs against an embedded redb file on a gateway or an in-memory
//! map in tests.
//!
//! ## Features
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `redb` | ✅ | Persistent redb backend |
//! | `memory` | ✅ | Volatile in-memory backend |

pub mod backends;
pub mod error;

use std::sync::Arc;

pub use backends::{available_backends, create_backend};
pub use error::{Result, StorageError};

#[cfg(feature = "memory")]
pub use backends::{MemoryBackend, MemoryBackendConfig};
#[cfg(feature = "redb")]
pub use backends::{RedbBackend, RedbBackendConfig};

/// Core storage backend trait.
///
/// Implementations must be safe to share between the learning controller and
/// its timer tasks.
pub trait StorageBackend: Send + Sync {
    /// Write a value to a key in the specified table, replacing any previous value.
    fn write(&self, table: &str, key: &str, value: &[u8]) -> Result<()>;

    /// Read a value by key from the specified table.
    fn read(&self, table: &str, key: &str) -> Result<Option<Vec<u8>>>;

    /// Delete a key from the specified table. Returns whether a value existed.
    fn delete(&self, table: &str, key: &str) -> Result<bool>;

    /// Scan keys with a given prefix in the specified table.
    fn scan(&self, table: &str, prefix: &str) -> Result<Vec<(String, Vec<u8>)>>;

    /// Check if this backend survives a process restart.
    fn is_persistent(&self) -> bool;
}

/// Shared handle to a storage backend.
pub type SharedBackend = Arc<dyn StorageBackend>;

/// Write a value as JSON.
pub fn write_json<T: serde::Serialize>(
    backend: &dyn StorageBackend,
    table: &str,
    key: &str,
    value: &T,
) -> Result<()> {
    let bytes = serde_json::to_vec(value)?;
    backend.write(table, key, &bytes)
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
