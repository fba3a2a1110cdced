//! Error types for the storage crate.

use thiserror::Error;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Storage error types.
#[derive(Debug, Error)]
pub enum StorageError {
    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Backend error.
    #[error("Backend error: {0}")]
    Backend(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}

#[cfg(feature = "redb")]
mod redb_conversions {
    use super::StorageError;

    impl From<redb::Error> for StorageError {
        fn from(e: redb::Error) -> Self {
            StorageError::Backend(format!("Redb error: {}", e))
        }
    }

    impl From<redb::TransactionError> for StorageError {
        fn from(e: redb::TransactionError) -> Self {
            StorageError::Backend(format!("Redb transaction error: {}", e))
        }
    }

    impl From<redb::TableError> for StorageError {
        fn from(e: redb::TableError) -> Self {
            StorageError::Backend(format!("Redb table error: {}", e))
        }
    }

    impl From<redb::StorageError> for StorageError {
        fn from(e: redb::StorageError) -> Self {
            StorageError::Backend(format!("Redb storage error: {}", e))
        }
    }

    impl From<redb::CommitError> for StorageError {
        fn from(e: redb::CommitError) -> Self {
            StorageError::Backend(format!("Redb commit error: {}", e))
        }
    }

    impl From<redb::DatabaseError> for StorageError {
        fn from(e: redb::DatabaseError) -> Self {
            StorageError::Backend(format!("Redb database error: {}", e))
        }
    }
}
