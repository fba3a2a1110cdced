//! Error types for the learning engine.

use caplearn_storage::StorageError;
use thiserror::Error;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Learning engine errors.
///
/// None of these are fatal to a session: the controller logs them and keeps
/// running from memory.
#[derive(Debug, Error)]
pub enum Error {
    /// Persistence backend failure.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Stored profile exists but cannot be decoded.
    #[error("Malformed profile for {device}: {reason}")]
    MalformedProfile { device: String, reason: String },

    /// Stored profile was written by a newer format.
    #[error("Unsupported profile version {found} (supported up to {supported})")]
    UnsupportedProfileVersion { found: u32, supported: u32 },

    /// String is not a recognized capability identifier.
    #[error("Unknown capability: {0}")]
    UnknownCapability(String),
}
