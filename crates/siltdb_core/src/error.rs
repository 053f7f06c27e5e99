//! Error types for siltdb core.
//!
//! Only unexpected conditions are errors. A read that finds no entry or
//! a row matching no registered schema version is a normal outcome and
//! is returned as data (see `ReadResult`), never as an error.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in siltdb core operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// CRDT layer error.
    #[error("crdt error: {0}")]
    Crdt(#[from] siltdb_crdt::CrdtError),

    /// Stored bytes are structurally corrupt.
    ///
    /// The log itself returned bytes that do not decode as an entry.
    /// This is not self-healing; the caller decides whether to delete
    /// the entry or rebuild from a remote replica.
    #[error("corrupt log entry: {message}")]
    Corrupt {
        /// Description of the corruption.
        message: String,
    },

    /// A value could not be encoded for storage.
    #[error("encode failed: {message}")]
    Codec {
        /// Description of the failure.
        message: String,
    },

    /// The migration function produced output that fails validation
    /// against the latest schema version.
    ///
    /// This indicates a bug in the caller-supplied migration function,
    /// not a normal data condition.
    #[error("migration failed: {message}")]
    MigrationFailed {
        /// Description of the failure.
        message: String,
    },

    /// A table row is missing its `id` field.
    #[error("row has no text `id` field")]
    MissingId,

    /// A store was built with no registered schema versions.
    #[error("store requires at least one schema version")]
    NoVersions,
}

impl StoreError {
    /// Creates a corrupt-entry error.
    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::Corrupt {
            message: message.into(),
        }
    }

    /// Creates a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Creates a migration failure error.
    pub fn migration_failed(message: impl Into<String>) -> Self {
        Self::MigrationFailed {
            message: message.into(),
        }
    }
}
