//! Error types for siltdb CRDT primitives.

use thiserror::Error;

/// Result type for CRDT operations.
pub type CrdtResult<T> = Result<T, CrdtError>;

/// Errors that can occur in the CRDT layer.
#[derive(Debug, Error)]
pub enum CrdtError {
    /// An update could not be encoded.
    #[error("update encode failed: {message}")]
    UpdateEncode {
        /// Description of the failure.
        message: String,
    },

    /// Received update bytes are malformed.
    #[error("update decode failed: {message}")]
    UpdateDecode {
        /// Description of the failure.
        message: String,
    },
}

impl CrdtError {
    /// Creates an update encode error.
    pub fn update_encode(message: impl Into<String>) -> Self {
        Self::UpdateEncode {
            message: message.into(),
        }
    }

    /// Creates an update decode error.
    pub fn update_decode(message: impl Into<String>) -> Self {
        Self::UpdateDecode {
            message: message.into(),
        }
    }
}
