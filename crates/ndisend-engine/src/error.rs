//! Error types for the engine.

use ndisend_sdk::SdkError;
use thiserror::Error;

/// Errors surfaced by sender operations.
///
/// Every asynchronous entry point reports these through its
/// [`Operation`](crate::Operation), including input validation failures.
#[derive(Debug, Error)]
pub enum SendError {
    /// Wrong argument shape at the call boundary.
    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),

    /// A required field is absent.
    #[error("Missing required field '{field}'")]
    MissingField { field: &'static str },

    /// A field is present with the wrong type or an out-of-range value.
    #[error("Field '{field}' must be {expected}")]
    InvalidFieldType {
        field: &'static str,
        expected: &'static str,
    },

    /// The buffer field is not a contiguous byte region.
    #[error("Field '{field}' must be provided as a buffer")]
    InvalidBufferType { field: &'static str },

    /// The buffer is shorter than the frame layout requires.
    #[error("Buffer '{field}' holds {actual} bytes but the frame needs {required}")]
    BufferTooSmall {
        field: &'static str,
        required: usize,
        actual: usize,
    },

    /// The native factory returned no sender.
    #[error("Failed to create NDI sender: {0}")]
    CreateFailed(String),

    /// The sender was destroyed explicitly or finalized.
    #[error("NDI sender already destroyed")]
    HandleDestroyed,

    /// Worker execution did not complete cleanly.
    #[error("Async operation failed to complete: {0}")]
    AsyncFailure(String),

    /// The SDK reported an error.
    #[error("SDK error: {0}")]
    Sdk(#[from] SdkError),
}

/// Stable classification of [`SendError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgs,
    MissingField,
    InvalidFieldType,
    InvalidBufferType,
    BufferTooSmall,
    CreateFailed,
    HandleDestroyed,
    AsyncFailure,
    Sdk,
}

impl SendError {
    /// Get the error classification.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgs(_) => ErrorKind::InvalidArgs,
            Self::MissingField { .. } => ErrorKind::MissingField,
            Self::InvalidFieldType { .. } => ErrorKind::InvalidFieldType,
            Self::InvalidBufferType { .. } => ErrorKind::InvalidBufferType,
            Self::BufferTooSmall { .. } => ErrorKind::BufferTooSmall,
            Self::CreateFailed(_) => ErrorKind::CreateFailed,
            Self::HandleDestroyed => ErrorKind::HandleDestroyed,
            Self::AsyncFailure(_) => ErrorKind::AsyncFailure,
            Self::Sdk(_) => ErrorKind::Sdk,
        }
    }

    /// Name of the offending field, for per-field errors.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::MissingField { field }
            | Self::InvalidFieldType { field, .. }
            | Self::InvalidBufferType { field }
            | Self::BufferTooSmall { field, .. } => Some(field),
            _ => None,
        }
    }
}
