//! Error types for the SDK layer.

use thiserror::Error;

/// Errors reported by an SDK backend.
#[derive(Debug, Error)]
pub enum SdkError {
    /// The native factory returned no sender.
    #[error("Failed to create NDI sender: {0}")]
    CreateFailed(String),

    /// The runtime library could not be initialized.
    #[error("NDI runtime not initialized")]
    NotInitialized,

    /// A string handed to the SDK contained an interior NUL.
    #[error("Invalid string for SDK: {0}")]
    InvalidString(String),

    /// The backend refused a frame.
    #[error("Send rejected: {0}")]
    SendRejected(String),

    /// The backend does not know the handle.
    #[error("Unknown sender handle {0:#x}")]
    UnknownHandle(usize),
}
