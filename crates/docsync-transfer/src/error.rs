//! Error types for transfers.

use thiserror::Error;

use docsync_core::{Checksum, CoreError};
use docsync_remote::RemoteError;

/// Errors that can occur while moving content.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Local I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The repository rejected a request.
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    /// The transmission was aborted between chunks.
    #[error("transfer aborted")]
    Aborted,

    /// The transferred bytes do not hash to the expected digest.
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: Checksum, actual: Checksum },

    /// The server returned fewer bytes than announced.
    #[error("length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch { expected: u64, actual: u64 },

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl TransferError {
    /// Whether retrying later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            TransferError::Remote(e) => e.is_transient(),
            TransferError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }
}

/// Result type for transfer operations.
pub type Result<T> = std::result::Result<T, TransferError>;
