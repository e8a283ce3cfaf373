//! Error types for docsync Core.

use thiserror::Error;

/// Errors raised while building or interpreting core values.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unknown hash algorithm: {0}")]
    UnknownHashAlgorithm(String),

    #[error("checksum length mismatch for {algorithm}: expected {expected} bytes, got {actual}")]
    ChecksumLength {
        algorithm: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("event carries neither a local nor a remote handle")]
    MissingHandle,

    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}
