//! Error types for the engine.

use std::path::PathBuf;

use docsync_core::RemoteId;
use docsync_remote::RemoteError;
use docsync_store::StoreError;
use docsync_sync::SyncError;
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur while starting or driving a [`crate::SyncEngine`].
#[derive(Debug, Error)]
pub enum EngineError {
    /// Sync error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Repository error.
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    /// The local root is missing or not a directory.
    #[error("sync root {0} is not a directory")]
    InvalidRoot(PathBuf),

    /// The store was synced against another remote folder.
    #[error("store maps the sync root to {stored}, configured {configured}")]
    RootMismatch { stored: RemoteId, configured: RemoteId },

    /// No active transmission with this id.
    #[error("no active transmission {0}")]
    UnknownTransmission(Uuid),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
