//! Error types for the sync engine, and their classification.

use std::path::PathBuf;

use thiserror::Error;

use docsync_core::{CoreError, RemoteId};
use docsync_remote::RemoteError;
use docsync_store::StoreError;
use docsync_transfer::TransferError;

/// How the bus reacts to a failed handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Network blip or lock contention. Resume state is already persisted;
    /// the next scheduled round retries.
    Transient,

    /// Not found or permission denied on one object. Logged and dropped.
    ObjectScoped,

    /// Missing parent mapping, stale token or checksum mismatch. Needs a
    /// crawl to re-establish ground truth.
    Inconsistent,

    /// Explicit cancellation.
    Aborted,

    /// Anything else. Escalates to a full sync.
    Unexpected,
}

/// Errors that can occur while detecting or reconciling changes.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("watcher error: {0}")]
    Watcher(#[from] notify::Error),

    /// The parent of an object has no mapping yet.
    #[error("parent of {local:?} is not mapped (remote parent {remote:?})")]
    MissingParent {
        local: Option<PathBuf>,
        remote: Option<RemoteId>,
    },

    /// Local and persisted state disagree in a way a crawl has to resolve.
    #[error("inconsistent state: {0}")]
    Inconsistent(String),

    /// A path outside the sync root.
    #[error("path outside the sync root: {0}")]
    OutsideRoot(PathBuf),

    #[error("invalid name pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("sync aborted")]
    Aborted,
}

impl SyncError {
    /// Map the error onto one of the handling categories.
    pub fn classify(&self) -> ErrorClass {
        match self {
            SyncError::Remote(e) => classify_remote(e),
            SyncError::Transfer(e) => match e {
                TransferError::Aborted => ErrorClass::Aborted,
                TransferError::Remote(inner) => classify_remote(inner),
                TransferError::Io(inner) => classify_io(inner),
                TransferError::ChecksumMismatch { .. } | TransferError::LengthMismatch { .. } => {
                    ErrorClass::Inconsistent
                }
                TransferError::Core(_) => ErrorClass::Unexpected,
            },
            SyncError::Io(e) => classify_io(e),
            SyncError::MissingParent { .. } | SyncError::Inconsistent(_) => ErrorClass::Inconsistent,
            SyncError::OutsideRoot(_) => ErrorClass::ObjectScoped,
            SyncError::Aborted => ErrorClass::Aborted,
            SyncError::Store(_) | SyncError::Core(_) | SyncError::Watcher(_) | SyncError::Pattern(_) => {
                ErrorClass::Unexpected
            }
        }
    }

    /// Permission denied by the server on this object.
    pub fn is_permission_denied(&self) -> bool {
        matches!(
            self,
            SyncError::Remote(RemoteError::PermissionDenied(_))
                | SyncError::Transfer(TransferError::Remote(RemoteError::PermissionDenied(_)))
        )
    }
}

fn classify_remote(e: &RemoteError) -> ErrorClass {
    if e.is_transient() {
        ErrorClass::Transient
    } else if e.is_object_scoped() {
        ErrorClass::ObjectScoped
    } else {
        match e {
            RemoteError::UpdateConflict(_) | RemoteError::NameConflict { .. } => ErrorClass::Inconsistent,
            _ => ErrorClass::Unexpected,
        }
    }
}

fn classify_io(e: &std::io::Error) -> ErrorClass {
    match e.kind() {
        std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => ErrorClass::ObjectScoped,
        _ => ErrorClass::Transient,
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
