//! # docsync Core
//!
//! Pure data model for the docsync reconciliation engine.
//!
//! This crate contains no I/O, no storage, no networking. It describes what
//! the engine knows about local and remote objects and the events that flow
//! between producers, filters and the situation solver.
//!
//! ## Key Types
//!
//! - [`MappedObject`] - The persisted correlation record of one synced object
//! - [`SyncEvent`] - Everything that travels over the event bus
//! - [`FileEvent`] / [`FolderEvent`] - Canonical reconciliation events
//! - [`ChangeType`] - Per-side change classification
//! - [`Checksum`] / [`ContentHasher`] - Content integrity
//! - [`TransferState`] - Resume point of an interrupted upload

pub mod change;
pub mod checksum;
pub mod error;
pub mod event;
pub mod mapped;
pub mod remote;
pub mod transfer;
pub mod types;

pub use change::{ChangeType, ContentChangeType, RemoteChangeType};
pub use checksum::{Checksum, ContentHasher, HashAlgorithm};
pub use error::CoreError;
pub use event::{
    ContentChangeEvent, CrawlRequestEvent, FileEvent, FolderEvent, FsEvent, FsMovedEvent,
    FullSyncCompletedEvent, MoveSource, RequestIgnoredEvent, StartNextSyncEvent, SyncEvent,
    WatcherChangeType,
};
pub use mapped::MappedObject;
pub use remote::{
    ChangeLogEntry, ChangeLogPage, RemoteDocument, RemoteFolder, RemoteHandle, RemoteObject,
};
pub use transfer::TransferState;
pub use types::{ChangeToken, ObjectKind, RemoteId};
