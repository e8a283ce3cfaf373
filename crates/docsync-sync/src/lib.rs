//! # docsync Sync
//!
//! Change detection and reconciliation between a local folder and a remote
//! content repository.
//!
//! ## Overview
//!
//! Three producers observe the two sides and enqueue events on one bus:
//!
//! - **Watcher**: debounced filesystem notifications, with delete/create
//!   pairs of the same entry folded into moves
//! - **Change log**: pages of the repository's change log since the last
//!   stored token
//! - **Crawler**: a full comparison of disk, repository and records, used
//!   for the initial sync, for recovery and for repositories without a
//!   change log
//!
//! A single [`EventLoop`] hands every event to the registered handlers in
//! priority order. Filters drop what must not be synced, transformers turn
//! raw events into canonical [`docsync_core::FileEvent`] and
//! [`docsync_core::FolderEvent`]s, and the [`SyncMechanism`] reconciles
//! each of those against the [`docsync_store::MetaDataStorage`] records.
//!
//! ## Idempotence
//!
//! Events from different producers are not ordered with respect to each
//! other. Every handler re-derives its decision from the persisted record
//! and the current state of both sides, so replaying an event that was
//! already applied is a no-op.

pub mod bus;
pub mod changelog;
pub mod config;
pub mod context;
pub mod crawler;
pub mod error;
pub mod fetch;
pub mod filter;
pub mod local;
pub mod solver;
pub mod watcher;

pub use bus::{
    priority, DebugLoggingHandler, EventForwarder, EventLoop, HandlerFailure, SyncEventHandler,
    SyncEventManager, SyncEventQueue, SyncEventReceiver,
};
pub use changelog::{ContentChangeAccumulator, ContentChangeEventTransformer, ContentChanges};
pub use config::{
    ChangeLogConfig, ConflictPolicy, FilterConfig, SyncConfig, TransferConfig, WatcherConfig,
};
pub use context::SyncContext;
pub use crawler::DescendantsCrawler;
pub use error::{ErrorClass, Result, SyncError};
pub use fetch::{LocalObjectFetcher, RemoteObjectFetcher};
pub use filter::{
    AlreadyHandledFilter, ChangeLogLoopFilter, IgnoredEntitiesStorage, IgnoredNamesFilter,
    IgnoredState, InvalidNameFilter, SelectiveIgnoreFilter,
};
pub use local::{IdentityReader, InodeIdentity, PathIdentity, SyncRoot};
pub use solver::{Strategy, SyncMechanism};
pub use watcher::{FsEventTransformer, FsWatcher};
