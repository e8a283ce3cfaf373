//! # docsync
//!
//! Bidirectional synchronization of a local folder with a folder of a
//! remote content repository.
//!
//! ## Overview
//!
//! - **Producers**: a filesystem watcher, a full-tree crawler and a
//!   change-log poller turn what happens on either side into events
//! - **Pipeline**: filters and transformers normalize those events into one
//!   canonical file or folder event per object
//! - **Solver**: compares each event with the persisted record and applies
//!   the matching action, from a plain upload to a conflict copy
//! - **Transfers**: chunked uploads and downloads that resume after an
//!   interruption and verify their checksum
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use docsync::{EngineConfig, SyncEngine};
//! use docsync::remote::MemoryRepository;
//! use docsync::store::SqliteStore;
//!
//! async fn example() -> anyhow::Result<()> {
//!     let store = Arc::new(SqliteStore::open("docsync.db")?);
//!     let session = Arc::new(MemoryRepository::new());
//!
//!     let engine = SyncEngine::start(EngineConfig::new("/home/me/Documents"), session, store).await?;
//!     engine.sync_now(true);
//!     engine.wait_until_idle().await;
//!     engine.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `docsync::core` - Data model and events
//! - `docsync::store` - Metadata storage and SQLite
//! - `docsync::remote` - Repository session trait and in-memory repository
//! - `docsync::transfer` - Chunked transfers and transmissions
//! - `docsync::sync` - Event bus, producers, filters and the solver

pub mod config;
pub mod engine;
pub mod error;
pub mod scheduler;

// Re-export component crates
pub use docsync_core as core;
pub use docsync_remote as remote;
pub use docsync_store as store;
pub use docsync_sync as sync;
pub use docsync_transfer as transfer;

// Re-export main types for convenience
pub use config::EngineConfig;
pub use engine::SyncEngine;
pub use error::{EngineError, Result};
pub use scheduler::SyncScheduler;

pub use docsync_sync::{ConflictPolicy, SyncConfig};
pub use docsync_transfer::{TransmissionEvent, TransmissionKind};
