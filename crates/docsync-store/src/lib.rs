//! # docsync Store
//!
//! Storage abstraction for the reconciliation engine. Provides trait-based
//! interfaces for the persisted correlation records and for upload resume
//! state, with SQLite and in-memory implementations.
//!
//! ## Key Types
//!
//! - [`MetaDataStorage`] - Mapped objects and the change-log token
//! - [`TransferStorage`] - Resume state of interrupted uploads
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//! - [`ObjectLocks`] - Per-object write serialization
//!
//! ## Design Notes
//!
//! - **Read-your-writes**: every lookup reflects all prior `save`/`remove`
//!   calls made through the same store.
//! - **Paths are derived**: records only hold a name and a parent id; local
//!   paths are resolved by walking the parent chain from the root record.
//! - **Subtree removal**: removing a folder record removes its descendants.

pub mod error;
pub mod locks;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use locks::{ObjectGuard, ObjectLocks};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{MetaDataStorage, TransferStorage};
