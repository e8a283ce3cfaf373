//! # docsync Remote
//!
//! The content-protocol client as the engine consumes it: typed document and
//! folder objects carrying server ids and change tokens, ranged content
//! reads, chunked appends, checkout/check-in of private working copies, and
//! a pageable change log.
//!
//! ## Key Types
//!
//! - [`RemoteSession`] - Async interface to a repository
//! - [`RepositoryInfo`] - Root folder and capability flags
//! - [`RemoteError`] - Error taxonomy, with [`RemoteError::is_transient`]
//! - [`memory::MemoryRepository`] - In-memory repository with fault injection
//!
//! ## Freshness
//!
//! Sessions never cache object snapshots. Every `get_object` reflects the
//! server state at the time of the call.

pub mod error;
pub mod memory;
pub mod session;

pub use error::{RemoteError, Result};
pub use memory::MemoryRepository;
pub use session::{RemoteSession, RepositoryInfo};
