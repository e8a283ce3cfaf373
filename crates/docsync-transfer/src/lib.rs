//! # docsync Transfer
//!
//! Moves content between the local disk and a [`docsync_remote::RemoteSession`]
//! in fixed-size chunks, hashing as it goes so an interrupted transfer can be
//! resumed from the last acknowledged byte and verified at the end.
//!
//! ## Key Types
//!
//! - [`ChunkReader`] - Sequential fixed-size reads from a local file
//! - [`rehash_prefix`] - Rebuild the running digest of a file prefix
//! - [`TransmissionManager`] - Active transfers and their [`TransmissionEvent`]s
//! - [`ChunkedUploader`] - Resumable append-based upload
//! - [`ChunkedDownloader`] - Resumable ranged download through a cache file
//!
//! ## Cancellation
//!
//! Transfers check their [`Transmission`] abort flag between chunks. An
//! aborted upload reports the acknowledged offset and partial digest so the
//! caller can persist them; an aborted download keeps its cache file.

pub mod chunk;
pub mod download;
pub mod error;
pub mod transmission;
pub mod upload;

pub use chunk::{rehash_prefix, ChunkReader, DEFAULT_CHUNK_SIZE};
pub use download::{cache_path_for, ChunkedDownloader, DownloadOutcome};
pub use error::{Result, TransferError};
pub use transmission::{
    Transmission, TransmissionEvent, TransmissionKind, TransmissionManager, TransmissionStatus,
};
pub use upload::{ChunkedUploader, UploadInterrupted, UploadOutcome, UploadStart};
