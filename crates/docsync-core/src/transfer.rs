//! Resume state of an interrupted upload.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::checksum::HashAlgorithm;
use crate::types::{ChangeToken, RemoteId};

/// Persisted progress of a chunked upload against a private working copy.
///
/// Created on the first chunk failure, consulted on retry, discarded on a
/// successful check-in or on terminal abandonment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferState {
    /// The document being written.
    pub remote_id: RemoteId,

    /// Local file, relative to the sync root.
    pub local_path: PathBuf,

    /// Working copy the bytes were appended to.
    pub pwc_id: Option<RemoteId>,

    /// Change token of the working copy after the last acknowledged chunk.
    pub pwc_change_token: Option<ChangeToken>,

    /// Bytes acknowledged by the server.
    pub offset: u64,

    /// Digest of the first `offset` bytes.
    pub partial_checksum: Option<Vec<u8>>,

    pub algorithm: HashAlgorithm,

    /// Local write time of the file when the transfer started (Unix ms).
    pub local_write_time: Option<i64>,

    /// Total length of the local file when the transfer started.
    pub content_length: u64,
}

impl TransferState {
    /// Fresh state with nothing uploaded yet.
    pub fn new(remote_id: RemoteId, local_path: PathBuf, algorithm: HashAlgorithm) -> Self {
        Self {
            remote_id,
            local_path,
            pwc_id: None,
            pwc_change_token: None,
            offset: 0,
            partial_checksum: None,
            algorithm,
            local_write_time: None,
            content_length: 0,
        }
    }

    /// Whether the state points at bytes already on the server.
    pub fn has_progress(&self) -> bool {
        self.offset > 0 && self.partial_checksum.is_some()
    }
}
