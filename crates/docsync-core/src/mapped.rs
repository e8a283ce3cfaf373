//! The persisted correlation record.
//!
//! A [`MappedObject`] is created when an object is first synchronized,
//! rewritten after every successful reconciliation and removed once the
//! object is gone on both sides. It is the only record of "what we last
//! knew", and every producer consults it to tell new state from state that
//! has already been applied.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::checksum::{Checksum, HashAlgorithm};
use crate::types::{ChangeToken, ObjectKind, RemoteId};

/// Durable link between one local entry and one remote object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappedObject {
    /// Entry name, identical on both sides.
    pub name: String,

    /// Server id of the object.
    pub remote_id: RemoteId,

    /// Server id of the parent folder. `None` only for the sync root.
    pub parent_id: Option<RemoteId>,

    /// File, folder or unknown.
    pub kind: ObjectKind,

    /// Change token observed after the last reconciliation.
    pub last_change_token: Option<ChangeToken>,

    /// Local modification time at the last reconciliation (Unix ms).
    pub last_local_write_time: Option<i64>,

    /// Remote modification time at the last reconciliation (Unix ms).
    pub last_remote_write_time: Option<i64>,

    /// Digest of the content at the last reconciliation.
    pub last_checksum: Option<Vec<u8>>,

    /// Name of the algorithm that produced `last_checksum`.
    pub checksum_algorithm: Option<String>,

    /// Content length at the last reconciliation.
    pub last_content_size: Option<u64>,

    /// Stable local identity of the entry.
    pub guid: Option<Uuid>,

    /// Whether the object is excluded from sync.
    pub ignored: bool,
}

impl MappedObject {
    fn new(name: impl Into<String>, remote_id: RemoteId, parent_id: Option<RemoteId>, kind: ObjectKind) -> Self {
        Self {
            name: name.into(),
            remote_id,
            parent_id,
            kind,
            last_change_token: None,
            last_local_write_time: None,
            last_remote_write_time: None,
            last_checksum: None,
            checksum_algorithm: None,
            last_content_size: None,
            guid: None,
            ignored: false,
        }
    }

    /// Record for a file.
    pub fn file(name: impl Into<String>, remote_id: RemoteId, parent_id: RemoteId) -> Self {
        Self::new(name, remote_id, Some(parent_id), ObjectKind::File)
    }

    /// Record for a folder.
    pub fn folder(name: impl Into<String>, remote_id: RemoteId, parent_id: RemoteId) -> Self {
        Self::new(name, remote_id, Some(parent_id), ObjectKind::Folder)
    }

    /// Record for the sync root. It has no name and no parent.
    pub fn root(remote_id: RemoteId) -> Self {
        Self::new("", remote_id, None, ObjectKind::Folder)
    }

    /// True for the sync root.
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// True for folders.
    pub fn is_folder(&self) -> bool {
        self.kind == ObjectKind::Folder
    }

    /// The stored checksum, if both digest and algorithm are known.
    pub fn checksum(&self) -> Option<Checksum> {
        let algorithm = HashAlgorithm::from_name(self.checksum_algorithm.as_deref()?).ok()?;
        let bytes = self.last_checksum.clone()?;
        Checksum::from_bytes(algorithm, bytes).ok()
    }

    /// Store a checksum together with its algorithm name.
    pub fn set_checksum(&mut self, checksum: &Checksum) {
        self.last_checksum = Some(checksum.bytes.clone());
        self.checksum_algorithm = Some(checksum.algorithm.name().to_string());
    }

    /// Forget the stored content digest.
    pub fn clear_checksum(&mut self) {
        self.last_checksum = None;
        self.checksum_algorithm = None;
    }
}
