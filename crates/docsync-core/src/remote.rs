//! Snapshots of remote objects and change-log entries.
//!
//! These are plain values: the engine never holds a live handle into the
//! content-protocol client. A snapshot is refetched whenever freshness
//! matters.

use serde::{Deserialize, Serialize};

use crate::change::RemoteChangeType;
use crate::checksum::Checksum;
use crate::types::{ChangeToken, ObjectKind, RemoteId};

/// Snapshot of a remote document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteDocument {
    pub id: RemoteId,
    pub name: String,
    pub parent_id: Option<RemoteId>,
    pub change_token: Option<ChangeToken>,
    /// Server modification time (Unix ms).
    pub last_modified: i64,
    pub content_length: Option<u64>,
    /// Content digest reported by the server, when it reports one.
    pub content_checksum: Option<Checksum>,
    /// Id of the private working copy, if the document is checked out.
    pub checked_out_pwc: Option<RemoteId>,
    pub ignored: bool,
}

/// Snapshot of a remote folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFolder {
    pub id: RemoteId,
    pub name: String,
    pub parent_id: Option<RemoteId>,
    /// Absolute repository path, `/` separated.
    pub path: String,
    pub change_token: Option<ChangeToken>,
    /// Server modification time (Unix ms).
    pub last_modified: i64,
    pub ignored: bool,
}

/// Either kind of remote object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoteObject {
    Document(RemoteDocument),
    Folder(RemoteFolder),
}

impl RemoteObject {
    pub fn id(&self) -> &RemoteId {
        match self {
            RemoteObject::Document(d) => &d.id,
            RemoteObject::Folder(f) => &f.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            RemoteObject::Document(d) => &d.name,
            RemoteObject::Folder(f) => &f.name,
        }
    }

    pub fn parent_id(&self) -> Option<&RemoteId> {
        match self {
            RemoteObject::Document(d) => d.parent_id.as_ref(),
            RemoteObject::Folder(f) => f.parent_id.as_ref(),
        }
    }

    pub fn change_token(&self) -> Option<&ChangeToken> {
        match self {
            RemoteObject::Document(d) => d.change_token.as_ref(),
            RemoteObject::Folder(f) => f.change_token.as_ref(),
        }
    }

    pub fn last_modified(&self) -> i64 {
        match self {
            RemoteObject::Document(d) => d.last_modified,
            RemoteObject::Folder(f) => f.last_modified,
        }
    }

    pub fn ignored(&self) -> bool {
        match self {
            RemoteObject::Document(d) => d.ignored,
            RemoteObject::Folder(f) => f.ignored,
        }
    }

    pub fn kind(&self) -> ObjectKind {
        match self {
            RemoteObject::Document(_) => ObjectKind::File,
            RemoteObject::Folder(_) => ObjectKind::Folder,
        }
    }

    pub fn as_document(&self) -> Option<&RemoteDocument> {
        match self {
            RemoteObject::Document(d) => Some(d),
            RemoteObject::Folder(_) => None,
        }
    }

    pub fn as_folder(&self) -> Option<&RemoteFolder> {
        match self {
            RemoteObject::Folder(f) => Some(f),
            RemoteObject::Document(_) => None,
        }
    }
}

impl From<RemoteDocument> for RemoteObject {
    fn from(doc: RemoteDocument) -> Self {
        RemoteObject::Document(doc)
    }
}

impl From<RemoteFolder> for RemoteObject {
    fn from(folder: RemoteFolder) -> Self {
        RemoteObject::Folder(folder)
    }
}

/// Reference to a remote object that may no longer exist.
///
/// A deletion only carries the id; everything else carries a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoteHandle<T> {
    Gone(RemoteId),
    Present(T),
}

impl<T> RemoteHandle<T> {
    /// The snapshot, if the object still exists.
    pub fn object(&self) -> Option<&T> {
        match self {
            RemoteHandle::Present(obj) => Some(obj),
            RemoteHandle::Gone(_) => None,
        }
    }

    pub fn is_gone(&self) -> bool {
        matches!(self, RemoteHandle::Gone(_))
    }
}

impl RemoteHandle<RemoteDocument> {
    pub fn id(&self) -> &RemoteId {
        match self {
            RemoteHandle::Gone(id) => id,
            RemoteHandle::Present(doc) => &doc.id,
        }
    }
}

impl RemoteHandle<RemoteFolder> {
    pub fn id(&self) -> &RemoteId {
        match self {
            RemoteHandle::Gone(id) => id,
            RemoteHandle::Present(folder) => &folder.id,
        }
    }
}

/// One entry of the server change log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    pub object_id: RemoteId,
    pub change_type: RemoteChangeType,
    /// Token of the log position this entry was written at.
    pub token: ChangeToken,
}

/// A page of change-log entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeLogPage {
    pub entries: Vec<ChangeLogEntry>,
    /// More entries follow after the last one in this page.
    pub has_more_items: bool,
    /// Token to continue from.
    pub next_token: Option<ChangeToken>,
}
