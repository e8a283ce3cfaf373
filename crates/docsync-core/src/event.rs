//! Events carried by the sync event bus.
//!
//! Producers emit raw events ([`FsEvent`], [`FsMovedEvent`],
//! [`ContentChangeEvent`]); transformers turn them into the canonical
//! [`FileEvent`] and [`FolderEvent`] the situation solver consumes. Control
//! events ([`StartNextSyncEvent`], [`FullSyncCompletedEvent`],
//! [`CrawlRequestEvent`]) steer the producers, and [`RequestIgnoredEvent`]
//! reports a request that was deliberately not synced.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use crate::change::{ChangeType, ContentChangeType, RemoteChangeType};
use crate::error::CoreError;
use crate::remote::{RemoteDocument, RemoteFolder, RemoteHandle, RemoteObject};
use crate::types::{ChangeToken, RemoteId};

/// Everything that travels over the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SyncEvent {
    StartNextSync(StartNextSyncEvent),
    FullSyncCompleted(FullSyncCompletedEvent),
    CrawlRequest(CrawlRequestEvent),
    Fs(FsEvent),
    FsMoved(FsMovedEvent),
    ContentChange(ContentChangeEvent),
    File(FileEvent),
    Folder(FolderEvent),
    RequestIgnored(RequestIgnoredEvent),
}

impl SyncEvent {
    /// Short name of the variant, for logs.
    pub fn kind_name(&self) -> &'static str {
        match self {
            SyncEvent::StartNextSync(_) => "StartNextSync",
            SyncEvent::FullSyncCompleted(_) => "FullSyncCompleted",
            SyncEvent::CrawlRequest(_) => "CrawlRequest",
            SyncEvent::Fs(_) => "FsEvent",
            SyncEvent::FsMoved(_) => "FsMovedEvent",
            SyncEvent::ContentChange(_) => "ContentChange",
            SyncEvent::File(_) => "FileEvent",
            SyncEvent::Folder(_) => "FolderEvent",
            SyncEvent::RequestIgnored(_) => "RequestIgnored",
        }
    }
}

impl fmt::Display for SyncEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncEvent::StartNextSync(e) => {
                write!(f, "StartNextSync(full={})", e.full_sync_requested)
            }
            SyncEvent::FullSyncCompleted(e) => {
                write!(f, "FullSyncCompleted(token={:?})", e.start_token)
            }
            SyncEvent::CrawlRequest(e) => {
                write!(f, "CrawlRequest({} <-> {})", e.local_folder.display(), e.remote_folder)
            }
            SyncEvent::Fs(e) => write!(f, "FsEvent({:?} {})", e.kind, e.path.display()),
            SyncEvent::FsMoved(e) => write!(
                f,
                "FsMovedEvent({} -> {})",
                e.old_path.display(),
                e.new_path.display()
            ),
            SyncEvent::ContentChange(e) => {
                write!(f, "ContentChange({:?} {})", e.change_type, e.object_id)
            }
            SyncEvent::File(e) => write!(
                f,
                "FileEvent(local={} remote={} path={:?} remote_id={:?})",
                e.local,
                e.remote,
                e.local_path,
                e.remote_file.as_ref().map(|r| r.id())
            ),
            SyncEvent::Folder(e) => write!(
                f,
                "FolderEvent(local={} remote={} path={:?} remote_id={:?})",
                e.local,
                e.remote,
                e.local_path,
                e.remote_folder.as_ref().map(|r| r.id())
            ),
            SyncEvent::RequestIgnored(e) => write!(f, "RequestIgnored({})", e.reason),
        }
    }
}

/// Ask the producers for the next sync round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StartNextSyncEvent {
    /// A full crawl instead of an incremental change-log poll.
    pub full_sync_requested: bool,
}

impl StartNextSyncEvent {
    pub fn incremental() -> Self {
        Self {
            full_sync_requested: false,
        }
    }

    pub fn full() -> Self {
        Self {
            full_sync_requested: true,
        }
    }
}

/// Emitted by the crawler after a full sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullSyncCompletedEvent {
    /// Latest change-log token observed before the sweep started.
    pub start_token: Option<ChangeToken>,
}

/// Ask the crawler to sweep one subtree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlRequestEvent {
    pub local_folder: PathBuf,
    pub remote_folder: RemoteId,
}

/// Raw local notification kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WatcherChangeType {
    Created,
    Changed,
    Deleted,
}

/// A debounced local notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsEvent {
    pub kind: WatcherChangeType,
    /// Absolute path.
    pub path: PathBuf,
    pub is_directory: bool,
    /// Stable identity of the entry, when it could be determined.
    pub local_id: Option<Uuid>,
}

/// A local move correlated from a delete/create pair or a native rename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsMovedEvent {
    pub old_path: PathBuf,
    pub new_path: PathBuf,
    pub is_directory: bool,
    pub local_id: Option<Uuid>,
}

/// One distinct object reported by the change log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentChangeEvent {
    pub object_id: RemoteId,
    pub change_type: RemoteChangeType,
    /// Snapshot fetched by the accumulator. `None` until fetched and for
    /// deletions.
    pub object: Option<RemoteObject>,
}

impl ContentChangeEvent {
    pub fn new(object_id: RemoteId, change_type: RemoteChangeType) -> Self {
        Self {
            object_id,
            change_type,
            object: None,
        }
    }
}

/// Where a moved object came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveSource {
    pub old_local_path: Option<PathBuf>,
    pub old_remote_path: Option<String>,
}

/// Canonical reconciliation event for a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEvent {
    pub local: ChangeType,
    pub remote: ChangeType,
    pub local_content: ContentChangeType,
    pub remote_content: ContentChangeType,
    /// Absolute local path.
    pub local_path: Option<PathBuf>,
    pub remote_file: Option<RemoteHandle<RemoteDocument>>,
    /// Set for moves; `local` is then `Moved`.
    pub moved_from: Option<MoveSource>,
}

impl FileEvent {
    /// Build an event with no changes recorded yet. At least one handle
    /// must be present.
    pub fn new(
        local_path: Option<PathBuf>,
        remote_file: Option<RemoteHandle<RemoteDocument>>,
    ) -> Result<Self, CoreError> {
        if local_path.is_none() && remote_file.is_none() {
            return Err(CoreError::MissingHandle);
        }
        Ok(Self {
            local: ChangeType::None,
            remote: ChangeType::None,
            local_content: ContentChangeType::None,
            remote_content: ContentChangeType::None,
            local_path,
            remote_file,
            moved_from: None,
        })
    }

    /// Event for a file seen only on the local side.
    pub fn local(path: PathBuf) -> Self {
        Self {
            local: ChangeType::None,
            remote: ChangeType::None,
            local_content: ContentChangeType::None,
            remote_content: ContentChangeType::None,
            local_path: Some(path),
            remote_file: None,
            moved_from: None,
        }
    }

    /// Event for a file seen only on the remote side.
    pub fn remote(handle: RemoteHandle<RemoteDocument>) -> Self {
        Self {
            local: ChangeType::None,
            remote: ChangeType::None,
            local_content: ContentChangeType::None,
            remote_content: ContentChangeType::None,
            local_path: None,
            remote_file: Some(handle),
            moved_from: None,
        }
    }

    /// A local move from `old_path` to `new_path`.
    pub fn moved(old_path: PathBuf, new_path: PathBuf, old_remote_path: Option<String>) -> Self {
        let mut event = Self::local(new_path);
        event.local = ChangeType::Moved;
        event.moved_from = Some(MoveSource {
            old_local_path: Some(old_path),
            old_remote_path,
        });
        event
    }

    pub fn with_local(mut self, change: ChangeType) -> Self {
        self.local = change;
        self
    }

    pub fn with_remote(mut self, change: ChangeType) -> Self {
        self.remote = change;
        self
    }

    pub fn with_local_content(mut self, change: ContentChangeType) -> Self {
        self.local_content = change;
        self
    }

    pub fn with_remote_content(mut self, change: ContentChangeType) -> Self {
        self.remote_content = change;
        self
    }

    /// The remote id, if known.
    pub fn remote_id(&self) -> Option<&RemoteId> {
        self.remote_file.as_ref().map(|r| r.id())
    }

    /// The remote snapshot, if the document still exists.
    pub fn remote_document(&self) -> Option<&RemoteDocument> {
        self.remote_file.as_ref().and_then(|r| r.object())
    }
}

/// Canonical reconciliation event for a folder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FolderEvent {
    pub local: ChangeType,
    pub remote: ChangeType,
    /// Absolute local path.
    pub local_path: Option<PathBuf>,
    pub remote_folder: Option<RemoteHandle<RemoteFolder>>,
    /// The change applies to the whole subtree.
    pub recursive: bool,
    pub moved_from: Option<MoveSource>,
}

impl FolderEvent {
    /// Build an event with no changes recorded yet. At least one handle
    /// must be present.
    pub fn new(
        local_path: Option<PathBuf>,
        remote_folder: Option<RemoteHandle<RemoteFolder>>,
    ) -> Result<Self, CoreError> {
        if local_path.is_none() && remote_folder.is_none() {
            return Err(CoreError::MissingHandle);
        }
        Ok(Self {
            local: ChangeType::None,
            remote: ChangeType::None,
            local_path,
            remote_folder,
            recursive: false,
            moved_from: None,
        })
    }

    pub fn local(path: PathBuf) -> Self {
        Self {
            local: ChangeType::None,
            remote: ChangeType::None,
            local_path: Some(path),
            remote_folder: None,
            recursive: false,
            moved_from: None,
        }
    }

    pub fn remote(handle: RemoteHandle<RemoteFolder>) -> Self {
        Self {
            local: ChangeType::None,
            remote: ChangeType::None,
            local_path: None,
            remote_folder: Some(handle),
            recursive: false,
            moved_from: None,
        }
    }

    /// A local folder move from `old_path` to `new_path`.
    pub fn moved(old_path: PathBuf, new_path: PathBuf, old_remote_path: Option<String>) -> Self {
        let mut event = Self::local(new_path);
        event.local = ChangeType::Moved;
        event.moved_from = Some(MoveSource {
            old_local_path: Some(old_path),
            old_remote_path,
        });
        event
    }

    pub fn with_local(mut self, change: ChangeType) -> Self {
        self.local = change;
        self
    }

    pub fn with_remote(mut self, change: ChangeType) -> Self {
        self.remote = change;
        self
    }

    pub fn remote_id(&self) -> Option<&RemoteId> {
        self.remote_folder.as_ref().map(|r| r.id())
    }

    pub fn remote_snapshot(&self) -> Option<&RemoteFolder> {
        self.remote_folder.as_ref().and_then(|r| r.object())
    }
}

/// A request that was deliberately not synced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestIgnoredEvent {
    pub reason: String,
    pub path: Option<PathBuf>,
    pub remote_id: Option<RemoteId>,
}
