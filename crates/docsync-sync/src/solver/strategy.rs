//! The decision table: one strategy per `(local, remote)` change pair.
//!
//! | local \ remote | None | Created | Changed | Deleted | Moved |
//! |---|---|---|---|---|---|
//! | None | Nothing | RemoteAdded | RemoteChanged | RemoteDeleted | RemoteMoved |
//! | Created | LocalAdded | BothCreated | BothChanged | ReuploadLocal | LocalChangedRemoteMoved |
//! | Changed | LocalChanged | BothChanged | BothChanged | ReuploadLocal | LocalChangedRemoteMoved |
//! | Deleted | LocalDeleted | RestoreRemote | RestoreRemote | BothDeleted | RestoreRemote |
//! | Moved | LocalMoved | LocalMovedRemoteChanged | LocalMovedRemoteChanged | ReuploadLocal | BothMoved |
//!
//! A local deletion never wins against a remote edit, and a remote deletion
//! never wins against a local edit: the surviving side is copied back.

use std::fmt;

use docsync_core::ChangeType;

/// How one situation is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Both sides already agree.
    Nothing,
    LocalAdded,
    LocalChanged,
    LocalDeleted,
    LocalMoved,
    RemoteAdded,
    RemoteChanged,
    RemoteDeleted,
    RemoteMoved,
    /// Same path created on both sides.
    BothCreated,
    /// Content changed on both sides.
    BothChanged,
    BothDeleted,
    /// Moved on both sides; the local placement wins.
    BothMoved,
    LocalChangedRemoteMoved,
    LocalMovedRemoteChanged,
    /// The remote object is gone but the local one changed: upload it anew.
    ReuploadLocal,
    /// The local object is gone but the remote one changed: download it anew.
    RestoreRemote,
}

impl Strategy {
    pub const ALL: [Strategy; 17] = [
        Strategy::Nothing,
        Strategy::LocalAdded,
        Strategy::LocalChanged,
        Strategy::LocalDeleted,
        Strategy::LocalMoved,
        Strategy::RemoteAdded,
        Strategy::RemoteChanged,
        Strategy::RemoteDeleted,
        Strategy::RemoteMoved,
        Strategy::BothCreated,
        Strategy::BothChanged,
        Strategy::BothDeleted,
        Strategy::BothMoved,
        Strategy::LocalChangedRemoteMoved,
        Strategy::LocalMovedRemoteChanged,
        Strategy::ReuploadLocal,
        Strategy::RestoreRemote,
    ];

    /// Pick the strategy for a settled situation.
    pub fn select(local: ChangeType, remote: ChangeType) -> Strategy {
        use ChangeType::*;
        match (local, remote) {
            (None, None) => Strategy::Nothing,
            (None, Created) => Strategy::RemoteAdded,
            (None, Changed) => Strategy::RemoteChanged,
            (None, Deleted) => Strategy::RemoteDeleted,
            (None, Moved) => Strategy::RemoteMoved,

            (Created, None) => Strategy::LocalAdded,
            (Created, Created) => Strategy::BothCreated,
            (Created | Changed, Changed) | (Changed, Created) => Strategy::BothChanged,
            (Created | Changed, Moved) => Strategy::LocalChangedRemoteMoved,

            (Changed, None) => Strategy::LocalChanged,

            (Deleted, None) => Strategy::LocalDeleted,
            (Deleted, Created | Changed | Moved) => Strategy::RestoreRemote,
            (Deleted, Deleted) => Strategy::BothDeleted,

            (Moved, None) => Strategy::LocalMoved,
            (Moved, Created | Changed) => Strategy::LocalMovedRemoteChanged,
            (Moved, Moved) => Strategy::BothMoved,

            (Created | Changed | Moved, Deleted) => Strategy::ReuploadLocal,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Nothing => "nothing",
            Strategy::LocalAdded => "local-added",
            Strategy::LocalChanged => "local-changed",
            Strategy::LocalDeleted => "local-deleted",
            Strategy::LocalMoved => "local-moved",
            Strategy::RemoteAdded => "remote-added",
            Strategy::RemoteChanged => "remote-changed",
            Strategy::RemoteDeleted => "remote-deleted",
            Strategy::RemoteMoved => "remote-moved",
            Strategy::BothCreated => "both-created",
            Strategy::BothChanged => "both-changed",
            Strategy::BothDeleted => "both-deleted",
            Strategy::BothMoved => "both-moved",
            Strategy::LocalChangedRemoteMoved => "local-changed-remote-moved",
            Strategy::LocalMovedRemoteChanged => "local-moved-remote-changed",
            Strategy::ReuploadLocal => "reupload-local",
            Strategy::RestoreRemote => "restore-remote",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
