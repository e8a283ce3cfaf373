//! Applying a move from one side onto the other.

use std::path::{Path, PathBuf};

use docsync_core::{FsEvent, MappedObject, RemoteObject, SyncEvent, WatcherChangeType};

use crate::context::SyncContext;
use crate::error::{Result, SyncError};
use crate::local::{file_name, stat};
use crate::solver::conflict::conflict_copy_path;

/// Rename and reparent the remote object of `record` so it matches the
/// local entry at `path`. Returns the object's new state.
pub async fn apply_local_move(ctx: &SyncContext, record: &MappedObject, path: &Path) -> Result<RemoteObject> {
    let parent = ctx.parent_record(path).await?;
    let name = file_name(path).ok_or_else(|| SyncError::OutsideRoot(path.to_path_buf()))?;
    let id = &record.remote_id;

    let mut object = ctx.session.get_object(id).await?;
    if object.name() != name {
        object = ctx.session.rename(id, &name).await?;
    }
    if object.parent_id() != Some(&parent.remote_id) {
        object = ctx.session.move_object(id, &parent.remote_id).await?;
    }
    tracing::info!(remote_id = %id, path = %path.display(), "local move applied remotely");
    Ok(object)
}

/// Move the local entry of `record` to where the remote `object` now lives.
///
/// `seen_at` is where the event last saw the entry; the record's own path
/// is used when nothing is there anymore. An unrelated entry occupying the
/// target is kept as a conflict copy. Returns the new local path.
pub async fn apply_remote_move(
    ctx: &SyncContext,
    record: &MappedObject,
    object: &RemoteObject,
    seen_at: Option<&Path>,
) -> Result<PathBuf> {
    let target = ctx.local_path_for(object.parent_id(), object.name()).await?;

    let current = match seen_at {
        Some(path) if stat(path).await?.is_some() => path.to_path_buf(),
        _ => ctx
            .local_path_of(record)
            .await?
            .ok_or_else(|| SyncError::Inconsistent(format!("no local path for {}", record.remote_id)))?,
    };
    if current == target {
        return Ok(target);
    }

    if let Some(occupant) = stat(&target).await? {
        let copy = conflict_copy_path(&target).await?;
        tokio::fs::rename(&target, &copy).await?;
        tracing::warn!(path = %target.display(), copy = %copy.display(), "move target occupied, kept a conflict copy");
        announce_local(ctx, &copy, occupant.is_dir);
    }
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::rename(&current, &target).await?;
    tracing::info!(from = %current.display(), to = %target.display(), "remote move applied locally");
    Ok(target)
}

/// Report a local entry the engine created itself, so it syncs like any
/// other new entry.
pub fn announce_local(ctx: &SyncContext, path: &Path, is_directory: bool) {
    let local_id = ctx.identity.read(path).ok().flatten();
    ctx.queue.add_event(SyncEvent::Fs(FsEvent {
        kind: WatcherChangeType::Created,
        path: path.to_path_buf(),
        is_directory,
        local_id,
    }));
}
