//! Strategies for folders.
//!
//! Folder operations never move content themselves. Whenever a folder
//! appears on one side with children the other side lacks, the solver
//! maps the folder and asks the crawler to sweep it, which produces one
//! event per child.

use std::path::{Path, PathBuf};

use docsync_core::{CrawlRequestEvent, MappedObject, RemoteFolder, RemoteId, RemoteObject, SyncEvent};
use docsync_remote::RemoteError;

use crate::context::SyncContext;
use crate::error::{Result, SyncError};
use crate::local::{file_name, stat};
use crate::solver::moves::{apply_local_move, apply_remote_move};
use crate::solver::record::{forget, save_synced};
use crate::solver::situation::Situation;
use crate::solver::strategy::Strategy;

/// Applies a [`Strategy`] to a folder.
pub struct FolderSolver<'a> {
    ctx: &'a SyncContext,
}

impl<'a> FolderSolver<'a> {
    pub fn new(ctx: &'a SyncContext) -> Self {
        Self { ctx }
    }

    pub async fn solve(&self, strategy: Strategy, mut s: Situation) -> Result<()> {
        match strategy {
            Strategy::Nothing => Ok(()),
            Strategy::LocalAdded => self.local_added(&s).await,
            Strategy::RemoteAdded => self.remote_added(&s).await,
            Strategy::BothCreated => self.adopt(&s).await,
            Strategy::LocalChanged | Strategy::RemoteChanged | Strategy::BothChanged => {
                self.refresh_record(&s).await
            }
            Strategy::LocalDeleted => self.local_deleted(&s).await,
            Strategy::RemoteDeleted => self.remote_deleted(&s).await,
            Strategy::BothDeleted => match &s.record {
                Some(record) => forget(self.ctx, record).await,
                None => Ok(()),
            },
            Strategy::LocalMoved | Strategy::BothMoved | Strategy::LocalMovedRemoteChanged => {
                let path = local_path(&s)?;
                let record = s.record.as_ref().ok_or_else(|| unmapped(&s))?;
                let object = apply_local_move(self.ctx, record, &path).await?;
                s.object = Some(object);
                self.refresh_record(&s).await
            }
            Strategy::RemoteMoved | Strategy::LocalChangedRemoteMoved => {
                let record = s.record.as_ref().ok_or_else(|| unmapped(&s))?;
                let object = s.object.as_ref().ok_or_else(|| unmapped(&s))?;
                let target = apply_remote_move(self.ctx, record, object, s.local_path.as_deref()).await?;
                s.local_path = Some(target);
                self.refresh_record(&s).await
            }
            Strategy::ReuploadLocal => {
                if let Some(record) = s.record.take() {
                    forget(self.ctx, &record).await?;
                }
                let path = local_path(&s)?;
                let folder = self.create_remote(&path).await?;
                self.request_crawl(&path, &folder.id);
                Ok(())
            }
            Strategy::RestoreRemote => {
                let folder = remote_folder(&s)?.clone();
                let target = self
                    .ctx
                    .local_path_for(folder.parent_id.as_ref(), &folder.name)
                    .await?;
                self.recreate_local(s.record.as_ref(), &folder, &target).await
            }
        }
    }

    async fn local_added(&self, s: &Situation) -> Result<()> {
        let path = local_path(s)?;
        let folder = self.create_remote(&path).await?;
        tracing::debug!(path = %path.display(), remote_id = %folder.id, "folder mapped");
        Ok(())
    }

    /// Create the remote folder for the local directory at `path` and map
    /// it. An existing remote folder of the same name is adopted and swept.
    async fn create_remote(&self, path: &Path) -> Result<RemoteFolder> {
        let parent = self.ctx.parent_record(path).await?;
        let name = file_name(path).ok_or_else(|| SyncError::OutsideRoot(path.to_path_buf()))?;

        let folder = match self.ctx.session.create_folder(&parent.remote_id, &name).await {
            Ok(folder) => {
                tracing::info!(path = %path.display(), remote_id = %folder.id, "remote folder created");
                folder
            }
            Err(RemoteError::NameConflict { .. }) => {
                let existing = self.child_folder(&parent.remote_id, &name).await?;
                tracing::info!(path = %path.display(), remote_id = %existing.id, "folder exists on both sides");
                self.request_crawl(path, &existing.id);
                existing
            }
            Err(e) => return Err(e.into()),
        };
        save_synced(self.ctx, &RemoteObject::Folder(folder.clone()), path, None, None).await?;
        Ok(folder)
    }

    async fn remote_added(&self, s: &Situation) -> Result<()> {
        let folder = remote_folder(s)?;
        let target = match &s.local_path {
            Some(path) => path.clone(),
            None => self.ctx.local_path_for(folder.parent_id.as_ref(), &folder.name).await?,
        };
        match stat(&target).await? {
            Some(existing) if existing.is_dir => {
                let mut s = s.clone();
                s.local_path = Some(target);
                return self.adopt(&s).await;
            }
            Some(_) => {
                return Err(SyncError::Inconsistent(format!(
                    "{} is a file locally and a folder remotely",
                    target.display()
                )));
            }
            None => {}
        }
        tokio::fs::create_dir_all(&target).await?;
        save_synced(self.ctx, &RemoteObject::Folder(folder.clone()), &target, None, None).await?;
        tracing::info!(path = %target.display(), remote_id = %folder.id, "local folder created");
        Ok(())
    }

    /// Map a folder present on both sides and sweep its children.
    async fn adopt(&self, s: &Situation) -> Result<()> {
        let path = local_path(s)?;
        let folder = remote_folder(s)?;
        save_synced(self.ctx, &RemoteObject::Folder(folder.clone()), &path, s.record.as_ref(), None).await?;
        self.request_crawl(&path, &folder.id);
        Ok(())
    }

    /// The local folder is gone. The remote subtree goes too, unless
    /// something in it changed since the last sync; then the remote side
    /// wins and is downloaded again.
    async fn local_deleted(&self, s: &Situation) -> Result<()> {
        let Some(record) = &s.record else {
            return Ok(());
        };
        if self.remote_subtree_changed(record).await? {
            let folder = match &s.object {
                Some(RemoteObject::Folder(folder)) => folder.clone(),
                _ => match self.ctx.session.get_object(&record.remote_id).await? {
                    RemoteObject::Folder(folder) => folder,
                    RemoteObject::Document(_) => {
                        return Err(SyncError::Inconsistent(format!("{} is not a folder", record.remote_id)));
                    }
                },
            };
            let target = self
                .ctx
                .local_path_for(folder.parent_id.as_ref(), &folder.name)
                .await?;
            tracing::info!(path = %target.display(), "remote subtree changed, restoring deleted folder");
            return self.recreate_local(Some(record), &folder, &target).await;
        }

        match self.ctx.session.delete_tree(&record.remote_id).await {
            Ok(()) | Err(RemoteError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }
        forget(self.ctx, record).await?;
        tracing::info!(remote_id = %record.remote_id, "remote folder tree deleted");
        Ok(())
    }

    /// The remote folder is gone. Unchanged local files go with it; changed
    /// ones survive and the folder is recreated remotely to hold them.
    async fn remote_deleted(&self, s: &Situation) -> Result<()> {
        let Some(record) = &s.record else {
            return Ok(());
        };
        let Some(path) = s.local_path.clone() else {
            return forget(self.ctx, record).await;
        };
        if stat(&path).await?.is_none() {
            return forget(self.ctx, record).await;
        }

        let changed = self.remove_unchanged_files(&path).await?;
        forget(self.ctx, record).await?;
        if changed == 0 {
            match tokio::fs::remove_dir_all(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            tracing::info!(path = %path.display(), "local folder deleted");
            return Ok(());
        }

        tracing::warn!(path = %path.display(), changed, "remote folder deleted but local files changed, uploading them again");
        let folder = self.create_remote(&path).await?;
        self.request_crawl(&path, &folder.id);
        Ok(())
    }

    /// Delete every file below `dir` whose record says it is in sync.
    /// Returns how many files were kept because they changed.
    async fn remove_unchanged_files(&self, dir: &Path) -> Result<usize> {
        let mut changed = 0;
        let mut pending = vec![dir.to_path_buf()];
        while let Some(current) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&current).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let Some(st) = stat(&path).await? else {
                    continue;
                };
                if st.is_dir {
                    pending.push(path);
                    continue;
                }
                let unchanged = match self.ctx.record_at(&path).await? {
                    Some(record) => record.last_local_write_time == st.write_time,
                    None => false,
                };
                if unchanged {
                    tokio::fs::remove_file(&path).await?;
                } else {
                    changed += 1;
                }
            }
        }
        Ok(changed)
    }

    /// Whether anything below the mapped folder changed remotely since it
    /// was last synced.
    async fn remote_subtree_changed(&self, record: &MappedObject) -> Result<bool> {
        let mut pending = vec![record.remote_id.clone()];
        while let Some(folder) = pending.pop() {
            let children = match self.ctx.session.get_children(&folder).await {
                Ok(children) => children,
                Err(RemoteError::NotFound(_)) => continue,
                Err(e) => return Err(e.into()),
            };
            for child in children {
                let Some(known) = self.ctx.storage.get_by_remote_id(child.id()).await? else {
                    return Ok(true);
                };
                if known.last_change_token.as_ref() != child.change_token() {
                    return Ok(true);
                }
                if let RemoteObject::Folder(f) = child {
                    pending.push(f.id);
                }
            }
        }
        Ok(false)
    }

    /// Create `target` for `folder` and map it without children, so the
    /// crawl downloads every child again.
    async fn recreate_local(
        &self,
        previous: Option<&MappedObject>,
        folder: &RemoteFolder,
        target: &Path,
    ) -> Result<()> {
        if let Some(previous) = previous {
            forget(self.ctx, previous).await?;
        }
        tokio::fs::create_dir_all(target).await?;
        save_synced(self.ctx, &RemoteObject::Folder(folder.clone()), target, None, None).await?;
        self.request_crawl(target, &folder.id);
        Ok(())
    }

    async fn refresh_record(&self, s: &Situation) -> Result<()> {
        let path = local_path(s)?;
        let object = match &s.object {
            Some(object) => object.clone(),
            None => {
                let record = s.record.as_ref().ok_or_else(|| unmapped(s))?;
                self.ctx.session.get_object(&record.remote_id).await?
            }
        };
        save_synced(self.ctx, &object, &path, s.record.as_ref(), None).await?;
        Ok(())
    }

    fn request_crawl(&self, local_folder: &Path, remote_folder: &RemoteId) {
        self.ctx.queue.add_event(SyncEvent::CrawlRequest(CrawlRequestEvent {
            local_folder: local_folder.to_path_buf(),
            remote_folder: remote_folder.clone(),
        }));
    }

    async fn child_folder(&self, parent: &RemoteId, name: &str) -> Result<RemoteFolder> {
        self.ctx
            .session
            .get_children(parent)
            .await?
            .into_iter()
            .find_map(|child| match child {
                RemoteObject::Folder(folder) if folder.name == name => Some(folder),
                _ => None,
            })
            .ok_or_else(|| SyncError::Inconsistent(format!("{} exists in {} but is not a folder", name, parent)))
    }
}

fn local_path(s: &Situation) -> Result<PathBuf> {
    s.local_path
        .clone()
        .ok_or_else(|| SyncError::Inconsistent(format!("no local path for {:?}", s.remote_id)))
}

fn remote_folder(s: &Situation) -> Result<&RemoteFolder> {
    s.object
        .as_ref()
        .and_then(RemoteObject::as_folder)
        .ok_or_else(|| SyncError::Inconsistent(format!("no remote folder for {:?}", s.local_path)))
}

fn unmapped(s: &Situation) -> SyncError {
    SyncError::Inconsistent(format!("{:?} has no record", s.remote_id))
}
