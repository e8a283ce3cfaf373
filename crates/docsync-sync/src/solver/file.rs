//! Strategies for documents.

use std::path::{Path, PathBuf};

use docsync_core::{MappedObject, RemoteDocument, RemoteId, RemoteObject};
use docsync_remote::RemoteError;
use docsync_transfer::TransmissionKind;

use crate::config::ConflictPolicy;
use crate::context::SyncContext;
use crate::error::{Result, SyncError};
use crate::local::{file_checksum, file_name, stat};
use crate::solver::conflict::conflict_copy_path;
use crate::solver::content::ContentTransfer;
use crate::solver::moves::{announce_local, apply_local_move, apply_remote_move};
use crate::solver::record::{forget, remote_record, save_synced};
use crate::solver::situation::Situation;
use crate::solver::strategy::Strategy;

/// Applies a [`Strategy`] to a document.
pub struct FileSolver<'a> {
    ctx: &'a SyncContext,
}

impl<'a> FileSolver<'a> {
    pub fn new(ctx: &'a SyncContext) -> Self {
        Self { ctx }
    }

    fn transfer(&self) -> ContentTransfer<'a> {
        ContentTransfer::new(self.ctx)
    }

    pub async fn solve(&self, strategy: Strategy, mut s: Situation) -> Result<()> {
        match strategy {
            Strategy::Nothing => Ok(()),
            Strategy::LocalAdded => self.local_added(s).await,
            Strategy::LocalChanged => self.local_changed(s).await,
            Strategy::LocalDeleted => self.local_deleted(&s).await,
            Strategy::LocalMoved => {
                self.apply_local_move(&mut s).await?;
                if s.local_content.is_changed() {
                    self.local_changed(s).await
                } else {
                    self.refresh_record(&s).await
                }
            }
            Strategy::RemoteAdded => self.remote_added(s).await,
            Strategy::RemoteChanged => self.remote_changed(&s).await,
            Strategy::RemoteDeleted => self.remote_deleted(&s).await,
            Strategy::RemoteMoved => {
                self.apply_remote_move(&mut s).await?;
                self.remote_changed(&s).await
            }
            Strategy::BothCreated | Strategy::BothChanged => self.reconcile_content(s).await,
            Strategy::BothDeleted => match &s.record {
                Some(record) => forget(self.ctx, record).await,
                None => Ok(()),
            },
            Strategy::LocalChangedRemoteMoved => {
                self.apply_remote_move(&mut s).await?;
                if s.remote_content.is_changed() {
                    self.reconcile_content(s).await
                } else {
                    self.local_changed(s).await
                }
            }
            // The local name and place win; content still follows both sides.
            Strategy::BothMoved | Strategy::LocalMovedRemoteChanged => {
                self.apply_local_move(&mut s).await?;
                if s.local_content.is_changed() && s.remote_content.is_changed() {
                    self.reconcile_content(s).await
                } else if s.local_content.is_changed() {
                    self.local_changed(s).await
                } else {
                    self.remote_changed(&s).await
                }
            }
            Strategy::ReuploadLocal => {
                if let Some(record) = s.record.take() {
                    forget(self.ctx, &record).await?;
                }
                s.object = None;
                s.remote_id = None;
                self.local_added(s).await
            }
            Strategy::RestoreRemote => self.restore_remote(&s).await,
        }
    }

    /// Create the document next to its mapped parent, then upload.
    async fn local_added(&self, mut s: Situation) -> Result<()> {
        let path = local_path(&s)?;
        let parent = self.ctx.parent_record(&path).await?;
        let name = file_name(&path).ok_or_else(|| SyncError::OutsideRoot(path.clone()))?;

        let doc = match self.ctx.session.create_document(&parent.remote_id, &name, None).await {
            Ok(doc) => doc,
            Err(RemoteError::NameConflict { .. }) => {
                let existing = self.child_document(&parent.remote_id, &name).await?;
                tracing::info!(path = %path.display(), remote_id = %existing.id, "created on both sides");
                s.remote_id = Some(existing.id.clone());
                s.object = Some(RemoteObject::Document(existing));
                return self.reconcile_content(s).await;
            }
            Err(e) => return Err(e.into()),
        };

        // Provisional record: a failed upload resumes through the
        // local-changed path instead of creating a second document.
        let provisional = remote_record(&RemoteObject::Document(doc.clone()), None)?;
        self.ctx.storage.save(&provisional).await?;
        tracing::info!(path = %path.display(), remote_id = %doc.id, "remote document created");

        self.upload(&doc.id, &path, TransmissionKind::UploadNew, Some(&provisional))
            .await
    }

    async fn local_changed(&self, s: Situation) -> Result<()> {
        let path = local_path(&s)?;
        let record = s.record.as_ref().ok_or_else(|| unmapped(&path))?;
        let local = file_checksum(&path, self.ctx.config.transfer.algorithm).await?;

        if record.checksum().as_ref() == Some(&local) {
            tracing::debug!(path = %path.display(), "content unchanged, record refreshed");
            return self.refresh_record(&s).await;
        }
        self.upload(&record.remote_id, &path, TransmissionKind::UploadModified, Some(record))
            .await
    }

    async fn local_deleted(&self, s: &Situation) -> Result<()> {
        let Some(record) = &s.record else {
            return Ok(());
        };
        match self.ctx.session.delete(&record.remote_id).await {
            Ok(()) | Err(RemoteError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }
        forget(self.ctx, record).await?;
        tracing::info!(remote_id = %record.remote_id, "remote document deleted");
        Ok(())
    }

    async fn remote_added(&self, mut s: Situation) -> Result<()> {
        let doc = document(&s)?.clone();
        let target = match &s.local_path {
            Some(path) => path.clone(),
            None => self.ctx.local_path_for(doc.parent_id.as_ref(), &doc.name).await?,
        };
        if stat(&target).await?.is_some() {
            s.local_path = Some(target);
            return self.reconcile_content(s).await;
        }
        self.download(&doc, &target, TransmissionKind::DownloadNew, None).await
    }

    async fn remote_changed(&self, s: &Situation) -> Result<()> {
        let path = local_path(s)?;
        let record = s.record.as_ref().ok_or_else(|| unmapped(&path))?;
        let doc = document(s)?;
        if s.remote_content.is_changed() {
            self.download(doc, &path, TransmissionKind::DownloadModified, Some(record))
                .await
        } else {
            self.refresh_record(s).await
        }
    }

    async fn remote_deleted(&self, s: &Situation) -> Result<()> {
        let Some(record) = &s.record else {
            return Ok(());
        };
        if let Some(path) = &s.local_path {
            match tokio::fs::remove_file(path).await {
                Ok(()) => tracing::info!(path = %path.display(), "local file deleted"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        forget(self.ctx, record).await
    }

    async fn restore_remote(&self, s: &Situation) -> Result<()> {
        let doc = document(s)?;
        let target = self.ctx.local_path_for(doc.parent_id.as_ref(), &doc.name).await?;
        tracing::info!(path = %target.display(), "remote changes win over local deletion");
        self.download(doc, &target, TransmissionKind::DownloadNew, s.record.as_ref())
            .await
    }

    /// Both sides hold content for the same document.
    async fn reconcile_content(&self, s: Situation) -> Result<()> {
        let path = local_path(&s)?;
        let doc = document(&s)?;
        let local = file_checksum(&path, self.ctx.config.transfer.algorithm).await?;

        if doc.content_checksum.as_ref() == Some(&local) {
            tracing::debug!(path = %path.display(), "both sides hold the same content");
            let object = RemoteObject::Document(doc.clone());
            save_synced(self.ctx, &object, &path, s.record.as_ref(), Some(&local)).await?;
            return Ok(());
        }

        match self.ctx.config.conflict {
            ConflictPolicy::LastWriteWins => {
                let local_time = stat(&path).await?.and_then(|st| st.write_time).unwrap_or(i64::MIN);
                if local_time > doc.last_modified {
                    tracing::info!(path = %path.display(), "conflict: local version is newer");
                    self.upload(&doc.id, &path, TransmissionKind::UploadModified, s.record.as_ref())
                        .await
                } else {
                    tracing::info!(path = %path.display(), "conflict: remote version is newer");
                    self.download(doc, &path, TransmissionKind::DownloadModified, s.record.as_ref())
                        .await
                }
            }
            ConflictPolicy::RenamedCopy => {
                let copy = conflict_copy_path(&path).await?;
                tokio::fs::rename(&path, &copy).await?;
                tracing::warn!(path = %path.display(), copy = %copy.display(), "conflict: local version kept as a copy");
                announce_local(self.ctx, &copy, false);
                self.download(doc, &path, TransmissionKind::DownloadModified, s.record.as_ref())
                    .await
            }
        }
    }

    async fn apply_local_move(&self, s: &mut Situation) -> Result<()> {
        let path = local_path(s)?;
        let record = s.record.as_ref().ok_or_else(|| unmapped(&path))?;
        let object = apply_local_move(self.ctx, record, &path).await?;
        s.remote_id = Some(object.id().clone());
        s.object = Some(object);
        Ok(())
    }

    async fn apply_remote_move(&self, s: &mut Situation) -> Result<()> {
        let record = s.record.as_ref().ok_or_else(|| unmapped_remote(s))?;
        let object = s.object.as_ref().ok_or_else(|| unmapped_remote(s))?;
        let target = apply_remote_move(self.ctx, record, object, s.local_path.as_deref()).await?;
        s.local_path = Some(target);
        Ok(())
    }

    /// Save the record of a document whose content is in sync, keeping the
    /// stored checksum.
    async fn refresh_record(&self, s: &Situation) -> Result<()> {
        let path = local_path(s)?;
        let object = match &s.object {
            Some(object) => object.clone(),
            None => {
                let record = s.record.as_ref().ok_or_else(|| unmapped(&path))?;
                self.ctx.session.get_object(&record.remote_id).await?
            }
        };
        save_synced(self.ctx, &object, &path, s.record.as_ref(), None).await?;
        Ok(())
    }

    async fn upload(
        &self,
        id: &RemoteId,
        path: &Path,
        kind: TransmissionKind,
        previous: Option<&MappedObject>,
    ) -> Result<()> {
        let uploaded = self.transfer().upload(id, path, kind).await?;
        let object = RemoteObject::Document(uploaded.document);
        save_synced(self.ctx, &object, path, previous, Some(&uploaded.checksum)).await?;
        tracing::info!(path = %path.display(), remote_id = %id, "uploaded");
        Ok(())
    }

    async fn download(
        &self,
        doc: &RemoteDocument,
        target: &Path,
        kind: TransmissionKind,
        previous: Option<&MappedObject>,
    ) -> Result<()> {
        let outcome = self.transfer().download(doc, target, kind).await?;
        let object = RemoteObject::Document(doc.clone());
        save_synced(self.ctx, &object, target, previous, Some(&outcome.checksum)).await?;
        tracing::info!(path = %target.display(), remote_id = %doc.id, "downloaded");
        Ok(())
    }

    async fn child_document(&self, parent: &RemoteId, name: &str) -> Result<RemoteDocument> {
        self.ctx
            .session
            .get_children(parent)
            .await?
            .into_iter()
            .find_map(|child| match child {
                RemoteObject::Document(doc) if doc.name == name => Some(doc),
                _ => None,
            })
            .ok_or_else(|| SyncError::Inconsistent(format!("{} exists in {} but is not a document", name, parent)))
    }
}

fn local_path(s: &Situation) -> Result<PathBuf> {
    s.local_path
        .clone()
        .ok_or_else(|| SyncError::Inconsistent(format!("no local path for {:?}", s.remote_id)))
}

fn document(s: &Situation) -> Result<&RemoteDocument> {
    s.object
        .as_ref()
        .and_then(RemoteObject::as_document)
        .ok_or_else(|| SyncError::Inconsistent(format!("no remote document for {:?}", s.local_path)))
}

fn unmapped(path: &Path) -> SyncError {
    SyncError::Inconsistent(format!("{} has no record", path.display()))
}

fn unmapped_remote(s: &Situation) -> SyncError {
    SyncError::Inconsistent(format!("{:?} has no record", s.remote_id))
}
