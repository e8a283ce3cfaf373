//! Fetchers fill in the side of a canonical event its producer could not see.
//!
//! Local producers know paths but not remote snapshots; the change log knows
//! snapshots but not local paths. Both run after the transformers and before
//! the solver.

use std::path::PathBuf;

use async_trait::async_trait;

use docsync_core::{
    ChangeType, ContentChangeType, FileEvent, FolderEvent, MappedObject, RemoteHandle, RemoteId,
    RemoteObject, SyncEvent,
};
use docsync_remote::RemoteError;

use crate::bus::{priority, SyncEventHandler};
use crate::context::SyncContext;
use crate::error::{Result, SyncError};

/// Attaches a fresh remote snapshot to locally observed events.
///
/// When the mapped object no longer exists the handle becomes `Gone` and an
/// unset remote side becomes `Deleted`.
pub struct RemoteObjectFetcher {
    ctx: SyncContext,
}

impl RemoteObjectFetcher {
    pub fn new(ctx: SyncContext) -> Self {
        Self { ctx }
    }

    /// Record of the object an event's local side refers to.
    async fn record_for(&self, local_path: Option<&PathBuf>, old_path: Option<&PathBuf>) -> Result<Option<MappedObject>> {
        if let Some(old) = old_path {
            if let Some(record) = self.ctx.record_at(old).await? {
                return Ok(Some(record));
            }
        }
        match local_path {
            Some(path) => self.ctx.record_at(path).await,
            None => Ok(None),
        }
    }

    async fn fetch(&self, record: &MappedObject) -> Result<Option<RemoteObject>> {
        match self.ctx.session.get_object(&record.remote_id).await {
            Ok(object) => Ok(Some(object)),
            Err(RemoteError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn fill_file(&self, e: &mut FileEvent) -> Result<()> {
        let old = e.moved_from.as_ref().and_then(|m| m.old_local_path.as_ref());
        let Some(record) = self.record_for(e.local_path.as_ref(), old).await? else {
            return Ok(());
        };
        match self.fetch(&record).await? {
            Some(RemoteObject::Document(doc)) => e.remote_file = Some(RemoteHandle::Present(doc)),
            Some(RemoteObject::Folder(_)) => {
                return Err(SyncError::Inconsistent(format!(
                    "{} is mapped as a file but is a folder",
                    record.remote_id
                )))
            }
            None => {
                tracing::debug!(remote_id = %record.remote_id, "mapped document is gone");
                e.remote_file = Some(RemoteHandle::Gone(record.remote_id.clone()));
                if e.remote == ChangeType::None {
                    e.remote = ChangeType::Deleted;
                    e.remote_content = ContentChangeType::Deleted;
                }
            }
        }
        Ok(())
    }

    async fn fill_folder(&self, e: &mut FolderEvent) -> Result<()> {
        let old = e.moved_from.as_ref().and_then(|m| m.old_local_path.as_ref());
        let Some(record) = self.record_for(e.local_path.as_ref(), old).await? else {
            return Ok(());
        };
        match self.fetch(&record).await? {
            Some(RemoteObject::Folder(folder)) => e.remote_folder = Some(RemoteHandle::Present(folder)),
            Some(RemoteObject::Document(_)) => {
                return Err(SyncError::Inconsistent(format!(
                    "{} is mapped as a folder but is a document",
                    record.remote_id
                )))
            }
            None => {
                tracing::debug!(remote_id = %record.remote_id, "mapped folder is gone");
                e.remote_folder = Some(RemoteHandle::Gone(record.remote_id.clone()));
                if e.remote == ChangeType::None {
                    e.remote = ChangeType::Deleted;
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl SyncEventHandler for RemoteObjectFetcher {
    fn name(&self) -> &'static str {
        "remote-object-fetcher"
    }

    fn priority(&self) -> i32 {
        priority::NORMAL
    }

    async fn handle(&self, event: &mut SyncEvent) -> Result<bool> {
        match event {
            SyncEvent::File(e) if e.remote_file.is_none() => self.fill_file(e).await?,
            SyncEvent::Folder(e) if e.remote_folder.is_none() => self.fill_folder(e).await?,
            _ => {}
        }
        Ok(false)
    }
}

/// Attaches the local path to remotely observed events: the mapped path for
/// known objects, the path under the mapped parent for new ones.
pub struct LocalObjectFetcher {
    ctx: SyncContext,
}

impl LocalObjectFetcher {
    pub fn new(ctx: SyncContext) -> Self {
        Self { ctx }
    }

    async fn locate(&self, object: Option<&RemoteObject>, id: &RemoteId) -> Result<Option<PathBuf>> {
        if let Some(record) = self.ctx.storage.get_by_remote_id(id).await? {
            return self.ctx.local_path_of(&record).await;
        }
        let Some(object) = object else {
            return Ok(None);
        };
        match self.ctx.local_path_for(object.parent_id(), object.name()).await {
            Ok(path) => Ok(Some(path)),
            // The solver turns this into a crawl of the nearest mapped ancestor.
            Err(SyncError::MissingParent { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl SyncEventHandler for LocalObjectFetcher {
    fn name(&self) -> &'static str {
        "local-object-fetcher"
    }

    fn priority(&self) -> i32 {
        priority::NORMAL
    }

    async fn handle(&self, event: &mut SyncEvent) -> Result<bool> {
        match event {
            SyncEvent::File(e) if e.local_path.is_none() => {
                if let Some(handle) = &e.remote_file {
                    let object = handle.object().cloned().map(RemoteObject::Document);
                    e.local_path = self.locate(object.as_ref(), handle.id()).await?;
                }
            }
            SyncEvent::Folder(e) if e.local_path.is_none() => {
                if let Some(handle) = &e.remote_folder {
                    let object = handle.object().cloned().map(RemoteObject::Folder);
                    e.local_path = self.locate(object.as_ref(), handle.id()).await?;
                }
            }
            _ => {}
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::context;
    use docsync_remote::RemoteSession;
    use docsync_testkit::TestFixture;

    #[tokio::test]
    async fn test_remote_snapshot_attached() {
        let fx = TestFixture::new().await;
        let doc = fx.synced_document(&fx.root_id(), "a.txt", b"x").await;
        let (ctx, _rx) = context(&fx);
        let fetcher = RemoteObjectFetcher::new(ctx);

        let mut event = SyncEvent::File(FileEvent::local(fx.local("a.txt")).with_local(ChangeType::Changed));
        fetcher.handle(&mut event).await.unwrap();
        match event {
            SyncEvent::File(e) => {
                assert_eq!(e.remote_id(), Some(&doc.id));
                assert!(e.remote_document().is_some());
                assert_eq!(e.remote, ChangeType::None);
            }
            other => panic!("expected a file event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_gone_remote_marks_deleted() {
        let fx = TestFixture::new().await;
        let doc = fx.synced_document(&fx.root_id(), "a.txt", b"x").await;
        fx.repo.delete(&doc.id).await.unwrap();
        let (ctx, _rx) = context(&fx);
        let fetcher = RemoteObjectFetcher::new(ctx);

        let mut event = SyncEvent::File(FileEvent::local(fx.local("a.txt")).with_local(ChangeType::Changed));
        fetcher.handle(&mut event).await.unwrap();
        match event {
            SyncEvent::File(e) => {
                assert!(e.remote_file.unwrap().is_gone());
                assert_eq!(e.remote, ChangeType::Deleted);
            }
            other => panic!("expected a file event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_moved_event_uses_old_path() {
        let fx = TestFixture::new().await;
        let folder = fx.synced_folder(&fx.root_id(), "d").await;
        std::fs::rename(fx.local("d"), fx.local("e")).unwrap();
        let (ctx, _rx) = context(&fx);
        let fetcher = RemoteObjectFetcher::new(ctx);

        let mut event = SyncEvent::Folder(FolderEvent::moved(fx.local("d"), fx.local("e"), None));
        fetcher.handle(&mut event).await.unwrap();
        match event {
            SyncEvent::Folder(e) => assert_eq!(e.remote_id(), Some(&folder.id)),
            other => panic!("expected a folder event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_local_path_from_record_or_parent() {
        let fx = TestFixture::new().await;
        let folder = fx.synced_folder(&fx.root_id(), "d").await;
        let known = fx.synced_document(&folder.id, "d/a.txt", b"x").await;
        let fresh = fx.remote_document(&folder.id, "b.txt", b"y").await;
        let orphan_parent = fx.remote_folder(&fx.root_id(), "unmapped").await;
        let orphan = fx.remote_document(&orphan_parent.id, "c.txt", b"z").await;
        let (ctx, _rx) = context(&fx);
        let fetcher = LocalObjectFetcher::new(ctx);

        for (doc, expected) in [
            (known, Some(fx.local("d/a.txt"))),
            (fresh, Some(fx.local("d/b.txt"))),
            (orphan, None),
        ] {
            let mut event = SyncEvent::File(
                FileEvent::remote(RemoteHandle::Present(doc)).with_remote(ChangeType::Changed),
            );
            fetcher.handle(&mut event).await.unwrap();
            match event {
                SyncEvent::File(e) => assert_eq!(e.local_path, expected),
                other => panic!("expected a file event, got {:?}", other),
            }
        }
    }
}
