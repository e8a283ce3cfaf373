//! The bus handler that reconciles canonical events.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use docsync_core::{CrawlRequestEvent, RemoteId, StartNextSyncEvent, SyncEvent};

use crate::bus::{priority, SyncEventHandler};
use crate::context::SyncContext;
use crate::error::{Result, SyncError};
use crate::solver::file::FileSolver;
use crate::solver::folder::FolderSolver;
use crate::solver::situation::{Situation, SituationDetector};
use crate::solver::strategy::Strategy;

/// Last handler on the bus. Consumes every [`SyncEvent::File`] and
/// [`SyncEvent::Folder`] that reaches it.
///
/// Each event is detected against the current state of both sides under the
/// object's lock, then resolved by the strategy its `(local, remote)` pair
/// selects. Events whose parent is not mapped yet are dropped in favor of a
/// crawl of the nearest mapped ancestor; each ancestor is crawled at most
/// once between two full syncs.
pub struct SyncMechanism {
    ctx: SyncContext,
    crawled: Mutex<HashSet<String>>,
}

impl SyncMechanism {
    pub fn new(ctx: SyncContext) -> Self {
        Self {
            ctx,
            crawled: Mutex::new(HashSet::new()),
        }
    }

    async fn reconcile(&self, situation: Situation) -> Result<()> {
        match self.solve(situation).await {
            Err(e) if e.is_permission_denied() => {
                tracing::warn!(error = %e, "permission denied, skipped");
                Ok(())
            }
            Err(SyncError::MissingParent { local, remote }) => {
                self.crawl_missing_parent(local.as_deref(), remote.as_ref()).await
            }
            other => other,
        }
    }

    async fn solve(&self, situation: Situation) -> Result<()> {
        let key = lock_key(&situation);
        let _guard = self.ctx.locks.lock(&key).await;

        let s = SituationDetector::new(&self.ctx).detect(situation).await?;
        if s.is_settled() {
            tracing::trace!(path = ?s.local_path, remote_id = ?s.remote_id, "already in sync");
            return Ok(());
        }

        let strategy = Strategy::select(s.local, s.remote);
        tracing::debug!(
            %strategy,
            kind = s.kind.as_str(),
            local = ?s.local,
            remote = ?s.remote,
            path = ?s.local_path,
            remote_id = ?s.remote_id,
            "solving"
        );
        if s.is_folder() {
            FolderSolver::new(&self.ctx).solve(strategy, s).await
        } else {
            FileSolver::new(&self.ctx).solve(strategy, s).await
        }
    }

    async fn crawl_missing_parent(&self, local: Option<&Path>, remote: Option<&RemoteId>) -> Result<()> {
        let Some(local) = local else {
            tracing::info!(parent = ?remote, "remote parent not mapped");
            if self.first_request("full") {
                self.ctx
                    .queue
                    .add_event(SyncEvent::StartNextSync(StartNextSyncEvent::full()));
            } else {
                self.ctx.queue.request_full_sync_later();
            }
            return Ok(());
        };

        let Some((folder, record)) = self.nearest_mapped(local).await? else {
            self.ctx.queue.request_full_sync_later();
            return Ok(());
        };
        if !self.first_request(&record.to_string()) {
            tracing::debug!(folder = %folder.display(), "crawl already requested");
            self.ctx.queue.request_full_sync_later();
            return Ok(());
        }
        tracing::info!(parent = %local.display(), crawl = %folder.display(), "parent not mapped, crawling ancestor");
        self.ctx.queue.add_event(SyncEvent::CrawlRequest(CrawlRequestEvent {
            local_folder: folder,
            remote_folder: record,
        }));
        Ok(())
    }

    /// Closest directory at or above `path` with a record.
    async fn nearest_mapped(&self, path: &Path) -> Result<Option<(PathBuf, RemoteId)>> {
        let mut current = Some(path);
        while let Some(dir) = current {
            if !self.ctx.root.contains(dir) {
                break;
            }
            if let Some(record) = self.ctx.record_at(dir).await? {
                return Ok(Some((dir.to_path_buf(), record.remote_id)));
            }
            current = dir.parent();
        }
        Ok(None)
    }

    fn first_request(&self, key: &str) -> bool {
        self.crawled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string())
    }
}

fn lock_key(s: &Situation) -> RemoteId {
    match (&s.remote_id, &s.local_path) {
        (Some(id), _) => id.clone(),
        (None, Some(path)) => RemoteId::new(format!("local:{}", path.display())),
        (None, None) => RemoteId::new("local:"),
    }
}

#[async_trait]
impl SyncEventHandler for SyncMechanism {
    fn name(&self) -> &'static str {
        "sync-mechanism"
    }

    fn priority(&self) -> i32 {
        priority::SYNC_MECHANISM
    }

    async fn handle(&self, event: &mut SyncEvent) -> Result<bool> {
        match event {
            SyncEvent::File(e) => {
                self.reconcile(Situation::from_file(e)).await?;
                Ok(true)
            }
            SyncEvent::Folder(e) => {
                self.reconcile(Situation::from_folder(e)).await?;
                Ok(true)
            }
            SyncEvent::FullSyncCompleted(_) => {
                self.crawled.lock().unwrap_or_else(PoisonError::into_inner).clear();
                Ok(false)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::SyncEventReceiver;
    use crate::config::{ConflictPolicy, SyncConfig};
    use crate::context::testing::{context, context_with};
    use bytes::Bytes;
    use docsync_core::{
        ChangeType, Checksum, FileEvent, FolderEvent, FullSyncCompletedEvent, HashAlgorithm,
        RemoteDocument, RemoteHandle, RemoteObject,
    };
    use docsync_remote::{RemoteError, RemoteSession};
    use docsync_store::MetaDataStorage;
    use docsync_testkit::TestFixture;

    fn drain(receiver: &mut SyncEventReceiver) -> Vec<SyncEvent> {
        let mut events = Vec::new();
        while let Some(event) = receiver.try_recv_event() {
            events.push(event);
        }
        events
    }

    fn local_file(path: PathBuf, change: ChangeType) -> SyncEvent {
        SyncEvent::File(FileEvent::local(path).with_local(change))
    }

    async fn current(fx: &TestFixture, id: &RemoteId) -> RemoteObject {
        fx.repo.get_object(id).await.unwrap()
    }

    async fn current_document(fx: &TestFixture, id: &RemoteId) -> RemoteDocument {
        match current(fx, id).await {
            RemoteObject::Document(doc) => doc,
            other => panic!("expected a document, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_local_creation_uploads_and_maps() {
        let fx = TestFixture::new().await;
        fx.write_local("report.txt", b"quarterly");
        let (ctx, _rx) = context(&fx);
        let mechanism = SyncMechanism::new(ctx);

        let mut event = local_file(fx.local("report.txt"), ChangeType::Created);
        assert!(mechanism.handle(&mut event).await.unwrap());

        let id = fx.repo.find_by_path("report.txt").unwrap();
        assert_eq!(fx.repo.content(&id), Some(b"quarterly".to_vec()));
        let record = fx.store.get_by_remote_id(&id).await.unwrap().unwrap();
        assert_eq!(record.checksum(), Some(Checksum::of(HashAlgorithm::Sha1, b"quarterly")));
        assert_eq!(
            record.last_local_write_time,
            docsync_testkit::fixtures::write_time(&fx.local("report.txt"))
        );

        // Replaying the same event is a no-op.
        let count = fx.repo.object_count();
        mechanism.handle(&mut event).await.unwrap();
        assert_eq!(fx.repo.object_count(), count);
    }

    #[tokio::test]
    async fn test_remote_creation_downloads() {
        let fx = TestFixture::new().await;
        let doc = fx.remote_document(&fx.root_id(), "a.txt", b"remote").await;
        let (ctx, _rx) = context(&fx);
        let mechanism = SyncMechanism::new(ctx);

        let mut event = SyncEvent::File(
            FileEvent::remote(RemoteHandle::Present(doc.clone())).with_remote(ChangeType::Created),
        );
        mechanism.handle(&mut event).await.unwrap();

        assert_eq!(fx.read_local("a.txt"), Some(b"remote".to_vec()));
        assert!(fx.store.get_by_remote_id(&doc.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_local_edit_uploads() {
        let fx = TestFixture::new().await;
        let doc = fx.synced_document(&fx.root_id(), "a.txt", b"v1").await;
        std::thread::sleep(std::time::Duration::from_millis(20));
        fx.write_local("a.txt", b"version two");
        let (ctx, _rx) = context(&fx);

        let mut event = local_file(fx.local("a.txt"), ChangeType::Changed);
        SyncMechanism::new(ctx).handle(&mut event).await.unwrap();
        assert_eq!(fx.repo.content(&doc.id), Some(b"version two".to_vec()));
    }

    #[tokio::test]
    async fn test_remote_edit_downloads() {
        let fx = TestFixture::new().await;
        let doc = fx.synced_document(&fx.root_id(), "a.txt", b"v1").await;
        fx.repo
            .set_content_stream(&doc.id, Bytes::from_static(b"remote v2"))
            .await
            .unwrap();
        let (ctx, _rx) = context(&fx);

        let fresh = current_document(&fx, &doc.id).await;
        let mut event = SyncEvent::File(
            FileEvent::remote(RemoteHandle::Present(fresh)).with_remote(ChangeType::Changed),
        );
        SyncMechanism::new(ctx).handle(&mut event).await.unwrap();
        assert_eq!(fx.read_local("a.txt"), Some(b"remote v2".to_vec()));
    }

    #[tokio::test]
    async fn test_local_delete_removes_remote() {
        let fx = TestFixture::new().await;
        let doc = fx.synced_document(&fx.root_id(), "a.txt", b"a").await;
        std::fs::remove_file(fx.local("a.txt")).unwrap();
        let (ctx, _rx) = context(&fx);

        let mut event = local_file(fx.local("a.txt"), ChangeType::Deleted);
        SyncMechanism::new(ctx).handle(&mut event).await.unwrap();
        assert!(matches!(fx.repo.get_object(&doc.id).await, Err(RemoteError::NotFound(_))));
        assert!(fx.store.get_by_remote_id(&doc.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remote_delete_of_edited_file_reuploads() {
        let fx = TestFixture::new().await;
        let doc = fx.synced_document(&fx.root_id(), "a.txt", b"a").await;
        std::thread::sleep(std::time::Duration::from_millis(20));
        fx.write_local("a.txt", b"edited");
        fx.repo.delete(&doc.id).await.unwrap();
        let (ctx, _rx) = context(&fx);

        let mut event = SyncEvent::File(
            FileEvent::remote(RemoteHandle::Gone(doc.id.clone())).with_remote(ChangeType::Deleted),
        );
        SyncMechanism::new(ctx).handle(&mut event).await.unwrap();

        let id = fx.repo.find_by_path("a.txt").unwrap();
        assert_ne!(id, doc.id);
        assert_eq!(fx.repo.content(&id), Some(b"edited".to_vec()));
        assert_eq!(fx.read_local("a.txt"), Some(b"edited".to_vec()));
    }

    #[tokio::test]
    async fn test_local_move_moves_remote() {
        let fx = TestFixture::new().await;
        let docs = fx.synced_folder(&fx.root_id(), "docs").await;
        let doc = fx.synced_document(&fx.root_id(), "a.txt", b"a").await;
        std::fs::rename(fx.local("a.txt"), fx.local("docs/b.txt")).unwrap();
        let (ctx, _rx) = context(&fx);

        let mut event = SyncEvent::File(FileEvent::moved(
            fx.local("a.txt"),
            fx.local("docs/b.txt"),
            None,
        ));
        SyncMechanism::new(ctx).handle(&mut event).await.unwrap();

        let object = current(&fx, &doc.id).await;
        assert_eq!(object.name(), "b.txt");
        assert_eq!(object.parent_id(), Some(&docs.id));
        let record = fx.store.get_by_remote_id(&doc.id).await.unwrap().unwrap();
        assert_eq!(record.name, "b.txt");
    }

    #[tokio::test]
    async fn test_remote_move_moves_local() {
        let fx = TestFixture::new().await;
        let docs = fx.synced_folder(&fx.root_id(), "docs").await;
        let doc = fx.synced_document(&fx.root_id(), "a.txt", b"a").await;
        fx.repo.move_object(&doc.id, &docs.id).await.unwrap();
        let (ctx, _rx) = context(&fx);

        let moved = current_document(&fx, &doc.id).await;
        let mut event = SyncEvent::File(
            FileEvent::remote(RemoteHandle::Present(moved)).with_remote(ChangeType::Moved),
        );
        SyncMechanism::new(ctx).handle(&mut event).await.unwrap();
        assert!(fx.read_local("a.txt").is_none());
        assert_eq!(fx.read_local("docs/a.txt"), Some(b"a".to_vec()));
    }

    /// a.txt renamed to c.txt on disk while the server renamed it to b.txt.
    async fn both_moved(fx: &TestFixture, doc: &RemoteDocument) -> SyncEvent {
        let mut event = FileEvent::moved(fx.local("a.txt"), fx.local("c.txt"), None)
            .with_remote(ChangeType::Moved);
        event.remote_file = Some(RemoteHandle::Present(current_document(fx, &doc.id).await));
        SyncEvent::File(event)
    }

    #[tokio::test]
    async fn test_both_moved_downloads_remote_edit() {
        let fx = TestFixture::new().await;
        let doc = fx.synced_document(&fx.root_id(), "a.txt", b"base").await;
        fx.repo
            .set_content_stream(&doc.id, Bytes::from_static(b"remote edit"))
            .await
            .unwrap();
        fx.repo.rename(&doc.id, "b.txt").await.unwrap();
        std::fs::rename(fx.local("a.txt"), fx.local("c.txt")).unwrap();
        let (ctx, _rx) = context(&fx);
        let mechanism = SyncMechanism::new(ctx);

        for _ in 0..2 {
            let mut event = both_moved(&fx, &doc).await;
            mechanism.handle(&mut event).await.unwrap();
        }

        assert_eq!(fx.read_local("c.txt"), Some(b"remote edit".to_vec()));
        assert_eq!(current(&fx, &doc.id).await.name(), "c.txt");
        assert_eq!(fx.repo.content(&doc.id), Some(b"remote edit".to_vec()));
        let record = fx.store.get_by_remote_id(&doc.id).await.unwrap().unwrap();
        assert_eq!(record.checksum(), Some(Checksum::of(HashAlgorithm::Sha1, b"remote edit")));
    }

    #[tokio::test]
    async fn test_both_moved_uploads_local_edit() {
        let fx = TestFixture::new().await;
        let doc = fx.synced_document(&fx.root_id(), "a.txt", b"base").await;
        fx.repo.rename(&doc.id, "b.txt").await.unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        fx.write_local("a.txt", b"local edit");
        std::fs::rename(fx.local("a.txt"), fx.local("c.txt")).unwrap();
        let (ctx, _rx) = context(&fx);

        let mut event = both_moved(&fx, &doc).await;
        SyncMechanism::new(ctx).handle(&mut event).await.unwrap();

        assert_eq!(current(&fx, &doc.id).await.name(), "c.txt");
        assert_eq!(fx.repo.content(&doc.id), Some(b"local edit".to_vec()));
        assert_eq!(fx.read_local("c.txt"), Some(b"local edit".to_vec()));
    }

    #[tokio::test]
    async fn test_both_moved_with_both_edits_keeps_conflict_copy() {
        let fx = TestFixture::new().await;
        let doc = fx.synced_document(&fx.root_id(), "a.txt", b"base").await;
        fx.repo
            .set_content_stream(&doc.id, Bytes::from_static(b"remote edit"))
            .await
            .unwrap();
        fx.repo.rename(&doc.id, "b.txt").await.unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        fx.write_local("a.txt", b"local edit");
        std::fs::rename(fx.local("a.txt"), fx.local("c.txt")).unwrap();
        let mut config = SyncConfig::default();
        config.conflict = ConflictPolicy::RenamedCopy;
        let (ctx, mut receiver) = context_with(&fx, config);

        let mut event = both_moved(&fx, &doc).await;
        SyncMechanism::new(ctx).handle(&mut event).await.unwrap();

        assert_eq!(current(&fx, &doc.id).await.name(), "c.txt");
        assert_eq!(fx.read_local("c.txt"), Some(b"remote edit".to_vec()));
        assert_eq!(fx.repo.content(&doc.id), Some(b"remote edit".to_vec()));
        let copy = drain(&mut receiver)
            .into_iter()
            .find_map(|e| match e {
                SyncEvent::Fs(fs) => Some(fs.path),
                _ => None,
            })
            .unwrap();
        assert_eq!(std::fs::read(&copy).unwrap(), b"local edit");
        assert!(copy.to_string_lossy().contains("c (Conflict "));
    }

    #[tokio::test]
    async fn test_conflict_renamed_copy_keeps_both() {
        let fx = TestFixture::new().await;
        let doc = fx.synced_document(&fx.root_id(), "a.txt", b"base").await;
        std::thread::sleep(std::time::Duration::from_millis(20));
        fx.write_local("a.txt", b"local edit");
        fx.repo
            .set_content_stream(&doc.id, Bytes::from_static(b"remote edit"))
            .await
            .unwrap();
        let mut config = SyncConfig::default();
        config.conflict = ConflictPolicy::RenamedCopy;
        let (ctx, mut receiver) = context_with(&fx, config);

        let mut event = local_file(fx.local("a.txt"), ChangeType::Changed);
        SyncMechanism::new(ctx).handle(&mut event).await.unwrap();

        assert_eq!(fx.read_local("a.txt"), Some(b"remote edit".to_vec()));
        let copy = drain(&mut receiver)
            .into_iter()
            .find_map(|e| match e {
                SyncEvent::Fs(fs) => Some(fs.path),
                _ => None,
            })
            .unwrap();
        assert_eq!(std::fs::read(&copy).unwrap(), b"local edit");
        assert!(copy.to_string_lossy().contains("a (Conflict "));
    }

    #[tokio::test]
    async fn test_conflict_last_write_wins() {
        let fx = TestFixture::new().await;
        let doc = fx.synced_document(&fx.root_id(), "a.txt", b"base").await;
        fx.repo
            .set_content_stream(&doc.id, Bytes::from_static(b"remote edit"))
            .await
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        fx.write_local("a.txt", b"newer local edit");
        let (ctx, _rx) = context(&fx);

        let mut event = local_file(fx.local("a.txt"), ChangeType::Changed);
        SyncMechanism::new(ctx).handle(&mut event).await.unwrap();
        assert_eq!(fx.repo.content(&doc.id), Some(b"newer local edit".to_vec()));
    }

    #[tokio::test]
    async fn test_missing_parent_requests_ancestor_crawl_once() {
        let fx = TestFixture::new().await;
        fx.write_local("new/deep/a.txt", b"a");
        let (ctx, mut receiver) = context(&fx);
        let mechanism = SyncMechanism::new(ctx);

        let mut event = local_file(fx.local("new/deep/a.txt"), ChangeType::Created);
        assert!(mechanism.handle(&mut event).await.unwrap());
        assert_eq!(
            drain(&mut receiver),
            vec![SyncEvent::CrawlRequest(CrawlRequestEvent {
                local_folder: fx.root(),
                remote_folder: fx.root_id(),
            })]
        );

        mechanism.handle(&mut event).await.unwrap();
        assert!(drain(&mut receiver).is_empty());

        let mut done = SyncEvent::FullSyncCompleted(FullSyncCompletedEvent { start_token: None });
        assert!(!mechanism.handle(&mut done).await.unwrap());
        mechanism.handle(&mut event).await.unwrap();
        assert_eq!(drain(&mut receiver).len(), 1);
    }

    #[tokio::test]
    async fn test_permission_denied_is_skipped() {
        let fx = TestFixture::new().await;
        let doc = fx.synced_document(&fx.root_id(), "a.txt", b"a").await;
        std::fs::remove_file(fx.local("a.txt")).unwrap();
        fx.repo.deny(&doc.id);
        let (ctx, _rx) = context(&fx);

        let mut event = local_file(fx.local("a.txt"), ChangeType::Deleted);
        assert!(SyncMechanism::new(ctx).handle(&mut event).await.unwrap());
    }

    #[tokio::test]
    async fn test_local_folder_creation_maps_folder() {
        let fx = TestFixture::new().await;
        fx.mkdir_local("photos");
        let (ctx, _rx) = context(&fx);

        let mut event = SyncEvent::Folder(FolderEvent::local(fx.local("photos")).with_local(ChangeType::Created));
        SyncMechanism::new(ctx).handle(&mut event).await.unwrap();

        let id = fx.repo.find_by_path("photos").unwrap();
        assert!(fx.store.get_by_remote_id(&id).await.unwrap().unwrap().is_folder());
    }

    #[tokio::test]
    async fn test_remote_folder_delete_keeps_changed_files() {
        let fx = TestFixture::new().await;
        let docs = fx.synced_folder(&fx.root_id(), "docs").await;
        fx.synced_document(&docs.id, "docs/same.txt", b"same").await;
        fx.synced_document(&docs.id, "docs/edited.txt", b"v1").await;
        std::thread::sleep(std::time::Duration::from_millis(20));
        fx.write_local("docs/edited.txt", b"v2");
        fx.repo.delete_tree(&docs.id).await.unwrap();
        let (ctx, mut receiver) = context(&fx);

        let mut event = SyncEvent::Folder(
            FolderEvent::remote(RemoteHandle::Gone(docs.id.clone())).with_remote(ChangeType::Deleted),
        );
        SyncMechanism::new(ctx).handle(&mut event).await.unwrap();

        assert!(fx.read_local("docs/same.txt").is_none());
        assert_eq!(fx.read_local("docs/edited.txt"), Some(b"v2".to_vec()));
        let recreated = fx.repo.find_by_path("docs").unwrap();
        assert_ne!(recreated, docs.id);
        assert!(drain(&mut receiver).iter().any(|e| matches!(
            e,
            SyncEvent::CrawlRequest(r) if r.remote_folder == recreated
        )));
    }

    #[tokio::test]
    async fn test_remote_folder_delete_removes_unchanged_tree() {
        let fx = TestFixture::new().await;
        let docs = fx.synced_folder(&fx.root_id(), "docs").await;
        fx.synced_document(&docs.id, "docs/a.txt", b"a").await;
        fx.repo.delete_tree(&docs.id).await.unwrap();
        let (ctx, _rx) = context(&fx);

        let mut event = SyncEvent::Folder(
            FolderEvent::remote(RemoteHandle::Gone(docs.id.clone())).with_remote(ChangeType::Deleted),
        );
        SyncMechanism::new(ctx).handle(&mut event).await.unwrap();
        assert!(!fx.local("docs").exists());
        assert!(fx.store.get_by_remote_id(&docs.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_other_events_pass_through() {
        let fx = TestFixture::new().await;
        let (ctx, _rx) = context(&fx);
        let mut event = SyncEvent::StartNextSync(StartNextSyncEvent::incremental());
        assert!(!SyncMechanism::new(ctx).handle(&mut event).await.unwrap());
    }
}
