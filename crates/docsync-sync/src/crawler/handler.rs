//! The crawl handler: full syncs and subtree crawl requests.

use std::path::Path;

use async_trait::async_trait;
use uuid::Uuid;

use docsync_core::{
    CrawlRequestEvent, FullSyncCompletedEvent, MappedObject, RemoteHandle, RemoteObject,
    StartNextSyncEvent, SyncEvent,
};
use docsync_remote::RemoteError;

use crate::bus::{priority, SyncEventHandler};
use crate::context::SyncContext;
use crate::crawler::cycle::{plan_moves, MoveNode};
use crate::crawler::generator::{generate, MoveSide, PendingMove};
use crate::crawler::tree::TreeWalker;
use crate::error::Result;
use crate::filter::NameMatcher;
use crate::local::file_name;

/// Compares the local tree, the remote tree and the records below a folder
/// and enqueues one event per difference.
///
/// A full sync records the latest change-log token before crawling and
/// reports it in [`FullSyncCompletedEvent`], so changes made during the
/// crawl are polled again afterwards.
pub struct DescendantsCrawler {
    ctx: SyncContext,
    names: NameMatcher,
}

/// Hidden name a cyclic move parks its object under.
fn staging_name(name: &str) -> String {
    let tag = Uuid::new_v4().simple().to_string();
    format!(".{}.{}.sync", name, &tag[..8])
}

impl DescendantsCrawler {
    pub fn new(ctx: SyncContext) -> Result<Self> {
        let names = NameMatcher::new(&ctx.config.filter)?;
        Ok(Self { ctx, names })
    }

    async fn root_record(&self) -> Result<MappedObject> {
        if let Some(root) = self.ctx.storage.get_root().await? {
            return Ok(root);
        }
        let root = MappedObject::root(self.ctx.remote_root.clone());
        self.ctx.storage.save(&root).await?;
        tracing::info!(remote_id = %root.remote_id, "sync root mapped");
        Ok(root)
    }

    async fn full_sync(&self) -> Result<()> {
        let start_token = match self.ctx.session.latest_change_log_token().await {
            Ok(token) => token,
            Err(RemoteError::NotSupported(_)) => None,
            Err(e) => return Err(e.into()),
        };
        let root = self.root_record().await?;
        let emitted = self.crawl(Path::new(""), &root).await?;
        tracing::info!(emitted, token = ?start_token, "full sync crawled");
        self.ctx
            .queue
            .add_event(SyncEvent::FullSyncCompleted(FullSyncCompletedEvent { start_token }));
        Ok(())
    }

    async fn crawl_request(&self, request: &CrawlRequestEvent) -> Result<()> {
        let Some(folder) = self.ctx.storage.get_by_remote_id(&request.remote_folder).await? else {
            tracing::info!(remote_id = %request.remote_folder, "crawl target not mapped, full sync requested");
            self.ctx
                .queue
                .add_event(SyncEvent::StartNextSync(StartNextSyncEvent::full()));
            return Ok(());
        };
        let base = self.ctx.root.relative(&request.local_folder)?;
        let emitted = self.crawl(&base, &folder).await?;
        tracing::debug!(folder = %base.display(), emitted, "subtree crawled");
        Ok(())
    }

    /// Crawl below `folder`, mapped at `base`, and enqueue the resulting
    /// events. Returns how many were enqueued.
    pub async fn crawl(&self, base: &Path, folder: &MappedObject) -> Result<usize> {
        let snapshot = TreeWalker::new(&self.ctx, &self.names).snapshot(base, folder).await?;
        let plan = generate(&snapshot, &self.ctx.root).into_plan();
        let moves = self.schedule_moves(plan.moves).await?;

        let mut emitted = 0;
        let events = plan
            .folder_creations
            .into_iter()
            .chain(moves)
            .chain(plan.changes)
            .chain(plan.deletions)
            .chain(plan.file_creations);
        for event in events {
            self.ctx.queue.add_event(event);
            emitted += 1;
        }
        Ok(emitted)
    }

    /// Order the moves and park every member of a move cycle under a
    /// staging name, so each move lands on a free path.
    async fn schedule_moves(&self, moves: Vec<PendingMove>) -> Result<Vec<SyncEvent>> {
        let nodes: Vec<MoveNode<usize>> = moves
            .iter()
            .enumerate()
            .map(|(i, m)| MoveNode {
                key: i,
                current: m.current.clone(),
                target: m.target.clone(),
            })
            .collect();
        let plan = plan_moves(&nodes);

        let mut moves: Vec<Option<PendingMove>> = moves.into_iter().map(Some).collect();
        for cycle in &plan.cycles {
            tracing::info!(members = cycle.len(), "breaking move cycle");
            for &i in cycle {
                if let Some(pending) = moves[i].as_mut() {
                    self.stage(pending).await?;
                }
            }
        }
        Ok(plan
            .order
            .into_iter()
            .filter_map(|i| moves[i].take())
            .map(|m| m.event)
            .collect())
    }

    async fn stage(&self, pending: &mut PendingMove) -> Result<()> {
        let name = file_name(&pending.current).unwrap_or_default();
        let staged = staging_name(&name);
        match pending.side {
            MoveSide::Remote => {
                let from = self.ctx.root.absolute(&pending.current);
                let to = from.with_file_name(&staged);
                tokio::fs::rename(&from, &to).await?;
                tracing::debug!(from = %from.display(), to = %to.display(), "staged local entry");
                match &mut pending.event {
                    SyncEvent::File(e) => e.local_path = Some(to),
                    SyncEvent::Folder(e) => e.local_path = Some(to),
                    _ => {}
                }
            }
            MoveSide::Local => {
                let renamed = self.ctx.session.rename(&pending.key, &staged).await?;
                tracing::debug!(remote_id = %pending.key, staged, "staged remote object");
                match (&mut pending.event, renamed) {
                    (SyncEvent::File(e), RemoteObject::Document(doc)) => {
                        e.remote_file = Some(RemoteHandle::Present(doc));
                    }
                    (SyncEvent::Folder(e), RemoteObject::Folder(folder)) => {
                        e.remote_folder = Some(RemoteHandle::Present(folder));
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl SyncEventHandler for DescendantsCrawler {
    fn name(&self) -> &'static str {
        "descendants-crawler"
    }

    fn priority(&self) -> i32 {
        priority::HIGHER
    }

    async fn handle(&self, event: &mut SyncEvent) -> Result<bool> {
        match event {
            SyncEvent::StartNextSync(e) if e.full_sync_requested => {
                self.full_sync().await?;
                Ok(true)
            }
            SyncEvent::CrawlRequest(request) => {
                self.crawl_request(request).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
