//! The sync engine: every handler wired onto one bus.
//!
//! Dispatch order, highest priority first:
//!
//! | Priority | Handlers |
//! |---|---|
//! | `DEBUG` | debug logging, event forwarder |
//! | `HIGHER` | change-log poller, change accumulator, crawler |
//! | `FILTER` | already-handled, selective ignore, ignored names, invalid names, change-log loop |
//! | `NORMAL` | filesystem transformer, change-log transformer, remote and local fetchers |
//! | `SYNC_MECHANISM` | situation solver |

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use uuid::Uuid;

use docsync_core::{MappedObject, RemoteId, StartNextSyncEvent, SyncEvent};
use docsync_remote::RemoteSession;
use docsync_store::{MetaDataStorage, ObjectLocks, TransferStorage};
use docsync_sync::{
    AlreadyHandledFilter, ChangeLogLoopFilter, ContentChangeAccumulator,
    ContentChangeEventTransformer, ContentChanges, DebugLoggingHandler, DescendantsCrawler,
    EventForwarder, EventLoop, FsEventTransformer, FsWatcher, IdentityReader,
    IgnoredEntitiesStorage, IgnoredNamesFilter, InvalidNameFilter, LocalObjectFetcher,
    RemoteObjectFetcher, SelectiveIgnoreFilter, SyncContext, SyncEventHandler, SyncEventManager,
    SyncEventQueue, SyncMechanism, SyncRoot,
};
use docsync_transfer::{TransmissionEvent, TransmissionManager};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::scheduler::SyncScheduler;

/// A running synchronization between a local folder and a remote folder.
pub struct SyncEngine {
    ctx: SyncContext,
    forwarder: EventForwarder,
    scheduler: SyncScheduler,
    watcher: Option<FsWatcher>,
    event_loop: JoinHandle<()>,
}

impl SyncEngine {
    /// Map the roots, register every handler and start the event loop, the
    /// scheduler and, when configured, the filesystem watcher.
    pub async fn start<S>(
        config: EngineConfig,
        session: Arc<dyn RemoteSession>,
        store: Arc<S>,
    ) -> anyhow::Result<Self>
    where
        S: MetaDataStorage + TransferStorage + 'static,
    {
        let root = check_root(&config.root).await?;
        let remote_root = match config.remote_root.clone() {
            Some(id) => id,
            None => {
                session
                    .repository_info()
                    .await
                    .context("reading repository info")?
                    .root_folder_id
            }
        };
        map_root(store.as_ref(), &remote_root).await?;

        let ignored = IgnoredEntitiesStorage::load(store.as_ref())
            .await
            .context("loading ignored entities")?;

        let (queue, receiver) = SyncEventQueue::new();
        let ctx = SyncContext {
            session,
            storage: store.clone(),
            transfers: store,
            root: SyncRoot::new(root),
            remote_root,
            identity: identity_reader(),
            queue: queue.clone(),
            config: Arc::new(config.sync.clone()),
            locks: Arc::new(ObjectLocks::new()),
            transmissions: TransmissionManager::new(),
            ignored,
        };

        let forwarder = EventForwarder::new();
        let handlers = handlers(&ctx, &forwarder).context("building event handlers")?;
        let manager = SyncEventManager::new(handlers);
        tracing::debug!(handlers = ?manager.handler_names(), "handlers registered");
        let event_loop = tokio::spawn(EventLoop::new(receiver, manager, queue.clone()).run());

        let watcher = if config.watch {
            Some(FsWatcher::start(ctx.clone()).context("starting filesystem watcher")?)
        } else {
            None
        };
        let scheduler = SyncScheduler::start(queue, config.poll_interval, config.initial_full_sync);

        tracing::info!(
            root = %ctx.root.path().display(),
            remote_root = %ctx.remote_root,
            "sync engine started"
        );
        Ok(Self {
            ctx,
            forwarder,
            scheduler,
            watcher,
            event_loop,
        })
    }

    /// Queue a sync round now instead of waiting for the scheduler.
    pub fn sync_now(&self, full: bool) {
        let event = if full {
            StartNextSyncEvent::full()
        } else {
            StartNextSyncEvent::incremental()
        };
        self.ctx.queue.add_event(SyncEvent::StartNextSync(event));
    }

    /// Wait until every queued event, and every event those produced, has
    /// been dispatched.
    pub async fn wait_until_idle(&self) {
        self.ctx.queue.wait_until_idle().await;
    }

    pub fn pause(&self) {
        self.scheduler.pause();
    }

    pub fn resume(&self) {
        self.scheduler.resume();
    }

    /// Progress of uploads and downloads.
    pub fn subscribe_transmissions(&self) -> broadcast::Receiver<TransmissionEvent> {
        self.ctx.transmissions.subscribe()
    }

    /// Sync rounds, full sync completions and ignored requests.
    pub fn subscribe_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.forwarder.subscribe()
    }

    /// Abort an active transmission. Its resume state is kept.
    pub fn abort_transmission(&self, id: &Uuid) -> Result<()> {
        if self.ctx.transmissions.abort(id) {
            Ok(())
        } else {
            Err(EngineError::UnknownTransmission(*id))
        }
    }

    pub fn root(&self) -> &Path {
        self.ctx.root.path()
    }

    pub fn remote_root(&self) -> &RemoteId {
        &self.ctx.remote_root
    }

    /// Stop producing events, abort running transfers and let the event
    /// loop finish what is already queued.
    pub async fn stop(self) {
        let Self {
            ctx,
            scheduler,
            watcher,
            event_loop,
            ..
        } = self;

        scheduler.stop().await;
        if let Some(watcher) = watcher {
            watcher.stop().await;
        }
        ctx.transmissions.abort_all();
        ctx.queue.stop();
        if let Err(e) = event_loop.await {
            tracing::warn!(error = %e, "event loop task failed");
        }
        tracing::info!(root = %ctx.root.path().display(), "sync engine stopped");
    }
}

fn handlers(ctx: &SyncContext, forwarder: &EventForwarder) -> docsync_sync::Result<Vec<Arc<dyn SyncEventHandler>>> {
    let handlers: Vec<Arc<dyn SyncEventHandler>> = vec![
        Arc::new(DebugLoggingHandler),
        Arc::new(forwarder.clone()),
        Arc::new(ContentChanges::new(ctx.clone())),
        Arc::new(ContentChangeAccumulator::new(ctx.clone())),
        Arc::new(DescendantsCrawler::new(ctx.clone())?),
        Arc::new(AlreadyHandledFilter::new(ctx.clone())),
        Arc::new(SelectiveIgnoreFilter::new(ctx.clone())),
        Arc::new(IgnoredNamesFilter::new(ctx.clone())?),
        Arc::new(InvalidNameFilter::new(ctx.clone())),
        Arc::new(ChangeLogLoopFilter::new(ctx.clone())),
        Arc::new(FsEventTransformer::new(ctx.clone())),
        Arc::new(ContentChangeEventTransformer::new(ctx.clone())),
        Arc::new(RemoteObjectFetcher::new(ctx.clone())),
        Arc::new(LocalObjectFetcher::new(ctx.clone())),
        Arc::new(SyncMechanism::new(ctx.clone())),
    ];
    Ok(handlers)
}

/// Canonical form of the sync root, which must be an existing directory.
async fn check_root(root: &Path) -> Result<PathBuf> {
    let canonical = tokio::fs::canonicalize(root)
        .await
        .map_err(|_| EngineError::InvalidRoot(root.to_path_buf()))?;
    let metadata = tokio::fs::metadata(&canonical)
        .await
        .map_err(|_| EngineError::InvalidRoot(root.to_path_buf()))?;
    if !metadata.is_dir() {
        return Err(EngineError::InvalidRoot(root.to_path_buf()));
    }
    Ok(canonical)
}

/// Record the root mapping on first start; refuse a store mapped elsewhere.
async fn map_root(storage: &dyn MetaDataStorage, remote_root: &RemoteId) -> Result<()> {
    match storage.get_root().await? {
        Some(root) if &root.remote_id == remote_root => Ok(()),
        Some(root) => Err(EngineError::RootMismatch {
            stored: root.remote_id,
            configured: remote_root.clone(),
        }),
        None => {
            storage.save(&MappedObject::root(remote_root.clone())).await?;
            tracing::info!(remote_id = %remote_root, "sync root mapped");
            Ok(())
        }
    }
}

#[cfg(unix)]
fn identity_reader() -> Arc<dyn IdentityReader> {
    Arc::new(docsync_sync::InodeIdentity)
}

#[cfg(not(unix))]
fn identity_reader() -> Arc<dyn IdentityReader> {
    Arc::new(docsync_sync::PathIdentity::new())
}
