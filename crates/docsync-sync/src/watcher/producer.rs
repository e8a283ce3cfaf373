//! Native change notifications into debounced bus events.
//!
//! `notify` delivers raw events on its own thread; they are forwarded over a
//! channel to a single actor task that owns the [`Debouncer`]. The actor
//! sleeps until the oldest buffered entry is due, so no timer is restarted on
//! every arrival.

use std::path::{Path, PathBuf};

use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

use docsync_core::{ObjectKind, StartNextSyncEvent, SyncEvent, WatcherChangeType};

use crate::bus::SyncEventQueue;
use crate::context::SyncContext;
use crate::error::Result;
use crate::watcher::debounce::{Debouncer, Notification};

/// Turns raw `notify` events into [`Notification`]s.
pub struct NotificationClassifier {
    ctx: SyncContext,
}

impl NotificationClassifier {
    pub fn new(ctx: SyncContext) -> Self {
        Self { ctx }
    }

    /// Classify one raw event. Paths outside the sync root, and the root
    /// itself, are skipped.
    pub async fn classify(&self, event: &notify::Event) -> Result<Vec<Notification>> {
        let mut out = Vec::new();
        match &event.kind {
            EventKind::Create(_) => {
                for path in self.paths(event) {
                    self.created(path, &mut out).await?;
                }
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                for path in self.paths(event) {
                    out.push(self.deleted(path).await?);
                }
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                for path in self.paths(event) {
                    self.created(path, &mut out).await?;
                }
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                if let [from, to] = event.paths.as_slice() {
                    // One identity for both halves so the debouncer pairs them.
                    let deleted = self.deleted(from).await?;
                    let id = self.identity(to)?.or(deleted.local_id);
                    out.push(Notification { local_id: id, ..deleted });
                    let created = self.created_one(to).await?;
                    if let Some(created) = created {
                        let is_dir = created.is_directory;
                        out.push(Notification { local_id: id, ..created });
                        if is_dir && self.ctx.config.watcher.backfill {
                            self.backfill(to, &mut out).await?;
                        }
                    }
                }
            }
            EventKind::Modify(ModifyKind::Name(_)) => {
                for path in self.paths(event) {
                    if tokio::fs::symlink_metadata(path).await.is_ok() {
                        self.created(path, &mut out).await?;
                    } else {
                        out.push(self.deleted(path).await?);
                    }
                }
            }
            EventKind::Modify(_) => {
                for path in self.paths(event) {
                    match tokio::fs::metadata(path).await {
                        Ok(meta) if meta.is_file() => out.push(Notification {
                            kind: WatcherChangeType::Changed,
                            path: path.to_path_buf(),
                            is_directory: false,
                            local_id: self.identity(path)?,
                        }),
                        _ => {}
                    }
                }
            }
            EventKind::Remove(_) => {
                for path in self.paths(event) {
                    out.push(self.deleted(path).await?);
                }
            }
            EventKind::Access(_) | EventKind::Any | EventKind::Other => {}
        }
        Ok(out)
    }

    fn paths<'a>(&'a self, event: &'a notify::Event) -> impl Iterator<Item = &'a Path> + 'a {
        event
            .paths
            .iter()
            .map(PathBuf::as_path)
            .filter(|p| self.ctx.root.contains(p) && *p != self.ctx.root.path())
    }

    fn identity(&self, path: &Path) -> Result<Option<Uuid>> {
        match self.ctx.identity.read(path) {
            Ok(id) => Ok(id),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn created_one(&self, path: &Path) -> Result<Option<Notification>> {
        let meta = match tokio::fs::symlink_metadata(path).await {
            Ok(meta) => meta,
            // Already gone again; the removal notification follows.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(Notification {
            kind: WatcherChangeType::Created,
            path: path.to_path_buf(),
            is_directory: meta.is_dir(),
            local_id: self.identity(path)?,
        }))
    }

    async fn created(&self, path: &Path, out: &mut Vec<Notification>) -> Result<()> {
        if let Some(note) = self.created_one(path).await? {
            let is_dir = note.is_directory;
            out.push(note);
            if is_dir && self.ctx.config.watcher.backfill {
                self.backfill(path, out).await?;
            }
        }
        Ok(())
    }

    /// A deleted entry can no longer be read; its identity and kind come
    /// from the record.
    async fn deleted(&self, path: &Path) -> Result<Notification> {
        let record = self.ctx.record_at(path).await?;
        Ok(Notification {
            kind: WatcherChangeType::Deleted,
            path: path.to_path_buf(),
            is_directory: record.as_ref().map(|r| r.kind == ObjectKind::Folder).unwrap_or(false),
            local_id: record.and_then(|r| r.guid),
        })
    }

    /// Synthesize `Created` for everything already inside a new directory.
    async fn backfill(&self, dir: &Path, out: &mut Vec<Notification>) -> Result<()> {
        let mut stack = vec![dir.to_path_buf()];
        while let Some(current) = stack.pop() {
            let mut entries = match tokio::fs::read_dir(&current).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let is_dir = entry.file_type().await?.is_dir();
                out.push(Notification {
                    kind: WatcherChangeType::Created,
                    path: path.clone(),
                    is_directory: is_dir,
                    local_id: self.identity(&path)?,
                });
                if is_dir {
                    stack.push(path);
                }
            }
        }
        Ok(())
    }
}

/// Owns the debounce buffer and feeds released events to the bus.
pub(crate) struct WatcherActor {
    rx: mpsc::UnboundedReceiver<notify::Result<notify::Event>>,
    debouncer: Debouncer,
    classifier: NotificationClassifier,
    queue: SyncEventQueue,
}

impl WatcherActor {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<notify::Result<notify::Event>>, ctx: SyncContext) -> Self {
        Self {
            rx,
            debouncer: Debouncer::new(ctx.config.watcher.effective_threshold()),
            queue: ctx.queue.clone(),
            classifier: NotificationClassifier::new(ctx),
        }
    }

    pub(crate) async fn run(mut self) {
        loop {
            let deadline = self.debouncer.next_deadline();
            tokio::select! {
                received = self.rx.recv() => match received {
                    Some(Ok(event)) => self.on_event(event).await,
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "watcher error, full sync requested");
                        self.request_full_sync();
                    }
                    None => break,
                },
                _ = wait_until(deadline) => {
                    for event in self.debouncer.flush(Instant::now()) {
                        self.queue.add_event(event);
                    }
                }
            }
        }

        for event in self.debouncer.drain() {
            self.queue.add_event(event);
        }
        tracing::debug!("watcher stopped");
    }

    async fn on_event(&mut self, event: notify::Event) {
        match self.classifier.classify(&event).await {
            Ok(notes) => {
                let now = Instant::now();
                for note in notes {
                    self.debouncer.push(note, now);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, kind = ?event.kind, paths = ?event.paths, "cannot classify notification, full sync requested");
                self.request_full_sync();
            }
        }
    }

    fn request_full_sync(&self) {
        self.queue
            .add_event(SyncEvent::StartNextSync(StartNextSyncEvent::full()));
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// A running filesystem watcher on the sync root.
pub struct FsWatcher {
    watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl FsWatcher {
    /// Watch the sync root recursively.
    pub fn start(ctx: SyncContext) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            // The actor is gone only during shutdown.
            let _ = tx.send(res);
        })?;
        watcher.watch(ctx.root.path(), RecursiveMode::Recursive)?;
        tracing::info!(root = %ctx.root.path().display(), "watching");

        let task = tokio::spawn(WatcherActor::new(rx, ctx).run());
        Ok(Self { watcher, task })
    }

    /// Stop watching and release everything still buffered.
    pub async fn stop(self) {
        let Self { watcher, task } = self;
        drop(watcher);
        if let Err(e) = task.await {
            tracing::warn!(error = %e, "watcher task failed");
        }
    }
}
