//! Selective ignore: subtrees excluded from sync, inherited by descendants.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;

use docsync_core::{MappedObject, RemoteId, RemoteObject, StartNextSyncEvent, SyncEvent};
use docsync_store::MetaDataStorage;

use crate::bus::{priority, SyncEventHandler};
use crate::context::SyncContext;
use crate::error::{Result, SyncError};

/// Whether a path is excluded from sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoredState {
    NotIgnored,
    /// The object itself is marked ignored.
    Ignored,
    /// An ancestor is marked ignored.
    Inherited,
}

/// Ignored objects by remote id, with their path relative to the sync root.
#[derive(Debug, Clone, Default)]
pub struct IgnoredEntitiesStorage {
    entries: Arc<RwLock<HashMap<RemoteId, PathBuf>>>,
}

impl IgnoredEntitiesStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from the records flagged as ignored.
    pub async fn load(storage: &dyn MetaDataStorage) -> Result<Self> {
        let ignored = Self::new();
        for record in storage.all_objects().await? {
            if !record.ignored {
                continue;
            }
            if let Some(path) = storage.get_relative_path(&record).await? {
                ignored.add(record.remote_id.clone(), path);
            }
        }
        Ok(ignored)
    }

    pub fn add(&self, id: RemoteId, relative: PathBuf) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(id, relative);
    }

    /// Returns whether `id` was ignored.
    pub fn remove(&self, id: &RemoteId) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.remove(id).is_some()
    }

    pub fn contains(&self, id: &RemoteId) -> bool {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// State of the object at `relative`.
    pub fn is_ignored(&self, relative: &Path) -> IgnoredState {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut state = IgnoredState::NotIgnored;
        for path in entries.values() {
            if relative == path.as_path() {
                return IgnoredState::Ignored;
            }
            if relative.starts_with(path) {
                state = IgnoredState::Inherited;
            }
        }
        state
    }
}

/// Drops events under ignored subtrees and keeps the ignore set in step with
/// the remote ignore flag.
pub struct SelectiveIgnoreFilter {
    ctx: SyncContext,
}

impl SelectiveIgnoreFilter {
    pub fn new(ctx: SyncContext) -> Self {
        Self { ctx }
    }

    fn path_state(&self, absolute: &Path) -> IgnoredState {
        match self.ctx.root.relative(absolute) {
            Ok(relative) => self.ctx.ignored.is_ignored(&relative),
            Err(_) => IgnoredState::NotIgnored,
        }
    }

    async fn relative_path_of(&self, object: &RemoteObject) -> Result<Option<PathBuf>> {
        if let Some(record) = self.ctx.storage.get_by_remote_id(object.id()).await? {
            return Ok(self.ctx.storage.get_relative_path(&record).await?);
        }
        match self.ctx.local_path_for(object.parent_id(), object.name()).await {
            Ok(absolute) => Ok(Some(self.ctx.root.relative(&absolute)?)),
            Err(SyncError::MissingParent { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn set_record_flag(&self, id: &RemoteId, ignored: bool) -> Result<Option<MappedObject>> {
        let record = self.ctx.storage.get_by_remote_id(id).await?;
        if let Some(mut record) = record {
            if record.ignored != ignored {
                record.ignored = ignored;
                self.ctx.storage.save(&record).await?;
            }
            return Ok(Some(record));
        }
        Ok(None)
    }

    async fn on_remote_change(&self, id: &RemoteId, object: Option<&RemoteObject>) -> Result<bool> {
        let object = match object {
            Some(object) => object,
            None => {
                // Deleted: forget it, nothing left to sync.
                return Ok(self.ctx.ignored.remove(id));
            }
        };

        if object.ignored() {
            if !self.ctx.ignored.contains(id) {
                let path = self.relative_path_of(object).await?;
                tracing::info!(remote_id = %id, path = ?path, "object is now ignored");
                self.ctx.ignored.add(id.clone(), path.unwrap_or_else(|| PathBuf::from(object.name())));
                self.set_record_flag(id, true).await?;
            }
            return Ok(true);
        }

        if self.ctx.ignored.remove(id) {
            tracing::info!(remote_id = %id, "object is no longer ignored, full sync requested");
            self.set_record_flag(id, false).await?;
            self.ctx
                .queue
                .add_event(SyncEvent::StartNextSync(StartNextSyncEvent::full()));
            return Ok(true);
        }

        if let Some(parent) = object.parent_id() {
            if self.ctx.ignored.contains(parent) {
                return Ok(true);
            }
        }
        Ok(match self.relative_path_of(object).await? {
            Some(path) => self.ctx.ignored.is_ignored(&path) != IgnoredState::NotIgnored,
            None => false,
        })
    }
}

#[async_trait]
impl SyncEventHandler for SelectiveIgnoreFilter {
    fn name(&self) -> &'static str {
        "selective-ignore-filter"
    }

    fn priority(&self) -> i32 {
        priority::FILTER
    }

    async fn handle(&self, event: &mut SyncEvent) -> Result<bool> {
        if self.ctx.ignored.is_empty() {
            if let SyncEvent::ContentChange(e) = event {
                // An object may just have become ignored.
                if e.object.as_ref().map(|o| o.ignored()).unwrap_or(false) {
                    return self.on_remote_change(&e.object_id, e.object.as_ref()).await;
                }
            }
            return Ok(false);
        }

        let ignored = match event {
            SyncEvent::ContentChange(e) => self.on_remote_change(&e.object_id, e.object.as_ref()).await?,
            SyncEvent::Fs(e) => self.path_state(&e.path) != IgnoredState::NotIgnored,
            SyncEvent::FsMoved(e) => {
                self.path_state(&e.old_path) != IgnoredState::NotIgnored
                    || self.path_state(&e.new_path) != IgnoredState::NotIgnored
            }
            SyncEvent::File(e) => {
                e.local_path.as_deref().map(|p| self.path_state(p) != IgnoredState::NotIgnored).unwrap_or(false)
                    || e.remote_id().map(|id| self.ctx.ignored.contains(id)).unwrap_or(false)
            }
            SyncEvent::Folder(e) => {
                e.local_path.as_deref().map(|p| self.path_state(p) != IgnoredState::NotIgnored).unwrap_or(false)
                    || e.remote_id().map(|id| self.ctx.ignored.contains(id)).unwrap_or(false)
            }
            _ => false,
        };
        if ignored {
            tracing::debug!(%event, "dropping event in ignored subtree");
        }
        Ok(ignored)
    }
}
