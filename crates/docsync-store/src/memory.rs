//! In-memory implementation of the store traits.
//!
//! Same semantics as SQLite but nothing persists. Used by tests and by the
//! testkit fixtures.

use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use uuid::Uuid;

use docsync_core::{ChangeToken, MappedObject, RemoteId, TransferState};

use crate::error::Result;
use crate::traits::{MetaDataStorage, TransferStorage};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    objects: HashMap<RemoteId, MappedObject>,
    change_log_token: Option<ChangeToken>,
    transfers: HashMap<RemoteId, TransferState>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    fn read<T>(&self, f: impl FnOnce(&MemoryStoreInner) -> T) -> T {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        f(&inner)
    }

    fn write<T>(&self, f: impl FnOnce(&mut MemoryStoreInner) -> T) -> T {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut inner)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetaDataStorage for MemoryStore {
    async fn get_by_remote_id(&self, id: &RemoteId) -> Result<Option<MappedObject>> {
        Ok(self.read(|inner| inner.objects.get(id).cloned()))
    }

    async fn get_by_guid(&self, guid: &Uuid) -> Result<Option<MappedObject>> {
        Ok(self.read(|inner| {
            inner
                .objects
                .values()
                .find(|o| o.guid.as_ref() == Some(guid))
                .cloned()
        }))
    }

    async fn get_children(&self, parent: &MappedObject) -> Result<Vec<MappedObject>> {
        let mut children: Vec<MappedObject> = self.read(|inner| {
            inner
                .objects
                .values()
                .filter(|o| o.parent_id.as_ref() == Some(&parent.remote_id))
                .cloned()
                .collect()
        });
        children.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(children)
    }

    async fn get_root(&self) -> Result<Option<MappedObject>> {
        Ok(self.read(|inner| inner.objects.values().find(|o| o.is_root()).cloned()))
    }

    async fn all_objects(&self) -> Result<Vec<MappedObject>> {
        Ok(self.read(|inner| inner.objects.values().cloned().collect()))
    }

    async fn save(&self, obj: &MappedObject) -> Result<()> {
        self.write(|inner| {
            inner.objects.insert(obj.remote_id.clone(), obj.clone());
        });
        Ok(())
    }

    async fn remove(&self, obj: &MappedObject) -> Result<()> {
        self.write(|inner| {
            let mut doomed: HashSet<RemoteId> = HashSet::new();
            let mut frontier = vec![obj.remote_id.clone()];

            while let Some(id) = frontier.pop() {
                if !doomed.insert(id.clone()) {
                    continue;
                }
                frontier.extend(
                    inner
                        .objects
                        .values()
                        .filter(|o| o.parent_id.as_ref() == Some(&id))
                        .map(|o| o.remote_id.clone()),
                );
            }

            for id in &doomed {
                inner.objects.remove(id);
            }
        });
        Ok(())
    }

    async fn change_log_token(&self) -> Result<Option<ChangeToken>> {
        Ok(self.read(|inner| inner.change_log_token.clone()))
    }

    async fn set_change_log_token(&self, token: Option<&ChangeToken>) -> Result<()> {
        self.write(|inner| inner.change_log_token = token.cloned());
        Ok(())
    }
}

#[async_trait]
impl TransferStorage for MemoryStore {
    async fn get_transfer(&self, remote_id: &RemoteId) -> Result<Option<TransferState>> {
        Ok(self.read(|inner| inner.transfers.get(remote_id).cloned()))
    }

    async fn save_transfer(&self, state: &TransferState) -> Result<()> {
        self.write(|inner| {
            inner.transfers.insert(state.remote_id.clone(), state.clone());
        });
        Ok(())
    }

    async fn remove_transfer(&self, remote_id: &RemoteId) -> Result<()> {
        self.write(|inner| {
            inner.transfers.remove(remote_id);
        });
        Ok(())
    }
}
