//! Services shared by the bus handlers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use docsync_core::{MappedObject, RemoteId};
use docsync_remote::RemoteSession;
use docsync_store::{MetaDataStorage, ObjectLocks, TransferStorage};
use docsync_transfer::TransmissionManager;

use crate::bus::SyncEventQueue;
use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::filter::IgnoredEntitiesStorage;
use crate::local::{IdentityReader, SyncRoot};

/// Everything a handler may need, cheap to clone.
#[derive(Clone)]
pub struct SyncContext {
    pub session: Arc<dyn RemoteSession>,
    pub storage: Arc<dyn MetaDataStorage>,
    pub transfers: Arc<dyn TransferStorage>,
    pub root: SyncRoot,
    /// Remote folder mapped to the sync root.
    pub remote_root: RemoteId,
    pub identity: Arc<dyn IdentityReader>,
    pub queue: SyncEventQueue,
    pub config: Arc<SyncConfig>,
    pub locks: Arc<ObjectLocks>,
    pub transmissions: TransmissionManager,
    pub ignored: IgnoredEntitiesStorage,
}

impl SyncContext {
    /// Record at the absolute local `path`.
    pub async fn record_at(&self, path: &Path) -> Result<Option<MappedObject>> {
        let relative = self.root.relative(path)?;
        Ok(self.storage.get_by_local_path(&relative).await?)
    }

    /// Absolute local path of a record, `None` when its parent chain is
    /// broken.
    pub async fn local_path_of(&self, record: &MappedObject) -> Result<Option<PathBuf>> {
        Ok(self
            .storage
            .get_relative_path(record)
            .await?
            .map(|relative| self.root.absolute(&relative)))
    }

    /// Record of the directory containing `path`.
    pub async fn parent_record(&self, path: &Path) -> Result<MappedObject> {
        let parent = path.parent().ok_or_else(|| SyncError::OutsideRoot(path.to_path_buf()))?;
        self.record_at(parent).await?.ok_or_else(|| SyncError::MissingParent {
            local: Some(parent.to_path_buf()),
            remote: None,
        })
    }

    /// Local path where the remote child `name` of `parent_id` belongs.
    pub async fn local_path_for(&self, parent_id: Option<&RemoteId>, name: &str) -> Result<PathBuf> {
        let missing = || SyncError::MissingParent {
            local: None,
            remote: parent_id.cloned(),
        };
        let parent_id = parent_id.ok_or_else(missing)?;
        let parent = self.storage.get_by_remote_id(parent_id).await?.ok_or_else(missing)?;
        let parent_path = self.local_path_of(&parent).await?.ok_or_else(missing)?;
        Ok(parent_path.join(name))
    }
}
