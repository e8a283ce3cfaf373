//! Store traits: the abstract interfaces for metadata persistence.
//!
//! These traits keep the engine storage-agnostic. Implementations include
//! SQLite (primary) and in-memory (for tests).

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use docsync_core::{ChangeToken, MappedObject, RemoteId, TransferState};
use uuid::Uuid;

use crate::error::{Result, StoreError};

/// Async interface for the persisted correlation records.
///
/// # Design Notes
///
/// - **Upsert by remote id**: `save` replaces any record with the same
///   `remote_id`.
/// - **Subtree removal**: `remove` drops the record and every descendant.
/// - **Relative paths**: path arguments and results are relative to the sync
///   root; the root record resolves to the empty path.
#[async_trait]
pub trait MetaDataStorage: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Lookups
    // ─────────────────────────────────────────────────────────────────────────

    /// Get a record by its remote id.
    async fn get_by_remote_id(&self, id: &RemoteId) -> Result<Option<MappedObject>>;

    /// Get a record by the stable local identity of its entry.
    async fn get_by_guid(&self, guid: &Uuid) -> Result<Option<MappedObject>>;

    /// Get the direct children of a folder record.
    async fn get_children(&self, parent: &MappedObject) -> Result<Vec<MappedObject>>;

    /// Get the record of the sync root, if one was saved.
    async fn get_root(&self) -> Result<Option<MappedObject>>;

    /// Every record in the store.
    async fn all_objects(&self) -> Result<Vec<MappedObject>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Mutations
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert or replace a record.
    async fn save(&self, obj: &MappedObject) -> Result<()>;

    /// Remove a record and all of its descendants.
    async fn remove(&self, obj: &MappedObject) -> Result<()>;

    // ─────────────────────────────────────────────────────────────────────────
    // Change log
    // ─────────────────────────────────────────────────────────────────────────

    /// The persisted change-log token.
    async fn change_log_token(&self) -> Result<Option<ChangeToken>>;

    /// Replace the persisted change-log token.
    async fn set_change_log_token(&self, token: Option<&ChangeToken>) -> Result<()>;

    // ─────────────────────────────────────────────────────────────────────────
    // Path resolution
    // ─────────────────────────────────────────────────────────────────────────

    /// Resolve a path relative to the sync root to its record.
    async fn get_by_local_path(&self, relative: &Path) -> Result<Option<MappedObject>> {
        let mut current = match self.get_root().await? {
            Some(root) => root,
            None => return Ok(None),
        };

        for component in relative.components() {
            let name = match component {
                Component::Normal(name) => name.to_string_lossy(),
                Component::CurDir => continue,
                _ => {
                    return Err(StoreError::InvalidData(format!(
                        "path is not relative to the sync root: {}",
                        relative.display()
                    )))
                }
            };
            let children = self.get_children(&current).await?;
            match children.into_iter().find(|c| c.name == name) {
                Some(child) => current = child,
                None => return Ok(None),
            }
        }

        Ok(Some(current))
    }

    /// Path of a record relative to the sync root.
    ///
    /// Returns `None` when the parent chain is broken.
    async fn get_relative_path(&self, obj: &MappedObject) -> Result<Option<PathBuf>> {
        let mut names = Vec::new();
        let mut current = obj.clone();
        // A chain longer than the record count would mean a parent cycle.
        let mut budget = self.all_objects().await?.len() + 1;

        while let Some(parent_id) = current.parent_id.clone() {
            if budget == 0 {
                return Err(StoreError::InvalidData(format!(
                    "parent cycle above {}",
                    obj.remote_id
                )));
            }
            budget -= 1;
            names.push(current.name.clone());
            current = match self.get_by_remote_id(&parent_id).await? {
                Some(parent) => parent,
                None => return Ok(None),
            };
        }

        Ok(Some(names.iter().rev().collect()))
    }
}

/// Async interface for upload resume state, keyed by remote document id.
#[async_trait]
pub trait TransferStorage: Send + Sync {
    /// Get the persisted transfer of a document.
    async fn get_transfer(&self, remote_id: &RemoteId) -> Result<Option<TransferState>>;

    /// Insert or replace a transfer.
    async fn save_transfer(&self, state: &TransferState) -> Result<()>;

    /// Discard a transfer. Discarding an unknown transfer is a no-op.
    async fn remove_transfer(&self, remote_id: &RemoteId) -> Result<()>;
}
