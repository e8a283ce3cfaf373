//! The repository session trait.
//!
//! Implementations wrap a concrete content-protocol binding. They must be
//! thread-safe: the engine shares one session between the poller, the
//! crawler and every concurrent transfer.

use async_trait::async_trait;
use bytes::Bytes;

use docsync_core::{ChangeLogPage, ChangeToken, RemoteDocument, RemoteFolder, RemoteId, RemoteObject};

use crate::error::Result;

/// Static facts about a repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryInfo {
    /// Human readable repository name.
    pub name: String,

    /// Id of the repository root folder.
    pub root_folder_id: RemoteId,

    /// Checkout and check-in of private working copies.
    pub supports_pwc: bool,

    /// A queryable change log.
    pub supports_change_log: bool,
}

/// Async interface to a remote repository.
#[async_trait]
pub trait RemoteSession: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Repository
    // ─────────────────────────────────────────────────────────────────────────

    async fn repository_info(&self) -> Result<RepositoryInfo>;

    // ─────────────────────────────────────────────────────────────────────────
    // Objects
    // ─────────────────────────────────────────────────────────────────────────

    /// Fetch a fresh snapshot of an object.
    async fn get_object(&self, id: &RemoteId) -> Result<RemoteObject>;

    /// Direct children of a folder. Working copies are not listed.
    async fn get_children(&self, folder: &RemoteId) -> Result<Vec<RemoteObject>>;

    async fn create_folder(&self, parent: &RemoteId, name: &str) -> Result<RemoteFolder>;

    /// Create a document, optionally with initial content.
    async fn create_document(
        &self,
        parent: &RemoteId,
        name: &str,
        content: Option<Bytes>,
    ) -> Result<RemoteDocument>;

    async fn rename(&self, id: &RemoteId, new_name: &str) -> Result<RemoteObject>;

    async fn move_object(&self, id: &RemoteId, target_parent: &RemoteId) -> Result<RemoteObject>;

    /// Delete a document or an empty folder.
    async fn delete(&self, id: &RemoteId) -> Result<()>;

    /// Delete a folder and everything below it.
    async fn delete_tree(&self, folder: &RemoteId) -> Result<()>;

    // ─────────────────────────────────────────────────────────────────────────
    // Content
    // ─────────────────────────────────────────────────────────────────────────

    /// Read `length` bytes of content starting at `offset`, or everything
    /// after `offset` when `length` is `None`.
    async fn get_content_stream(
        &self,
        id: &RemoteId,
        offset: u64,
        length: Option<u64>,
    ) -> Result<Bytes>;

    /// Replace the whole content.
    async fn set_content_stream(&self, id: &RemoteId, content: Bytes) -> Result<RemoteDocument>;

    /// Append one chunk. `is_last` marks the end of the stream.
    async fn append_content_stream(
        &self,
        id: &RemoteId,
        chunk: Bytes,
        is_last: bool,
    ) -> Result<RemoteDocument>;

    /// Truncate the content to zero bytes.
    async fn delete_content_stream(&self, id: &RemoteId) -> Result<RemoteDocument>;

    // ─────────────────────────────────────────────────────────────────────────
    // Versioning
    // ─────────────────────────────────────────────────────────────────────────

    /// Check a document out. Returns the private working copy.
    async fn check_out(&self, id: &RemoteId) -> Result<RemoteDocument>;

    /// Discard a private working copy.
    async fn cancel_check_out(&self, pwc: &RemoteId) -> Result<()>;

    /// Publish a private working copy. Returns the new visible document.
    async fn check_in(&self, pwc: &RemoteId) -> Result<RemoteDocument>;

    // ─────────────────────────────────────────────────────────────────────────
    // Change log
    // ─────────────────────────────────────────────────────────────────────────

    /// Token of the newest change-log position.
    async fn latest_change_log_token(&self) -> Result<Option<ChangeToken>>;

    /// Up to `max_items` entries written after `since`.
    async fn get_content_changes(&self, since: &ChangeToken, max_items: usize) -> Result<ChangeLogPage>;
}
