//! Engine configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use docsync_core::RemoteId;
use docsync_sync::SyncConfig;

/// Configuration for a [`crate::SyncEngine`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Local folder to keep in sync.
    pub root: PathBuf,

    /// Remote folder mapped to `root`. The repository root when `None`.
    pub remote_root: Option<RemoteId>,

    /// Time between two scheduled sync rounds.
    pub poll_interval: Duration,

    /// Crawl both trees once at start-up.
    pub initial_full_sync: bool,

    /// Watch the local root for changes. Without a watcher local changes
    /// are only picked up by full syncs.
    pub watch: bool,

    /// Settings of the engine components.
    pub sync: SyncConfig,
}

impl EngineConfig {
    /// Default settings for syncing `root` with the repository root.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            remote_root: None,
            poll_interval: Duration::from_secs(5),
            initial_full_sync: true,
            watch: true,
            sync: SyncConfig::default(),
        }
    }
}
