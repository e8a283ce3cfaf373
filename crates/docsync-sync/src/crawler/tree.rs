//! The three trees a crawl compares: local disk, remote repository and
//! stored records.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use docsync_core::{MappedObject, RemoteId, RemoteObject};

use crate::context::SyncContext;
use crate::error::Result;
use crate::filter::{invalid_name_reason, IgnoredState, NameMatcher};
use crate::local::LocalStat;

/// A local file or directory below the crawl root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalEntry {
    /// Path relative to the sync root.
    pub relative: PathBuf,
    pub stat: LocalStat,
    pub guid: Option<Uuid>,
}

impl LocalEntry {
    pub fn is_dir(&self) -> bool {
        self.stat.is_dir
    }
}

/// A remote object below the crawl root.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteEntry {
    /// Where the object belongs locally, relative to the sync root.
    pub relative: PathBuf,
    pub object: RemoteObject,
}

/// A stored record below the crawl root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    /// Path relative to the sync root.
    pub relative: PathBuf,
    pub record: MappedObject,
}

/// Everything below one folder, on all three sides. The folder itself is
/// not included.
#[derive(Debug, Clone, Default)]
pub struct TreeSnapshot {
    /// Relative path of the crawled folder.
    pub base: PathBuf,
    /// Remote id of the crawled folder.
    pub base_id: Option<RemoteId>,
    pub local: Vec<LocalEntry>,
    pub remote: Vec<RemoteEntry>,
    pub stored: Vec<StoredEntry>,
}

/// Walks the three trees below a mapped folder.
pub struct TreeWalker<'a> {
    ctx: &'a SyncContext,
    names: &'a NameMatcher,
}

impl<'a> TreeWalker<'a> {
    pub fn new(ctx: &'a SyncContext, names: &'a NameMatcher) -> Self {
        Self { ctx, names }
    }

    /// Snapshot everything below `folder`, mapped at `base`.
    pub async fn snapshot(&self, base: &Path, folder: &MappedObject) -> Result<TreeSnapshot> {
        let local = self.walk_local(base).await?;
        let remote = self.walk_remote(base, &folder.remote_id).await?;
        let stored = self.walk_stored(base, folder).await?;
        tracing::debug!(
            base = %base.display(),
            local = local.len(),
            remote = remote.len(),
            stored = stored.len(),
            "trees walked"
        );
        Ok(TreeSnapshot {
            base: base.to_path_buf(),
            base_id: Some(folder.remote_id.clone()),
            local,
            remote,
            stored,
        })
    }

    /// Whether the entry named `name` at `relative` takes part in sync.
    fn admits(&self, relative: &Path, name: &str, is_dir: bool) -> bool {
        let ignored_name = if is_dir {
            self.names.is_ignored_folder(name)
        } else {
            self.names.is_ignored_file(name)
        };
        !ignored_name
            && invalid_name_reason(name, &self.ctx.config.filter.reserved_characters).is_none()
            && self.ctx.ignored.is_ignored(relative) == IgnoredState::NotIgnored
    }

    async fn walk_local(&self, base: &Path) -> Result<Vec<LocalEntry>> {
        let mut entries = Vec::new();
        let mut pending = VecDeque::from([base.to_path_buf()]);

        while let Some(dir) = pending.pop_front() {
            let absolute = self.ctx.root.absolute(&dir);
            let mut listing = match tokio::fs::read_dir(&absolute).await {
                Ok(listing) => listing,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(child) = listing.next_entry().await? {
                let name = child.file_name().to_string_lossy().into_owned();
                let file_type = child.file_type().await?;
                if !file_type.is_dir() && !file_type.is_file() {
                    tracing::trace!(name, "skipping special file");
                    continue;
                }
                let relative = dir.join(&name);
                if !self.admits(&relative, &name, file_type.is_dir()) {
                    continue;
                }
                let meta = child.metadata().await?;
                let guid = self.ctx.identity.read(&child.path()).unwrap_or_else(|e| {
                    tracing::debug!(path = %relative.display(), error = %e, "no stable identity");
                    None
                });
                if file_type.is_dir() {
                    pending.push_back(relative.clone());
                }
                entries.push(LocalEntry {
                    relative,
                    stat: LocalStat::from_metadata(&meta),
                    guid,
                });
            }
        }
        Ok(entries)
    }

    async fn walk_remote(&self, base: &Path, folder: &RemoteId) -> Result<Vec<RemoteEntry>> {
        let mut entries = Vec::new();
        let mut pending = VecDeque::from([(base.to_path_buf(), folder.clone())]);

        while let Some((dir, id)) = pending.pop_front() {
            for object in self.ctx.session.get_children(&id).await? {
                let relative = dir.join(object.name());
                if object.ignored() {
                    tracing::debug!(remote_id = %object.id(), path = %relative.display(), "ignored subtree");
                    self.ctx.ignored.add(object.id().clone(), relative);
                    continue;
                }
                let is_dir = object.as_folder().is_some();
                if !self.admits(&relative, object.name(), is_dir) {
                    continue;
                }
                if is_dir {
                    pending.push_back((relative.clone(), object.id().clone()));
                }
                entries.push(RemoteEntry { relative, object });
            }
        }
        Ok(entries)
    }

    async fn walk_stored(&self, base: &Path, folder: &MappedObject) -> Result<Vec<StoredEntry>> {
        let mut entries = Vec::new();
        let mut pending = VecDeque::from([(base.to_path_buf(), folder.clone())]);

        while let Some((dir, record)) = pending.pop_front() {
            for child in self.ctx.storage.get_children(&record).await? {
                if child.ignored {
                    continue;
                }
                let relative = dir.join(&child.name);
                if child.is_folder() {
                    pending.push_back((relative.clone(), child.clone()));
                }
                entries.push(StoredEntry {
                    relative,
                    record: child,
                });
            }
        }
        Ok(entries)
    }
}
