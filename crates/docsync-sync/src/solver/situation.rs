//! Normalizes a canonical event against the records and the current state
//! of both sides.
//!
//! Events can be stale by the time they reach the solver: producers race,
//! the crawler and the watcher report the same change, and the engine's own
//! writes echo back. Detection re-derives each side's change from what is
//! actually there, so replaying an applied event comes out as `None/None`.

use std::path::PathBuf;

use docsync_core::{
    ChangeType, ContentChangeType, FileEvent, FolderEvent, MappedObject, ObjectKind, RemoteId,
    RemoteObject,
};
use docsync_remote::RemoteError;

use crate::changelog::transformer::{remote_change, remote_content_change};
use crate::context::SyncContext;
use crate::error::Result;
use crate::local::{stat, LocalStat};

/// Everything the solver knows about one object.
#[derive(Debug, Clone, PartialEq)]
pub struct Situation {
    pub kind: ObjectKind,
    pub local: ChangeType,
    pub remote: ChangeType,
    pub local_content: ContentChangeType,
    pub remote_content: ContentChangeType,
    /// Where the object is, or belongs, on disk.
    pub local_path: Option<PathBuf>,
    /// Where a locally moved object was.
    pub old_local_path: Option<PathBuf>,
    pub remote_id: Option<RemoteId>,
    /// Current remote snapshot; `None` when gone or not yet created.
    pub object: Option<RemoteObject>,
    /// The remote side reported the object gone.
    pub remote_gone: bool,
    pub record: Option<MappedObject>,
    pub recursive: bool,
}

impl Situation {
    pub fn from_file(e: &FileEvent) -> Self {
        Self {
            kind: ObjectKind::File,
            local: e.local,
            remote: e.remote,
            local_content: e.local_content,
            remote_content: e.remote_content,
            local_path: e.local_path.clone(),
            old_local_path: e.moved_from.as_ref().and_then(|m| m.old_local_path.clone()),
            remote_id: e.remote_id().cloned(),
            object: e.remote_document().cloned().map(RemoteObject::Document),
            remote_gone: e.remote_file.as_ref().map(|h| h.is_gone()).unwrap_or(false),
            record: None,
            recursive: false,
        }
    }

    pub fn from_folder(e: &FolderEvent) -> Self {
        Self {
            kind: ObjectKind::Folder,
            local: e.local,
            remote: e.remote,
            local_content: ContentChangeType::None,
            remote_content: ContentChangeType::None,
            local_path: e.local_path.clone(),
            old_local_path: e.moved_from.as_ref().and_then(|m| m.old_local_path.clone()),
            remote_id: e.remote_id().cloned(),
            object: e.remote_snapshot().cloned().map(RemoteObject::Folder),
            remote_gone: e.remote_folder.as_ref().map(|h| h.is_gone()).unwrap_or(false),
            record: None,
            recursive: e.recursive,
        }
    }

    pub fn is_folder(&self) -> bool {
        self.kind == ObjectKind::Folder
    }

    /// Nothing left to reconcile.
    pub fn is_settled(&self) -> bool {
        self.local == ChangeType::None && self.remote == ChangeType::None
    }
}

/// Builds the settled view of a [`Situation`].
pub struct SituationDetector<'a> {
    ctx: &'a SyncContext,
}

impl<'a> SituationDetector<'a> {
    pub fn new(ctx: &'a SyncContext) -> Self {
        Self { ctx }
    }

    pub async fn detect(&self, mut s: Situation) -> Result<Situation> {
        s.record = self.find_record(&s).await?;
        if let Some(record) = &s.record {
            if s.remote_id.is_none() {
                s.remote_id = Some(record.remote_id.clone());
            }
        }
        self.refresh_remote(&mut s).await?;
        self.resolve_path(&mut s).await?;
        self.normalize_remote(&mut s);
        self.normalize_local(&mut s).await?;
        Ok(s)
    }

    async fn find_record(&self, s: &Situation) -> Result<Option<MappedObject>> {
        if let Some(id) = &s.remote_id {
            if let Some(record) = self.ctx.storage.get_by_remote_id(id).await? {
                return Ok(Some(record));
            }
        }
        for path in [&s.old_local_path, &s.local_path].into_iter().flatten() {
            if !self.ctx.root.contains(path) {
                continue;
            }
            if let Some(record) = self.ctx.record_at(path).await? {
                if record.is_root() {
                    continue;
                }
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    /// Fetch the snapshot of a mapped object whose event did not carry one.
    async fn refresh_remote(&self, s: &mut Situation) -> Result<()> {
        if s.object.is_some() || s.remote_gone || s.record.is_none() {
            return Ok(());
        }
        let Some(id) = s.remote_id.clone() else {
            return Ok(());
        };
        match self.ctx.session.get_object(&id).await {
            Ok(object) => s.object = Some(object),
            Err(RemoteError::NotFound(_)) => s.remote_gone = true,
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    /// Events may carry a path that no longer exists because an earlier
    /// event moved the object or its parent; the record knows where it is
    /// now.
    async fn resolve_path(&self, s: &mut Situation) -> Result<()> {
        let Some(record) = &s.record else {
            return Ok(());
        };
        if !matches!(s.local, ChangeType::None | ChangeType::Changed | ChangeType::Deleted) {
            return Ok(());
        }
        let stale = match &s.local_path {
            None => true,
            Some(path) => stat(path).await?.is_none(),
        };
        if stale {
            if let Some(path) = self.ctx.local_path_of(record).await? {
                s.local_path = Some(path);
            }
        }
        Ok(())
    }

    fn normalize_remote(&self, s: &mut Situation) {
        let Some(record) = &s.record else {
            if s.remote == ChangeType::Deleted || s.remote_gone {
                s.remote = ChangeType::None;
                s.remote_content = ContentChangeType::None;
            } else if s.object.is_some() {
                s.remote = ChangeType::Created;
                if !s.is_folder() {
                    s.remote_content = ContentChangeType::Created;
                }
            }
            return;
        };

        if s.remote_gone {
            s.remote = ChangeType::Deleted;
            if !s.is_folder() {
                s.remote_content = ContentChangeType::Deleted;
            }
            return;
        }
        let Some(object) = &s.object else {
            return;
        };
        s.remote = remote_change(record, object);
        s.remote_content = match object.as_document() {
            Some(doc) if s.remote != ChangeType::None => remote_content_change(record, doc),
            _ => ContentChangeType::None,
        };
    }

    async fn normalize_local(&self, s: &mut Situation) -> Result<()> {
        let current = match &s.local_path {
            Some(path) => stat(path).await?,
            None => None,
        };
        let record = s.record.as_ref();
        let write_changed = |written: Option<i64>| match record {
            Some(record) => record.last_local_write_time != written,
            None => true,
        };

        s.local = match (s.local, record, current) {
            // Nothing on disk where the object should be.
            (ChangeType::Created | ChangeType::Changed | ChangeType::Moved, Some(_), None) => {
                ChangeType::Deleted
            }
            (ChangeType::Created | ChangeType::Changed | ChangeType::Moved, None, None) => ChangeType::None,
            (ChangeType::Deleted, _, Some(_)) => ChangeType::None,
            (ChangeType::Deleted, None, None) => ChangeType::None,

            (ChangeType::Moved, Some(record), Some(_)) => {
                let stored = self.ctx.local_path_of(record).await?;
                if stored.is_some() && stored == s.local_path {
                    self.unmoved(s, current)
                } else {
                    ChangeType::Moved
                }
            }
            (ChangeType::Moved, None, Some(_)) => ChangeType::Created,

            (ChangeType::Created | ChangeType::Changed, Some(_), Some(st)) => {
                if !st.is_dir && write_changed(st.write_time) {
                    ChangeType::Changed
                } else {
                    ChangeType::None
                }
            }
            (ChangeType::Created | ChangeType::Changed, None, Some(_)) => ChangeType::Created,

            (ChangeType::None, None, Some(_)) => ChangeType::Created,
            (ChangeType::None, Some(_), None) if s.local_path.is_some() => ChangeType::Deleted,
            (ChangeType::None, Some(_), Some(st)) if !st.is_dir && write_changed(st.write_time) => {
                ChangeType::Changed
            }
            (local, _, _) => local,
        };

        if s.is_folder() {
            s.local_content = ContentChangeType::None;
            return Ok(());
        }
        s.local_content = match s.local {
            ChangeType::None => ContentChangeType::None,
            ChangeType::Created => ContentChangeType::Created,
            ChangeType::Deleted => ContentChangeType::Deleted,
            ChangeType::Changed => ContentChangeType::Changed,
            ChangeType::Moved => match current {
                Some(st) if write_changed(st.write_time) => ContentChangeType::Changed,
                _ => ContentChangeType::None,
            },
        };
        Ok(())
    }

    /// A move the records already reflect; only a content edit may remain.
    fn unmoved(&self, s: &Situation, current: Option<LocalStat>) -> ChangeType {
        match (&s.record, current) {
            (Some(record), Some(st)) if !st.is_dir && record.last_local_write_time != st.write_time => {
                ChangeType::Changed
            }
            _ => ChangeType::None,
        }
    }
}
