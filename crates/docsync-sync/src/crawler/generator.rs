//! Turns a [`TreeSnapshot`] into crawl events.
//!
//! Local entries are correlated with records by stable identity first and
//! by path second; remote entries by remote id. Each side of a correlated
//! object yields at most one partial event, and the two partials are merged
//! so the solver sees both sides of the object at once.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use uuid::Uuid;

use docsync_core::{
    ChangeType, ContentChangeType, FileEvent, FolderEvent, RemoteHandle, RemoteId, RemoteObject,
    SyncEvent,
};

use crate::changelog::transformer::{remote_change, remote_content_change};
use crate::crawler::tree::{LocalEntry, RemoteEntry, StoredEntry, TreeSnapshot};
use crate::local::SyncRoot;

/// Which side of a move the crawl observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveSide {
    /// Moved on disk; applied to the repository.
    Local,
    /// Moved in the repository; applied to the disk.
    Remote,
}

/// The per-side partial events of one correlated object.
#[derive(Debug, Clone, PartialEq)]
pub struct Mergable {
    /// Stored path, relative to the sync root.
    pub relative: PathBuf,
    pub is_folder: bool,
    pub local: Option<SyncEvent>,
    pub remote: Option<SyncEvent>,
    /// New relative path of a local move.
    pub local_target: Option<PathBuf>,
    /// New relative path of a remote move.
    pub remote_target: Option<PathBuf>,
}

/// Output of one crawl before it is put on the bus.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrawlEventCollection {
    /// Objects seen on one side only, or new on both sides at one path.
    pub creation_events: Vec<SyncEvent>,
    /// Changed objects by remote id.
    pub mergable: BTreeMap<RemoteId, Mergable>,
}

/// A move waiting for its place in the execution order.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingMove {
    pub key: RemoteId,
    pub side: MoveSide,
    /// Stored path, relative to the sync root.
    pub current: PathBuf,
    /// Destination, relative to the sync root.
    pub target: PathBuf,
    pub event: SyncEvent,
}

/// Crawl events grouped in emission order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrawlPlan {
    /// Shallowest first.
    pub folder_creations: Vec<SyncEvent>,
    pub moves: Vec<PendingMove>,
    pub changes: Vec<SyncEvent>,
    /// Shallowest first.
    pub deletions: Vec<SyncEvent>,
    pub file_creations: Vec<SyncEvent>,
}

fn depth(path: &Path) -> usize {
    path.components().count()
}

fn name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn local_change(event: &SyncEvent) -> ChangeType {
    match event {
        SyncEvent::File(e) => e.local,
        SyncEvent::Folder(e) => e.local,
        _ => ChangeType::None,
    }
}

fn remote_side_change(event: &SyncEvent) -> ChangeType {
    match event {
        SyncEvent::File(e) => e.remote,
        SyncEvent::Folder(e) => e.remote,
        _ => ChangeType::None,
    }
}

fn event_path(event: &SyncEvent) -> Option<&Path> {
    match event {
        SyncEvent::File(e) => e.local_path.as_deref(),
        SyncEvent::Folder(e) => e.local_path.as_deref(),
        _ => None,
    }
}

/// Combine the local partial of an object with its remote partial.
fn merge(local: Option<SyncEvent>, remote: Option<SyncEvent>) -> Option<SyncEvent> {
    match (local, remote) {
        (Some(SyncEvent::File(mut l)), Some(SyncEvent::File(r))) => {
            l.remote = r.remote;
            l.remote_content = r.remote_content;
            l.remote_file = r.remote_file;
            Some(SyncEvent::File(l))
        }
        (Some(SyncEvent::Folder(mut l)), Some(SyncEvent::Folder(r))) => {
            l.remote = r.remote;
            l.remote_folder = r.remote_folder;
            l.recursive |= r.recursive;
            Some(SyncEvent::Folder(l))
        }
        (Some(event), _) | (None, Some(event)) => Some(event),
        (None, None) => None,
    }
}

impl Mergable {
    /// The single canonical event for this object.
    pub fn merged(&self) -> Option<SyncEvent> {
        merge(self.local.clone(), self.remote.clone())
    }

    fn local_change(&self) -> ChangeType {
        self.local.as_ref().map(local_change).unwrap_or(ChangeType::None)
    }

    fn remote_change(&self) -> ChangeType {
        self.remote.as_ref().map(remote_side_change).unwrap_or(ChangeType::None)
    }

    fn is_deleted_folder(&self) -> bool {
        self.is_folder
            && (self.local_change() == ChangeType::Deleted || self.remote_change() == ChangeType::Deleted)
    }
}

/// Correlate the three trees of `snapshot` and derive the crawl events.
pub fn generate(snapshot: &TreeSnapshot, root: &SyncRoot) -> CrawlEventCollection {
    let stored: BTreeMap<&RemoteId, &StoredEntry> = snapshot
        .stored
        .iter()
        .map(|s| (&s.record.remote_id, s))
        .collect();
    let by_guid: HashMap<Uuid, &RemoteId> = snapshot
        .stored
        .iter()
        .filter_map(|s| s.record.guid.map(|g| (g, &s.record.remote_id)))
        .collect();
    let by_path: HashMap<&Path, &RemoteId> = snapshot
        .stored
        .iter()
        .map(|s| (s.relative.as_path(), &s.record.remote_id))
        .collect();

    // Local entries: identity first, then path among what is left.
    let mut local_of: HashMap<&RemoteId, &LocalEntry> = HashMap::new();
    let mut pending_local: Vec<&LocalEntry> = Vec::new();
    for entry in &snapshot.local {
        let key = entry
            .guid
            .and_then(|g| by_guid.get(&g).copied())
            .filter(|key| stored[key].record.is_folder() == entry.is_dir());
        match key {
            Some(key) if !local_of.contains_key(key) => {
                local_of.insert(key, entry);
            }
            _ => pending_local.push(entry),
        }
    }
    let mut unmatched_local: Vec<&LocalEntry> = Vec::new();
    for entry in pending_local {
        let key = by_path
            .get(entry.relative.as_path())
            .copied()
            .filter(|key| stored[key].record.is_folder() == entry.is_dir());
        match key {
            Some(key) if !local_of.contains_key(key) => {
                local_of.insert(key, entry);
            }
            _ => unmatched_local.push(entry),
        }
    }
    let local_keys: HashMap<&Path, &RemoteId> = local_of
        .iter()
        .map(|(key, entry)| (entry.relative.as_path(), *key))
        .collect();

    let mut remote_of: HashMap<&RemoteId, &RemoteEntry> = HashMap::new();
    let mut unmatched_remote: Vec<&RemoteEntry> = Vec::new();
    for entry in &snapshot.remote {
        match stored.get(entry.object.id()) {
            Some(s) if s.record.is_folder() == entry.object.as_folder().is_some() => {
                remote_of.insert(entry.object.id(), entry);
            }
            _ => unmatched_remote.push(entry),
        }
    }

    let mut collection = CrawlEventCollection::default();

    for (key, s) in &stored {
        let local = local_of.get(key).copied();
        let remote = remote_of.get(key).copied();
        let (local_event, local_target) = local_partial(s, local, &local_keys, snapshot, root);
        let (remote_event, remote_target) = remote_partial(s, remote);
        if local_event.is_none() && remote_event.is_none() {
            continue;
        }
        collection.mergable.insert(
            (*key).clone(),
            Mergable {
                relative: s.relative.clone(),
                is_folder: s.record.is_folder(),
                local: local_event,
                remote: remote_event,
                local_target,
                remote_target,
            },
        );
    }

    // One-sided entries; a local and a remote entry of the same kind at the
    // same path are one object created on both sides.
    let mut remote_at: HashMap<&Path, &RemoteEntry> = unmatched_remote
        .iter()
        .map(|r| (r.relative.as_path(), *r))
        .collect();
    for entry in unmatched_local {
        let absolute = root.absolute(&entry.relative);
        let partner = remote_at
            .get(entry.relative.as_path())
            .filter(|r| r.object.as_folder().is_some() == entry.is_dir())
            .copied();
        if partner.is_some() {
            remote_at.remove(entry.relative.as_path());
        }
        let event = match (entry.is_dir(), partner.map(|r| &r.object)) {
            (true, Some(RemoteObject::Folder(folder))) => {
                let mut e = FolderEvent::local(absolute)
                    .with_local(ChangeType::Created)
                    .with_remote(ChangeType::Created);
                e.remote_folder = Some(RemoteHandle::Present(folder.clone()));
                SyncEvent::Folder(e)
            }
            (true, _) => SyncEvent::Folder(FolderEvent::local(absolute).with_local(ChangeType::Created)),
            (false, Some(RemoteObject::Document(doc))) => {
                let mut e = FileEvent::local(absolute)
                    .with_local(ChangeType::Created)
                    .with_local_content(ContentChangeType::Created)
                    .with_remote(ChangeType::Created)
                    .with_remote_content(ContentChangeType::Created);
                e.remote_file = Some(RemoteHandle::Present(doc.clone()));
                SyncEvent::File(e)
            }
            (false, _) => SyncEvent::File(
                FileEvent::local(absolute)
                    .with_local(ChangeType::Created)
                    .with_local_content(ContentChangeType::Created),
            ),
        };
        collection.creation_events.push(event);
    }
    for entry in unmatched_remote {
        if !remote_at.contains_key(entry.relative.as_path()) {
            continue;
        }
        let absolute = root.absolute(&entry.relative);
        let event = match &entry.object {
            RemoteObject::Folder(folder) => {
                let mut e = FolderEvent::remote(RemoteHandle::Present(folder.clone()))
                    .with_remote(ChangeType::Created);
                e.local_path = Some(absolute);
                SyncEvent::Folder(e)
            }
            RemoteObject::Document(doc) => {
                let mut e = FileEvent::remote(RemoteHandle::Present(doc.clone()))
                    .with_remote(ChangeType::Created)
                    .with_remote_content(ContentChangeType::Created);
                e.local_path = Some(absolute);
                SyncEvent::File(e)
            }
        };
        collection.creation_events.push(event);
    }

    collection.prune_deleted_subtrees(root);
    collection
}

/// Local partial of a stored object, with the new path of a local move.
fn local_partial(
    s: &StoredEntry,
    local: Option<&LocalEntry>,
    local_keys: &HashMap<&Path, &RemoteId>,
    snapshot: &TreeSnapshot,
    root: &SyncRoot,
) -> (Option<SyncEvent>, Option<PathBuf>) {
    let stored_path = root.absolute(&s.relative);
    let Some(local) = local else {
        let event = if s.record.is_folder() {
            SyncEvent::Folder(FolderEvent::local(stored_path).with_local(ChangeType::Deleted))
        } else {
            SyncEvent::File(
                FileEvent::local(stored_path)
                    .with_local(ChangeType::Deleted)
                    .with_local_content(ContentChangeType::Deleted),
            )
        };
        return (Some(event), None);
    };

    let parent = local.relative.parent().unwrap_or_else(|| Path::new(""));
    let parent_key = if parent == snapshot.base {
        snapshot.base_id.as_ref()
    } else {
        local_keys.get(parent).copied()
    };
    let moved = parent_key != s.record.parent_id.as_ref() || name_of(&local.relative) != s.record.name;
    let written = !local.is_dir() && local.stat.write_time != s.record.last_local_write_time;
    let content = if written {
        ContentChangeType::Changed
    } else {
        ContentChangeType::None
    };
    let current = root.absolute(&local.relative);

    if moved {
        let event = if local.is_dir() {
            SyncEvent::Folder(FolderEvent::moved(stored_path, current, None))
        } else {
            SyncEvent::File(FileEvent::moved(stored_path, current, None).with_local_content(content))
        };
        return (Some(event), Some(local.relative.clone()));
    }
    if written {
        let event = FileEvent::local(current)
            .with_local(ChangeType::Changed)
            .with_local_content(content);
        return (Some(SyncEvent::File(event)), None);
    }
    (None, None)
}

/// Remote partial of a stored object, with the new path of a remote move.
fn remote_partial(s: &StoredEntry, remote: Option<&RemoteEntry>) -> (Option<SyncEvent>, Option<PathBuf>) {
    let id = s.record.remote_id.clone();
    let Some(remote) = remote else {
        let event = if s.record.is_folder() {
            let mut e = FolderEvent::remote(RemoteHandle::Gone(id)).with_remote(ChangeType::Deleted);
            e.recursive = true;
            SyncEvent::Folder(e)
        } else {
            SyncEvent::File(
                FileEvent::remote(RemoteHandle::Gone(id))
                    .with_remote(ChangeType::Deleted)
                    .with_remote_content(ContentChangeType::Deleted),
            )
        };
        return (Some(event), None);
    };

    let change = remote_change(&s.record, &remote.object);
    if change == ChangeType::None {
        return (None, None);
    }
    let target = (change == ChangeType::Moved).then(|| remote.relative.clone());
    let event = match &remote.object {
        RemoteObject::Document(doc) => SyncEvent::File(
            FileEvent::remote(RemoteHandle::Present(doc.clone()))
                .with_remote(change)
                .with_remote_content(remote_content_change(&s.record, doc)),
        ),
        RemoteObject::Folder(folder) => SyncEvent::Folder(
            FolderEvent::remote(RemoteHandle::Present(folder.clone())).with_remote(change),
        ),
    };
    (Some(event), target)
}

impl CrawlEventCollection {
    /// Drop everything below a folder deleted on either side; the folder's
    /// own event covers its subtree. Objects moved out of such a folder
    /// locally are kept.
    fn prune_deleted_subtrees(&mut self, root: &SyncRoot) {
        let deleted: HashSet<PathBuf> = self
            .mergable
            .values()
            .filter(|m| m.is_deleted_folder())
            .map(|m| m.relative.clone())
            .collect();
        if deleted.is_empty() {
            return;
        }
        let below = |path: &Path| deleted.iter().any(|d| path != d && path.starts_with(d));

        self.mergable.retain(|_, m| {
            if !below(&m.relative) {
                return true;
            }
            m.local_target.as_deref().map(|t| !below(t)).unwrap_or(false)
        });
        for m in self.mergable.values_mut() {
            if !m.is_deleted_folder() {
                continue;
            }
            if let Some(SyncEvent::Folder(e)) = m.local.as_mut() {
                e.recursive = true;
            }
        }
        self.creation_events.retain(|event| {
            event_path(event)
                .and_then(|p| root.relative(p).ok())
                .map(|rel| !below(&rel))
                .unwrap_or(true)
        });
    }

    /// Group the events in emission order.
    pub fn into_plan(self) -> CrawlPlan {
        let mut plan = CrawlPlan::default();
        let mut folder_creations: Vec<(usize, SyncEvent)> = Vec::new();
        let mut deletions: Vec<(usize, SyncEvent)> = Vec::new();

        for event in self.creation_events {
            let d = event_path(&event).map(depth).unwrap_or(0);
            match event {
                SyncEvent::Folder(_) => folder_creations.push((d, event)),
                _ => plan.file_creations.push(event),
            }
        }

        for (key, m) in self.mergable {
            let local = m.local_change();
            let remote = m.remote_change();
            let Some(event) = m.merged() else {
                continue;
            };
            if local == ChangeType::Moved {
                plan.moves.push(PendingMove {
                    key,
                    side: MoveSide::Local,
                    current: m.relative.clone(),
                    target: m.local_target.clone().unwrap_or_else(|| m.relative.clone()),
                    event,
                });
            } else if remote == ChangeType::Moved {
                plan.moves.push(PendingMove {
                    key,
                    side: MoveSide::Remote,
                    current: m.relative.clone(),
                    target: m.remote_target.clone().unwrap_or_else(|| m.relative.clone()),
                    event,
                });
            } else if local == ChangeType::Deleted || remote == ChangeType::Deleted {
                deletions.push((depth(&m.relative), event));
            } else {
                plan.changes.push(event);
            }
        }

        folder_creations.sort_by_key(|(d, _)| *d);
        deletions.sort_by_key(|(d, _)| *d);
        plan.folder_creations = folder_creations.into_iter().map(|(_, e)| e).collect();
        plan.deletions = deletions.into_iter().map(|(_, e)| e).collect();
        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::LocalStat;
    use docsync_core::{ChangeToken, MappedObject, RemoteDocument, RemoteFolder};

    const ROOT: &str = "root";

    fn sync_root() -> SyncRoot {
        SyncRoot::new("/sync")
    }

    fn file_record(id: &str, parent: &str, name: &str, token: &str, written: i64) -> MappedObject {
        let mut record = MappedObject::file(name, RemoteId::from(id), RemoteId::from(parent));
        record.last_change_token = Some(ChangeToken::from(token));
        record.last_local_write_time = Some(written);
        let seed = id.bytes().chain(name.bytes()).fold(0u128, |acc, b| acc.wrapping_mul(131).wrapping_add(u128::from(b)));
        record.guid = Some(Uuid::from_u128(seed));
        record
    }

    fn folder_record(id: &str, parent: &str, name: &str) -> MappedObject {
        let mut record = MappedObject::folder(name, RemoteId::from(id), RemoteId::from(parent));
        record.last_change_token = Some(ChangeToken::from("1"));
        record
    }

    fn stored(relative: &str, record: MappedObject) -> StoredEntry {
        StoredEntry {
            relative: PathBuf::from(relative),
            record,
        }
    }

    fn local(relative: &str, is_dir: bool, written: i64, guid: Option<Uuid>) -> LocalEntry {
        LocalEntry {
            relative: PathBuf::from(relative),
            stat: LocalStat {
                is_dir,
                len: 1,
                write_time: Some(written),
            },
            guid,
        }
    }

    fn doc(id: &str, parent: &str, name: &str, token: &str) -> RemoteObject {
        RemoteObject::Document(RemoteDocument {
            id: RemoteId::from(id),
            name: name.into(),
            parent_id: Some(RemoteId::from(parent)),
            change_token: Some(ChangeToken::from(token)),
            last_modified: 0,
            content_length: None,
            content_checksum: None,
            checked_out_pwc: None,
            ignored: false,
        })
    }

    fn folder(id: &str, parent: &str, name: &str) -> RemoteObject {
        RemoteObject::Folder(RemoteFolder {
            id: RemoteId::from(id),
            name: name.into(),
            parent_id: Some(RemoteId::from(parent)),
            path: format!("/{}", name),
            change_token: Some(ChangeToken::from("1")),
            last_modified: 0,
            ignored: false,
        })
    }

    fn remote(relative: &str, object: RemoteObject) -> RemoteEntry {
        RemoteEntry {
            relative: PathBuf::from(relative),
            object,
        }
    }

    fn snapshot(local: Vec<LocalEntry>, remote: Vec<RemoteEntry>, stored: Vec<StoredEntry>) -> TreeSnapshot {
        TreeSnapshot {
            base: PathBuf::new(),
            base_id: Some(RemoteId::from(ROOT)),
            local,
            remote,
            stored,
        }
    }

    fn file(event: &SyncEvent) -> &FileEvent {
        match event {
            SyncEvent::File(e) => e,
            other => panic!("expected a file event, got {:?}", other),
        }
    }

    #[test]
    fn test_in_sync_tree_yields_nothing() {
        let record = file_record("a", ROOT, "a.txt", "1", 10);
        let snap = snapshot(
            vec![local("a.txt", false, 10, record.guid)],
            vec![remote("a.txt", doc("a", ROOT, "a.txt", "1"))],
            vec![stored("a.txt", record)],
        );
        assert_eq!(generate(&snap, &sync_root()), CrawlEventCollection::default());
    }

    #[test]
    fn test_local_move_and_remote_delete_merge() {
        let record = file_record("a", ROOT, "a.txt", "1", 10);
        let snap = snapshot(
            vec![local("b.txt", false, 10, record.guid)],
            vec![],
            vec![stored("a.txt", record)],
        );
        let collection = generate(&snap, &sync_root());
        assert!(collection.creation_events.is_empty());

        let merged = collection.mergable[&RemoteId::from("a")].merged().unwrap();
        let e = file(&merged);
        assert_eq!(e.local, ChangeType::Moved);
        assert_eq!(e.remote, ChangeType::Deleted);
        assert_eq!(e.local_path, Some(PathBuf::from("/sync/b.txt")));
        assert_eq!(
            e.moved_from.as_ref().unwrap().old_local_path,
            Some(PathBuf::from("/sync/a.txt"))
        );
    }

    #[test]
    fn test_both_sides_changed() {
        let record = file_record("a", ROOT, "a.txt", "1", 10);
        let snap = snapshot(
            vec![local("a.txt", false, 20, record.guid)],
            vec![remote("a.txt", doc("a", ROOT, "a.txt", "2"))],
            vec![stored("a.txt", record)],
        );
        let plan = generate(&snap, &sync_root()).into_plan();
        assert_eq!(plan.changes.len(), 1);
        let e = file(&plan.changes[0]);
        assert_eq!((e.local, e.remote), (ChangeType::Changed, ChangeType::Changed));
        assert!(e.remote_document().is_some());
    }

    #[test]
    fn test_path_fallback_without_identity() {
        let mut record = file_record("a", ROOT, "a.txt", "1", 10);
        record.guid = None;
        let snap = snapshot(
            vec![local("a.txt", false, 10, Some(Uuid::from_u128(99)))],
            vec![remote("a.txt", doc("a", ROOT, "a.txt", "1"))],
            vec![stored("a.txt", record)],
        );
        assert!(generate(&snap, &sync_root()).mergable.is_empty());
    }

    #[test]
    fn test_same_path_creations_merge() {
        let snap = snapshot(
            vec![local("new.txt", false, 10, None), local("only-local.txt", false, 10, None)],
            vec![
                remote("new.txt", doc("n", ROOT, "new.txt", "1")),
                remote("only-remote.txt", doc("r", ROOT, "only-remote.txt", "1")),
            ],
            vec![],
        );
        let collection = generate(&snap, &sync_root());
        assert_eq!(collection.creation_events.len(), 3);

        let both = collection
            .creation_events
            .iter()
            .map(file)
            .find(|e| e.local_path == Some(PathBuf::from("/sync/new.txt")))
            .unwrap();
        assert_eq!((both.local, both.remote), (ChangeType::Created, ChangeType::Created));

        let remote_only = collection
            .creation_events
            .iter()
            .map(file)
            .find(|e| e.remote_id() == Some(&RemoteId::from("r")))
            .unwrap();
        assert_eq!(remote_only.local, ChangeType::None);
        assert_eq!(remote_only.local_path, Some(PathBuf::from("/sync/only-remote.txt")));
    }

    #[test]
    fn test_remote_deleted_folder_prunes_subtree() {
        let dir = folder_record("d", ROOT, "d");
        let inner = file_record("x", "d", "x.txt", "1", 10);
        let escaped = file_record("y", "d", "y.txt", "1", 10);
        let snap = snapshot(
            vec![
                local("d", true, 5, None),
                local("d/x.txt", false, 10, inner.guid),
                local("d/new.txt", false, 10, None),
                local("y.txt", false, 10, escaped.guid),
            ],
            vec![],
            vec![stored("d", dir), stored("d/x.txt", inner), stored("d/y.txt", escaped)],
        );
        let plan = generate(&snap, &sync_root()).into_plan();

        assert!(plan.file_creations.is_empty());
        assert_eq!(plan.deletions.len(), 1);
        match &plan.deletions[0] {
            SyncEvent::Folder(e) => {
                assert!(e.recursive);
                assert_eq!(e.remote, ChangeType::Deleted);
                assert_eq!(e.local, ChangeType::None);
            }
            other => panic!("expected a folder event, got {:?}", other),
        }
        // Moved out locally before the remote deletion: kept.
        assert_eq!(plan.moves.len(), 1);
        assert_eq!(plan.moves[0].key, RemoteId::from("y"));
    }

    #[test]
    fn test_folder_move_does_not_move_children() {
        let dir_guid = Uuid::from_u128(5);
        let mut dir_record = folder_record("d", ROOT, "d");
        dir_record.guid = Some(dir_guid);
        let inner = file_record("x", "d", "x.txt", "1", 10);
        let snap = snapshot(
            vec![local("e", true, 5, Some(dir_guid)), local("e/x.txt", false, 10, inner.guid)],
            vec![remote("d", folder("d", ROOT, "d")), remote("d/x.txt", doc("x", "d", "x.txt", "1"))],
            vec![stored("d", dir_record), stored("d/x.txt", inner)],
        );
        let plan = generate(&snap, &sync_root()).into_plan();
        assert_eq!(plan.moves.len(), 1);
        assert_eq!(plan.moves[0].side, MoveSide::Local);
        assert_eq!(plan.moves[0].target, PathBuf::from("e"));
        assert!(plan.changes.is_empty());
    }

    #[test]
    fn test_plan_order() {
        let gone = file_record("g", ROOT, "gone.txt", "1", 10);
        let snap = snapshot(
            vec![local("a", true, 1, None), local("a/b", true, 1, None), local("a/b/c.txt", false, 1, None)],
            vec![],
            vec![stored("gone.txt", gone)],
        );
        let plan = generate(&snap, &sync_root()).into_plan();
        let folders: Vec<_> = plan
            .folder_creations
            .iter()
            .map(|e| event_path(e).unwrap().to_path_buf())
            .collect();
        assert_eq!(folders, vec![PathBuf::from("/sync/a"), PathBuf::from("/sync/a/b")]);
        assert_eq!(plan.file_creations.len(), 1);
        assert_eq!(plan.deletions.len(), 1);
    }
}
