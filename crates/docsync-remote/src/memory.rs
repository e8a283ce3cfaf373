//! An in-memory repository for tests.
//!
//! Behaves like a small document repository: every mutation advances a
//! global counter that doubles as object change token and change-log
//! position. Faults can be injected to simulate dropped connections in the
//! middle of a chunked upload.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use bytes::Bytes;

use docsync_core::{
    ChangeLogEntry, ChangeLogPage, ChangeToken, Checksum, HashAlgorithm, RemoteChangeType,
    RemoteDocument, RemoteFolder, RemoteId, RemoteObject,
};

use crate::error::{RemoteError, Result};
use crate::session::{RemoteSession, RepositoryInfo};

const ROOT_ID: &str = "root";

#[derive(Debug, Clone)]
enum NodeBody {
    Folder,
    Document {
        content: Vec<u8>,
        /// Set on a private working copy: the document it was checked out from.
        pwc_of: Option<RemoteId>,
        /// Set on a checked-out document: its working copy.
        checked_out: Option<RemoteId>,
    },
}

#[derive(Debug, Clone)]
struct Node {
    id: RemoteId,
    name: String,
    parent: Option<RemoteId>,
    body: NodeBody,
    token: u64,
    modified: i64,
    ignored: bool,
}

#[derive(Debug, Default)]
struct Faults {
    offline: bool,
    /// Appends allowed before every further append fails.
    appends_before_failure: Option<usize>,
    check_ins_to_fail: usize,
    denied: Vec<RemoteId>,
}

struct Inner {
    nodes: HashMap<RemoteId, Node>,
    counter: u64,
    log: Vec<ChangeLogEntry>,
    faults: Faults,
    appends: usize,
    supports_pwc: bool,
    supports_change_log: bool,
}

/// In-memory [`RemoteSession`].
pub struct MemoryRepository {
    inner: RwLock<Inner>,
    algorithm: HashAlgorithm,
}

impl MemoryRepository {
    /// Empty repository with a root folder, PWC support and a change log.
    pub fn new() -> Self {
        Self::with_algorithm(HashAlgorithm::default())
    }

    /// Empty repository reporting content checksums with `algorithm`.
    pub fn with_algorithm(algorithm: HashAlgorithm) -> Self {
        let root = Node {
            id: RemoteId::from(ROOT_ID),
            name: String::new(),
            parent: None,
            body: NodeBody::Folder,
            token: 0,
            modified: now_millis(),
            ignored: false,
        };
        let mut nodes = HashMap::new();
        nodes.insert(root.id.clone(), root);

        Self {
            inner: RwLock::new(Inner {
                nodes,
                counter: 0,
                log: Vec::new(),
                faults: Faults::default(),
                appends: 0,
                supports_pwc: true,
                supports_change_log: true,
            }),
            algorithm,
        }
    }

    pub fn root_id(&self) -> RemoteId {
        RemoteId::from(ROOT_ID)
    }

    fn read<T>(&self, f: impl FnOnce(&Inner) -> Result<T>) -> Result<T> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        if inner.faults.offline {
            return Err(RemoteError::Connection("repository offline".into()));
        }
        f(&inner)
    }

    fn write<T>(&self, f: impl FnOnce(&mut Inner) -> Result<T>) -> Result<T> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if inner.faults.offline {
            return Err(RemoteError::Connection("repository offline".into()));
        }
        f(&mut inner)
    }

    fn configure(&self, f: impl FnOnce(&mut Inner)) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut inner)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Test controls
    // ─────────────────────────────────────────────────────────────────────────

    pub fn set_supports_pwc(&self, supported: bool) {
        self.configure(|inner| inner.supports_pwc = supported);
    }

    pub fn set_supports_change_log(&self, supported: bool) {
        self.configure(|inner| inner.supports_change_log = supported);
    }

    /// Fail every call with a connection error while `offline` is set.
    pub fn set_offline(&self, offline: bool) {
        self.configure(|inner| inner.faults.offline = offline);
    }

    /// Let `n` more appends succeed, then fail every append.
    pub fn fail_appends_after(&self, n: usize) {
        self.configure(|inner| inner.faults.appends_before_failure = Some(n));
    }

    /// Fail the next `n` check-ins, leaving the working copy in place.
    pub fn fail_check_ins(&self, n: usize) {
        self.configure(|inner| inner.faults.check_ins_to_fail = n);
    }

    /// Deny every request touching `id`.
    pub fn deny(&self, id: &RemoteId) {
        self.configure(|inner| inner.faults.denied.push(id.clone()));
    }

    pub fn clear_faults(&self) {
        self.configure(|inner| inner.faults = Faults::default());
    }

    /// Flip the selective-ignore flag of an object. Logged as an update.
    pub fn set_ignored(&self, id: &RemoteId, ignored: bool) -> Result<()> {
        self.write(|inner| {
            let token = inner.bump();
            let node = inner.node_mut(id)?;
            node.ignored = ignored;
            node.token = token;
            inner.record(id, RemoteChangeType::Updated);
            Ok(())
        })
    }

    /// Total number of successful appends.
    pub fn append_count(&self) -> usize {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.appends
    }

    /// Raw content of a document.
    pub fn content(&self, id: &RemoteId) -> Option<Vec<u8>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        match &inner.nodes.get(id)?.body {
            NodeBody::Document { content, .. } => Some(content.clone()),
            NodeBody::Folder => None,
        }
    }

    /// Resolve a `/`-separated path below the root.
    pub fn find_by_path(&self, path: &str) -> Option<RemoteId> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut current = RemoteId::from(ROOT_ID);
        for name in path.split('/').filter(|s| !s.is_empty()) {
            current = inner
                .nodes
                .values()
                .find(|n| n.parent.as_ref() == Some(&current) && n.name == name && !n.is_pwc())?
                .id
                .clone();
        }
        Some(current)
    }

    /// Number of visible objects, root included.
    pub fn object_count(&self) -> usize {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.nodes.values().filter(|n| !n.is_pwc()).count()
    }

    fn snapshot(&self, inner: &Inner, node: &Node) -> RemoteObject {
        match &node.body {
            NodeBody::Folder => RemoteObject::Folder(RemoteFolder {
                id: node.id.clone(),
                name: node.name.clone(),
                parent_id: node.parent.clone(),
                path: inner.path_of(node),
                change_token: Some(ChangeToken::new(node.token.to_string())),
                last_modified: node.modified,
                ignored: node.ignored,
            }),
            NodeBody::Document { content, checked_out, .. } => {
                RemoteObject::Document(RemoteDocument {
                    id: node.id.clone(),
                    name: node.name.clone(),
                    parent_id: node.parent.clone(),
                    change_token: Some(ChangeToken::new(node.token.to_string())),
                    last_modified: node.modified,
                    content_length: Some(content.len() as u64),
                    content_checksum: Some(Checksum::of(self.algorithm, content)),
                    checked_out_pwc: checked_out.clone(),
                    ignored: node.ignored,
                })
            }
        }
    }

    fn document_snapshot(&self, inner: &Inner, id: &RemoteId) -> Result<RemoteDocument> {
        let node = inner.node(id)?;
        match self.snapshot(inner, node) {
            RemoteObject::Document(doc) => Ok(doc),
            RemoteObject::Folder(_) => Err(RemoteError::Constraint(format!("{} is a folder", id))),
        }
    }

    fn create(&self, inner: &mut Inner, parent: &RemoteId, name: &str, body: NodeBody) -> Result<RemoteId> {
        if !inner.node(parent)?.is_folder() {
            return Err(RemoteError::Constraint(format!("{} is not a folder", parent)));
        }
        inner.check_name_free(parent, name)?;

        let token = inner.bump();
        let id = RemoteId::new(format!("obj-{}", token));
        inner.nodes.insert(
            id.clone(),
            Node {
                id: id.clone(),
                name: name.to_string(),
                parent: Some(parent.clone()),
                body,
                token,
                modified: now_millis(),
                ignored: false,
            },
        );
        inner.record(&id, RemoteChangeType::Created);
        Ok(id)
    }
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl Node {
    fn is_folder(&self) -> bool {
        matches!(self.body, NodeBody::Folder)
    }

    fn is_pwc(&self) -> bool {
        matches!(self.body, NodeBody::Document { pwc_of: Some(_), .. })
    }
}

impl Inner {
    fn bump(&mut self) -> u64 {
        self.counter += 1;
        self.counter
    }

    fn record(&mut self, id: &RemoteId, change_type: RemoteChangeType) {
        self.log.push(ChangeLogEntry {
            object_id: id.clone(),
            change_type,
            token: ChangeToken::new(self.counter.to_string()),
        });
    }

    fn node(&self, id: &RemoteId) -> Result<&Node> {
        if self.faults.denied.contains(id) {
            return Err(RemoteError::PermissionDenied(id.to_string()));
        }
        self.nodes.get(id).ok_or_else(|| RemoteError::NotFound(id.clone()))
    }

    fn node_mut(&mut self, id: &RemoteId) -> Result<&mut Node> {
        if self.faults.denied.contains(id) {
            return Err(RemoteError::PermissionDenied(id.to_string()));
        }
        self.nodes.get_mut(id).ok_or_else(|| RemoteError::NotFound(id.clone()))
    }

    fn check_name_free(&self, parent: &RemoteId, name: &str) -> Result<()> {
        let taken = self
            .nodes
            .values()
            .any(|n| n.parent.as_ref() == Some(parent) && n.name == name && !n.is_pwc());
        if taken {
            return Err(RemoteError::NameConflict {
                parent: parent.clone(),
                name: name.to_string(),
            });
        }
        Ok(())
    }

    fn path_of(&self, node: &Node) -> String {
        let mut names = Vec::new();
        let mut current = Some(node);
        while let Some(n) = current {
            if n.parent.is_none() {
                break;
            }
            names.push(n.name.as_str());
            current = n.parent.as_ref().and_then(|p| self.nodes.get(p));
        }
        names.reverse();
        format!("/{}", names.join("/"))
    }

    fn descendants(&self, id: &RemoteId) -> Vec<RemoteId> {
        let mut out = Vec::new();
        let mut frontier = vec![id.clone()];
        while let Some(current) = frontier.pop() {
            for child in self.nodes.values().filter(|n| n.parent.as_ref() == Some(&current)) {
                frontier.push(child.id.clone());
                out.push(child.id.clone());
            }
        }
        out
    }

    fn touch(&mut self, id: &RemoteId) -> Result<()> {
        let token = self.bump();
        let node = self.node_mut(id)?;
        node.token = token;
        node.modified = now_millis();
        Ok(())
    }

    /// Log an update unless `id` is a working copy.
    fn record_update(&mut self, id: &RemoteId) {
        let is_pwc = self.nodes.get(id).map(Node::is_pwc).unwrap_or(false);
        if !is_pwc {
            self.record(id, RemoteChangeType::Updated);
        }
    }

    fn content_mut(&mut self, id: &RemoteId) -> Result<&mut Vec<u8>> {
        match &mut self.node_mut(id)?.body {
            NodeBody::Document { content, .. } => Ok(content),
            NodeBody::Folder => Err(RemoteError::Constraint(format!("{} is a folder", id))),
        }
    }
}

#[async_trait]
impl RemoteSession for MemoryRepository {
    async fn repository_info(&self) -> Result<RepositoryInfo> {
        self.read(|inner| {
            Ok(RepositoryInfo {
                name: "memory".into(),
                root_folder_id: RemoteId::from(ROOT_ID),
                supports_pwc: inner.supports_pwc,
                supports_change_log: inner.supports_change_log,
            })
        })
    }

    async fn get_object(&self, id: &RemoteId) -> Result<RemoteObject> {
        self.read(|inner| Ok(self.snapshot(inner, inner.node(id)?)))
    }

    async fn get_children(&self, folder: &RemoteId) -> Result<Vec<RemoteObject>> {
        self.read(|inner| {
            if !inner.node(folder)?.is_folder() {
                return Err(RemoteError::Constraint(format!("{} is not a folder", folder)));
            }
            let mut children: Vec<&Node> = inner
                .nodes
                .values()
                .filter(|n| n.parent.as_ref() == Some(folder) && !n.is_pwc())
                .filter(|n| !inner.faults.denied.contains(&n.id))
                .collect();
            children.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(children.into_iter().map(|n| self.snapshot(inner, n)).collect())
        })
    }

    async fn create_folder(&self, parent: &RemoteId, name: &str) -> Result<RemoteFolder> {
        self.write(|inner| {
            let id = self.create(inner, parent, name, NodeBody::Folder)?;
            match self.snapshot(inner, inner.node(&id)?) {
                RemoteObject::Folder(folder) => Ok(folder),
                RemoteObject::Document(_) => Err(RemoteError::Constraint(format!("{} is a document", id))),
            }
        })
    }

    async fn create_document(
        &self,
        parent: &RemoteId,
        name: &str,
        content: Option<Bytes>,
    ) -> Result<RemoteDocument> {
        self.write(|inner| {
            let body = NodeBody::Document {
                content: content.map(|c| c.to_vec()).unwrap_or_default(),
                pwc_of: None,
                checked_out: None,
            };
            let id = self.create(inner, parent, name, body)?;
            self.document_snapshot(inner, &id)
        })
    }

    async fn rename(&self, id: &RemoteId, new_name: &str) -> Result<RemoteObject> {
        self.write(|inner| {
            let parent = inner
                .node(id)?
                .parent
                .clone()
                .ok_or_else(|| RemoteError::Constraint("cannot rename the root".into()))?;
            inner.check_name_free(&parent, new_name)?;
            inner.touch(id)?;
            inner.node_mut(id)?.name = new_name.to_string();
            inner.record(id, RemoteChangeType::Updated);
            Ok(self.snapshot(inner, inner.node(id)?))
        })
    }

    async fn move_object(&self, id: &RemoteId, target_parent: &RemoteId) -> Result<RemoteObject> {
        self.write(|inner| {
            if !inner.node(target_parent)?.is_folder() {
                return Err(RemoteError::Constraint(format!("{} is not a folder", target_parent)));
            }
            if id == target_parent || inner.descendants(id).contains(target_parent) {
                return Err(RemoteError::Constraint("cannot move a folder into itself".into()));
            }
            let name = inner.node(id)?.name.clone();
            inner.check_name_free(target_parent, &name)?;
            inner.touch(id)?;
            inner.node_mut(id)?.parent = Some(target_parent.clone());
            inner.record(id, RemoteChangeType::Updated);
            Ok(self.snapshot(inner, inner.node(id)?))
        })
    }

    async fn delete(&self, id: &RemoteId) -> Result<()> {
        self.write(|inner| {
            let node = inner.node(id)?;
            if node.parent.is_none() {
                return Err(RemoteError::Constraint("cannot delete the root".into()));
            }
            if node.is_folder() && !inner.descendants(id).is_empty() {
                return Err(RemoteError::Constraint(format!("folder {} is not empty", id)));
            }
            let pwc = match &node.body {
                NodeBody::Document { checked_out, .. } => checked_out.clone(),
                NodeBody::Folder => None,
            };
            if let Some(pwc) = pwc {
                inner.nodes.remove(&pwc);
            }
            inner.nodes.remove(id);
            inner.bump();
            inner.record(id, RemoteChangeType::Deleted);
            Ok(())
        })
    }

    async fn delete_tree(&self, folder: &RemoteId) -> Result<()> {
        self.write(|inner| {
            let node = inner.node(folder)?;
            if node.parent.is_none() {
                return Err(RemoteError::Constraint("cannot delete the root".into()));
            }
            let mut doomed = inner.descendants(folder);
            doomed.push(folder.clone());
            for id in doomed {
                let visible = inner.nodes.remove(&id).map(|n| !n.is_pwc()).unwrap_or(false);
                if visible {
                    inner.bump();
                    inner.record(&id, RemoteChangeType::Deleted);
                }
            }
            Ok(())
        })
    }

    async fn get_content_stream(
        &self,
        id: &RemoteId,
        offset: u64,
        length: Option<u64>,
    ) -> Result<Bytes> {
        self.read(|inner| match &inner.node(id)?.body {
            NodeBody::Document { content, .. } => {
                let start = (offset as usize).min(content.len());
                let end = match length {
                    Some(len) => start.saturating_add(len as usize).min(content.len()),
                    None => content.len(),
                };
                Ok(Bytes::copy_from_slice(&content[start..end]))
            }
            NodeBody::Folder => Err(RemoteError::Constraint(format!("{} is a folder", id))),
        })
    }

    async fn set_content_stream(&self, id: &RemoteId, content: Bytes) -> Result<RemoteDocument> {
        self.write(|inner| {
            *inner.content_mut(id)? = content.to_vec();
            inner.touch(id)?;
            inner.record_update(id);
            self.document_snapshot(inner, id)
        })
    }

    async fn append_content_stream(
        &self,
        id: &RemoteId,
        chunk: Bytes,
        _is_last: bool,
    ) -> Result<RemoteDocument> {
        self.write(|inner| {
            if let Some(remaining) = inner.faults.appends_before_failure {
                if remaining == 0 {
                    tracing::debug!(id = %id, "injected append failure");
                    return Err(RemoteError::Connection("connection reset during append".into()));
                }
                inner.faults.appends_before_failure = Some(remaining - 1);
            }
            inner.content_mut(id)?.extend_from_slice(&chunk);
            inner.touch(id)?;
            inner.record_update(id);
            inner.appends += 1;
            self.document_snapshot(inner, id)
        })
    }

    async fn delete_content_stream(&self, id: &RemoteId) -> Result<RemoteDocument> {
        self.write(|inner| {
            inner.content_mut(id)?.clear();
            inner.touch(id)?;
            inner.record_update(id);
            self.document_snapshot(inner, id)
        })
    }

    async fn check_out(&self, id: &RemoteId) -> Result<RemoteDocument> {
        self.write(|inner| {
            if !inner.supports_pwc {
                return Err(RemoteError::NotSupported("checkout"));
            }
            let node = inner.node(id)?.clone();
            let content = match &node.body {
                NodeBody::Document { checked_out: Some(_), .. } => {
                    return Err(RemoteError::Constraint(format!("{} is already checked out", id)))
                }
                NodeBody::Document { pwc_of: Some(_), .. } => {
                    return Err(RemoteError::Constraint(format!("{} is a working copy", id)))
                }
                NodeBody::Document { content, .. } => content.clone(),
                NodeBody::Folder => {
                    return Err(RemoteError::Constraint(format!("{} is a folder", id)))
                }
            };

            let token = inner.bump();
            let pwc_id = RemoteId::new(format!("pwc-{}", token));
            inner.nodes.insert(
                pwc_id.clone(),
                Node {
                    id: pwc_id.clone(),
                    name: node.name.clone(),
                    parent: node.parent.clone(),
                    body: NodeBody::Document {
                        content,
                        pwc_of: Some(id.clone()),
                        checked_out: None,
                    },
                    token,
                    modified: now_millis(),
                    ignored: node.ignored,
                },
            );
            if let NodeBody::Document { checked_out, .. } = &mut inner.node_mut(id)?.body {
                *checked_out = Some(pwc_id.clone());
            }
            self.document_snapshot(inner, &pwc_id)
        })
    }

    async fn cancel_check_out(&self, pwc: &RemoteId) -> Result<()> {
        self.write(|inner| {
            let original = match &inner.node(pwc)?.body {
                NodeBody::Document { pwc_of: Some(original), .. } => original.clone(),
                _ => return Err(RemoteError::Constraint(format!("{} is not a working copy", pwc))),
            };
            inner.nodes.remove(pwc);
            if let Some(Node { body: NodeBody::Document { checked_out, .. }, .. }) =
                inner.nodes.get_mut(&original)
            {
                *checked_out = None;
            }
            Ok(())
        })
    }

    async fn check_in(&self, pwc: &RemoteId) -> Result<RemoteDocument> {
        self.write(|inner| {
            if inner.faults.check_ins_to_fail > 0 {
                inner.faults.check_ins_to_fail -= 1;
                tracing::debug!(pwc = %pwc, "injected check-in failure");
                return Err(RemoteError::Connection("connection reset during check-in".into()));
            }
            let (original, content) = match &inner.node(pwc)?.body {
                NodeBody::Document { pwc_of: Some(original), content, .. } => {
                    (original.clone(), content.clone())
                }
                _ => return Err(RemoteError::Constraint(format!("{} is not a working copy", pwc))),
            };
            inner.nodes.remove(pwc);
            if let NodeBody::Document { content: current, checked_out, .. } =
                &mut inner.node_mut(&original)?.body
            {
                *current = content;
                *checked_out = None;
            }
            inner.touch(&original)?;
            inner.record(&original, RemoteChangeType::Updated);
            self.document_snapshot(inner, &original)
        })
    }

    async fn latest_change_log_token(&self) -> Result<Option<ChangeToken>> {
        self.read(|inner| {
            if !inner.supports_change_log {
                return Err(RemoteError::NotSupported("change log"));
            }
            Ok(Some(ChangeToken::new(inner.counter.to_string())))
        })
    }

    async fn get_content_changes(&self, since: &ChangeToken, max_items: usize) -> Result<ChangeLogPage> {
        self.read(|inner| {
            if !inner.supports_change_log {
                return Err(RemoteError::NotSupported("change log"));
            }
            let since_pos: u64 = since
                .as_str()
                .parse()
                .map_err(|_| RemoteError::InvalidArgument(format!("bad change token {}", since)))?;

            let pending: Vec<&ChangeLogEntry> = inner
                .log
                .iter()
                .filter(|e| e.token.as_str().parse::<u64>().map(|p| p > since_pos).unwrap_or(false))
                .collect();
            let has_more_items = pending.len() > max_items;
            let entries: Vec<ChangeLogEntry> = pending.into_iter().take(max_items).cloned().collect();
            let next_token = entries
                .last()
                .map(|e| e.token.clone())
                .or_else(|| Some(since.clone()));

            Ok(ChangeLogPage {
                entries,
                has_more_items,
                next_token,
            })
        })
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn root() -> RemoteId {
        RemoteId::from(ROOT_ID)
    }

    #[tokio::test]
    async fn test_create_and_list() {
        let repo = MemoryRepository::new();
        let folder = repo.create_folder(&root(), "docs").await.unwrap();
        let doc = repo
            .create_document(&folder.id, "a.txt", Some(Bytes::from_static(b"abc")))
            .await
            .unwrap();

        assert_eq!(folder.path, "/docs");
        assert_eq!(doc.content_length, Some(3));
        assert_eq!(
            doc.content_checksum,
            Some(Checksum::of(HashAlgorithm::Sha1, b"abc"))
        );

        let children = repo.get_children(&folder.id).await.unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(repo.find_by_path("docs/a.txt"), Some(doc.id));
    }

    #[tokio::test]
    async fn test_name_conflict() {
        let repo = MemoryRepository::new();
        repo.create_folder(&root(), "docs").await.unwrap();
        let err = repo.create_folder(&root(), "docs").await.unwrap_err();
        assert!(matches!(err, RemoteError::NameConflict { .. }));
    }

    #[tokio::test]
    async fn test_ranged_read() {
        let repo = MemoryRepository::new();
        let doc = repo
            .create_document(&root(), "a", Some(Bytes::from_static(b"0123456789")))
            .await
            .unwrap();

        let middle = repo.get_content_stream(&doc.id, 3, Some(4)).await.unwrap();
        assert_eq!(&middle[..], b"3456");
        let tail = repo.get_content_stream(&doc.id, 8, None).await.unwrap();
        assert_eq!(&tail[..], b"89");
        let past_end = repo.get_content_stream(&doc.id, 20, Some(4)).await.unwrap();
        assert!(past_end.is_empty());
    }

    #[tokio::test]
    async fn test_change_log_paging() {
        let repo = MemoryRepository::new();
        let start = repo.latest_change_log_token().await.unwrap().unwrap();
        for i in 0..5 {
            repo.create_folder(&root(), &format!("f{}", i)).await.unwrap();
        }

        let page = repo.get_content_changes(&start, 3).await.unwrap();
        assert_eq!(page.entries.len(), 3);
        assert!(page.has_more_items);

        let rest = repo
            .get_content_changes(page.next_token.as_ref().unwrap(), 3)
            .await
            .unwrap();
        assert_eq!(rest.entries.len(), 2);
        assert!(!rest.has_more_items);
        assert_eq!(rest.next_token, repo.latest_change_log_token().await.unwrap());
    }

    #[tokio::test]
    async fn test_checkout_checkin() {
        let repo = MemoryRepository::new();
        let doc = repo
            .create_document(&root(), "a", Some(Bytes::from_static(b"old")))
            .await
            .unwrap();

        let pwc = repo.check_out(&doc.id).await.unwrap();
        repo.delete_content_stream(&pwc.id).await.unwrap();
        repo.append_content_stream(&pwc.id, Bytes::from_static(b"ne"), false)
            .await
            .unwrap();
        repo.append_content_stream(&pwc.id, Bytes::from_static(b"w"), true)
            .await
            .unwrap();

        // The visible version is untouched until check-in.
        assert_eq!(repo.content(&doc.id).unwrap(), b"old");
        assert_eq!(repo.get_children(&root()).await.unwrap().len(), 1);

        let checked_in = repo.check_in(&pwc.id).await.unwrap();
        assert_eq!(checked_in.id, doc.id);
        assert_eq!(repo.content(&doc.id).unwrap(), b"new");
        assert!(checked_in.checked_out_pwc.is_none());
        assert_ne!(checked_in.change_token, doc.change_token);
    }

    #[tokio::test]
    async fn test_append_fault_injection() {
        let repo = MemoryRepository::new();
        let doc = repo.create_document(&root(), "a", None).await.unwrap();

        repo.fail_appends_after(2);
        for _ in 0..2 {
            repo.append_content_stream(&doc.id, Bytes::from_static(b"x"), false)
                .await
                .unwrap();
        }
        let err = repo
            .append_content_stream(&doc.id, Bytes::from_static(b"x"), false)
            .await
            .unwrap_err();
        assert!(err.is_transient());

        repo.clear_faults();
        repo.append_content_stream(&doc.id, Bytes::from_static(b"x"), true)
            .await
            .unwrap();
        assert_eq!(repo.content(&doc.id).unwrap(), b"xxx");
    }

    #[tokio::test]
    async fn test_delete_tree_logs_each_object() {
        let repo = MemoryRepository::new();
        let folder = repo.create_folder(&root(), "docs").await.unwrap();
        repo.create_document(&folder.id, "a", None).await.unwrap();
        let before = repo.latest_change_log_token().await.unwrap().unwrap();

        assert!(matches!(
            repo.delete(&folder.id).await,
            Err(RemoteError::Constraint(_))
        ));
        repo.delete_tree(&folder.id).await.unwrap();

        let page = repo.get_content_changes(&before, 10).await.unwrap();
        assert_eq!(page.entries.len(), 2);
        assert!(page
            .entries
            .iter()
            .all(|e| e.change_type == RemoteChangeType::Deleted));
        assert_eq!(repo.object_count(), 1);
    }

    #[tokio::test]
    async fn test_denied_and_offline() {
        let repo = MemoryRepository::new();
        let doc = repo.create_document(&root(), "a", None).await.unwrap();

        repo.deny(&doc.id);
        assert!(matches!(
            repo.get_object(&doc.id).await,
            Err(RemoteError::PermissionDenied(_))
        ));

        repo.set_offline(true);
        assert!(repo.repository_info().await.unwrap_err().is_transient());
    }

    #[tokio::test]
    async fn test_check_in_fault_keeps_working_copy() {
        let repo = MemoryRepository::new();
        let doc = repo
            .create_document(&root(), "a", Some(Bytes::from_static(b"old")))
            .await
            .unwrap();
        let pwc = repo.check_out(&doc.id).await.unwrap();
        repo.delete_content_stream(&pwc.id).await.unwrap();
        repo.append_content_stream(&pwc.id, Bytes::from_static(b"new"), true)
            .await
            .unwrap();

        repo.fail_check_ins(1);
        assert!(repo.check_in(&pwc.id).await.unwrap_err().is_transient());
        assert_eq!(repo.content(&doc.id).unwrap(), b"old");
        assert_eq!(repo.content(&pwc.id).unwrap(), b"new");

        repo.check_in(&pwc.id).await.unwrap();
        assert_eq!(repo.content(&doc.id).unwrap(), b"new");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_paging_sees_every_entry_once(
            edits in proptest::collection::vec(0usize..3, 1..40),
            page in 1usize..8,
        ) {
            let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            rt.block_on(async {
                let repo = MemoryRepository::new();
                let start = repo.latest_change_log_token().await.unwrap().unwrap();
                let mut docs = Vec::new();
                for (i, edit) in edits.iter().enumerate() {
                    match (*edit, docs.last().cloned()) {
                        (1, Some(id)) => {
                            repo.set_content_stream(&id, Bytes::from(vec![i as u8])).await.unwrap();
                        }
                        (2, Some(id)) => {
                            repo.rename(&id, &format!("renamed-{}", i)).await.unwrap();
                        }
                        _ => {
                            let doc = repo.create_document(&root(), &format!("doc-{}", i), None).await.unwrap();
                            docs.push(doc.id);
                        }
                    }
                }

                let all = repo.get_content_changes(&start, usize::MAX).await.unwrap();
                prop_assert!(!all.has_more_items);

                let mut seen = Vec::new();
                let mut token = start;
                loop {
                    let batch = repo.get_content_changes(&token, page).await.unwrap();
                    prop_assert!(batch.entries.len() <= page);
                    seen.extend(batch.entries);
                    token = batch.next_token.unwrap();
                    if !batch.has_more_items {
                        break;
                    }
                }

                prop_assert_eq!(&seen, &all.entries);
                prop_assert_eq!(Some(token), repo.latest_change_log_token().await.unwrap());
                Ok(())
            })?;
        }
    }
}
