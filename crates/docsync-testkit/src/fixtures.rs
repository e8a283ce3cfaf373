//! Test fixtures and helpers.
//!
//! Common setup code for engine tests: a temporary sync root, an in-memory
//! metadata store that already maps the root, and an in-memory repository.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tempfile::TempDir;

use docsync_core::{Checksum, HashAlgorithm, MappedObject, RemoteDocument, RemoteFolder, RemoteId};
use docsync_remote::{MemoryRepository, RemoteSession};
use docsync_store::{MemoryStore, MetaDataStorage};

/// A temporary sync root with a memory store and a memory repository.
pub struct TestFixture {
    dir: TempDir,
    pub store: Arc<MemoryStore>,
    pub repo: Arc<MemoryRepository>,
}

impl TestFixture {
    /// Create a fixture whose store maps the local root to the repository root.
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        std::fs::create_dir(dir.path().join("sync")).expect("create sync root");

        let store = Arc::new(MemoryStore::new());
        let repo = Arc::new(MemoryRepository::new());
        store
            .save(&MappedObject::root(repo.root_id()))
            .await
            .expect("save root record");

        Self { dir, store, repo }
    }

    /// The local sync root.
    pub fn root(&self) -> PathBuf {
        self.dir.path().join("sync")
    }

    /// A scratch directory outside the sync root.
    pub fn scratch(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    /// Absolute path of `relative` under the sync root.
    pub fn local(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.root().join(relative)
    }

    pub fn root_id(&self) -> RemoteId {
        self.repo.root_id()
    }

    /// Write a local file, creating missing parent directories.
    pub fn write_local(&self, relative: impl AsRef<Path>, data: &[u8]) -> PathBuf {
        let path = self.local(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent dirs");
        }
        std::fs::write(&path, data).expect("write local file");
        path
    }

    /// Create a local directory and its missing parents.
    pub fn mkdir_local(&self, relative: impl AsRef<Path>) -> PathBuf {
        let path = self.local(relative);
        std::fs::create_dir_all(&path).expect("create local dir");
        path
    }

    pub fn read_local(&self, relative: impl AsRef<Path>) -> Option<Vec<u8>> {
        std::fs::read(self.local(relative)).ok()
    }

    pub async fn remote_document(&self, parent: &RemoteId, name: &str, data: &[u8]) -> RemoteDocument {
        self.repo
            .create_document(parent, name, Some(Bytes::copy_from_slice(data)))
            .await
            .expect("create remote document")
    }

    pub async fn remote_folder(&self, parent: &RemoteId, name: &str) -> RemoteFolder {
        self.repo
            .create_folder(parent, name)
            .await
            .expect("create remote folder")
    }

    /// Record `doc` as synchronized with the local file at the matching path.
    ///
    /// The local file must exist; its write time and checksum are stored.
    pub async fn map_document(&self, doc: &RemoteDocument) -> MappedObject {
        let parent = doc.parent_id.clone().expect("document has a parent");
        let mut record = MappedObject::file(doc.name.clone(), doc.id.clone(), parent);
        record.last_change_token = doc.change_token.clone();
        record.last_remote_write_time = Some(doc.last_modified);
        record.last_content_size = doc.content_length;

        let relative = self.relative_path_of(&record).await;
        let path = self.local(&relative);
        let data = std::fs::read(&path).expect("mapped file exists locally");
        record.set_checksum(&Checksum::of(HashAlgorithm::Sha1, &data));
        record.last_local_write_time = write_time(&path);

        self.store.save(&record).await.expect("save record");
        record
    }

    /// Record `folder` as synchronized with the local directory of the same
    /// path.
    pub async fn map_folder(&self, folder: &RemoteFolder) -> MappedObject {
        let parent = folder.parent_id.clone().expect("folder has a parent");
        let mut record = MappedObject::folder(folder.name.clone(), folder.id.clone(), parent);
        record.last_change_token = folder.change_token.clone();
        record.last_remote_write_time = Some(folder.last_modified);
        self.store.save(&record).await.expect("save record");
        record
    }

    /// Create a document on both sides and map it.
    pub async fn synced_document(&self, parent: &RemoteId, relative: &str, data: &[u8]) -> RemoteDocument {
        self.write_local(relative, data);
        let name = Path::new(relative)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .expect("relative path has a file name");
        let doc = self.remote_document(parent, &name, data).await;
        self.map_document(&doc).await;
        doc
    }

    /// Create a folder on both sides and map it.
    pub async fn synced_folder(&self, parent: &RemoteId, relative: &str) -> RemoteFolder {
        self.mkdir_local(relative);
        let name = Path::new(relative)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .expect("relative path has a file name");
        let folder = self.remote_folder(parent, &name).await;
        self.map_folder(&folder).await;
        folder
    }

    async fn relative_path_of(&self, record: &MappedObject) -> PathBuf {
        let parent_id = record.parent_id.clone().expect("record has a parent");
        let parent = self
            .store
            .get_by_remote_id(&parent_id)
            .await
            .expect("store lookup")
            .expect("parent is mapped");
        let parent_path = self
            .store
            .get_relative_path(&parent)
            .await
            .expect("store lookup")
            .expect("parent chain is complete");
        parent_path.join(&record.name)
    }
}

/// Modification time of `path` in Unix ms.
pub fn write_time(path: &Path) -> Option<i64> {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .map(|t| DateTime::<Utc>::from(t).timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fixture_maps_root() {
        let fx = TestFixture::new().await;
        let root = fx.store.get_root().await.unwrap().unwrap();
        assert_eq!(root.remote_id, fx.root_id());
        assert!(fx.root().is_dir());
    }

    #[tokio::test]
    async fn test_synced_document_is_consistent() {
        let fx = TestFixture::new().await;
        let folder = fx.synced_folder(&fx.root_id(), "docs").await;
        let doc = fx.synced_document(&folder.id, "docs/a.txt", b"hello").await;

        let record = fx
            .store
            .get_by_local_path(Path::new("docs/a.txt"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.remote_id, doc.id);
        assert_eq!(record.checksum(), doc.content_checksum);
        assert_eq!(record.last_local_write_time, write_time(&fx.local("docs/a.txt")));
    }
}
