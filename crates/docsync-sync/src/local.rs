//! Local filesystem access: the sync root, stable entry identities and
//! entry metadata.
//!
//! Stable identity is a capability injected at start-up. The default reader
//! derives it from the device and inode numbers, which survive renames and
//! moves within one filesystem.

use std::collections::HashMap;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use docsync_core::{Checksum, HashAlgorithm};
use docsync_transfer::rehash_prefix;

use crate::error::{Result, SyncError};

/// The local directory being synchronized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRoot {
    path: PathBuf,
}

impl SyncRoot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of `absolute` relative to the root.
    pub fn relative(&self, absolute: &Path) -> Result<PathBuf> {
        absolute
            .strip_prefix(&self.path)
            .map(Path::to_path_buf)
            .map_err(|_| SyncError::OutsideRoot(absolute.to_path_buf()))
    }

    pub fn absolute(&self, relative: &Path) -> PathBuf {
        if relative.as_os_str().is_empty() {
            self.path.clone()
        } else {
            self.path.join(relative)
        }
    }

    pub fn contains(&self, absolute: &Path) -> bool {
        absolute.starts_with(&self.path)
    }
}

/// Reads the stable identity of a filesystem entry.
pub trait IdentityReader: Send + Sync {
    /// `Ok(None)` when the platform offers no identity for `path`.
    fn read(&self, path: &Path) -> std::io::Result<Option<Uuid>>;
}

/// Identity from the device and inode numbers.
#[derive(Debug, Clone, Copy, Default)]
pub struct InodeIdentity;

impl IdentityReader for InodeIdentity {
    #[cfg(unix)]
    fn read(&self, path: &Path) -> std::io::Result<Option<Uuid>> {
        use std::os::unix::fs::MetadataExt;
        let meta = std::fs::symlink_metadata(path)?;
        Ok(Some(Uuid::from_u64_pair(meta.dev(), meta.ino())))
    }

    #[cfg(not(unix))]
    fn read(&self, path: &Path) -> std::io::Result<Option<Uuid>> {
        std::fs::symlink_metadata(path)?;
        Ok(None)
    }
}

/// Identity table keyed by path, for tests and platforms without inodes.
///
/// Unknown paths get a fresh identity on first read. [`PathIdentity::rename`]
/// carries an identity over to a new path.
#[derive(Debug, Default)]
pub struct PathIdentity {
    ids: Mutex<HashMap<PathBuf, Uuid>>,
}

impl PathIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rename(&self, from: &Path, to: &Path) {
        let mut ids = self.ids.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(id) = ids.remove(from) {
            ids.insert(to.to_path_buf(), id);
        }
    }
}

impl IdentityReader for PathIdentity {
    fn read(&self, path: &Path) -> std::io::Result<Option<Uuid>> {
        std::fs::symlink_metadata(path)?;
        let mut ids = self.ids.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(Some(*ids.entry(path.to_path_buf()).or_insert_with(Uuid::new_v4)))
    }
}

/// Metadata of a local entry that the engine compares against records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalStat {
    pub is_dir: bool,
    pub len: u64,
    /// Modification time (Unix ms).
    pub write_time: Option<i64>,
}

impl LocalStat {
    pub fn from_metadata(meta: &Metadata) -> Self {
        Self {
            is_dir: meta.is_dir(),
            len: meta.len(),
            write_time: write_time(meta),
        }
    }
}

/// Modification time of an entry in Unix ms.
pub fn write_time(meta: &Metadata) -> Option<i64> {
    meta.modified()
        .ok()
        .map(|t| DateTime::<Utc>::from(t).timestamp_millis())
}

/// Stat `path`, mapping a missing entry to `None`.
pub async fn stat(path: &Path) -> Result<Option<LocalStat>> {
    match tokio::fs::metadata(path).await {
        Ok(meta) => Ok(Some(LocalStat::from_metadata(&meta))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Digest of a whole file.
pub async fn file_checksum(path: &Path, algorithm: HashAlgorithm) -> Result<Checksum> {
    Ok(rehash_prefix(path, u64::MAX, algorithm).await?.finalize())
}

/// Name of the last path component, lossily converted.
pub fn file_name(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_relative_paths() {
        let root = SyncRoot::new("/sync");
        assert_eq!(
            root.relative(Path::new("/sync/a/b.txt")).unwrap(),
            PathBuf::from("a/b.txt")
        );
        assert!(root.relative(Path::new("/elsewhere/b.txt")).is_err());
        assert_eq!(root.absolute(Path::new("")), PathBuf::from("/sync"));
        assert_eq!(root.absolute(Path::new("a")), PathBuf::from("/sync/a"));
    }

    #[cfg(unix)]
    #[test]
    fn test_inode_identity_survives_rename() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        std::fs::write(&a, b"x").unwrap();

        let before = InodeIdentity.read(&a).unwrap();
        std::fs::rename(&a, &b).unwrap();
        let after = InodeIdentity.read(&b).unwrap();

        assert!(before.is_some());
        assert_eq!(before, after);
        assert!(InodeIdentity.read(&a).is_err());
    }

    #[test]
    fn test_path_identity_rename() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        std::fs::write(&a, b"x").unwrap();

        let ids = PathIdentity::new();
        let first = ids.read(&a).unwrap();
        assert_eq!(ids.read(&a).unwrap(), first);

        std::fs::rename(&a, &b).unwrap();
        ids.rename(&a, &b);
        assert_eq!(ids.read(&b).unwrap(), first);
    }

    #[tokio::test]
    async fn test_stat_and_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f");
        std::fs::write(&file, b"abc").unwrap();

        let st = stat(&file).await.unwrap().unwrap();
        assert!(!st.is_dir);
        assert_eq!(st.len, 3);
        assert!(st.write_time.is_some());
        assert!(stat(&dir.path().join("missing")).await.unwrap().is_none());

        let sum = file_checksum(&file, HashAlgorithm::Sha1).await.unwrap();
        assert_eq!(sum, Checksum::of(HashAlgorithm::Sha1, b"abc"));
    }
}
