//! Resumable chunked upload.
//!
//! Content is appended to the target document one chunk at a time. A chunk
//! only counts once the server acknowledged it: the offset and the running
//! digest always describe acknowledged bytes, so an [`UploadInterrupted`]
//! carries exactly what a later attempt needs to resume.

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use docsync_core::{ChangeToken, Checksum, ContentHasher, HashAlgorithm, RemoteDocument, RemoteId};
use docsync_remote::RemoteSession;

use crate::chunk::ChunkReader;
use crate::error::TransferError;
use crate::transmission::Transmission;

/// Where an upload begins.
#[derive(Debug, Clone)]
pub struct UploadStart {
    /// Bytes of the local file already present on the server.
    pub offset: u64,

    /// Digest of those bytes.
    pub hasher: ContentHasher,
}

impl UploadStart {
    /// Start from the first byte.
    pub fn fresh(algorithm: HashAlgorithm) -> Self {
        Self {
            offset: 0,
            hasher: algorithm.hasher(),
        }
    }

    /// Continue after `hasher.bytes_hashed()` bytes.
    pub fn resume(hasher: ContentHasher) -> Self {
        Self {
            offset: hasher.bytes_hashed(),
            hasher,
        }
    }
}

/// A completed upload.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    /// Server state after the last append, if anything was appended.
    pub document: Option<RemoteDocument>,

    /// Digest of the whole uploaded content.
    pub checksum: Checksum,

    /// Total bytes on the server.
    pub length: u64,
}

/// An upload that stopped early, with the state needed to resume it.
#[derive(Debug, Error)]
#[error("upload interrupted at byte {offset}: {source}")]
pub struct UploadInterrupted {
    /// Acknowledged bytes.
    pub offset: u64,

    /// Digest of the acknowledged bytes.
    pub partial: Checksum,

    /// Change token of the target after the last acknowledged chunk.
    pub change_token: Option<ChangeToken>,

    #[source]
    pub source: TransferError,
}

/// Appends local file content to a remote document.
pub struct ChunkedUploader {
    session: Arc<dyn RemoteSession>,
    chunk_size: usize,
}

impl ChunkedUploader {
    pub fn new(session: Arc<dyn RemoteSession>, chunk_size: usize) -> Self {
        Self {
            session,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Upload `path` from `start.offset` onwards into `target`.
    ///
    /// The caller owns the transmission lifecycle; this only reports progress
    /// and honors abort requests between chunks.
    pub async fn upload(
        &self,
        target: &RemoteId,
        path: &Path,
        start: UploadStart,
        transmission: &Transmission,
    ) -> std::result::Result<UploadOutcome, UploadInterrupted> {
        let UploadStart { mut offset, mut hasher } = start;
        let mut change_token: Option<ChangeToken> = None;
        let mut document: Option<RemoteDocument> = None;

        let interrupted = |offset: u64, hasher: &ContentHasher, token: Option<ChangeToken>, source| {
            UploadInterrupted {
                offset,
                partial: hasher.snapshot(),
                change_token: token,
                source,
            }
        };

        let mut reader = match ChunkReader::open(path, offset, self.chunk_size).await {
            Ok(reader) => reader,
            Err(e) => return Err(interrupted(offset, &hasher, None, e)),
        };
        transmission.set_length(reader.length());
        if offset > 0 {
            tracing::info!(remote_id = %target, offset, length = reader.length(), "resuming upload");
            transmission.progress(offset);
        }

        loop {
            if transmission.is_abort_requested() {
                tracing::info!(remote_id = %target, offset, "upload aborted");
                return Err(interrupted(offset, &hasher, change_token, TransferError::Aborted));
            }

            let chunk = match reader.next_chunk().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(e) => return Err(interrupted(offset, &hasher, change_token, e)),
            };
            let is_last = reader.is_exhausted();
            let len = chunk.len() as u64;

            match self
                .session
                .append_content_stream(target, chunk.clone(), is_last)
                .await
            {
                Ok(doc) => {
                    hasher.update(&chunk);
                    offset += len;
                    change_token = doc.change_token.clone();
                    document = Some(doc);
                    transmission.progress(offset);
                }
                Err(e) => {
                    tracing::warn!(remote_id = %target, offset, error = %e, "chunk upload failed");
                    return Err(interrupted(offset, &hasher, change_token, e.into()));
                }
            }
        }

        Ok(UploadOutcome {
            document,
            checksum: hasher.finalize(),
            length: offset,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transmission::{TransmissionKind, TransmissionManager};
    use docsync_remote::MemoryRepository;
    use proptest::prelude::*;

    async fn setup(data: &[u8]) -> (tempfile::TempDir, std::path::PathBuf, Arc<MemoryRepository>, RemoteId) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.bin");
        std::fs::write(&path, data).unwrap();
        let repo = Arc::new(MemoryRepository::new());
        let doc = repo
            .create_document(&repo.root_id(), "file.bin", None)
            .await
            .unwrap();
        (dir, path, repo, doc.id)
    }

    #[tokio::test]
    async fn test_full_upload() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let (_dir, path, repo, id) = setup(&data).await;
        let uploader = ChunkedUploader::new(repo.clone(), 1024);
        let manager = TransmissionManager::new();
        let t = manager.start(TransmissionKind::UploadNew, &path, 0);

        let outcome = uploader
            .upload(&id, &path, UploadStart::fresh(HashAlgorithm::Sha1), &t)
            .await
            .unwrap();

        assert_eq!(outcome.length, 10_000);
        assert_eq!(outcome.checksum, Checksum::of(HashAlgorithm::Sha1, &data));
        assert_eq!(repo.content(&id).unwrap(), data);
        assert_eq!(repo.append_count(), 10);
        assert_eq!(t.position(), 10_000);
    }

    #[tokio::test]
    async fn test_interrupt_then_resume() {
        let data: Vec<u8> = (0..10 * 1024u32).map(|i| (i % 7) as u8).collect();
        let (_dir, path, repo, id) = setup(&data).await;
        let uploader = ChunkedUploader::new(repo.clone(), 1024);
        let manager = TransmissionManager::new();

        repo.fail_appends_after(6);
        let t = manager.start(TransmissionKind::UploadNew, &path, 0);
        let err = uploader
            .upload(&id, &path, UploadStart::fresh(HashAlgorithm::Sha1), &t)
            .await
            .unwrap_err();
        assert_eq!(err.offset, 6 * 1024);
        assert!(err.source.is_transient());
        assert_eq!(err.partial, Checksum::of(HashAlgorithm::Sha1, &data[..6 * 1024]));

        repo.clear_faults();
        let hasher = crate::chunk::rehash_prefix(&path, err.offset, HashAlgorithm::Sha1)
            .await
            .unwrap();
        assert_eq!(hasher.snapshot(), err.partial);

        let t = manager.start(TransmissionKind::UploadNew, &path, 0);
        let outcome = uploader
            .upload(&id, &path, UploadStart::resume(hasher), &t)
            .await
            .unwrap();

        assert_eq!(repo.append_count(), 10);
        assert_eq!(outcome.checksum, Checksum::of(HashAlgorithm::Sha1, &data));
        assert_eq!(repo.content(&id).unwrap(), data);
    }

    #[tokio::test]
    async fn test_abort_between_chunks() {
        let (_dir, path, repo, id) = setup(&[1u8; 4096]).await;
        let uploader = ChunkedUploader::new(repo.clone(), 1024);
        let manager = TransmissionManager::new();
        let t = manager.start(TransmissionKind::UploadModified, &path, 0);
        t.abort();

        let err = uploader
            .upload(&id, &path, UploadStart::fresh(HashAlgorithm::Sha1), &t)
            .await
            .unwrap_err();
        assert!(matches!(err.source, TransferError::Aborted));
        assert_eq!(err.offset, 0);
        assert_eq!(repo.append_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_file() {
        let (_dir, path, repo, id) = setup(b"").await;
        let uploader = ChunkedUploader::new(repo.clone(), 1024);
        let t = TransmissionManager::new().start(TransmissionKind::UploadNew, &path, 0);

        let outcome = uploader
            .upload(&id, &path, UploadStart::fresh(HashAlgorithm::Sha1), &t)
            .await
            .unwrap();
        assert_eq!(outcome.length, 0);
        assert!(outcome.document.is_none());
        assert!(repo.content(&id).unwrap().is_empty());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_resume_checksum_matches_uninterrupted(
            len in 1usize..6000,
            chunk in 64usize..1500,
            fail_after in 0usize..8,
        ) {
            let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            rt.block_on(async {
                let data: Vec<u8> = (0..len).map(|i| (i * 31 % 256) as u8).collect();
                let (_dir, path, repo, id) = setup(&data).await;
                let uploader = ChunkedUploader::new(repo.clone(), chunk);
                let manager = TransmissionManager::new();

                repo.fail_appends_after(fail_after);
                let t = manager.start(TransmissionKind::UploadNew, &path, 0);
                let start = match uploader.upload(&id, &path, UploadStart::fresh(HashAlgorithm::Sha1), &t).await {
                    Ok(outcome) => {
                        prop_assert_eq!(outcome.checksum, Checksum::of(HashAlgorithm::Sha1, &data));
                        return Ok(());
                    }
                    Err(interrupted) => interrupted.offset,
                };

                repo.clear_faults();
                let hasher = crate::chunk::rehash_prefix(&path, start, HashAlgorithm::Sha1).await.unwrap();
                let t = manager.start(TransmissionKind::UploadNew, &path, 0);
                let outcome = uploader.upload(&id, &path, UploadStart::resume(hasher), &t).await.unwrap();

                prop_assert_eq!(outcome.checksum, Checksum::of(HashAlgorithm::Sha1, &data));
                prop_assert_eq!(repo.content(&id).unwrap(), data);
                Ok(())
            })?;
        }
    }
}
