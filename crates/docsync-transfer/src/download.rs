//! Resumable chunked download.
//!
//! Bytes land in a cache file next to the target (`<name>.sync`), which the
//! default ignore wildcards exclude from sync. The target only appears once
//! the content is complete and verified, by renaming the cache file over it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs::OpenOptions;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};

use docsync_core::{Checksum, HashAlgorithm, RemoteDocument};
use docsync_remote::RemoteSession;

use crate::chunk::rehash_prefix;
use crate::error::{Result, TransferError};
use crate::transmission::Transmission;

const CACHE_SUFFIX: &str = ".sync";

/// Cache file used while downloading into `target`.
pub fn cache_path_for(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(CACHE_SUFFIX);
    target.with_file_name(name)
}

/// A completed download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOutcome {
    /// Digest of the downloaded content.
    pub checksum: Checksum,

    /// Bytes written.
    pub length: u64,

    /// Bytes already present in the cache file when the download began.
    pub resumed_from: u64,
}

/// Pulls document content into local files.
pub struct ChunkedDownloader {
    session: Arc<dyn RemoteSession>,
    chunk_size: usize,
}

impl ChunkedDownloader {
    pub fn new(session: Arc<dyn RemoteSession>, chunk_size: usize) -> Self {
        Self {
            session,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Download `doc` into `target`, resuming from a leftover cache file.
    ///
    /// When the server reports a checksum in `algorithm`, the content is
    /// verified against it before the target is replaced; a mismatch discards
    /// the cache file.
    pub async fn download(
        &self,
        doc: &RemoteDocument,
        target: &Path,
        algorithm: HashAlgorithm,
        transmission: &Transmission,
    ) -> Result<DownloadOutcome> {
        let cache = cache_path_for(target);
        let expected_len = doc.content_length;

        let mut offset = match tokio::fs::metadata(&cache).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };
        if expected_len.map(|len| offset > len).unwrap_or(false) {
            offset = 0;
        }
        let resumed_from = offset;

        let mut hasher = if offset > 0 {
            tracing::info!(remote_id = %doc.id, offset, "resuming download");
            rehash_prefix(&cache, offset, algorithm).await?
        } else {
            algorithm.hasher()
        };

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&cache)
            .await?;
        file.set_len(offset).await?;
        file.seek(std::io::SeekFrom::Start(offset)).await?;

        transmission.set_length(expected_len.unwrap_or(0));
        transmission.progress(offset);

        loop {
            if expected_len.map(|len| offset >= len).unwrap_or(false) {
                break;
            }
            if transmission.is_abort_requested() {
                file.flush().await?;
                tracing::info!(remote_id = %doc.id, offset, "download aborted");
                return Err(TransferError::Aborted);
            }

            let chunk = self
                .session
                .get_content_stream(&doc.id, offset, Some(self.chunk_size as u64))
                .await?;
            if chunk.is_empty() {
                break;
            }

            file.write_all(&chunk).await?;
            hasher.update(&chunk);
            offset += chunk.len() as u64;
            transmission.progress(offset);
        }

        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        if let Some(expected) = expected_len {
            if offset != expected {
                return Err(TransferError::LengthMismatch {
                    expected,
                    actual: offset,
                });
            }
        }

        let checksum = hasher.finalize();
        if let Some(expected) = &doc.content_checksum {
            if expected.algorithm == algorithm && *expected != checksum {
                tokio::fs::remove_file(&cache).await?;
                return Err(TransferError::ChecksumMismatch {
                    expected: expected.clone(),
                    actual: checksum,
                });
            }
        }

        tokio::fs::rename(&cache, target).await?;
        tracing::debug!(remote_id = %doc.id, path = %target.display(), length = offset, "download complete");

        Ok(DownloadOutcome {
            checksum,
            length: offset,
            resumed_from,
        })
    }
}
