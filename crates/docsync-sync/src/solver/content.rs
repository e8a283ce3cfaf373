//! Content transfers on behalf of the solver.
//!
//! Uploads go through a private working copy when the repository supports
//! checkout: bytes are appended to the working copy and only a completed
//! upload is checked in, so a crash never leaves a truncated visible
//! version. Interrupted uploads persist a [`TransferState`]; the next
//! attempt validates it against both the server and the local file and
//! resumes from the acknowledged offset when everything still matches.

use std::path::Path;

use docsync_core::{
    ChangeToken, Checksum, ContentHasher, HashAlgorithm, RemoteDocument, RemoteId, RemoteObject,
    TransferState,
};
use docsync_remote::RemoteError;
use docsync_transfer::{
    rehash_prefix, ChunkedDownloader, ChunkedUploader, DownloadOutcome, Transmission,
    TransmissionKind, TransferError, UploadStart,
};

use crate::context::SyncContext;
use crate::error::{ErrorClass, Result, SyncError};
use crate::local::{stat, LocalStat};

/// A finished upload.
#[derive(Debug, Clone)]
pub struct Uploaded {
    /// Server state of the document after the upload.
    pub document: RemoteDocument,
    pub checksum: Checksum,
}

/// The checked-out working copy an upload appends to.
#[derive(Debug, Clone)]
struct WorkingCopy {
    id: RemoteId,
    change_token: Option<ChangeToken>,
}

/// Moves file content between disk and repository.
pub struct ContentTransfer<'a> {
    ctx: &'a SyncContext,
}

impl<'a> ContentTransfer<'a> {
    pub fn new(ctx: &'a SyncContext) -> Self {
        Self { ctx }
    }

    fn algorithm(&self) -> HashAlgorithm {
        self.ctx.config.transfer.algorithm
    }

    fn chunk_size(&self) -> usize {
        self.ctx.config.transfer.chunk_size
    }

    /// Replace the content of document `id` with the file at `path`.
    pub async fn upload(&self, id: &RemoteId, path: &Path, kind: TransmissionKind) -> Result<Uploaded> {
        let local = stat(path).await?.ok_or_else(|| vanished(path))?;
        let transmission = self.ctx.transmissions.start(kind, path, local.len);

        let result: Result<Uploaded> = async {
            let doc = match self.ctx.session.get_object(id).await? {
                RemoteObject::Document(doc) => doc,
                RemoteObject::Folder(_) => {
                    return Err(SyncError::Inconsistent(format!("{} is a folder", id)));
                }
            };
            if self.use_working_copy().await? {
                self.upload_checked_out(&doc, path, local, &transmission).await
            } else {
                self.upload_direct(&doc, path, &transmission).await
            }
        }
        .await;

        finish(&transmission, &result);
        result
    }

    /// Download `doc` into `target`, resuming a leftover partial download.
    pub async fn download(
        &self,
        doc: &RemoteDocument,
        target: &Path,
        kind: TransmissionKind,
    ) -> Result<DownloadOutcome> {
        let transmission = self
            .ctx
            .transmissions
            .start(kind, target, doc.content_length.unwrap_or(0));

        let result: Result<DownloadOutcome> = async {
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let downloader = ChunkedDownloader::new(self.ctx.session.clone(), self.chunk_size());
            Ok(downloader
                .download(doc, target, self.algorithm(), &transmission)
                .await?)
        }
        .await;

        finish(&transmission, &result);
        result
    }

    async fn use_working_copy(&self) -> Result<bool> {
        if !self.ctx.config.transfer.use_pwc {
            return Ok(false);
        }
        Ok(self.ctx.session.repository_info().await?.supports_pwc)
    }

    async fn upload_direct(
        &self,
        doc: &RemoteDocument,
        path: &Path,
        transmission: &Transmission,
    ) -> Result<Uploaded> {
        let cleared = self.ctx.session.delete_content_stream(&doc.id).await?;
        let uploader = ChunkedUploader::new(self.ctx.session.clone(), self.chunk_size());
        let outcome = uploader
            .upload(&doc.id, path, UploadStart::fresh(self.algorithm()), transmission)
            .await
            .map_err(|interrupted| SyncError::Transfer(interrupted.source))?;

        let document = outcome.document.unwrap_or(cleared);
        verify(&document, &outcome.checksum)?;
        Ok(Uploaded {
            document,
            checksum: outcome.checksum,
        })
    }

    async fn upload_checked_out(
        &self,
        doc: &RemoteDocument,
        path: &Path,
        local: LocalStat,
        transmission: &Transmission,
    ) -> Result<Uploaded> {
        let (pwc, start) = match self.resumable(doc, path, local).await? {
            Some((pwc, hasher)) => (pwc, UploadStart::resume(hasher)),
            None => (self.check_out(doc).await?, UploadStart::fresh(self.algorithm())),
        };

        let uploader = ChunkedUploader::new(self.ctx.session.clone(), self.chunk_size());
        let outcome = match uploader.upload(&pwc.id, path, start, transmission).await {
            Ok(outcome) => outcome,
            Err(interrupted) => {
                let at = WorkingCopy {
                    id: pwc.id.clone(),
                    change_token: interrupted.change_token.clone().or(pwc.change_token),
                };
                self.save_progress(doc, path, local, &at, interrupted.offset, &interrupted.partial)
                    .await?;
                tracing::info!(
                    remote_id = %doc.id,
                    offset = interrupted.offset,
                    error = %interrupted.source,
                    "upload interrupted, transfer state saved"
                );
                return Err(interrupted.source.into());
            }
        };

        // Everything is on the server; a failed check-in resumes at the end.
        let at = WorkingCopy {
            id: pwc.id.clone(),
            change_token: outcome
                .document
                .as_ref()
                .and_then(|d| d.change_token.clone())
                .or(pwc.change_token),
        };
        self.save_progress(doc, path, local, &at, outcome.length, &outcome.checksum)
            .await?;
        let document = match self.ctx.session.check_in(&pwc.id).await {
            Ok(document) => document,
            Err(e) => {
                tracing::info!(remote_id = %doc.id, error = %e, "check-in failed, transfer state kept");
                return Err(e.into());
            }
        };
        self.ctx.transfers.remove_transfer(&doc.id).await?;
        verify(&document, &outcome.checksum)?;
        tracing::info!(
            remote_id = %doc.id,
            length = outcome.length,
            checksum = %outcome.checksum.to_hex(),
            "working copy checked in"
        );
        Ok(Uploaded {
            document,
            checksum: outcome.checksum,
        })
    }

    /// Persist how far the upload into `pwc` got.
    async fn save_progress(
        &self,
        doc: &RemoteDocument,
        path: &Path,
        local: LocalStat,
        pwc: &WorkingCopy,
        offset: u64,
        partial: &Checksum,
    ) -> Result<()> {
        let relative = self.ctx.root.relative(path)?;
        let mut state = TransferState::new(doc.id.clone(), relative, self.algorithm());
        state.pwc_id = Some(pwc.id.clone());
        state.pwc_change_token = pwc.change_token.clone();
        state.offset = offset;
        state.partial_checksum = Some(partial.bytes.clone());
        state.local_write_time = local.write_time;
        state.content_length = local.len;
        self.ctx.transfers.save_transfer(&state).await?;
        Ok(())
    }

    /// The working copy and digest to resume from, if a saved transfer
    /// still matches the server and the file. Stale state and orphaned
    /// working copies are discarded on the way.
    async fn resumable(
        &self,
        doc: &RemoteDocument,
        path: &Path,
        local: LocalStat,
    ) -> Result<Option<(WorkingCopy, ContentHasher)>> {
        let Some(state) = self.ctx.transfers.get_transfer(&doc.id).await? else {
            if let Some(orphan) = &doc.checked_out_pwc {
                tracing::warn!(remote_id = %doc.id, pwc = %orphan, "discarding working copy without transfer state");
                self.cancel(orphan).await?;
            }
            return Ok(None);
        };

        if let Some(resume) = self.validate(&state, doc, path, local).await? {
            return Ok(Some(resume));
        }
        tracing::info!(remote_id = %doc.id, offset = state.offset, "transfer state is stale, restarting upload");
        if let Some(pwc) = &doc.checked_out_pwc {
            self.cancel(pwc).await?;
        }
        self.ctx.transfers.remove_transfer(&doc.id).await?;
        Ok(None)
    }

    async fn validate(
        &self,
        state: &TransferState,
        doc: &RemoteDocument,
        path: &Path,
        local: LocalStat,
    ) -> Result<Option<(WorkingCopy, ContentHasher)>> {
        let Some(pwc_id) = state.pwc_id.clone() else {
            return Ok(None);
        };
        let Some(partial) = state.partial_checksum.clone() else {
            return Ok(None);
        };
        if state.algorithm != self.algorithm()
            || doc.checked_out_pwc.as_ref() != Some(&pwc_id)
            || !state.has_progress()
            || state.local_write_time != local.write_time
            || state.content_length != local.len
            || state.offset > local.len
        {
            return Ok(None);
        }

        let pwc = match self.ctx.session.get_object(&pwc_id).await {
            Ok(RemoteObject::Document(pwc)) => pwc,
            Ok(RemoteObject::Folder(_)) | Err(RemoteError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if pwc.change_token != state.pwc_change_token || pwc.content_length != Some(state.offset) {
            tracing::debug!(pwc = %pwc_id, "working copy changed since the interruption");
            return Ok(None);
        }

        let expected = Checksum::from_bytes(state.algorithm, partial)?;
        let hasher = rehash_prefix(path, state.offset, state.algorithm).await?;
        if hasher.snapshot() != expected {
            tracing::debug!(path = %path.display(), "local prefix no longer matches");
            return Ok(None);
        }
        if self.remote_prefix(&pwc_id, state.offset).await? != expected {
            tracing::warn!(pwc = %pwc_id, "working copy content does not match the saved digest");
            return Ok(None);
        }

        Ok(Some((
            WorkingCopy {
                id: pwc_id,
                change_token: pwc.change_token,
            },
            hasher,
        )))
    }

    /// Digest of the first `length` bytes of `id` as stored on the server.
    async fn remote_prefix(&self, id: &RemoteId, length: u64) -> Result<Checksum> {
        let mut hasher = self.algorithm().hasher();
        let mut offset = 0;
        while offset < length {
            let want = (length - offset).min(self.chunk_size() as u64);
            let chunk = self.ctx.session.get_content_stream(id, offset, Some(want)).await?;
            if chunk.is_empty() {
                break;
            }
            hasher.update(&chunk);
            offset += chunk.len() as u64;
        }
        Ok(hasher.finalize())
    }

    /// Check out `doc` and empty the working copy.
    async fn check_out(&self, doc: &RemoteDocument) -> Result<WorkingCopy> {
        let pwc = self.ctx.session.check_out(&doc.id).await?;
        let pwc = self.ctx.session.delete_content_stream(&pwc.id).await?;
        tracing::debug!(remote_id = %doc.id, pwc = %pwc.id, "checked out");
        Ok(WorkingCopy {
            id: pwc.id,
            change_token: pwc.change_token,
        })
    }

    async fn cancel(&self, pwc: &RemoteId) -> Result<()> {
        match self.ctx.session.cancel_check_out(pwc).await {
            Ok(()) => Ok(()),
            Err(RemoteError::NotFound(_)) | Err(RemoteError::Constraint(_)) => {
                tracing::debug!(pwc = %pwc, "working copy already gone");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn vanished(path: &Path) -> SyncError {
    SyncError::Io(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        format!("{} vanished", path.display()),
    ))
}

/// The server must report the digest the upload computed, when it reports
/// one in the same algorithm.
fn verify(document: &RemoteDocument, checksum: &Checksum) -> Result<()> {
    match &document.content_checksum {
        Some(remote) if remote.algorithm == checksum.algorithm && remote != checksum => {
            Err(SyncError::Transfer(TransferError::ChecksumMismatch {
                expected: checksum.clone(),
                actual: remote.clone(),
            }))
        }
        _ => Ok(()),
    }
}

fn finish<T>(transmission: &Transmission, result: &Result<T>) {
    match result {
        Ok(_) => transmission.complete(),
        Err(e) if e.classify() == ErrorClass::Aborted => transmission.aborted(),
        Err(e) => transmission.failed(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::context::testing::context_with;
    use docsync_remote::RemoteSession;
    use docsync_testkit::TestFixture;

    const CHUNK: usize = 1024;

    fn config() -> SyncConfig {
        let mut config = SyncConfig::default();
        config.transfer.chunk_size = CHUNK;
        config
    }

    fn data(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 251) as u8).collect()
    }

    #[tokio::test]
    async fn test_upload_through_working_copy() {
        let fx = TestFixture::new().await;
        let content = data(3 * CHUNK + 10);
        let path = fx.write_local("a.bin", &content);
        let doc = fx.remote_document(&fx.root_id(), "a.bin", b"old").await;
        let (ctx, _rx) = context_with(&fx, config());

        let uploaded = ContentTransfer::new(&ctx)
            .upload(&doc.id, &path, TransmissionKind::UploadModified)
            .await
            .unwrap();

        assert_eq!(uploaded.checksum, Checksum::of(HashAlgorithm::Sha1, &content));
        assert_eq!(fx.repo.content(&doc.id), Some(content));
        assert!(uploaded.document.checked_out_pwc.is_none());
        assert!(ctx.transfers.get_transfer(&doc.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_interrupted_upload_resumes_from_offset() {
        let fx = TestFixture::new().await;
        let content = data(10 * CHUNK);
        let path = fx.write_local("big.bin", &content);
        let doc = fx.remote_document(&fx.root_id(), "big.bin", b"").await;
        let (ctx, _rx) = context_with(&fx, config());
        let transfer = ContentTransfer::new(&ctx);

        fx.repo.fail_appends_after(6);
        let err = transfer
            .upload(&doc.id, &path, TransmissionKind::UploadNew)
            .await
            .unwrap_err();
        assert_eq!(err.classify(), ErrorClass::Transient);

        let state = ctx.transfers.get_transfer(&doc.id).await.unwrap().unwrap();
        assert_eq!(state.offset, 6 * CHUNK as u64);
        assert_eq!(
            state.partial_checksum,
            Some(Checksum::of(HashAlgorithm::Sha1, &content[..6 * CHUNK]).bytes)
        );
        // The visible version is untouched while the working copy fills up.
        assert_eq!(fx.repo.content(&doc.id), Some(Vec::new()));

        fx.repo.clear_faults();
        let uploaded = transfer
            .upload(&doc.id, &path, TransmissionKind::UploadNew)
            .await
            .unwrap();
        assert_eq!(fx.repo.append_count(), 10);
        assert_eq!(uploaded.checksum, Checksum::of(HashAlgorithm::Sha1, &content));
        assert_eq!(fx.repo.content(&doc.id), Some(content));
    }

    #[tokio::test]
    async fn test_failed_check_in_retries_without_uploading_again() {
        let fx = TestFixture::new().await;
        let content = data(4 * CHUNK + 100);
        let path = fx.write_local("a.bin", &content);
        let doc = fx.remote_document(&fx.root_id(), "a.bin", b"old").await;
        let (ctx, _rx) = context_with(&fx, config());
        let transfer = ContentTransfer::new(&ctx);

        fx.repo.fail_check_ins(1);
        let err = transfer
            .upload(&doc.id, &path, TransmissionKind::UploadModified)
            .await
            .unwrap_err();
        assert_eq!(err.classify(), ErrorClass::Transient);
        assert_eq!(fx.repo.append_count(), 5);
        assert_eq!(fx.repo.content(&doc.id), Some(b"old".to_vec()));

        let state = ctx.transfers.get_transfer(&doc.id).await.unwrap().unwrap();
        assert_eq!(state.offset, content.len() as u64);
        assert_eq!(
            state.partial_checksum,
            Some(Checksum::of(HashAlgorithm::Sha1, &content).bytes)
        );

        let uploaded = transfer
            .upload(&doc.id, &path, TransmissionKind::UploadModified)
            .await
            .unwrap();
        assert_eq!(fx.repo.append_count(), 5);
        assert_eq!(uploaded.checksum, Checksum::of(HashAlgorithm::Sha1, &content));
        assert_eq!(fx.repo.content(&doc.id), Some(content));
        assert!(uploaded.document.checked_out_pwc.is_none());
        assert!(ctx.transfers.get_transfer(&doc.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_local_edit_invalidates_saved_state() {
        let fx = TestFixture::new().await;
        let path = fx.write_local("a.bin", &data(4 * CHUNK));
        let doc = fx.remote_document(&fx.root_id(), "a.bin", b"").await;
        let (ctx, _rx) = context_with(&fx, config());
        let transfer = ContentTransfer::new(&ctx);

        fx.repo.fail_appends_after(2);
        transfer
            .upload(&doc.id, &path, TransmissionKind::UploadNew)
            .await
            .unwrap_err();
        fx.repo.clear_faults();

        let edited: Vec<u8> = data(4 * CHUNK).into_iter().map(|b| b ^ 0xff).collect();
        std::fs::write(&path, &edited).unwrap();
        transfer
            .upload(&doc.id, &path, TransmissionKind::UploadModified)
            .await
            .unwrap();

        // Two appends before the failure, then a restart from byte zero.
        assert_eq!(fx.repo.append_count(), 2 + 4);
        assert_eq!(fx.repo.content(&doc.id), Some(edited));
    }

    #[tokio::test]
    async fn test_orphaned_working_copy_is_discarded() {
        let fx = TestFixture::new().await;
        let path = fx.write_local("a.txt", b"fresh");
        let doc = fx.remote_document(&fx.root_id(), "a.txt", b"old").await;
        fx.repo.check_out(&doc.id).await.unwrap();
        let (ctx, _rx) = context_with(&fx, config());

        ContentTransfer::new(&ctx)
            .upload(&doc.id, &path, TransmissionKind::UploadModified)
            .await
            .unwrap();
        assert_eq!(fx.repo.content(&doc.id), Some(b"fresh".to_vec()));
    }

    #[tokio::test]
    async fn test_direct_upload_without_checkout_support() {
        let fx = TestFixture::new().await;
        fx.repo.set_supports_pwc(false);
        let path = fx.write_local("a.txt", b"direct");
        let doc = fx.remote_document(&fx.root_id(), "a.txt", b"old content").await;
        let (ctx, _rx) = context_with(&fx, config());

        let uploaded = ContentTransfer::new(&ctx)
            .upload(&doc.id, &path, TransmissionKind::UploadModified)
            .await
            .unwrap();
        assert_eq!(uploaded.document.content_length, Some(6));
        assert_eq!(fx.repo.content(&doc.id), Some(b"direct".to_vec()));
    }

    #[tokio::test]
    async fn test_download_reports_transmission_events() {
        let fx = TestFixture::new().await;
        let doc = fx.remote_document(&fx.root_id(), "a.txt", b"remote").await;
        let (ctx, _rx) = context_with(&fx, config());
        let mut events = ctx.transmissions.subscribe();

        let target = fx.local("sub/a.txt");
        ContentTransfer::new(&ctx)
            .download(&doc, &target, TransmissionKind::DownloadNew)
            .await
            .unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"remote");

        let mut completed = false;
        while let Ok(event) = events.try_recv() {
            if matches!(event, docsync_transfer::TransmissionEvent::Completed { .. }) {
                completed = true;
            }
        }
        assert!(completed);
    }
}
