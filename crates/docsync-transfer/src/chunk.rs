//! Fixed-size chunked reads and prefix hashing.

use std::io::SeekFrom;
use std::path::Path;

use bytes::Bytes;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use docsync_core::{ContentHasher, HashAlgorithm};

use crate::error::Result;

/// 1 MiB.
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Reads a file in chunks of exactly `chunk_size` bytes (the last one may be
/// shorter).
pub struct ChunkReader {
    file: File,
    chunk_size: usize,
    position: u64,
    length: u64,
}

impl ChunkReader {
    /// Open `path` positioned at `offset`.
    pub async fn open(path: &Path, offset: u64, chunk_size: usize) -> Result<Self> {
        let mut file = File::open(path).await?;
        let length = file.metadata().await?.len();
        if offset > 0 {
            file.seek(SeekFrom::Start(offset)).await?;
        }
        Ok(Self {
            file,
            chunk_size: chunk_size.max(1),
            position: offset,
            length,
        })
    }

    /// Next chunk, or `None` at end of file.
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        let mut buf = vec![0u8; self.chunk_size];
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.file.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        if filled == 0 {
            return Ok(None);
        }
        buf.truncate(filled);
        self.position += filled as u64;
        Ok(Some(Bytes::from(buf)))
    }

    /// Offset of the next byte to be read.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// File length at open time.
    pub fn length(&self) -> u64 {
        self.length
    }

    /// True once every byte present at open time was returned.
    pub fn is_exhausted(&self) -> bool {
        self.position >= self.length
    }
}

/// Hash the first `length` bytes of a file.
///
/// Returns the running hasher so the caller can keep feeding it. A file
/// shorter than `length` yields a hasher over the whole file; check
/// [`ContentHasher::bytes_hashed`].
pub async fn rehash_prefix(path: &Path, length: u64, algorithm: HashAlgorithm) -> Result<ContentHasher> {
    let mut hasher = algorithm.hasher();
    if length == 0 {
        return Ok(hasher);
    }

    let mut file = File::open(path).await?;
    let mut remaining = length;
    let mut buf = vec![0u8; DEFAULT_CHUNK_SIZE];
    while remaining > 0 {
        let want = remaining.min(buf.len() as u64) as usize;
        let n = file.read(&mut buf[..want]).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        remaining -= n as u64;
    }
    Ok(hasher)
}
