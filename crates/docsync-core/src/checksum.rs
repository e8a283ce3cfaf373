//! Content checksums.
//!
//! SHA-1 is the default because most content servers report it; BLAKE3 is
//! available for repositories that accept client-side hashes of any kind.
//! The algorithm name is persisted next to every stored checksum.

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::fmt;

use crate::error::CoreError;

/// Supported checksum algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HashAlgorithm {
    Sha1,
    Blake3,
}

impl HashAlgorithm {
    /// Persisted name of the algorithm.
    pub fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha1 => "SHA-1",
            HashAlgorithm::Blake3 => "BLAKE3",
        }
    }

    /// Parse a persisted algorithm name.
    pub fn from_name(name: &str) -> Result<Self, CoreError> {
        match name.to_ascii_uppercase().as_str() {
            "SHA-1" | "SHA1" => Ok(HashAlgorithm::Sha1),
            "BLAKE3" => Ok(HashAlgorithm::Blake3),
            _ => Err(CoreError::UnknownHashAlgorithm(name.to_string())),
        }
    }

    /// Digest length in bytes.
    pub fn digest_len(&self) -> usize {
        match self {
            HashAlgorithm::Sha1 => 20,
            HashAlgorithm::Blake3 => 32,
        }
    }

    /// Start a fresh incremental hasher.
    pub fn hasher(&self) -> ContentHasher {
        ContentHasher::new(*self)
    }
}

impl Default for HashAlgorithm {
    fn default() -> Self {
        HashAlgorithm::Sha1
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A finished digest tagged with its algorithm.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checksum {
    pub algorithm: HashAlgorithm,
    pub bytes: Vec<u8>,
}

impl Checksum {
    /// Hash a complete buffer.
    pub fn of(algorithm: HashAlgorithm, data: &[u8]) -> Self {
        let mut hasher = algorithm.hasher();
        hasher.update(data);
        hasher.finalize()
    }

    /// Wrap raw digest bytes, checking their length.
    pub fn from_bytes(algorithm: HashAlgorithm, bytes: Vec<u8>) -> Result<Self, CoreError> {
        if bytes.len() != algorithm.digest_len() {
            return Err(CoreError::ChecksumLength {
                algorithm: algorithm.name(),
                expected: algorithm.digest_len(),
                actual: bytes.len(),
            });
        }
        Ok(Self { algorithm, bytes })
    }

    /// Parse a hex digest.
    pub fn from_hex(algorithm: HashAlgorithm, s: &str) -> Result<Self, CoreError> {
        Self::from_bytes(algorithm, hex::decode(s)?)
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.algorithm.name(), self.to_hex())
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm.name(), self.to_hex())
    }
}

#[derive(Clone)]
enum HasherState {
    Sha1(Sha1),
    Blake3(Box<blake3::Hasher>),
}

/// Incremental hasher that also counts the bytes it has seen.
///
/// Cloning is cheap enough to take a snapshot of a running hash, which is
/// how partial upload checksums are persisted without finishing the hash.
#[derive(Clone)]
pub struct ContentHasher {
    algorithm: HashAlgorithm,
    state: HasherState,
    bytes_hashed: u64,
}

impl ContentHasher {
    /// Create an empty hasher.
    pub fn new(algorithm: HashAlgorithm) -> Self {
        let state = match algorithm {
            HashAlgorithm::Sha1 => HasherState::Sha1(Sha1::new()),
            HashAlgorithm::Blake3 => HasherState::Blake3(Box::new(blake3::Hasher::new())),
        };
        Self {
            algorithm,
            state,
            bytes_hashed: 0,
        }
    }

    /// Feed more bytes.
    pub fn update(&mut self, data: &[u8]) {
        match &mut self.state {
            HasherState::Sha1(h) => Digest::update(h, data),
            HasherState::Blake3(h) => {
                h.update(data);
            }
        }
        self.bytes_hashed += data.len() as u64;
    }

    /// Number of bytes fed so far.
    pub fn bytes_hashed(&self) -> u64 {
        self.bytes_hashed
    }

    /// The algorithm in use.
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Digest of everything fed so far, leaving the hasher usable.
    pub fn snapshot(&self) -> Checksum {
        self.clone().finalize()
    }

    /// Finish the hash.
    pub fn finalize(self) -> Checksum {
        let bytes = match self.state {
            HasherState::Sha1(h) => h.finalize().to_vec(),
            HasherState::Blake3(h) => h.finalize().as_bytes().to_vec(),
        };
        Checksum {
            algorithm: self.algorithm,
            bytes,
        }
    }
}

impl fmt::Debug for ContentHasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentHasher")
            .field("algorithm", &self.algorithm)
            .field("bytes_hashed", &self.bytes_hashed)
            .finish()
    }
}
