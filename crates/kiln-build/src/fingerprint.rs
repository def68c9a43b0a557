//! Content fingerprints for change detection
//!
//! A fingerprint is authoritative on its SHA-256 content hash. Size and
//! modification time are only kept so an unchanged file can skip hashing
//! when both match the previously recorded values.

use crate::error::{BuildError, BuildResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::SystemTime;

/// Stable identity of a file's content
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fingerprint {
    /// Hex-encoded SHA-256 of the file bytes
    pub hash: String,
    /// File size in bytes
    pub size: u64,
    /// Last modified timestamp, when the platform reports one
    pub modified: Option<SystemTime>,
}

impl PartialEq for Fingerprint {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl Eq for Fingerprint {}

impl Fingerprint {
    /// Whether `metadata` matches the recorded size and mtime exactly
    fn metadata_matches(&self, size: u64, modified: Option<SystemTime>) -> bool {
        self.size == size && modified.is_some() && self.modified == modified
    }
}

/// Computes fingerprints, reusing recorded hashes when metadata is unchanged
#[derive(Debug, Default)]
pub struct Fingerprinter {
    /// Number of files actually hashed (metadata short-circuit misses)
    hashed: AtomicUsize,
}

impl Fingerprinter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fingerprint `path`, consulting `previous` for the mtime short-circuit
    pub fn fingerprint(
        &self,
        path: &Path,
        previous: Option<&Fingerprint>,
    ) -> BuildResult<Fingerprint> {
        let metadata = fs::metadata(path).map_err(|e| BuildError::discovery(path, e))?;
        let size = metadata.len();
        let modified = metadata.modified().ok();

        if let Some(previous) = previous {
            if previous.metadata_matches(size, modified) {
                return Ok(Fingerprint {
                    hash: previous.hash.clone(),
                    size,
                    modified,
                });
            }
        }

        let hash = hash_file(path).map_err(|e| BuildError::discovery(path, e))?;
        self.hashed.fetch_add(1, Ordering::Relaxed);

        Ok(Fingerprint {
            hash,
            size,
            modified,
        })
    }

    /// Number of files hashed by this fingerprinter so far
    pub fn hashed_count(&self) -> usize {
        self.hashed.load(Ordering::Relaxed)
    }
}

/// Compute SHA-256 of a file's content
pub fn hash_file(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Hash an ordered list of strings (used for flag and asset digests)
pub fn hash_strings<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_ref().as_bytes());
        hasher.update(b"\0");
    }
    format!("{:x}", hasher.finalize())
}
