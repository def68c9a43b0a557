//! Persisted build record
//!
//! The record of the last successful build lives inside the published build
//! directory. It is an optimization only: anything unreadable degrades to an
//! empty record and a full rebuild.

use crate::error::{BuildError, BuildResult, CacheCorruptionWarning};
use crate::fingerprint::Fingerprint;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Cache file name inside the build directory
pub const CACHE_FILE: &str = ".kiln-cache.json";

/// Current record format version
pub const RECORD_VERSION: u32 = 1;

/// What the last successful build knew about one unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitRecord {
    /// Fingerprint the artifact was built from
    pub fingerprint: Fingerprint,
    /// Object file, relative to the build directory (translation units only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<PathBuf>,
    /// Direct dependencies at the time
    #[serde(default)]
    pub dependencies: Vec<PathBuf>,
}

/// Snapshot of the last successful build
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildRecord {
    /// Format version
    #[serde(default)]
    pub version: u32,
    /// Whether the build that wrote this record succeeded
    #[serde(default)]
    pub succeeded: bool,
    /// Completion time, seconds since the Unix epoch
    #[serde(default)]
    pub completed_at: Option<u64>,
    /// Digest of the effective toolchain flags
    #[serde(default)]
    pub flags_digest: Option<String>,
    /// Digest of the mirrored asset trees
    #[serde(default)]
    pub assets_digest: Option<String>,
    /// Linked binary, relative to the build directory
    #[serde(default)]
    pub binary: Option<PathBuf>,
    /// Per-unit state keyed by canonical path
    #[serde(default)]
    pub units: BTreeMap<PathBuf, UnitRecord>,
}

impl Default for BuildRecord {
    fn default() -> Self {
        Self::empty()
    }
}

impl BuildRecord {
    /// Record describing "nothing built yet"
    pub fn empty() -> Self {
        Self {
            version: RECORD_VERSION,
            succeeded: false,
            completed_at: None,
            flags_digest: None,
            assets_digest: None,
            binary: None,
            units: BTreeMap::new(),
        }
    }

    /// Whether there is nothing to reuse
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Stamp the record as a successful build completed now
    pub fn mark_succeeded(&mut self) {
        self.succeeded = true;
        self.completed_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .ok()
            .map(|d| d.as_secs());
    }
}

/// Result of loading the cache
#[derive(Debug, Clone)]
pub struct LoadedRecord {
    /// Usable record (empty on first run or corruption)
    pub record: BuildRecord,
    /// Set when an existing cache had to be discarded
    pub warning: Option<CacheCorruptionWarning>,
}

/// Reads and writes the build record of one build directory
#[derive(Debug, Clone)]
pub struct BuildCache {
    path: PathBuf,
}

impl BuildCache {
    /// Cache for the given build directory
    pub fn new(build_dir: &Path) -> Self {
        Self {
            path: build_dir.join(CACHE_FILE),
        }
    }

    /// Path of the cache file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the record; never fails
    pub fn load(&self) -> LoadedRecord {
        let content = match fs::read(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no build cache, first build");
                return LoadedRecord {
                    record: BuildRecord::empty(),
                    warning: None,
                };
            }
            Err(e) => return self.discard(format!("unreadable: {}", e)),
        };

        let record: BuildRecord = match serde_json::from_slice(&content) {
            Ok(record) => record,
            Err(e) => return self.discard(format!("corrupt: {}", e)),
        };

        if record.version != RECORD_VERSION {
            return self.discard(format!(
                "format version {} is not supported (expected {})",
                record.version, RECORD_VERSION
            ));
        }

        LoadedRecord {
            record,
            warning: None,
        }
    }

    fn discard(&self, reason: String) -> LoadedRecord {
        let warning = CacheCorruptionWarning {
            path: self.path.clone(),
            reason,
        };
        warn!("{}", warning);
        LoadedRecord {
            record: BuildRecord::empty(),
            warning: Some(warning),
        }
    }

    /// Persist the record atomically (temp file + rename)
    pub fn commit(&self, record: &BuildRecord) -> BuildResult<()> {
        let json = serde_json::to_vec_pretty(record)
            .map_err(|e| BuildError::io(&self.path, std::io::Error::other(e)))?;

        let tmp = self.path.with_extension("json.tmp");
        let mut file = fs::File::create(&tmp).map_err(|e| BuildError::io(&tmp, e))?;
        file.write_all(&json).map_err(|e| BuildError::io(&tmp, e))?;
        file.sync_all().map_err(|e| BuildError::io(&tmp, e))?;
        drop(file);

        fs::rename(&tmp, &self.path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            BuildError::io(&self.path, e)
        })?;

        debug!(path = %self.path.display(), units = record.units.len(), "build cache committed");
        Ok(())
    }
}
