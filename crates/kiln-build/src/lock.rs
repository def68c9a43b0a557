//! Exclusive lock serializing builds against one build directory

use crate::error::{BuildError, BuildResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Lock file used for `build_dir`: a sibling, so it survives the publish swap
pub fn lock_path(build_dir: &Path) -> PathBuf {
    let mut name = build_dir
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "build".into());
    name.push(".lock");
    build_dir.with_file_name(name)
}

/// Held for the whole build; released on drop
#[derive(Debug)]
pub struct BuildLock {
    _file: File,
    path: PathBuf,
}

impl BuildLock {
    /// Take the lock without waiting.
    ///
    /// Fails with `BuildInProgress` when another invocation holds it.
    pub fn acquire(build_dir: &Path) -> BuildResult<Self> {
        let path = lock_path(build_dir);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| BuildError::io(&path, e))?;

        if let Err(e) = file.try_lock_exclusive() {
            if e.kind() == fs2::lock_contended_error().kind() {
                return Err(BuildError::BuildInProgress {
                    build_dir: build_dir.to_path_buf(),
                    lock_path: path,
                });
            }
            return Err(BuildError::io(&path, e));
        }

        debug!(path = %path.display(), "build lock acquired");
        Ok(Self { _file: file, path })
    }

    /// Lock file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}
