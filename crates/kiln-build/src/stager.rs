//! Staging directory and atomic publish
//!
//! Every build writes into `<build_dir>.staging`. Only a fully successful
//! build swaps it into place, so the published build directory is always the
//! output of exactly one complete build.

use crate::error::{BuildError, BuildResult};
use crate::fingerprint::{hash_file, hash_strings};
use crate::project::AssetMapping;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};
use walkdir::WalkDir;

/// `<dir><suffix>` as a sibling of `dir`
fn sibling(dir: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = dir
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("build"));
    name.push(suffix);
    dir.with_file_name(name)
}

/// Staging directory used for `build_dir`
pub fn staging_path(build_dir: &Path) -> PathBuf {
    sibling(build_dir, ".staging")
}

/// Where the previous build directory is parked during publish
pub fn retired_path(build_dir: &Path) -> PathBuf {
    sibling(build_dir, ".old")
}

/// Private output directory of the running build
///
/// Callers must hold the build lock: creating an area discards whatever a
/// crashed run left behind.
#[derive(Debug)]
pub struct StagingArea {
    build_dir: PathBuf,
    path: PathBuf,
    published: bool,
}

impl StagingArea {
    /// Create a fresh staging directory next to `build_dir`
    pub fn create(build_dir: &Path) -> BuildResult<Self> {
        recover_interrupted_publish(build_dir)?;

        let path = staging_path(build_dir);
        if path.exists() {
            warn!(path = %path.display(), "removing stale staging directory");
            fs::remove_dir_all(&path).map_err(|e| BuildError::io(&path, e))?;
        }
        fs::create_dir_all(&path).map_err(|e| BuildError::io(&path, e))?;
        debug!(path = %path.display(), "staging directory created");

        Ok(Self {
            build_dir: build_dir.to_path_buf(),
            path,
            published: false,
        })
    }

    /// Absolute staging path of a build-relative path
    pub fn join(&self, relative: &Path) -> PathBuf {
        self.path.join(relative)
    }

    /// Carry `relative` over from the published build directory.
    ///
    /// Returns false when the published directory has no such file.
    pub fn reuse(&self, relative: &Path) -> BuildResult<bool> {
        let source = self.build_dir.join(relative);
        if !source.is_file() {
            return Ok(false);
        }

        let target = self.join(relative);
        ensure_parent(&target)?;
        if fs::hard_link(&source, &target).is_err() {
            fs::copy(&source, &target).map_err(|e| BuildError::io(&source, e))?;
        }
        Ok(true)
    }

    /// Copy an external file to `relative` inside the staging directory
    pub fn stage_file(&self, source: &Path, relative: &Path) -> BuildResult<()> {
        let target = self.join(relative);
        ensure_parent(&target)?;
        fs::copy(source, &target).map_err(|e| BuildError::io(source, e))?;
        Ok(())
    }

    /// Mirror a directory tree to `relative` inside the staging directory;
    /// returns the number of files copied
    pub fn mirror_tree(&self, source: &Path, relative: &Path) -> BuildResult<usize> {
        let target_root = self.join(relative);
        let mut copied = 0;

        for entry in WalkDir::new(source).follow_links(true).sort_by_file_name() {
            let entry = entry.map_err(|e| walk_error(source, e))?;
            let rel = entry.path().strip_prefix(source).unwrap_or(entry.path());
            let target = target_root.join(rel);

            if entry.file_type().is_dir() {
                fs::create_dir_all(&target).map_err(|e| BuildError::io(&target, e))?;
            } else if entry.file_type().is_file() {
                ensure_parent(&target)?;
                fs::copy(entry.path(), &target).map_err(|e| BuildError::io(entry.path(), e))?;
                copied += 1;
            }
        }

        debug!(source = %source.display(), files = copied, "mirrored asset tree");
        Ok(copied)
    }

    /// Swap the staging directory into place as the build directory
    pub fn publish(mut self) -> BuildResult<()> {
        let retired = retired_path(&self.build_dir);
        if retired.exists() {
            fs::remove_dir_all(&retired).map_err(|e| BuildError::publish(&retired, e))?;
        }

        let had_previous = self.build_dir.exists();
        if had_previous {
            fs::rename(&self.build_dir, &retired)
                .map_err(|e| BuildError::publish(&self.build_dir, e))?;
        }

        if let Err(e) = fs::rename(&self.path, &self.build_dir) {
            if had_previous {
                if let Err(restore) = fs::rename(&retired, &self.build_dir) {
                    error!(
                        retired = %retired.display(),
                        error = %restore,
                        "could not restore previous build directory"
                    );
                }
            }
            return Err(BuildError::publish(&self.build_dir, e));
        }
        self.published = true;

        if had_previous {
            if let Err(e) = fs::remove_dir_all(&retired) {
                warn!(
                    path = %retired.display(),
                    error = %e,
                    "could not remove previous build directory"
                );
            }
        }

        debug!(build_dir = %self.build_dir.display(), "published");
        Ok(())
    }
}

impl Drop for StagingArea {
    fn drop(&mut self) {
        if !self.published && self.path.exists() {
            if let Err(e) = fs::remove_dir_all(&self.path) {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "could not remove staging directory"
                );
            }
        }
    }
}

/// Undo a publish interrupted between its two renames
fn recover_interrupted_publish(build_dir: &Path) -> BuildResult<()> {
    let retired = retired_path(build_dir);
    if !retired.exists() {
        return Ok(());
    }

    if build_dir.exists() {
        warn!(path = %retired.display(), "removing leftover previous build directory");
        fs::remove_dir_all(&retired).map_err(|e| BuildError::io(&retired, e))?;
    } else {
        warn!(path = %retired.display(), "restoring build directory from interrupted publish");
        fs::rename(&retired, build_dir).map_err(|e| BuildError::publish(build_dir, e))?;
    }
    Ok(())
}

fn ensure_parent(path: &Path) -> BuildResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))?;
    }
    Ok(())
}

fn walk_error(root: &Path, e: walkdir::Error) -> BuildError {
    let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
    let io = e
        .into_io_error()
        .unwrap_or_else(|| std::io::Error::other("filesystem loop"));
    BuildError::io(path, io)
}

/// Digest of the asset trees and runtime files that end up in the build
///
/// Missing optional asset sources contribute nothing; a missing required one
/// is an error.
pub fn assets_digest(assets: &[AssetMapping], runtime_files: &[PathBuf]) -> BuildResult<String> {
    let mut parts = Vec::new();

    for asset in assets {
        if !asset.source.is_dir() {
            if asset.required {
                return Err(BuildError::invalid_project(format!(
                    "asset directory {} does not exist",
                    asset.source.display()
                )));
            }
            continue;
        }

        parts.push(format!("tree={}", asset.destination.display()));
        for entry in WalkDir::new(&asset.source).follow_links(true).sort_by_file_name() {
            let entry = entry.map_err(|e| walk_error(&asset.source, e))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry.path().strip_prefix(&asset.source).unwrap_or(entry.path());
            let hash = hash_file(entry.path()).map_err(|e| BuildError::io(entry.path(), e))?;
            parts.push(format!("{}={}", rel.display(), hash));
        }
    }

    for file in runtime_files {
        let hash = hash_file(file).map_err(|e| BuildError::io(file, e))?;
        parts.push(format!("runtime={}={}", file.display(), hash));
    }

    Ok(hash_strings(parts))
}

/// Whether every mirrored asset file and runtime file is still in `build_dir`
pub fn assets_published(
    build_dir: &Path,
    assets: &[AssetMapping],
    runtime_files: &[PathBuf],
) -> BuildResult<bool> {
    for asset in assets.iter().filter(|a| a.source.is_dir()) {
        let target_root = build_dir.join(&asset.destination);
        for entry in WalkDir::new(&asset.source).follow_links(true) {
            let entry = entry.map_err(|e| walk_error(&asset.source, e))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry.path().strip_prefix(&asset.source).unwrap_or(entry.path());
            if !target_root.join(rel).is_file() {
                debug!(missing = %target_root.join(rel).display(), "published asset missing");
                return Ok(false);
            }
        }
    }

    Ok(runtime_files
        .iter()
        .filter_map(|f| f.file_name())
        .all(|name| build_dir.join(name).is_file()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn build_dir(temp_dir: &TempDir) -> PathBuf {
        temp_dir.path().join("build")
    }

    #[test]
    fn test_sibling_paths() {
        let dir = Path::new("/p/build");
        assert_eq!(staging_path(dir), PathBuf::from("/p/build.staging"));
        assert_eq!(retired_path(dir), PathBuf::from("/p/build.old"));
    }

    #[test]
    fn test_publish_replaces_build_dir() {
        let temp_dir = TempDir::new().unwrap();
        let build = build_dir(&temp_dir);
        fs::create_dir_all(&build).unwrap();
        fs::write(build.join("stale.txt"), "old").unwrap();

        let staging = StagingArea::create(&build).unwrap();
        fs::write(staging.join(Path::new("game")), "new").unwrap();
        staging.publish().unwrap();

        assert_eq!(fs::read_to_string(build.join("game")).unwrap(), "new");
        assert!(!build.join("stale.txt").exists());
        assert!(!staging_path(&build).exists());
        assert!(!retired_path(&build).exists());
    }

    fn snapshot(dir: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
        WalkDir::new(dir)
            .into_iter()
            .map(|entry| entry.unwrap())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| {
                let rel = entry.path().strip_prefix(dir).unwrap().to_path_buf();
                (rel, fs::read(entry.path()).unwrap())
            })
            .collect()
    }

    #[test]
    fn test_failed_publish_restores_build_dir() {
        let temp_dir = TempDir::new().unwrap();
        let build = build_dir(&temp_dir);
        fs::create_dir_all(build.join("obj/src")).unwrap();
        fs::write(build.join("game"), "published").unwrap();
        fs::write(build.join("obj/src/main.cpp.o"), [0u8, 1, 2, 255]).unwrap();
        let before = snapshot(&build);

        let staging = StagingArea::create(&build).unwrap();
        fs::write(staging.join(Path::new("game")), "half-built").unwrap();
        // Staging vanishing makes the second rename fail after the first one succeeded
        fs::remove_dir_all(staging_path(&build)).unwrap();

        let result = staging.publish();
        assert!(matches!(result, Err(BuildError::Publish { .. })));
        assert_eq!(snapshot(&build), before);
        assert!(!retired_path(&build).exists());
        assert!(!staging_path(&build).exists());
    }

    #[test]
    fn test_drop_without_publish_cleans_up() {
        let temp_dir = TempDir::new().unwrap();
        let build = build_dir(&temp_dir);
        fs::create_dir_all(&build).unwrap();
        fs::write(build.join("game"), "published").unwrap();

        {
            let staging = StagingArea::create(&build).unwrap();
            fs::write(staging.join(Path::new("game")), "half-built").unwrap();
        }

        assert!(!staging_path(&build).exists());
        assert_eq!(fs::read_to_string(build.join("game")).unwrap(), "published");
    }

    #[test]
    fn test_stale_staging_removed() {
        let temp_dir = TempDir::new().unwrap();
        let build = build_dir(&temp_dir);
        let stale = staging_path(&build);
        fs::create_dir_all(&stale).unwrap();
        fs::write(stale.join("junk.o"), "x").unwrap();

        let staging = StagingArea::create(&build).unwrap();
        assert!(!staging.join(Path::new("junk.o")).exists());
    }

    #[test]
    fn test_interrupted_publish_recovered() {
        let temp_dir = TempDir::new().unwrap();
        let build = build_dir(&temp_dir);
        let retired = retired_path(&build);
        fs::create_dir_all(&retired).unwrap();
        fs::write(retired.join("game"), "previous").unwrap();

        let _staging = StagingArea::create(&build).unwrap();
        assert_eq!(fs::read_to_string(build.join("game")).unwrap(), "previous");
        assert!(!retired.exists());
    }

    #[test]
    fn test_reuse_links_published_file() {
        let temp_dir = TempDir::new().unwrap();
        let build = build_dir(&temp_dir);
        fs::create_dir_all(build.join("obj/src")).unwrap();
        fs::write(build.join("obj/src/main.cpp.o"), "object").unwrap();

        let staging = StagingArea::create(&build).unwrap();
        assert!(staging.reuse(Path::new("obj/src/main.cpp.o")).unwrap());
        assert!(!staging.reuse(Path::new("obj/src/missing.cpp.o")).unwrap());
        assert_eq!(
            fs::read_to_string(staging.join(Path::new("obj/src/main.cpp.o"))).unwrap(),
            "object"
        );
    }

    #[test]
    fn test_mirror_tree() {
        let temp_dir = TempDir::new().unwrap();
        let data = temp_dir.path().join("data");
        fs::create_dir_all(data.join("fonts")).unwrap();
        fs::create_dir_all(data.join("empty")).unwrap();
        fs::write(data.join("fonts/mono.ttf"), "font").unwrap();
        fs::write(data.join("config.txt"), "cfg").unwrap();

        let staging = StagingArea::create(&build_dir(&temp_dir)).unwrap();
        let copied = staging.mirror_tree(&data, Path::new("data")).unwrap();

        assert_eq!(copied, 2);
        assert!(staging.join(Path::new("data/fonts/mono.ttf")).is_file());
        assert!(staging.join(Path::new("data/empty")).is_dir());
    }

    #[test]
    fn test_assets_digest_tracks_content() {
        let temp_dir = TempDir::new().unwrap();
        let data = temp_dir.path().join("data");
        fs::create_dir_all(&data).unwrap();
        fs::write(data.join("a.txt"), "one").unwrap();

        let assets = vec![AssetMapping {
            source: data.clone(),
            destination: PathBuf::from("data"),
            required: true,
        }];
        let first = assets_digest(&assets, &[]).unwrap();
        assert_eq!(first, assets_digest(&assets, &[]).unwrap());

        fs::write(data.join("a.txt"), "two").unwrap();
        assert_ne!(first, assets_digest(&assets, &[]).unwrap());
    }

    #[test]
    fn test_assets_published_detects_deleted_file() {
        let temp_dir = TempDir::new().unwrap();
        let data = temp_dir.path().join("data");
        fs::create_dir_all(data.join("fonts")).unwrap();
        fs::write(data.join("fonts/mono.ttf"), "font").unwrap();
        let assets = vec![AssetMapping {
            source: data.clone(),
            destination: PathBuf::from("data"),
            required: true,
        }];

        let build = build_dir(&temp_dir);
        let staging = StagingArea::create(&build).unwrap();
        staging.mirror_tree(&data, Path::new("data")).unwrap();
        staging.publish().unwrap();
        assert!(assets_published(&build, &assets, &[]).unwrap());

        fs::remove_file(build.join("data/fonts/mono.ttf")).unwrap();
        assert!(!assets_published(&build, &assets, &[]).unwrap());
    }

    #[test]
    fn test_assets_digest_required_missing() {
        let temp_dir = TempDir::new().unwrap();
        let mut assets = vec![AssetMapping {
            source: temp_dir.path().join("nope"),
            destination: PathBuf::from("data"),
            required: false,
        }];
        assert!(assets_digest(&assets, &[]).is_ok());

        assets[0].required = true;
        assert!(matches!(
            assets_digest(&assets, &[]),
            Err(BuildError::InvalidProjectDescription(_))
        ));
    }
}
