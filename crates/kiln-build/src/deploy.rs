//! Deploy bundle
//!
//! Copies selected entries of the published build directory into
//! `<deploy_dir>/<project name>/`, replacing the previous bundle, then packs
//! the bundle into `<deploy_dir>/<project name>.zip`.

use crate::error::{BuildError, BuildResult};
use crate::lock::BuildLock;
use crate::project::ProjectDescription;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Result of a deploy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployReport {
    /// Bundle directory
    pub bundle: PathBuf,
    /// Zip archive of the bundle
    pub archive: PathBuf,
    /// Build-relative entries copied
    pub entries: Vec<PathBuf>,
    /// Files copied
    pub files: usize,
}

/// Entries deployed when kiln.toml names none: the binary, runtime files
/// and asset trees
pub fn default_entries(project: &ProjectDescription) -> Vec<PathBuf> {
    let mut entries = vec![PathBuf::from(&project.binary_name)];
    entries.extend(
        project
            .runtime_files
            .iter()
            .filter_map(|f| f.file_name().map(PathBuf::from)),
    );
    entries.extend(
        project
            .assets
            .iter()
            .filter(|a| a.source.is_dir())
            .map(|a| a.destination.clone()),
    );
    entries
}

/// Copy the deploy entries of the published build into the bundle
pub fn deploy(project: &ProjectDescription) -> BuildResult<DeployReport> {
    let build_dir = &project.build_dir;
    let _lock = BuildLock::acquire(build_dir)?;

    if !build_dir.is_dir() {
        return Err(BuildError::io(
            build_dir,
            io::Error::new(io::ErrorKind::NotFound, "nothing has been built yet"),
        ));
    }

    let entries = if project.deploy_files.is_empty() {
        default_entries(project)
    } else {
        project.deploy_files.clone()
    };

    // Check everything exists before touching the previous bundle
    for entry in &entries {
        let source = build_dir.join(entry);
        if !source.exists() {
            return Err(BuildError::io(
                &source,
                io::Error::new(
                    io::ErrorKind::NotFound,
                    "deploy entry not found in build directory",
                ),
            ));
        }
    }

    let bundle = project.deploy_dir.join(&project.name);
    if bundle.exists() {
        fs::remove_dir_all(&bundle).map_err(|e| BuildError::io(&bundle, e))?;
    }
    fs::create_dir_all(&bundle).map_err(|e| BuildError::io(&bundle, e))?;

    let mut files = 0;
    for entry in &entries {
        files += copy_entry(&build_dir.join(entry), &bundle.join(entry))?;
    }

    let archive = project.deploy_dir.join(format!("{}.zip", project.name));
    write_archive(&bundle, &archive)?;

    info!(bundle = %bundle.display(), archive = %archive.display(), files, "deployed");
    Ok(DeployReport {
        bundle,
        archive,
        entries,
        files,
    })
}

fn copy_entry(source: &Path, target: &Path) -> BuildResult<usize> {
    if source.is_file() {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))?;
        }
        fs::copy(source, target).map_err(|e| BuildError::io(source, e))?;
        return Ok(1);
    }

    let mut copied = 0;
    for entry in WalkDir::new(source).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| source.to_path_buf());
            BuildError::io(path, e.into())
        })?;
        let rel = entry.path().strip_prefix(source).unwrap_or(entry.path());
        let dest = target.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest).map_err(|e| BuildError::io(&dest, e))?;
        } else {
            fs::copy(entry.path(), &dest).map_err(|e| BuildError::io(entry.path(), e))?;
            copied += 1;
        }
    }
    Ok(copied)
}

/// Zip `bundle` so every entry is rooted at the bundle's own name
fn write_archive(bundle: &Path, archive: &Path) -> BuildResult<()> {
    let base = bundle.parent().unwrap_or(bundle);
    let tmp = archive.with_extension("zip.tmp");
    let file = File::create(&tmp).map_err(|e| BuildError::io(&tmp, e))?;
    let mut zip = ZipWriter::new(file);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    for entry in WalkDir::new(bundle).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| bundle.to_path_buf());
            BuildError::io(path, e.into())
        })?;
        let name = entry
            .path()
            .strip_prefix(base)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .replace('\\', "/");

        if entry.file_type().is_dir() {
            zip.add_directory(name, options)
                .map_err(|e| BuildError::io(&tmp, e.into()))?;
        } else {
            zip.start_file(name, options.unix_permissions(file_mode(entry.path())))
                .map_err(|e| BuildError::io(&tmp, e.into()))?;
            let mut source =
                File::open(entry.path()).map_err(|e| BuildError::io(entry.path(), e))?;
            io::copy(&mut source, &mut zip).map_err(|e| BuildError::io(entry.path(), e))?;
        }
    }

    zip.finish().map_err(|e| BuildError::io(&tmp, e.into()))?;
    fs::rename(&tmp, archive).map_err(|e| BuildError::io(archive, e))?;
    debug!(archive = %archive.display(), "bundle archived");
    Ok(())
}

#[cfg(unix)]
fn file_mode(path: &Path) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o777)
        .unwrap_or(0o644)
}

#[cfg(not(unix))]
fn file_mode(_: &Path) -> u32 {
    0o644
}
