pub mod build;
pub mod clean;
pub mod deploy;
pub mod profiles;
pub mod run;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Directory to start the kiln.toml search from
pub(crate) fn project_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(dir) => Ok(dir.to_path_buf()),
        None => std::env::current_dir().context("Failed to determine current directory"),
    }
}
