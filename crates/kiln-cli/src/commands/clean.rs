//! Clean command - remove published outputs

use super::project_dir;
use anyhow::{Context, Result};
use kiln_build::Builder;
use std::path::PathBuf;

/// Remove the build, staging and deploy directories
pub fn run(dir: Option<PathBuf>) -> Result<()> {
    let project_dir = project_dir(dir.as_deref())?;
    let builder = Builder::load(&project_dir, None)
        .with_context(|| format!("Failed to load project from {}", project_dir.display()))?;

    let removed = builder.clean().context("Failed to clean build outputs")?;
    if removed.is_empty() {
        println!("Nothing to clean");
    }
    for path in removed {
        println!("Removed {}", path.display());
    }
    Ok(())
}
