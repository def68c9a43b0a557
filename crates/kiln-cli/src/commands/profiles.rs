//! Profiles command - list built-in and kiln.toml profiles

use super::project_dir;
use anyhow::{Context, Result};
use kiln_build::{Profile, ProfileManager};
use kiln_config::ConfigLoader;
use std::path::PathBuf;

/// Print one line per profile
pub fn run(dir: Option<PathBuf>) -> Result<()> {
    let project_dir = project_dir(dir.as_deref())?;
    let config = ConfigLoader::new()
        .load_from_directory(&project_dir)
        .with_context(|| format!("Failed to load project from {}", project_dir.display()))?;

    let mut profiles = ProfileManager::new();
    profiles
        .load_from_manifest(&config.manifest.profiles)
        .context("Invalid profile in kiln.toml")?;

    for name in profiles.list_profiles() {
        let profile = profiles.get(&Profile::from_str(&name))?;
        println!(
            "{:<12} O{} {:<10} {} libraries",
            profile.name,
            profile.optimization_level.level(),
            if profile.debug_info { "debug-info" } else { "" },
            profile.variant.as_str()
        );
    }
    Ok(())
}
