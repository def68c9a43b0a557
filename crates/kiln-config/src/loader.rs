//! Configuration Loader
//!
//! Finds the project description and applies environment overrides.

use crate::manifest::Manifest;
use crate::{ConfigError, ConfigResult, MANIFEST_FILE};
use std::env;
use std::path::{Path, PathBuf};

/// Configuration loader
///
/// Precedence, lowest first:
/// 1. Project description (kiln.toml)
/// 2. Environment variables (KILN_JOBS, KILN_BUILD_DIR, KILN_PROFILE)
/// 3. CLI flags - handled by caller
#[derive(Debug, Default)]
pub struct ConfigLoader {
    /// Skip environment overrides (used by tests and `--no-env` style callers)
    ignore_env: bool,
}

/// Environment overrides that were applied
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    /// Profile requested through KILN_PROFILE
    pub profile: Option<String>,
    /// Job count from KILN_JOBS
    pub jobs: Option<usize>,
    /// Build directory from KILN_BUILD_DIR
    pub build_dir: Option<PathBuf>,
}

/// Loaded configuration
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Parsed project description, with overrides applied
    pub manifest: Manifest,
    /// Directory containing kiln.toml
    pub project_root: PathBuf,
    /// Overrides taken from the environment
    pub overrides: EnvOverrides,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self { ignore_env: false }
    }

    /// Do not consult KILN_* environment variables
    pub fn without_env(mut self) -> Self {
        self.ignore_env = true;
        self
    }

    /// Load configuration starting from the given directory
    ///
    /// Walks up the directory tree to find kiln.toml.
    pub fn load_from_directory(&self, start_dir: &Path) -> ConfigResult<LoadedConfig> {
        let manifest_path = Self::find_manifest(start_dir)
            .ok_or_else(|| ConfigError::NotFound(start_dir.to_path_buf()))?;
        self.load_from_file(&manifest_path)
    }

    /// Load configuration from a specific kiln.toml
    pub fn load_from_file(&self, manifest_path: &Path) -> ConfigResult<LoadedConfig> {
        let mut manifest = Manifest::load_from_file(manifest_path)?;
        let project_root = manifest_path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let overrides = if self.ignore_env {
            EnvOverrides::default()
        } else {
            Self::read_env_overrides()?
        };

        if let Some(jobs) = overrides.jobs {
            manifest.toolchain.jobs = Some(jobs);
        }
        if let Some(ref build_dir) = overrides.build_dir {
            manifest.project.build_dir = build_dir.clone();
        }

        Ok(LoadedConfig {
            manifest,
            project_root,
            overrides,
        })
    }

    /// Find kiln.toml by walking up from `start_dir`
    pub fn find_manifest(start_dir: &Path) -> Option<PathBuf> {
        let mut current = Some(start_dir);
        while let Some(dir) = current {
            let candidate = dir.join(MANIFEST_FILE);
            if candidate.is_file() {
                return Some(candidate);
            }
            current = dir.parent();
        }
        None
    }

    /// Read KILN_* overrides from the process environment
    fn read_env_overrides() -> ConfigResult<EnvOverrides> {
        let profile = env::var("KILN_PROFILE").ok().filter(|v| !v.is_empty());

        let jobs = match env::var("KILN_JOBS") {
            Ok(value) => {
                let parsed = value.parse::<usize>().ok().filter(|n| *n > 0);
                Some(parsed.ok_or_else(|| ConfigError::InvalidEnvOverride {
                    var: "KILN_JOBS".to_string(),
                    value: value.clone(),
                    reason: "expected a positive integer".to_string(),
                })?)
            }
            Err(_) => None,
        };

        let build_dir = env::var("KILN_BUILD_DIR")
            .ok()
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        Ok(EnvOverrides {
            profile,
            jobs,
            build_dir,
        })
    }
}

impl LoadedConfig {
    /// Absolute (project-root relative) build directory
    pub fn build_dir(&self) -> PathBuf {
        self.project_root.join(&self.manifest.project.build_dir)
    }

    /// Absolute (project-root relative) deploy directory
    pub fn deploy_dir(&self) -> PathBuf {
        self.project_root.join(&self.manifest.project.deploy_dir)
    }

    /// Absolute (project-root relative) entry point
    pub fn entry_point(&self) -> PathBuf {
        self.project_root.join(&self.manifest.project.entry)
    }
}
