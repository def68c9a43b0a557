//! Kiln Configuration System
//!
//! Parses the project description (`kiln.toml`) that tells the build core
//! which entry point to compile, which external libraries and flags to pass
//! through to the toolchain, and which asset trees to mirror.
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded and merged in the following order (later overrides earlier):
//! 1. Project description (./kiln.toml, found by walking up from the start directory)
//! 2. Environment variables (KILN_*)
//! 3. CLI flags (handled by the caller)
//!
//! # Example
//!
//! ```no_run
//! use kiln_config::ConfigLoader;
//! use std::path::Path;
//!
//! let loader = ConfigLoader::new();
//! let config = loader.load_from_directory(Path::new(".")).unwrap();
//! println!("building {}", config.manifest.project.name);
//! ```

pub mod loader;
pub mod manifest;

use std::path::PathBuf;
use thiserror::Error;

/// File name of the project description
pub const MANIFEST_FILE: &str = "kiln.toml";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("No kiln.toml found in {0} or any parent directory")]
    NotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid TOML syntax in {file}: {error}")]
    TomlParseError {
        file: PathBuf,
        error: toml::de::Error,
    },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Invalid environment override {var}={value}: {reason}")]
    InvalidEnvOverride {
        var: String,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    /// Create an invalid value error
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

// Re-export main types
pub use loader::{ConfigLoader, EnvOverrides, LoadedConfig};
pub use manifest::{
    AssetDir, DeploySection, ExternalLibrary, FlagsSection, Manifest, ManifestProfileConfig,
    ProjectSection, ToolchainFlavor, ToolchainSection, VariantList, RESERVED_BUILD_ENTRIES,
};
