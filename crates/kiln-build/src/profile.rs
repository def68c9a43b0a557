//! Build profile management
//!
//! Provides the compile modes (debug, internal, release, custom) with
//! optimization levels, debug settings, library variants and the
//! `KILN_INTERNAL` / `KILN_SLOW` switches.

use crate::error::{BuildError, BuildResult};
use kiln_config::ManifestProfileConfig;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Optimization level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OptLevel {
    /// No optimization (fast compilation)
    #[default]
    O0,
    /// Basic optimization
    O1,
    /// Full optimization (default for release)
    O2,
    /// Aggressive optimization
    O3,
}

impl OptLevel {
    /// Convert a manifest `opt-level` number
    pub fn from_level(level: u8) -> BuildResult<Self> {
        match level {
            0 => Ok(Self::O0),
            1 => Ok(Self::O1),
            2 => Ok(Self::O2),
            3 => Ok(Self::O3),
            other => Err(BuildError::invalid_project(format!(
                "optimization level {} is outside 0-3",
                other
            ))),
        }
    }

    /// Numeric level
    pub fn level(&self) -> u8 {
        match self {
            Self::O0 => 0,
            Self::O1 => 1,
            Self::O2 => 2,
            Self::O3 => 3,
        }
    }
}

/// Which build of external libraries to link against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LibraryVariant {
    #[default]
    Debug,
    Release,
}

impl LibraryVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Release => "release",
        }
    }

    fn parse(s: &str) -> BuildResult<Self> {
        match s {
            "debug" => Ok(Self::Debug),
            "release" => Ok(Self::Release),
            other => Err(BuildError::invalid_project(format!(
                "unknown library variant '{}'",
                other
            ))),
        }
    }
}

/// Build profile
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// Unoptimized, all debug checks on (default)
    Debug,
    /// Optimized, internal tooling still compiled in
    Internal,
    /// Optimized shipping build
    Release,
    /// Custom profile from kiln.toml
    Custom(String),
}

impl Profile {
    /// Parse profile from string; built-in names match case-insensitively,
    /// custom names keep their case
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "debug" => Self::Debug,
            "internal" => Self::Internal,
            "release" => Self::Release,
            _ => Self::Custom(s.to_string()),
        }
    }

    /// Get profile name
    pub fn name(&self) -> &str {
        match self {
            Self::Debug => "debug",
            Self::Internal => "internal",
            Self::Release => "release",
            Self::Custom(name) => name,
        }
    }

    /// Check if this is a built-in profile
    pub fn is_builtin(&self) -> bool {
        !matches!(self, Self::Custom(_))
    }

    /// Get default configuration for this profile
    pub fn default_config(&self) -> ProfileConfig {
        let (optimization_level, debug_info, variant, internal, slow) = match self {
            Self::Debug | Self::Custom(_) => (OptLevel::O0, true, LibraryVariant::Debug, 1, 1),
            Self::Internal => (OptLevel::O2, true, LibraryVariant::Release, 1, 0),
            Self::Release => (OptLevel::O2, false, LibraryVariant::Release, 0, 0),
        };

        ProfileConfig {
            name: self.name().to_string(),
            optimization_level,
            debug_info,
            variant,
            defines: vec![
                format!("KILN_INTERNAL={}", internal),
                format!("KILN_SLOW={}", slow),
            ],
            compile_flags: Vec::new(),
            link_flags: Vec::new(),
        }
    }
}

#[allow(clippy::derivable_impls)]
impl Default for Profile {
    fn default() -> Self {
        Self::Debug
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Profile configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileConfig {
    /// Profile name
    pub name: String,
    /// Optimization level
    #[serde(default)]
    pub optimization_level: OptLevel,
    /// Include debug information
    #[serde(default)]
    pub debug_info: bool,
    /// External library variant
    #[serde(default)]
    pub variant: LibraryVariant,
    /// Preprocessor defines added by this profile
    #[serde(default)]
    pub defines: Vec<String>,
    /// Extra compiler flags
    #[serde(default)]
    pub compile_flags: Vec<String>,
    /// Extra linker flags
    #[serde(default)]
    pub link_flags: Vec<String>,
}

impl ProfileConfig {
    /// Create from profile with defaults
    pub fn from_profile(profile: &Profile) -> Self {
        profile.default_config()
    }

    /// Merge with a `[profiles.<name>]` table
    pub fn merge_with_manifest(&mut self, manifest: &ManifestProfileConfig) -> BuildResult<()> {
        if let Some(level) = manifest.opt_level {
            self.optimization_level = OptLevel::from_level(level)?;
        }
        if let Some(debug) = manifest.debug_info {
            self.debug_info = debug;
        }
        if let Some(ref variant) = manifest.variant {
            self.variant = LibraryVariant::parse(variant)?;
        }

        // A manifest define replaces a profile define of the same name
        for define in &manifest.defines {
            let name = define_name(define);
            self.defines.retain(|existing| define_name(existing) != name);
            self.defines.push(define.clone());
        }
        self.compile_flags.extend(manifest.compile.iter().cloned());
        self.link_flags.extend(manifest.link.iter().cloned());
        Ok(())
    }

    /// Create from custom profile with inheritance
    pub fn from_custom(
        name: String,
        manifest: &ManifestProfileConfig,
        base_profile: Option<&Profile>,
    ) -> BuildResult<Self> {
        let mut config = match base_profile {
            Some(base) => base.default_config(),
            None => Profile::Debug.default_config(),
        };

        config.name = name;
        config.merge_with_manifest(manifest)?;
        Ok(config)
    }

    /// Key mixed into the flags digest so switching profile rebuilds everything
    pub fn cache_key_suffix(&self) -> String {
        format!(
            "{}-O{}-{}-{}",
            self.name,
            self.optimization_level.level(),
            if self.debug_info { "debug" } else { "nodebug" },
            self.variant.as_str()
        )
    }
}

fn define_name(define: &str) -> &str {
    define.split('=').next().unwrap_or(define)
}

/// Profile manager - handles profile loading and configuration
pub struct ProfileManager {
    /// Available profiles
    profiles: HashMap<String, ProfileConfig>,
}

impl ProfileManager {
    /// Create new profile manager
    pub fn new() -> Self {
        let mut profiles = HashMap::new();

        for profile in [Profile::Debug, Profile::Internal, Profile::Release] {
            profiles.insert(profile.name().to_string(), profile.default_config());
        }

        Self { profiles }
    }

    /// Load profiles from manifest
    pub fn load_from_manifest(
        &mut self,
        manifest_profiles: &BTreeMap<String, ManifestProfileConfig>,
    ) -> BuildResult<()> {
        for (name, manifest_config) in manifest_profiles {
            let requested = Profile::from_str(name);
            let profile = if requested.is_builtin() {
                let mut config = requested.default_config();
                config.merge_with_manifest(manifest_config)?;
                config
            } else {
                let base_profile = match manifest_config.inherits {
                    Some(ref inherits) => {
                        let base = Profile::from_str(inherits);
                        if !base.is_builtin() {
                            return Err(BuildError::invalid_project(format!(
                                "profile '{}' inherits from '{}', which is not a built-in profile",
                                name, inherits
                            )));
                        }
                        Some(base)
                    }
                    None => None,
                };

                ProfileConfig::from_custom(name.clone(), manifest_config, base_profile.as_ref())?
            };

            self.profiles.insert(profile.name.clone(), profile);
        }

        Ok(())
    }

    /// Get profile configuration
    pub fn get(&self, profile: &Profile) -> BuildResult<ProfileConfig> {
        let name = profile.name();
        self.profiles
            .get(name)
            .cloned()
            .ok_or_else(|| BuildError::ProfileNotFound(name.to_string()))
    }

    /// Check if profile exists
    pub fn has_profile(&self, name: &str) -> bool {
        self.profiles.contains_key(name)
    }

    /// List all available profiles
    pub fn list_profiles(&self) -> Vec<String> {
        let mut names: Vec<_> = self.profiles.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for ProfileManager {
    fn default() -> Self {
        Self::new()
    }
}
