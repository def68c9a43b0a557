//! Project description (kiln.toml)
//!
//! The manifest is parsed once and treated as opaque by the build core: it
//! names the entry point, the flags handed to the toolchain, the external
//! libraries to link against and the asset trees mirrored into the output.

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

/// Build-directory entries owned by the build itself; asset trees may not
/// be mirrored onto them
pub const RESERVED_BUILD_ENTRIES: &[&str] = &["obj", ".kiln-cache.json"];

/// Root of the project description
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    /// Project metadata and layout
    pub project: ProjectSection,

    /// Compiler/linker selection
    #[serde(default)]
    pub toolchain: ToolchainSection,

    /// Flags passed through to the toolchain for every profile
    #[serde(default)]
    pub flags: FlagsSection,

    /// Static asset trees mirrored into the build directory.
    /// When omitted, `data/` is mirrored to `data/` if it exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assets: Option<Vec<AssetDir>>,

    /// External libraries under `libs/external`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub libraries: Vec<ExternalLibrary>,

    /// Profile overrides and custom profiles
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub profiles: BTreeMap<String, ManifestProfileConfig>,

    /// Files packaged by `kiln deploy`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deploy: Option<DeploySection>,
}

/// `[project]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct ProjectSection {
    /// Project name, also the stem of the linked binary
    pub name: String,

    /// Compilation entry point (default: "src/main.cpp")
    #[serde(default = "default_entry")]
    pub entry: PathBuf,

    /// Published build directory (default: "build")
    #[serde(default = "default_build_dir")]
    pub build_dir: PathBuf,

    /// Deploy directory (default: "deploy")
    #[serde(default = "default_deploy_dir")]
    pub deploy_dir: PathBuf,

    /// Extensions of files that are never compiled on their own
    #[serde(default = "default_header_extensions")]
    pub header_extensions: Vec<String>,
}

fn default_entry() -> PathBuf {
    PathBuf::from("src/main.cpp")
}

fn default_build_dir() -> PathBuf {
    PathBuf::from("build")
}

fn default_deploy_dir() -> PathBuf {
    PathBuf::from("deploy")
}

fn default_header_extensions() -> Vec<String> {
    ["h", "hh", "hpp", "hxx", "inl", "inc"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Command-line syntax understood by the toolchain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ToolchainFlavor {
    /// gcc / clang style (`-I`, `-D`, `-c`, `-o`)
    #[default]
    Gnu,
    /// cl.exe / link.exe style (`/I`, `/D`, `/c`, `/Fo`)
    Msvc,
}

impl ToolchainFlavor {
    /// Default compiler program for this flavor
    pub fn default_compiler(&self) -> &'static str {
        match self {
            Self::Gnu => "c++",
            Self::Msvc => "cl",
        }
    }

    /// Default linker program for this flavor
    pub fn default_linker(&self) -> &'static str {
        match self {
            Self::Gnu => "c++",
            Self::Msvc => "link",
        }
    }
}

/// `[toolchain]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct ToolchainSection {
    /// Command-line flavor
    #[serde(default)]
    pub flavor: ToolchainFlavor,

    /// Compiler program (defaults per flavor)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compiler: Option<String>,

    /// Linker program (defaults per flavor)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linker: Option<String>,

    /// Maximum concurrent compile processes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jobs: Option<usize>,
}

impl ToolchainSection {
    /// Compiler program to invoke
    pub fn compiler(&self) -> &str {
        self.compiler
            .as_deref()
            .unwrap_or_else(|| self.flavor.default_compiler())
    }

    /// Linker program to invoke
    pub fn linker(&self) -> &str {
        self.linker
            .as_deref()
            .unwrap_or_else(|| self.flavor.default_linker())
    }
}

/// `[flags]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FlagsSection {
    /// Extra compiler flags
    #[serde(default)]
    pub compile: Vec<String>,

    /// Extra linker flags
    #[serde(default)]
    pub link: Vec<String>,

    /// Preprocessor defines (`NAME` or `NAME=VALUE`)
    #[serde(default)]
    pub defines: Vec<String>,

    /// Include search paths, relative to the project root
    #[serde(default)]
    pub include_paths: Vec<PathBuf>,

    /// System libraries to link (`m`, `pthread`, `user32`, ...)
    #[serde(default)]
    pub libraries: Vec<String>,

    /// Library search paths, relative to the project root
    #[serde(default)]
    pub library_paths: Vec<PathBuf>,
}

/// One mirrored asset tree
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct AssetDir {
    /// Source directory, relative to the project root
    pub from: PathBuf,
    /// Destination, relative to the build directory
    pub to: PathBuf,
    /// Whether a missing source directory is an error
    #[serde(default = "default_true")]
    pub required: bool,
}

fn default_true() -> bool {
    true
}

/// Values that differ between the debug and release variants of a library
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct VariantList {
    #[serde(default)]
    pub debug: Vec<String>,
    #[serde(default)]
    pub release: Vec<String>,
}

impl VariantList {
    /// Entries for the given variant name ("debug" or "release")
    pub fn for_variant(&self, variant: &str) -> &[String] {
        match variant {
            "debug" => &self.debug,
            _ => &self.release,
        }
    }
}

/// `[[libraries]]` entry: a prebuilt library under `libs/external/<path>`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct ExternalLibrary {
    /// Library name
    pub name: String,

    /// Directory under `libs/external`
    pub path: PathBuf,

    /// Include directories inside the library directory (default: ["include"])
    #[serde(default = "default_library_includes")]
    pub include: Vec<PathBuf>,

    /// Directory holding compiled libraries, inside the library directory.
    /// `{variant}` expands to "debug" or "release".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lib_dir: Option<String>,

    /// Compiled library names per variant
    #[serde(default)]
    pub link: VariantList,

    /// Runtime files (shared libraries) copied next to the binary, per variant
    #[serde(default)]
    pub runtime_files: VariantList,
}

fn default_library_includes() -> Vec<PathBuf> {
    vec![PathBuf::from("include")]
}

impl ExternalLibrary {
    /// Expanded compiled-library directory for a variant
    pub fn lib_dir_for(&self, variant: &str) -> Option<PathBuf> {
        self.lib_dir
            .as_ref()
            .map(|dir| PathBuf::from(dir.replace("{variant}", variant)))
    }
}

/// `[profiles.<name>]` table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct ManifestProfileConfig {
    /// Built-in profile to start from (custom profiles only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inherits: Option<String>,

    /// Optimization level (0-3)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opt_level: Option<u8>,

    /// Include debug information
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_info: Option<bool>,

    /// Library variant ("debug" or "release")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,

    /// Extra defines for this profile
    #[serde(default)]
    pub defines: Vec<String>,

    /// Extra compiler flags for this profile
    #[serde(default)]
    pub compile: Vec<String>,

    /// Extra linker flags for this profile
    #[serde(default)]
    pub link: Vec<String>,
}

/// `[deploy]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct DeploySection {
    /// Build-directory entries copied into the deploy bundle
    #[serde(default)]
    pub files: Vec<PathBuf>,
}

impl Manifest {
    /// Load manifest from a file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::IoError(e)
            }
        })?;

        Self::parse(&content, path)
    }

    /// Parse manifest text; `origin` is used for error attribution only
    pub fn parse(content: &str, origin: &Path) -> ConfigResult<Self> {
        let manifest: Self = toml::from_str(content).map_err(|e| ConfigError::TomlParseError {
            file: origin.to_path_buf(),
            error: e,
        })?;

        manifest.validate()?;
        Ok(manifest)
    }

    /// Validate the manifest
    pub fn validate(&self) -> ConfigResult<()> {
        if self.project.name.trim().is_empty() {
            return Err(ConfigError::invalid("project.name", "name cannot be empty"));
        }
        if self
            .project
            .name
            .contains(|c: char| c == '/' || c == '\\' || c.is_whitespace())
        {
            return Err(ConfigError::invalid(
                "project.name",
                "name must not contain path separators or whitespace",
            ));
        }

        if self.project.entry.as_os_str().is_empty() {
            return Err(ConfigError::invalid("project.entry", "entry cannot be empty"));
        }

        if self.toolchain.jobs == Some(0) {
            return Err(ConfigError::invalid("toolchain.jobs", "must be at least 1"));
        }

        let binary_name = self.binary_name();
        for (index, asset) in self.assets.iter().flatten().enumerate() {
            if !is_contained_relative(&asset.to) {
                return Err(ConfigError::invalid(
                    format!("assets[{}].to", index),
                    "must be a relative path inside the build directory",
                ));
            }
            let top = asset.to.components().next().map(|c| c.as_os_str());
            if let Some(top) = top.and_then(|t| t.to_str()) {
                if RESERVED_BUILD_ENTRIES.contains(&top) || top == binary_name {
                    return Err(ConfigError::invalid(
                        format!("assets[{}].to", index),
                        format!("'{}' is reserved for build output", top),
                    ));
                }
            }
        }

        for library in &self.libraries {
            if library.name.is_empty() {
                return Err(ConfigError::invalid("libraries.name", "name cannot be empty"));
            }
        }

        for (name, profile) in &self.profiles {
            if let Some(level) = profile.opt_level {
                if level > 3 {
                    return Err(ConfigError::invalid(
                        format!("profiles.{}.opt-level", name),
                        format!("{} is outside 0-3", level),
                    ));
                }
            }
            if let Some(variant) = &profile.variant {
                if variant != "debug" && variant != "release" {
                    return Err(ConfigError::invalid(
                        format!("profiles.{}.variant", name),
                        format!("unknown variant '{}'", variant),
                    ));
                }
            }
        }

        if let Some(deploy) = &self.deploy {
            for file in &deploy.files {
                if !is_contained_relative(file) {
                    return Err(ConfigError::invalid(
                        "deploy.files",
                        format!("'{}' must be relative to the build directory", file.display()),
                    ));
                }
            }
        }

        Ok(())
    }

    /// Asset trees to mirror, applying the `data/` default
    pub fn asset_dirs(&self) -> Vec<AssetDir> {
        match &self.assets {
            Some(assets) => assets.clone(),
            None => vec![AssetDir {
                from: PathBuf::from("data"),
                to: PathBuf::from("data"),
                required: false,
            }],
        }
    }

    /// Name of the linked binary for the given flavor
    pub fn binary_name(&self) -> String {
        match self.toolchain.flavor {
            ToolchainFlavor::Msvc => format!("{}.exe", self.project.name),
            ToolchainFlavor::Gnu => self.project.name.clone(),
        }
    }
}

/// Relative, non-empty, and made only of plain names (no `.` or `..`)
fn is_contained_relative(path: &Path) -> bool {
    !path.as_os_str().is_empty() && path.components().all(|c| matches!(c, Component::Normal(_)))
}
