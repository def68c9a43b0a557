//! Resolved project description
//!
//! Turns the parsed `kiln.toml` plus the selected profile into the absolute
//! paths and flag lists the build core hands to the toolchain. The core never
//! looks inside a flag; it only forwards and digests them.

use crate::error::{BuildError, BuildResult};
use crate::fingerprint::hash_strings;
use crate::profile::{OptLevel, ProfileConfig};
use kiln_config::{LoadedConfig, ToolchainFlavor};
use std::path::{Path, PathBuf};

/// Directory holding prebuilt external libraries, relative to the project root
pub const EXTERNAL_LIBS_DIR: &str = "libs/external";

/// Subdirectory of the build directory holding object files
pub const OBJECT_DIR: &str = "obj";

/// Compiler and linker selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolchainSettings {
    pub flavor: ToolchainFlavor,
    pub compiler: String,
    pub linker: String,
}

/// One asset tree mirrored into the build directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetMapping {
    /// Absolute source directory
    pub source: PathBuf,
    /// Destination relative to the build directory
    pub destination: PathBuf,
    /// Whether a missing source is an error
    pub required: bool,
}

/// Everything the build core needs to know about a project
#[derive(Debug, Clone)]
pub struct ProjectDescription {
    /// Project name
    pub name: String,
    /// Directory containing kiln.toml
    pub root: PathBuf,
    /// Compilation entry point
    pub entry: PathBuf,
    /// Published build directory
    pub build_dir: PathBuf,
    /// Deploy directory
    pub deploy_dir: PathBuf,
    /// File name of the linked binary
    pub binary_name: String,
    /// Extensions of units that are never compiled on their own
    pub header_extensions: Vec<String>,
    /// Compiler/linker selection
    pub toolchain: ToolchainSettings,
    /// Maximum concurrent compiles (None: available parallelism)
    pub jobs: Option<usize>,
    /// Selected profile
    pub profile: ProfileConfig,
    /// Include search paths (project paths, then external library includes)
    pub include_paths: Vec<PathBuf>,
    /// Preprocessor defines (profile first, then project)
    pub defines: Vec<String>,
    /// Compiler flags (profile switches, project flags, profile extras)
    pub compile_flags: Vec<String>,
    /// Linker flags (project flags, profile extras)
    pub link_flags: Vec<String>,
    /// Libraries to link (project system libraries, then external libraries)
    pub libraries: Vec<String>,
    /// Library search paths
    pub library_paths: Vec<PathBuf>,
    /// Files copied next to the binary (shared libraries of external libraries)
    pub runtime_files: Vec<PathBuf>,
    /// Asset trees to mirror
    pub assets: Vec<AssetMapping>,
    /// Build-directory entries copied by deploy
    pub deploy_files: Vec<PathBuf>,
}

impl ProjectDescription {
    /// Resolve a loaded configuration against a profile
    pub fn resolve(config: &LoadedConfig, profile: ProfileConfig) -> BuildResult<Self> {
        let manifest = &config.manifest;
        let root = config.project_root.clone();
        let flavor = manifest.toolchain.flavor;
        let variant = profile.variant.as_str();

        let mut include_paths: Vec<PathBuf> = manifest
            .flags
            .include_paths
            .iter()
            .map(|p| root.join(p))
            .collect();
        let mut library_paths: Vec<PathBuf> = manifest
            .flags
            .library_paths
            .iter()
            .map(|p| root.join(p))
            .collect();
        let mut libraries = manifest.flags.libraries.clone();
        let mut runtime_files = Vec::new();

        for library in &manifest.libraries {
            let library_root = root.join(EXTERNAL_LIBS_DIR).join(&library.path);
            if !library_root.is_dir() {
                return Err(BuildError::invalid_project(format!(
                    "external library '{}' not found at {}",
                    library.name,
                    library_root.display()
                )));
            }

            include_paths.extend(library.include.iter().map(|inc| library_root.join(inc)));

            let lib_dir = match library.lib_dir_for(variant) {
                Some(dir) => {
                    let dir = library_root.join(dir);
                    library_paths.push(dir.clone());
                    dir
                }
                None => library_root.clone(),
            };

            libraries.extend(library.link.for_variant(variant).iter().cloned());
            runtime_files.extend(
                library
                    .runtime_files
                    .for_variant(variant)
                    .iter()
                    .map(|file| lib_dir.join(file)),
            );
        }

        let mut defines = profile.defines.clone();
        defines.extend(manifest.flags.defines.iter().cloned());

        let mut compile_flags = profile_switches(flavor, &profile);
        compile_flags.extend(manifest.flags.compile.iter().cloned());
        compile_flags.extend(profile.compile_flags.iter().cloned());

        let mut link_flags = manifest.flags.link.clone();
        link_flags.extend(profile.link_flags.iter().cloned());

        let assets = manifest
            .asset_dirs()
            .into_iter()
            .map(|asset| AssetMapping {
                source: root.join(&asset.from),
                destination: asset.to,
                required: asset.required,
            })
            .collect();

        Ok(Self {
            name: manifest.project.name.clone(),
            entry: config.entry_point(),
            build_dir: config.build_dir(),
            deploy_dir: config.deploy_dir(),
            binary_name: manifest.binary_name(),
            header_extensions: manifest.project.header_extensions.clone(),
            toolchain: ToolchainSettings {
                flavor,
                compiler: manifest.toolchain.compiler().to_string(),
                linker: manifest.toolchain.linker().to_string(),
            },
            jobs: manifest.toolchain.jobs,
            profile,
            include_paths,
            defines,
            compile_flags,
            link_flags,
            libraries,
            library_paths,
            runtime_files,
            assets,
            deploy_files: manifest
                .deploy
                .as_ref()
                .map(|d| d.files.clone())
                .unwrap_or_default(),
            root,
        })
    }

    /// Directories the dependency scanner searches: the entry point's
    /// directory first, then the include paths
    pub fn scanner_search_paths(&self) -> Vec<PathBuf> {
        self.entry
            .parent()
            .map(Path::to_path_buf)
            .into_iter()
            .chain(self.include_paths.iter().cloned())
            .collect()
    }

    /// Object file extension for the toolchain flavor
    pub fn object_extension(&self) -> &'static str {
        match self.toolchain.flavor {
            ToolchainFlavor::Gnu => "o",
            ToolchainFlavor::Msvc => "obj",
        }
    }

    /// Object path for a source, relative to the build directory
    ///
    /// Sources inside the project keep their relative layout under `obj/`;
    /// anything else is keyed by the hash of its absolute path.
    pub fn object_path(&self, source: &Path) -> PathBuf {
        let canonical_root = self.root.canonicalize().unwrap_or_else(|_| self.root.clone());
        let relative = match source.strip_prefix(&canonical_root) {
            Ok(relative) => relative.to_path_buf(),
            Err(_) => {
                let file_name = source
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let digest = hash_strings([source.to_string_lossy()]);
                PathBuf::from("external").join(format!("{}-{}", &digest[..12], file_name))
            }
        };

        let mut file_name = relative.as_os_str().to_os_string();
        file_name.push(".");
        file_name.push(self.object_extension());
        Path::new(OBJECT_DIR).join(file_name)
    }

    /// Digest of everything that changes the produced objects or binary
    pub fn flags_digest(&self) -> String {
        let mut parts = vec![
            format!("flavor={:?}", self.toolchain.flavor),
            format!("compiler={}", self.toolchain.compiler),
            format!("linker={}", self.toolchain.linker),
            format!("profile={}", self.profile.cache_key_suffix()),
        ];
        parts.extend(self.compile_flags.iter().map(|f| format!("cflag={}", f)));
        parts.extend(self.defines.iter().map(|d| format!("define={}", d)));
        parts.extend(
            self.include_paths
                .iter()
                .map(|p| format!("include={}", p.display())),
        );
        parts.extend(self.link_flags.iter().map(|f| format!("lflag={}", f)));
        parts.extend(self.libraries.iter().map(|l| format!("lib={}", l)));
        parts.extend(
            self.library_paths
                .iter()
                .map(|p| format!("libpath={}", p.display())),
        );
        hash_strings(parts)
    }
}

/// Optimization and debug-info switches for a profile
fn profile_switches(flavor: ToolchainFlavor, profile: &ProfileConfig) -> Vec<String> {
    let mut flags = Vec::new();
    match flavor {
        ToolchainFlavor::Gnu => {
            flags.push(format!("-O{}", profile.optimization_level.level()));
            if profile.debug_info {
                flags.push("-g".to_string());
            }
        }
        ToolchainFlavor::Msvc => {
            flags.push(
                match profile.optimization_level {
                    OptLevel::O0 => "/Od",
                    OptLevel::O1 => "/O1",
                    OptLevel::O2 | OptLevel::O3 => "/O2",
                }
                .to_string(),
            );
            if profile.debug_info {
                flags.push("/Z7".to_string());
            }
        }
    }
    flags
}
