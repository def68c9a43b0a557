//! Compiler and linker invocation
//!
//! The toolchain is a black box: it receives a source or a set of objects
//! plus the project's flags, and reports an exit code and captured output.
//! Diagnostics are never parsed.

use crate::error::{BuildError, BuildResult};
use crate::project::ProjectDescription;
use kiln_config::ToolchainFlavor;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::trace;

/// Captured result of one toolchain process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    /// Exit code (None when terminated by a signal)
    pub exit_code: Option<i32>,
    /// Combined stdout and stderr
    pub output: String,
}

impl ToolOutput {
    /// Successful, empty output
    pub fn success() -> Self {
        Self {
            exit_code: Some(0),
            output: String::new(),
        }
    }

    /// Failed with the given code and output
    pub fn failure(exit_code: i32, output: impl Into<String>) -> Self {
        Self {
            exit_code: Some(exit_code),
            output: output.into(),
        }
    }

    /// Check if the process succeeded
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Compiles translation units and links objects
///
/// Implementations must be callable from several worker threads at once.
pub trait Toolchain: Send + Sync {
    /// Compile `source` into `object`
    fn compile(
        &self,
        source: &Path,
        object: &Path,
        project: &ProjectDescription,
    ) -> BuildResult<ToolOutput>;

    /// Link `objects` into `binary`
    fn link(
        &self,
        objects: &[PathBuf],
        binary: &Path,
        project: &ProjectDescription,
    ) -> BuildResult<ToolOutput>;
}

/// Runs the configured compiler and linker as subprocesses
#[derive(Debug, Clone)]
pub struct ProcessToolchain {
    flavor: ToolchainFlavor,
    compiler: String,
    linker: String,
}

impl ProcessToolchain {
    /// Toolchain configured by the project
    pub fn from_project(project: &ProjectDescription) -> Self {
        Self {
            flavor: project.toolchain.flavor,
            compiler: project.toolchain.compiler.clone(),
            linker: project.toolchain.linker.clone(),
        }
    }

    /// Toolchain with explicit programs
    pub fn new(
        flavor: ToolchainFlavor,
        compiler: impl Into<String>,
        linker: impl Into<String>,
    ) -> Self {
        Self {
            flavor,
            compiler: compiler.into(),
            linker: linker.into(),
        }
    }

    /// Compiler arguments for one translation unit
    pub fn compile_args(
        &self,
        source: &Path,
        object: &Path,
        project: &ProjectDescription,
    ) -> Vec<String> {
        let mut args = Vec::new();
        match self.flavor {
            ToolchainFlavor::Gnu => {
                args.extend(project.compile_flags.iter().cloned());
                args.extend(project.defines.iter().map(|d| format!("-D{}", d)));
                args.extend(
                    project
                        .include_paths
                        .iter()
                        .map(|p| format!("-I{}", p.display())),
                );
                args.push("-c".to_string());
                args.push(source.display().to_string());
                args.push("-o".to_string());
                args.push(object.display().to_string());
            }
            ToolchainFlavor::Msvc => {
                args.push("/nologo".to_string());
                args.extend(project.compile_flags.iter().cloned());
                args.extend(project.defines.iter().map(|d| format!("/D{}", d)));
                args.extend(
                    project
                        .include_paths
                        .iter()
                        .map(|p| format!("/I{}", p.display())),
                );
                args.push("/c".to_string());
                args.push(source.display().to_string());
                args.push(format!("/Fo{}", object.display()));
            }
        }
        args
    }

    /// Linker arguments for the final binary
    pub fn link_args(
        &self,
        objects: &[PathBuf],
        binary: &Path,
        project: &ProjectDescription,
    ) -> Vec<String> {
        let mut args = Vec::new();
        match self.flavor {
            ToolchainFlavor::Gnu => {
                args.extend(objects.iter().map(|o| o.display().to_string()));
                args.push("-o".to_string());
                args.push(binary.display().to_string());
                args.extend(project.link_flags.iter().cloned());
                args.extend(
                    project
                        .library_paths
                        .iter()
                        .map(|p| format!("-L{}", p.display())),
                );
                args.extend(project.libraries.iter().map(|l| format!("-l{}", l)));
            }
            ToolchainFlavor::Msvc => {
                args.push("/nologo".to_string());
                args.extend(objects.iter().map(|o| o.display().to_string()));
                args.push(format!("/OUT:{}", binary.display()));
                args.extend(project.link_flags.iter().cloned());
                args.extend(
                    project
                        .library_paths
                        .iter()
                        .map(|p| format!("/LIBPATH:{}", p.display())),
                );
                args.extend(project.libraries.iter().map(|l| {
                    if l.to_ascii_lowercase().ends_with(".lib") {
                        l.clone()
                    } else {
                        format!("{}.lib", l)
                    }
                }));
            }
        }
        args
    }

    fn run(&self, program: &str, args: &[String], cwd: &Path) -> BuildResult<ToolOutput> {
        trace!(program, args = ?args, "spawning toolchain process");

        let output = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .and_then(|child| child.wait_with_output())
            .map_err(|e| BuildError::Toolchain {
                program: program.to_string(),
                error: e,
            })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.is_empty() {
            if !combined.is_empty() && !combined.ends_with('\n') {
                combined.push('\n');
            }
            combined.push_str(&stderr);
        }

        Ok(ToolOutput {
            exit_code: output.status.code(),
            output: combined,
        })
    }
}

impl Toolchain for ProcessToolchain {
    fn compile(
        &self,
        source: &Path,
        object: &Path,
        project: &ProjectDescription,
    ) -> BuildResult<ToolOutput> {
        let args = self.compile_args(source, object, project);
        self.run(&self.compiler, &args, &project.root)
    }

    fn link(
        &self,
        objects: &[PathBuf],
        binary: &Path,
        project: &ProjectDescription,
    ) -> BuildResult<ToolOutput> {
        let args = self.link_args(objects, binary, project);
        self.run(&self.linker, &args, &project.root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::Profile;
    use crate::project::ToolchainSettings;
    use pretty_assertions::assert_eq;

    fn project(flavor: ToolchainFlavor) -> ProjectDescription {
        ProjectDescription {
            name: "game".to_string(),
            root: PathBuf::from("/p"),
            entry: PathBuf::from("/p/src/main.cpp"),
            build_dir: PathBuf::from("/p/build"),
            deploy_dir: PathBuf::from("/p/deploy"),
            binary_name: "game".to_string(),
            header_extensions: Vec::new(),
            toolchain: ToolchainSettings {
                flavor,
                compiler: flavor.default_compiler().to_string(),
                linker: flavor.default_linker().to_string(),
            },
            jobs: None,
            profile: Profile::Debug.default_config(),
            include_paths: vec![PathBuf::from("/p/libs/internal")],
            defines: vec!["KILN_SLOW=1".to_string()],
            compile_flags: vec!["-O0".to_string()],
            link_flags: vec!["-pthread".to_string()],
            libraries: vec!["m".to_string()],
            library_paths: vec![PathBuf::from("/p/libs/lib")],
            runtime_files: Vec::new(),
            assets: Vec::new(),
            deploy_files: Vec::new(),
        }
    }

    #[test]
    fn test_gnu_command_lines() {
        let project = project(ToolchainFlavor::Gnu);
        let toolchain = ProcessToolchain::from_project(&project);

        assert_eq!(
            toolchain.compile_args(
                Path::new("/p/src/main.cpp"),
                Path::new("/s/obj/main.o"),
                &project
            ),
            vec![
                "-O0",
                "-DKILN_SLOW=1",
                "-I/p/libs/internal",
                "-c",
                "/p/src/main.cpp",
                "-o",
                "/s/obj/main.o"
            ]
        );
        assert_eq!(
            toolchain.link_args(
                &[PathBuf::from("/s/obj/main.o")],
                Path::new("/s/game"),
                &project
            ),
            vec!["/s/obj/main.o", "-o", "/s/game", "-pthread", "-L/p/libs/lib", "-lm"]
        );
    }

    #[test]
    fn test_msvc_command_lines() {
        let project = project(ToolchainFlavor::Msvc);
        let toolchain = ProcessToolchain::from_project(&project);

        let compile = toolchain.compile_args(
            Path::new("/p/src/main.cpp"),
            Path::new("/s/obj/main.obj"),
            &project,
        );
        assert_eq!(compile[0], "/nologo");
        assert!(compile.contains(&"/DKILN_SLOW=1".to_string()));
        assert!(compile.contains(&"/Fo/s/obj/main.obj".to_string()));

        let link = toolchain.link_args(
            &[PathBuf::from("/s/obj/main.obj")],
            Path::new("/s/game.exe"),
            &project,
        );
        assert!(link.contains(&"/OUT:/s/game.exe".to_string()));
        assert!(link.contains(&"/LIBPATH:/p/libs/lib".to_string()));
        assert!(link.contains(&"m.lib".to_string()));
    }

    #[test]
    fn test_missing_program_is_toolchain_error() {
        let mut project = project(ToolchainFlavor::Gnu);
        project.root = std::env::temp_dir();
        let toolchain = ProcessToolchain::new(
            ToolchainFlavor::Gnu,
            "kiln-no-such-compiler",
            "kiln-no-such-linker",
        );
        let result = toolchain.compile(Path::new("a.cpp"), Path::new("a.o"), &project);
        assert!(matches!(result, Err(BuildError::Toolchain { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_process_output_captured() {
        let mut project = project(ToolchainFlavor::Gnu);
        project.root = std::env::temp_dir();
        project.compile_flags = vec![
            "-c".to_string(),
            "echo out; echo err >&2; exit 3".to_string(),
        ];
        project.defines.clear();
        project.include_paths.clear();

        // `sh -c <script> -c <src> -o <obj>`: the trailing arguments become $0.. and are ignored
        let toolchain = ProcessToolchain::new(ToolchainFlavor::Gnu, "sh", "sh");
        let output = toolchain
            .compile(Path::new("a.cpp"), Path::new("a.o"), &project)
            .unwrap();

        assert_eq!(output.exit_code, Some(3));
        assert!(!output.succeeded());
        assert_eq!(output.output, "out\nerr\n");
    }
}
