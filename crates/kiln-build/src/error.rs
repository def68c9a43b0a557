/// Build system error types
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub type BuildResult<T> = Result<T, BuildError>;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Entry point not found: {}", path.display())]
    EntryPointNotFound { path: PathBuf },

    #[error("Failed to read source {}: {error}", path.display())]
    Discovery {
        path: PathBuf,
        error: std::io::Error,
    },

    #[error("Circular dependency detected: {}", format_cycle(cycle))]
    CyclicDependency { cycle: Vec<PathBuf> },

    #[error("Unresolved dependency \"{token}\" referenced from {}", unit.display())]
    UnresolvedDependency { unit: PathBuf, token: String },

    #[error("{}", format_compile_failures(failures))]
    CompileFailed { failures: Vec<CompileFailure> },

    #[error("Link failed for {}: exit code {exit_code}\n{output}", output_path.display())]
    LinkFailed {
        output_path: PathBuf,
        exit_code: i32,
        output: String,
    },

    #[error("Failed to publish build directory {}: {error}", path.display())]
    Publish {
        path: PathBuf,
        error: std::io::Error,
    },

    #[error(
        "Another build is already running against {} (lock held on {})",
        build_dir.display(),
        lock_path.display()
    )]
    BuildInProgress {
        build_dir: PathBuf,
        lock_path: PathBuf,
    },

    #[error("Invalid project description: {0}")]
    InvalidProjectDescription(String),

    #[error("Failed to run {program}: {error}")]
    Toolchain {
        program: String,
        error: std::io::Error,
    },

    #[error("I/O error at {}: {error}", path.display())]
    IoError {
        path: PathBuf,
        error: std::io::Error,
    },

    #[error("Profile not found: {0}")]
    ProfileNotFound(String),
}

impl BuildError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
        Self::IoError {
            path: path.into(),
            error,
        }
    }

    /// Create a discovery error for a source that could not be read
    pub fn discovery(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
        Self::Discovery {
            path: path.into(),
            error,
        }
    }

    /// Create a publish error
    pub fn publish(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
        Self::Publish {
            path: path.into(),
            error,
        }
    }

    /// Create an unresolved dependency error
    pub fn unresolved(unit: impl Into<PathBuf>, token: impl Into<String>) -> Self {
        Self::UnresolvedDependency {
            unit: unit.into(),
            token: token.into(),
        }
    }

    /// Create an invalid project description error
    pub fn invalid_project(error: impl ToString) -> Self {
        Self::InvalidProjectDescription(error.to_string())
    }
}

/// A translation unit that failed to compile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileFailure {
    /// Source path of the unit
    pub unit: PathBuf,
    /// Compiler exit code (None when the process could not be started)
    pub exit_code: Option<i32>,
    /// Captured compiler output, verbatim
    pub output: String,
}

impl CompileFailure {
    pub fn new(
        unit: impl Into<PathBuf>,
        exit_code: Option<i32>,
        output: impl Into<String>,
    ) -> Self {
        Self {
            unit: unit.into(),
            exit_code,
            output: output.into(),
        }
    }
}

impl fmt::Display for CompileFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.exit_code {
            Some(code) => write!(f, "{} (exit code {})", self.unit.display(), code)?,
            None => write!(f, "{} (compiler did not run)", self.unit.display())?,
        }
        if !self.output.trim().is_empty() {
            write!(f, "\n{}", self.output.trim_end())?;
        }
        Ok(())
    }
}

/// Cache problem that forces a full rebuild but never fails the build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheCorruptionWarning {
    /// Cache file that could not be used
    pub path: PathBuf,
    /// Why it was discarded
    pub reason: String,
}

impl fmt::Display for CacheCorruptionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "build cache {} is unusable ({}); rebuilding everything",
            self.path.display(),
            self.reason
        )
    }
}

/// Render a cycle as `a -> b -> c -> a`
pub fn format_cycle(cycle: &[PathBuf]) -> String {
    cycle
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

fn format_compile_failures(failures: &[CompileFailure]) -> String {
    let mut message = format!("Compilation failed for {} unit(s):", failures.len());
    for failure in failures {
        message.push_str("\n  ");
        message.push_str(&failure.to_string().replace('\n', "\n    "));
    }
    message
}

/// Helper for displaying a path relative to a root when possible
pub(crate) fn relative_to<'a>(path: &'a Path, root: &Path) -> &'a Path {
    path.strip_prefix(root).unwrap_or(path)
}
