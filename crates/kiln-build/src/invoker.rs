//! Parallel compilation and the serialized link step

use crate::error::{BuildError, BuildResult, CompileFailure};
use crate::project::ProjectDescription;
use crate::toolchain::Toolchain;
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, info};

/// One translation unit to compile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileJob {
    /// Canonical source path
    pub unit: PathBuf,
    /// Absolute object path inside the staging directory
    pub object: PathBuf,
}

/// What happened to a compile job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOutcome {
    /// Object produced
    Compiled,
    /// Compiler failed or could not be started
    Failed(CompileFailure),
    /// Not started because another unit had already failed
    Skipped,
}

/// Per-unit results of [`ToolInvoker::compile_all`], in job order
#[derive(Debug, Clone, Default)]
pub struct CompileSummary {
    pub outcomes: Vec<(PathBuf, UnitOutcome)>,
}

impl CompileSummary {
    /// Units compiled successfully
    pub fn compiled(&self) -> impl Iterator<Item = &Path> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| *outcome == UnitOutcome::Compiled)
            .map(|(unit, _)| unit.as_path())
    }

    /// Every failure, in job order
    pub fn failures(&self) -> Vec<CompileFailure> {
        self.outcomes
            .iter()
            .filter_map(|(_, outcome)| match outcome {
                UnitOutcome::Failed(failure) => Some(failure.clone()),
                _ => None,
            })
            .collect()
    }

    /// Units that were never started
    pub fn skipped(&self) -> impl Iterator<Item = &Path> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| *outcome == UnitOutcome::Skipped)
            .map(|(unit, _)| unit.as_path())
    }

    /// Check if every job compiled
    pub fn succeeded(&self) -> bool {
        self.outcomes
            .iter()
            .all(|(_, outcome)| *outcome == UnitOutcome::Compiled)
    }

    /// Convert into an error when any unit failed
    pub fn into_result(self) -> BuildResult<Self> {
        let failures = self.failures();
        if failures.is_empty() {
            Ok(self)
        } else {
            Err(BuildError::CompileFailed { failures })
        }
    }
}

/// Runs compiles on a bounded worker pool, then the link
pub struct ToolInvoker<'a> {
    toolchain: &'a dyn Toolchain,
    pool: rayon::ThreadPool,
    jobs: usize,
}

impl<'a> ToolInvoker<'a> {
    /// Create an invoker running at most `jobs` compiles at once
    pub fn new(toolchain: &'a dyn Toolchain, jobs: usize) -> BuildResult<Self> {
        let jobs = jobs.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .thread_name(|i| format!("kiln-compile-{}", i))
            .build()
            .map_err(|e| BuildError::Toolchain {
                program: "compile worker pool".to_string(),
                error: std::io::Error::other(e),
            })?;

        Ok(Self {
            toolchain,
            pool,
            jobs,
        })
    }

    /// Compile every job.
    ///
    /// After the first failure no new compile is started; compiles already
    /// running finish and are reported normally.
    pub fn compile_all(&self, jobs: &[CompileJob], project: &ProjectDescription) -> CompileSummary {
        if jobs.is_empty() {
            return CompileSummary::default();
        }

        info!(units = jobs.len(), workers = self.jobs, "compiling");
        let failed = AtomicBool::new(false);

        let outcomes = self.pool.install(|| {
            jobs.par_iter()
                .map(|job| {
                    if failed.load(Ordering::SeqCst) {
                        debug!(unit = %job.unit.display(), "skipped after earlier failure");
                        return (job.unit.clone(), UnitOutcome::Skipped);
                    }

                    let outcome = self.compile_one(job, project);
                    if matches!(outcome, UnitOutcome::Failed(_)) {
                        failed.store(true, Ordering::SeqCst);
                    }
                    (job.unit.clone(), outcome)
                })
                .collect()
        });

        CompileSummary { outcomes }
    }

    fn compile_one(&self, job: &CompileJob, project: &ProjectDescription) -> UnitOutcome {
        let start = Instant::now();

        if let Some(parent) = job.object.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                return UnitOutcome::Failed(CompileFailure::new(
                    &job.unit,
                    None,
                    format!("cannot create {}: {}", parent.display(), e),
                ));
            }
        }

        match self.toolchain.compile(&job.unit, &job.object, project) {
            Ok(output) if output.succeeded() => {
                debug!(
                    unit = %job.unit.display(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "compiled"
                );
                UnitOutcome::Compiled
            }
            Ok(output) => {
                debug!(unit = %job.unit.display(), exit_code = ?output.exit_code, "compile failed");
                UnitOutcome::Failed(CompileFailure::new(&job.unit, output.exit_code, output.output))
            }
            Err(e) => UnitOutcome::Failed(CompileFailure::new(&job.unit, None, e.to_string())),
        }
    }

    /// Link objects into the binary
    pub fn link(
        &self,
        objects: &[PathBuf],
        binary: &Path,
        project: &ProjectDescription,
    ) -> BuildResult<()> {
        info!(objects = objects.len(), binary = %binary.display(), "linking");

        let output = self.toolchain.link(objects, binary, project)?;
        if !output.succeeded() {
            return Err(BuildError::LinkFailed {
                output_path: binary.to_path_buf(),
                exit_code: output.exit_code.unwrap_or(-1),
                output: output.output,
            });
        }
        Ok(())
    }
}
