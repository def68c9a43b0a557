//! Build command - incremental build with profiles and cached state

use super::project_dir;
use anyhow::{Context, Result};
use colored::Colorize;
use kiln_build::{BuildReport, Builder, OutputMode, Profile};
use std::path::PathBuf;

/// Build command arguments
#[derive(Debug, Default)]
pub struct BuildArgs {
    /// Build profile (debug, internal, release, or custom)
    pub profile: Option<String>,
    /// Build in release mode (shorthand for --profile=release)
    pub release: bool,
    /// Full rebuild (ignore cache)
    pub force: bool,
    /// Number of parallel compile jobs
    pub jobs: Option<usize>,
    /// Verbose output
    pub verbose: bool,
    /// Quiet output (errors only)
    pub quiet: bool,
    /// JSON output
    pub json: bool,
    /// Project directory (defaults to current directory)
    pub project_dir: Option<PathBuf>,
}

/// Run the build command
pub fn run(args: BuildArgs) -> Result<()> {
    let builder = create_builder(&args)?;
    let report = builder.build().context("Build failed")?;
    print_report(&report, determine_output_mode(&args));
    Ok(())
}

/// Load the project and apply the command-line switches
pub(crate) fn create_builder(args: &BuildArgs) -> Result<Builder> {
    let project_dir = project_dir(args.project_dir.as_deref())?;
    let profile = determine_profile(args);

    let mut builder = Builder::load(&project_dir, profile.as_ref().map(Profile::name))
        .with_context(|| format!("Failed to load project from {}", project_dir.display()))?
        .with_force(args.force);

    if let Some(jobs) = args.jobs {
        builder = builder.with_jobs(jobs);
    }
    Ok(builder)
}

/// Determine build profile from arguments; `None` defers to KILN_PROFILE,
/// then debug
fn determine_profile(args: &BuildArgs) -> Option<Profile> {
    if args.release {
        Some(Profile::Release)
    } else {
        args.profile.as_deref().map(Profile::from_str)
    }
}

/// Determine output mode from arguments
fn determine_output_mode(args: &BuildArgs) -> OutputMode {
    if args.json {
        OutputMode::Json
    } else if args.quiet {
        OutputMode::Quiet
    } else if args.verbose {
        OutputMode::Verbose
    } else {
        OutputMode::Normal
    }
}

pub(crate) fn print_report(report: &BuildReport, mode: OutputMode) {
    match mode {
        OutputMode::Json => println!("{}", report.to_json()),
        OutputMode::Quiet => {}
        OutputMode::Normal | OutputMode::Verbose => {
            for warning in &report.warnings {
                eprintln!("{} {}", "warning:".yellow().bold(), warning);
            }
            print!("{}", report.render(mode));
        }
    }
}
