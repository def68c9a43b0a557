//! Run command - build, then execute the published binary

use super::build::{create_builder, print_report, BuildArgs};
use anyhow::{bail, Context, Result};
use kiln_build::OutputMode;
use std::process::Command;
use tracing::debug;

/// Run command arguments
#[derive(Debug, Default)]
pub struct RunArgs {
    /// Build settings
    pub build: BuildArgs,
    /// Run the last published binary without building
    pub no_build: bool,
    /// Arguments passed through to the binary
    pub args: Vec<String>,
}

/// Run the published binary from the build directory
pub fn run(args: RunArgs) -> Result<()> {
    let builder = create_builder(&args.build)?;

    if !args.no_build {
        let report = builder.build().context("Build failed")?;
        print_report(&report, OutputMode::Normal);
    }

    let binary = builder.binary_path();
    if !binary.is_file() {
        bail!(
            "No binary at {}; run `kiln build` first",
            binary.display()
        );
    }

    debug!(binary = %binary.display(), args = ?args.args, "starting binary");
    let status = Command::new(&binary)
        .args(&args.args)
        .current_dir(&builder.project().build_dir)
        .status()
        .with_context(|| format!("Failed to start {}", binary.display()))?;

    if !status.success() {
        // Mirror the program's exit code
        std::process::exit(status.code().unwrap_or(1));
    }
    Ok(())
}
