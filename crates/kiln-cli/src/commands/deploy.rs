//! Deploy command - copy the published build into the deploy bundle and zip it

use super::build::{create_builder, print_report, BuildArgs};
use anyhow::{Context, Result};
use colored::Colorize;
use kiln_build::OutputMode;

/// Build (unless `no_build`), then deploy
pub fn run(args: BuildArgs, no_build: bool) -> Result<()> {
    let builder = create_builder(&args)?;

    if !no_build {
        let report = builder.build().context("Build failed")?;
        print_report(&report, OutputMode::Normal);
    }

    let report = kiln_build::deploy(builder.project()).context("Deploy failed")?;
    println!(
        "{} {} files to {}",
        "Deployed".green().bold(),
        report.files,
        report.bundle.display()
    );
    println!("{} {}", "Archived".green().bold(), report.archive.display());
    Ok(())
}
