use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::io;
use std::path::PathBuf;

mod commands;

/// Kiln incremental build orchestrator for native C/C++ projects.
///
/// Kiln discovers the include graph from a single entry point, recompiles
/// only what changed, and publishes the binary, objects and assets into the
/// build directory atomically.
///
/// EXAMPLES:
///     kiln build                    Build with the debug profile
///     kiln build --release          Build the release profile
///     kiln run -- --windowed        Build, then run the binary
///     kiln deploy                   Package the published build
///     kiln clean                    Remove build outputs
///
/// ENVIRONMENT VARIABLES:
///     KILN_PROFILE      Default build profile
///     KILN_JOBS         Maximum concurrent compile processes
///     KILN_BUILD_DIR    Build directory override
///     KILN_JSON         Set to 'true' for JSON output by default
///     KILN_LOG          Log filter (e.g. 'kiln_build=debug')
///     NO_COLOR          Set to disable colored output
#[derive(Parser)]
#[command(name = "kiln")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Options shared by the commands that build
#[derive(clap::Args, Debug, Default)]
struct BuildFlags {
    /// Build profile (debug, internal, release, or custom)
    #[arg(long, short = 'p')]
    profile: Option<String>,
    /// Build the release profile (shorthand for --profile=release)
    #[arg(long)]
    release: bool,
    /// Ignore the build cache and rebuild everything
    #[arg(long, short = 'f')]
    force: bool,
    /// Maximum concurrent compile processes
    #[arg(long, short = 'j')]
    jobs: Option<usize>,
    /// Project directory (defaults to the current directory)
    #[arg(long, short = 'C')]
    project_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the project
    ///
    /// Recompiles the translation units affected by changes since the last
    /// successful build, relinks when needed and publishes the result.
    ///
    /// EXAMPLES:
    ///     kiln build                    Build with the default profile
    ///     kiln build --release          Build optimized release
    ///     kiln build --profile=internal Build the internal profile
    ///     kiln build --force -j 8       Full rebuild on 8 workers
    #[command(visible_alias = "b")]
    Build {
        #[command(flatten)]
        flags: BuildFlags,
        /// Verbose output (per-unit recompile reasons, debug logs)
        #[arg(long, short = 'v')]
        verbose: bool,
        /// Quiet output (errors only)
        #[arg(long, short = 'q')]
        quiet: bool,
        /// JSON output
        #[arg(long, env = "KILN_JSON")]
        json: bool,
    },

    /// Build, then run the published binary
    ///
    /// The binary runs with the build directory as its working directory so
    /// mirrored assets resolve relative to it.
    ///
    /// EXAMPLES:
    ///     kiln run                      Build and run
    ///     kiln run --no-build           Run the last published binary
    ///     kiln run -- --level 3         Pass arguments to the binary
    #[command(visible_alias = "r")]
    Run {
        #[command(flatten)]
        flags: BuildFlags,
        /// Skip the build step
        #[arg(long)]
        no_build: bool,
        /// Arguments passed to the binary
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Remove the build and deploy directories
    Clean {
        /// Project directory (defaults to the current directory)
        #[arg(long, short = 'C')]
        project_dir: Option<PathBuf>,
    },

    /// Copy the published build into the deploy bundle
    ///
    /// EXAMPLES:
    ///     kiln deploy --release         Build release, then deploy it
    Deploy {
        #[command(flatten)]
        flags: BuildFlags,
        /// Deploy the current build without rebuilding
        #[arg(long)]
        no_build: bool,
    },

    /// List the available build profiles
    Profiles {
        /// Project directory (defaults to the current directory)
        #[arg(long, short = 'C')]
        project_dir: Option<PathBuf>,
    },

    /// Generate shell completions
    ///
    /// EXAMPLES:
    ///     kiln completions bash > ~/.bash_completions/kiln.bash
    ///     kiln completions zsh > ~/.zfunc/_kiln
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

impl BuildFlags {
    fn into_args(self) -> commands::build::BuildArgs {
        commands::build::BuildArgs {
            profile: self.profile,
            release: self.release,
            force: self.force,
            jobs: self.jobs,
            project_dir: self.project_dir,
            ..Default::default()
        }
    }
}

/// Install the stderr log subscriber; KILN_LOG takes precedence
fn setup_logging(verbose: bool, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_env("KILN_LOG").unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("kiln_build=debug,kiln_config=debug,warn")
        } else if quiet {
            EnvFilter::new("error")
        } else {
            EnvFilter::new("warn")
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            flags,
            verbose,
            quiet,
            json,
        } => {
            setup_logging(verbose, quiet || json);
            let args = commands::build::BuildArgs {
                verbose,
                quiet,
                json,
                ..flags.into_args()
            };
            commands::build::run(args)?;
        }
        Commands::Run {
            flags,
            no_build,
            args,
        } => {
            setup_logging(false, false);
            let run_args = commands::run::RunArgs {
                build: flags.into_args(),
                no_build,
                args,
            };
            commands::run::run(run_args)?;
        }
        Commands::Clean { project_dir } => {
            setup_logging(false, false);
            commands::clean::run(project_dir)?;
        }
        Commands::Deploy { flags, no_build } => {
            setup_logging(false, false);
            commands::deploy::run(flags.into_args(), no_build)?;
        }
        Commands::Profiles { project_dir } => {
            setup_logging(false, false);
            commands::profiles::run(project_dir)?;
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(shell, &mut cmd, name, &mut io::stdout());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_build_flags() {
        let cli = Cli::parse_from(["kiln", "build", "--release", "-j", "4", "--force"]);
        match cli.command {
            Commands::Build { flags, verbose, .. } => {
                assert!(flags.release);
                assert!(flags.force);
                assert_eq!(flags.jobs, Some(4));
                assert!(!verbose);
            }
            _ => panic!("Expected Build command"),
        }
    }

    #[test]
    fn test_build_alias() {
        let cli = Cli::parse_from(["kiln", "b", "--profile", "internal"]);
        match cli.command {
            Commands::Build { flags, .. } => {
                assert_eq!(flags.profile.as_deref(), Some("internal"))
            }
            _ => panic!("Expected Build command"),
        }
    }

    #[test]
    fn test_run_forwards_trailing_args() {
        let cli = Cli::parse_from(["kiln", "run", "--", "--level", "3"]);
        match cli.command {
            Commands::Run { args, no_build, .. } => {
                assert_eq!(args, vec!["--level", "3"]);
                assert!(!no_build);
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_completions_bash() {
        let cli = Cli::parse_from(["kiln", "completions", "bash"]);
        match cli.command {
            Commands::Completions { shell } => assert_eq!(shell, Shell::Bash),
            _ => panic!("Expected Completions command"),
        }
    }
}
