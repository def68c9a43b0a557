//! Kiln incremental build core
//!
//! Builds native C/C++ projects with one entry point:
//! - Lexical include scanning and an acyclic dependency graph
//! - Content fingerprints and a persisted build record
//! - Pure rebuild planning with per-unit reasons
//! - Parallel compilation on a bounded worker pool, serialized link
//! - Staged outputs published atomically under an exclusive build lock
//! - Build profiles (debug, internal, release, custom)

pub mod builder;
pub mod cache;
pub mod deploy;
pub mod error;
pub mod fingerprint;
pub mod graph;
pub mod invoker;
pub mod lock;
pub mod output;
pub mod planner;
pub mod profile;
pub mod project;
pub mod scanner;
pub mod stager;
pub mod toolchain;

// Re-export main types
pub use builder::Builder;
pub use cache::{BuildCache, BuildRecord, LoadedRecord, UnitRecord};
pub use deploy::{deploy, DeployReport};
pub use error::{BuildError, BuildResult, CacheCorruptionWarning, CompileFailure};
pub use fingerprint::{Fingerprint, Fingerprinter};
pub use graph::{DependencyGraph, GraphBuilder, SourceUnit, UnitId, UnitRole};
pub use invoker::{CompileJob, CompileSummary, ToolInvoker, UnitOutcome};
pub use lock::BuildLock;
pub use output::{BuildReport, BuildStats, OutputMode, RecompiledUnit};
pub use planner::{plan, BuildPlan, MarkedUnit, PlanContext, RecompileReason, RelinkReason};
pub use profile::{LibraryVariant, OptLevel, Profile, ProfileConfig, ProfileManager};
pub use project::{AssetMapping, ProjectDescription, ToolchainSettings};
pub use scanner::{DependencyScanner, IncludeScanner};
pub use stager::StagingArea;
pub use toolchain::{ProcessToolchain, ToolOutput, Toolchain};
