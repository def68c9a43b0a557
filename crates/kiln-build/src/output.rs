//! Build reports and their presentation

use std::path::PathBuf;
use std::time::Duration;

/// How much the CLI prints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Summary line per build
    #[default]
    Normal,
    /// Summary plus every recompiled unit and its reason
    Verbose,
    /// Errors only
    Quiet,
    /// Machine-readable JSON on stdout
    Json,
}

/// Build statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildStats {
    /// Units in the dependency graph (headers included)
    pub total_units: usize,
    /// Translation units in the graph
    pub translation_units: usize,
    /// Translation units compiled by this build
    pub compiled_units: usize,
    /// Translation units whose object was carried over
    pub reused_units: usize,
    /// Whether the binary was relinked
    pub linked: bool,
    /// Asset and runtime files copied into the build directory
    pub staged_files: usize,
    /// Files whose content had to be hashed
    pub hashed_files: usize,
    /// Compile worker count
    pub jobs: usize,
    /// Discovery + planning time
    pub planning_time: Duration,
    /// Time spent compiling
    pub compilation_time: Duration,
    /// Time spent linking
    pub linking_time: Duration,
    /// Total build time
    pub total_time: Duration,
}

/// A recompiled unit and why
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecompiledUnit {
    pub path: PathBuf,
    pub reason: String,
}

/// Result of a successful build invocation
#[derive(Debug, Clone)]
pub struct BuildReport {
    /// Project name
    pub project: String,
    /// Profile name
    pub profile: String,
    /// Published binary
    pub binary: PathBuf,
    /// Nothing needed doing
    pub up_to_date: bool,
    /// Counters and timings
    pub stats: BuildStats,
    /// Recompiled units in build order
    pub recompiled: Vec<RecompiledUnit>,
    /// Why the binary was relinked
    pub relink_reasons: Vec<String>,
    /// Non-fatal problems (cache corruption, cache commit failures)
    pub warnings: Vec<String>,
}

impl BuildReport {
    /// JSON form used by `--json`
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "success": true,
            "project": self.project,
            "profile": self.profile,
            "binary": self.binary.display().to_string(),
            "up_to_date": self.up_to_date,
            "units": self.stats.total_units,
            "translation_units": self.stats.translation_units,
            "compiled_units": self.stats.compiled_units,
            "reused_units": self.stats.reused_units,
            "linked": self.stats.linked,
            "staged_files": self.stats.staged_files,
            "jobs": self.stats.jobs,
            "planning_time": self.stats.planning_time.as_secs_f64(),
            "compilation_time": self.stats.compilation_time.as_secs_f64(),
            "linking_time": self.stats.linking_time.as_secs_f64(),
            "total_time": self.stats.total_time.as_secs_f64(),
            "recompiled": self
                .recompiled
                .iter()
                .map(|unit| serde_json::json!({
                    "path": unit.path.display().to_string(),
                    "reason": unit.reason,
                }))
                .collect::<Vec<_>>(),
            "relink_reasons": self.relink_reasons,
            "warnings": self.warnings,
        })
    }

    /// Human-readable summary
    pub fn render(&self, mode: OutputMode) -> String {
        let mut out = String::new();

        if self.up_to_date {
            out.push_str(&format!(
                "{} ({}) is up to date [{:.2}s]\n",
                self.project,
                self.profile,
                self.stats.total_time.as_secs_f64()
            ));
        } else {
            out.push_str(&format!(
                "Built {} ({}) in {:.2}s: {} compiled, {} reused{}\n",
                self.project,
                self.profile,
                self.stats.total_time.as_secs_f64(),
                self.stats.compiled_units,
                self.stats.reused_units,
                if self.stats.linked { ", linked" } else { "" }
            ));
        }

        if mode == OutputMode::Verbose {
            for unit in &self.recompiled {
                out.push_str(&format!("  recompiled {} ({})\n", unit.path.display(), unit.reason));
            }
            if !self.relink_reasons.is_empty() {
                out.push_str(&format!("  relinked: {}\n", self.relink_reasons.join(", ")));
            }
            out.push_str(&format!(
                "  units: {} ({} translation units), hashed {}, {} jobs\n",
                self.stats.total_units,
                self.stats.translation_units,
                self.stats.hashed_files,
                self.stats.jobs
            ));
        }

        out
    }
}
