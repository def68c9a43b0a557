//! Build orchestration
//!
//! One invocation: lock, load cache, discover the graph, plan, stage
//! (compile or reuse objects, link or reuse the binary, mirror assets),
//! publish, commit the cache, unlock. Any failure before publish leaves the
//! previously published build directory untouched.

use crate::cache::{BuildCache, BuildRecord, LoadedRecord, UnitRecord};
use crate::error::{relative_to, BuildError, BuildResult};
use crate::fingerprint::Fingerprinter;
use crate::graph::{DependencyGraph, GraphBuilder};
use crate::invoker::{CompileJob, ToolInvoker};
use crate::lock::BuildLock;
use crate::output::{BuildReport, BuildStats, RecompiledUnit};
use crate::planner::{plan, BuildPlan, PlanContext};
use crate::profile::{Profile, ProfileManager};
use crate::project::ProjectDescription;
use crate::scanner::IncludeScanner;
use crate::stager::{assets_digest, assets_published, retired_path, staging_path, StagingArea};
use crate::toolchain::{ProcessToolchain, Toolchain};
use kiln_config::{ConfigLoader, LoadedConfig};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Per-invocation switches
#[derive(Debug, Clone, Default)]
struct BuildOptions {
    /// Ignore the cache and rebuild everything
    pub force: bool,
    /// Compile worker count (overrides the project setting)
    pub jobs: Option<usize>,
}

/// Main builder for orchestrating builds
pub struct Builder {
    project: ProjectDescription,
    toolchain: Box<dyn Toolchain>,
    options: BuildOptions,
}

impl Builder {
    /// Create a builder using the project's configured toolchain
    pub fn new(project: ProjectDescription) -> Self {
        let toolchain = Box::new(ProcessToolchain::from_project(&project));
        Self {
            project,
            toolchain,
            options: BuildOptions::default(),
        }
    }

    /// Load kiln.toml from `start_dir` (or a parent) and resolve a profile.
    ///
    /// Profile precedence: `profile` argument, then KILN_PROFILE, then debug.
    pub fn load(start_dir: &Path, profile: Option<&str>) -> BuildResult<Self> {
        let config = ConfigLoader::new()
            .load_from_directory(start_dir)
            .map_err(BuildError::invalid_project)?;
        Self::from_config(&config, profile)
    }

    /// Resolve an already loaded configuration
    pub fn from_config(config: &LoadedConfig, profile: Option<&str>) -> BuildResult<Self> {
        let requested = profile
            .map(str::to_string)
            .or_else(|| config.overrides.profile.clone())
            .map(|name| Profile::from_str(&name))
            .unwrap_or_default();

        let mut profiles = ProfileManager::new();
        profiles.load_from_manifest(&config.manifest.profiles)?;
        let profile = profiles.get(&requested)?;

        Ok(Self::new(ProjectDescription::resolve(config, profile)?))
    }

    /// Replace the toolchain
    pub fn with_toolchain(mut self, toolchain: Box<dyn Toolchain>) -> Self {
        self.toolchain = toolchain;
        self
    }

    /// Force a full rebuild
    pub fn with_force(mut self, force: bool) -> Self {
        self.options.force = force;
        self
    }

    /// Set compile worker count
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.options.jobs = Some(jobs);
        self
    }

    /// Resolved project
    pub fn project(&self) -> &ProjectDescription {
        &self.project
    }

    /// Path of the published binary
    pub fn binary_path(&self) -> PathBuf {
        self.project.build_dir.join(&self.project.binary_name)
    }

    fn worker_count(&self) -> usize {
        self.options
            .jobs
            .or(self.project.jobs)
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1)
            })
            .max(1)
    }

    /// Execute the build
    pub fn build(&self) -> BuildResult<BuildReport> {
        let build_start = Instant::now();
        let project = &self.project;
        let build_dir = project.build_dir.as_path();

        info!(project = %project.name, profile = %project.profile.name, "building");
        let _lock = BuildLock::acquire(build_dir)?;

        let LoadedRecord {
            record: previous,
            warning,
        } = if self.options.force {
            LoadedRecord {
                record: BuildRecord::empty(),
                warning: None,
            }
        } else {
            BuildCache::new(build_dir).load()
        };
        let mut warnings: Vec<String> = warning.iter().map(|w| w.to_string()).collect();

        // Discovery and planning
        let scanner = IncludeScanner::new(project.scanner_search_paths());
        let fingerprinter = Fingerprinter::new();
        let graph = GraphBuilder::new(&scanner, &fingerprinter)
            .with_previous(&previous)
            .with_header_extensions(&project.header_extensions)
            .build(&project.entry)?;

        let binary_rel = PathBuf::from(&project.binary_name);
        let context = self.plan_context(&graph, &previous, &binary_rel);
        let flags_digest = context.flags_digest.clone();
        let plan = plan(&graph, &previous, &context);
        let assets_digest = assets_digest(&project.assets, &project.runtime_files)?;
        let assets_changed = previous.assets_digest.as_deref() != Some(assets_digest.as_str())
            || !assets_published(build_dir, &project.assets, &project.runtime_files)?;
        let planning_time = build_start.elapsed();

        debug!(
            units = graph.len(),
            marked = plan.marked.len(),
            relink = plan.needs_relink(),
            assets_changed,
            "plan computed"
        );

        let mut stats = BuildStats {
            total_units: graph.len(),
            translation_units: plan.translation_units.len(),
            hashed_files: fingerprinter.hashed_count(),
            jobs: self.worker_count(),
            planning_time,
            ..Default::default()
        };

        if plan.is_noop() && !assets_changed {
            info!("up to date");
            stats.reused_units = stats.translation_units;
            stats.total_time = build_start.elapsed();
            return Ok(self.report(&plan, stats, true, warnings));
        }

        // Staging
        let staging = StagingArea::create(build_dir)?;
        let (jobs, objects) = self.prepare_objects(&graph, &plan, &staging, &mut stats)?;

        let invoker = ToolInvoker::new(self.toolchain.as_ref(), stats.jobs)?;
        let compile_start = Instant::now();
        let summary = invoker.compile_all(&jobs, project);
        let skipped = summary.skipped().count();
        if skipped > 0 {
            warn!(skipped, "units not compiled after an earlier failure");
        }
        let summary = summary.into_result()?;
        stats.compiled_units = summary.compiled().count();
        stats.compilation_time = compile_start.elapsed();

        let link_start = Instant::now();
        if plan.needs_relink() || !staging.reuse(&binary_rel)? {
            invoker.link(&objects, &staging.join(&binary_rel), project)?;
            stats.linked = true;
        }
        stats.linking_time = link_start.elapsed();

        stats.staged_files = self.stage_assets(&staging)?;

        staging.publish()?;
        info!(build_dir = %build_dir.display(), "published");

        let record = self.record(&graph, flags_digest, assets_digest, binary_rel);
        if let Err(e) = BuildCache::new(build_dir).commit(&record) {
            warn!(error = %e, "could not write build cache; next build will be a full rebuild");
            warnings.push(format!("could not write build cache: {}", e));
        }

        stats.total_time = build_start.elapsed();
        Ok(self.report(&plan, stats, false, warnings))
    }

    fn plan_context(
        &self,
        graph: &DependencyGraph,
        previous: &BuildRecord,
        binary_rel: &Path,
    ) -> PlanContext {
        let build_dir = &self.project.build_dir;

        // An artifact is usable only where this build would put it
        let available_artifacts = previous
            .units
            .iter()
            .filter(|(path, unit)| {
                unit.artifact.as_deref() == Some(self.project.object_path(path).as_path())
                    && build_dir.join(self.project.object_path(path)).is_file()
            })
            .map(|(path, _)| path.clone())
            .filter(|path| graph.get(path).is_some())
            .collect();

        PlanContext {
            flags_digest: self.project.flags_digest(),
            available_artifacts,
            binary_present: previous.binary.as_deref() == Some(binary_rel)
                && build_dir.join(binary_rel).is_file(),
            force: self.options.force,
        }
    }

    /// Collect compile jobs for marked units and carry over the rest
    fn prepare_objects(
        &self,
        graph: &DependencyGraph,
        plan: &BuildPlan,
        staging: &StagingArea,
        stats: &mut BuildStats,
    ) -> BuildResult<(Vec<CompileJob>, Vec<PathBuf>)> {
        let mut jobs = Vec::new();
        let mut objects = Vec::with_capacity(plan.translation_units.len());

        for &id in &plan.translation_units {
            let unit = graph.unit(id);
            let object_rel = self.project.object_path(&unit.path);
            let object = staging.join(&object_rel);

            if plan.is_marked(id) || !staging.reuse(&object_rel)? {
                jobs.push(CompileJob {
                    unit: unit.path.clone(),
                    object: object.clone(),
                });
            } else {
                stats.reused_units += 1;
            }
            objects.push(object);
        }

        Ok((jobs, objects))
    }

    /// Mirror asset trees and external runtime files into staging
    fn stage_assets(&self, staging: &StagingArea) -> BuildResult<usize> {
        let mut staged = 0;

        for asset in &self.project.assets {
            if asset.source.is_dir() {
                staged += staging.mirror_tree(&asset.source, &asset.destination)?;
            } else if asset.required {
                return Err(BuildError::invalid_project(format!(
                    "asset directory {} does not exist",
                    asset.source.display()
                )));
            }
        }

        for file in &self.project.runtime_files {
            let name = file.file_name().ok_or_else(|| {
                BuildError::invalid_project(format!(
                    "runtime file {} has no file name",
                    file.display()
                ))
            })?;
            staging.stage_file(file, Path::new(name))?;
            staged += 1;
        }

        Ok(staged)
    }

    fn record(
        &self,
        graph: &DependencyGraph,
        flags_digest: String,
        assets_digest: String,
        binary: PathBuf,
    ) -> BuildRecord {
        let mut record = BuildRecord::empty();
        record.flags_digest = Some(flags_digest);
        record.assets_digest = Some(assets_digest);
        record.binary = Some(binary);

        for (id, unit) in graph.units().iter().enumerate() {
            record.units.insert(
                unit.path.clone(),
                UnitRecord {
                    fingerprint: unit.fingerprint.clone(),
                    artifact: unit
                        .is_translation_unit()
                        .then(|| self.project.object_path(&unit.path)),
                    dependencies: graph.dependency_paths(id),
                },
            );
        }

        record.mark_succeeded();
        record
    }

    fn report(
        &self,
        plan: &BuildPlan,
        stats: BuildStats,
        up_to_date: bool,
        warnings: Vec<String>,
    ) -> BuildReport {
        let root = self
            .project
            .root
            .canonicalize()
            .unwrap_or_else(|_| self.project.root.clone());
        BuildReport {
            project: self.project.name.clone(),
            profile: self.project.profile.name.clone(),
            binary: self.binary_path(),
            up_to_date,
            stats,
            recompiled: plan
                .marked
                .iter()
                .map(|m| RecompiledUnit {
                    path: relative_to(&m.path, &root).to_path_buf(),
                    reason: m.reason.to_string(),
                })
                .collect(),
            relink_reasons: plan.relink_reasons.iter().map(|r| r.to_string()).collect(),
            warnings,
        }
    }

    /// Remove the build and deploy directories; returns what was removed
    pub fn clean(&self) -> BuildResult<Vec<PathBuf>> {
        let build_dir = &self.project.build_dir;
        let _lock = BuildLock::acquire(build_dir)?;

        let mut removed = Vec::new();
        for dir in [
            build_dir.clone(),
            staging_path(build_dir),
            retired_path(build_dir),
            self.project.deploy_dir.clone(),
        ] {
            if dir.exists() {
                fs::remove_dir_all(&dir).map_err(|e| BuildError::io(&dir, e))?;
                info!(path = %dir.display(), "removed");
                removed.push(dir);
            }
        }
        Ok(removed)
    }
}
