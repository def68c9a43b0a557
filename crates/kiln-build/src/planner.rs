//! Build planning
//!
//! Decides which units must be recompiled and whether the binary must be
//! relinked. Planning is a pure function of the graph, the previous build
//! record and a [`PlanContext`] snapshot; it touches no files.

use crate::cache::BuildRecord;
use crate::graph::{DependencyGraph, UnitId};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

/// Why a unit is recompiled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecompileReason {
    /// Not present in the previous build
    New,
    /// Content hash differs
    ContentChanged,
    /// Direct dependency set differs
    DependenciesChanged,
    /// Toolchain flags or profile differ
    FlagsChanged,
    /// Previous object file is gone
    ArtifactMissing,
    /// A direct dependency is itself marked
    DependencyChanged(PathBuf),
    /// Full rebuild requested
    Forced,
}

impl fmt::Display for RecompileReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::New => write!(f, "new"),
            Self::ContentChanged => write!(f, "content changed"),
            Self::DependenciesChanged => write!(f, "includes changed"),
            Self::FlagsChanged => write!(f, "flags changed"),
            Self::ArtifactMissing => write!(f, "object missing"),
            Self::DependencyChanged(dep) => write!(f, "{} changed", dep.display()),
            Self::Forced => write!(f, "forced"),
        }
    }
}

/// Why the binary is relinked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RelinkReason {
    UnitsRecompiled,
    PreviousBuildIncomplete,
    UnitSetChanged,
    FlagsChanged,
    BinaryMissing,
    Forced,
}

impl fmt::Display for RelinkReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::UnitsRecompiled => "units recompiled",
            Self::PreviousBuildIncomplete => "no previous successful build",
            Self::UnitSetChanged => "translation units added or removed",
            Self::FlagsChanged => "flags changed",
            Self::BinaryMissing => "binary missing",
            Self::Forced => "forced",
        };
        f.write_str(text)
    }
}

/// A unit selected for recompilation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkedUnit {
    pub id: UnitId,
    pub path: PathBuf,
    pub reason: RecompileReason,
}

/// Filesystem facts the planner needs, gathered by the caller
#[derive(Debug, Clone, Default)]
pub struct PlanContext {
    /// Digest of the effective toolchain flags
    pub flags_digest: String,
    /// Units whose recorded object file still exists in the build directory
    pub available_artifacts: HashSet<PathBuf>,
    /// Whether the previously published binary exists
    pub binary_present: bool,
    /// Ignore the previous record
    pub force: bool,
}

/// Output of [`plan`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildPlan {
    /// Marked units, dependencies before dependents
    pub marked: Vec<MarkedUnit>,
    /// Why relinking is needed (empty when the binary is current)
    pub relink_reasons: Vec<RelinkReason>,
    /// Full topological order
    pub order: Vec<UnitId>,
    /// Translation units in topological order
    pub translation_units: Vec<UnitId>,
}

impl BuildPlan {
    /// Check if a unit is marked
    pub fn is_marked(&self, id: UnitId) -> bool {
        self.marked.iter().any(|m| m.id == id)
    }

    /// Reason a unit is marked
    pub fn reason(&self, id: UnitId) -> Option<&RecompileReason> {
        self.marked.iter().find(|m| m.id == id).map(|m| &m.reason)
    }

    /// Marked translation units: the units to compile
    pub fn units_to_compile<'g>(
        &'g self,
        graph: &'g DependencyGraph,
    ) -> impl Iterator<Item = &'g MarkedUnit> {
        self.marked
            .iter()
            .filter(move |m| graph.unit(m.id).is_translation_unit())
    }

    /// Check if the binary must be relinked
    pub fn needs_relink(&self) -> bool {
        !self.relink_reasons.is_empty()
    }

    /// Nothing to compile or link
    pub fn is_noop(&self) -> bool {
        self.marked.is_empty() && !self.needs_relink()
    }
}

/// Compute the plan
pub fn plan(graph: &DependencyGraph, previous: &BuildRecord, context: &PlanContext) -> BuildPlan {
    let flags_changed = previous.flags_digest.as_deref() != Some(context.flags_digest.as_str());
    let mut marked: Vec<MarkedUnit> = Vec::new();
    let mut marked_ids: HashSet<UnitId> = HashSet::new();

    for &id in graph.topological_order() {
        let unit = graph.unit(id);
        let is_tu = unit.is_translation_unit();

        let reason = if context.force {
            Some(RecompileReason::Forced)
        } else {
            match previous.units.get(&unit.path) {
                None => Some(RecompileReason::New),
                Some(record) if record.fingerprint != unit.fingerprint => {
                    Some(RecompileReason::ContentChanged)
                }
                Some(record) if record.dependencies != graph.dependency_paths(id) => {
                    Some(RecompileReason::DependenciesChanged)
                }
                Some(_) if is_tu && flags_changed => Some(RecompileReason::FlagsChanged),
                Some(_) if is_tu && !context.available_artifacts.contains(&unit.path) => {
                    Some(RecompileReason::ArtifactMissing)
                }
                Some(_) => unit
                    .dependencies
                    .iter()
                    .find(|dep| marked_ids.contains(dep))
                    .map(|&dep| RecompileReason::DependencyChanged(graph.unit(dep).path.clone())),
            }
        };

        if let Some(reason) = reason {
            marked_ids.insert(id);
            marked.push(MarkedUnit {
                id,
                path: unit.path.clone(),
                reason,
            });
        }
    }

    let translation_units = graph.translation_units();
    let relink_reasons = relink_reasons(
        graph,
        previous,
        context,
        &marked,
        &translation_units,
        flags_changed,
    );

    BuildPlan {
        marked,
        relink_reasons,
        order: graph.topological_order().to_vec(),
        translation_units,
    }
}

fn relink_reasons(
    graph: &DependencyGraph,
    previous: &BuildRecord,
    context: &PlanContext,
    marked: &[MarkedUnit],
    translation_units: &[UnitId],
    flags_changed: bool,
) -> Vec<RelinkReason> {
    let mut reasons = BTreeSet::new();

    if context.force {
        reasons.insert(RelinkReason::Forced);
    }
    if marked.iter().any(|m| graph.unit(m.id).is_translation_unit()) {
        reasons.insert(RelinkReason::UnitsRecompiled);
    }
    if !previous.succeeded {
        reasons.insert(RelinkReason::PreviousBuildIncomplete);
    } else if flags_changed {
        reasons.insert(RelinkReason::FlagsChanged);
    }

    let current: BTreeSet<&Path> = translation_units
        .iter()
        .map(|&id| graph.unit(id).path.as_path())
        .collect();
    let recorded: BTreeSet<&Path> = previous
        .units
        .iter()
        .filter(|(_, unit)| unit.artifact.is_some())
        .map(|(path, _)| path.as_path())
        .collect();
    if previous.succeeded && current != recorded {
        reasons.insert(RelinkReason::UnitSetChanged);
    }

    if !context.binary_present {
        reasons.insert(RelinkReason::BinaryMissing);
    }

    reasons.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::UnitRecord;
    use crate::error::BuildResult;
    use crate::fingerprint::Fingerprint;
    use crate::graph::UnitRole;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    /// In-memory project: path -> (content, includes)
    struct Tree {
        files: HashMap<PathBuf, (String, Vec<PathBuf>)>,
    }

    impl Tree {
        fn new(files: &[(&str, &str, &[&str])]) -> Self {
            Self {
                files: files
                    .iter()
                    .map(|(path, content, deps)| {
                        (
                            PathBuf::from(path),
                            (
                                content.to_string(),
                                deps.iter().map(PathBuf::from).collect(),
                            ),
                        )
                    })
                    .collect(),
            }
        }

        fn edit(&mut self, path: &str, content: &str) {
            if let Some(entry) = self.files.get_mut(Path::new(path)) {
                entry.0 = content.to_string();
            }
        }

        fn graph(&self) -> DependencyGraph {
            DependencyGraph::traverse(
                Path::new("main.cpp"),
                |path| {
                    if path.extension().is_some_and(|e| e == "h") {
                        UnitRole::Header
                    } else {
                        UnitRole::TranslationUnit
                    }
                },
                |path| -> BuildResult<(Fingerprint, Vec<PathBuf>)> {
                    let (content, deps) = &self.files[path];
                    Ok((
                        Fingerprint {
                            hash: content.clone(),
                            size: content.len() as u64,
                            modified: None,
                        },
                        deps.clone(),
                    ))
                },
            )
            .unwrap()
        }
    }

    /// Record that a successful build of `graph` would have left behind
    fn record_of(graph: &DependencyGraph, flags: &str) -> BuildRecord {
        let mut record = BuildRecord::empty();
        for (id, unit) in graph.units().iter().enumerate() {
            record.units.insert(
                unit.path.clone(),
                UnitRecord {
                    fingerprint: unit.fingerprint.clone(),
                    artifact: unit
                        .is_translation_unit()
                        .then(|| PathBuf::from(format!("obj/{}.o", unit.path.display()))),
                    dependencies: graph.dependency_paths(id),
                },
            );
        }
        record.flags_digest = Some(flags.to_string());
        record.succeeded = true;
        record
    }

    fn context_for(graph: &DependencyGraph, flags: &str) -> PlanContext {
        PlanContext {
            flags_digest: flags.to_string(),
            available_artifacts: graph
                .units()
                .iter()
                .filter(|u| u.is_translation_unit())
                .map(|u| u.path.clone())
                .collect(),
            binary_present: true,
            force: false,
        }
    }

    fn project() -> Tree {
        Tree::new(&[
            ("main.cpp", "main", &["game.cpp", "util.h"]),
            ("game.cpp", "game", &["game.h"]),
            ("game.h", "game-h", &["util.h"]),
            ("util.h", "util", &[]),
            ("audio.cpp", "audio", &[]),
        ])
    }

    fn marked_paths(plan: &BuildPlan) -> Vec<PathBuf> {
        plan.marked.iter().map(|m| m.path.clone()).collect()
    }

    #[test]
    fn test_first_build_marks_everything() {
        let tree = project();
        let graph = tree.graph();
        let context = PlanContext {
            binary_present: false,
            ..context_for(&graph, "f")
        };

        let plan = plan(&graph, &BuildRecord::empty(), &context);
        assert_eq!(plan.marked.len(), graph.len());
        assert!(plan.marked.iter().all(|m| m.reason == RecompileReason::New));
        assert!(plan.relink_reasons.contains(&RelinkReason::PreviousBuildIncomplete));
        assert!(plan.relink_reasons.contains(&RelinkReason::BinaryMissing));
    }

    #[test]
    fn test_unchanged_tree_is_noop() {
        let tree = project();
        let graph = tree.graph();
        let record = record_of(&graph, "f");

        let plan = plan(&graph, &record, &context_for(&graph, "f"));
        assert!(plan.is_noop(), "{:?}", plan);
    }

    #[test]
    fn test_header_change_propagates_to_dependents_only() {
        let mut tree = project();
        let record = record_of(&tree.graph(), "f");
        tree.edit("game.h", "game-h v2");
        let graph = tree.graph();

        let plan = plan(&graph, &record, &context_for(&graph, "f"));
        assert_eq!(
            marked_paths(&plan),
            vec![
                PathBuf::from("game.h"),
                PathBuf::from("game.cpp"),
                PathBuf::from("main.cpp"),
            ]
        );
        let game = graph.id_of(Path::new("game.cpp")).unwrap();
        assert_eq!(
            plan.reason(game),
            Some(&RecompileReason::DependencyChanged(PathBuf::from("game.h")))
        );
        assert_eq!(plan.relink_reasons, vec![RelinkReason::UnitsRecompiled]);
    }

    #[test]
    fn test_leaf_change_marks_only_leaf_and_root() {
        let mut tree = project();
        let record = record_of(&tree.graph(), "f");
        tree.edit("game.cpp", "game v2");
        let graph = tree.graph();

        let plan = plan(&graph, &record, &context_for(&graph, "f"));
        assert_eq!(
            marked_paths(&plan),
            vec![PathBuf::from("game.cpp"), PathBuf::from("main.cpp")]
        );
        assert_eq!(
            plan.reason(graph.id_of(Path::new("game.cpp")).unwrap()),
            Some(&RecompileReason::ContentChanged)
        );
    }

    #[test]
    fn test_flags_change_recompiles_translation_units() {
        let tree = project();
        let graph = tree.graph();
        let record = record_of(&graph, "old-flags");

        let plan = plan(&graph, &record, &context_for(&graph, "new-flags"));
        let compiled: Vec<_> = plan.units_to_compile(&graph).collect();
        assert_eq!(compiled.len(), graph.translation_units().len());
        assert!(compiled.iter().all(|m| m.reason == RecompileReason::FlagsChanged));
        assert!(plan.relink_reasons.contains(&RelinkReason::FlagsChanged));
    }

    #[test]
    fn test_missing_artifact_recompiles_unit() {
        let tree = project();
        let graph = tree.graph();
        let record = record_of(&graph, "f");
        let mut context = context_for(&graph, "f");
        context.available_artifacts.remove(Path::new("game.cpp"));

        let plan = plan(&graph, &record, &context);
        assert_eq!(
            plan.reason(graph.id_of(Path::new("game.cpp")).unwrap()),
            Some(&RecompileReason::ArtifactMissing)
        );
    }

    #[test]
    fn test_missing_binary_only_relinks() {
        let tree = project();
        let graph = tree.graph();
        let record = record_of(&graph, "f");
        let context = PlanContext {
            binary_present: false,
            ..context_for(&graph, "f")
        };

        let plan = plan(&graph, &record, &context);
        assert!(plan.marked.is_empty());
        assert_eq!(plan.relink_reasons, vec![RelinkReason::BinaryMissing]);
    }

    #[test]
    fn test_removed_unit_relinks() {
        let tree = project();
        let graph = tree.graph();
        let mut record = record_of(&graph, "f");
        record.units.insert(
            PathBuf::from("removed.cpp"),
            UnitRecord {
                fingerprint: Fingerprint {
                    hash: "gone".to_string(),
                    size: 0,
                    modified: None,
                },
                artifact: Some(PathBuf::from("obj/removed.cpp.o")),
                dependencies: Vec::new(),
            },
        );

        let plan = plan(&graph, &record, &context_for(&graph, "f"));
        assert!(plan.marked.is_empty());
        assert_eq!(plan.relink_reasons, vec![RelinkReason::UnitSetChanged]);
    }

    #[test]
    fn test_force_marks_everything() {
        let tree = project();
        let graph = tree.graph();
        let record = record_of(&graph, "f");
        let context = PlanContext {
            force: true,
            ..context_for(&graph, "f")
        };

        let plan = plan(&graph, &record, &context);
        assert_eq!(plan.marked.len(), graph.len());
        assert!(plan.relink_reasons.contains(&RelinkReason::Forced));
    }

    #[test]
    fn test_plan_is_deterministic() {
        let mut tree = project();
        let record = record_of(&tree.graph(), "f");
        tree.edit("util.h", "util v2");

        let first = tree.graph();
        let second = tree.graph();
        assert_eq!(
            plan(&first, &record, &context_for(&first, "f")),
            plan(&second, &record, &context_for(&second, "f"))
        );
    }
}
