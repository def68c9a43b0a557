//! Translation-unit dependency graph rooted at the entry point
//!
//! Units live in an arena addressed by [`UnitId`]; edges are index lists
//! sorted by path. The graph is discovered with an iterative depth-first
//! traversal that keeps an explicit stack, so a cycle is reported with its
//! full path instead of overflowing or being silently broken.

use crate::cache::BuildRecord;
use crate::error::{BuildError, BuildResult};
use crate::fingerprint::{Fingerprint, Fingerprinter};
use crate::scanner::DependencyScanner;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Index of a unit in the graph arena
pub type UnitId = usize;

/// Whether a unit is compiled on its own
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitRole {
    /// Compiled into an object file
    TranslationUnit,
    /// Only included by other units
    Header,
}

/// A source file in the graph
#[derive(Debug, Clone)]
pub struct SourceUnit {
    /// Canonical path
    pub path: PathBuf,
    /// Content fingerprint at discovery time
    pub fingerprint: Fingerprint,
    /// Direct dependencies, sorted by path
    pub dependencies: Vec<UnitId>,
    /// Compilation role
    pub role: UnitRole,
}

impl SourceUnit {
    /// Whether this unit produces an object file
    pub fn is_translation_unit(&self) -> bool {
        self.role == UnitRole::TranslationUnit
    }
}

/// Acyclic dependency graph over source units
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    units: Vec<SourceUnit>,
    index: HashMap<PathBuf, UnitId>,
    entry: UnitId,
    /// Post-order of the traversal: dependencies before dependents
    order: Vec<UnitId>,
}

impl DependencyGraph {
    /// Build the graph by traversing from `entry`.
    ///
    /// `discover` is called exactly once per unit and returns its fingerprint
    /// and the canonical paths it depends on.
    pub fn traverse<D, R>(entry: &Path, role_of: R, mut discover: D) -> BuildResult<Self>
    where
        D: FnMut(&Path) -> BuildResult<(Fingerprint, Vec<PathBuf>)>,
        R: Fn(&Path) -> UnitRole,
    {
        struct Frame {
            id: UnitId,
            pending: Vec<PathBuf>,
            next: usize,
        }

        let mut units: Vec<SourceUnit> = Vec::new();
        let mut index: HashMap<PathBuf, UnitId> = HashMap::new();
        let mut on_stack: Vec<bool> = Vec::new();
        let mut order = Vec::new();

        let mut visit = |path: &Path,
                         role: UnitRole,
                         units: &mut Vec<SourceUnit>,
                         index: &mut HashMap<PathBuf, UnitId>,
                         on_stack: &mut Vec<bool>|
         -> BuildResult<Frame> {
            let (fingerprint, mut pending) = discover(path)?;
            pending.sort();
            pending.dedup();

            let id = units.len();
            units.push(SourceUnit {
                path: path.to_path_buf(),
                fingerprint,
                dependencies: Vec::with_capacity(pending.len()),
                role,
            });
            index.insert(path.to_path_buf(), id);
            on_stack.push(true);
            debug!(unit = %path.display(), deps = pending.len(), "discovered unit");

            Ok(Frame {
                id,
                pending,
                next: 0,
            })
        };

        let root = visit(
            entry,
            UnitRole::TranslationUnit,
            &mut units,
            &mut index,
            &mut on_stack,
        )?;
        let mut stack = vec![root];

        while let Some(frame) = stack.last_mut() {
            let id = frame.id;

            if frame.next == frame.pending.len() {
                on_stack[id] = false;
                order.push(id);
                stack.pop();
                continue;
            }

            let dep_path = frame.pending[frame.next].clone();
            frame.next += 1;

            match index.get(&dep_path).copied() {
                Some(dep_id) if on_stack[dep_id] => {
                    let start = stack
                        .iter()
                        .position(|f| f.id == dep_id)
                        .unwrap_or_default();
                    let mut cycle: Vec<PathBuf> = stack[start..]
                        .iter()
                        .map(|f| units[f.id].path.clone())
                        .collect();
                    cycle.push(dep_path);
                    return Err(BuildError::CyclicDependency { cycle });
                }
                Some(dep_id) => units[id].dependencies.push(dep_id),
                None => {
                    let role = role_of(&dep_path);
                    let child = visit(&dep_path, role, &mut units, &mut index, &mut on_stack)?;
                    units[id].dependencies.push(child.id);
                    stack.push(child);
                }
            }
        }

        Ok(Self {
            units,
            index,
            entry: 0,
            order,
        })
    }

    /// Entry point unit id
    pub fn entry(&self) -> UnitId {
        self.entry
    }

    /// Entry point unit
    pub fn entry_unit(&self) -> &SourceUnit {
        &self.units[self.entry]
    }

    /// Get a unit by id
    pub fn unit(&self, id: UnitId) -> &SourceUnit {
        &self.units[id]
    }

    /// Look up a unit by canonical path
    pub fn get(&self, path: &Path) -> Option<&SourceUnit> {
        self.index.get(path).map(|&id| &self.units[id])
    }

    /// Look up a unit id by canonical path
    pub fn id_of(&self, path: &Path) -> Option<UnitId> {
        self.index.get(path).copied()
    }

    /// All units in arena order
    pub fn units(&self) -> &[SourceUnit] {
        &self.units
    }

    /// Unit ids with dependencies before dependents, identical across
    /// runs over an unchanged tree
    pub fn topological_order(&self) -> &[UnitId] {
        &self.order
    }

    /// Translation units in topological order
    pub fn translation_units(&self) -> Vec<UnitId> {
        self.order
            .iter()
            .copied()
            .filter(|&id| self.units[id].is_translation_unit())
            .collect()
    }

    /// Paths of the direct dependencies of a unit, sorted
    pub fn dependency_paths(&self, id: UnitId) -> Vec<PathBuf> {
        self.units[id]
            .dependencies
            .iter()
            .map(|&dep| self.units[dep].path.clone())
            .collect()
    }

    /// Get unit count
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// A graph always holds its entry point
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

/// Discovers a [`DependencyGraph`] from the filesystem
pub struct GraphBuilder<'a> {
    scanner: &'a dyn DependencyScanner,
    fingerprinter: &'a Fingerprinter,
    previous: Option<&'a BuildRecord>,
    header_extensions: Vec<String>,
}

impl<'a> GraphBuilder<'a> {
    /// Create a graph builder
    pub fn new(scanner: &'a dyn DependencyScanner, fingerprinter: &'a Fingerprinter) -> Self {
        Self {
            scanner,
            fingerprinter,
            previous: None,
            header_extensions: Vec::new(),
        }
    }

    /// Reuse fingerprints recorded by the previous successful build
    pub fn with_previous(mut self, record: &'a BuildRecord) -> Self {
        self.previous = Some(record);
        self
    }

    /// Extensions (without dot, case-insensitive) of header-only units
    pub fn with_header_extensions(mut self, extensions: &[String]) -> Self {
        self.header_extensions = extensions.iter().map(|e| e.to_ascii_lowercase()).collect();
        self
    }

    /// Role of a non-entry unit based on its extension
    pub fn role_of(&self, path: &Path) -> UnitRole {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        if self.header_extensions.iter().any(|h| *h == ext) {
            UnitRole::Header
        } else {
            UnitRole::TranslationUnit
        }
    }

    /// Traverse from the entry point
    pub fn build(&self, entry: &Path) -> BuildResult<DependencyGraph> {
        let entry = entry
            .canonicalize()
            .ok()
            .filter(|p| p.is_file())
            .ok_or_else(|| BuildError::EntryPointNotFound {
                path: entry.to_path_buf(),
            })?;

        DependencyGraph::traverse(
            &entry,
            |path| self.role_of(path),
            |path| {
                let previous = self
                    .previous
                    .and_then(|record| record.units.get(path))
                    .map(|unit| &unit.fingerprint);
                let fingerprint = self.fingerprinter.fingerprint(path, previous)?;
                let dependencies = self.scanner.scan(path)?;
                Ok((fingerprint, dependencies))
            },
        )
    }
}
