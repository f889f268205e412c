//! Per-column provenance tracking.
//!
//! A [`ColumnLineage`] is driven in lock-step with the pipeline: before a step runs, its
//! [`LineageEffect`] is applied to the tracker. Every live column maps to a
//! [`ColumnDirective`] node holding the newest-first history of steps that produced its
//! current value.
//!
//! ## Versions and branches
//!
//! Each node carries a version counter starting at 0. A multi-input directive such as `merge`
//! must reference its inputs as they are *now*, even though the live columns keep changing
//! afterwards. It does so through a branch: an immutable copy of the input's history. A
//! version-0 input needs no branch and is referenced live.
//!
//! A single-column mutation bumps the version when the node is still at 0 or when a branch
//! already exists for its current version, so history captured by a branch is never
//! extended in place.
//!
//! Nodes live in an arena; live names and branch keys are lookup maps into it. Branches are
//! owned by the node they were taken from, not by its name: a column renamed away and a new
//! column later created under the old name never share a branch. Resetting a node's version
//! (rename, swap, set-columns, relabel) also releases its claim on earlier branches.

mod snapshot;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::directive::ColumnRelabel;
use crate::error::LineageError;
use crate::steps::Step;

pub use snapshot::{BranchSnapshot, LineageObserver, LineageSnapshot};

/// Run metadata reported alongside the lineage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunConfig {
    pub program: String,
    pub workspace: String,
    pub started_at: DateTime<Utc>,
}

impl RunConfig {
    pub fn new(program: impl Into<String>, workspace: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            workspace: workspace.into(),
            started_at: Utc::now(),
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::new(env!("CARGO_PKG_NAME"), "default")
    }
}

/// Reference to the step that contributed a history entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRef {
    pub line: usize,
    pub directive: String,
    pub text: String,
}

impl StepRef {
    pub fn new(line: usize, directive: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            line,
            directive: directive.into(),
            text: text.into(),
        }
    }
}

/// Identifies a branch.
///
/// `id` is unique within a run. `column` and `version` label the state that was captured:
/// the column's name and version when the branch was taken.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BranchKey {
    pub column: String,
    pub version: u32,
    pub id: usize,
}

impl BranchKey {
    fn new(column: &str, version: u32, id: NodeId) -> Self {
        Self {
            column: column.to_string(),
            version,
            id: id.0,
        }
    }
}

impl fmt::Display for BranchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.column, self.version)
    }
}

/// How a multi-input step refers to one of its inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceRef {
    /// Snapshot of the input's history at the time of the step.
    Branch(BranchKey),
    /// The input was still unversioned; its live node is the reference.
    Live(String),
}

/// History entry for a step that read from several columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetaStep {
    pub step: StepRef,
    pub sources: BTreeMap<String, SourceRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryEntry {
    Step(StepRef),
    Meta(MetaStep),
}

impl HistoryEntry {
    pub fn step(&self) -> &StepRef {
        match self {
            HistoryEntry::Step(step) => step,
            HistoryEntry::Meta(meta) => &meta.step,
        }
    }

    pub fn as_meta(&self) -> Option<&MetaStep> {
        match self {
            HistoryEntry::Meta(meta) => Some(meta),
            HistoryEntry::Step(_) => None,
        }
    }
}

/// Lineage node for one column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnDirective {
    original_name: Option<String>,
    position: Option<usize>,
    version: u32,
    history: Vec<HistoryEntry>,
}

impl ColumnDirective {
    fn original(name: &str, position: usize) -> Self {
        Self {
            original_name: Some(name.to_string()),
            position: Some(position),
            version: 0,
            history: Vec::new(),
        }
    }

    fn synthetic() -> Self {
        Self {
            original_name: None,
            position: None,
            version: 0,
            history: Vec::new(),
        }
    }

    /// Input column this node traces back to; `None` for columns created by a directive.
    pub fn original_name(&self) -> Option<&str> {
        self.original_name.as_deref()
    }

    /// Registration position; `None` for columns that were not part of the input.
    pub fn position(&self) -> Option<usize> {
        self.position
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Contributing steps, newest first.
    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn is_synthetic(&self) -> bool {
        self.original_name.is_none()
    }

    fn prepend(&mut self, entry: HistoryEntry) {
        self.history.insert(0, entry);
    }
}

/// Schema-shape effect of a directive, consumed by [`ColumnLineage::apply`].
#[derive(Debug, Clone)]
pub enum LineageEffect {
    /// Row-level or placeholder directive; lineage is untouched.
    None,
    Rename { old: String, new: String },
    /// Positional relabelling of the registered input columns.
    SetColumns { names: Vec<String> },
    /// Relabel every live column by rule.
    Relabel(ColumnRelabel),
    Drop { columns: Vec<String> },
    Keep { columns: Vec<String> },
    Swap { first: String, second: String },
    /// Destinations are computed from the sources, as with `merge`.
    Derive {
        sources: Vec<String>,
        destinations: Vec<String>,
    },
    /// The value of a single column is replaced.
    Mutate { column: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct NodeId(usize);

/// Column lineage for one pipeline run.
///
/// Never shared between runs; the executor builds a new tracker each time.
#[derive(Debug, Clone)]
pub struct ColumnLineage {
    run: RunConfig,
    nodes: Vec<ColumnDirective>,
    live: HashMap<String, NodeId>,
    branches: HashMap<BranchKey, NodeId>,
    /// Branch taken of a node at a version, while that version is current.
    captured: HashMap<(NodeId, u32), BranchKey>,
}

impl ColumnLineage {
    /// Create a tracker with one node per initial column, positioned by index.
    pub fn new<I, S>(run: RunConfig, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut lineage = Self {
            run,
            nodes: Vec::new(),
            live: HashMap::new(),
            branches: HashMap::new(),
            captured: HashMap::new(),
        };
        for (position, name) in columns.into_iter().enumerate() {
            let name = name.as_ref();
            let id = lineage.alloc(ColumnDirective::original(name, position));
            lineage.live.insert(name.to_string(), id);
        }
        lineage
    }

    pub fn run_config(&self) -> &RunConfig {
        &self.run
    }

    /// Live node for `column`.
    pub fn get(&self, column: &str) -> Option<&ColumnDirective> {
        self.live.get(column).map(|id| &self.nodes[id.0])
    }

    pub fn branch(&self, key: &BranchKey) -> Option<&ColumnDirective> {
        self.branches.get(key).map(|id| &self.nodes[id.0])
    }

    pub fn contains(&self, column: &str) -> bool {
        self.live.contains_key(column)
    }

    /// Register `column` as a synthetic node with empty history. Returns `false` when it is
    /// already live.
    ///
    /// The executor uses this for columns that appear in a batch without a lineage effect,
    /// e.g. the outputs of parsers and decoders.
    pub fn register(&mut self, column: &str) -> bool {
        if self.contains(column) {
            return false;
        }
        self.ensure(column);
        true
    }

    /// Live column names, sorted.
    pub fn columns(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.live.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Branch keys, sorted.
    pub fn branch_keys(&self) -> Vec<&BranchKey> {
        let mut keys: Vec<&BranchKey> = self.branches.keys().collect();
        keys.sort_unstable();
        keys
    }

    /// Apply the lineage effect of a configured step.
    pub fn record(&mut self, step: &Step) -> Result<(), LineageError> {
        self.apply(&step.step_ref(), &step.directive().lineage_effect())
    }

    /// Apply `effect`, attributing it to `step`.
    ///
    /// On error the tracker is left unchanged.
    pub fn apply(&mut self, step: &StepRef, effect: &LineageEffect) -> Result<(), LineageError> {
        match effect {
            LineageEffect::None => Ok(()),
            LineageEffect::Rename { old, new } => self.rename(step, old, new),
            LineageEffect::SetColumns { names } => self.set_columns(step, names),
            LineageEffect::Relabel(rule) => self.relabel(step, rule),
            LineageEffect::Drop { columns } => self.drop_columns(columns),
            LineageEffect::Keep { columns } => {
                let keep: HashSet<&str> = columns.iter().map(String::as_str).collect();
                let doomed: Vec<String> = self
                    .columns()
                    .into_iter()
                    .filter(|c| !keep.contains(c))
                    .map(str::to_string)
                    .collect();
                self.drop_columns(&doomed)
            }
            LineageEffect::Swap { first, second } => self.swap(step, first, second),
            LineageEffect::Derive {
                sources,
                destinations,
            } => self.derive(step, sources, destinations),
            LineageEffect::Mutate { column } => {
                self.ensure(column);
                self.insert(column, HistoryEntry::Step(step.clone()));
                Ok(())
            }
        }
    }

    /// Read-only copy of the current state for external consumers.
    pub fn snapshot(&self) -> LineageSnapshot {
        LineageSnapshot::capture(self)
    }

    pub(crate) fn live_nodes(&self) -> impl Iterator<Item = (&str, &ColumnDirective)> {
        self.live
            .iter()
            .map(|(name, id)| (name.as_str(), &self.nodes[id.0]))
    }

    pub(crate) fn branch_nodes(&self) -> impl Iterator<Item = (&BranchKey, &ColumnDirective)> {
        self.branches.iter().map(|(key, id)| (key, &self.nodes[id.0]))
    }

    fn alloc(&mut self, node: ColumnDirective) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    fn id_of(&self, column: &str) -> Result<NodeId, LineageError> {
        self.live
            .get(column)
            .copied()
            .ok_or_else(|| LineageError::UnknownColumn {
                column: column.to_string(),
            })
    }

    /// Register a synthetic node for `column` unless it is already live.
    fn ensure(&mut self, column: &str) -> NodeId {
        if let Some(id) = self.live.get(column) {
            return *id;
        }
        let id = self.alloc(ColumnDirective::synthetic());
        self.live.insert(column.to_string(), id);
        id
    }

    /// Prepend `entry` to a live column, bumping its version first when the current version is
    /// unbranched-initial or already captured by a branch.
    fn insert(&mut self, column: &str, entry: HistoryEntry) {
        let Some(id) = self.live.get(column).copied() else {
            return;
        };
        let version = self.nodes[id.0].version;
        if version == 0 || self.captured.contains_key(&(id, version)) {
            self.nodes[id.0].version += 1;
        }
        self.nodes[id.0].prepend(entry);
    }

    /// Start the node over at version 0, prepending `step`.
    fn restart(&mut self, id: NodeId, step: &StepRef) {
        self.captured.retain(|(node, _), _| *node != id);
        let node = &mut self.nodes[id.0];
        node.version = 0;
        node.prepend(HistoryEntry::Step(step.clone()));
    }

    /// Reference to `column`'s current state, creating a branch if one is owed.
    fn branch_if_necessary(&mut self, column: &str) -> Result<SourceRef, LineageError> {
        let id = self.id_of(column)?;
        let version = self.nodes[id.0].version;
        if version == 0 {
            return Ok(SourceRef::Live(column.to_string()));
        }
        if let Some(key) = self.captured.get(&(id, version)) {
            return Ok(SourceRef::Branch(key.clone()));
        }

        let node = &self.nodes[id.0];
        let copy = ColumnDirective {
            original_name: node.original_name.clone(),
            position: None,
            version,
            history: node.history.clone(),
        };
        let branch = self.alloc(copy);
        let key = BranchKey::new(column, version, branch);
        tracing::debug!(branch = %key, id = key.id, "lineage branch created");
        self.branches.insert(key.clone(), branch);
        self.captured.insert((id, version), key.clone());
        Ok(SourceRef::Branch(key))
    }

    fn rename(&mut self, step: &StepRef, old: &str, new: &str) -> Result<(), LineageError> {
        let id = self.id_of(old)?;
        if old != new && self.live.contains_key(new) {
            return Err(LineageError::ColumnExists {
                column: new.to_string(),
            });
        }
        self.live.remove(old);
        self.live.insert(new.to_string(), id);
        self.restart(id, step);
        Ok(())
    }

    fn set_columns(&mut self, step: &StepRef, names: &[String]) -> Result<(), LineageError> {
        let moves: Vec<(String, NodeId, String)> = self
            .live
            .iter()
            .filter_map(|(old, id)| {
                let position = self.nodes[id.0].position?;
                names.get(position).map(|new| (old.clone(), *id, new.clone()))
            })
            .collect();
        self.rekey(step, moves)
    }

    fn relabel(&mut self, step: &StepRef, rule: &ColumnRelabel) -> Result<(), LineageError> {
        let mut moves: Vec<(String, NodeId, String)> = self
            .live
            .iter()
            .filter_map(|(old, id)| {
                let new = rule.apply(old);
                (new != *old).then(|| (old.clone(), *id, new))
            })
            .collect();
        moves.sort_by(|a, b| a.0.cmp(&b.0));
        self.rekey(step, moves)
    }

    /// Move several nodes at once so that swapped or chained names do not collide mid-way.
    ///
    /// A target name may only be free or vacated by the same move.
    fn rekey(
        &mut self,
        step: &StepRef,
        moves: Vec<(String, NodeId, String)>,
    ) -> Result<(), LineageError> {
        let vacated: HashSet<&str> = moves.iter().map(|(old, _, _)| old.as_str()).collect();
        let mut targets = HashSet::new();
        for (_, _, new) in &moves {
            let taken = self.live.contains_key(new) && !vacated.contains(new.as_str());
            if taken || !targets.insert(new.as_str()) {
                return Err(LineageError::ColumnExists { column: new.clone() });
            }
        }

        for (old, _, _) in &moves {
            self.live.remove(old);
        }
        for (_, id, new) in moves {
            self.restart(id, step);
            self.live.insert(new, id);
        }
        Ok(())
    }

    fn drop_columns(&mut self, columns: &[String]) -> Result<(), LineageError> {
        let mut seen = HashSet::new();
        for column in columns {
            if !seen.insert(column.as_str()) || !self.live.contains_key(column) {
                return Err(LineageError::UnknownColumn {
                    column: column.clone(),
                });
            }
        }

        for column in columns {
            let Some(id) = self.live.remove(column) else {
                continue;
            };
            let Some(removed) = self.nodes[id.0].position else {
                continue;
            };
            let remaining: Vec<NodeId> = self.live.values().copied().collect();
            for other in remaining {
                if let Some(p) = self.nodes[other.0].position.as_mut() {
                    if *p > removed {
                        *p -= 1;
                    }
                }
            }
        }
        Ok(())
    }

    fn swap(&mut self, step: &StepRef, first: &str, second: &str) -> Result<(), LineageError> {
        let a = self.id_of(first)?;
        let b = self.id_of(second)?;
        self.live.insert(first.to_string(), b);
        self.live.insert(second.to_string(), a);
        for id in [a, b] {
            self.restart(id, step);
        }
        Ok(())
    }

    fn derive(
        &mut self,
        step: &StepRef,
        sources: &[String],
        destinations: &[String],
    ) -> Result<(), LineageError> {
        for source in sources {
            self.id_of(source)?;
        }

        let mut refs = BTreeMap::new();
        for source in sources {
            let reference = self.branch_if_necessary(source)?;
            refs.insert(source.clone(), reference);
        }
        for destination in destinations {
            self.ensure(destination);
            let meta = MetaStep {
                step: step.clone(),
                sources: refs.clone(),
            };
            self.insert(destination, HistoryEntry::Meta(meta));
        }
        Ok(())
    }
}
