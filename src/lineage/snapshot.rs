use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{BranchKey, ColumnDirective, ColumnLineage};

/// Point-in-time, serialisable view of a [`ColumnLineage`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineageSnapshot {
    pub program: String,
    pub workspace: String,
    pub started_at: DateTime<Utc>,
    /// Live columns by name.
    pub columns: BTreeMap<String, ColumnDirective>,
    /// Branch snapshots, ordered by key.
    pub branches: Vec<BranchSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BranchSnapshot {
    pub key: BranchKey,
    pub column: ColumnDirective,
}

impl LineageSnapshot {
    pub(super) fn capture(lineage: &ColumnLineage) -> Self {
        let run = lineage.run_config();
        let columns = lineage
            .live_nodes()
            .map(|(name, node)| (name.to_string(), node.clone()))
            .collect();
        let mut branches: Vec<BranchSnapshot> = lineage
            .branch_nodes()
            .map(|(key, node)| BranchSnapshot {
                key: key.clone(),
                column: node.clone(),
            })
            .collect();
        branches.sort_by(|a, b| a.key.cmp(&b.key));

        Self {
            program: run.program.clone(),
            workspace: run.workspace.clone(),
            started_at: run.started_at,
            columns,
            branches,
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDirective> {
        self.columns.get(name)
    }

    pub fn branch(&self, key: &BranchKey) -> Option<&ColumnDirective> {
        self.branches
            .iter()
            .find(|b| &b.key == key)
            .map(|b| &b.column)
    }

    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}

/// Receives the final lineage of every run.
pub trait LineageObserver: Send + Sync {
    fn on_lineage(&self, snapshot: &LineageSnapshot);
}

#[cfg(test)]
mod tests {
    use crate::lineage::{ColumnLineage, LineageEffect, RunConfig, StepRef};

    #[test]
    fn snapshot_serialises_columns_history_and_branches() {
        let mut lineage = ColumnLineage::new(RunConfig::new("wrangler", "ws"), ["a", "b"]);
        let trim = StepRef::new(1, "trim", "trim a");
        lineage
            .apply(&trim, &LineageEffect::Mutate { column: "a".into() })
            .unwrap();
        let merge = StepRef::new(2, "merge", "merge a b c ,");
        lineage
            .apply(
                &merge,
                &LineageEffect::Derive {
                    sources: vec!["a".into(), "b".into()],
                    destinations: vec!["c".into()],
                },
            )
            .unwrap();

        let snapshot = lineage.snapshot();
        assert_eq!(snapshot.workspace, "ws");
        assert_eq!(snapshot.columns.len(), 3);
        assert_eq!(snapshot.branches.len(), 1);

        let json = snapshot.to_json().unwrap();
        assert_eq!(json["program"], "wrangler");
        assert_eq!(json["columns"]["a"]["original_name"], "a");
        assert_eq!(json["columns"]["a"]["version"], 1);
        assert_eq!(json["columns"]["a"]["history"][0]["step"]["text"], "trim a");
        assert!(json["columns"]["c"]["original_name"].is_null());
        let sources = &json["columns"]["c"]["history"][0]["meta"]["sources"];
        assert_eq!(sources["a"]["branch"]["column"], "a");
        assert_eq!(sources["a"]["branch"]["version"], 1);
        assert_eq!(sources["b"]["live"], "b");
        assert_eq!(json["branches"][0]["key"]["column"], "a");
    }
}
