use proptest::prelude::*;

use record_wrangler::lineage::{ColumnLineage, LineageEffect, RunConfig, StepRef};

const COLUMNS: [&str; 6] = ["a", "b", "c", "d", "e", "f"];

fn tracker() -> ColumnLineage {
    ColumnLineage::new(RunConfig::new("props", "ws"), COLUMNS)
}

fn step(line: usize) -> StepRef {
    StepRef::new(line, "test", format!("step {line}"))
}

proptest! {
    #[test]
    fn history_length_matches_mutation_count(
        targets in proptest::collection::vec(0usize..6, 0..40),
    ) {
        let mut lineage = tracker();
        for (line, idx) in targets.iter().enumerate() {
            let effect = LineageEffect::Mutate { column: COLUMNS[*idx].to_string() };
            lineage.apply(&step(line + 1), &effect).unwrap();
        }
        for (idx, name) in COLUMNS.iter().enumerate() {
            let expected = targets.iter().filter(|t| **t == idx).count();
            let node = lineage.get(name).unwrap();
            prop_assert_eq!(node.history().len(), expected);
            prop_assert_eq!(node.version(), u32::from(expected > 0));
        }
    }

    #[test]
    fn drop_keeps_remaining_positions_dense(mask in proptest::collection::vec(any::<bool>(), 6)) {
        let mut lineage = tracker();
        let doomed: Vec<String> = COLUMNS
            .iter()
            .zip(&mask)
            .filter(|(_, drop)| **drop)
            .map(|(c, _)| c.to_string())
            .collect();
        if !doomed.is_empty() {
            lineage.apply(&step(1), &LineageEffect::Drop { columns: doomed.clone() }).unwrap();
        }

        let survivors: Vec<&str> = COLUMNS
            .iter()
            .zip(&mask)
            .filter(|(_, drop)| !**drop)
            .map(|(c, _)| *c)
            .collect();
        prop_assert_eq!(lineage.columns(), survivors.clone());
        for (expected, name) in survivors.iter().enumerate() {
            prop_assert_eq!(lineage.get(name).unwrap().position(), Some(expected));
        }
    }

    #[test]
    fn failed_apply_leaves_tracker_unchanged(
        prefix in proptest::collection::vec(0usize..6, 0..10),
        known in proptest::collection::vec(0usize..6, 0..3),
    ) {
        let mut lineage = tracker();
        for (line, idx) in prefix.iter().enumerate() {
            let effect = LineageEffect::Mutate { column: COLUMNS[*idx].to_string() };
            lineage.apply(&step(line + 1), &effect).unwrap();
        }
        let before = lineage.snapshot();

        let mut sources: Vec<String> = known.iter().map(|i| COLUMNS[*i].to_string()).collect();
        sources.push("missing".to_string());
        let failing = [
            LineageEffect::Derive {
                sources: sources.clone(),
                destinations: vec!["out".to_string()],
            },
            LineageEffect::Drop { columns: sources.clone() },
            LineageEffect::Rename { old: "missing".to_string(), new: "x".to_string() },
            LineageEffect::Swap { first: COLUMNS[0].to_string(), second: "missing".to_string() },
            LineageEffect::Rename { old: COLUMNS[0].to_string(), new: COLUMNS[1].to_string() },
        ];
        for effect in &failing {
            prop_assert!(lineage.apply(&step(99), effect).is_err());
            prop_assert_eq!(&lineage.snapshot(), &before);
        }
    }

    #[test]
    fn identity_set_columns_resets_versions(
        targets in proptest::collection::vec(0usize..6, 0..30),
        merged in proptest::collection::vec(0usize..6, 0..3),
    ) {
        let mut lineage = tracker();
        for (line, idx) in targets.iter().enumerate() {
            let effect = LineageEffect::Mutate { column: COLUMNS[*idx].to_string() };
            lineage.apply(&step(line + 1), &effect).unwrap();
        }
        if !merged.is_empty() {
            let sources = merged.iter().map(|i| COLUMNS[*i].to_string()).collect();
            let effect = LineageEffect::Derive { sources, destinations: vec!["out".to_string()] };
            lineage.apply(&step(50), &effect).unwrap();
        }
        let before = lineage.snapshot();

        let names = COLUMNS.iter().map(|c| c.to_string()).collect();
        lineage.apply(&step(60), &LineageEffect::SetColumns { names }).unwrap();

        let after = lineage.snapshot();
        prop_assert_eq!(
            after.columns.keys().collect::<Vec<_>>(),
            before.columns.keys().collect::<Vec<_>>()
        );
        for name in COLUMNS {
            let node = lineage.get(name).unwrap();
            prop_assert_eq!(node.version(), 0);
            prop_assert_eq!(node.history().len(), before.columns[name].history().len() + 1);
            prop_assert_eq!(node.history()[0].step().text.as_str(), "step 60");
        }
        if let Some(out) = before.columns.get("out") {
            prop_assert_eq!(lineage.get("out").unwrap(), out);
        }
    }
}
