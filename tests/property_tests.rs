//! Property-based tests for trueno-runs
//!
//! - Test ordering invariants of recency queries
//! - Test projection shape under heterogeneous records
//! - Test artifact filename conventions
//! - Run with ProptestConfig::with_cases(64)

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use serde_json::{json, Value};
use trueno_runs::store::{MemoryDocumentStore, MemoryObjectStore, ObjectStream};
use trueno_runs::{Artifact, ExperimentLoader, OnMissing, ProjectOptions, QuerySet};

// ============================================================================
// Property Test Generators (Strategies)
// ============================================================================

/// Start offsets in minutes; duplicates allowed
fn arb_start_offsets() -> impl Strategy<Value = Vec<i64>> {
    proptest::collection::vec(0i64..100_000, 1..20)
}

/// Configs that may or may not carry `config.value.param1`
fn arb_configs() -> impl Strategy<Value = Vec<Option<i64>>> {
    proptest::collection::vec(proptest::option::of(-1000i64..1000), 0..16)
}

fn loader_over(docs: Vec<Value>) -> ExperimentLoader {
    let runs = Arc::new(MemoryDocumentStore::new());
    for doc in docs {
        runs.insert_run(doc);
    }
    ExperimentLoader::builder(runs, Arc::new(MemoryObjectStore::new()))
        .build()
        .unwrap()
}

fn start_time(offset_minutes: i64) -> String {
    let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    (base + Duration::minutes(offset_minutes)).to_rfc3339()
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: find_latest returns min(n, total) runs, newest first
    #[test]
    fn prop_find_latest_sorted_descending(offsets in arb_start_offsets(), n in 2usize..25) {
        let docs = offsets
            .iter()
            .map(|o| json!({"experiment": {"name": "p"}, "config": {}, "start_time": start_time(*o)}))
            .collect();
        let loader = loader_over(docs);

        let latest = loader.find_latest(n, "start_time").unwrap().into_query_set();
        prop_assert_eq!(latest.len(), n.min(offsets.len()));

        let times: Vec<_> = latest.iter().map(|e| e.start_time().unwrap()).collect();
        for pair in times.windows(2) {
            prop_assert!(pair[0] >= pair[1]);
        }
        let newest = offsets.iter().max().copied().unwrap();
        prop_assert_eq!(times[0], Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(newest));
    }

    /// Property: ignore-projection has one cell per run, null exactly where the path is missing
    #[test]
    fn prop_ignore_projection_shape(configs in arb_configs()) {
        let docs = configs
            .iter()
            .map(|c| match c {
                Some(v) => json!({"config": {"value": {"param1": v}}}),
                None => json!({"config": {"value": {"param2": 0}}}),
            })
            .collect();
        let set: QuerySet = loader_over(docs).find_all().unwrap();

        let table = set
            .project_with(["config.value.param1"], ProjectOptions::default().on_missing(OnMissing::Ignore))
            .unwrap();
        let column = table.column("param1").unwrap();
        prop_assert_eq!(column.len(), configs.len());
        for (cell, expected) in column.iter().zip(&configs) {
            match expected {
                Some(v) => {
                    prop_assert_eq!(cell, &json!(v));
                }
                None => {
                    prop_assert!(cell.is_null());
                }
            }
        }

        // Raise fails iff some run lacks the path
        let raised = set.project(["config.value.param1"]);
        prop_assert_eq!(raised.is_err(), configs.iter().any(Option::is_none));
    }

    /// Property: saved filenames are `{parent}_{leaf}` and end with the extension
    #[test]
    fn prop_filename_convention(
        parent in "[a-z0-9]{1,8}",
        leaf in "[a-f_]{1,12}",
        with_ext in any::<bool>(),
    ) {
        let stored_leaf = if with_ext { format!("{leaf}.png") } else { leaf.clone() };
        let stream = ObjectStream::new(
            format!("artifact://runs/{parent}/{stored_leaf}"),
            None,
            Arc::from(vec![0u8]),
        );
        let artifact = Artifact::from_content_type("img", stream, Some("image/png"));
        let filename = artifact.filename();
        let prefix = format!("{parent}_{leaf}");

        prop_assert!(filename.starts_with(&prefix));
        prop_assert!(filename.ends_with(".png"));
        prop_assert!(!filename.ends_with(".png.png"));
    }
}
