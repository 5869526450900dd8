//! Property-based and end-to-end tests for the model registry.

use proptest::prelude::*;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;

use modelvault_registry::{Metrics, ModelRegistry, RegistryLayout, RunId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Candidate {
    name: String,
    weights: Vec<f32>,
}

fn candidate(name: &str) -> Candidate {
    Candidate {
        name: name.to_string(),
        weights: vec![0.25, -1.5, 3.0],
    }
}

fn run(i: usize) -> RunId {
    RunId::parse(&format!("run_{i:04}")).unwrap()
}

fn accuracy(value: f64) -> Metrics {
    [("accuracy", value)].into_iter().collect()
}

fn open(dir: &TempDir, run_id: RunId) -> ModelRegistry {
    ModelRegistry::open(RegistryLayout::under(dir.path()), run_id).unwrap()
}

// --- Registry lifecycle properties ---

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn promotion_tracks_running_maximum(steps in prop::collection::vec(0u8..5, 1..8)) {
        let dir = TempDir::new().unwrap();
        let mut registry = open(&dir, run(0));

        let mut best: Option<(usize, f64)> = None;
        for (i, step) in steps.iter().enumerate() {
            let score = f64::from(*step) / 4.0;
            registry.begin_run(run(i));
            let promoted = registry
                .compare_and_update_best(&candidate(&format!("c{i}")), &accuracy(score), "accuracy", "model", "metrics")
                .unwrap();

            let should_promote = match best {
                None => true,
                Some((_, current)) => score > current,
            };
            prop_assert_eq!(promoted, should_promote);
            if should_promote {
                best = Some((i, score));
            }
        }

        let (winner, max_score) = best.unwrap();
        let recorded = registry.best_version().unwrap().unwrap();
        prop_assert_eq!(recorded.run_id, run(winner));
        prop_assert_eq!(recorded.metrics.score("accuracy"), max_score);
        let loaded: Candidate = registry.load_best_model().unwrap().unwrap();
        prop_assert_eq!(loaded, candidate(&format!("c{winner}")));
    }

    #[test]
    fn history_is_append_only(count in 1usize..10) {
        let dir = TempDir::new().unwrap();
        let mut registry = open(&dir, run(0));

        for i in 0..count {
            registry.begin_run(run(i));
            registry.save_model_default(&candidate("m"), &accuracy(0.5)).unwrap();
        }

        prop_assert_eq!(registry.list_versions().unwrap().len(), count);
    }
}

// --- Scenario tests ---

#[test]
fn reopening_never_deletes_versions() {
    let dir = TempDir::new().unwrap();
    let registry = open(&dir, run(1));
    registry
        .compare_and_update_best_default(&candidate("a"), &accuracy(0.8))
        .unwrap();
    drop(registry);

    let reopened = open(&dir, run(2));
    let versions = reopened.list_versions().unwrap();
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0].run_id, run(1));
    assert_eq!(
        reopened.load_best_model::<Candidate>().unwrap(),
        Some(candidate("a"))
    );
}

#[test]
fn documented_promotion_scenario() {
    let dir = TempDir::new().unwrap();
    let mut registry = open(&dir, run(1));
    assert_eq!(registry.load_best_model::<Candidate>().unwrap(), None);

    registry
        .save_model(&candidate("A"), &accuracy(0.8), "model", "metrics")
        .unwrap();

    registry.begin_run(run(2));
    assert!(registry
        .compare_and_update_best(&candidate("B"), &accuracy(0.9), "accuracy", "model", "metrics")
        .unwrap());
    assert_eq!(
        registry.load_best_model::<Candidate>().unwrap(),
        Some(candidate("B"))
    );

    registry.begin_run(run(3));
    assert!(!registry
        .compare_and_update_best(&candidate("C"), &accuracy(0.5), "accuracy", "model", "metrics")
        .unwrap());
    assert_eq!(
        registry.load_best_model::<Candidate>().unwrap(),
        Some(candidate("B"))
    );
}

#[test]
fn best_folder_mirrors_version_folder() {
    let dir = TempDir::new().unwrap();
    let registry = open(&dir, run(7));
    let version = registry
        .save_model(&candidate("x"), &accuracy(0.4), "clf", "scores")
        .unwrap();
    registry
        .compare_and_update_best(&candidate("x"), &accuracy(0.4), "accuracy", "clf", "scores")
        .unwrap();

    let promoted = registry.best_root().join("run_0007");
    for file in ["clf.model", "scores.json"] {
        assert_eq!(
            std::fs::read(version.join(file)).unwrap(),
            std::fs::read(promoted.join(file)).unwrap(),
            "{file} differs"
        );
    }
}

#[test]
fn custom_layout_from_config() {
    let dir = TempDir::new().unwrap();
    let config = modelvault_core::RegistryConfig {
        versions_dir: "artifacts/history".into(),
        best_dir: "artifacts/serving".into(),
        metric_key: "f1".into(),
        ..Default::default()
    };
    let registry = ModelRegistry::from_config(&config, dir.path()).unwrap();

    assert!(registry.versions_root().ends_with("artifacts/history"));
    assert!(registry.best_root().ends_with("artifacts/serving"));
    let f1: Metrics = [("f1", 0.3)].into_iter().collect();
    assert!(registry
        .compare_and_update_best_default(&candidate("f"), &f1)
        .unwrap());
    assert_eq!(
        registry.best_version().unwrap().unwrap().metrics.score("f1"),
        0.3
    );
}

#[test]
fn overlapping_roots_are_refused_before_any_promotion() {
    let dir = TempDir::new().unwrap();
    let config = modelvault_core::RegistryConfig {
        versions_dir: "serving/history".into(),
        best_dir: "serving".into(),
        ..Default::default()
    };
    assert!(config.validate().is_ok());

    let err = ModelRegistry::from_config(&config, dir.path()).unwrap_err();
    assert!(matches!(
        err,
        modelvault_registry::RegistryError::OverlappingRoots { .. }
    ));
}
