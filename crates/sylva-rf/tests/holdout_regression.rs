//! Hold-out accuracy regression tests for sylva-rf.
//!
//! A deterministic synthetic dataset guards against algorithmic changes that
//! degrade accuracy or break reproducibility of the three-way evaluation.

use std::collections::HashSet;

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tempfile::TempDir;

use sylva_rf::{HoldoutSplit, Hyperparameters, RandomForest, SplitCriterion};

/// 400 samples, 8 features, 3 classes.
///
/// Features 0-1 are informative (class * 2.0 + noise in [0, 1)); feature 2 is
/// a small-integer "category" loosely tied to the class; the rest are noise.
fn make_classification() -> (Vec<Vec<f64>>, Vec<usize>, Vec<String>) {
    let mut rng = ChaCha8Rng::seed_from_u64(17);
    let n_features = 8;
    let mut features = Vec::new();
    let mut labels = Vec::new();
    for i in 0..400 {
        let class = i % 3;
        labels.push(class);
        let row: Vec<f64> = (0..n_features)
            .map(|f| match f {
                0 | 1 => class as f64 * 2.0 + rng.r#gen::<f64>(),
                2 => ((class + rng.gen_range(0..2)) % 4) as f64,
                _ => rng.r#gen::<f64>() * 5.0,
            })
            .collect();
        features.push(row);
    }
    let names = (0..n_features).map(|f| format!("f{f}")).collect();
    (features, labels, names)
}

fn hyperparameters(criterion: SplitCriterion, max_depth: Option<usize>) -> Hyperparameters {
    Hyperparameters {
        n_estimators: 60,
        criterion,
        max_depth,
        min_samples_split: 4,
    }
}

#[test]
fn gini_holdout_accuracy_above_threshold() {
    let (features, labels, names) = make_classification();
    let config = hyperparameters(SplitCriterion::Gini, None).to_config(42).unwrap();
    let result = HoldoutSplit::default()
        .evaluate(&config, &features, &labels, &names)
        .unwrap();

    assert!(result.train_accuracy() > 0.95, "train {}", result.train_accuracy());
    assert!(result.valid_accuracy() > 0.85, "valid {}", result.valid_accuracy());
    assert!(result.test_accuracy() > 0.85, "test {}", result.test_accuracy());
}

#[test]
fn shallow_entropy_forest_still_generalizes() {
    let (features, labels, names) = make_classification();
    let config = hyperparameters(SplitCriterion::Entropy, Some(4))
        .to_config(42)
        .unwrap();
    let result = HoldoutSplit::default()
        .evaluate(&config, &features, &labels, &names)
        .unwrap();

    assert!(result.test_accuracy() > 0.8, "test {}", result.test_accuracy());
}

#[test]
fn repeated_runs_match_exactly() {
    let (features, labels, names) = make_classification();
    let config = hyperparameters(SplitCriterion::Gini, Some(8)).to_config(42).unwrap();
    let run = || {
        let r = HoldoutSplit::default()
            .evaluate(&config, &features, &labels, &names)
            .unwrap();
        [r.train_accuracy(), r.valid_accuracy(), r.test_accuracy()]
    };
    assert_eq!(run(), run());
}

#[test]
fn accuracies_do_not_depend_on_thread_count() {
    let (features, labels, names) = make_classification();
    let config = hyperparameters(SplitCriterion::Entropy, None).to_config(42).unwrap();
    let run_with = |threads: usize| {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .unwrap();
        pool.install(|| {
            let r = HoldoutSplit::default()
                .evaluate(&config, &features, &labels, &names)
                .unwrap();
            [r.train_accuracy(), r.valid_accuracy(), r.test_accuracy()]
        })
    };
    assert_eq!(run_with(1), run_with(4));
}

#[test]
fn informative_features_rank_first() {
    let (features, labels, names) = make_classification();
    let config = hyperparameters(SplitCriterion::Gini, None).to_config(42).unwrap();
    let result = HoldoutSplit::default()
        .evaluate(&config, &features, &labels, &names)
        .unwrap();

    let informative: HashSet<&str> = ["f0", "f1", "f2"].into_iter().collect();
    let top2: Vec<&str> = result
        .importances()
        .iter()
        .take(2)
        .map(|f| f.name.as_str())
        .collect();
    assert!(
        top2.iter().all(|n| informative.contains(n)),
        "top-2 features: {top2:?}"
    );
}

#[test]
fn reloaded_model_reproduces_test_accuracy() {
    let (features, labels, names) = make_classification();
    let config = hyperparameters(SplitCriterion::Gini, None).to_config(42).unwrap();
    let split = HoldoutSplit::default();
    let result = split.evaluate(&config, &features, &labels, &names).unwrap();

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("model.bin");
    result.forest().save(&path).unwrap();
    let loaded = RandomForest::load(&path).unwrap();

    let parts = split.split(&features, &labels).unwrap();
    let acc = loaded.score(parts.test.features(), parts.test.labels()).unwrap();
    assert!((acc - result.test_accuracy()).abs() < f64::EPSILON);
}
