//! Seeded train/validation/test hold-out evaluation.

use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, instrument};

use crate::config::RandomForestConfig;
use crate::confusion::ConfusionMatrix;
use crate::error::RfError;
use crate::forest::{RandomForest, validate_training_data};
use crate::importance::RankedFeature;

/// Hold-out split configuration.
///
/// The test partition takes `test_ratio` of all samples. The validation
/// partition takes `valid_ratio` of the samples left after the test draw.
/// Both draws share one seeded generator, so a given seed always yields the
/// same three partitions.
#[derive(Debug, Clone)]
pub struct HoldoutSplit {
    test_ratio: f64,
    valid_ratio: f64,
    seed: u64,
}

/// One partition of a labeled dataset.
#[derive(Debug, Clone)]
pub struct Partition {
    features: Vec<Vec<f64>>,
    labels: Vec<usize>,
}

impl Partition {
    fn gather(features: &[Vec<f64>], labels: &[usize], indices: &[usize]) -> Self {
        Self {
            features: indices.iter().map(|&i| features[i].clone()).collect(),
            labels: indices.iter().map(|&i| labels[i]).collect(),
        }
    }

    /// Feature rows of this partition.
    #[must_use]
    pub fn features(&self) -> &[Vec<f64>] {
        &self.features
    }

    /// Labels aligned with [`features`](Self::features).
    #[must_use]
    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    /// Number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Whether the partition holds no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// The three disjoint partitions produced by [`HoldoutSplit::split`].
#[derive(Debug, Clone)]
pub struct Partitions {
    /// Samples the forest is fitted on.
    pub train: Partition,
    /// Samples used for the validation accuracy.
    pub valid: Partition,
    /// Samples used for the test accuracy.
    pub test: Partition,
}

/// Outcome of a hold-out evaluation.
#[derive(Debug)]
pub struct HoldoutResult {
    train_accuracy: f64,
    valid_accuracy: f64,
    test_accuracy: f64,
    n_train: usize,
    n_valid: usize,
    n_test: usize,
    confusion_matrix: ConfusionMatrix,
    importances: Vec<RankedFeature>,
    forest: RandomForest,
}

impl Default for HoldoutSplit {
    fn default() -> Self {
        Self {
            test_ratio: 0.33,
            valid_ratio: 0.33,
            seed: 42,
        }
    }
}

fn check_ratio(which: &'static str, ratio: f64) -> Result<f64, RfError> {
    if ratio > 0.0 && ratio < 1.0 {
        Ok(ratio)
    } else {
        Err(RfError::InvalidHoldoutRatio { which, ratio })
    }
}

fn holdout_size(ratio: f64, n: usize) -> usize {
    (ratio * n as f64).ceil() as usize
}

impl HoldoutSplit {
    /// Create a hold-out split with the given ratios and seed 42.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::InvalidHoldoutRatio`] if either ratio is outside
    /// the open interval (0, 1) or is NaN.
    pub fn new(test_ratio: f64, valid_ratio: f64) -> Result<Self, RfError> {
        Ok(Self {
            test_ratio: check_ratio("test", test_ratio)?,
            valid_ratio: check_ratio("validation", valid_ratio)?,
            seed: 42,
        })
    }

    /// Set the seed used to shuffle samples before each draw.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Partition the samples into train, validation and test sets.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`RfError::EmptyDataset`] | no samples |
    /// | [`RfError::LabelCountMismatch`] | `labels.len() != features.len()` |
    /// | [`RfError::EmptyPartition`] | a partition would receive no samples |
    pub fn split(&self, features: &[Vec<f64>], labels: &[usize]) -> Result<Partitions, RfError> {
        if features.is_empty() {
            return Err(RfError::EmptyDataset);
        }
        if labels.len() != features.len() {
            return Err(RfError::LabelCountMismatch {
                samples: features.len(),
                labels: labels.len(),
            });
        }

        let n_samples = features.len();
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);

        let mut order: Vec<usize> = (0..n_samples).collect();
        order.shuffle(&mut rng);
        let n_test = holdout_size(self.test_ratio, n_samples);
        if n_test >= n_samples {
            return Err(RfError::EmptyPartition {
                partition: "training",
                n_samples,
            });
        }
        let (test_idx, rest) = order.split_at(n_test);

        let mut rest = rest.to_vec();
        rest.shuffle(&mut rng);
        let n_valid = holdout_size(self.valid_ratio, rest.len());
        if n_valid >= rest.len() {
            return Err(RfError::EmptyPartition {
                partition: "training",
                n_samples,
            });
        }
        let (valid_idx, train_idx) = rest.split_at(n_valid);

        debug!(
            n_train = train_idx.len(),
            n_valid = valid_idx.len(),
            n_test = test_idx.len(),
            test_ratio = self.test_ratio,
            valid_ratio = self.valid_ratio,
            seed = self.seed,
            "hold-out partitions drawn"
        );

        Ok(Partitions {
            train: Partition::gather(features, labels, train_idx),
            valid: Partition::gather(features, labels, valid_idx),
            test: Partition::gather(features, labels, test_idx),
        })
    }

    /// Fit `config` on the training partition and score all three partitions.
    ///
    /// The test confusion matrix spans every label present in `labels`,
    /// even classes the training partition never saw.
    ///
    /// # Errors
    ///
    /// Propagates errors from data validation, [`split`](Self::split),
    /// training and scoring.
    #[instrument(skip_all, fields(n_samples = features.len(), seed = self.seed))]
    pub fn evaluate(
        &self,
        config: &RandomForestConfig,
        features: &[Vec<f64>],
        labels: &[usize],
        feature_names: &[String],
    ) -> Result<HoldoutResult, RfError> {
        validate_training_data(features, labels)?;
        let n_classes = labels.iter().max().copied().unwrap_or(0) + 1;
        let Partitions { train, valid, test } = self.split(features, labels)?;

        let (forest, importances, _) = config
            .fit(train.features(), train.labels(), feature_names)?
            .into_parts();

        let train_accuracy = forest.score(train.features(), train.labels())?;
        let valid_accuracy = forest.score(valid.features(), valid.labels())?;
        let test_accuracy = forest.score(test.features(), test.labels())?;

        let test_predictions = forest.predict_batch(test.features())?;
        let confusion_matrix =
            ConfusionMatrix::from_labels(test.labels(), &test_predictions, n_classes)?;
        for m in confusion_matrix.class_metrics() {
            debug!(
                class = m.class,
                precision = m.precision,
                recall = m.recall,
                f1 = m.f1,
                support = m.support,
                "test class metrics"
            );
        }

        info!(
            train_accuracy,
            valid_accuracy, test_accuracy, "hold-out evaluation complete"
        );

        Ok(HoldoutResult {
            train_accuracy,
            valid_accuracy,
            test_accuracy,
            n_train: train.len(),
            n_valid: valid.len(),
            n_test: test.len(),
            confusion_matrix,
            importances,
            forest,
        })
    }
}

impl HoldoutResult {
    /// Accuracy on the training partition.
    #[must_use]
    pub fn train_accuracy(&self) -> f64 {
        self.train_accuracy
    }

    /// Accuracy on the validation partition.
    #[must_use]
    pub fn valid_accuracy(&self) -> f64 {
        self.valid_accuracy
    }

    /// Accuracy on the test partition.
    #[must_use]
    pub fn test_accuracy(&self) -> f64 {
        self.test_accuracy
    }

    /// Partition sizes as `(train, validation, test)`.
    #[must_use]
    pub fn partition_sizes(&self) -> (usize, usize, usize) {
        (self.n_train, self.n_valid, self.n_test)
    }

    /// Confusion matrix on the test partition.
    #[must_use]
    pub fn confusion_matrix(&self) -> &ConfusionMatrix {
        &self.confusion_matrix
    }

    /// Feature importances of the fitted forest, ranked.
    #[must_use]
    pub fn importances(&self) -> &[RankedFeature] {
        &self.importances
    }

    /// The forest fitted on the training partition.
    #[must_use]
    pub fn forest(&self) -> &RandomForest {
        &self.forest
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::HoldoutSplit;
    use crate::{RandomForestConfig, RfError};

    /// Two classes on a line with a few flipped labels, plus a distractor column.
    fn make_data(n: usize) -> (Vec<Vec<f64>>, Vec<usize>, Vec<String>) {
        let features: Vec<Vec<f64>> = (0..n).map(|i| vec![i as f64, (i % 5) as f64]).collect();
        let labels: Vec<usize> = (0..n)
            .map(|i| usize::from((i >= n / 2) != (i % 11 == 0)))
            .collect();
        let names = vec!["x".to_string(), "noise".to_string()];
        (features, labels, names)
    }

    #[test]
    fn partition_sizes_follow_ratios() {
        let (features, labels, _) = make_data(100);
        let parts = HoldoutSplit::default().split(&features, &labels).unwrap();
        // ceil(0.33 * 100) = 33, ceil(0.33 * 67) = 23
        assert_eq!(parts.test.len(), 33);
        assert_eq!(parts.valid.len(), 23);
        assert_eq!(parts.train.len(), 44);
    }

    #[test]
    fn partitions_are_disjoint_and_cover_all_samples() {
        let (features, labels, _) = make_data(50);
        let parts = HoldoutSplit::new(0.2, 0.25).unwrap().split(&features, &labels).unwrap();
        let mut seen = HashSet::new();
        for p in [&parts.train, &parts.valid, &parts.test] {
            for row in p.features() {
                // First column is unique per sample.
                assert!(seen.insert(row[0].to_bits()));
            }
        }
        assert_eq!(seen.len(), 50);
    }

    #[test]
    fn split_depends_on_seed_only() {
        let (features, labels, _) = make_data(60);
        let a = HoldoutSplit::default().with_seed(7).split(&features, &labels).unwrap();
        let b = HoldoutSplit::default().with_seed(7).split(&features, &labels).unwrap();
        let c = HoldoutSplit::default().with_seed(8).split(&features, &labels).unwrap();
        assert_eq!(a.test.features(), b.test.features());
        assert_eq!(a.valid.labels(), b.valid.labels());
        assert_ne!(a.test.features(), c.test.features());
    }

    #[test]
    fn accuracies_are_fractions() {
        let (features, labels, names) = make_data(120);
        let config = RandomForestConfig::new(10).unwrap();
        let result = HoldoutSplit::default()
            .evaluate(&config, &features, &labels, &names)
            .unwrap();
        for acc in [
            result.train_accuracy(),
            result.valid_accuracy(),
            result.test_accuracy(),
        ] {
            assert!((0.0..=1.0).contains(&acc), "accuracy = {acc}");
        }
        assert!(result.train_accuracy() > 0.8);
        assert_eq!(result.partition_sizes(), (53, 27, 40));
        assert_eq!(result.confusion_matrix().n_classes(), 2);
        assert!(
            (result.confusion_matrix().accuracy() - result.test_accuracy()).abs() < 1e-12
        );
    }

    #[test]
    fn evaluation_is_deterministic() {
        let (features, labels, names) = make_data(80);
        let config = RandomForestConfig::new(8).unwrap().with_seed(3);
        let run = || {
            let r = HoldoutSplit::default()
                .evaluate(&config, &features, &labels, &names)
                .unwrap();
            (r.train_accuracy(), r.valid_accuracy(), r.test_accuracy())
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn invalid_ratios_rejected() {
        for (t, v) in [(0.0, 0.3), (1.0, 0.3), (0.3, 0.0), (0.3, 1.5), (f64::NAN, 0.3)] {
            let err = HoldoutSplit::new(t, v).unwrap_err();
            assert!(matches!(err, RfError::InvalidHoldoutRatio { .. }), "({t}, {v})");
        }
    }

    #[test]
    fn tiny_dataset_leaves_training_empty() {
        let features = vec![vec![1.0], vec![2.0]];
        let labels = vec![0, 1];
        let err = HoldoutSplit::default().split(&features, &labels).unwrap_err();
        assert!(matches!(
            err,
            RfError::EmptyPartition { partition: "training", n_samples: 2 }
        ));
    }

    #[test]
    fn empty_input_rejected() {
        let err = HoldoutSplit::default().split(&[], &[]).unwrap_err();
        assert!(matches!(err, RfError::EmptyDataset));
    }
}
