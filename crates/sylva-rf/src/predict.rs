//! Prediction and scoring for the Random Forest ensemble.

use rayon::iter::{IndexedParallelIterator, IntoParallelIterator, ParallelIterator};

use crate::error::RfError;
use crate::forest::RandomForest;

/// Class probability distribution from a prediction.
#[derive(Debug, Clone)]
pub struct ClassDistribution {
    probs: Vec<f64>,
}

impl ClassDistribution {
    pub(crate) fn new(probs: Vec<f64>) -> Self {
        Self { probs }
    }

    /// Return the predicted class (argmax of probabilities, lowest index on ties).
    #[must_use]
    pub fn predicted_class(&self) -> usize {
        self.probs
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1).then(b.0.cmp(&a.0)))
            .map(|(idx, _)| idx)
            .unwrap_or(0)
    }

    /// Return the probability distribution as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.probs
    }
}

impl RandomForest {
    /// Predict the class label for a single sample.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::PredictionFeatureMismatch`] when `sample.len() != n_features`.
    pub fn predict(&self, sample: &[f64]) -> Result<usize, RfError> {
        Ok(self.predict_proba(sample)?.predicted_class())
    }

    /// Return the class probabilities averaged over all trees.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::PredictionFeatureMismatch`] when `sample.len() != n_features`.
    pub fn predict_proba(&self, sample: &[f64]) -> Result<ClassDistribution, RfError> {
        if sample.len() != self.n_features {
            return Err(RfError::PredictionFeatureMismatch {
                expected: self.n_features,
                got: sample.len(),
            });
        }

        let mut avg = vec![0.0f64; self.n_classes];
        for tree in &self.trees {
            for (acc, p) in avg.iter_mut().zip(tree.predict_proba(sample)?) {
                *acc += p;
            }
        }
        let n = self.trees.len() as f64;
        avg.iter_mut().for_each(|v| *v /= n);

        Ok(ClassDistribution::new(avg))
    }

    /// Predict class labels for a batch of samples in parallel.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::PredictionFeatureMismatch`] if any sample has the wrong feature count.
    pub fn predict_batch(&self, features: &[Vec<f64>]) -> Result<Vec<usize>, RfError> {
        features
            .into_par_iter()
            .map(|sample| self.predict(sample))
            .collect()
    }

    /// Mean accuracy on the given samples: the fraction of correct predictions.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`RfError::EmptyDataset`] | no samples |
    /// | [`RfError::LabelCountMismatch`] | `labels.len() != features.len()` |
    /// | [`RfError::PredictionFeatureMismatch`] | a sample has the wrong feature count |
    pub fn score(&self, features: &[Vec<f64>], labels: &[usize]) -> Result<f64, RfError> {
        if features.is_empty() {
            return Err(RfError::EmptyDataset);
        }
        if labels.len() != features.len() {
            return Err(RfError::LabelCountMismatch {
                samples: features.len(),
                labels: labels.len(),
            });
        }
        let correct = features
            .into_par_iter()
            .zip(labels)
            .map(|(sample, &label)| self.predict(sample).map(|p| usize::from(p == label)))
            .sum::<Result<usize, RfError>>()?;
        Ok(correct as f64 / labels.len() as f64)
    }

    /// Return the number of features this forest was trained on.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Return the number of classes seen during training.
    #[must_use]
    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    /// Return the number of trees in the ensemble.
    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Return the feature names.
    #[must_use]
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }
}

#[cfg(test)]
mod tests {
    use crate::{RandomForest, RandomForestConfig, RfError};

    fn fitted() -> (RandomForest, Vec<Vec<f64>>, Vec<usize>) {
        let features: Vec<Vec<f64>> = (0..40).map(|i| vec![i as f64, (i % 3) as f64]).collect();
        let labels: Vec<usize> = (0..40).map(|i| usize::from(i >= 20)).collect();
        let names = vec!["a".to_string(), "b".to_string()];
        let forest = RandomForestConfig::new(15)
            .unwrap()
            .fit(&features, &labels, &names)
            .unwrap()
            .into_forest();
        (forest, features, labels)
    }

    #[test]
    fn score_is_a_fraction() {
        let (forest, features, labels) = fitted();
        let acc = forest.score(&features, &labels).unwrap();
        assert!((0.0..=1.0).contains(&acc));
        assert!(acc > 0.9, "accuracy = {acc}");
    }

    #[test]
    fn score_matches_manual_count() {
        let (forest, features, labels) = fitted();
        // Flip every label so the manual count differs from a perfect score.
        let flipped: Vec<usize> = labels.iter().map(|&l| 1 - l).collect();
        let preds = forest.predict_batch(&features).unwrap();
        let manual = preds.iter().zip(&flipped).filter(|(p, l)| p == l).count() as f64
            / flipped.len() as f64;
        let acc = forest.score(&features, &flipped).unwrap();
        assert!((acc - manual).abs() < f64::EPSILON);
    }

    #[test]
    fn score_rejects_empty_and_misaligned() {
        let (forest, features, _) = fitted();
        assert!(matches!(forest.score(&[], &[]), Err(RfError::EmptyDataset)));
        assert!(matches!(
            forest.score(&features, &[0, 1]),
            Err(RfError::LabelCountMismatch { .. })
        ));
    }

    #[test]
    fn proba_is_a_distribution() {
        let (forest, features, _) = fitted();
        for sample in &features {
            let dist = forest.predict_proba(sample).unwrap();
            let sum: f64 = dist.as_slice().iter().sum();
            assert!((sum - 1.0).abs() < 1e-9);
            assert_eq!(dist.predicted_class(), forest.predict(sample).unwrap());
        }
    }

    #[test]
    fn wrong_feature_count() {
        let (forest, _, _) = fitted();
        assert!(matches!(
            forest.predict(&[1.0]),
            Err(RfError::PredictionFeatureMismatch { expected: 2, got: 1 })
        ));
    }
}
