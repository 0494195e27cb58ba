use std::fmt;
use std::str::FromStr;

use rand::Rng;

use crate::error::RfError;
use crate::node::{FeatureIndex, Impurity};

/// Criterion for measuring the quality of a split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitCriterion {
    /// Gini impurity: 1 - Σ(p_i²)
    Gini,
    /// Information entropy: -Σ(p_i · ln(p_i))
    Entropy,
}

impl SplitCriterion {
    /// Compute the impurity of a node from its class counts.
    ///
    /// Returns [`Impurity::new(0.0)`] when `n_samples` is zero (pure node).
    #[must_use]
    pub fn impurity(&self, class_counts: &[usize], n_samples: usize) -> Impurity {
        if n_samples == 0 {
            return Impurity::new(0.0);
        }
        let n = n_samples as f64;
        let value = match self {
            SplitCriterion::Gini => {
                let sum_sq: f64 = class_counts
                    .iter()
                    .map(|&c| {
                        let p = c as f64 / n;
                        p * p
                    })
                    .sum();
                1.0 - sum_sq
            }
            SplitCriterion::Entropy => {
                -class_counts
                    .iter()
                    .filter(|&&c| c > 0)
                    .map(|&c| {
                        let p = c as f64 / n;
                        p * p.ln()
                    })
                    .sum::<f64>()
            }
        };
        Impurity::new(value)
    }
}

impl FromStr for SplitCriterion {
    type Err = RfError;

    /// Parse a criterion name as written in search results.
    ///
    /// `log_loss` is accepted as an alias of `entropy`; both grow the same tree.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gini" => Ok(SplitCriterion::Gini),
            "entropy" | "log_loss" => Ok(SplitCriterion::Entropy),
            _ => Err(RfError::UnknownCriterion {
                name: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for SplitCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SplitCriterion::Gini => f.write_str("gini"),
            SplitCriterion::Entropy => f.write_str("entropy"),
        }
    }
}

/// Result of finding the best split for a node.
#[derive(Debug, Clone)]
pub(crate) struct SplitResult {
    pub(crate) feature: FeatureIndex,
    /// Samples with `value <= threshold` go left.
    pub(crate) threshold: f64,
    /// Weighted impurity decrease from this split (MDI formula).
    pub(crate) impurity_decrease: f64,
    pub(crate) left_indices: Vec<usize>,
    pub(crate) right_indices: Vec<usize>,
}

/// Find the best split among a random subset of features.
///
/// Draws features in random order until `max_features` non-constant ones
/// have been scanned. Each scan sorts the `(value, label)` pairs and walks
/// left-to-right with incremental class counts, keeping the globally best
/// split by weighted impurity decrease.
///
/// Returns `None` when no valid split exists (all values identical,
/// or split would violate `min_samples_leaf`).
///
/// `features` is column-major: `features[feature_idx][sample_idx]`.
#[allow(clippy::too_many_arguments)]
pub(crate) fn find_best_split(
    features: &[Vec<f64>],
    labels: &[usize],
    sample_indices: &[usize],
    n_classes: usize,
    criterion: SplitCriterion,
    max_features: usize,
    min_samples_leaf: usize,
    rng: &mut impl Rng,
) -> Option<SplitResult> {
    let n_features = features.len();
    let n_samples = sample_indices.len();

    if n_samples < 2 || n_features == 0 {
        return None;
    }

    let mut parent_counts = vec![0usize; n_classes];
    for &si in sample_indices {
        parent_counts[labels[si]] += 1;
    }
    let parent_impurity = criterion.impurity(&parent_counts, n_samples);

    let mut feature_order: Vec<usize> = (0..n_features).collect();
    let mut best_decrease = f64::NEG_INFINITY;
    let mut best: Option<(FeatureIndex, f64)> = None;
    let mut n_visited = 0usize;

    // Lazy Fisher-Yates over the features. Features that are constant within
    // the node do not count towards `max_features`, so a node is only left
    // unsplit when every feature is constant or blocked by `min_samples_leaf`.
    for i in 0..n_features {
        if n_visited >= max_features {
            break;
        }
        let j = rng.gen_range(i..n_features);
        feature_order.swap(i, j);
        let feat_idx = feature_order[i];
        let feat_col = &features[feat_idx];

        let mut sorted: Vec<(f64, usize)> = sample_indices
            .iter()
            .map(|&si| (feat_col[si], si))
            .collect();
        sorted.sort_unstable_by(|a, b| a.0.total_cmp(&b.0));

        if sorted[0].0 == sorted[n_samples - 1].0 {
            continue;
        }
        n_visited += 1;

        let mut left_counts = vec![0usize; n_classes];
        let mut right_counts = parent_counts.clone();

        for pos in 0..(n_samples - 1) {
            let (val_i, si) = sorted[pos];
            let class_i = labels[si];
            left_counts[class_i] += 1;
            right_counts[class_i] -= 1;

            let n_left = pos + 1;
            let n_right = n_samples - n_left;

            let val_next = sorted[pos + 1].0;
            if val_i == val_next {
                continue;
            }
            if n_left < min_samples_leaf || n_right < min_samples_leaf {
                continue;
            }

            let left_impurity = criterion.impurity(&left_counts, n_left);
            let right_impurity = criterion.impurity(&right_counts, n_right);

            let decrease = (n_samples as f64) * parent_impurity.value()
                - (n_left as f64) * left_impurity.value()
                - (n_right as f64) * right_impurity.value();

            if decrease > best_decrease {
                best_decrease = decrease;
                best = Some((FeatureIndex::new(feat_idx), (val_i + val_next) / 2.0));
            }
        }
    }

    let (best_feature, threshold) = best?;

    let feat_col = &features[best_feature.index()];
    let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = sample_indices
        .iter()
        .partition(|&&si| feat_col[si] <= threshold);

    Some(SplitResult {
        feature: best_feature,
        threshold,
        impurity_decrease: best_decrease,
        left_indices,
        right_indices,
    })
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::{SplitCriterion, find_best_split};
    use crate::RfError;

    #[test]
    fn gini_pure() {
        let imp = SplitCriterion::Gini.impurity(&[10, 0, 0], 10);
        assert!((imp.value() - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn gini_binary_balanced() {
        let imp = SplitCriterion::Gini.impurity(&[5, 5], 10);
        assert!((imp.value() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn entropy_binary_balanced() {
        let imp = SplitCriterion::Entropy.impurity(&[5, 5], 10);
        assert!((imp.value() - 2.0_f64.ln()).abs() < 1e-10);
    }

    #[test]
    fn parse_criterion_names() {
        assert_eq!("gini".parse::<SplitCriterion>().unwrap(), SplitCriterion::Gini);
        assert_eq!(" Entropy ".parse::<SplitCriterion>().unwrap(), SplitCriterion::Entropy);
        assert_eq!("log_loss".parse::<SplitCriterion>().unwrap(), SplitCriterion::Entropy);
    }

    #[test]
    fn parse_unknown_criterion() {
        let err = "mse".parse::<SplitCriterion>().unwrap_err();
        assert!(matches!(err, RfError::UnknownCriterion { ref name } if name == "mse"));
    }

    #[test]
    fn display_matches_parse() {
        for c in [SplitCriterion::Gini, SplitCriterion::Entropy] {
            assert_eq!(c.to_string().parse::<SplitCriterion>().unwrap(), c);
        }
    }

    #[test]
    fn separable_data_finds_correct_split() {
        let features = vec![vec![1.0, 2.0, 3.0, 10.0, 11.0, 12.0]];
        let labels = vec![0, 0, 0, 1, 1, 1];
        let sample_indices: Vec<usize> = (0..6).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(42);

        let split = find_best_split(
            &features,
            &labels,
            &sample_indices,
            2,
            SplitCriterion::Gini,
            1,
            1,
            &mut rng,
        )
        .expect("should find a split");

        assert_eq!(split.feature.index(), 0);
        assert!(split.threshold > 3.0 && split.threshold < 10.0);
        assert_eq!(split.left_indices, vec![0, 1, 2]);
        assert_eq!(split.right_indices, vec![3, 4, 5]);
    }

    #[test]
    fn constant_feature_returns_none() {
        let features = vec![vec![5.0, 5.0, 5.0, 5.0]];
        let labels = vec![0, 0, 1, 1];
        let sample_indices: Vec<usize> = (0..4).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(42);

        let result = find_best_split(
            &features,
            &labels,
            &sample_indices,
            2,
            SplitCriterion::Gini,
            1,
            1,
            &mut rng,
        );
        assert!(result.is_none());
    }

    #[test]
    fn constant_features_do_not_use_up_budget() {
        // Only one feature may be scanned, and the first two are constant.
        let features = vec![
            vec![5.0, 5.0, 5.0, 5.0],
            vec![1.0, 1.0, 1.0, 1.0],
            vec![0.0, 1.0, 2.0, 3.0],
        ];
        let labels = vec![0, 0, 1, 1];
        let sample_indices: Vec<usize> = (0..4).collect();

        for seed in 0..16 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let split = find_best_split(
                &features,
                &labels,
                &sample_indices,
                2,
                SplitCriterion::Gini,
                1,
                1,
                &mut rng,
            )
            .expect("informative feature must be found");
            assert_eq!(split.feature.index(), 2);
        }
    }

    #[test]
    fn min_samples_leaf_enforced() {
        // Each child would hold one sample, below the minimum of two.
        let features = vec![vec![1.0, 10.0]];
        let labels = vec![0, 1];
        let sample_indices: Vec<usize> = (0..2).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(42);

        let result = find_best_split(
            &features,
            &labels,
            &sample_indices,
            2,
            SplitCriterion::Entropy,
            1,
            2,
            &mut rng,
        );
        assert!(result.is_none());
    }
}
