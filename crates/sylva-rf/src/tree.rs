use std::collections::VecDeque;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::trace;

use crate::{
    RfError,
    node::{Impurity, Node, NodeIndex},
    split::{SplitCriterion, find_best_split},
};

/// Growth parameters for a single CART tree inside the forest.
///
/// The forest validates the user-facing configuration once and hands every
/// tree a copy of these already-resolved values.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TreeParams {
    pub(crate) criterion: SplitCriterion,
    pub(crate) max_depth: Option<usize>,
    pub(crate) min_samples_split: usize,
    pub(crate) min_samples_leaf: usize,
    pub(crate) max_features: usize,
}

/// A fitted CART decision tree.
///
/// Stored as an arena-based `Vec<Node>`; the root lives at index 0.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DecisionTree {
    pub(crate) nodes: Vec<Node>,
    pub(crate) n_features: usize,
    pub(crate) n_classes: usize,
}

/// Per-tree build state shared across the recursion.
struct Builder<'a> {
    col_features: &'a [Vec<f64>],
    labels: &'a [usize],
    n_classes: usize,
    params: TreeParams,
    rng: ChaCha8Rng,
    arena: Vec<Node>,
}

impl Builder<'_> {
    fn leaf(&mut self, class_counts: &[usize], impurity: Impurity, n_samples: usize) -> NodeIndex {
        let total = n_samples as f64;
        let distribution: Vec<f64> = class_counts.iter().map(|&c| c as f64 / total).collect();
        let prediction = class_counts
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(&a.0)))
            .map(|(idx, _)| idx)
            .unwrap_or(0);
        let idx = self.arena.len();
        self.arena.push(Node::Leaf {
            prediction,
            distribution,
            impurity,
            n_samples,
        });
        NodeIndex::new(idx)
    }

    fn grow(&mut self, sample_indices: &[usize], depth: usize) -> NodeIndex {
        let n_samples = sample_indices.len();

        let mut class_counts = vec![0usize; self.n_classes];
        for &si in sample_indices {
            class_counts[self.labels[si]] += 1;
        }
        let impurity = self.params.criterion.impurity(&class_counts, n_samples);

        let depth_reached = self.params.max_depth.is_some_and(|max_d| depth >= max_d);
        if n_samples < self.params.min_samples_split || impurity.value() == 0.0 || depth_reached {
            return self.leaf(&class_counts, impurity, n_samples);
        }

        let Some(split) = find_best_split(
            self.col_features,
            self.labels,
            sample_indices,
            self.n_classes,
            self.params.criterion,
            self.params.max_features,
            self.params.min_samples_leaf,
            &mut self.rng,
        ) else {
            return self.leaf(&class_counts, impurity, n_samples);
        };

        // Reserve the slot so children get higher indices, then overwrite.
        let node_idx = self.arena.len();
        self.arena.push(Node::Leaf {
            prediction: 0,
            distribution: Vec::new(),
            impurity,
            n_samples,
        });

        let left = self.grow(&split.left_indices, depth + 1);
        let right = self.grow(&split.right_indices, depth + 1);

        self.arena[node_idx] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
            impurity,
            n_samples,
            impurity_decrease: split.impurity_decrease,
        };
        NodeIndex::new(node_idx)
    }
}

impl DecisionTree {
    /// Grow a tree on the given bootstrap rows.
    ///
    /// `col_features` is column-major over the full training partition and
    /// `sample_indices` selects the (possibly repeated) bootstrap rows. Inputs
    /// are validated by the forest before any tree is grown.
    pub(crate) fn grow(
        col_features: &[Vec<f64>],
        labels: &[usize],
        sample_indices: &[usize],
        n_classes: usize,
        params: TreeParams,
        seed: u64,
    ) -> Self {
        let mut builder = Builder {
            col_features,
            labels,
            n_classes,
            params,
            rng: ChaCha8Rng::seed_from_u64(seed),
            arena: Vec::new(),
        };
        let root = builder.grow(sample_indices, 0);
        let root = &builder.arena[root.index()];
        trace!(
            n_nodes = builder.arena.len(),
            n_leaves = builder.arena.iter().filter(|n| n.is_leaf()).count(),
            n_samples = root.n_samples(),
            root_impurity = %root.impurity(),
            "decision tree grown"
        );

        Self {
            nodes: builder.arena,
            n_features: col_features.len(),
            n_classes,
        }
    }

    /// Predict the class label for a single sample.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::PredictionFeatureMismatch`] when `sample.len() != n_features`.
    pub fn predict(&self, sample: &[f64]) -> Result<usize, RfError> {
        self.leaf_for(sample).map(|(prediction, _)| prediction)
    }

    /// Return the class probability distribution for a single sample.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::PredictionFeatureMismatch`] when `sample.len() != n_features`.
    pub fn predict_proba(&self, sample: &[f64]) -> Result<&[f64], RfError> {
        self.leaf_for(sample).map(|(_, distribution)| distribution)
    }

    /// Mean Decrease in Impurity per feature, normalized to sum to 1.0.
    ///
    /// All zeros when the tree is a single leaf.
    #[must_use]
    pub fn feature_importances(&self) -> Vec<f64> {
        let mut totals = vec![0.0f64; self.n_features];
        for node in &self.nodes {
            if let Node::Split {
                feature,
                impurity_decrease,
                ..
            } = node
            {
                totals[feature.index()] += impurity_decrease;
            }
        }
        let sum: f64 = totals.iter().sum();
        if sum > 0.0 {
            totals.iter_mut().for_each(|v| *v /= sum);
        }
        totals
    }

    /// Total number of nodes (splits and leaves).
    #[must_use]
    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Maximum depth of the tree; a lone root leaf has depth 0.
    #[must_use]
    pub fn depth(&self) -> usize {
        let mut max_depth = 0usize;
        let mut queue = VecDeque::from([(0usize, 0usize)]);
        while let Some((node_idx, d)) = queue.pop_front() {
            match &self.nodes[node_idx] {
                Node::Leaf { .. } => max_depth = max_depth.max(d),
                Node::Split { left, right, .. } => {
                    queue.push_back((left.index(), d + 1));
                    queue.push_back((right.index(), d + 1));
                }
            }
        }
        max_depth
    }

    /// Walk from the root to the leaf for `sample`; returns its prediction
    /// and class distribution.
    fn leaf_for(&self, sample: &[f64]) -> Result<(usize, &[f64]), RfError> {
        if sample.len() != self.n_features {
            return Err(RfError::PredictionFeatureMismatch {
                expected: self.n_features,
                got: sample.len(),
            });
        }
        let mut idx = 0usize;
        loop {
            match &self.nodes[idx] {
                Node::Leaf {
                    prediction,
                    distribution,
                    ..
                } => return Ok((*prediction, distribution)),
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    idx = if sample[feature.index()] <= *threshold {
                        left.index()
                    } else {
                        right.index()
                    };
                }
            }
        }
    }
}
