//! Random Forest classification with seeded hold-out evaluation.
//!
//! CART trees grown in parallel with rayon, Gini or entropy splits,
//! train/validation/test scoring, MDI feature importance and a versioned
//! bincode model format.

mod config;
mod confusion;
mod error;
mod forest;
mod holdout;
mod importance;
mod node;
mod predict;
mod result;
mod serialize;
mod split;
mod tree;

pub use config::{Hyperparameters, MaxFeatures, RandomForestConfig};
pub use confusion::{ClassMetrics, ConfusionMatrix};
pub use error::RfError;
pub use forest::RandomForest;
pub use holdout::{HoldoutResult, HoldoutSplit, Partition, Partitions};
pub use importance::RankedFeature;
pub use node::{FeatureIndex, Impurity, Node, NodeIndex};
pub use predict::ClassDistribution;
pub use result::{RandomForestResult, TrainingMetadata};
pub use split::SplitCriterion;
pub use tree::DecisionTree;
