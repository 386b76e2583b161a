//! Extremely randomized trees: grow, classify, tune, persist.
//!
//! Implements the Extra-Trees classifier of Geurts, Ernst & Wehenkel (2006):
//! an ensemble of fully randomized binary decision trees over tabular
//! numeric features with integer class labels. At every branch both the
//! splitting attribute and its threshold are drawn at random from a small
//! pool and ranked by symmetric normalized mutual information; the whole
//! training set feeds every tree (no bootstrap). Includes a parallel
//! hyperparameter grid sweep and a line-oriented textual model format.

mod config;
mod dataset;
mod error;
mod forest;
mod model;
mod node;
mod score;
mod tree;
mod tune;

pub use config::{ExtraTreesConfig, NumAttr};
pub use dataset::ExampleSet;
pub use error::EtError;
pub use forest::Forest;
pub use model::Model;
pub use node::{FeatureIndex, Node, NodeIndex};
pub use score::split_score;
pub use tree::DecisionTree;
pub use tune::{GridSearch, HyperParams, SearchResult};
