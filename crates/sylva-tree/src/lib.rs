//! Decision tree induction: train, inspect, predict.
//!
//! Grows classification, regression and unsupervised trees over a shared
//! engine. Splits are thresholds on a projection of the features:
//! axis-aligned, sparse oblique, or rectangular patches over a reshaped
//! feature grid. Trees grow depth-first, or best-first under a leaf budget.

mod best_first;
mod builder;
mod classification;
mod config;
mod criterion;
mod dataset;
mod depth_first;
mod error;
mod node;
mod projection;
mod regression;
mod splitter;
mod tree;
mod unsupervised;

pub use config::{DecisionTreeConfig, MaxFeatures, PatchConfig, SampleCount, SplitterKind};
pub use criterion::SplitCriterion;
pub use dataset::{Dataset, Target};
pub use error::TreeError;
pub use node::{FeatureIndex, Impurity, Node, NodeIndex, NodeKind, SplitRule};
pub use projection::{PatchGeometry, Projection};
pub use tree::{DecisionTree, TreeKind};
