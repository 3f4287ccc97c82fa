//! Unsupervised decision trees and affinity-based clustering.
//!
//! Fits a tree without a target, turns leaf co-membership into a sample
//! affinity matrix, and clusters that matrix with a pluggable routine
//! (agglomerative clustering by default).

mod affinity;
mod agglomerative;
mod clustering;
mod error;
mod label;
mod unsupervised;

pub use affinity::{AffinityMatrix, affinity_from_leaves};
pub use agglomerative::{AgglomerativeClustering, Linkage};
pub use clustering::Clustering;
pub use error::ClusterError;
pub use label::ClusterLabel;
pub use unsupervised::{UnsupervisedTree, UnsupervisedTreeConfig};
