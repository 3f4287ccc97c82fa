//! Unsupervised trees: fit without a target, then cluster samples by leaf
//! co-membership.

use rayon::prelude::*;
use tracing::{info, instrument};

use sylva_tree::{Dataset, DecisionTree, DecisionTreeConfig, NodeIndex, SplitCriterion};

use crate::affinity::{AffinityMatrix, affinity_from_leaves};
use crate::agglomerative::AgglomerativeClustering;
use crate::clustering::Clustering;
use crate::error::ClusterError;
use crate::label::ClusterLabel;

/// Configuration for an unsupervised tree and the clustering applied to its affinity.
///
/// # Defaults
///
/// | Parameter    | Default                                                    |
/// |--------------|------------------------------------------------------------|
/// | `tree`       | [`DecisionTreeConfig::new`] with `SplitCriterion::TwoMeans` |
/// | `clustering` | [`AgglomerativeClustering::new`] (2 clusters, Ward)         |
#[derive(Debug, Clone)]
pub struct UnsupervisedTreeConfig<K = AgglomerativeClustering> {
    tree: DecisionTreeConfig,
    clustering: K,
}

impl UnsupervisedTreeConfig {
    /// Create a config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tree: DecisionTreeConfig::new().with_criterion(SplitCriterion::TwoMeans),
            clustering: AgglomerativeClustering::new(),
        }
    }
}

impl Default for UnsupervisedTreeConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Clustering> UnsupervisedTreeConfig<K> {
    /// Replace the tree configuration. Its criterion must be unsupervised.
    #[must_use]
    pub fn with_tree_config(mut self, tree: DecisionTreeConfig) -> Self {
        self.tree = tree;
        self
    }

    /// Replace the clustering routine.
    #[must_use]
    pub fn with_clustering<K2: Clustering>(self, clustering: K2) -> UnsupervisedTreeConfig<K2> {
        UnsupervisedTreeConfig {
            tree: self.tree,
            clustering,
        }
    }

    // --- Getters ---

    /// Return the tree configuration.
    #[must_use]
    pub fn tree_config(&self) -> &DecisionTreeConfig {
        &self.tree
    }

    /// Return the clustering routine.
    #[must_use]
    pub fn clustering(&self) -> &K {
        &self.clustering
    }

    /// Fit an unsupervised tree on `data`, then compute the training
    /// affinity matrix and, for two or more samples, the cluster labels.
    ///
    /// # Errors
    ///
    /// | Variant                 | When                                                  |
    /// |-------------------------|-------------------------------------------------------|
    /// | [`ClusterError::Tree`]  | invalid tree config, or a supervised criterion or target |
    /// | other variants          | raised by the clustering routine                      |
    #[instrument(skip_all, fields(n_samples = data.n_samples(), n_features = data.n_features()))]
    pub fn fit(&self, data: &Dataset) -> Result<UnsupervisedTree<K>, ClusterError>
    where
        K: Clone,
    {
        let tree = self.tree.fit(data)?;
        let leaves = (0..data.n_samples())
            .into_par_iter()
            .map(|i| tree.apply(data.row(i)))
            .collect::<Result<Vec<NodeIndex>, _>>()?;
        let affinity_matrix = affinity_from_leaves(&leaves);

        let labels = if data.n_samples() >= 2 {
            Some(self.clustering.fit_predict(&affinity_matrix)?)
        } else {
            None
        };

        info!(
            n_leaves = tree.n_leaves(),
            depth = tree.depth(),
            labelled = labels.is_some(),
            "unsupervised tree fitted"
        );

        Ok(UnsupervisedTree {
            tree,
            affinity_matrix,
            labels,
            clustering: self.clustering.clone(),
        })
    }
}

/// A fitted unsupervised tree with its training affinity and labels.
#[derive(Debug, Clone)]
pub struct UnsupervisedTree<K = AgglomerativeClustering> {
    tree: DecisionTree,
    affinity_matrix: AffinityMatrix,
    labels: Option<Vec<ClusterLabel>>,
    clustering: K,
}

impl<K: Clustering> UnsupervisedTree<K> {
    /// Compute the leaf co-membership affinity of `rows` under the fitted tree.
    ///
    /// The tree is not refitted.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError::Tree`] when a row has the wrong number of features.
    pub fn transform(&self, rows: &[Vec<f64>]) -> Result<AffinityMatrix, ClusterError> {
        let leaves = self.tree.apply_batch(rows)?;
        Ok(affinity_from_leaves(&leaves))
    }

    /// Cluster `rows` by their affinity under the fitted tree.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError::Tree`] for rows of the wrong width, and any
    /// error raised by the clustering routine.
    pub fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<ClusterLabel>, ClusterError> {
        let affinity = self.transform(rows)?;
        self.clustering.fit_predict(&affinity)
    }

    /// Return the fitted tree.
    #[must_use]
    pub fn tree(&self) -> &DecisionTree {
        &self.tree
    }

    /// Return the training affinity matrix.
    #[must_use]
    pub fn affinity_matrix(&self) -> &AffinityMatrix {
        &self.affinity_matrix
    }

    /// Return the training labels, or `None` when fitted on a single sample.
    #[must_use]
    pub fn labels(&self) -> Option<&[ClusterLabel]> {
        self.labels.as_deref()
    }
}
