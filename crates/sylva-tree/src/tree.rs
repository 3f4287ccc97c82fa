use rayon::prelude::*;

use crate::{
    TreeError,
    node::{Node, NodeIndex, NodeKind},
};

/// What the leaf values of a tree describe.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TreeKind {
    /// Values are weighted class counts, `n_classes[k]` per output.
    Classification {
        /// Number of classes per output.
        n_classes: Vec<usize>,
    },
    /// Values are one prediction per output.
    Regression {
        /// Number of outputs.
        n_outputs: usize,
    },
    /// Values are the feature centroid of the leaf.
    Unsupervised,
}

impl TreeKind {
    fn name(&self) -> &'static str {
        match self {
            TreeKind::Classification { .. } => "classification",
            TreeKind::Regression { .. } => "regression",
            TreeKind::Unsupervised => "unsupervised",
        }
    }
}

/// A fitted decision tree.
///
/// Stored as an arena-based `Vec<Node>` with index references; node 0 is
/// the root. Immutable once built.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DecisionTree {
    pub(crate) nodes: Vec<Node>,
    pub(crate) n_features: usize,
    pub(crate) kind: TreeKind,
}

impl DecisionTree {
    fn check_width(&self, row: &[f64]) -> Result<(), TreeError> {
        if row.len() != self.n_features {
            return Err(TreeError::PredictionFeatureMismatch {
                expected: self.n_features,
                got: row.len(),
            });
        }
        Ok(())
    }

    /// Walk from the root to the leaf reached by `row`, recording each node.
    fn walk(&self, row: &[f64], mut visit: impl FnMut(NodeIndex)) -> NodeIndex {
        let mut current = NodeIndex::new(0);
        loop {
            visit(current);
            match &self.nodes[current.index()].kind {
                NodeKind::Leaf => return current,
                NodeKind::Split {
                    rule, left, right, ..
                } => {
                    current = if rule.goes_left(row) { *left } else { *right };
                }
            }
        }
    }

    /// Return the leaf a sample lands in.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::PredictionFeatureMismatch`] when `row.len() != n_features`.
    pub fn apply(&self, row: &[f64]) -> Result<NodeIndex, TreeError> {
        self.check_width(row)?;
        Ok(self.walk(row, |_| {}))
    }

    /// Return the leaf of every row, computed in parallel.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::PredictionFeatureMismatch`] for the first row of the wrong width.
    pub fn apply_batch(&self, rows: &[Vec<f64>]) -> Result<Vec<NodeIndex>, TreeError> {
        rows.par_iter().map(|row| self.apply(row)).collect()
    }

    /// Return the root-to-leaf node indices visited by `row`.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::PredictionFeatureMismatch`] when `row.len() != n_features`.
    pub fn decision_path(&self, row: &[f64]) -> Result<Vec<NodeIndex>, TreeError> {
        self.check_width(row)?;
        let mut path = Vec::with_capacity(self.depth() + 1);
        self.walk(row, |idx| path.push(idx));
        Ok(path)
    }

    /// Predict one value per output.
    ///
    /// Classification trees return the majority class of each output (as
    /// `f64`); regression trees return the leaf value; unsupervised trees
    /// return the leaf centroid.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::PredictionFeatureMismatch`] when `row.len() != n_features`.
    pub fn predict(&self, row: &[f64]) -> Result<Vec<f64>, TreeError> {
        let leaf = &self.nodes[self.apply(row)?.index()];
        Ok(match &self.kind {
            TreeKind::Classification { n_classes } => {
                let mut offset = 0;
                n_classes
                    .iter()
                    .map(|&n| {
                        let counts = &leaf.value[offset..offset + n];
                        offset += n;
                        counts
                            .iter()
                            .enumerate()
                            .max_by(|a, b| a.1.total_cmp(b.1).then(b.0.cmp(&a.0)))
                            .map_or(0.0, |(class, _)| class as f64)
                    })
                    .collect()
            }
            TreeKind::Regression { .. } | TreeKind::Unsupervised => leaf.value.clone(),
        })
    }

    /// Return the normalised class distribution of each output.
    ///
    /// # Errors
    ///
    /// | Variant                                   | When                                |
    /// |-------------------------------------------|-------------------------------------|
    /// | [`TreeError::UnsupportedPrediction`]      | the tree is not a classifier        |
    /// | [`TreeError::PredictionFeatureMismatch`]  | `row.len() != n_features`           |
    pub fn predict_proba(&self, row: &[f64]) -> Result<Vec<Vec<f64>>, TreeError> {
        let TreeKind::Classification { n_classes } = &self.kind else {
            return Err(TreeError::UnsupportedPrediction {
                operation: "predict_proba",
                kind: self.kind.name(),
            });
        };
        let leaf = &self.nodes[self.apply(row)?.index()];
        let mut offset = 0;
        Ok(n_classes
            .iter()
            .map(|&n| {
                let counts = &leaf.value[offset..offset + n];
                offset += n;
                let total: f64 = counts.iter().sum();
                if total > 0.0 {
                    counts.iter().map(|c| c / total).collect()
                } else {
                    vec![0.0; n]
                }
            })
            .collect())
    }

    /// Predict every row in parallel.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::PredictionFeatureMismatch`] for the first row of the wrong width.
    pub fn predict_batch(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, TreeError> {
        rows.par_iter().map(|row| self.predict(row)).collect()
    }

    /// Return every node, root first.
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Return the node at `index`.
    #[must_use]
    pub fn node(&self, index: NodeIndex) -> &Node {
        &self.nodes[index.index()]
    }

    /// Return what the leaf values describe.
    #[must_use]
    pub fn kind(&self) -> &TreeKind {
        &self.kind
    }

    /// Return the number of features the tree was trained on.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Return the total number of nodes (splits and leaves).
    #[must_use]
    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Return the number of leaf nodes.
    #[must_use]
    pub fn n_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// Return the depth of the deepest node. A single-leaf tree has depth 0.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.nodes.iter().map(|n| n.depth).max().unwrap_or(0)
    }
}
