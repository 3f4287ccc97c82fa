use sylva_tree::TreeError;

/// Errors from unsupervised tree fitting and affinity clustering.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClusterError {
    /// Returned when the requested cluster count is zero.
    #[error("n_clusters must be at least 1, got {n_clusters}")]
    InvalidNClusters {
        /// The invalid cluster count.
        n_clusters: usize,
    },

    /// Returned when fewer samples are provided than the requested cluster count.
    #[error("need at least {n_clusters} samples to form {n_clusters} clusters, got {n_samples}")]
    TooFewSamples {
        /// Number of samples in the affinity matrix.
        n_samples: usize,
        /// Requested number of clusters.
        n_clusters: usize,
    },

    /// Returned when an affinity matrix row does not have `n` entries.
    #[error("affinity row {row} has {got} entries, expected {expected}")]
    NonSquareAffinity {
        /// Index of the offending row.
        row: usize,
        /// Expected row length (the number of rows).
        expected: usize,
        /// Actual row length.
        got: usize,
    },

    /// Returned when an affinity matrix is not symmetric.
    #[error("affinity matrix is not symmetric at ({i}, {j})")]
    AsymmetricAffinity {
        /// Row index of the first mismatch.
        i: usize,
        /// Column index of the first mismatch.
        j: usize,
    },

    /// Wraps a tree error raised while fitting or applying the tree.
    #[error("tree error: {0}")]
    Tree(#[from] TreeError),
}
