use crate::affinity::AffinityMatrix;
use crate::error::ClusterError;
use crate::label::ClusterLabel;

/// A routine that assigns one label per sample from an affinity matrix.
pub trait Clustering {
    /// Cluster the samples of `affinity`, returning `affinity.len()` labels.
    ///
    /// # Errors
    ///
    /// Implementations return a [`ClusterError`] when they cannot cluster
    /// the given matrix (for example, fewer samples than clusters).
    fn fit_predict(&self, affinity: &AffinityMatrix) -> Result<Vec<ClusterLabel>, ClusterError>;
}
