//! Bottom-up hierarchical clustering over affinity rows.
//!
//! Each sample is represented by its affinity row; clusters are merged
//! greedily by Euclidean linkage distance until `n_clusters` remain.
//! Merge distances are updated with the Lance-Williams recurrence.

use rayon::prelude::*;
use tracing::{debug, instrument};

use crate::affinity::AffinityMatrix;
use crate::clustering::Clustering;
use crate::error::ClusterError;
use crate::label::{ClusterLabel, relabel_by_first_appearance};

/// Inter-cluster distance used when merging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Linkage {
    /// Minimum increase in within-cluster variance.
    Ward,
    /// Mean pairwise distance.
    Average,
    /// Maximum pairwise distance.
    Complete,
    /// Minimum pairwise distance.
    Single,
}

impl Linkage {
    /// Distance from cluster `k` to the union of `i` and `j`.
    fn update(self, d_ik: f64, d_jk: f64, d_ij: f64, n_i: usize, n_j: usize, n_k: usize) -> f64 {
        let (n_i, n_j, n_k) = (n_i as f64, n_j as f64, n_k as f64);
        match self {
            Linkage::Single => d_ik.min(d_jk),
            Linkage::Complete => d_ik.max(d_jk),
            Linkage::Average => (n_i * d_ik + n_j * d_jk) / (n_i + n_j),
            Linkage::Ward => {
                let inner = ((n_i + n_k) * d_ik * d_ik + (n_j + n_k) * d_jk * d_jk
                    - n_k * d_ij * d_ij)
                    / (n_i + n_j + n_k);
                inner.max(0.0).sqrt()
            }
        }
    }
}

/// Pairwise distances stored as a lower-triangular flat vector.
struct CondensedDistances {
    data: Vec<f64>,
}

impl CondensedDistances {
    /// Euclidean distances between all pairs of affinity rows.
    fn from_affinity(affinity: &AffinityMatrix) -> Self {
        let n = affinity.len();
        let rows: Vec<Vec<f64>> = (0..n)
            .into_par_iter()
            .map(|i| {
                let ri = affinity.row(i);
                (0..i)
                    .map(|j| {
                        ri.iter()
                            .zip(affinity.row(j))
                            .map(|(&a, &b)| {
                                let d = f64::from(a) - f64::from(b);
                                d * d
                            })
                            .sum::<f64>()
                            .sqrt()
                    })
                    .collect()
            })
            .collect();
        Self {
            data: rows.concat(),
        }
    }

    fn offset(i: usize, j: usize) -> usize {
        let (row, col) = if i > j { (i, j) } else { (j, i) };
        row * (row - 1) / 2 + col
    }

    fn get(&self, i: usize, j: usize) -> f64 {
        self.data[Self::offset(i, j)]
    }

    fn set(&mut self, i: usize, j: usize, value: f64) {
        self.data[Self::offset(i, j)] = value;
    }
}

/// Agglomerative clustering of an affinity matrix.
///
/// # Defaults
///
/// | Parameter    | Default          |
/// |--------------|------------------|
/// | `n_clusters` | 2                |
/// | `linkage`    | `Linkage::Ward`  |
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgglomerativeClustering {
    n_clusters: usize,
    linkage: Linkage,
}

impl AgglomerativeClustering {
    /// Create a clusterer with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            n_clusters: 2,
            linkage: Linkage::Ward,
        }
    }

    /// Set the number of clusters to stop merging at.
    #[must_use]
    pub fn with_n_clusters(mut self, n_clusters: usize) -> Self {
        self.n_clusters = n_clusters;
        self
    }

    /// Set the linkage criterion.
    #[must_use]
    pub fn with_linkage(mut self, linkage: Linkage) -> Self {
        self.linkage = linkage;
        self
    }

    // --- Getters ---

    /// Return the target cluster count.
    #[must_use]
    pub fn n_clusters(&self) -> usize {
        self.n_clusters
    }

    /// Return the linkage criterion.
    #[must_use]
    pub fn linkage(&self) -> Linkage {
        self.linkage
    }
}

impl Default for AgglomerativeClustering {
    fn default() -> Self {
        Self::new()
    }
}

impl Clustering for AgglomerativeClustering {
    /// Merge the closest pair of clusters until `n_clusters` remain.
    ///
    /// Among equally close pairs the one with the lowest indices merges
    /// first. Labels are numbered by first appearance over the samples.
    ///
    /// # Errors
    ///
    /// | Variant                             | When                         |
    /// |-------------------------------------|------------------------------|
    /// | [`ClusterError::InvalidNClusters`]  | `n_clusters == 0`            |
    /// | [`ClusterError::TooFewSamples`]     | `affinity.len() < n_clusters`|
    #[instrument(
        skip_all,
        fields(n_samples = affinity.len(), n_clusters = self.n_clusters, linkage = ?self.linkage)
    )]
    fn fit_predict(&self, affinity: &AffinityMatrix) -> Result<Vec<ClusterLabel>, ClusterError> {
        let n = affinity.len();
        if self.n_clusters == 0 {
            return Err(ClusterError::InvalidNClusters { n_clusters: 0 });
        }
        if n < self.n_clusters {
            return Err(ClusterError::TooFewSamples {
                n_samples: n,
                n_clusters: self.n_clusters,
            });
        }

        let mut distances = CondensedDistances::from_affinity(affinity);
        let mut active = vec![true; n];
        let mut sizes = vec![1usize; n];
        let mut owner: Vec<usize> = (0..n).collect();

        for _ in 0..(n - self.n_clusters) {
            let mut best: Option<(usize, usize, f64)> = None;
            for i in (0..n).filter(|&i| active[i]) {
                for j in ((i + 1)..n).filter(|&j| active[j]) {
                    let d = distances.get(i, j);
                    if best.is_none_or(|(_, _, b)| d < b) {
                        best = Some((i, j, d));
                    }
                }
            }
            let Some((a, b, d_ab)) = best else {
                break;
            };

            for k in (0..n).filter(|&k| active[k] && k != a && k != b) {
                let merged = self.linkage.update(
                    distances.get(a, k),
                    distances.get(b, k),
                    d_ab,
                    sizes[a],
                    sizes[b],
                    sizes[k],
                );
                distances.set(a, k, merged);
            }
            active[b] = false;
            sizes[a] += sizes[b];
            for o in owner.iter_mut().filter(|o| **o == b) {
                *o = a;
            }
        }

        let labels = relabel_by_first_appearance(&owner);
        debug!(n_clusters = self.n_clusters, "agglomerative clustering finished");
        Ok(labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indices(labels: &[ClusterLabel]) -> Vec<usize> {
        labels.iter().map(|l| l.index()).collect()
    }

    fn blocks() -> AffinityMatrix {
        AffinityMatrix::from_rows(&[
            vec![1, 1, 0, 0],
            vec![1, 1, 0, 0],
            vec![0, 0, 1, 1],
            vec![0, 0, 1, 1],
        ])
        .unwrap()
    }

    // --- Defaults ---

    #[test]
    fn default_values() {
        let c = AgglomerativeClustering::default();
        assert_eq!(c.n_clusters(), 2);
        assert_eq!(c.linkage(), Linkage::Ward);
    }

    // --- Clustering ---

    #[test]
    fn block_affinity_separates_for_every_linkage() {
        for linkage in [Linkage::Ward, Linkage::Average, Linkage::Complete, Linkage::Single] {
            let labels = AgglomerativeClustering::new()
                .with_linkage(linkage)
                .fit_predict(&blocks())
                .unwrap();
            assert_eq!(indices(&labels), vec![0, 0, 1, 1], "{linkage:?}");
        }
    }

    #[test]
    fn one_cluster_per_sample() {
        let labels = AgglomerativeClustering::new()
            .with_n_clusters(4)
            .fit_predict(&blocks())
            .unwrap();
        assert_eq!(indices(&labels), vec![0, 1, 2, 3]);
    }

    #[test]
    fn single_cluster() {
        let labels = AgglomerativeClustering::new()
            .with_n_clusters(1)
            .fit_predict(&blocks())
            .unwrap();
        assert_eq!(indices(&labels), vec![0, 0, 0, 0]);
    }

    #[test]
    fn ties_merge_lowest_pair_first() {
        // all rows identical: every distance is zero
        let m = AffinityMatrix::from_rows(&[vec![1, 1, 1], vec![1, 1, 1], vec![1, 1, 1]]).unwrap();
        let labels = AgglomerativeClustering::new().fit_predict(&m).unwrap();
        assert_eq!(indices(&labels), vec![0, 0, 1]);
    }

    // --- Errors ---

    #[test]
    fn zero_clusters_rejected() {
        let err = AgglomerativeClustering::new()
            .with_n_clusters(0)
            .fit_predict(&blocks())
            .unwrap_err();
        assert_eq!(err, ClusterError::InvalidNClusters { n_clusters: 0 });
    }

    #[test]
    fn too_few_samples_rejected() {
        let m = AffinityMatrix::from_rows(&[vec![1]]).unwrap();
        let err = AgglomerativeClustering::new().fit_predict(&m).unwrap_err();
        assert_eq!(
            err,
            ClusterError::TooFewSamples {
                n_samples: 1,
                n_clusters: 2
            }
        );
    }

    // --- Lance-Williams ---

    #[test]
    fn ward_update_matches_centroid_distance() {
        // points 0, 1, 5: merging {0} and {1}, distance to {5}
        let d = Linkage::Ward.update(5.0, 4.0, 1.0, 1, 1, 1);
        let direct = (2.0_f64 * 2.0 * 1.0 / 3.0).sqrt() * 4.5;
        assert!((d - direct).abs() < 1e-12);
    }

    #[test]
    fn simple_linkage_updates() {
        assert_eq!(Linkage::Single.update(5.0, 4.0, 1.0, 1, 1, 1), 4.0);
        assert_eq!(Linkage::Complete.update(5.0, 4.0, 1.0, 1, 1, 1), 5.0);
        assert_eq!(Linkage::Average.update(6.0, 3.0, 1.0, 2, 1, 1), 5.0);
    }

    #[test]
    fn condensed_distances_are_euclidean() {
        let m = AffinityMatrix::from_rows(&[vec![1, 0], vec![0, 1]]).unwrap();
        let d = CondensedDistances::from_affinity(&m);
        assert!((d.get(0, 1) - 2.0_f64.sqrt()).abs() < 1e-12);
        assert_eq!(d.get(1, 0), d.get(0, 1));
    }
}
