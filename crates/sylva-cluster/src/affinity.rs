//! Leaf co-membership affinity between samples.

use std::collections::BTreeMap;

use sylva_tree::NodeIndex;

use crate::error::ClusterError;

/// Square, symmetric matrix of pairwise co-leaf counts.
///
/// Entry `(i, j)` counts how many times samples `i` and `j` landed in the
/// same leaf. For a single tree every entry is 0 or 1 and the diagonal is 1.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AffinityMatrix {
    n: usize,
    data: Vec<u32>,
}

impl AffinityMatrix {
    /// Build a matrix from nested rows.
    ///
    /// # Errors
    ///
    /// | Variant                                  | When                           |
    /// |------------------------------------------|--------------------------------|
    /// | [`ClusterError::NonSquareAffinity`]      | a row length differs from `n`  |
    /// | [`ClusterError::AsymmetricAffinity`]     | `rows[i][j] != rows[j][i]`     |
    pub fn from_rows(rows: &[Vec<u32>]) -> Result<Self, ClusterError> {
        let n = rows.len();
        for (row, values) in rows.iter().enumerate() {
            if values.len() != n {
                return Err(ClusterError::NonSquareAffinity {
                    row,
                    expected: n,
                    got: values.len(),
                });
            }
        }
        for i in 0..n {
            for j in (i + 1)..n {
                if rows[i][j] != rows[j][i] {
                    return Err(ClusterError::AsymmetricAffinity { i, j });
                }
            }
        }
        Ok(Self {
            n,
            data: rows.iter().flatten().copied().collect(),
        })
    }

    /// Return the number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.n
    }

    /// Return true if the matrix has no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Return the affinity between samples `i` and `j`.
    ///
    /// # Panics
    ///
    /// Panics if `i >= n` or `j >= n`.
    #[must_use]
    pub fn get(&self, i: usize, j: usize) -> u32 {
        assert!(i < self.n, "row index {i} out of bounds for matrix of size {}", self.n);
        assert!(j < self.n, "column index {j} out of bounds for matrix of size {}", self.n);
        self.data[i * self.n + j]
    }

    /// Return row `i`: the affinity of sample `i` to every sample.
    #[must_use]
    pub fn row(&self, i: usize) -> &[u32] {
        &self.data[i * self.n..(i + 1) * self.n]
    }

    /// Return the matrix as nested rows.
    #[must_use]
    pub fn to_rows(&self) -> Vec<Vec<u32>> {
        (0..self.n).map(|i| self.row(i).to_vec()).collect()
    }
}

/// Count co-occurrences of samples in the same leaf.
///
/// `leaves[i]` is the leaf sample `i` was routed to. For every distinct
/// leaf, each pair of its members (self-pairs included) is incremented once.
#[must_use]
pub fn affinity_from_leaves(leaves: &[NodeIndex]) -> AffinityMatrix {
    let n = leaves.len();
    let mut members: BTreeMap<NodeIndex, Vec<usize>> = BTreeMap::new();
    for (i, &leaf) in leaves.iter().enumerate() {
        members.entry(leaf).or_default().push(i);
    }

    let mut data = vec![0u32; n * n];
    for group in members.values() {
        for &i in group {
            for &j in group {
                data[i * n + j] += 1;
            }
        }
    }
    AffinityMatrix { n, data }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaves(ids: &[usize]) -> Vec<NodeIndex> {
        ids.iter().map(|&i| NodeIndex::new(i)).collect()
    }

    // --- affinity_from_leaves ---

    #[test]
    fn two_leaves_block_structure() {
        let m = affinity_from_leaves(&leaves(&[1, 1, 2, 2]));
        assert_eq!(
            m.to_rows(),
            vec![
                vec![1, 1, 0, 0],
                vec![1, 1, 0, 0],
                vec![0, 0, 1, 1],
                vec![0, 0, 1, 1],
            ]
        );
    }

    #[test]
    fn diagonal_is_one_and_symmetric() {
        let m = affinity_from_leaves(&leaves(&[4, 3, 4, 6, 3, 4]));
        for i in 0..m.len() {
            assert_eq!(m.get(i, i), 1);
            for j in 0..m.len() {
                assert_eq!(m.get(i, j), m.get(j, i));
            }
        }
        assert_eq!(m.get(0, 5), 1);
        assert_eq!(m.get(0, 1), 0);
    }

    #[test]
    fn empty_leaves() {
        let m = affinity_from_leaves(&[]);
        assert!(m.is_empty());
    }

    // --- from_rows ---

    #[test]
    fn from_rows_roundtrip() {
        let rows = vec![vec![1, 0], vec![0, 1]];
        let m = AffinityMatrix::from_rows(&rows).unwrap();
        assert_eq!(m.to_rows(), rows);
        assert_eq!(m.row(1), &[0, 1]);
    }

    #[test]
    fn from_rows_rejects_ragged() {
        let err = AffinityMatrix::from_rows(&[vec![1, 0], vec![0]]).unwrap_err();
        assert_eq!(
            err,
            ClusterError::NonSquareAffinity {
                row: 1,
                expected: 2,
                got: 1
            }
        );
    }

    #[test]
    fn from_rows_rejects_asymmetric() {
        let err = AffinityMatrix::from_rows(&[vec![1, 1], vec![0, 1]]).unwrap_err();
        assert_eq!(err, ClusterError::AsymmetricAffinity { i: 0, j: 1 });
    }
}
