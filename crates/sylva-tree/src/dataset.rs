//! Dense training data: feature matrix, optional target, sample weights.

use crate::error::TreeError;

/// The supervision attached to a [`Dataset`].
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    /// Zero-based class labels, row-major `n_samples x n_outputs`.
    Classes {
        /// Flattened labels; `labels[i * n_outputs + k]` is output `k` of sample `i`.
        labels: Vec<usize>,
        /// Number of classes per output (`max label + 1`).
        n_classes: Vec<usize>,
    },
    /// Real-valued targets, row-major `n_samples x n_outputs`.
    Continuous {
        /// Flattened values; `values[i * n_outputs + k]` is output `k` of sample `i`.
        values: Vec<f64>,
        /// Number of outputs per sample.
        n_outputs: usize,
    },
    /// No target: the tree is grown by an unsupervised criterion.
    None,
}

impl Target {
    /// Short name used in error messages.
    pub(crate) fn kind_name(&self) -> &'static str {
        match self {
            Target::Classes { .. } => "class",
            Target::Continuous { .. } => "continuous",
            Target::None => "missing",
        }
    }

    /// Number of outputs, zero for unsupervised data.
    #[must_use]
    pub fn n_outputs(&self) -> usize {
        match self {
            Target::Classes { n_classes, .. } => n_classes.len(),
            Target::Continuous { n_outputs, .. } => *n_outputs,
            Target::None => 0,
        }
    }
}

/// A validated, row-major dense dataset.
///
/// Construct via [`Dataset::classification`], [`Dataset::regression`] or
/// [`Dataset::unsupervised`] (or their `_multi` variants), then optionally
/// attach weights with [`Dataset::with_weights`].
#[derive(Debug, Clone)]
pub struct Dataset {
    features: Vec<f64>,
    n_samples: usize,
    n_features: usize,
    target: Target,
    weights: Vec<f64>,
    total_weight: f64,
}

impl Dataset {
    /// Build a dataset without a target.
    ///
    /// # Errors
    ///
    /// | Variant                             | When                                |
    /// |-------------------------------------|-------------------------------------|
    /// | [`TreeError::EmptyDataset`]         | `rows` is empty                     |
    /// | [`TreeError::ZeroFeatures`]         | rows have zero feature columns      |
    /// | [`TreeError::FeatureCountMismatch`] | rows have inconsistent lengths      |
    /// | [`TreeError::NonFiniteValue`]       | any value is NaN or infinite        |
    pub fn unsupervised(rows: &[Vec<f64>]) -> Result<Self, TreeError> {
        let (features, n_samples, n_features) = flatten_rows(rows)?;
        Ok(Self {
            features,
            n_samples,
            n_features,
            target: Target::None,
            weights: vec![1.0; n_samples],
            total_weight: n_samples as f64,
        })
    }

    /// Build a single-output classification dataset from zero-based labels.
    ///
    /// # Errors
    ///
    /// Everything [`Dataset::unsupervised`] rejects, plus
    /// [`TreeError::TargetLengthMismatch`].
    pub fn classification(rows: &[Vec<f64>], labels: &[usize]) -> Result<Self, TreeError> {
        let labels: Vec<Vec<usize>> = labels.iter().map(|&l| vec![l]).collect();
        Self::classification_multi(rows, &labels)
    }

    /// Build a multi-output classification dataset; `labels[i]` holds every output of sample `i`.
    ///
    /// # Errors
    ///
    /// Everything [`Dataset::unsupervised`] rejects, plus
    /// [`TreeError::TargetLengthMismatch`] when the label rows are missing or ragged.
    pub fn classification_multi(
        rows: &[Vec<f64>],
        labels: &[Vec<usize>],
    ) -> Result<Self, TreeError> {
        let mut data = Self::unsupervised(rows)?;
        if labels.len() != data.n_samples {
            return Err(TreeError::TargetLengthMismatch {
                expected: data.n_samples,
                got: labels.len(),
            });
        }
        let n_outputs = labels[0].len().max(1);
        let mut flat = Vec::with_capacity(data.n_samples * n_outputs);
        let mut n_classes = vec![0usize; n_outputs];
        for row in labels {
            if row.len() != n_outputs {
                return Err(TreeError::TargetLengthMismatch {
                    expected: n_outputs,
                    got: row.len(),
                });
            }
            for (k, &label) in row.iter().enumerate() {
                n_classes[k] = n_classes[k].max(label + 1);
                flat.push(label);
            }
        }
        data.target = Target::Classes {
            labels: flat,
            n_classes,
        };
        Ok(data)
    }

    /// Build a single-output regression dataset.
    ///
    /// # Errors
    ///
    /// Everything [`Dataset::unsupervised`] rejects, plus
    /// [`TreeError::TargetLengthMismatch`] and [`TreeError::NonFiniteTarget`].
    pub fn regression(rows: &[Vec<f64>], target: &[f64]) -> Result<Self, TreeError> {
        let target: Vec<Vec<f64>> = target.iter().map(|&y| vec![y]).collect();
        Self::regression_multi(rows, &target)
    }

    /// Build a multi-output regression dataset; `target[i]` holds every output of sample `i`.
    ///
    /// # Errors
    ///
    /// Everything [`Dataset::regression`] rejects.
    pub fn regression_multi(rows: &[Vec<f64>], target: &[Vec<f64>]) -> Result<Self, TreeError> {
        let mut data = Self::unsupervised(rows)?;
        if target.len() != data.n_samples {
            return Err(TreeError::TargetLengthMismatch {
                expected: data.n_samples,
                got: target.len(),
            });
        }
        let n_outputs = target[0].len().max(1);
        let mut values = Vec::with_capacity(data.n_samples * n_outputs);
        for (sample_index, row) in target.iter().enumerate() {
            if row.len() != n_outputs {
                return Err(TreeError::TargetLengthMismatch {
                    expected: n_outputs,
                    got: row.len(),
                });
            }
            if row.iter().any(|y| !y.is_finite()) {
                return Err(TreeError::NonFiniteTarget { sample_index });
            }
            values.extend_from_slice(row);
        }
        data.target = Target::Continuous { values, n_outputs };
        Ok(data)
    }

    /// Replace the default all-ones weights.
    ///
    /// # Errors
    ///
    /// | Variant                             | When                                  |
    /// |-------------------------------------|---------------------------------------|
    /// | [`TreeError::WeightLengthMismatch`] | `weights.len() != n_samples`          |
    /// | [`TreeError::InvalidWeight`]        | a weight is negative or non-finite    |
    /// | [`TreeError::ZeroTotalWeight`]      | all weights are zero                  |
    pub fn with_weights(mut self, weights: &[f64]) -> Result<Self, TreeError> {
        if weights.len() != self.n_samples {
            return Err(TreeError::WeightLengthMismatch {
                expected: self.n_samples,
                got: weights.len(),
            });
        }
        for (sample_index, &weight) in weights.iter().enumerate() {
            if !weight.is_finite() || weight < 0.0 {
                return Err(TreeError::InvalidWeight {
                    sample_index,
                    weight,
                });
            }
        }
        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            return Err(TreeError::ZeroTotalWeight);
        }
        self.weights = weights.to_vec();
        self.total_weight = total;
        Ok(self)
    }

    /// Return the number of samples (rows).
    #[must_use]
    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    /// Return the number of features (columns).
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Return the target attached to this dataset.
    #[must_use]
    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Return the per-sample weights.
    #[must_use]
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Return the sum of all sample weights.
    #[must_use]
    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    /// Return the feature row of sample `i`.
    #[must_use]
    pub fn row(&self, i: usize) -> &[f64] {
        &self.features[i * self.n_features..(i + 1) * self.n_features]
    }

    /// Return feature `j` of sample `i`.
    #[inline]
    #[must_use]
    pub fn value(&self, i: usize, j: usize) -> f64 {
        self.features[i * self.n_features + j]
    }

    #[inline]
    pub(crate) fn weight(&self, i: usize) -> f64 {
        self.weights[i]
    }

    /// Class label of output `k` for sample `i`. Panics on non-class targets.
    #[inline]
    pub(crate) fn label(&self, i: usize, k: usize) -> usize {
        match &self.target {
            Target::Classes { labels, n_classes } => labels[i * n_classes.len() + k],
            _ => unreachable!("class criteria are only built for class targets"),
        }
    }

    /// Continuous value of output `k` for sample `i`. Panics on non-continuous targets.
    #[inline]
    pub(crate) fn response(&self, i: usize, k: usize) -> f64 {
        match &self.target {
            Target::Continuous { values, n_outputs } => values[i * n_outputs + k],
            _ => unreachable!("regression criteria are only built for continuous targets"),
        }
    }
}

/// Flatten row-major input after checking shape and finiteness.
pub(crate) fn flatten_rows(rows: &[Vec<f64>]) -> Result<(Vec<f64>, usize, usize), TreeError> {
    if rows.is_empty() {
        return Err(TreeError::EmptyDataset);
    }
    let n_samples = rows.len();
    let n_features = rows[0].len();
    if n_features == 0 {
        return Err(TreeError::ZeroFeatures);
    }

    let mut flat = Vec::with_capacity(n_samples * n_features);
    for (sample_index, row) in rows.iter().enumerate() {
        if row.len() != n_features {
            return Err(TreeError::FeatureCountMismatch {
                expected: n_features,
                got: row.len(),
                sample_index,
            });
        }
        for (feature_index, &val) in row.iter().enumerate() {
            if !val.is_finite() {
                return Err(TreeError::NonFiniteValue {
                    sample_index,
                    feature_index,
                });
            }
        }
        flat.extend_from_slice(row);
    }
    Ok((flat, n_samples, n_features))
}
