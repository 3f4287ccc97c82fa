/// Errors raised while validating inputs or configuration, before any tree growth.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TreeError {
    /// Returned when the feature matrix has zero rows.
    #[error("training dataset has zero samples")]
    EmptyDataset,

    /// Returned when the feature matrix has zero columns.
    #[error("training dataset has zero feature columns")]
    ZeroFeatures,

    /// Returned when a row has a different width than the first row.
    #[error("sample {sample_index} has {got} features, expected {expected}")]
    FeatureCountMismatch {
        /// The expected number of features.
        expected: usize,
        /// The actual number of features in the sample.
        got: usize,
        /// The zero-based index of the offending sample.
        sample_index: usize,
    },

    /// Returned when a feature value is NaN or infinite.
    #[error("non-finite value at sample {sample_index}, feature {feature_index}")]
    NonFiniteValue {
        /// The zero-based index of the offending sample.
        sample_index: usize,
        /// The zero-based index of the offending feature column.
        feature_index: usize,
    },

    /// Returned when the target has a different length than the feature matrix.
    #[error("target has {got} rows, expected {expected}")]
    TargetLengthMismatch {
        /// Number of samples in the feature matrix.
        expected: usize,
        /// Number of rows in the target.
        got: usize,
    },

    /// Returned when a continuous target value is NaN or infinite.
    #[error("non-finite target value at sample {sample_index}")]
    NonFiniteTarget {
        /// The zero-based index of the offending sample.
        sample_index: usize,
    },

    /// Returned when the weight vector length differs from the sample count.
    #[error("sample_weight has {got} entries, expected {expected}")]
    WeightLengthMismatch {
        /// Number of samples in the feature matrix.
        expected: usize,
        /// Number of weights provided.
        got: usize,
    },

    /// Returned when a sample weight is negative or non-finite.
    #[error("sample_weight[{sample_index}] = {weight} must be finite and non-negative")]
    InvalidWeight {
        /// The zero-based index of the offending sample.
        sample_index: usize,
        /// The rejected weight.
        weight: f64,
    },

    /// Returned when all sample weights are zero.
    #[error("sum of sample weights must be positive")]
    ZeroTotalWeight,

    /// Returned when a Poisson target is negative or sums to a non-positive value.
    #[error("poisson criterion requires non-negative targets with a positive sum")]
    InvalidPoissonTarget,

    /// Returned when the criterion family does not match the kind of target supplied.
    #[error("criterion {criterion} cannot be used with a {target} target")]
    CriterionTargetMismatch {
        /// Name of the configured criterion.
        criterion: &'static str,
        /// Kind of target that was supplied.
        target: &'static str,
    },

    /// Returned when max_depth is zero.
    #[error("max_depth must be at least 1, got {max_depth}")]
    InvalidMaxDepth {
        /// The invalid max_depth value provided.
        max_depth: usize,
    },

    /// Returned when min_samples_split is below 2 or an out-of-range fraction.
    #[error("min_samples_split must be an integer >= 2 or a fraction in (0, 1], got {value}")]
    InvalidMinSamplesSplit {
        /// The rejected value, rendered for display.
        value: String,
    },

    /// Returned when min_samples_leaf is zero or an out-of-range fraction.
    #[error("min_samples_leaf must be an integer >= 1 or a fraction in (0, 1), got {value}")]
    InvalidMinSamplesLeaf {
        /// The rejected value, rendered for display.
        value: String,
    },

    /// Returned when min_weight_fraction_leaf is outside [0, 0.5].
    #[error("min_weight_fraction_leaf must be in [0, 0.5], got {fraction}")]
    InvalidMinWeightFractionLeaf {
        /// The rejected fraction.
        fraction: f64,
    },

    /// Returned when max_features resolves to 0 or exceeds n_features.
    #[error("max_features resolved to {max_features}, but must be in [1, {n_features}]")]
    InvalidMaxFeatures {
        /// The resolved max_features value.
        max_features: usize,
        /// The number of features in the dataset.
        n_features: usize,
    },

    /// Returned when max_leaf_nodes is below 2.
    #[error("max_leaf_nodes must be at least 2, got {max_leaf_nodes}")]
    InvalidMaxLeafNodes {
        /// The invalid max_leaf_nodes value provided.
        max_leaf_nodes: usize,
    },

    /// Returned when min_impurity_decrease is negative or non-finite.
    #[error("min_impurity_decrease must be finite and non-negative, got {value}")]
    InvalidMinImpurityDecrease {
        /// The rejected value.
        value: f64,
    },

    /// Returned when feature_combinations is below 1 or above n_features.
    #[error("feature_combinations must be in [1, {n_features}], got {feature_combinations}")]
    InvalidFeatureCombinations {
        /// The rejected value.
        feature_combinations: f64,
        /// The number of features in the dataset.
        n_features: usize,
    },

    /// Returned when data_height * data_width does not equal n_features.
    #[error("data height ({data_height}) times width ({data_width}) does not equal the number of features ({n_features})")]
    PatchGridMismatch {
        /// Configured grid height.
        data_height: usize,
        /// Configured grid width.
        data_width: usize,
        /// The number of features in the dataset.
        n_features: usize,
    },

    /// Returned when a patch dimension range or bound is invalid.
    #[error("invalid patch {dimension}: min {min}, max {max}, data extent {extent}")]
    InvalidPatchDimension {
        /// Either "height" or "width".
        dimension: &'static str,
        /// Configured minimum patch extent.
        min: usize,
        /// Configured maximum patch extent.
        max: usize,
        /// The grid extent along this dimension.
        extent: usize,
    },

    /// Returned when a prediction input has a different width than the training data.
    #[error("prediction input has {got} features, expected {expected}")]
    PredictionFeatureMismatch {
        /// The expected number of features.
        expected: usize,
        /// The actual number of features in the prediction input.
        got: usize,
    },

    /// Returned when a prediction method does not apply to the tree's target kind.
    #[error("{operation} is not available for {kind} trees")]
    UnsupportedPrediction {
        /// The prediction method that was called.
        operation: &'static str,
        /// The kind of tree it was called on.
        kind: &'static str,
    },
}
