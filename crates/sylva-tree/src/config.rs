use std::fmt;

use tracing::{debug, instrument};

use crate::{
    TreeError,
    best_first::BestFirstBuilder,
    builder::StoppingRule,
    classification::{ClassImpurity, ClassificationCriterion},
    criterion::{Criterion, CriterionFamily, SplitCriterion},
    dataset::{Dataset, Target},
    depth_first::DepthFirstBuilder,
    projection::{PatchBounds, ProjectionSampler},
    regression::{RegressionCriterion, RegressionImpurity},
    splitter::Splitter,
    tree::{DecisionTree, TreeKind},
    unsupervised::{UnsupervisedCriterion, UnsupervisedImpurity},
};

/// A sample-count parameter given either absolutely or as a fraction of `n_samples`.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum SampleCount {
    /// An absolute number of samples.
    Count(usize),
    /// A fraction of the training samples, rounded up.
    Fraction(f64),
}

impl fmt::Display for SampleCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleCount::Count(n) => write!(f, "{n}"),
            SampleCount::Fraction(x) => write!(f, "{x}"),
        }
    }
}

/// Number of candidate directions drawn per node.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum MaxFeatures {
    /// Every feature.
    All,
    /// `floor(sqrt(n_features))`, at least 1.
    Sqrt,
    /// `floor(log2(n_features))`, at least 1.
    Log2,
    /// `floor(fraction * n_features)`, at least 1; the fraction must be in (0, 1].
    Fraction(f64),
    /// An exact count.
    Fixed(usize),
}

impl MaxFeatures {
    fn resolve(self, n_features: usize) -> Result<usize, TreeError> {
        let n = n_features as f64;
        let resolved = match self {
            MaxFeatures::All => n_features,
            MaxFeatures::Sqrt => (n.sqrt().floor() as usize).max(1),
            MaxFeatures::Log2 => (n.log2().floor() as usize).max(1),
            MaxFeatures::Fraction(f) if f > 0.0 && f <= 1.0 => ((f * n).floor() as usize).max(1),
            MaxFeatures::Fraction(_) => 0,
            MaxFeatures::Fixed(k) => k,
        };
        if resolved == 0 || resolved > n_features {
            return Err(TreeError::InvalidMaxFeatures {
                max_features: resolved,
                n_features,
            });
        }
        Ok(resolved)
    }
}

/// Geometry of the implicit feature grid and the patch size ranges.
///
/// # Defaults
///
/// | Parameter          | Default                      |
/// |--------------------|------------------------------|
/// | `data_height`      | 1                            |
/// | `data_width`       | `None` (`n_features`)        |
/// | `min_patch_height` | 1                            |
/// | `max_patch_height` | 1                            |
/// | `min_patch_width`  | 1                            |
/// | `max_patch_width`  | 1                            |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchConfig {
    data_height: usize,
    data_width: Option<usize>,
    min_patch_height: usize,
    max_patch_height: usize,
    min_patch_width: usize,
    max_patch_width: usize,
}

impl PatchConfig {
    /// Create a patch config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            data_height: 1,
            data_width: None,
            min_patch_height: 1,
            max_patch_height: 1,
            min_patch_width: 1,
            max_patch_width: 1,
        }
    }

    /// Set the grid height and width. `data_height * data_width` must equal `n_features`.
    #[must_use]
    pub fn with_data_shape(mut self, data_height: usize, data_width: usize) -> Self {
        self.data_height = data_height;
        self.data_width = Some(data_width);
        self
    }

    /// Set the inclusive range patch heights are drawn from.
    #[must_use]
    pub fn with_patch_height(mut self, min: usize, max: usize) -> Self {
        self.min_patch_height = min;
        self.max_patch_height = max;
        self
    }

    /// Set the inclusive range patch widths are drawn from.
    #[must_use]
    pub fn with_patch_width(mut self, min: usize, max: usize) -> Self {
        self.min_patch_width = min;
        self.max_patch_width = max;
        self
    }

    /// Return the grid height.
    #[must_use]
    pub fn data_height(&self) -> usize {
        self.data_height
    }

    /// Return the grid width, if set.
    #[must_use]
    pub fn data_width(&self) -> Option<usize> {
        self.data_width
    }

    fn resolve(&self, n_features: usize) -> Result<PatchBounds, TreeError> {
        let data_height = self.data_height;
        let data_width = self.data_width.unwrap_or(n_features);
        if data_height * data_width != n_features {
            return Err(TreeError::PatchGridMismatch {
                data_height,
                data_width,
                n_features,
            });
        }
        check_patch_range("height", self.min_patch_height, self.max_patch_height, data_height)?;
        check_patch_range("width", self.min_patch_width, self.max_patch_width, data_width)?;
        Ok(PatchBounds {
            data_height,
            data_width,
            min_height: self.min_patch_height,
            max_height: self.max_patch_height,
            min_width: self.min_patch_width,
            max_width: self.max_patch_width,
        })
    }
}

impl Default for PatchConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn check_patch_range(
    dimension: &'static str,
    min: usize,
    max: usize,
    extent: usize,
) -> Result<(), TreeError> {
    if min == 0 || min > max || max > extent {
        return Err(TreeError::InvalidPatchDimension {
            dimension,
            min,
            max,
            extent,
        });
    }
    Ok(())
}

/// Family of candidate directions the splitter searches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SplitterKind {
    /// Single-feature thresholds.
    Axis,
    /// Sparse random `±1` projections.
    Oblique {
        /// Average non-zeros per projection; `None` means `min(n_features, 1.5)`.
        feature_combinations: Option<f64>,
    },
    /// Unit-weight rectangular windows over a reshaped feature grid.
    Patch(PatchConfig),
}

impl SplitterKind {
    fn resolve(&self, n_features: usize) -> Result<ProjectionSampler, TreeError> {
        match self {
            SplitterKind::Axis => Ok(ProjectionSampler::Axis),
            SplitterKind::Oblique {
                feature_combinations,
            } => {
                let fc = match *feature_combinations {
                    None => (n_features as f64).min(1.5),
                    Some(fc) if fc >= 1.0 && fc <= n_features as f64 => fc,
                    Some(fc) => {
                        return Err(TreeError::InvalidFeatureCombinations {
                            feature_combinations: fc,
                            n_features,
                        });
                    }
                };
                Ok(ProjectionSampler::Oblique {
                    feature_combinations: fc,
                })
            }
            SplitterKind::Patch(patch) => Ok(ProjectionSampler::Patch(patch.resolve(n_features)?)),
        }
    }
}

/// Everything `fit` derives from the config and dataset before growth.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Resolved {
    pub(crate) rule: StoppingRule,
    pub(crate) max_features: usize,
    pub(crate) sampler: ProjectionSampler,
}

/// Configuration for a single decision tree.
///
/// Construct via [`DecisionTreeConfig::new`], then chain `with_*` methods.
///
/// # Defaults
///
/// | Parameter                  | Default                       |
/// |----------------------------|-------------------------------|
/// | `criterion`                | `Gini`                        |
/// | `splitter`                 | `Axis`                        |
/// | `max_depth`                | `None` (unlimited)            |
/// | `min_samples_split`        | `Count(2)`                    |
/// | `min_samples_leaf`         | `Count(1)`                    |
/// | `min_weight_fraction_leaf` | 0.0                           |
/// | `max_features`             | `All`                         |
/// | `max_leaf_nodes`           | `None` (depth-first growth)   |
/// | `min_impurity_decrease`    | 0.0                           |
/// | `seed`                     | 42                            |
#[derive(Debug, Clone)]
pub struct DecisionTreeConfig {
    pub(crate) criterion: SplitCriterion,
    pub(crate) splitter: SplitterKind,
    pub(crate) max_depth: Option<usize>,
    pub(crate) min_samples_split: SampleCount,
    pub(crate) min_samples_leaf: SampleCount,
    pub(crate) min_weight_fraction_leaf: f64,
    pub(crate) max_features: MaxFeatures,
    pub(crate) max_leaf_nodes: Option<usize>,
    pub(crate) min_impurity_decrease: f64,
    pub(crate) seed: u64,
}

impl DecisionTreeConfig {
    /// Create a new config with default values.
    ///
    /// All parameters use the defaults shown in the struct-level documentation.
    #[must_use]
    pub fn new() -> Self {
        Self {
            criterion: SplitCriterion::Gini,
            splitter: SplitterKind::Axis,
            max_depth: None,
            min_samples_split: SampleCount::Count(2),
            min_samples_leaf: SampleCount::Count(1),
            min_weight_fraction_leaf: 0.0,
            max_features: MaxFeatures::All,
            max_leaf_nodes: None,
            min_impurity_decrease: 0.0,
            seed: 42,
        }
    }

    /// Set the split quality criterion.
    #[must_use]
    pub fn with_criterion(mut self, criterion: SplitCriterion) -> Self {
        self.criterion = criterion;
        self
    }

    /// Set the family of candidate directions.
    #[must_use]
    pub fn with_splitter(mut self, splitter: SplitterKind) -> Self {
        self.splitter = splitter;
        self
    }

    /// Set the maximum tree depth.
    ///
    /// `None` means grow until all leaves are pure or stopping conditions
    /// are met. `Some(d)` limits depth to `d` levels (root is depth 0).
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Set the minimum number of samples required to attempt a split.
    #[must_use]
    pub fn with_min_samples_split(mut self, min_samples_split: SampleCount) -> Self {
        self.min_samples_split = min_samples_split;
        self
    }

    /// Set the minimum number of samples required in each leaf after a split.
    #[must_use]
    pub fn with_min_samples_leaf(mut self, min_samples_leaf: SampleCount) -> Self {
        self.min_samples_leaf = min_samples_leaf;
        self
    }

    /// Set the minimum fraction of the total sample weight required in each leaf.
    #[must_use]
    pub fn with_min_weight_fraction_leaf(mut self, fraction: f64) -> Self {
        self.min_weight_fraction_leaf = fraction;
        self
    }

    /// Set the number of candidate directions drawn per node.
    #[must_use]
    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = max_features;
        self
    }

    /// Set the leaf budget. `Some(k)` switches to best-first growth.
    #[must_use]
    pub fn with_max_leaf_nodes(mut self, max_leaf_nodes: Option<usize>) -> Self {
        self.max_leaf_nodes = max_leaf_nodes;
        self
    }

    /// Set the minimum weighted impurity decrease a split must achieve.
    #[must_use]
    pub fn with_min_impurity_decrease(mut self, min_impurity_decrease: f64) -> Self {
        self.min_impurity_decrease = min_impurity_decrease;
        self
    }

    /// Set the random seed for reproducibility.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    // --- Getters ---

    /// Return the split criterion.
    #[must_use]
    pub fn criterion(&self) -> SplitCriterion {
        self.criterion
    }

    /// Return the splitter family.
    #[must_use]
    pub fn splitter(&self) -> SplitterKind {
        self.splitter
    }

    /// Return the maximum depth limit, if any.
    #[must_use]
    pub fn max_depth(&self) -> Option<usize> {
        self.max_depth
    }

    /// Return the minimum samples required to split a node.
    #[must_use]
    pub fn min_samples_split(&self) -> SampleCount {
        self.min_samples_split
    }

    /// Return the minimum samples required in each leaf.
    #[must_use]
    pub fn min_samples_leaf(&self) -> SampleCount {
        self.min_samples_leaf
    }

    /// Return the minimum leaf weight fraction.
    #[must_use]
    pub fn min_weight_fraction_leaf(&self) -> f64 {
        self.min_weight_fraction_leaf
    }

    /// Return the candidate directions drawn per node.
    #[must_use]
    pub fn max_features(&self) -> MaxFeatures {
        self.max_features
    }

    /// Return the leaf budget, if any.
    #[must_use]
    pub fn max_leaf_nodes(&self) -> Option<usize> {
        self.max_leaf_nodes
    }

    /// Return the minimum impurity decrease.
    #[must_use]
    pub fn min_impurity_decrease(&self) -> f64 {
        self.min_impurity_decrease
    }

    /// Return the random seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Validate the config against `data` and derive the growth parameters.
    pub(crate) fn resolve(&self, data: &Dataset) -> Result<Resolved, TreeError> {
        let n_samples = data.n_samples();
        let n_features = data.n_features();

        if let Some(d) = self.max_depth
            && d == 0
        {
            return Err(TreeError::InvalidMaxDepth { max_depth: 0 });
        }

        let min_samples_leaf = match self.min_samples_leaf {
            SampleCount::Count(c) if c >= 1 => c,
            SampleCount::Fraction(f) if f > 0.0 && f < 1.0 => (f * n_samples as f64).ceil() as usize,
            other => {
                return Err(TreeError::InvalidMinSamplesLeaf {
                    value: other.to_string(),
                });
            }
        };

        let min_samples_split = match self.min_samples_split {
            SampleCount::Count(c) if c >= 2 => c,
            SampleCount::Fraction(f) if f > 0.0 && f <= 1.0 => {
                ((f * n_samples as f64).ceil() as usize).max(2)
            }
            other => {
                return Err(TreeError::InvalidMinSamplesSplit {
                    value: other.to_string(),
                });
            }
        }
        .max(2 * min_samples_leaf);

        let fraction = self.min_weight_fraction_leaf;
        if !(0.0..=0.5).contains(&fraction) {
            return Err(TreeError::InvalidMinWeightFractionLeaf { fraction });
        }

        if let Some(k) = self.max_leaf_nodes
            && k < 2
        {
            return Err(TreeError::InvalidMaxLeafNodes { max_leaf_nodes: k });
        }

        let value = self.min_impurity_decrease;
        if !value.is_finite() || value < 0.0 {
            return Err(TreeError::InvalidMinImpurityDecrease { value });
        }

        let max_features = self.max_features.resolve(n_features)?;
        let sampler = self.splitter.resolve(n_features)?;

        Ok(Resolved {
            rule: StoppingRule {
                max_depth: self.max_depth.unwrap_or(usize::MAX),
                min_samples_split,
                min_samples_leaf,
                min_weight_leaf: fraction * data.total_weight(),
                min_impurity_decrease: value,
            },
            max_features,
            sampler,
        })
    }

    /// Train a decision tree on `data`.
    ///
    /// The criterion must match the dataset's target: classification
    /// criteria need class labels, regression criteria continuous targets,
    /// unsupervised criteria no target.
    ///
    /// # Errors
    ///
    /// | Variant                                     | When                                        |
    /// |---------------------------------------------|---------------------------------------------|
    /// | [`TreeError::CriterionTargetMismatch`]      | criterion and target kinds disagree         |
    /// | [`TreeError::InvalidPoissonTarget`]         | Poisson target negative or summing to <= 0  |
    /// | [`TreeError::InvalidMaxDepth`]              | `max_depth` is `Some(0)`                    |
    /// | [`TreeError::InvalidMinSamplesSplit`]       | count < 2 or fraction outside (0, 1]        |
    /// | [`TreeError::InvalidMinSamplesLeaf`]        | count < 1 or fraction outside (0, 1)        |
    /// | [`TreeError::InvalidMinWeightFractionLeaf`] | fraction outside [0, 0.5]                   |
    /// | [`TreeError::InvalidMaxFeatures`]           | resolves outside [1, n_features]            |
    /// | [`TreeError::InvalidMaxLeafNodes`]          | `max_leaf_nodes` < 2                        |
    /// | [`TreeError::InvalidMinImpurityDecrease`]   | negative or non-finite                      |
    /// | [`TreeError::InvalidFeatureCombinations`]   | outside [1, n_features]                     |
    /// | [`TreeError::PatchGridMismatch`]            | `data_height * data_width != n_features`    |
    /// | [`TreeError::InvalidPatchDimension`]        | patch range empty or larger than the grid   |
    #[instrument(
        skip_all,
        fields(
            n_samples = data.n_samples(),
            n_features = data.n_features(),
            criterion = self.criterion.name()
        )
    )]
    pub fn fit(&self, data: &Dataset) -> Result<DecisionTree, TreeError> {
        let kind = self.check_target(data)?;
        let resolved = self.resolve(data)?;

        debug!(
            max_features = resolved.max_features,
            min_samples_split = resolved.rule.min_samples_split,
            min_samples_leaf = resolved.rule.min_samples_leaf,
            best_first = self.max_leaf_nodes.is_some(),
            "fitting decision tree"
        );

        let total = data.total_weight();
        let tree = match (self.criterion, data.target()) {
            (SplitCriterion::Gini, Target::Classes { n_classes, .. }) => self.grow(
                ClassificationCriterion::new(ClassImpurity::Gini, n_classes, total),
                &resolved,
                data,
                kind,
            ),
            (SplitCriterion::Entropy, Target::Classes { n_classes, .. }) => self.grow(
                ClassificationCriterion::new(ClassImpurity::Entropy, n_classes, total),
                &resolved,
                data,
                kind,
            ),
            (criterion, Target::Continuous { n_outputs, .. }) => {
                let impurity = match criterion {
                    SplitCriterion::FriedmanMse => RegressionImpurity::FriedmanMse,
                    SplitCriterion::AbsoluteError => RegressionImpurity::AbsoluteError,
                    SplitCriterion::Poisson => RegressionImpurity::Poisson,
                    _ => RegressionImpurity::SquaredError,
                };
                self.grow(
                    RegressionCriterion::new(impurity, *n_outputs, total),
                    &resolved,
                    data,
                    kind,
                )
            }
            (criterion, _) => {
                let impurity = if criterion == SplitCriterion::FastBic {
                    UnsupervisedImpurity::FastBic
                } else {
                    UnsupervisedImpurity::TwoMeans
                };
                self.grow(UnsupervisedCriterion::new(impurity, total), &resolved, data, kind)
            }
        };
        Ok(tree)
    }

    /// Check the criterion against the target and return the resulting tree kind.
    fn check_target(&self, data: &Dataset) -> Result<TreeKind, TreeError> {
        let family = self.criterion.family();
        let kind = match (family, data.target()) {
            (CriterionFamily::Classification, Target::Classes { n_classes, .. }) => {
                TreeKind::Classification {
                    n_classes: n_classes.clone(),
                }
            }
            (CriterionFamily::Regression, Target::Continuous { values, n_outputs }) => {
                if self.criterion == SplitCriterion::Poisson {
                    check_poisson(values, *n_outputs)?;
                }
                TreeKind::Regression {
                    n_outputs: *n_outputs,
                }
            }
            (CriterionFamily::Unsupervised, Target::None) => TreeKind::Unsupervised,
            (_, target) => {
                return Err(TreeError::CriterionTargetMismatch {
                    criterion: self.criterion.name(),
                    target: target.kind_name(),
                });
            }
        };
        Ok(kind)
    }

    fn grow<C: Criterion>(
        &self,
        criterion: C,
        resolved: &Resolved,
        data: &Dataset,
        kind: TreeKind,
    ) -> DecisionTree {
        let mut splitter = Splitter::new(
            criterion,
            resolved.sampler,
            resolved.max_features,
            resolved.rule.min_samples_leaf,
            resolved.rule.min_weight_leaf,
            self.seed,
        );
        match self.max_leaf_nodes {
            Some(k) => BestFirstBuilder::new(resolved.rule, k).build(&mut splitter, data, kind),
            None => DepthFirstBuilder::new(resolved.rule).build(&mut splitter, data, kind),
        }
    }
}

impl Default for DecisionTreeConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Reject negative targets and outputs whose target sum is not positive.
fn check_poisson(values: &[f64], n_outputs: usize) -> Result<(), TreeError> {
    if values.iter().any(|&y| y < 0.0) {
        return Err(TreeError::InvalidPoissonTarget);
    }
    for k in 0..n_outputs {
        let sum: f64 = values.iter().skip(k).step_by(n_outputs).sum();
        if sum <= 0.0 {
            return Err(TreeError::InvalidPoissonTarget);
        }
    }
    Ok(())
}
