//! Impurity criteria and the incremental-statistics contract the splitter drives.

use crate::dataset::Dataset;

/// Impurity at or below this value marks a node as pure.
pub(crate) const EPSILON: f64 = f64::EPSILON;

/// Criterion used to rank candidate splits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SplitCriterion {
    /// Gini impurity: `1 - Σ p_k²`, averaged over outputs.
    Gini,
    /// Shannon entropy in bits (log loss): `-Σ p_k log2 p_k`.
    Entropy,
    /// Weighted variance of the target.
    SquaredError,
    /// Squared error with Friedman's improvement score.
    FriedmanMse,
    /// Weighted mean absolute deviation from the median.
    AbsoluteError,
    /// Half Poisson deviance; targets must be non-negative.
    Poisson,
    /// Unsupervised: variance of the projected values.
    TwoMeans,
    /// Unsupervised: Gaussian two-cluster BIC of the projected values.
    FastBic,
}

/// Which kind of target a criterion consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CriterionFamily {
    Classification,
    Regression,
    Unsupervised,
}

impl SplitCriterion {
    /// Return the canonical lowercase name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            SplitCriterion::Gini => "gini",
            SplitCriterion::Entropy => "entropy",
            SplitCriterion::SquaredError => "squared_error",
            SplitCriterion::FriedmanMse => "friedman_mse",
            SplitCriterion::AbsoluteError => "absolute_error",
            SplitCriterion::Poisson => "poisson",
            SplitCriterion::TwoMeans => "twomeans",
            SplitCriterion::FastBic => "fastbic",
        }
    }

    pub(crate) fn family(self) -> CriterionFamily {
        match self {
            SplitCriterion::Gini | SplitCriterion::Entropy => CriterionFamily::Classification,
            SplitCriterion::SquaredError
            | SplitCriterion::FriedmanMse
            | SplitCriterion::AbsoluteError
            | SplitCriterion::Poisson => CriterionFamily::Regression,
            SplitCriterion::TwoMeans | SplitCriterion::FastBic => CriterionFamily::Unsupervised,
        }
    }
}

impl std::str::FromStr for SplitCriterion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gini" => Ok(SplitCriterion::Gini),
            "entropy" | "log_loss" => Ok(SplitCriterion::Entropy),
            "squared_error" => Ok(SplitCriterion::SquaredError),
            "friedman_mse" => Ok(SplitCriterion::FriedmanMse),
            "absolute_error" => Ok(SplitCriterion::AbsoluteError),
            "poisson" => Ok(SplitCriterion::Poisson),
            "twomeans" => Ok(SplitCriterion::TwoMeans),
            "fastbic" => Ok(SplitCriterion::FastBic),
            other => Err(format!("unknown criterion '{other}'")),
        }
    }
}

/// Per-node statistics recorded in the tree.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct NodeSummary {
    pub(crate) impurity: f64,
    pub(crate) weighted_n_samples: f64,
    pub(crate) value: Vec<f64>,
}

/// Incremental impurity bookkeeping over one node's samples.
///
/// The splitter calls [`init`](Criterion::init) with the node's samples
/// (sorted by projected value) and the aligned projected values, then
/// [`reset`](Criterion::reset), then [`update`](Criterion::update) with
/// increasing split positions. Samples `[0, pos)` form the left child.
/// Supervised criteria ignore `values`.
pub(crate) trait Criterion: Clone {
    /// Load the node's samples and compute totals.
    fn init(&mut self, data: &Dataset, samples: &[usize], values: &[f64]);

    /// Move the split position back to 0 (everything on the right).
    fn reset(&mut self);

    /// Advance the split position to `new_pos`, which must not decrease.
    fn update(&mut self, data: &Dataset, samples: &[usize], values: &[f64], new_pos: usize);

    /// Impurity of the node loaded by `init`.
    fn node_impurity(&self) -> f64;

    /// `(left, right)` impurities at the current position.
    fn children_impurity(&self, data: &Dataset, samples: &[usize], values: &[f64]) -> (f64, f64);

    /// Weighted sample count of the root, set at construction.
    fn weighted_n_total(&self) -> f64;

    /// Weighted sample count of the loaded node.
    fn weighted_n_node(&self) -> f64;

    /// Weighted sample count left of the current position.
    fn weighted_n_left(&self) -> f64;

    /// Weighted sample count right of the current position.
    fn weighted_n_right(&self) -> f64;

    /// Score that ranks positions like [`impurity_improvement`](Criterion::impurity_improvement)
    /// but may be cheaper to compute.
    fn proxy_impurity_improvement(&self, data: &Dataset, samples: &[usize], values: &[f64]) -> f64 {
        let (left, right) = self.children_impurity(data, samples, values);
        -self.weighted_n_right() * right - self.weighted_n_left() * left
    }

    /// Weighted impurity decrease of the current split:
    /// `N_t / N * (parent - N_t_R / N_t * right - N_t_L / N_t * left)`.
    fn impurity_improvement(&self, parent: f64, left: f64, right: f64) -> f64 {
        let n_t = self.weighted_n_node();
        (n_t / self.weighted_n_total())
            * (parent - self.weighted_n_right() / n_t * right - self.weighted_n_left() / n_t * left)
    }

    /// Impurity, weighted count and leaf value recorded for a node.
    fn node_summary(&mut self, data: &Dataset, samples: &[usize]) -> NodeSummary;
}

/// Weighted mean and variance from running sums, clamped at zero.
#[inline]
pub(crate) fn variance(sum: f64, sq_sum: f64, weight: f64) -> f64 {
    if weight <= 0.0 {
        return 0.0;
    }
    let mean = sum / weight;
    (sq_sum / weight - mean * mean).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_parse_back() {
        for c in [
            SplitCriterion::Gini,
            SplitCriterion::Entropy,
            SplitCriterion::SquaredError,
            SplitCriterion::FriedmanMse,
            SplitCriterion::AbsoluteError,
            SplitCriterion::Poisson,
            SplitCriterion::TwoMeans,
            SplitCriterion::FastBic,
        ] {
            assert_eq!(c.name().parse::<SplitCriterion>(), Ok(c));
        }
        assert_eq!("log_loss".parse::<SplitCriterion>(), Ok(SplitCriterion::Entropy));
        assert!("mse".parse::<SplitCriterion>().is_err());
    }

    #[test]
    fn families() {
        assert_eq!(SplitCriterion::Entropy.family(), CriterionFamily::Classification);
        assert_eq!(SplitCriterion::Poisson.family(), CriterionFamily::Regression);
        assert_eq!(SplitCriterion::FastBic.family(), CriterionFamily::Unsupervised);
    }

    #[test]
    fn variance_of_constant_is_zero() {
        assert_eq!(variance(6.0, 12.0, 3.0), 0.0);
        assert_eq!(variance(0.0, 0.0, 0.0), 0.0);
    }

    #[test]
    fn variance_matches_definition() {
        // values 1, 2, 3
        assert!((variance(6.0, 14.0, 3.0) - 2.0 / 3.0).abs() < 1e-12);
    }
}
