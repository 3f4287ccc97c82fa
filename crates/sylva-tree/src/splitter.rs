use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::{
    criterion::{Criterion, NodeSummary},
    dataset::Dataset,
    node::SplitRule,
    projection::ProjectionSampler,
};

/// Projected values closer than this are treated as equal.
pub(crate) const FEATURE_THRESHOLD: f64 = 1e-7;

/// The best split found for a node.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SplitRecord {
    /// Routing rule of the split.
    pub rule: SplitRule,
    /// Number of node samples routed left; they occupy `samples[..pos]` after partitioning.
    pub pos: usize,
    /// Weighted impurity decrease.
    pub improvement: f64,
    /// Impurity of the left partition, measured by the split criterion.
    pub impurity_left: f64,
    /// Impurity of the right partition, measured by the split criterion.
    pub impurity_right: f64,
}

/// Best-split search over sampled projections.
///
/// The splitter owns its criterion and random stream. Independent builds
/// must each receive their own criterion value (clone it before handing it
/// over) and seed.
#[derive(Debug, Clone)]
pub(crate) struct Splitter<C: Criterion> {
    criterion: C,
    sampler: ProjectionSampler,
    max_features: usize,
    min_samples_leaf: usize,
    min_weight_leaf: f64,
    rng: ChaCha8Rng,
    pairs: Vec<(f64, usize)>,
    sorted_samples: Vec<usize>,
    sorted_values: Vec<f64>,
    best_samples: Vec<usize>,
}

impl<C: Criterion> Splitter<C> {
    /// Create a splitter that takes ownership of `criterion`.
    #[must_use]
    pub fn new(
        criterion: C,
        sampler: ProjectionSampler,
        max_features: usize,
        min_samples_leaf: usize,
        min_weight_leaf: f64,
        seed: u64,
    ) -> Self {
        Self {
            criterion,
            sampler,
            max_features,
            min_samples_leaf,
            min_weight_leaf,
            rng: ChaCha8Rng::seed_from_u64(seed),
            pairs: Vec::new(),
            sorted_samples: Vec::new(),
            sorted_values: Vec::new(),
            best_samples: Vec::new(),
        }
    }

    /// Compute the statistics recorded for a node holding `samples`.
    pub(crate) fn node_reset(&mut self, data: &Dataset, samples: &[usize]) -> NodeSummary {
        self.criterion.node_summary(data, samples)
    }

    /// Search the sampled candidates for the best admissible split of `samples`.
    ///
    /// On success `samples` is partitioned in place so that the first
    /// `pos` entries go left. Returns `None` (leaving `samples` untouched)
    /// when every candidate is constant or violates the leaf constraints.
    pub fn node_split(&mut self, data: &Dataset, samples: &mut [usize]) -> Option<SplitRecord> {
        let n = samples.len();
        if n < 2 {
            return None;
        }
        let candidates = self.sampler.sample(data.n_features(), self.max_features, &mut self.rng);

        let mut best_proxy = f64::NEG_INFINITY;
        let mut best: Option<(usize, usize, f64)> = None;
        let mut saved: Option<usize> = None;

        for (ci, candidate) in candidates.iter().enumerate() {
            self.pairs.clear();
            self.pairs
                .extend(samples.iter().map(|&s| (candidate.project(data, s), s)));
            self.pairs
                .sort_unstable_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

            if self.pairs[n - 1].0 <= self.pairs[0].0 + FEATURE_THRESHOLD {
                continue;
            }

            self.sorted_samples.clear();
            self.sorted_values.clear();
            for &(v, s) in &self.pairs {
                self.sorted_values.push(v);
                self.sorted_samples.push(s);
            }
            let (ss, sv) = (&self.sorted_samples, &self.sorted_values);

            self.criterion.init(data, ss, sv);

            let mut p = 0;
            while p < n {
                while p + 1 < n && sv[p + 1] <= sv[p] + FEATURE_THRESHOLD {
                    p += 1;
                }
                p += 1;
                if p >= n {
                    break;
                }
                if p < self.min_samples_leaf || n - p < self.min_samples_leaf {
                    continue;
                }
                self.criterion.update(data, ss, sv, p);
                if self.criterion.weighted_n_left() < self.min_weight_leaf
                    || self.criterion.weighted_n_right() < self.min_weight_leaf
                {
                    continue;
                }
                let proxy = self.criterion.proxy_impurity_improvement(data, ss, sv);
                if proxy > best_proxy {
                    best_proxy = proxy;
                    best = Some((ci, p, midpoint(sv[p - 1], sv[p])));
                    if saved != Some(ci) {
                        self.best_samples.clear();
                        self.best_samples.extend_from_slice(ss);
                        saved = Some(ci);
                    }
                }
            }
        }

        let (ci, pos, threshold) = best?;
        let candidate = candidates.into_iter().nth(ci)?;

        // The sweep order of the winning candidate is the partition: the
        // first `pos` samples project at or below the threshold.
        samples.copy_from_slice(&self.best_samples);

        self.sorted_values.clear();
        self.sorted_values
            .extend(samples.iter().map(|&s| candidate.project(data, s)));
        let values = &self.sorted_values;
        self.criterion.init(data, samples, values);
        let parent = self.criterion.node_impurity();
        self.criterion.update(data, samples, values, pos);
        let (impurity_left, impurity_right) = self.criterion.children_impurity(data, samples, values);
        let improvement = self
            .criterion
            .impurity_improvement(parent, impurity_left, impurity_right);

        Some(SplitRecord {
            rule: candidate.into_rule(threshold),
            pos,
            improvement,
            impurity_left,
            impurity_right,
        })
    }
}

/// Threshold halfway between two consecutive distinct values.
///
/// Falls back to `lo` when rounding pushes the midpoint onto `hi` or past
/// the finite range.
fn midpoint(lo: f64, hi: f64) -> f64 {
    let mid = lo / 2.0 + hi / 2.0;
    if mid == hi || !mid.is_finite() { lo } else { mid }
}

#[cfg(test)]
mod tests {
    use rand::Rng;

    use super::*;
    use crate::classification::{ClassImpurity, ClassificationCriterion};
    use crate::node::FeatureIndex;
    use crate::unsupervised::{UnsupervisedCriterion, UnsupervisedImpurity};

    fn gini_splitter(max_features: usize, min_samples_leaf: usize) -> Splitter<ClassificationCriterion> {
        Splitter::new(
            ClassificationCriterion::new(ClassImpurity::Gini, &[2], 6.0),
            ProjectionSampler::Axis,
            max_features,
            min_samples_leaf,
            0.0,
            42,
        )
    }

    // --- Axis ---

    #[test]
    fn separable_data_finds_correct_split() {
        let rows: Vec<Vec<f64>> = [1.0, 2.0, 3.0, 10.0, 11.0, 12.0].iter().map(|&x| vec![x]).collect();
        let data = Dataset::classification(&rows, &[0, 0, 0, 1, 1, 1]).unwrap();
        let mut samples: Vec<usize> = vec![5, 0, 4, 1, 3, 2];
        let split = gini_splitter(1, 1).node_split(&data, &mut samples).expect("split");

        assert_eq!(split.pos, 3);
        assert_eq!(
            split.rule,
            SplitRule::Axis {
                feature: FeatureIndex::new(0),
                threshold: 6.5
            }
        );
        let mut left = samples[..3].to_vec();
        left.sort_unstable();
        assert_eq!(left, vec![0, 1, 2]);
        assert!((split.improvement - 0.5).abs() < 1e-12);
        assert_eq!((split.impurity_left, split.impurity_right), (0.0, 0.0));
    }

    #[test]
    fn constant_feature_returns_none() {
        let rows = vec![vec![5.0]; 4];
        let data = Dataset::classification(&rows, &[0, 0, 1, 1]).unwrap();
        let mut samples: Vec<usize> = (0..4).collect();
        assert!(gini_splitter(1, 1).node_split(&data, &mut samples).is_none());
        assert_eq!(samples, vec![0, 1, 2, 3]);
    }

    #[test]
    fn min_samples_leaf_enforced() {
        let rows = vec![vec![1.0], vec![10.0]];
        let data = Dataset::classification(&rows, &[0, 1]).unwrap();
        let mut samples = vec![0, 1];
        assert!(gini_splitter(1, 2).node_split(&data, &mut samples).is_none());
    }

    #[test]
    fn min_weight_leaf_enforced() {
        let rows: Vec<Vec<f64>> = (0..4).map(|i| vec![i as f64]).collect();
        let data = Dataset::classification(&rows, &[0, 1, 1, 1])
            .unwrap()
            .with_weights(&[1.0, 1.0, 1.0, 1.0])
            .unwrap();
        let mut splitter = Splitter::new(
            ClassificationCriterion::new(ClassImpurity::Gini, &[2], 4.0),
            ProjectionSampler::Axis,
            1,
            1,
            2.0,
            0,
        );
        let mut samples: Vec<usize> = (0..4).collect();
        let split = splitter.node_split(&data, &mut samples).expect("split");
        // the pure cut at pos 1 leaves only weight 1 on the left
        assert_eq!(split.pos, 2);
    }

    #[test]
    fn best_feature_chosen_among_many() {
        let rows: Vec<Vec<f64>> = (0..8)
            .map(|i| vec![(i * 7 % 8) as f64, if i < 4 { 0.0 } else { 1.0 }, 3.0])
            .collect();
        let labels: Vec<usize> = (0..8).map(|i| usize::from(i >= 4)).collect();
        let data = Dataset::classification(&rows, &labels).unwrap();
        let mut splitter = Splitter::new(
            ClassificationCriterion::new(ClassImpurity::Entropy, &[2], 8.0),
            ProjectionSampler::Axis,
            3,
            1,
            0.0,
            5,
        );
        let mut samples: Vec<usize> = (0..8).collect();
        let split = splitter.node_split(&data, &mut samples).expect("split");
        assert_eq!(
            split.rule,
            SplitRule::Axis {
                feature: FeatureIndex::new(1),
                threshold: 0.5
            }
        );
    }

    #[test]
    fn partition_agrees_with_rule_routing() {
        let mut rng = ChaCha8Rng::seed_from_u64(17);
        let rows: Vec<Vec<f64>> = (0..40)
            .map(|_| (0..4).map(|_| rng.gen_range(-5.0..5.0)).collect())
            .collect();
        let labels: Vec<usize> = rows.iter().map(|r| usize::from(r[0] - r[2] > 0.5)).collect();
        let data = Dataset::classification(&rows, &labels).unwrap();
        let mut splitter = Splitter::new(
            ClassificationCriterion::new(ClassImpurity::Gini, &[2], 40.0),
            ProjectionSampler::Oblique {
                feature_combinations: 2.0,
            },
            4,
            3,
            0.0,
            1,
        );
        let mut samples: Vec<usize> = (0..40).rev().collect();
        let split = splitter.node_split(&data, &mut samples).expect("split");
        assert!(split.pos >= 3 && split.pos <= 37);
        for (i, &s) in samples.iter().enumerate() {
            assert_eq!(split.rule.goes_left(data.row(s)), i < split.pos, "sample {s}");
        }
        let mut sorted = samples.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..40).collect::<Vec<_>>());
    }

    // --- Unsupervised ---

    #[test]
    fn unsupervised_split_separates_clusters() {
        let rows = vec![vec![0.0, 0.0], vec![0.1, 0.0], vec![10.0, 0.0], vec![10.1, 0.0]];
        let data = Dataset::unsupervised(&rows).unwrap();
        let mut splitter = Splitter::new(
            UnsupervisedCriterion::new(UnsupervisedImpurity::TwoMeans, 4.0),
            ProjectionSampler::Axis,
            2,
            1,
            0.0,
            42,
        );
        let mut samples: Vec<usize> = (0..4).collect();
        let split = splitter.node_split(&data, &mut samples).expect("split");
        assert_eq!(split.pos, 2);
        assert!((split.rule.threshold() - 5.05).abs() < 1e-12);
        assert!(split.improvement > 0.0);
    }

    // --- Threshold ---

    #[test]
    fn midpoint_falls_back_on_adjacent_floats() {
        let lo = 1.0_f64;
        let hi = f64::from_bits(lo.to_bits() + 1);
        assert_eq!(midpoint(lo, hi), lo);
        assert_eq!(midpoint(1.0, 3.0), 2.0);
        assert_eq!(midpoint(f64::MAX, f64::MAX), f64::MAX);
    }
}
