use crate::criterion::{Criterion, NodeSummary};
use crate::dataset::Dataset;

/// Node impurity measure over class distributions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassImpurity {
    /// `1 - Σ p_k²`
    Gini,
    /// `-Σ p_k log2 p_k`
    Entropy,
}

impl ClassImpurity {
    /// Impurity of one output's weighted class counts.
    fn of(self, counts: &[f64], weight: f64) -> f64 {
        if weight <= 0.0 {
            return 0.0;
        }
        match self {
            ClassImpurity::Gini => {
                let sum_sq: f64 = counts.iter().map(|&c| (c / weight) * (c / weight)).sum();
                1.0 - sum_sq
            }
            ClassImpurity::Entropy => -counts
                .iter()
                .filter(|&&c| c > 0.0)
                .map(|&c| {
                    let p = c / weight;
                    p * p.log2()
                })
                .sum::<f64>(),
        }
    }
}

/// Weighted class-count criterion for (multi-output) classification.
///
/// Counts for every output are stored back to back; output `k` occupies
/// `offsets[k]..offsets[k] + n_classes[k]`.
#[derive(Debug, Clone)]
pub struct ClassificationCriterion {
    impurity: ClassImpurity,
    n_classes: Vec<usize>,
    offsets: Vec<usize>,
    total: Vec<f64>,
    left: Vec<f64>,
    weighted_n_total: f64,
    weighted_n_node: f64,
    weighted_n_left: f64,
    pos: usize,
}

impl ClassificationCriterion {
    /// Create a criterion for the given per-output class counts.
    #[must_use]
    pub fn new(impurity: ClassImpurity, n_classes: &[usize], weighted_n_total: f64) -> Self {
        let mut offsets = Vec::with_capacity(n_classes.len());
        let mut width = 0;
        for &n in n_classes {
            offsets.push(width);
            width += n;
        }
        Self {
            impurity,
            n_classes: n_classes.to_vec(),
            offsets,
            total: vec![0.0; width],
            left: vec![0.0; width],
            weighted_n_total,
            weighted_n_node: 0.0,
            weighted_n_left: 0.0,
            pos: 0,
        }
    }

    fn output(&self, k: usize) -> std::ops::Range<usize> {
        self.offsets[k]..self.offsets[k] + self.n_classes[k]
    }

    fn mean_impurity(&self, counts: &[f64], weight: f64) -> f64 {
        let n_outputs = self.n_classes.len();
        (0..n_outputs)
            .map(|k| self.impurity.of(&counts[self.output(k)], weight))
            .sum::<f64>()
            / n_outputs as f64
    }

    fn right_counts(&self) -> Vec<f64> {
        self.total
            .iter()
            .zip(&self.left)
            .map(|(t, l)| t - l)
            .collect()
    }
}

impl Criterion for ClassificationCriterion {
    fn init(&mut self, data: &Dataset, samples: &[usize], _values: &[f64]) {
        self.total.iter_mut().for_each(|c| *c = 0.0);
        self.weighted_n_node = 0.0;
        for &s in samples {
            let w = data.weight(s);
            for k in 0..self.n_classes.len() {
                self.total[self.offsets[k] + data.label(s, k)] += w;
            }
            self.weighted_n_node += w;
        }
        self.reset();
    }

    fn reset(&mut self) {
        self.left.iter_mut().for_each(|c| *c = 0.0);
        self.weighted_n_left = 0.0;
        self.pos = 0;
    }

    fn update(&mut self, data: &Dataset, samples: &[usize], _values: &[f64], new_pos: usize) {
        for &s in &samples[self.pos..new_pos] {
            let w = data.weight(s);
            for k in 0..self.n_classes.len() {
                self.left[self.offsets[k] + data.label(s, k)] += w;
            }
            self.weighted_n_left += w;
        }
        self.pos = new_pos;
    }

    fn node_impurity(&self) -> f64 {
        self.mean_impurity(&self.total, self.weighted_n_node)
    }

    fn children_impurity(&self, _data: &Dataset, _samples: &[usize], _values: &[f64]) -> (f64, f64) {
        let right = self.right_counts();
        (
            self.mean_impurity(&self.left, self.weighted_n_left),
            self.mean_impurity(&right, self.weighted_n_right()),
        )
    }

    fn weighted_n_total(&self) -> f64 {
        self.weighted_n_total
    }

    fn weighted_n_node(&self) -> f64 {
        self.weighted_n_node
    }

    fn weighted_n_left(&self) -> f64 {
        self.weighted_n_left
    }

    fn weighted_n_right(&self) -> f64 {
        self.weighted_n_node - self.weighted_n_left
    }

    fn node_summary(&mut self, data: &Dataset, samples: &[usize]) -> NodeSummary {
        self.init(data, samples, &[]);
        NodeSummary {
            impurity: self.node_impurity(),
            weighted_n_samples: self.weighted_n_node,
            value: self.total.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset(labels: &[usize]) -> Dataset {
        let rows: Vec<Vec<f64>> = (0..labels.len()).map(|i| vec![i as f64]).collect();
        Dataset::classification(&rows, labels).unwrap()
    }

    // --- Impurity ---

    #[test]
    fn gini_binary_balanced() {
        let data = dataset(&[0, 0, 1, 1]);
        let mut c = ClassificationCriterion::new(ClassImpurity::Gini, &[2], 4.0);
        c.init(&data, &[0, 1, 2, 3], &[]);
        assert!((c.node_impurity() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn entropy_is_base_two() {
        let data = dataset(&[0, 0, 1, 1]);
        let mut c = ClassificationCriterion::new(ClassImpurity::Entropy, &[2], 4.0);
        c.init(&data, &[0, 1, 2, 3], &[]);
        assert!((c.node_impurity() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn pure_node_has_zero_impurity() {
        let data = dataset(&[1, 1, 1]);
        let mut c = ClassificationCriterion::new(ClassImpurity::Gini, &[2], 3.0);
        c.init(&data, &[0, 1, 2], &[]);
        assert_eq!(c.node_impurity(), 0.0);
    }

    // --- Sweep ---

    #[test]
    fn perfect_split_children_are_pure() {
        let data = dataset(&[0, 0, 1, 1]);
        let samples = [0, 1, 2, 3];
        let mut c = ClassificationCriterion::new(ClassImpurity::Gini, &[2], 4.0);
        c.init(&data, &samples, &[]);
        c.update(&data, &samples, &[], 2);
        assert_eq!(c.children_impurity(&data, &samples, &[]), (0.0, 0.0));
        assert_eq!(c.weighted_n_left(), 2.0);
        assert_eq!(c.weighted_n_right(), 2.0);
        let imp = c.impurity_improvement(0.5, 0.0, 0.0);
        assert!((imp - 0.5).abs() < 1e-12);
    }

    #[test]
    fn incremental_update_matches_direct() {
        let data = dataset(&[0, 1, 0, 1, 1]);
        let samples = [0, 1, 2, 3, 4];
        let mut c = ClassificationCriterion::new(ClassImpurity::Gini, &[2], 5.0);
        c.init(&data, &samples, &[]);
        c.update(&data, &samples, &[], 1);
        c.update(&data, &samples, &[], 3);
        let (left, right) = c.children_impurity(&data, &samples, &[]);
        // left {0,1,0}: p = 2/3, 1/3; right {1,1}: pure
        assert!((left - (1.0 - 4.0 / 9.0 - 1.0 / 9.0)).abs() < 1e-12);
        assert_eq!(right, 0.0);
    }

    #[test]
    fn weights_shift_the_distribution() {
        let data = dataset(&[0, 1]).with_weights(&[3.0, 1.0]).unwrap();
        let mut c = ClassificationCriterion::new(ClassImpurity::Gini, &[2], 4.0);
        let summary = c.node_summary(&data, &[0, 1]);
        assert_eq!(summary.value, vec![3.0, 1.0]);
        assert_eq!(summary.weighted_n_samples, 4.0);
        assert!((summary.impurity - 0.375).abs() < 1e-12);
    }

    #[test]
    fn multi_output_averages_impurity() {
        let rows: Vec<Vec<f64>> = (0..4).map(|i| vec![i as f64]).collect();
        let labels = vec![vec![0, 0], vec![0, 0], vec![1, 0], vec![1, 0]];
        let data = Dataset::classification_multi(&rows, &labels).unwrap();
        let mut c = ClassificationCriterion::new(ClassImpurity::Gini, &[2, 1], 4.0);
        c.init(&data, &[0, 1, 2, 3], &[]);
        // output 0 gini 0.5, output 1 pure
        assert!((c.node_impurity() - 0.25).abs() < 1e-12);
    }
}
