use crate::criterion::{Criterion, NodeSummary, variance};
use crate::dataset::Dataset;

/// Variances below this are treated as this value inside logarithms.
const VARIANCE_FLOOR: f64 = 1e-12;

/// Score used to split without a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsupervisedImpurity {
    /// Within-child variance of the projected values.
    TwoMeans,
    /// Per-sample BIC of a one- vs two-Gaussian model of the projected values.
    FastBic,
}

/// Criterion that scores partitions of the projected values themselves.
///
/// The split search works on the values the splitter passes in. The
/// impurity recorded for a node (and used to detect purity) is the mean
/// per-feature weighted variance, independent of any projection.
#[derive(Debug, Clone)]
pub struct UnsupervisedCriterion {
    impurity: UnsupervisedImpurity,
    weighted_n_total: f64,
    weighted_n_node: f64,
    weighted_n_left: f64,
    sum_total: f64,
    sq_sum_total: f64,
    sum_left: f64,
    sq_sum_left: f64,
    n_node: usize,
    pos: usize,
}

impl UnsupervisedCriterion {
    /// Create a criterion for a dataset whose total weight is `weighted_n_total`.
    #[must_use]
    pub fn new(impurity: UnsupervisedImpurity, weighted_n_total: f64) -> Self {
        Self {
            impurity,
            weighted_n_total,
            weighted_n_node: 0.0,
            weighted_n_left: 0.0,
            sum_total: 0.0,
            sq_sum_total: 0.0,
            sum_left: 0.0,
            sq_sum_left: 0.0,
            n_node: 0,
            pos: 0,
        }
    }

    fn left_variance(&self) -> f64 {
        variance(self.sum_left, self.sq_sum_left, self.weighted_n_left)
    }

    fn right_variance(&self) -> f64 {
        variance(
            self.sum_total - self.sum_left,
            self.sq_sum_total - self.sq_sum_left,
            self.weighted_n_right(),
        )
    }

    /// Lower of the shared-variance and separate-variance two-cluster BIC, per unit weight.
    ///
    /// The separate-variance model needs at least two samples and a non-zero
    /// variance on each side.
    fn two_cluster_bic(&self) -> f64 {
        let w = self.weighted_n_node;
        let (wl, wr) = (self.weighted_n_left, self.weighted_n_right());
        let (vl, vr) = (self.left_variance(), self.right_variance());
        let log_w = w.ln();

        let mixing = -2.0 * (xlogx(wl, w) + xlogx(wr, w));
        let pooled = ((wl * vl + wr * vr) / w).max(VARIANCE_FLOOR);
        let shared = w * pooled.ln() + mixing + 3.0 * log_w;

        let n_left = self.pos;
        let n_right = self.n_node - self.pos;
        let bic = if n_left >= 2 && n_right >= 2 && vl > 0.0 && vr > 0.0 {
            let separate = wl * vl.ln() + wr * vr.ln() + mixing + 4.0 * log_w;
            shared.min(separate)
        } else {
            shared
        };
        bic / w
    }
}

/// `a * ln(a / b)`, zero when `a` is zero.
fn xlogx(a: f64, b: f64) -> f64 {
    if a > 0.0 { a * (a / b).ln() } else { 0.0 }
}

impl Criterion for UnsupervisedCriterion {
    fn init(&mut self, data: &Dataset, samples: &[usize], values: &[f64]) {
        self.sum_total = 0.0;
        self.sq_sum_total = 0.0;
        self.weighted_n_node = 0.0;
        for (&s, &x) in samples.iter().zip(values) {
            let w = data.weight(s);
            self.sum_total += w * x;
            self.sq_sum_total += w * x * x;
            self.weighted_n_node += w;
        }
        self.n_node = samples.len();
        self.reset();
    }

    fn reset(&mut self) {
        self.sum_left = 0.0;
        self.sq_sum_left = 0.0;
        self.weighted_n_left = 0.0;
        self.pos = 0;
    }

    fn update(&mut self, data: &Dataset, samples: &[usize], values: &[f64], new_pos: usize) {
        for p in self.pos..new_pos {
            let w = data.weight(samples[p]);
            let x = values[p];
            self.sum_left += w * x;
            self.sq_sum_left += w * x * x;
            self.weighted_n_left += w;
        }
        self.pos = new_pos;
    }

    fn node_impurity(&self) -> f64 {
        let var = variance(self.sum_total, self.sq_sum_total, self.weighted_n_node);
        match self.impurity {
            UnsupervisedImpurity::TwoMeans => var,
            UnsupervisedImpurity::FastBic => {
                let w = self.weighted_n_node;
                var.max(VARIANCE_FLOOR).ln() + 2.0 * w.ln() / w
            }
        }
    }

    fn children_impurity(&self, _data: &Dataset, _samples: &[usize], _values: &[f64]) -> (f64, f64) {
        match self.impurity {
            UnsupervisedImpurity::TwoMeans => (self.left_variance(), self.right_variance()),
            UnsupervisedImpurity::FastBic => {
                let bic = self.two_cluster_bic();
                (bic, bic)
            }
        }
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
        let n_features = data.n_features();
        let mut sums = vec![0.0; n_features];
        let mut sq_sums = vec![0.0; n_features];
        let mut weight = 0.0;
        for &s in samples {
            let w = data.weight(s);
            for (j, &x) in data.row(s).iter().enumerate() {
                sums[j] += w * x;
                sq_sums[j] += w * x * x;
            }
            weight += w;
        }
        let impurity = sums
            .iter()
            .zip(&sq_sums)
            .map(|(&sum, &sq)| variance(sum, sq, weight))
            .sum::<f64>()
            / n_features as f64;
        let value = if weight > 0.0 {
            sums.iter().map(|s| s / weight).collect()
        } else {
            vec![0.0; n_features]
        };
        NodeSummary {
            impurity,
            weighted_n_samples: weight,
            value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(xs: &[f64]) -> Dataset {
        let rows: Vec<Vec<f64>> = xs.iter().map(|&x| vec![x]).collect();
        Dataset::unsupervised(&rows).unwrap()
    }

    fn all(n: usize) -> Vec<usize> {
        (0..n).collect()
    }

    fn proxies(c: &mut UnsupervisedCriterion, data: &Dataset, values: &[f64]) -> Vec<f64> {
        let samples = all(values.len());
        c.init(data, &samples, values);
        (1..values.len())
            .map(|pos| {
                c.update(data, &samples, values, pos);
                c.proxy_impurity_improvement(data, &samples, values)
            })
            .collect()
    }

    fn argmax(xs: &[f64]) -> usize {
        xs.iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap()
    }

    const CLUSTERS: [f64; 4] = [0.0, 0.1, 10.0, 10.1];

    // --- TwoMeans ---

    #[test]
    fn twomeans_node_impurity_is_variance() {
        let values = [1.0, 2.0, 3.0];
        let data = line(&values);
        let mut c = UnsupervisedCriterion::new(UnsupervisedImpurity::TwoMeans, 3.0);
        c.init(&data, &all(3), &values);
        assert!((c.node_impurity() - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn twomeans_prefers_gap() {
        let data = line(&CLUSTERS);
        let mut c = UnsupervisedCriterion::new(UnsupervisedImpurity::TwoMeans, 4.0);
        let scores = proxies(&mut c, &data, &CLUSTERS);
        assert_eq!(argmax(&scores), 1);
    }

    #[test]
    fn twomeans_improvement_positive_on_gap() {
        let data = line(&CLUSTERS);
        let samples = all(4);
        let mut c = UnsupervisedCriterion::new(UnsupervisedImpurity::TwoMeans, 4.0);
        c.init(&data, &samples, &CLUSTERS);
        let parent = c.node_impurity();
        c.update(&data, &samples, &CLUSTERS, 2);
        let (l, r) = c.children_impurity(&data, &samples, &CLUSTERS);
        assert!((l - 0.0025).abs() < 1e-9);
        assert!((r - 0.0025).abs() < 1e-9);
        assert!(c.impurity_improvement(parent, l, r) > 24.0);
    }

    // --- FastBic ---

    #[test]
    fn fastbic_prefers_gap() {
        let data = line(&CLUSTERS);
        let mut c = UnsupervisedCriterion::new(UnsupervisedImpurity::FastBic, 4.0);
        let scores = proxies(&mut c, &data, &CLUSTERS);
        assert_eq!(argmax(&scores), 1);
    }

    #[test]
    fn fastbic_children_share_score() {
        let data = line(&CLUSTERS);
        let samples = all(4);
        let mut c = UnsupervisedCriterion::new(UnsupervisedImpurity::FastBic, 4.0);
        c.init(&data, &samples, &CLUSTERS);
        let parent = c.node_impurity();
        c.update(&data, &samples, &CLUSTERS, 2);
        let (l, r) = c.children_impurity(&data, &samples, &CLUSTERS);
        assert_eq!(l, r);
        assert!(c.impurity_improvement(parent, l, r) > 0.0);
    }

    #[test]
    fn fastbic_impurity_can_be_negative() {
        let values = [0.0, 0.1];
        let data = line(&values);
        let mut c = UnsupervisedCriterion::new(UnsupervisedImpurity::FastBic, 2.0);
        c.init(&data, &all(2), &values);
        assert!(c.node_impurity() < 0.0);
    }

    #[test]
    fn fastbic_singleton_side_is_finite() {
        let data = line(&CLUSTERS);
        let samples = all(4);
        let mut c = UnsupervisedCriterion::new(UnsupervisedImpurity::FastBic, 4.0);
        c.init(&data, &samples, &CLUSTERS);
        c.update(&data, &samples, &CLUSTERS, 1);
        let (l, _) = c.children_impurity(&data, &samples, &CLUSTERS);
        assert!(l.is_finite());
    }

    // --- Node summary ---

    #[test]
    fn summary_is_centroid_and_mean_variance() {
        let rows = vec![vec![0.0, 1.0], vec![2.0, 1.0]];
        let data = Dataset::unsupervised(&rows).unwrap();
        let mut c = UnsupervisedCriterion::new(UnsupervisedImpurity::TwoMeans, 2.0);
        let summary = c.node_summary(&data, &[0, 1]);
        assert_eq!(summary.value, vec![1.0, 1.0]);
        // variances 1 and 0
        assert!((summary.impurity - 0.5).abs() < 1e-12);
        assert_eq!(summary.weighted_n_samples, 2.0);
    }
}
