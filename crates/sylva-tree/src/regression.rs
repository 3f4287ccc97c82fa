use crate::criterion::{Criterion, EPSILON, NodeSummary};
use crate::dataset::Dataset;

/// Loss minimised by a regression tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegressionImpurity {
    /// Weighted variance of the target.
    SquaredError,
    /// Variance impurity ranked by Friedman's improvement score.
    FriedmanMse,
    /// Weighted mean absolute deviation from the weighted median.
    AbsoluteError,
    /// Half Poisson deviance with the node mean as prediction.
    Poisson,
}

/// Running-sum criterion for (multi-output) regression.
///
/// Sums and sums of squares are updated incrementally. Absolute error keeps
/// per-output rank statistics so each sweep position costs `O(log² n)`.
/// Poisson losses are recomputed from the samples when asked for child
/// impurities.
#[derive(Debug, Clone)]
pub struct RegressionCriterion {
    impurity: RegressionImpurity,
    n_outputs: usize,
    sum_total: Vec<f64>,
    sum_left: Vec<f64>,
    sq_sum_total: f64,
    sq_sum_left: f64,
    weighted_n_total: f64,
    weighted_n_node: f64,
    weighted_n_left: f64,
    node_loss: f64,
    pos: usize,
    medians: Vec<MedianTracker>,
}

impl RegressionCriterion {
    /// Create a criterion for `n_outputs` target columns.
    #[must_use]
    pub fn new(impurity: RegressionImpurity, n_outputs: usize, weighted_n_total: f64) -> Self {
        Self {
            impurity,
            n_outputs,
            sum_total: vec![0.0; n_outputs],
            sum_left: vec![0.0; n_outputs],
            sq_sum_total: 0.0,
            sq_sum_left: 0.0,
            weighted_n_total,
            weighted_n_node: 0.0,
            weighted_n_left: 0.0,
            node_loss: 0.0,
            pos: 0,
            medians: if impurity == RegressionImpurity::AbsoluteError {
                vec![MedianTracker::default(); n_outputs]
            } else {
                Vec::new()
            },
        }
    }

    fn sum_right(&self, k: usize) -> f64 {
        self.sum_total[k] - self.sum_left[k]
    }

    fn squared_error(&self, sums: impl Iterator<Item = f64>, sq_sum: f64, weight: f64) -> f64 {
        if weight <= 0.0 {
            return 0.0;
        }
        let mut impurity = sq_sum / weight;
        for sum in sums {
            let mean = sum / weight;
            impurity -= mean * mean;
        }
        (impurity / self.n_outputs as f64).max(0.0)
    }

    /// Mean over outputs of one side's absolute deviation.
    fn mean_deviation(&self, side: impl Fn(&MedianTracker) -> f64) -> f64 {
        self.medians.iter().map(side).sum::<f64>() / self.n_outputs as f64
    }

    /// `Σ w y log(y / mean)` over outputs, infinite when a mean is not positive.
    fn poisson_loss(&self, data: &Dataset, samples: &[usize], sums: &[f64], weight: f64) -> f64 {
        if weight <= 0.0 {
            return 0.0;
        }
        let mut means = Vec::with_capacity(self.n_outputs);
        for &sum in sums {
            if sum <= EPSILON {
                return f64::INFINITY;
            }
            means.push(sum / weight);
        }
        let mut loss = 0.0;
        for &s in samples {
            let w = data.weight(s);
            for (k, &mean) in means.iter().enumerate() {
                let y = data.response(s, k);
                if y > 0.0 {
                    loss += w * y * (y / mean).ln();
                }
            }
        }
        loss / (weight * self.n_outputs as f64)
    }

    fn sums_right(&self) -> Vec<f64> {
        (0..self.n_outputs).map(|k| self.sum_right(k)).collect()
    }

    fn friedman_diff(&self) -> f64 {
        let total_left: f64 = self.sum_left.iter().sum();
        let total_right: f64 = (0..self.n_outputs).map(|k| self.sum_right(k)).sum();
        self.weighted_n_right() * total_left - self.weighted_n_left * total_right
    }
}

impl Criterion for RegressionCriterion {
    fn init(&mut self, data: &Dataset, samples: &[usize], _values: &[f64]) {
        self.sum_total.iter_mut().for_each(|s| *s = 0.0);
        self.sq_sum_total = 0.0;
        self.weighted_n_node = 0.0;
        for &s in samples {
            let w = data.weight(s);
            for k in 0..self.n_outputs {
                let y = data.response(s, k);
                self.sum_total[k] += w * y;
                self.sq_sum_total += w * y * y;
            }
            self.weighted_n_node += w;
        }
        self.node_loss = match self.impurity {
            RegressionImpurity::SquaredError | RegressionImpurity::FriedmanMse => {
                self.squared_error(self.sum_total.iter().copied(), self.sq_sum_total, self.weighted_n_node)
            }
            RegressionImpurity::AbsoluteError => {
                for (k, tracker) in self.medians.iter_mut().enumerate() {
                    tracker.init(data, samples, k);
                }
                self.mean_deviation(MedianTracker::node_deviation)
            }
            RegressionImpurity::Poisson => {
                self.poisson_loss(data, samples, &self.sum_total, self.weighted_n_node)
            }
        };
        self.reset();
    }

    fn reset(&mut self) {
        self.sum_left.iter_mut().for_each(|s| *s = 0.0);
        self.sq_sum_left = 0.0;
        self.weighted_n_left = 0.0;
        self.pos = 0;
        self.medians.iter_mut().for_each(MedianTracker::reset);
    }

    fn update(&mut self, data: &Dataset, samples: &[usize], _values: &[f64], new_pos: usize) {
        for (i, &s) in samples.iter().enumerate().take(new_pos).skip(self.pos) {
            let w = data.weight(s);
            for k in 0..self.n_outputs {
                let y = data.response(s, k);
                self.sum_left[k] += w * y;
                self.sq_sum_left += w * y * y;
            }
            for (k, tracker) in self.medians.iter_mut().enumerate() {
                tracker.move_left(i, data.response(s, k), w);
            }
            self.weighted_n_left += w;
        }
        self.pos = new_pos;
    }

    fn node_impurity(&self) -> f64 {
        self.node_loss
    }

    fn children_impurity(&self, data: &Dataset, samples: &[usize], _values: &[f64]) -> (f64, f64) {
        let (left, right) = samples.split_at(self.pos);
        match self.impurity {
            RegressionImpurity::SquaredError | RegressionImpurity::FriedmanMse => (
                self.squared_error(self.sum_left.iter().copied(), self.sq_sum_left, self.weighted_n_left),
                self.squared_error(
                    (0..self.n_outputs).map(|k| self.sum_right(k)),
                    self.sq_sum_total - self.sq_sum_left,
                    self.weighted_n_right(),
                ),
            ),
            RegressionImpurity::AbsoluteError => (
                self.mean_deviation(MedianTracker::left_deviation),
                self.mean_deviation(MedianTracker::right_deviation),
            ),
            RegressionImpurity::Poisson => (
                self.poisson_loss(data, left, &self.sum_left, self.weighted_n_left),
                self.poisson_loss(data, right, &self.sums_right(), self.weighted_n_right()),
            ),
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

    fn proxy_impurity_improvement(&self, data: &Dataset, samples: &[usize], values: &[f64]) -> f64 {
        let wl = self.weighted_n_left;
        let wr = self.weighted_n_right();
        match self.impurity {
            RegressionImpurity::SquaredError => (0..self.n_outputs)
                .map(|k| {
                    let (l, r) = (self.sum_left[k], self.sum_right(k));
                    l * l / wl + r * r / wr
                })
                .sum(),
            RegressionImpurity::FriedmanMse => {
                let diff = self.friedman_diff();
                diff * diff / (wl * wr)
            }
            RegressionImpurity::Poisson => {
                let mut proxy = 0.0;
                for k in 0..self.n_outputs {
                    let (l, r) = (self.sum_left[k], self.sum_right(k));
                    if l <= EPSILON || r <= EPSILON {
                        return f64::NEG_INFINITY;
                    }
                    proxy += l * (l / wl).ln() + r * (r / wr).ln();
                }
                proxy
            }
            RegressionImpurity::AbsoluteError => {
                let (left, right) = self.children_impurity(data, samples, values);
                -wr * right - wl * left
            }
        }
    }

    fn impurity_improvement(&self, parent: f64, left: f64, right: f64) -> f64 {
        match self.impurity {
            RegressionImpurity::FriedmanMse => {
                let diff = self.friedman_diff() / self.n_outputs as f64;
                diff * diff / (self.weighted_n_left * self.weighted_n_right() * self.weighted_n_total)
            }
            _ => {
                let n_t = self.weighted_n_node;
                (n_t / self.weighted_n_total)
                    * (parent - self.weighted_n_right() / n_t * right - self.weighted_n_left / n_t * left)
            }
        }
    }

    fn node_summary(&mut self, data: &Dataset, samples: &[usize]) -> NodeSummary {
        self.init(data, samples, &[]);
        let value = match self.impurity {
            RegressionImpurity::AbsoluteError => {
                (0..self.n_outputs).map(|k| weighted_median(data, samples, k)).collect()
            }
            _ => self
                .sum_total
                .iter()
                .map(|&s| s / self.weighted_n_node)
                .collect(),
        };
        NodeSummary {
            impurity: self.node_loss,
            weighted_n_samples: self.weighted_n_node,
            value,
        }
    }
}

/// Fenwick tree of per-rank sums.
#[derive(Debug, Clone, Default)]
struct Fenwick {
    tree: Vec<f64>,
}

impl Fenwick {
    fn clear(&mut self, n: usize) {
        self.tree.clear();
        self.tree.resize(n + 1, 0.0);
    }

    fn add(&mut self, rank: usize, value: f64) {
        let mut i = rank + 1;
        while i < self.tree.len() {
            self.tree[i] += value;
            i += i & i.wrapping_neg();
        }
    }

    /// Sum over ranks `0..end`.
    fn prefix(&self, end: usize) -> f64 {
        let mut i = end;
        let mut sum = 0.0;
        while i > 0 {
            sum += self.tree[i];
            i -= i & i.wrapping_neg();
        }
        sum
    }
}

/// Order statistics of one output over the node, for the absolute-error sweep.
///
/// Targets are ranked once per `init`. The left child's weights live in
/// Fenwick trees over those ranks; the right child is the node minus the
/// left.
#[derive(Debug, Clone, Default)]
struct MedianTracker {
    /// Rank of the target at each position of the node's sample slice.
    rank_of: Vec<usize>,
    ranked_y: Vec<f64>,
    node_w: Vec<f64>,
    node_wy: Vec<f64>,
    left_w: Fenwick,
    left_wy: Fenwick,
}

impl MedianTracker {
    fn init(&mut self, data: &Dataset, samples: &[usize], k: usize) {
        let n = samples.len();
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_unstable_by(|&a, &b| {
            data.response(samples[a], k)
                .total_cmp(&data.response(samples[b], k))
                .then(a.cmp(&b))
        });

        self.rank_of.clear();
        self.rank_of.resize(n, 0);
        self.ranked_y.clear();
        self.node_w.clear();
        self.node_wy.clear();
        self.node_w.push(0.0);
        self.node_wy.push(0.0);
        let (mut cw, mut cwy) = (0.0, 0.0);
        for (rank, &i) in order.iter().enumerate() {
            self.rank_of[i] = rank;
            let s = samples[i];
            let (y, w) = (data.response(s, k), data.weight(s));
            self.ranked_y.push(y);
            cw += w;
            cwy += w * y;
            self.node_w.push(cw);
            self.node_wy.push(cwy);
        }
        self.reset();
    }

    fn reset(&mut self) {
        let n = self.ranked_y.len();
        self.left_w.clear(n);
        self.left_wy.clear(n);
    }

    fn move_left(&mut self, position: usize, y: f64, w: f64) {
        let rank = self.rank_of[position];
        self.left_w.add(rank, w);
        self.left_wy.add(rank, w * y);
    }

    fn node_deviation(&self) -> f64 {
        deviation(&self.ranked_y, |end| (self.node_w[end], self.node_wy[end]))
    }

    fn left_deviation(&self) -> f64 {
        deviation(&self.ranked_y, |end| {
            (self.left_w.prefix(end), self.left_wy.prefix(end))
        })
    }

    fn right_deviation(&self) -> f64 {
        deviation(&self.ranked_y, |end| {
            (
                self.node_w[end] - self.left_w.prefix(end),
                self.node_wy[end] - self.left_wy.prefix(end),
            )
        })
    }
}

/// Weighted mean absolute deviation of one side from its weighted median.
///
/// `prefix(end)` returns the side's `(Σ w, Σ w y)` over ranks `0..end`.
/// Any weighted median minimises the deviation, so the lower one is used.
fn deviation(ranked_y: &[f64], prefix: impl Fn(usize) -> (f64, f64)) -> f64 {
    let n = ranked_y.len();
    let (total_w, total_wy) = prefix(n);
    if total_w <= 0.0 {
        return 0.0;
    }
    let half = total_w / 2.0;
    let (mut lo, mut hi) = (1, n);
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if prefix(mid).0 >= half {
            hi = mid;
        } else {
            lo = mid + 1;
        }
    }
    let median = ranked_y[lo - 1];
    let (below_w, below_wy) = prefix(lo);
    let loss = median * below_w - below_wy + (total_wy - below_wy) - median * (total_w - below_w);
    (loss / total_w).max(0.0)
}

/// Weighted median of output `k` over `samples`.
///
/// When the cumulative weight lands exactly on half the total, the two
/// straddling values are averaged.
pub(crate) fn weighted_median(data: &Dataset, samples: &[usize], k: usize) -> f64 {
    let mut pairs: Vec<(f64, f64)> = samples
        .iter()
        .map(|&s| (data.response(s, k), data.weight(s)))
        .collect();
    pairs.sort_unstable_by(|a, b| a.0.total_cmp(&b.0));
    let half = pairs.iter().map(|p| p.1).sum::<f64>() / 2.0;

    let mut cumulative = 0.0;
    for (i, &(y, w)) in pairs.iter().enumerate() {
        cumulative += w;
        if cumulative == half && i + 1 < pairs.len() {
            return (y + pairs[i + 1].0) / 2.0;
        }
        if cumulative > half {
            return y;
        }
    }
    pairs.last().map_or(0.0, |p| p.0)
}
