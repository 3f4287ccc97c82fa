use std::cmp::Ordering;
use std::collections::BinaryHeap;

use tracing::debug;

use crate::{
    builder::{Evaluation, Side, StagingArena, StoppingRule, evaluate_node, initial_samples},
    criterion::Criterion,
    dataset::Dataset,
    node::NodeIndex,
    splitter::Splitter,
    tree::{DecisionTree, TreeKind},
};

/// An evaluated node waiting on the frontier. Its best split has been found
/// (and its samples partitioned) but it is not yet part of the tree.
#[derive(Debug)]
struct FrontierCandidate {
    start: usize,
    end: usize,
    depth: usize,
    parent: Option<(NodeIndex, Side)>,
    evaluation: Evaluation,
    priority: f64,
    sequence: usize,
}

impl PartialEq for FrontierCandidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FrontierCandidate {}

impl PartialOrd for FrontierCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FrontierCandidate {
    /// Higher improvement first; among equals, the earlier-evaluated candidate.
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .total_cmp(&other.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// Grows a tree best-first under a leaf budget.
///
/// The frontier is a max-heap keyed by each candidate's split improvement.
/// At most `max_leaf_nodes - 1` candidates are split; whatever remains on
/// the frontier once the budget is spent becomes a leaf.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BestFirstBuilder {
    rule: StoppingRule,
    max_leaf_nodes: usize,
}

impl BestFirstBuilder {
    pub(crate) fn new(rule: StoppingRule, max_leaf_nodes: usize) -> Self {
        Self {
            rule,
            max_leaf_nodes,
        }
    }

    pub(crate) fn build<C: Criterion>(
        &self,
        splitter: &mut Splitter<C>,
        data: &Dataset,
        kind: TreeKind,
    ) -> DecisionTree {
        let mut samples = initial_samples(data);
        let mut arena = StagingArena::default();
        let mut frontier = BinaryHeap::new();
        let mut sequence = 0;

        let mut evaluate = |samples: &mut [usize],
                            start: usize,
                            end: usize,
                            depth: usize,
                            parent: Option<(NodeIndex, Side)>| {
            let evaluation =
                evaluate_node(splitter, data, &mut samples[start..end], depth, &self.rule);
            let priority = evaluation
                .split
                .as_ref()
                .map_or(f64::NEG_INFINITY, |s| s.improvement);
            sequence += 1;
            FrontierCandidate {
                start,
                end,
                depth,
                parent,
                evaluation,
                priority,
                sequence,
            }
        };

        let n_samples = samples.len();
        frontier.push(evaluate(samples.as_mut_slice(), 0, n_samples, 0, None));
        let mut max_split_nodes = self.max_leaf_nodes.saturating_sub(1);

        while let Some(mut candidate) = frontier.pop() {
            let split = if max_split_nodes == 0 {
                None
            } else {
                candidate.evaluation.split.take()
            };
            let (staged, pos) = match split {
                Some(s) => (Some((s.rule, s.improvement)), Some(s.pos)),
                None => (None, None),
            };
            let index = arena.push(candidate.evaluation, staged, candidate.depth, candidate.parent);

            if let Some(pos) = pos {
                max_split_nodes -= 1;
                let mid = candidate.start + pos;
                let depth = candidate.depth + 1;
                let left = evaluate(samples.as_mut_slice(), candidate.start, mid, depth, Some((index, Side::Left)));
                let right = evaluate(samples.as_mut_slice(), mid, candidate.end, depth, Some((index, Side::Right)));
                frontier.push(left);
                frontier.push(right);
            }
        }

        let tree = arena.freeze(data.n_features(), kind);
        debug!(
            n_nodes = tree.n_nodes(),
            n_leaves = tree.n_leaves(),
            depth = tree.depth(),
            max_leaf_nodes = self.max_leaf_nodes,
            "best-first build finished"
        );
        tree
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::ProjectionSampler;
    use crate::regression::{RegressionCriterion, RegressionImpurity};

    fn rule() -> StoppingRule {
        StoppingRule {
            max_depth: usize::MAX,
            min_samples_split: 2,
            min_samples_leaf: 1,
            min_weight_leaf: 0.0,
            min_impurity_decrease: 0.0,
        }
    }

    fn build(target: &[f64], max_leaf_nodes: usize) -> DecisionTree {
        let rows: Vec<Vec<f64>> = (0..target.len()).map(|i| vec![i as f64]).collect();
        let data = Dataset::regression(&rows, target).unwrap();
        let mut splitter = Splitter::new(
            RegressionCriterion::new(RegressionImpurity::SquaredError, 1, target.len() as f64),
            ProjectionSampler::Axis,
            1,
            1,
            0.0,
            42,
        );
        BestFirstBuilder::new(rule(), max_leaf_nodes).build(
            &mut splitter,
            &data,
            TreeKind::Regression { n_outputs: 1 },
        )
    }

    const STEPS: [f64; 8] = [0.0, 0.0, 1.0, 1.0, 10.0, 10.0, 30.0, 30.0];

    #[test]
    fn leaf_budget_is_exact() {
        for k in 2..=4 {
            assert_eq!(build(&STEPS, k).n_leaves(), k);
        }
    }

    #[test]
    fn budget_larger_than_tree_stops_when_pure() {
        let tree = build(&STEPS, 100);
        assert_eq!(tree.n_leaves(), 4);
    }

    #[test]
    fn largest_improvement_expanded_first() {
        // the first split separates {0,0,1,1,10,10} from {30,30}; the
        // second budgeted split must go to the impure left side
        let tree = build(&STEPS, 3);
        let (left, right) = tree.nodes()[0].children().unwrap();
        assert!(!tree.node(left).is_leaf());
        assert!(tree.node(right).is_leaf());
    }

    #[test]
    fn frontier_orders_by_priority_then_sequence() {
        let dummy = |priority: f64, sequence: usize| FrontierCandidate {
            start: 0,
            end: 0,
            depth: 0,
            parent: None,
            evaluation: Evaluation {
                summary: crate::criterion::NodeSummary {
                    impurity: 0.0,
                    weighted_n_samples: 0.0,
                    value: Vec::new(),
                },
                n_samples: 0,
                split: None,
            },
            priority,
            sequence,
        };
        let mut heap = BinaryHeap::new();
        heap.push(dummy(1.0, 1));
        heap.push(dummy(2.0, 2));
        heap.push(dummy(2.0, 3));
        heap.push(dummy(f64::NEG_INFINITY, 4));
        let order: Vec<usize> = std::iter::from_fn(|| heap.pop().map(|c| c.sequence)).collect();
        assert_eq!(order, vec![2, 3, 1, 4]);
    }
}
