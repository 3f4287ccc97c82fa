//! Per-node expansion logic shared by both growth orders, and the staging
//! arena nodes are written into before the tree is frozen.

use tracing::trace;

use crate::{
    criterion::{Criterion, EPSILON, NodeSummary},
    dataset::Dataset,
    node::{Impurity, Node, NodeIndex, NodeKind, SplitRule},
    splitter::{SplitRecord, Splitter},
    tree::{DecisionTree, TreeKind},
};

/// Resolved stopping parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct StoppingRule {
    pub(crate) max_depth: usize,
    pub(crate) min_samples_split: usize,
    pub(crate) min_samples_leaf: usize,
    pub(crate) min_weight_leaf: f64,
    pub(crate) min_impurity_decrease: f64,
}

/// Which child slot of its parent a node fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Side {
    Left,
    Right,
}

/// A node's recorded statistics plus the split it will use, if any.
#[derive(Debug, Clone)]
pub(crate) struct Evaluation {
    pub(crate) summary: NodeSummary,
    pub(crate) n_samples: usize,
    pub(crate) split: Option<SplitRecord>,
}

/// Decide whether a node splits and, if so, find and apply its best split.
///
/// `samples` is partitioned in place when a split is returned.
pub(crate) fn evaluate_node<C: Criterion>(
    splitter: &mut Splitter<C>,
    data: &Dataset,
    samples: &mut [usize],
    depth: usize,
    rule: &StoppingRule,
) -> Evaluation {
    let n_samples = samples.len();
    let summary = splitter.node_reset(data, samples);

    let is_leaf = depth >= rule.max_depth
        || n_samples < rule.min_samples_split
        || n_samples < 2 * rule.min_samples_leaf
        || summary.weighted_n_samples < 2.0 * rule.min_weight_leaf
        || summary.impurity <= EPSILON;

    let split = if is_leaf {
        None
    } else {
        splitter.node_split(data, samples).filter(|split| {
            split.pos > 0
                && split.pos < n_samples
                && split.improvement + EPSILON >= rule.min_impurity_decrease
        })
    };

    Evaluation {
        summary,
        n_samples,
        split,
    }
}

#[derive(Debug)]
struct StagedNode {
    parent: Option<NodeIndex>,
    depth: usize,
    summary: NodeSummary,
    n_samples: usize,
    split: Option<(SplitRule, f64)>,
    left: Option<NodeIndex>,
    right: Option<NodeIndex>,
}

/// Nodes whose children are not all known yet.
#[derive(Debug, Default)]
pub(crate) struct StagingArena {
    nodes: Vec<StagedNode>,
}

impl StagingArena {
    /// Append a node, linking it into its parent's child slot.
    ///
    /// Pass `split = None` to record the evaluation as a leaf.
    pub(crate) fn push(
        &mut self,
        evaluation: Evaluation,
        split: Option<(SplitRule, f64)>,
        depth: usize,
        parent: Option<(NodeIndex, Side)>,
    ) -> NodeIndex {
        let index = NodeIndex::new(self.nodes.len());
        if let Some((p, side)) = parent {
            let slot = &mut self.nodes[p.index()];
            match side {
                Side::Left => slot.left = Some(index),
                Side::Right => slot.right = Some(index),
            }
        }
        trace!(
            node = index.index(),
            depth,
            n_samples = evaluation.n_samples,
            impurity = evaluation.summary.impurity,
            is_leaf = split.is_none(),
            "node materialised"
        );
        self.nodes.push(StagedNode {
            parent: parent.map(|(p, _)| p),
            depth,
            summary: evaluation.summary,
            n_samples: evaluation.n_samples,
            split,
            left: None,
            right: None,
        });
        index
    }

    /// Convert to an immutable tree. A split whose children were never
    /// materialised is recorded as a leaf.
    pub(crate) fn freeze(self, n_features: usize, kind: TreeKind) -> DecisionTree {
        let nodes = self
            .nodes
            .into_iter()
            .map(|staged| {
                let kind = match (staged.split, staged.left, staged.right) {
                    (Some((rule, improvement)), Some(left), Some(right)) => NodeKind::Split {
                        rule,
                        left,
                        right,
                        improvement,
                    },
                    _ => NodeKind::Leaf,
                };
                Node {
                    parent: staged.parent,
                    depth: staged.depth,
                    impurity: Impurity::new(staged.summary.impurity),
                    n_samples: staged.n_samples,
                    weighted_n_samples: staged.summary.weighted_n_samples,
                    value: staged.summary.value,
                    kind,
                }
            })
            .collect();
        DecisionTree {
            nodes,
            n_features,
            kind,
        }
    }
}

/// Samples that take part in growth: those with positive weight.
pub(crate) fn initial_samples(data: &Dataset) -> Vec<usize> {
    (0..data.n_samples()).filter(|&i| data.weight(i) > 0.0).collect()
}
