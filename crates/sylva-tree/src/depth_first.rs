use tracing::debug;

use crate::{
    builder::{Side, StagingArena, StoppingRule, evaluate_node, initial_samples},
    criterion::Criterion,
    dataset::Dataset,
    node::NodeIndex,
    splitter::Splitter,
    tree::{DecisionTree, TreeKind},
};

#[derive(Debug, Clone, Copy)]
struct StackRecord {
    start: usize,
    end: usize,
    depth: usize,
    parent: Option<(NodeIndex, Side)>,
}

/// Grows a tree depth-first with an explicit stack.
///
/// Every admissible split is taken; growth stops only through the
/// per-node stopping rule. Nodes are numbered in pre-order.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DepthFirstBuilder {
    rule: StoppingRule,
}

impl DepthFirstBuilder {
    pub(crate) fn new(rule: StoppingRule) -> Self {
        Self { rule }
    }

    pub(crate) fn build<C: Criterion>(
        &self,
        splitter: &mut Splitter<C>,
        data: &Dataset,
        kind: TreeKind,
    ) -> DecisionTree {
        let mut samples = initial_samples(data);
        let mut arena = StagingArena::default();
        let mut stack = vec![StackRecord {
            start: 0,
            end: samples.len(),
            depth: 0,
            parent: None,
        }];

        while let Some(record) = stack.pop() {
            let node_samples = &mut samples[record.start..record.end];
            let mut evaluation = evaluate_node(splitter, data, node_samples, record.depth, &self.rule);
            let (split, pos) = match evaluation.split.take() {
                Some(s) => (Some((s.rule, s.improvement)), Some(s.pos)),
                None => (None, None),
            };
            let index = arena.push(evaluation, split, record.depth, record.parent);

            if let Some(pos) = pos {
                let mid = record.start + pos;
                // Right first so the left subtree is expanded next.
                stack.push(StackRecord {
                    start: mid,
                    end: record.end,
                    depth: record.depth + 1,
                    parent: Some((index, Side::Right)),
                });
                stack.push(StackRecord {
                    start: record.start,
                    end: mid,
                    depth: record.depth + 1,
                    parent: Some((index, Side::Left)),
                });
            }
        }

        let tree = arena.freeze(data.n_features(), kind);
        debug!(
            n_nodes = tree.n_nodes(),
            n_leaves = tree.n_leaves(),
            depth = tree.depth(),
            "depth-first build finished"
        );
        tree
    }
}
