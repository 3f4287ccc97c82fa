use std::fmt;

use crate::projection::{PatchGeometry, Projection};

/// Zero-based feature column index.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
    serde::Serialize, serde::Deserialize,
)]
pub struct FeatureIndex(usize);

impl FeatureIndex {
    /// Create a new feature index from a zero-based column position.
    #[must_use]
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    /// Return the zero-based feature column index.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for FeatureIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index into a `Vec<Node>` arena, identifying a specific node in a decision tree.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
    serde::Serialize, serde::Deserialize,
)]
pub struct NodeIndex(usize);

impl NodeIndex {
    /// Create a new node index from a zero-based arena position.
    #[must_use]
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    /// Return the zero-based arena index.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Criterion-agnostic impurity value.
#[derive(
    Debug, Clone, Copy, PartialEq, PartialOrd,
    serde::Serialize, serde::Deserialize,
)]
pub struct Impurity(f64);

impl Impurity {
    /// Create a new impurity value.
    pub(crate) fn new(value: f64) -> Self {
        Self(value)
    }

    /// Return the raw impurity value.
    #[must_use]
    pub fn value(self) -> f64 {
        self.0
    }
}

impl fmt::Display for Impurity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}", self.0)
    }
}

/// The decision made at an interior node.
///
/// Samples whose projected value is `<= threshold` go left.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum SplitRule {
    /// Single-feature threshold.
    Axis {
        /// Feature compared against the threshold.
        feature: FeatureIndex,
        /// Split threshold.
        threshold: f64,
    },
    /// Threshold on a sparse linear combination of features.
    Oblique {
        /// The projection applied to each sample.
        projection: Projection,
        /// Split threshold on the projected value.
        threshold: f64,
    },
    /// Threshold on the sum over a rectangular window of the feature grid.
    Patch {
        /// The projection generated from `geometry`.
        projection: Projection,
        /// Window the projection was generated from.
        geometry: PatchGeometry,
        /// Split threshold on the projected value.
        threshold: f64,
    },
}

impl SplitRule {
    /// Return the split threshold.
    #[must_use]
    pub fn threshold(&self) -> f64 {
        match self {
            SplitRule::Axis { threshold, .. }
            | SplitRule::Oblique { threshold, .. }
            | SplitRule::Patch { threshold, .. } => *threshold,
        }
    }

    /// Project a feature row onto this rule's direction.
    #[must_use]
    pub fn project(&self, row: &[f64]) -> f64 {
        match self {
            SplitRule::Axis { feature, .. } => row[feature.index()],
            SplitRule::Oblique { projection, .. } | SplitRule::Patch { projection, .. } => {
                projection.apply(row)
            }
        }
    }

    /// Return `true` when `row` is routed to the left child.
    #[must_use]
    pub fn goes_left(&self, row: &[f64]) -> bool {
        self.project(row) <= self.threshold()
    }
}

/// Whether a node is terminal or routes samples to two children.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum NodeKind {
    /// A terminal leaf node.
    Leaf,
    /// An interior split node.
    Split {
        /// The routing rule.
        rule: SplitRule,
        /// Index of the left child node.
        left: NodeIndex,
        /// Index of the right child node.
        right: NodeIndex,
        /// Weighted impurity decrease achieved by this split.
        improvement: f64,
    },
}

/// A node in a decision tree arena.
///
/// Trees are stored as `Vec<Node>` where parents and children are
/// referenced by [`NodeIndex`] rather than pointers.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Node {
    /// Parent node, `None` for the root.
    pub parent: Option<NodeIndex>,
    /// Distance from the root (root is depth 0).
    pub depth: usize,
    /// Impurity of the training samples that reached this node.
    pub impurity: Impurity,
    /// Number of training samples that reached this node.
    pub n_samples: usize,
    /// Sum of the weights of those samples.
    pub weighted_n_samples: f64,
    /// Leaf statistic: weighted class counts, per-output values, or feature centroid.
    pub value: Vec<f64>,
    /// Leaf marker or split descriptor.
    pub kind: NodeKind,
}

impl Node {
    /// Return `true` if this node is a leaf.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf)
    }

    /// Return the split rule for interior nodes.
    #[must_use]
    pub fn rule(&self) -> Option<&SplitRule> {
        match &self.kind {
            NodeKind::Split { rule, .. } => Some(rule),
            NodeKind::Leaf => None,
        }
    }

    /// Return the `(left, right)` children for interior nodes.
    #[must_use]
    pub fn children(&self) -> Option<(NodeIndex, NodeIndex)> {
        match self.kind {
            NodeKind::Split { left, right, .. } => Some((left, right)),
            NodeKind::Leaf => None,
        }
    }

    /// Return the impurity improvement of the split, `None` for leaves.
    #[must_use]
    pub fn improvement(&self) -> Option<f64> {
        match self.kind {
            NodeKind::Split { improvement, .. } => Some(improvement),
            NodeKind::Leaf => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{FeatureIndex, Impurity, Node, NodeIndex, NodeKind, SplitRule};
    use crate::projection::Projection;

    // --- Newtypes ---

    #[test]
    fn feature_index_roundtrip() {
        let fi = FeatureIndex::new(7);
        assert_eq!(fi.index(), 7);
        assert_eq!(format!("{fi}"), "7");
    }

    #[test]
    fn node_index_ordering() {
        assert!(NodeIndex::new(10) < NodeIndex::new(20));
        assert_eq!(format!("{}", NodeIndex::new(0)), "0");
    }

    #[test]
    fn impurity_display() {
        assert_eq!(format!("{}", Impurity::new(0.333333)), "0.333333");
        assert_eq!(format!("{}", Impurity::new(0.0)), "0.000000");
    }

    // --- SplitRule ---

    #[test]
    fn axis_rule_routes_by_feature() {
        let rule = SplitRule::Axis {
            feature: FeatureIndex::new(1),
            threshold: 2.0,
        };
        assert!(rule.goes_left(&[100.0, 2.0]));
        assert!(!rule.goes_left(&[-100.0, 2.5]));
    }

    #[test]
    fn oblique_rule_routes_by_projection() {
        let projection = Projection::from_terms(vec![
            (FeatureIndex::new(0), 1.0),
            (FeatureIndex::new(1), -1.0),
        ]);
        let rule = SplitRule::Oblique {
            projection,
            threshold: 0.0,
        };
        assert_eq!(rule.project(&[3.0, 1.0]), 2.0);
        assert!(!rule.goes_left(&[3.0, 1.0]));
        assert!(rule.goes_left(&[1.0, 3.0]));
    }

    // --- Node ---

    fn make_leaf() -> Node {
        Node {
            parent: Some(NodeIndex::new(0)),
            depth: 1,
            impurity: Impurity::new(0.32),
            n_samples: 10,
            weighted_n_samples: 10.0,
            value: vec![2.0, 8.0],
            kind: NodeKind::Leaf,
        }
    }

    #[test]
    fn leaf_accessors() {
        let leaf = make_leaf();
        assert!(leaf.is_leaf());
        assert!(leaf.rule().is_none());
        assert!(leaf.children().is_none());
        assert!(leaf.improvement().is_none());
    }

    #[test]
    fn split_accessors() {
        let node = Node {
            kind: NodeKind::Split {
                rule: SplitRule::Axis {
                    feature: FeatureIndex::new(2),
                    threshold: 3.5,
                },
                left: NodeIndex::new(1),
                right: NodeIndex::new(2),
                improvement: 0.16,
            },
            ..make_leaf()
        };
        assert!(!node.is_leaf());
        assert_eq!(node.children(), Some((NodeIndex::new(1), NodeIndex::new(2))));
        assert_eq!(node.rule().map(SplitRule::threshold), Some(3.5));
        assert_eq!(node.improvement(), Some(0.16));
    }
}
