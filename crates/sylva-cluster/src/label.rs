use std::fmt;

/// A cluster assignment label. Clusters are numbered in order of first
/// appearance over the samples, so sample 0 always carries label 0.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct ClusterLabel(usize);

impl ClusterLabel {
    /// Create a new cluster label from a zero-based index.
    #[must_use]
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    /// Return the zero-based cluster index.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ClusterLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Renumber arbitrary group ids so the first group seen becomes label 0.
pub(crate) fn relabel_by_first_appearance(groups: &[usize]) -> Vec<ClusterLabel> {
    let mut seen: Vec<(usize, ClusterLabel)> = Vec::new();
    groups
        .iter()
        .map(|&g| match seen.iter().find(|(id, _)| *id == g) {
            Some(&(_, label)) => label,
            None => {
                let label = ClusterLabel::new(seen.len());
                seen.push((g, label));
                label
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        assert_eq!(format!("{}", ClusterLabel::new(3)), "3");
    }

    #[test]
    fn ordering() {
        assert!(ClusterLabel::new(1) < ClusterLabel::new(5));
    }

    #[test]
    fn first_appearance_numbering() {
        let labels = relabel_by_first_appearance(&[7, 7, 2, 9, 2]);
        let indices: Vec<usize> = labels.iter().map(|l| l.index()).collect();
        assert_eq!(indices, vec![0, 0, 1, 2, 1]);
    }

    #[test]
    fn empty_groups() {
        assert!(relabel_by_first_appearance(&[]).is_empty());
    }
}
