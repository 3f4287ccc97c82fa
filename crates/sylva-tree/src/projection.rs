//! Candidate split directions: one-hot features, sparse oblique
//! projections, and rectangular patches over a reshaped feature grid.

use rand::Rng;

use crate::dataset::Dataset;
use crate::node::{FeatureIndex, SplitRule};

/// A sparse linear projection: a list of `(feature, weight)` pairs.
///
/// Terms are kept sorted by feature index with no duplicates.
#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct Projection {
    terms: Vec<(FeatureIndex, f64)>,
}

impl Projection {
    /// Build a projection from arbitrary terms. A repeated feature keeps its last weight.
    #[must_use]
    pub fn from_terms(terms: Vec<(FeatureIndex, f64)>) -> Self {
        let mut projection = Self::default();
        for (feature, weight) in terms {
            projection.set(feature, weight);
        }
        projection
    }

    fn set(&mut self, feature: FeatureIndex, weight: f64) {
        match self.terms.binary_search_by_key(&feature, |&(f, _)| f) {
            Ok(pos) => self.terms[pos].1 = weight,
            Err(pos) => self.terms.insert(pos, (feature, weight)),
        }
    }

    /// Return the `(feature, weight)` pairs sorted by feature.
    #[must_use]
    pub fn terms(&self) -> &[(FeatureIndex, f64)] {
        &self.terms
    }

    /// Return the number of non-zero weights.
    #[must_use]
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// Return `true` when the projection has no non-zero weight.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Dot product of the projection with a feature row.
    #[must_use]
    pub fn apply(&self, row: &[f64]) -> f64 {
        self.terms.iter().map(|&(f, w)| w * row[f.index()]).sum()
    }
}

/// Position and extent of a rectangular window in a `data_height x data_width` grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PatchGeometry {
    /// Top row of the window.
    pub row: usize,
    /// Left column of the window.
    pub col: usize,
    /// Number of rows covered.
    pub height: usize,
    /// Number of columns covered.
    pub width: usize,
}

impl PatchGeometry {
    /// Unit-weight projection over every cell of the window.
    ///
    /// Cell `(r, c)` maps to feature `r * data_width + c`.
    #[must_use]
    pub fn to_projection(&self, data_width: usize) -> Projection {
        let mut terms = Vec::with_capacity(self.height * self.width);
        for r in self.row..self.row + self.height {
            for c in self.col..self.col + self.width {
                terms.push((FeatureIndex::new(r * data_width + c), 1.0));
            }
        }
        Projection { terms }
    }
}

/// Resolved patch sampling bounds. Built by the tree configuration after validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchBounds {
    pub(crate) data_height: usize,
    pub(crate) data_width: usize,
    pub(crate) min_height: usize,
    pub(crate) max_height: usize,
    pub(crate) min_width: usize,
    pub(crate) max_width: usize,
}

impl PatchBounds {
    /// `true` when every window is a single cell.
    fn is_unit(&self) -> bool {
        self.max_height == 1 && self.max_width == 1
    }

    fn sample(&self, rng: &mut impl Rng) -> PatchGeometry {
        let height = rng.gen_range(self.min_height..=self.max_height);
        let width = rng.gen_range(self.min_width..=self.max_width);
        let row = rng.gen_range(0..=self.data_height - height);
        let col = rng.gen_range(0..=self.data_width - width);
        PatchGeometry {
            row,
            col,
            height,
            width,
        }
    }
}

/// How a splitter draws its candidate directions at each node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProjectionSampler {
    /// `max_features` distinct features, one-hot.
    Axis,
    /// `max_features` sparse `±1` projections, each led by a distinct feature.
    Oblique {
        /// Average non-zeros per projection. Each projection gets
        /// `floor(fc)` or `ceil(fc)` distinct features.
        feature_combinations: f64,
    },
    /// `max_features` random windows over the feature grid.
    Patch(PatchBounds),
}

/// A sampled direction, ready to be projected and turned into a [`SplitRule`].
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Candidate {
    Axis(FeatureIndex),
    Oblique(Projection),
    Patch(Projection, PatchGeometry),
}

impl Candidate {
    #[inline]
    pub(crate) fn project(&self, data: &Dataset, sample: usize) -> f64 {
        match self {
            Candidate::Axis(feature) => data.value(sample, feature.index()),
            Candidate::Oblique(projection) | Candidate::Patch(projection, _) => {
                projection.apply(data.row(sample))
            }
        }
    }

    pub(crate) fn into_rule(self, threshold: f64) -> SplitRule {
        match self {
            Candidate::Axis(feature) => SplitRule::Axis { feature, threshold },
            Candidate::Oblique(projection) => SplitRule::Oblique {
                projection,
                threshold,
            },
            Candidate::Patch(projection, geometry) => SplitRule::Patch {
                projection,
                geometry,
                threshold,
            },
        }
    }
}

impl ProjectionSampler {
    /// Draw the candidate directions for one node, in evaluation order.
    ///
    /// Every family starts from the same partial shuffle of the feature
    /// indices, so unit-density oblique projections and `1x1` patches visit
    /// features in the order the axis sampler would.
    pub(crate) fn sample(
        &self,
        n_features: usize,
        max_features: usize,
        rng: &mut impl Rng,
    ) -> Vec<Candidate> {
        match self {
            ProjectionSampler::Axis => distinct_features(n_features, max_features, rng)
                .into_iter()
                .map(|f| Candidate::Axis(FeatureIndex::new(f)))
                .collect(),
            ProjectionSampler::Oblique {
                feature_combinations,
            } => {
                let leads = distinct_features(n_features, max_features, rng);
                let base = feature_combinations.floor();
                let extra_chance = feature_combinations - base;
                let mut pool: Vec<usize> = Vec::with_capacity(n_features);
                let mut candidates = Vec::with_capacity(leads.len());
                for lead in leads {
                    let mut n_non_zeros = base as usize;
                    if extra_chance > 0.0 && rng.gen_bool(extra_chance) {
                        n_non_zeros += 1;
                    }
                    let n_non_zeros = n_non_zeros.clamp(1, n_features);

                    let mut projection = Projection::default();
                    projection.set(FeatureIndex::new(lead), random_sign(rng));
                    if n_non_zeros > 1 {
                        pool.clear();
                        pool.extend((0..n_features).filter(|&f| f != lead));
                        shuffle_prefix(&mut pool, n_non_zeros - 1, rng);
                        for &f in &pool[..n_non_zeros - 1] {
                            projection.set(FeatureIndex::new(f), random_sign(rng));
                        }
                    }
                    candidates.push(Candidate::Oblique(projection));
                }
                candidates
            }
            ProjectionSampler::Patch(bounds) if bounds.is_unit() => {
                distinct_features(n_features, max_features, rng)
                    .into_iter()
                    .map(|f| {
                        let geometry = PatchGeometry {
                            row: f / bounds.data_width,
                            col: f % bounds.data_width,
                            height: 1,
                            width: 1,
                        };
                        Candidate::Patch(geometry.to_projection(bounds.data_width), geometry)
                    })
                    .collect()
            }
            ProjectionSampler::Patch(bounds) => (0..max_features)
                .map(|_| {
                    let geometry = bounds.sample(rng);
                    Candidate::Patch(geometry.to_projection(bounds.data_width), geometry)
                })
                .collect(),
        }
    }
}

/// Partial Fisher-Yates: shuffle only the first `take` positions of `pool`.
fn shuffle_prefix(pool: &mut [usize], take: usize, rng: &mut impl Rng) {
    let n = pool.len();
    for i in 0..take.min(n) {
        let j = rng.gen_range(i..n);
        pool.swap(i, j);
    }
}

/// `max_features` distinct feature indices in random order.
fn distinct_features(n_features: usize, max_features: usize, rng: &mut impl Rng) -> Vec<usize> {
    let mut order: Vec<usize> = (0..n_features).collect();
    let take = max_features.min(n_features);
    shuffle_prefix(&mut order, take, rng);
    order.truncate(take);
    order
}

fn random_sign(rng: &mut impl Rng) -> f64 {
    if rng.gen_bool(0.5) { 1.0 } else { -1.0 }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    // --- Projection ---

    #[test]
    fn from_terms_sorts_and_dedups() {
        let p = Projection::from_terms(vec![
            (FeatureIndex::new(3), 1.0),
            (FeatureIndex::new(0), -1.0),
            (FeatureIndex::new(3), -1.0),
        ]);
        assert_eq!(
            p.terms(),
            &[(FeatureIndex::new(0), -1.0), (FeatureIndex::new(3), -1.0)]
        );
    }

    #[test]
    fn apply_is_dot_product() {
        let p = Projection::from_terms(vec![(FeatureIndex::new(0), 2.0), (FeatureIndex::new(2), -1.0)]);
        assert_eq!(p.apply(&[1.0, 100.0, 4.0]), -2.0);
    }

    // --- PatchGeometry ---

    #[test]
    fn patch_maps_cells_row_major() {
        let geometry = PatchGeometry {
            row: 1,
            col: 1,
            height: 2,
            width: 2,
        };
        let features: Vec<usize> = geometry
            .to_projection(3)
            .terms()
            .iter()
            .map(|(f, _)| f.index())
            .collect();
        assert_eq!(features, vec![4, 5, 7, 8]);
    }

    // --- Sampling ---

    #[test]
    fn axis_samples_distinct_features() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let candidates = ProjectionSampler::Axis.sample(10, 4, &mut rng);
        assert_eq!(candidates.len(), 4);
        let mut features: Vec<usize> = candidates
            .iter()
            .map(|c| match c {
                Candidate::Axis(f) => f.index(),
                other => panic!("unexpected candidate {other:?}"),
            })
            .collect();
        features.sort_unstable();
        features.dedup();
        assert_eq!(features.len(), 4);
    }

    fn axis_features(candidates: &[Candidate]) -> Vec<usize> {
        candidates
            .iter()
            .map(|c| match c {
                Candidate::Axis(f) => f.index(),
                other => panic!("unexpected candidate {other:?}"),
            })
            .collect()
    }

    #[test]
    fn oblique_projections_have_fc_distinct_terms() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let sampler = ProjectionSampler::Oblique {
            feature_combinations: 2.5,
        };
        let candidates = sampler.sample(5, 40, &mut rng);
        assert_eq!(candidates.len(), 5);
        let mut total = 0;
        for candidate in &candidates {
            let Candidate::Oblique(p) = candidate else {
                panic!("unexpected candidate {candidate:?}");
            };
            assert!(p.len() == 2 || p.len() == 3, "{} terms", p.len());
            total += p.len();
            for &(f, w) in p.terms() {
                assert!(f.index() < 5);
                assert!(w == 1.0 || w == -1.0);
            }
        }
        assert!((10..=15).contains(&total));
    }

    #[test]
    fn oblique_average_density_matches_combinations() {
        let mut rng = ChaCha8Rng::seed_from_u64(21);
        let sampler = ProjectionSampler::Oblique {
            feature_combinations: 1.5,
        };
        let (mut terms, mut projections) = (0, 0);
        for _ in 0..400 {
            for candidate in sampler.sample(6, 6, &mut rng) {
                let Candidate::Oblique(p) = candidate else {
                    panic!("unexpected candidate");
                };
                terms += p.len();
                projections += 1;
            }
        }
        let mean = terms as f64 / projections as f64;
        assert!((mean - 1.5).abs() < 0.05, "mean density {mean}");
    }

    #[test]
    fn unit_density_oblique_follows_axis_order() {
        let axis = ProjectionSampler::Axis.sample(7, 4, &mut ChaCha8Rng::seed_from_u64(5));
        let oblique = ProjectionSampler::Oblique {
            feature_combinations: 1.0,
        }
        .sample(7, 4, &mut ChaCha8Rng::seed_from_u64(5));
        let leads: Vec<usize> = oblique
            .iter()
            .map(|c| match c {
                Candidate::Oblique(p) => {
                    assert_eq!(p.len(), 1);
                    p.terms()[0].0.index()
                }
                other => panic!("unexpected candidate {other:?}"),
            })
            .collect();
        assert_eq!(leads, axis_features(&axis));
    }

    #[test]
    fn unit_patches_follow_axis_order() {
        let bounds = PatchBounds {
            data_height: 2,
            data_width: 3,
            min_height: 1,
            max_height: 1,
            min_width: 1,
            max_width: 1,
        };
        let mut axis_rng = ChaCha8Rng::seed_from_u64(8);
        let mut patch_rng = ChaCha8Rng::seed_from_u64(8);
        for _ in 0..5 {
            let axis = ProjectionSampler::Axis.sample(6, 6, &mut axis_rng);
            let patch = ProjectionSampler::Patch(bounds).sample(6, 6, &mut patch_rng);
            let cells: Vec<usize> = patch
                .iter()
                .map(|c| match c {
                    Candidate::Patch(p, g) => {
                        assert_eq!(p.terms(), &[(FeatureIndex::new(g.row * 3 + g.col), 1.0)]);
                        g.row * 3 + g.col
                    }
                    other => panic!("unexpected candidate {other:?}"),
                })
                .collect();
            assert_eq!(cells, axis_features(&axis));
        }
    }

    #[test]
    fn patch_windows_stay_inside_grid() {
        let bounds = PatchBounds {
            data_height: 4,
            data_width: 5,
            min_height: 1,
            max_height: 3,
            min_width: 2,
            max_width: 5,
        };
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        for candidate in ProjectionSampler::Patch(bounds).sample(20, 50, &mut rng) {
            let Candidate::Patch(projection, g) = candidate else {
                panic!("unexpected candidate");
            };
            assert!((1..=3).contains(&g.height));
            assert!((2..=5).contains(&g.width));
            assert!(g.row + g.height <= 4);
            assert!(g.col + g.width <= 5);
            assert_eq!(projection.len(), g.height * g.width);
        }
    }

    #[test]
    fn sampling_is_seed_deterministic() {
        let sampler = ProjectionSampler::Oblique {
            feature_combinations: 1.5,
        };
        let a = sampler.sample(4, 4, &mut ChaCha8Rng::seed_from_u64(99));
        let b = sampler.sample(4, 4, &mut ChaCha8Rng::seed_from_u64(99));
        assert_eq!(a, b);
    }
}
