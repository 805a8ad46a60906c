//! Synthetic minority oversampling.
//!
//! Every category below the majority count is topped up with points placed
//! on the segment between a member and one of its `k` nearest same-category
//! neighbours. Runs on the training partition only.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::dataset::category_counts;
use crate::error::{AirQualityError, Result};
use crate::features::{FeatureVector, FEATURE_COUNT};
use crate::quality::Category;

#[derive(Debug, Clone, Copy)]
pub struct Smote {
    pub neighbors: usize,
    pub seed: u64,
}

impl Smote {
    pub fn new(neighbors: usize, seed: u64) -> Self {
        Self { neighbors, seed }
    }

    /// Minimum members a category needs for interpolation.
    pub fn required_samples(&self) -> usize {
        self.neighbors + 1
    }

    /// Returns the original rows followed by the synthesized ones.
    pub fn resample(
        &self,
        rows: &[FeatureVector],
        labels: &[Category],
    ) -> Result<(Vec<FeatureVector>, Vec<Category>)> {
        if self.neighbors == 0 {
            return Err(AirQualityError::Config(
                "oversampling needs at least one neighbour".into(),
            ));
        }
        let counts = category_counts(labels.iter().copied());
        let required = self.required_samples();
        for category in Category::ALL {
            let found = counts[category.index()];
            if found < required {
                return Err(AirQualityError::InsufficientSamples {
                    category: category.name().to_string(),
                    found,
                    required,
                });
            }
        }

        let target = counts.iter().copied().max().unwrap_or(0);
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut out_rows = rows.to_vec();
        let mut out_labels = labels.to_vec();

        for category in Category::ALL {
            let have = counts[category.index()];
            if have >= target {
                continue;
            }
            let members: Vec<FeatureVector> = rows
                .iter()
                .zip(labels)
                .filter(|(_, &l)| l == category)
                .map(|(r, _)| *r)
                .collect();
            let neighbors = nearest_neighbors(&members, self.neighbors);

            let missing = target - have;
            for _ in 0..missing {
                let i = rng.gen_range(0..members.len());
                let j = neighbors[i][rng.gen_range(0..neighbors[i].len())];
                let gap: f64 = rng.gen();
                out_rows.push(interpolate(&members[i], &members[j], gap));
                out_labels.push(category);
            }
            debug!("synthesized {} {} samples", missing, category);
        }

        info!(
            "balanced training set: {} -> {} rows ({} per category)",
            rows.len(),
            out_rows.len(),
            target
        );
        Ok((out_rows, out_labels))
    }
}

fn interpolate(a: &FeatureVector, b: &FeatureVector, gap: f64) -> FeatureVector {
    let mut out = [0.0; FEATURE_COUNT];
    for i in 0..FEATURE_COUNT {
        out[i] = a[i] + gap * (b[i] - a[i]);
    }
    out
}

fn squared_distance(a: &FeatureVector, b: &FeatureVector) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// The `k` nearest other points of every point, closest first.
///
/// Points are swept outward along the first feature from each query, which
/// stops as soon as the axis gap alone exceeds the current k-th distance.
pub(crate) fn nearest_neighbors(points: &[FeatureVector], k: usize) -> Vec<Vec<usize>> {
    let n = points.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| points[a][0].total_cmp(&points[b][0]));
    let mut rank = vec![0usize; n];
    for (r, &i) in order.iter().enumerate() {
        rank[i] = r;
    }

    (0..n)
        .into_par_iter()
        .map(|i| {
            let query = &points[i];
            let mut best: Vec<(f64, usize)> = Vec::with_capacity(k + 1);
            let (mut lo, mut hi) = (rank[i], rank[i] + 1);
            loop {
                let down = (lo > 0).then(|| order[lo - 1]);
                let up = (hi < n).then(|| order[hi]);
                let next = match (down, up) {
                    (None, None) => break,
                    (Some(d), None) => {
                        lo -= 1;
                        d
                    }
                    (None, Some(u)) => {
                        hi += 1;
                        u
                    }
                    (Some(d), Some(u)) => {
                        if query[0] - points[d][0] <= points[u][0] - query[0] {
                            lo -= 1;
                            d
                        } else {
                            hi += 1;
                            u
                        }
                    }
                };

                let worst = if best.len() == k {
                    best[k - 1].0
                } else {
                    f64::INFINITY
                };
                let dx = points[next][0] - query[0];
                if dx * dx > worst {
                    break;
                }
                let d = squared_distance(query, &points[next]);
                if d < worst {
                    let pos = best.partition_point(|&(bd, _)| bd <= d);
                    best.insert(pos, (d, next));
                    best.truncate(k);
                }
            }
            best.into_iter().map(|(_, j)| j).collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brute_force(points: &[FeatureVector], i: usize, k: usize) -> Vec<f64> {
        let mut d: Vec<f64> = (0..points.len())
            .filter(|&j| j != i)
            .map(|j| squared_distance(&points[i], &points[j]))
            .collect();
        d.sort_by(f64::total_cmp);
        d.truncate(k);
        d
    }

    fn grid_points() -> Vec<FeatureVector> {
        let mut out = Vec::new();
        for a in 0..6 {
            for b in 0..5 {
                let (a, b) = (a as f64, b as f64);
                out.push([a * 0.37 % 1.0, b * 0.21, (a * b) * 0.05, 0.5 - b * 0.1]);
            }
        }
        out
    }

    #[test]
    fn test_neighbors_match_brute_force() {
        let points = grid_points();
        let k = 5;
        let nn = nearest_neighbors(&points, k);
        for (i, found) in nn.iter().enumerate() {
            assert_eq!(found.len(), k);
            assert!(!found.contains(&i));
            let got: Vec<f64> = found
                .iter()
                .map(|&j| squared_distance(&points[i], &points[j]))
                .collect();
            assert_eq!(got, brute_force(&points, i, k));
        }
    }

    fn imbalanced() -> (Vec<FeatureVector>, Vec<Category>) {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..40 {
            let t = i as f64 / 40.0;
            rows.push([t, t, t, t]);
            labels.push(Category::Good);
        }
        for i in 0..12 {
            let t = 0.5 + i as f64 / 100.0;
            rows.push([t, 1.0 - t, t, 0.2]);
            labels.push(Category::Moderate);
        }
        for i in 0..6 {
            let t = 0.9 + i as f64 / 100.0;
            rows.push([t, 0.1, 1.0 - t, 0.8]);
            labels.push(Category::Bad);
        }
        (rows, labels)
    }

    #[test]
    fn test_resample_equalizes_counts() {
        let (rows, labels) = imbalanced();
        let (out_rows, out_labels) = Smote::new(5, 42).resample(&rows, &labels).unwrap();
        assert_eq!(out_rows.len(), out_labels.len());
        assert_eq!(category_counts(out_labels.iter().copied()), [40, 40, 40]);
        assert_eq!(&out_rows[..rows.len()], &rows[..]);
    }

    #[test]
    fn test_synthetic_points_stay_inside_category_hull() {
        let (rows, labels) = imbalanced();
        let (out_rows, out_labels) = Smote::new(5, 42).resample(&rows, &labels).unwrap();
        for (row, label) in out_rows.iter().zip(&out_labels).skip(rows.len()) {
            if *label == Category::Bad {
                assert!(row[0] >= 0.9 - 1e-9 && row[0] <= 0.95 + 1e-9);
                assert_eq!(row[1], 0.1);
            }
        }
    }

    #[test]
    fn test_seeded_resampling_is_reproducible() {
        let (rows, labels) = imbalanced();
        let a = Smote::new(3, 9).resample(&rows, &labels).unwrap();
        let b = Smote::new(3, 9).resample(&rows, &labels).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_insufficient_samples() {
        let (rows, labels) = imbalanced();
        let err = Smote::new(6, 42).resample(&rows, &labels).unwrap_err();
        match err {
            AirQualityError::InsufficientSamples {
                category,
                found,
                required,
            } => {
                assert_eq!(category, "Bad");
                assert_eq!(found, 6);
                assert_eq!(required, 7);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_zero_neighbors_is_rejected() {
        let (rows, labels) = imbalanced();
        let err = Smote::new(0, 42).resample(&rows, &labels).unwrap_err();
        assert!(matches!(err, AirQualityError::Config(_)));
    }
}
