//! Stratified train/test partitioning.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::quality::{Category, CATEGORY_COUNT};

/// Row indices of each partition, in ascending order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Hold out `test_ratio` of every category, so both partitions keep the
/// category proportions of the full table. The same seed always yields the
/// same partition.
///
/// A category with at least two members always keeps one on each side.
pub fn stratified_split(labels: &[Category], test_ratio: f64, seed: u64) -> SplitIndices {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut by_category: [Vec<usize>; CATEGORY_COUNT] = Default::default();
    for (i, c) in labels.iter().enumerate() {
        by_category[c.index()].push(i);
    }

    let mut train = Vec::with_capacity(labels.len());
    let mut test = Vec::new();
    for members in by_category.iter_mut() {
        members.shuffle(&mut rng);
        let n = members.len();
        let mut n_test = (n as f64 * test_ratio).round() as usize;
        if n >= 2 {
            n_test = n_test.clamp(1, n - 1);
        } else {
            n_test = 0;
        }
        test.extend_from_slice(&members[..n_test]);
        train.extend_from_slice(&members[n_test..]);
    }
    train.sort_unstable();
    test.sort_unstable();
    SplitIndices { train, test }
}

/// Pick rows by index.
pub fn take<T: Copy>(items: &[T], indices: &[usize]) -> Vec<T> {
    indices.iter().map(|&i| items[i]).collect()
}
