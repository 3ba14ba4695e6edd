//! Property-based tests for the KNN engine
//!
//! Verifies the engine against a brute-force reference on arbitrary
//! distinct point sets.

use frontera::{knn, EnactorConfig, Target};
use proptest::prelude::*;
use std::collections::HashSet;

/// Brute-force reference: k nearest by squared distance, ties by index
fn brute_force_knn(points: &[f32], dim: usize, k: usize) -> Vec<u32> {
    let n = points.len() / dim;
    let mut result = Vec::with_capacity(n * k);
    for p in 0..n {
        let mut candidates: Vec<(f32, u32)> = (0..n)
            .filter(|&q| q != p)
            .map(|q| {
                let d: f32 = (0..dim)
                    .map(|c| {
                        let diff = points[p * dim + c] - points[q * dim + c];
                        diff * diff
                    })
                    .sum();
                (d, q as u32)
            })
            .collect();
        candidates.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        result.extend(candidates.iter().take(k).map(|&(_, q)| q));
    }
    result
}

/// Distinct 2-D integer-coordinate points (exact in f32, no duplicates)
fn distinct_points() -> impl Strategy<Value = Vec<f32>> {
    prop::collection::hash_set((0i32..60, 0i32..60), 2..40).prop_map(|cells| {
        let mut cells: Vec<_> = cells.into_iter().collect();
        cells.sort_unstable();
        cells
            .into_iter()
            .flat_map(|(x, y)| [x as f32, y as f32])
            .collect()
    })
}

proptest! {
    // Property: engine output matches brute force for every valid k
    #[test]
    fn prop_matches_brute_force(points in distinct_points(), k_raw in 0usize..64) {
        let n = points.len() / 2;
        let k = 1 + k_raw % (n - 1);

        let neighbors = knn(&points, 2, k, EnactorConfig::default()).unwrap();
        prop_assert_eq!(neighbors, brute_force_knn(&points, 2, k));
    }
}

proptest! {
    // Property: each neighbor list holds k distinct ids, none of them the
    // point itself
    #[test]
    fn prop_neighbors_distinct_and_exclude_self(points in distinct_points(), k_raw in 0usize..64) {
        let n = points.len() / 2;
        let k = 1 + k_raw % (n - 1);

        let neighbors = knn(&points, 2, k, EnactorConfig::default()).unwrap();
        prop_assert_eq!(neighbors.len(), n * k);

        for p in 0..n {
            let list = &neighbors[p * k..(p + 1) * k];
            let unique: HashSet<u32> = list.iter().copied().collect();
            prop_assert_eq!(unique.len(), k, "duplicates in list for point {}", p);
            prop_assert!(!list.contains(&(p as u32)), "point {} lists itself", p);
        }
    }
}

proptest! {
    // Property: serial and parallel backends agree exactly
    #[test]
    fn prop_targets_agree(points in distinct_points(), k_raw in 0usize..64) {
        let n = points.len() / 2;
        let k = 1 + k_raw % (n - 1);

        let serial = knn(&points, 2, k, EnactorConfig {
            target: Target::Serial,
            ..EnactorConfig::default()
        }).unwrap();
        let parallel = knn(&points, 2, k, EnactorConfig {
            target: Target::Parallel,
            ..EnactorConfig::default()
        }).unwrap();
        prop_assert_eq!(serial, parallel);
    }
}
