//! Batched k-nearest-neighbors on the frontier engine
//!
//! Every point's candidate window is seeded with the first `k + 1` points,
//! segment-sorted by distance, then refined against all remaining points
//! with insertion-based top-k maintenance. The result for point `p` is the
//! `k` distinct nearest other points, ties broken by ascending index.
//!
//! # Architecture
//!
//! - `problem`: input description plus per-device array state
//! - `iteration`: the single-pass iteration loop run by the enactor

mod iteration;
mod problem;

pub use iteration::KnnIteration;
pub use problem::{KnnDataSlice, KnnProblem};

use crate::engine::{Enactor, EnactorConfig};
use anyhow::Result;

/// Compute each point's `k` nearest neighbors in one call
///
/// Runs the full engine lifecycle (`init` -> `reset` -> `enact` ->
/// `release`) on a single device and returns the neighbor ids, `k` per
/// point, row-major. `points` is flattened row-major with `dim` values per
/// point.
///
/// # Errors
///
/// Returns `EngineError::Configuration` for invalid `dim`/`k`/shape (see
/// [`KnnProblem::new`]), or propagates any allocation or primitive
/// failure from the run.
///
/// # Example
///
/// ```
/// use frontera::{knn, EnactorConfig};
///
/// # fn example() -> frontera::Result<()> {
/// let points = vec![0.0, 0.0, 1.0, 0.0, 5.0, 5.0];
/// let neighbors = knn(&points, 2, 1, EnactorConfig::default())?;
/// assert_eq!(neighbors, vec![1, 0, 1]);
/// # Ok(())
/// # }
/// ```
pub fn knn(points: &[f32], dim: usize, k: usize, config: EnactorConfig) -> Result<Vec<u32>> {
    let mut problem = KnnProblem::new(points, dim, k, 1)?;
    let n = problem.num_points();
    let target = config.target;

    let mut enactor = Enactor::<_, KnnIteration>::init(&mut problem, config)?;
    enactor.reset(n, target)?;
    enactor.enact()?;
    enactor.release()?;

    Ok(problem.knns().to_vec())
}
