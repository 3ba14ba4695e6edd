//! KNN problem state and per-device data slices

use crate::engine::{EngineError, Problem};
use crate::primitives::exclusive_scan;
use anyhow::Result;

/// Allocate a zero-filled vector, reporting exhaustion as an engine error
fn try_zeroed<T: Clone + Default>(len: usize, what: &str) -> Result<Vec<T>> {
    let mut v = Vec::new();
    v.try_reserve_exact(len)
        .map_err(|e| EngineError::Allocation(format!("{what} ({len} entries): {e}")))?;
    v.resize(len, T::default());
    Ok(v)
}

/// Per-device KNN state
///
/// Each point owns a candidate segment of exactly `k + 1` slots (its `k`
/// nearest so far plus itself); `offsets` delimits the segments for the
/// batched sort.
#[derive(Debug)]
pub struct KnnDataSlice {
    /// Device-local copy of the flattened input points (row-major,
    /// `dim` values per point)
    pub points: Vec<f32>,

    /// Candidate ids, one segment of `k + 1` per point
    pub keys: Vec<u32>,

    /// Sorted candidate ids (segmented-sort output)
    pub keys_out: Vec<u32>,

    /// Candidate distances, parallel to `keys`
    pub distance: Vec<f32>,

    /// Sorted candidate distances, parallel to `keys_out`
    pub distance_out: Vec<f32>,

    /// Segment boundaries for the batched sort: `offsets[i] = i * (k + 1)`,
    /// length `num_points + 1`
    pub offsets: Vec<u32>,

    /// Final neighbor ids, `k` per point, row-major
    pub knns: Vec<u32>,

    /// Neighbors requested per point
    pub k: usize,

    /// Number of input points
    pub num_points: usize,

    /// Point dimensionality
    pub dim: usize,
}

impl KnnDataSlice {
    /// Allocate all per-device arrays for `num_points` points
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Allocation` on host memory exhaustion, or
    /// `EngineError::Primitive` if the segment offsets overflow `u32`.
    pub fn new(points: &[f32], num_points: usize, dim: usize, k: usize) -> Result<Self> {
        let segment = k + 1;
        let candidates = num_points * segment;

        let mut local_points = Vec::new();
        local_points
            .try_reserve_exact(points.len())
            .map_err(|e| EngineError::Allocation(format!("points copy: {e}")))?;
        local_points.extend_from_slice(points);

        // Uniform segments: one (k + 1)-slot candidate window per point
        let offsets = exclusive_scan(&vec![segment; num_points])?;

        Ok(Self {
            points: local_points,
            keys: try_zeroed(candidates, "candidate keys")?,
            keys_out: try_zeroed(candidates, "sorted candidate keys")?,
            distance: try_zeroed(candidates, "candidate distances")?,
            distance_out: try_zeroed(candidates, "sorted candidate distances")?,
            offsets,
            knns: try_zeroed(num_points * k, "neighbor lists")?,
            k,
            num_points,
            dim,
        })
    }
}

/// The KNN computation: input points plus one data slice per device
///
/// Owns all algorithm state; the enactor borrows it mutably for the
/// duration of a run and the caller reads `knns()` afterwards.
///
/// # Example
///
/// ```
/// use frontera::KnnProblem;
///
/// # fn example() -> frontera::Result<()> {
/// let problem = KnnProblem::new(&[0.0, 1.0, 3.0, 10.0], 1, 2, 1)?;
/// assert_eq!(problem.num_points(), 4);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct KnnProblem {
    points: Vec<f32>,
    num_points: usize,
    dim: usize,
    k: usize,
    slices: Vec<KnnDataSlice>,
}

impl KnnProblem {
    /// Validate the configuration and allocate per-device state
    ///
    /// `points` is row-major with `dim` values per point.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Configuration` when:
    /// - `dim == 0` or `points.len()` is not a multiple of `dim`
    /// - `k == 0` or `k >= num_points`
    /// - `num_devices != 1` (the cross-device KNN merge is undefined, so
    ///   multi-device runs are rejected before any work launches)
    ///
    /// Returns `EngineError::Allocation` on host memory exhaustion.
    pub fn new(points: &[f32], dim: usize, k: usize, num_devices: usize) -> Result<Self> {
        if dim == 0 {
            return Err(EngineError::Configuration("dim must be nonzero".into()).into());
        }
        if points.is_empty() || points.len() % dim != 0 {
            return Err(EngineError::Configuration(format!(
                "points array of {} values is not a nonempty multiple of dim {dim}",
                points.len()
            ))
            .into());
        }
        let num_points = points.len() / dim;
        if k == 0 {
            return Err(EngineError::Configuration("k must be nonzero".into()).into());
        }
        if k >= num_points {
            return Err(EngineError::Configuration(format!(
                "k = {k} must be smaller than the number of points ({num_points})"
            ))
            .into());
        }
        if num_devices != 1 {
            return Err(EngineError::Configuration(format!(
                "multi-device KNN is unsupported (got {num_devices} devices): \
                 the cross-device top-k merge is undefined"
            ))
            .into());
        }

        let mut slices = Vec::new();
        slices
            .try_reserve_exact(num_devices)
            .map_err(|e| EngineError::Allocation(format!("data slices: {e}")))?;
        for _ in 0..num_devices {
            slices.push(KnnDataSlice::new(points, num_points, dim, k)?);
        }

        Ok(Self {
            points: points.to_vec(),
            num_points,
            dim,
            k,
            slices,
        })
    }

    /// Number of input points
    #[must_use]
    pub const fn num_points(&self) -> usize {
        self.num_points
    }

    /// Point dimensionality
    #[must_use]
    pub const fn dim(&self) -> usize {
        self.dim
    }

    /// Neighbors requested per point
    #[must_use]
    pub const fn k(&self) -> usize {
        self.k
    }

    /// The flattened input points (row-major)
    #[must_use]
    pub fn points(&self) -> &[f32] {
        &self.points
    }

    /// The computed neighbor ids (`num_points * k`, row-major)
    ///
    /// Valid after a completed `enact`; zero-filled before.
    #[must_use]
    pub fn knns(&self) -> &[u32] {
        &self.slices[0].knns
    }
}

impl Problem for KnnProblem {
    type Slice = KnnDataSlice;

    fn num_items(&self) -> usize {
        self.num_points
    }

    fn num_devices(&self) -> usize {
        self.slices.len()
    }

    fn slices_mut(&mut self) -> &mut [KnnDataSlice] {
        &mut self.slices
    }
}
