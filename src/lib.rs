//! frontera: frontier-driven parallel iteration engine
//!
//! # Overview
//!
//! frontera drives iterative, frontier-based parallel computations: an
//! [`Enactor`] owns one worker thread per device, each repeatedly running an
//! algorithm-specific [`IterationLoop`] over a double-buffered work queue
//! (the [`Frontier`]) until the loop's stop predicate holds. The engine is
//! instantiated here by a batched k-nearest-neighbors computation that
//! exercises every mechanism: parallel map, segmented sort, and an
//! insertion-based top-k refinement pass.
//!
//! # Quick Start
//!
//! ```
//! use frontera::{knn, EnactorConfig};
//!
//! # fn example() -> frontera::Result<()> {
//! // Four 1-D points; two nearest neighbors for each.
//! let points = vec![0.0, 1.0, 3.0, 10.0];
//! let neighbors = knn(&points, 1, 2, EnactorConfig::default())?;
//!
//! // Row-major: point 0's neighbors are points 1 and 2.
//! assert_eq!(&neighbors[0..2], &[1, 2]);
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - **`primitives`**: contracts over the trusted data-parallel backend
//!   (rayon) - parallel map, prefix scan, segmented sort
//! - **`engine`**: the generic enactor/iteration-loop framework - frontier,
//!   per-device execution contexts, lifecycle, halo exchange
//! - **`knn`**: the k-nearest-neighbors instantiation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod engine;
pub mod knn;
pub mod primitives;

// Re-export core types
pub use engine::{
    expand_incoming_with, DeviceStatus, Enactor, EnactorConfig, EnactorSlice, EngineError,
    Frontier, IncomingBatch, IterationLoop, Problem, ThreadSlice,
};
pub use knn::{knn, KnnDataSlice, KnnIteration, KnnProblem};
pub use primitives::Target;

// Error type
pub use anyhow::{Error, Result};
