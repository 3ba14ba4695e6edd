//! Contracts over the trusted data-parallel backend
//!
//! The engine treats its low-level primitives - device-wide parallel map,
//! prefix scan, segmented key/value sort - as an external library with a
//! stated contract rather than something it implements itself. Here the
//! backend is rayon; every primitive also has a serial reference path
//! selected by [`Target`] so results can be cross-checked.
//!
//! Contract common to the map primitives: the operation is applied to every
//! index in `[0, N)`; invocation order under [`Target::Parallel`] is
//! unspecified and must not be relied upon; the first `Err` aborts the
//! remaining work and propagates to the caller.

mod sort;

pub use sort::segmented_sort_pairs;

use crate::engine::EngineError;
use anyhow::Result;
use rayon::prelude::*;

/// Execution backend selector
///
/// Carried through every lifecycle call and primitive dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Target {
    /// In-order reference execution on the calling thread
    Serial,
    /// Data-parallel execution via rayon; invocation order unspecified
    #[default]
    Parallel,
}

/// Parallel map: apply `op` to every element of a mutable slice
///
/// `op` receives the element index and exclusive access to that element.
///
/// # Errors
///
/// Propagates the first error returned by `op`; remaining invocations are
/// abandoned.
pub fn for_all<T, F>(target: Target, items: &mut [T], op: F) -> Result<()>
where
    T: Send,
    F: Fn(usize, &mut T) -> Result<()> + Sync + Send,
{
    match target {
        Target::Serial => items.iter_mut().enumerate().try_for_each(|(i, v)| op(i, v)),
        Target::Parallel => items
            .par_iter_mut()
            .enumerate()
            .try_for_each(|(i, v)| op(i, v)),
    }
}

/// Parallel map over two same-length slices in lockstep
///
/// `op` receives the element index and exclusive access to both elements at
/// that index.
///
/// # Errors
///
/// Returns `EngineError::Primitive` on length mismatch; otherwise
/// propagates the first error returned by `op`.
pub fn for_all_zip<A, B, F>(target: Target, a: &mut [A], b: &mut [B], op: F) -> Result<()>
where
    A: Send,
    B: Send,
    F: Fn(usize, &mut A, &mut B) -> Result<()> + Sync + Send,
{
    if a.len() != b.len() {
        return Err(EngineError::Primitive(format!(
            "zipped map over mismatched lengths {} and {}",
            a.len(),
            b.len()
        ))
        .into());
    }
    match target {
        Target::Serial => a
            .iter_mut()
            .zip(b.iter_mut())
            .enumerate()
            .try_for_each(|(i, (x, y))| op(i, x, y)),
        Target::Parallel => a
            .par_iter_mut()
            .zip(b.par_iter_mut())
            .enumerate()
            .try_for_each(|(i, (x, y))| op(i, x, y)),
    }
}

/// Parallel map over fixed-stride windows of two slices in lockstep
///
/// `op` receives the window index and exclusive access to the `chunk`-sized
/// window of each slice. The final window may be shorter when the lengths
/// are not a multiple of `chunk`.
///
/// # Errors
///
/// Returns `EngineError::Primitive` on zero stride or length mismatch;
/// otherwise propagates the first error returned by `op`.
pub fn for_all_chunks_zip<A, B, F>(
    target: Target,
    chunk: usize,
    a: &mut [A],
    b: &mut [B],
    op: F,
) -> Result<()>
where
    A: Send,
    B: Send,
    F: Fn(usize, &mut [A], &mut [B]) -> Result<()> + Sync + Send,
{
    if chunk == 0 {
        return Err(EngineError::Primitive("chunked map with zero stride".into()).into());
    }
    if a.len() != b.len() {
        return Err(EngineError::Primitive(format!(
            "chunked map over mismatched lengths {} and {}",
            a.len(),
            b.len()
        ))
        .into());
    }
    match target {
        Target::Serial => a
            .chunks_mut(chunk)
            .zip(b.chunks_mut(chunk))
            .enumerate()
            .try_for_each(|(i, (x, y))| op(i, x, y)),
        Target::Parallel => a
            .par_chunks_mut(chunk)
            .zip(b.par_chunks_mut(chunk))
            .enumerate()
            .try_for_each(|(i, (x, y))| op(i, x, y)),
    }
}

/// Exclusive prefix scan over segment lengths, producing an offsets array
///
/// Output has `lengths.len() + 1` entries; `offsets[i]` is the sum of all
/// lengths before `i`, and the final entry is the total. Runs on the calling
/// thread.
///
/// # Errors
///
/// Returns `EngineError::Primitive` if the running total overflows `u32`,
/// or `EngineError::Allocation` if the output cannot be reserved.
pub fn exclusive_scan(lengths: &[usize]) -> Result<Vec<u32>> {
    let mut offsets = Vec::new();
    offsets
        .try_reserve_exact(lengths.len() + 1)
        .map_err(|e| EngineError::Allocation(format!("scan output: {e}")))?;

    let mut total = 0u32;
    offsets.push(total);
    for &len in lengths {
        let len = u32::try_from(len)
            .ok()
            .and_then(|l| total.checked_add(l))
            .ok_or_else(|| EngineError::Primitive("offset scan overflowed u32".into()))?;
        total = len;
        offsets.push(total);
    }
    Ok(offsets)
}
