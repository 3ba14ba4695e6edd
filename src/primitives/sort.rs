//! Batched segmented key/value sort
//!
//! Sorts many independent contiguous regions of a concatenated key/value
//! pair array in one call, boundaries given by a monotonically increasing
//! offsets array. Keys are compared by IEEE total order (NaNs sort last);
//! ties between equal keys break by ascending value, so output is
//! deterministic under any backend.

use super::Target;
use crate::engine::EngineError;
use anyhow::Result;
use rayon::prelude::*;

/// Sort each `(key, value)` segment ascending by key into the output arrays
///
/// `offsets` delimits `offsets.len() - 1` segments over the inputs; segment
/// `i` covers `[offsets[i], offsets[i + 1])`. Inputs are left untouched;
/// outputs receive the segment-sorted pairs.
///
/// # Errors
///
/// Returns `EngineError::Primitive` before touching any segment if the
/// array shapes disagree or `offsets` is not a monotonic cover of the
/// input.
pub fn segmented_sort_pairs(
    target: Target,
    keys: &[f32],
    values: &[u32],
    offsets: &[u32],
    keys_out: &mut [f32],
    values_out: &mut [u32],
) -> Result<()> {
    validate_shape(keys.len(), values.len(), offsets, keys_out.len(), values_out.len())?;

    keys_out.copy_from_slice(keys);
    values_out.copy_from_slice(values);

    let mut segments = split_segments(keys_out, values_out, offsets);
    match target {
        Target::Serial => segments.iter_mut().for_each(|(k, v)| sort_segment(k, v)),
        Target::Parallel => segments.par_iter_mut().for_each(|(k, v)| sort_segment(k, v)),
    }
    Ok(())
}

fn validate_shape(
    keys_len: usize,
    values_len: usize,
    offsets: &[u32],
    keys_out_len: usize,
    values_out_len: usize,
) -> Result<()> {
    if keys_len != values_len || keys_len != keys_out_len || keys_len != values_out_len {
        return Err(EngineError::Primitive(format!(
            "segmented sort shape mismatch: keys {keys_len}, values {values_len}, \
             keys_out {keys_out_len}, values_out {values_out_len}"
        ))
        .into());
    }
    let (Some(&first), Some(&last)) = (offsets.first(), offsets.last()) else {
        return Err(EngineError::Primitive("segmented sort with empty offsets".into()).into());
    };
    if first != 0 || last as usize != keys_len {
        return Err(EngineError::Primitive(format!(
            "offsets [{first}..{last}] do not cover {keys_len} pairs"
        ))
        .into());
    }
    if offsets.windows(2).any(|w| w[0] > w[1]) {
        return Err(EngineError::Primitive("offsets not monotonically increasing".into()).into());
    }
    Ok(())
}

/// Carve the output arrays into per-segment exclusive windows
fn split_segments<'a>(
    mut keys: &'a mut [f32],
    mut values: &'a mut [u32],
    offsets: &[u32],
) -> Vec<(&'a mut [f32], &'a mut [u32])> {
    let mut segments = Vec::with_capacity(offsets.len().saturating_sub(1));
    let mut prev = 0usize;
    for &off in &offsets[1..] {
        let len = off as usize - prev;
        let (seg_k, rest_k) = keys.split_at_mut(len);
        let (seg_v, rest_v) = values.split_at_mut(len);
        keys = rest_k;
        values = rest_v;
        segments.push((seg_k, seg_v));
        prev = off as usize;
    }
    segments
}

fn sort_segment(keys: &mut [f32], values: &mut [u32]) {
    let mut pairs: Vec<(f32, u32)> = keys
        .iter()
        .copied()
        .zip(values.iter().copied())
        .collect();
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    for (i, (key, value)) in pairs.into_iter().enumerate() {
        keys[i] = key;
        values[i] = value;
    }
}
