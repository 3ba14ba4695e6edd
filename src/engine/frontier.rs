//! Double-buffered frontier work queue
//!
//! A frontier holds the work-item indices driving one device's iteration.
//! Two buffers alternate: the active one is consumed by the current
//! iteration while the next is filled, then `advance` swaps them and bumps
//! the generation counter.

use super::EngineError;
use anyhow::Result;

/// Per-device, double-buffered queue of work-item indices
///
/// Capacity is fixed at construction; both buffers are allocated once and
/// never grow. Mutation is confined to the owning device's worker thread.
///
/// # Example
///
/// ```
/// use frontera::Frontier;
///
/// # fn example() -> frontera::Result<()> {
/// let mut frontier = Frontier::with_capacity(8)?;
/// frontier.seed_sequence(4)?;
/// assert_eq!(frontier.len(), 4);
/// assert_eq!(frontier.active(), &[0, 1, 2, 3]);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Frontier {
    /// Double buffer: `buffers[selector]` is the active queue
    buffers: [Vec<u32>; 2],

    /// Active buffer slot
    selector: usize,

    /// Generation counter, bumped on every `advance`
    queue_index: usize,

    /// Fixed capacity shared by both buffers
    capacity: usize,
}

impl Frontier {
    /// Allocate both buffers with the given capacity
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Allocation` if host memory for either buffer
    /// cannot be reserved.
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        let mut front = Vec::new();
        let mut back = Vec::new();
        front
            .try_reserve_exact(capacity)
            .map_err(|e| EngineError::Allocation(format!("frontier buffer ({capacity}): {e}")))?;
        back.try_reserve_exact(capacity)
            .map_err(|e| EngineError::Allocation(format!("frontier buffer ({capacity}): {e}")))?;

        Ok(Self {
            buffers: [front, back],
            selector: 0,
            queue_index: 0,
            capacity,
        })
    }

    /// Fill the active buffer with the identity sequence `[0, n)`
    ///
    /// Replaces any existing contents; the generation counter is not reset.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Allocation` if `n` exceeds capacity.
    #[allow(clippy::cast_possible_truncation)]
    pub fn seed_sequence(&mut self, n: usize) -> Result<()> {
        if n > self.capacity {
            return Err(EngineError::Allocation(format!(
                "seed of {n} items exceeds frontier capacity {}",
                self.capacity
            ))
            .into());
        }
        let active = &mut self.buffers[self.selector];
        active.clear();
        active.extend((0..n).map(|i| i as u32));
        Ok(())
    }

    /// Append one work item to the active buffer
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Allocation` if the buffer is full.
    pub fn push(&mut self, item: u32) -> Result<()> {
        let active = &mut self.buffers[self.selector];
        if active.len() == self.capacity {
            return Err(EngineError::Allocation(format!(
                "frontier overflow at capacity {}",
                self.capacity
            ))
            .into());
        }
        active.push(item);
        Ok(())
    }

    /// Swap buffers, clear the previously active one, and bump the
    /// generation
    ///
    /// Items staged via [`Frontier::next_mut`] become the active queue;
    /// the consumed queue becomes the (empty) fill side for the next
    /// iteration.
    pub fn advance(&mut self) {
        let consumed = self.selector;
        self.selector ^= 1;
        self.buffers[consumed].clear();
        self.queue_index += 1;
    }

    /// Items in the active buffer
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffers[self.selector].len()
    }

    /// Whether the active buffer is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The active buffer's contents
    #[must_use]
    pub fn active(&self) -> &[u32] {
        &self.buffers[self.selector]
    }

    /// The inactive (fill-side) buffer
    #[must_use]
    pub fn next_mut(&mut self) -> &mut Vec<u32> {
        &mut self.buffers[self.selector ^ 1]
    }

    /// Generation counter (number of `advance` calls since construction)
    #[must_use]
    pub const fn queue_index(&self) -> usize {
        self.queue_index
    }

    /// Fixed capacity of each buffer
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_sequence() {
        let mut frontier = Frontier::with_capacity(10).unwrap();
        frontier.seed_sequence(5).unwrap();

        assert_eq!(frontier.len(), 5);
        assert_eq!(frontier.active(), &[0, 1, 2, 3, 4]);
        assert!(!frontier.is_empty());
    }

    #[test]
    fn test_seed_overflow_rejected() {
        let mut frontier = Frontier::with_capacity(3).unwrap();
        let err = frontier.seed_sequence(4).unwrap_err();
        assert!(err.to_string().contains("capacity"));
    }

    #[test]
    fn test_push_capacity_enforced() {
        let mut frontier = Frontier::with_capacity(2).unwrap();
        frontier.push(7).unwrap();
        frontier.push(8).unwrap();
        assert!(frontier.push(9).is_err());
        assert_eq!(frontier.active(), &[7, 8]);
    }

    #[test]
    fn test_advance_swaps_and_bumps_generation() {
        let mut frontier = Frontier::with_capacity(4).unwrap();
        frontier.seed_sequence(3).unwrap();
        assert_eq!(frontier.queue_index(), 0);

        frontier.next_mut().push(42);
        frontier.advance();

        assert_eq!(frontier.queue_index(), 1);
        assert_eq!(frontier.active(), &[42]);

        // Advancing again exposes a cleared buffer
        frontier.advance();
        assert_eq!(frontier.queue_index(), 2);
        assert!(frontier.is_empty());
    }

    #[test]
    fn test_reseed_replaces_contents() {
        let mut frontier = Frontier::with_capacity(8).unwrap();
        frontier.seed_sequence(8).unwrap();
        frontier.seed_sequence(2).unwrap();
        assert_eq!(frontier.active(), &[0, 1]);
    }
}
