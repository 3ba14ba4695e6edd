//! Per-device execution contexts
//!
//! An [`EnactorSlice`] pairs one frontier with launch parameters and running
//! statistics; each device owns one slice per peer device (the slice whose
//! peer index equals the device's own is its local context). A
//! [`ThreadSlice`] carries the per-thread bookkeeping moved into the
//! device's worker.

use super::Frontier;
use crate::primitives::Target;
use anyhow::Result;

/// Per-device run state
///
/// `Created -> Initialized -> Seeded -> Running -> {Stopped | Failed} ->
/// Released`. `Running` loops the iteration loop until the stop predicate
/// holds or a failure propagates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    /// Constructed, not yet allocated
    Created,
    /// Frontier allocated
    Initialized,
    /// Frontier seeded, ready to run
    Seeded,
    /// Worker thread executing the iteration loop
    Running,
    /// Stop predicate held; results are valid
    Stopped,
    /// A primitive or allocation failure aborted the run
    Failed,
    /// Per-device state dropped
    Released,
}

/// One (device x peer) execution context
///
/// Owns a [`Frontier`] plus the launch parameters used when dispatching work
/// toward the paired peer, and running statistics. Never shared across
/// devices; the owning device's worker thread is the only mutator.
#[derive(Debug)]
pub struct EnactorSlice {
    /// Work queue for this context
    pub frontier: Frontier,

    /// Execution backend for primitive dispatch
    pub target: Target,

    /// Peer device this context pairs with (peer == device for the local
    /// context)
    pub peer: usize,

    /// Iterations completed so far
    pub iteration: usize,

    /// Cumulative work items observed across iterations
    pub queued: usize,

    /// Current run state
    pub status: DeviceStatus,
}

impl EnactorSlice {
    /// Allocate a context with the given frontier capacity
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Allocation` if the frontier cannot be
    /// allocated.
    pub fn new(capacity: usize, target: Target, peer: usize) -> Result<Self> {
        Ok(Self {
            frontier: Frontier::with_capacity(capacity)?,
            target,
            peer,
            iteration: 0,
            queued: 0,
            status: DeviceStatus::Initialized,
        })
    }

    /// Reseed the frontier with `[0, n)` and reset statistics
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Allocation` if `n` exceeds the frontier
    /// capacity.
    pub fn reset(&mut self, n: usize, target: Target) -> Result<()> {
        self.frontier.seed_sequence(n)?;
        self.target = target;
        self.iteration = 0;
        self.queued = 0;
        self.status = DeviceStatus::Seeded;
        Ok(())
    }
}

/// Per-device worker bookkeeping
///
/// Moved into the device's worker thread at `enact` time.
#[derive(Debug, Clone)]
pub struct ThreadSlice {
    /// Device index in `[0, num_devices)`
    pub device: usize,

    /// Frontier size seeded at the last reset
    pub init_size: usize,
}

impl ThreadSlice {
    /// Bookkeeping for one device
    #[must_use]
    pub const fn new(device: usize) -> Self {
        Self {
            device,
            init_size: 0,
        }
    }
}
