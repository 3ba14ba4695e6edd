//! The generic enactor / iteration-loop framework
//!
//! An [`Enactor`] runs one worker thread per device. Each thread owns a set
//! of [`EnactorSlice`] execution contexts (one per peer device) and drives an
//! algorithm-specific [`IterationLoop`] over the device's [`Frontier`] until
//! the loop's stop predicate holds. Cross-device data moves only through the
//! explicit halo-exchange step (staged batches over channels), never through
//! shared mutable state.
//!
//! # Lifecycle
//!
//! `init` (allocate) -> `reset` (seed) -> `enact` (run to completion) ->
//! `release`. `reset` may be called again to re-run with the same
//! allocation.

mod enactor;
mod frontier;
mod slice;

pub use enactor::{
    expand_incoming_with, Enactor, EnactorConfig, IncomingBatch, IterationLoop, Problem,
};
pub use frontier::Frontier;
pub use slice::{DeviceStatus, EnactorSlice, ThreadSlice};

use thiserror::Error;

/// Engine error taxonomy
///
/// Every fallible engine operation reports one of these; the first failure
/// at any step aborts the remaining steps and propagates unchanged to the
/// `enact` caller. No operation is retried.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Host memory exhaustion or capacity overflow during init/reset
    #[error("allocation failed: {0}")]
    Allocation(String),

    /// A map/scan/sort primitive reported a fault
    #[error("parallel primitive failed: {0}")]
    Primitive(String),

    /// Invalid configuration, detected before any device work launches
    #[error("invalid configuration: {0}")]
    Configuration(String),
}
