//! Enactor lifecycle and the iteration-loop traits
//!
//! The [`Enactor`] owns one [`IterationLoop`] and one group of
//! [`EnactorSlice`] contexts per device, borrows the caller's [`Problem`]
//! for the duration of a run, and drives each device on its own worker
//! thread. Halo exchange between devices is explicit message passing:
//! after each iteration every device stages one batch per peer, receives
//! one batch from every peer, folds kept items through `expand_incoming`,
//! and merges the staged peer frontiers into its local queue.

use super::{DeviceStatus, EnactorSlice, EngineError, Frontier, ThreadSlice};
use crate::primitives::Target;
use anyhow::Result;
use std::sync::mpsc;
use std::thread;

/// Enactor construction parameters
#[derive(Debug, Clone, Copy, Default)]
pub struct EnactorConfig {
    /// Frontier capacity multiplier over the problem's item count.
    ///
    /// `None` sizes each frontier for the dense worst case (`num_items`
    /// slots per item, i.e. `num_items^2` total).
    pub queue_factor: Option<usize>,

    /// Execution backend for primitive dispatch
    pub target: Target,
}

/// The algorithm-state side of a computation
///
/// A problem owns one data slice per device plus the immutable input
/// description. The enactor borrows it mutably between `init` and
/// `release`; data slices are mutated only by the worker thread of the
/// matching device.
pub trait Problem {
    /// Per-device algorithm state
    type Slice: Send;

    /// Number of work items (frontier seeds) in the problem
    fn num_items(&self) -> usize;

    /// Number of participating devices
    fn num_devices(&self) -> usize;

    /// The per-device data slices, indexed by device
    fn slices_mut(&mut self) -> &mut [Self::Slice];
}

/// One device's per-iteration unit of work
///
/// Implementations define one `core` step, one incoming-data merge step,
/// and one stop predicate; the enactor supplies the loop around them.
pub trait IterationLoop<P: Problem>: Send {
    /// Construct the loop instance for one device
    fn new(device: usize) -> Self
    where
        Self: Sized;

    /// Run one iteration of device work over the current frontier
    ///
    /// # Errors
    ///
    /// Any primitive failure aborts the iteration; the run is fatal and
    /// not retried.
    fn core(&mut self, data: &mut P::Slice, cx: &mut EnactorSlice) -> Result<()>;

    /// Fold one received halo batch into local state
    ///
    /// `cx` is the context paired with the sending peer; items kept by the
    /// merge land in its frontier and are folded into the local queue
    /// afterwards.
    ///
    /// # Errors
    ///
    /// A failed merge aborts the run like any `core` failure.
    fn expand_incoming(
        &mut self,
        data: &mut P::Slice,
        cx: &mut EnactorSlice,
        batch: &IncomingBatch,
    ) -> Result<()>;

    /// Whether this device is done iterating
    fn stop_condition(&self, cx: &EnactorSlice) -> bool;

    /// Stage data to send to `peer` after an iteration
    ///
    /// `None` means nothing to exchange this round (the default).
    fn gather(&mut self, _data: &mut P::Slice, _peer: usize) -> Option<IncomingBatch> {
        None
    }
}

/// One staged halo payload, moved between device threads over a channel
#[derive(Debug, Clone)]
pub struct IncomingBatch {
    /// Sending device
    pub from_device: usize,

    /// Work-item indices
    pub vertices: Vec<u32>,

    /// Per-item value payload, same length as `vertices`
    pub values: Vec<f32>,
}

impl IncomingBatch {
    /// A batch carrying no items
    #[must_use]
    pub const fn empty(from_device: usize) -> Self {
        Self {
            from_device,
            vertices: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Number of items in the batch
    #[must_use]
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    /// Whether the batch carries no items
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }
}

/// Merge a received batch through a combine predicate
///
/// For each incoming position the predicate receives the would-be local
/// slot (`frontier.len()` at that moment), the position within the batch,
/// and the item's vertex and value payloads. Returning `true` keeps the
/// item: its vertex is pushed into `frontier` for propagation; `false`
/// drops it.
///
/// # Errors
///
/// Returns `EngineError::Primitive` if the batch's payload arrays
/// disagree in length, or `EngineError::Allocation` if a kept item
/// overflows the frontier.
pub fn expand_incoming_with<F>(
    frontier: &mut Frontier,
    batch: &IncomingBatch,
    mut keep: F,
) -> Result<()>
where
    F: FnMut(usize, usize, u32, f32) -> bool,
{
    if batch.vertices.len() != batch.values.len() {
        return Err(EngineError::Primitive(format!(
            "halo batch payload mismatch: {} vertices, {} values",
            batch.vertices.len(),
            batch.values.len()
        ))
        .into());
    }
    for (position, (&vertex, &value)) in batch
        .vertices
        .iter()
        .zip(batch.values.iter())
        .enumerate()
    {
        if keep(frontier.len(), position, vertex, value) {
            frontier.push(vertex)?;
        }
    }
    Ok(())
}

/// Lifecycle controller: one iteration loop and one worker thread per device
///
/// Borrows the problem for `'p`; the caller keeps ownership and must keep
/// it alive from `init` through `release` (the borrow checker enforces
/// this).
///
/// # Example
///
/// ```
/// use frontera::{Enactor, EnactorConfig, KnnIteration, KnnProblem, Target};
///
/// # fn example() -> frontera::Result<()> {
/// let mut problem = KnnProblem::new(&[0.0, 1.0, 3.0, 10.0], 1, 2, 1)?;
/// let mut enactor = Enactor::<_, KnnIteration>::init(&mut problem, EnactorConfig::default())?;
/// enactor.reset(4, Target::Parallel)?;
/// enactor.enact()?;
/// enactor.release()?;
/// assert_eq!(&problem.knns()[0..2], &[1, 2]);
/// # Ok(())
/// # }
/// ```
pub struct Enactor<'p, P: Problem, L: IterationLoop<P>> {
    problem: &'p mut P,
    loops: Vec<L>,
    /// Device-major: slices `[d * num_devices .. (d + 1) * num_devices)`
    /// belong to device `d`; the one whose `peer == d` is its local context
    slices: Vec<EnactorSlice>,
    threads: Vec<ThreadSlice>,
    num_devices: usize,
}

impl<'p, P: Problem, L: IterationLoop<P>> Enactor<'p, P, L> {
    /// Allocate per-device state and construct one iteration loop per device
    ///
    /// Frontiers are sized from the problem's item count and the config's
    /// queue factor. The first allocation failure aborts the remaining
    /// initialization.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Configuration` for a zero-device problem or a
    /// device-count/slice-count mismatch, `EngineError::Allocation` if a
    /// frontier cannot be allocated.
    pub fn init(problem: &'p mut P, config: EnactorConfig) -> Result<Self> {
        let num_devices = problem.num_devices();
        if num_devices == 0 {
            return Err(
                EngineError::Configuration("problem declares zero devices".into()).into(),
            );
        }
        if problem.slices_mut().len() != num_devices {
            return Err(EngineError::Configuration(format!(
                "problem declares {num_devices} devices but owns {} data slices",
                problem.slices_mut().len()
            ))
            .into());
        }

        let num_items = problem.num_items();
        let factor = config.queue_factor.unwrap_or(num_items);
        let capacity = num_items.saturating_mul(factor).max(num_items);

        let mut slices = Vec::new();
        slices
            .try_reserve_exact(num_devices * num_devices)
            .map_err(|e| EngineError::Allocation(format!("enactor slices: {e}")))?;
        for _device in 0..num_devices {
            for peer in 0..num_devices {
                slices.push(EnactorSlice::new(capacity, config.target, peer)?);
            }
        }

        let mut loops = Vec::new();
        loops
            .try_reserve_exact(num_devices)
            .map_err(|e| EngineError::Allocation(format!("iteration loops: {e}")))?;
        for device in 0..num_devices {
            loops.push(L::new(device));
        }

        let threads = (0..num_devices).map(ThreadSlice::new).collect();

        Ok(Self {
            problem,
            loops,
            slices,
            threads,
            num_devices,
        })
    }

    /// Reseed every device's local frontier with `[0, n)` and reset
    /// iteration counters
    ///
    /// Must follow `init`; may be called again to re-run with the same
    /// allocation.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Configuration` if `n` exceeds the problem's
    /// item count, `EngineError::Allocation` if `n` exceeds the frontier
    /// capacity.
    pub fn reset(&mut self, n: usize, target: Target) -> Result<()> {
        if n > self.problem.num_items() {
            return Err(EngineError::Configuration(format!(
                "seed of {n} items exceeds problem size {}",
                self.problem.num_items()
            ))
            .into());
        }
        for device in 0..self.num_devices {
            let group =
                &mut self.slices[device * self.num_devices..(device + 1) * self.num_devices];
            for slice in group.iter_mut() {
                // Peer contexts stage incoming items; only the local one is
                // seeded with work.
                let seed = if slice.peer == device { n } else { 0 };
                slice.reset(seed, target)?;
            }
            self.threads[device].init_size = n;
        }
        Ok(())
    }

    /// Run every device's iteration loop to completion
    ///
    /// Spawns one worker thread per device, joins them all (barrier), and
    /// returns the first error across devices in device order, or `Ok`
    /// when every device stopped cleanly.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Configuration` if `reset` has not been called
    /// since the last run; otherwise propagates the first device failure.
    pub fn enact(&mut self) -> Result<()> {
        let num_devices = self.num_devices;

        let mut senders = Vec::with_capacity(num_devices);
        let mut receivers = Vec::with_capacity(num_devices);
        for _ in 0..num_devices {
            let (tx, rx) = mpsc::channel::<IncomingBatch>();
            senders.push(tx);
            receivers.push(rx);
        }

        let results: Vec<Result<()>> = thread::scope(|scope| {
            let mut handles = Vec::with_capacity(num_devices);
            let data_slices = self.problem.slices_mut().iter_mut();
            let slice_groups = self.slices.chunks_mut(num_devices);
            let loops = self.loops.iter_mut();
            let threads = self.threads.iter();

            for ((((lp, data), group), thread), rx) in loops
                .zip(data_slices)
                .zip(slice_groups)
                .zip(threads)
                .zip(receivers)
            {
                let device = thread.device;
                let init_size = thread.init_size;
                let peer_senders: Vec<(usize, mpsc::Sender<IncomingBatch>)> = senders
                    .iter()
                    .enumerate()
                    .filter(|&(peer, _)| peer != device)
                    .map(|(peer, tx)| (peer, tx.clone()))
                    .collect();

                handles.push(scope.spawn(move || {
                    run_device::<P, L>(lp, data, group, device, init_size, &rx, &peer_senders)
                }));
            }
            // Only the worker clones may keep the channels open
            drop(senders);

            handles
                .into_iter()
                .map(|handle| match handle.join() {
                    Ok(result) => result,
                    Err(_) => {
                        Err(EngineError::Primitive("device worker panicked".into()).into())
                    }
                })
                .collect()
        });

        for result in results {
            result?;
        }
        Ok(())
    }

    /// Drop per-device state and end the problem borrow
    ///
    /// Consumes the enactor; re-use without a fresh `init` is impossible
    /// by construction.
    ///
    /// # Errors
    ///
    /// Infallible today; the `Result` mirrors the rest of the lifecycle.
    pub fn release(mut self) -> Result<()> {
        for slice in &mut self.slices {
            slice.status = DeviceStatus::Released;
        }
        self.loops.clear();
        self.slices.clear();
        Ok(())
    }

    /// Number of participating devices
    #[must_use]
    pub const fn num_devices(&self) -> usize {
        self.num_devices
    }

    /// Inspect one (device x peer) execution context
    #[must_use]
    pub fn slice(&self, device: usize, peer: usize) -> Option<&EnactorSlice> {
        if device >= self.num_devices || peer >= self.num_devices {
            return None;
        }
        self.slices.get(device * self.num_devices + peer)
    }
}

/// Per-device worker: loop `core` / exchange / `stop_condition`
fn run_device<P, L>(
    lp: &mut L,
    data: &mut P::Slice,
    group: &mut [EnactorSlice],
    device: usize,
    init_size: usize,
    rx: &mpsc::Receiver<IncomingBatch>,
    peer_senders: &[(usize, mpsc::Sender<IncomingBatch>)],
) -> Result<()>
where
    P: Problem,
    L: IterationLoop<P>,
{
    let local_idx = group
        .iter()
        .position(|slice| slice.peer == device)
        .ok_or_else(|| EngineError::Configuration(format!("device {device} has no local context")))?;

    {
        let local = &mut group[local_idx];
        if local.status != DeviceStatus::Seeded || local.frontier.len() != init_size {
            return Err(EngineError::Configuration(
                "enact requires a reset since the last run".into(),
            )
            .into());
        }
        local.status = DeviceStatus::Running;
    }

    loop {
        if let Err(e) = run_iteration::<P, L>(lp, data, group, local_idx, device, rx, peer_senders)
        {
            group[local_idx].status = DeviceStatus::Failed;
            return Err(e);
        }
        if lp.stop_condition(&group[local_idx]) {
            break;
        }
    }

    group[local_idx].status = DeviceStatus::Stopped;
    Ok(())
}

/// One iteration: `core`, then (multi-device) stage/receive/merge
fn run_iteration<P, L>(
    lp: &mut L,
    data: &mut P::Slice,
    group: &mut [EnactorSlice],
    local_idx: usize,
    device: usize,
    rx: &mpsc::Receiver<IncomingBatch>,
    peer_senders: &[(usize, mpsc::Sender<IncomingBatch>)],
) -> Result<()>
where
    P: Problem,
    L: IterationLoop<P>,
{
    lp.core(data, &mut group[local_idx])?;
    group[local_idx].iteration += 1;

    if peer_senders.is_empty() {
        return Ok(());
    }

    // Stage one batch per peer; an empty batch keeps the exchange in
    // lockstep when there is nothing to send.
    for &(peer, ref tx) in peer_senders {
        let mut batch = lp
            .gather(data, peer)
            .unwrap_or_else(|| IncomingBatch::empty(device));
        batch.from_device = device;
        tx.send(batch).map_err(|_| {
            EngineError::Primitive(format!("peer {peer} hung up before halo exchange"))
        })?;
    }

    // Receive exactly one batch from every peer; a terminated peer closes
    // its channel and fails the run here instead of stalling it.
    for _ in 0..peer_senders.len() {
        let batch = rx.recv().map_err(|_| {
            EngineError::Primitive("peer device terminated during halo exchange".into())
        })?;
        if batch.is_empty() {
            continue;
        }
        let idx = group
            .iter()
            .position(|slice| slice.peer == batch.from_device)
            .ok_or_else(|| {
                EngineError::Primitive(format!("halo batch from unknown peer {}", batch.from_device))
            })?;
        lp.expand_incoming(data, &mut group[idx], &batch)?;
    }

    fold_peer_frontiers(group, local_idx)
}

/// Move items staged in peer contexts into the local frontier
fn fold_peer_frontiers(group: &mut [EnactorSlice], local_idx: usize) -> Result<()> {
    let mut staged = Vec::new();
    for (i, slice) in group.iter_mut().enumerate() {
        if i == local_idx || slice.frontier.is_empty() {
            continue;
        }
        staged.extend_from_slice(slice.frontier.active());
        slice.frontier.advance();
    }
    let local = &mut group[local_idx];
    for item in staged {
        local.frontier.push(item)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Toy problem: each device repeatedly decrements its frontier items,
    /// dropping zeros, and accumulates everything it sees.
    struct CountdownProblem {
        slices: Vec<CountdownData>,
        n: usize,
    }

    #[derive(Default)]
    struct CountdownData {
        sum: u64,
        received: Vec<u32>,
    }

    impl Problem for CountdownProblem {
        type Slice = CountdownData;

        fn num_items(&self) -> usize {
            self.n
        }

        fn num_devices(&self) -> usize {
            self.slices.len()
        }

        fn slices_mut(&mut self) -> &mut [CountdownData] {
            &mut self.slices
        }
    }

    struct CountdownLoop;

    impl IterationLoop<CountdownProblem> for CountdownLoop {
        fn new(_device: usize) -> Self {
            Self
        }

        fn core(&mut self, data: &mut CountdownData, cx: &mut EnactorSlice) -> Result<()> {
            let survivors: Vec<u32> = cx
                .frontier
                .active()
                .iter()
                .inspect(|&&item| data.sum += u64::from(item))
                .filter(|&&item| item > 0)
                .map(|&item| item - 1)
                .collect();
            cx.queued += cx.frontier.len();
            cx.frontier.next_mut().extend_from_slice(&survivors);
            cx.frontier.advance();
            Ok(())
        }

        fn expand_incoming(
            &mut self,
            data: &mut CountdownData,
            cx: &mut EnactorSlice,
            batch: &IncomingBatch,
        ) -> Result<()> {
            let received = &mut data.received;
            expand_incoming_with(&mut cx.frontier, batch, |_key, _position, vertex, value| {
                received.push(vertex);
                // Keep only items the peer marked as worth propagating
                value > 0.0
            })
        }

        fn stop_condition(&self, cx: &EnactorSlice) -> bool {
            cx.frontier.is_empty() || cx.iteration >= 64
        }
    }

    #[test]
    fn test_single_device_runs_to_empty_frontier() {
        let mut problem = CountdownProblem {
            slices: vec![CountdownData::default()],
            n: 4,
        };
        let mut enactor = Enactor::<_, CountdownLoop>::init(
            &mut problem,
            EnactorConfig {
                queue_factor: Some(2),
                target: Target::Serial,
            },
        )
        .unwrap();
        enactor.reset(4, Target::Serial).unwrap();
        enactor.enact().unwrap();

        let local = enactor.slice(0, 0).unwrap();
        assert_eq!(local.status, DeviceStatus::Stopped);
        // Seed [0,1,2,3]: iterations see 6 + 3 + 1 + 0 = 10
        assert_eq!(local.iteration, 4);
        assert_eq!(local.queued, 4 + 3 + 2 + 1);

        enactor.release().unwrap();
        assert_eq!(problem.slices[0].sum, 10);
    }

    #[test]
    fn test_reset_reruns_identically() {
        let mut problem = CountdownProblem {
            slices: vec![CountdownData::default()],
            n: 3,
        };
        let mut enactor =
            Enactor::<_, CountdownLoop>::init(&mut problem, EnactorConfig::default()).unwrap();

        enactor.reset(3, Target::Serial).unwrap();
        enactor.enact().unwrap();
        enactor.reset(3, Target::Serial).unwrap();
        enactor.enact().unwrap();
        enactor.release().unwrap();

        // Each run sums 3 + 1 + 0 over its iterations; two runs double it
        assert_eq!(problem.slices[0].sum, 8);
    }

    #[test]
    fn test_enact_without_reset_rejected() {
        let mut problem = CountdownProblem {
            slices: vec![CountdownData::default()],
            n: 2,
        };
        let mut enactor =
            Enactor::<_, CountdownLoop>::init(&mut problem, EnactorConfig::default()).unwrap();
        let err = enactor.enact().unwrap_err();
        assert!(err.to_string().contains("reset"));
    }

    #[test]
    fn test_reset_seed_exceeding_problem_rejected() {
        let mut problem = CountdownProblem {
            slices: vec![CountdownData::default()],
            n: 2,
        };
        let mut enactor =
            Enactor::<_, CountdownLoop>::init(&mut problem, EnactorConfig::default()).unwrap();
        assert!(enactor.reset(3, Target::Serial).is_err());
    }

    /// Loop that stages one halo item per iteration so the exchange path
    /// gets exercised across two devices.
    struct ChattyLoop {
        device: usize,
    }

    impl IterationLoop<CountdownProblem> for ChattyLoop {
        fn new(device: usize) -> Self {
            Self { device }
        }

        fn core(&mut self, _data: &mut CountdownData, cx: &mut EnactorSlice) -> Result<()> {
            cx.frontier.advance();
            Ok(())
        }

        fn expand_incoming(
            &mut self,
            data: &mut CountdownData,
            cx: &mut EnactorSlice,
            batch: &IncomingBatch,
        ) -> Result<()> {
            let received = &mut data.received;
            expand_incoming_with(&mut cx.frontier, batch, |_key, _position, vertex, value| {
                received.push(vertex);
                value > 0.5
            })
        }

        fn stop_condition(&self, cx: &EnactorSlice) -> bool {
            cx.iteration >= 2
        }

        fn gather(&mut self, _data: &mut CountdownData, peer: usize) -> Option<IncomingBatch> {
            // Vertex encodes (sender, recipient); value marks whether the
            // item should survive the merge predicate.
            let vertex = u32::try_from(self.device * 100 + peer).ok()?;
            let value = if self.device == 0 { 1.0 } else { 0.0 };
            Some(IncomingBatch {
                from_device: self.device,
                vertices: vec![vertex],
                values: vec![value],
            })
        }
    }

    #[test]
    fn test_two_device_halo_exchange() {
        let mut problem = CountdownProblem {
            slices: vec![CountdownData::default(), CountdownData::default()],
            n: 2,
        };
        let mut enactor = Enactor::<_, ChattyLoop>::init(
            &mut problem,
            EnactorConfig {
                queue_factor: Some(4),
                target: Target::Serial,
            },
        )
        .unwrap();
        enactor.reset(2, Target::Serial).unwrap();
        enactor.enact().unwrap();

        for device in 0..2 {
            assert_eq!(
                enactor.slice(device, device).unwrap().status,
                DeviceStatus::Stopped
            );
        }
        enactor.release().unwrap();

        // Device 1 saw device 0's item both iterations, and vice versa
        assert_eq!(problem.slices[1].received, vec![1, 1]);
        assert_eq!(problem.slices[0].received, vec![100, 100]);
    }

    #[test]
    fn test_expand_incoming_with_predicate() {
        let mut frontier = Frontier::with_capacity(8).unwrap();
        let batch = IncomingBatch {
            from_device: 1,
            vertices: vec![10, 20, 30, 40],
            values: vec![1.0, 0.0, 1.0, 0.0],
        };
        let mut positions = Vec::new();
        expand_incoming_with(&mut frontier, &batch, |key, position, _vertex, value| {
            positions.push((key, position));
            value > 0.5
        })
        .unwrap();

        assert_eq!(frontier.active(), &[10, 30]);
        // Local slot advances only when an item is kept
        assert_eq!(positions, vec![(0, 0), (1, 1), (1, 2), (2, 3)]);
    }

    #[test]
    fn test_expand_incoming_with_mismatched_payload() {
        let mut frontier = Frontier::with_capacity(4).unwrap();
        let batch = IncomingBatch {
            from_device: 0,
            vertices: vec![1, 2],
            values: vec![0.0],
        };
        assert!(expand_incoming_with(&mut frontier, &batch, |_, _, _, _| true).is_err());
    }

    #[test]
    fn test_zero_devices_rejected() {
        let mut problem = CountdownProblem {
            slices: Vec::new(),
            n: 4,
        };
        let result = Enactor::<_, CountdownLoop>::init(&mut problem, EnactorConfig::default());
        assert!(result.is_err());
    }
}
