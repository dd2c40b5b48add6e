//! C4: the DAG node lifecycle state machine, and the hook traits user code
//! implements to plug a computation into it.
//!
//! Four flavors share the same five-state lifecycle (`status.rs`) but differ
//! in whether a node is discovered ahead of time or on the fly, and whether
//! its counters/transitions are atomic or plain. Rather than one maximally
//! generic node parameterized over both axes, each flavor gets its own
//! module (mirroring how the four shapes arise independently in practice):
//! [`static_serial`], [`static_parallel`], [`dynamic_serial`],
//! [`dynamic_parallel`]. This keeps each flavor's happens-before reasoning
//! legible without a lattice of trait bounds threading through all four at
//! once.

pub mod dynamic_parallel;
pub mod dynamic_serial;
pub mod static_parallel;
pub mod static_serial;

use crate::loom::AtomicBool;
use std::sync::atomic::Ordering;

/// A spinning, single-holder, CAS-based exclusion flag. Guards the race
/// between a late-arriving successor registration and a predecessor's
/// `Computed -> Completed` transition (dynamic-parallel mode only; static
/// mode has no such race because the successor list is fixed before
/// execution starts, and serial mode has no concurrency at all).
pub(crate) struct BlockingLock(AtomicBool);

impl BlockingLock {
    pub(crate) fn new() -> Self {
        BlockingLock(AtomicBool::new(false))
    }

    pub(crate) fn acquire(&self) {
        while self
            .0
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            std::hint::spin_loop();
        }
    }

    pub(crate) fn release(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Hooks for a node whose whole DAG is built by the caller before execution
/// starts. Edges are wired with `add_dep` on the node types themselves; this
/// trait supplies only the per-node computation.
pub trait StaticTask: Send + Sync {
    /// Payload produced by `compute` and consumed by successors.
    type Value: Clone + Send + Sync;

    /// Reads predecessor values (in `add_dep` call order) and produces this
    /// node's own value. Called exactly once, strictly after every
    /// predecessor's `compute` has returned.
    fn compute(&self, key: crate::Key, predecessors: &[Self::Value]) -> Self::Value;
}

/// Hooks for a node discovered on the fly: predecessor keys are declared by
/// `init`, not known in advance.
pub trait DynamicTask: Send + Sync {
    /// Payload produced by `compute` and consumed by successors.
    type Value: Clone + Send + Sync;

    /// Declares this node's predecessor keys via `cx.add_dep`. Called
    /// exactly once, by whichever caller won the race to create this node.
    fn init(&self, cx: &mut InitContext<'_>);

    /// Reads predecessor values and produces this node's own value. Called
    /// exactly once, strictly after every declared predecessor's `compute`
    /// has returned.
    fn compute(&self, cx: &ComputeContext<'_, Self>) -> Self::Value
    where
        Self: Sized;

    /// Optionally declares fresh DAG roots via `cx.generate_task`. Called
    /// exactly once, immediately after `compute`. Default: generates
    /// nothing.
    fn generate(&self, _cx: &mut GenerateContext<'_>) {}
}

/// Passed to [`DynamicTask::init`]; records declared predecessor keys.
pub struct InitContext<'a> {
    pub(crate) deps: &'a mut Vec<crate::Key>,
}

impl InitContext<'_> {
    /// Declares `pred_key` as a predecessor of the node being initialized.
    pub fn add_dep(&mut self, pred_key: crate::Key) {
        self.deps.push(pred_key);
    }
}

/// Passed to [`DynamicTask::compute`]; exposes this node's key and a way to
/// read predecessor values by key.
pub struct ComputeContext<'a, T: DynamicTask + ?Sized> {
    pub(crate) key: crate::Key,
    pub(crate) lookup: &'a dyn Fn(crate::Key) -> T::Value,
}

impl<T: DynamicTask + ?Sized> ComputeContext<'_, T> {
    /// The key of the node currently computing.
    pub fn key(&self) -> crate::Key {
        self.key
    }

    /// Reads the value a predecessor computed. Only valid for keys this
    /// node declared via `add_dep` during `init`; the scheduler guarantees
    /// the predecessor's `compute` has already returned by the time this is
    /// callable.
    pub fn predecessor(&self, pred_key: crate::Key) -> T::Value {
        (self.lookup)(pred_key)
    }
}

/// Passed to [`DynamicTask::generate`]; records freshly spawned root keys.
pub struct GenerateContext<'a> {
    pub(crate) roots: &'a mut Vec<crate::Key>,
}

impl GenerateContext<'_> {
    /// Declares `root_key` as a fresh DAG root to schedule independently.
    pub fn generate_task(&mut self, root_key: crate::Key) {
        self.roots.push(root_key);
    }
}
