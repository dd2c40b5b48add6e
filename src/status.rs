//! Node lifecycle states and linked-list operation codes.

use crate::loom::AtomicUsize;
use std::sync::atomic::Ordering;

/// A node's position in the `Unvisited -> Visited -> Expanded -> Computed ->
/// Completed` lifecycle. Discriminants are ordered so comparisons between
/// raw codes (`>=`, `<`) are meaningful without decoding back to the enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(usize)]
pub enum NodeStatus {
    /// Allocated but no worker has claimed it.
    Unvisited = 0,
    /// Claimed by a worker for expansion; predecessors not yet enumerated.
    Visited = 1,
    /// Predecessors enumerated; join counter reflects unfinished predecessors.
    Expanded = 2,
    /// `compute` has returned; about to notify successors.
    Computed = 3,
    /// All known successors notified; no new successor can register.
    Completed = 4,
    /// Reserved sentinel for a future deletion protocol. Never constructed.
    Dead = 5,
}

impl NodeStatus {
    fn from_usize(v: usize) -> NodeStatus {
        match v {
            0 => NodeStatus::Unvisited,
            1 => NodeStatus::Visited,
            2 => NodeStatus::Expanded,
            3 => NodeStatus::Computed,
            4 => NodeStatus::Completed,
            5 => NodeStatus::Dead,
            _ => unreachable!("invalid node status code {v}"),
        }
    }
}

/// An atomic `NodeStatus` cell with CAS-only transition helpers.
///
/// Every transition method enforces invariant 1 of the data model: advancing
/// from exactly the expected predecessor state, or reporting the loser's
/// view of the state that already won. There is no way to move status
/// backwards through this type.
#[derive(Debug)]
pub struct AtomicStatus(AtomicUsize);

impl AtomicStatus {
    /// Creates a cell in `initial` state.
    pub fn new(initial: NodeStatus) -> Self {
        AtomicStatus(AtomicUsize::new(initial as usize))
    }

    /// Reads the current state.
    pub fn load(&self, order: Ordering) -> NodeStatus {
        NodeStatus::from_usize(self.0.load(order))
    }

    /// Attempts the single CAS transition `from -> to`. Returns `true` iff
    /// this call performed the transition.
    pub fn try_transition(&self, from: NodeStatus, to: NodeStatus) -> bool {
        debug_assert!(to > from, "status transitions must move forward");
        self.0
            .compare_exchange(from as usize, to as usize, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Like [`try_transition`](Self::try_transition), but a failed CAS is
    /// treated as an invariant violation (illegal concurrent transition)
    /// rather than an expected race, and aborts via `assert!`.
    pub fn transition_or_die(&self, from: NodeStatus, to: NodeStatus) {
        assert!(
            self.try_transition(from, to),
            "illegal status transition attempted: {from:?} -> {to:?}"
        );
    }
}

/// Outcome codes for `ConcurrentLinkedList`/`ConcurrentHashTable` operations,
/// mirroring the source's `LOpStatus` enum so retry/branch logic reads the
/// same way at every call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListOp {
    /// No operation attempted yet.
    Null,
    /// Key was found; see accompanying payload.
    Found,
    /// Key was not present in the structure.
    NotFound,
    /// Retry budget exhausted under contention.
    Failed,
    /// A new entry was inserted.
    Inserted,
    /// Reserved: deletion is not supported, but the code exists for parity
    /// with the source's op-code set.
    Deleted,
    /// An unexpected internal error occurred.
    Error,
}
