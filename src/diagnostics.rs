//! Structured logging and counters at the seams the source instrumented
//! with a compile-time `PRINT_DEBUG_STATEMENTS` guard and an rdtsc-based
//! per-worker timer. Here the guard is the `diagnostics` feature and the
//! instrument is `tracing`; the counters are a small `Metrics` struct of
//! relaxed atomics, sampled rather than timed.

use std::sync::atomic::{AtomicU64, Ordering};

/// Lifetime counters for a single scheduler run. Every method is a relaxed
/// fetch-add: these are observational counters, not synchronization.
#[derive(Debug, Default)]
pub struct Metrics {
    nodes_created: AtomicU64,
    nodes_completed: AtomicU64,
    retries_exhausted: AtomicU64,
    hash_collisions_created: AtomicU64,
}

/// Point-in-time snapshot of [`Metrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Nodes discovered.
    pub nodes_created: u64,
    /// Nodes whose `compute` has returned.
    pub nodes_completed: u64,
    /// List/array/table operations that exhausted their retry budget.
    pub retries_exhausted: u64,
    /// Hash table buckets created.
    pub hash_collisions_created: u64,
}

impl Metrics {
    /// Creates a zeroed counter set.
    pub fn new() -> Self {
        Metrics::default()
    }

    /// Records a freshly discovered node.
    pub fn on_node_created(&self) {
        self.nodes_created.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a node reaching `Computed`.
    pub fn on_node_completed(&self) {
        self.nodes_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a list/array/table operation exhausting its retry budget.
    pub fn on_retry_exhausted(&self) {
        self.retries_exhausted.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a hash table bucket being created.
    pub fn on_hash_bucket_created(&self) {
        self.hash_collisions_created.fetch_add(1, Ordering::Relaxed);
    }

    /// Reads all counters into a plain value, for assertions or periodic
    /// reporting.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            nodes_created: self.nodes_created.load(Ordering::Relaxed),
            nodes_completed: self.nodes_completed.load(Ordering::Relaxed),
            retries_exhausted: self.retries_exhausted.load(Ordering::Relaxed),
            hash_collisions_created: self.hash_collisions_created.load(Ordering::Relaxed),
        }
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "diagnostics")] {
        macro_rules! trace_event {
            ($($arg:tt)*) => { tracing::trace!($($arg)*) };
        }
        macro_rules! warn_event {
            ($($arg:tt)*) => { tracing::warn!($($arg)*) };
        }
    } else {
        macro_rules! trace_event {
            ($($arg:tt)*) => {{}};
        }
        macro_rules! warn_event {
            ($($arg:tt)*) => {{}};
        }
    }
}

pub(crate) use trace_event;
pub(crate) use warn_event;
