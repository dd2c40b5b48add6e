//! Crate-wide error taxonomy.
//!
//! Transient contention (retry-budget exhaustion inside `list`/`array`) is
//! absorbed internally by the scheduler's own retry loops and never reaches
//! this type; `GraphError` is what remains after that absorption: a task
//! hook failing, or a condition that should be structurally impossible.

use crate::Key;
use std::fmt;

/// Result alias used throughout the public API.
pub type GraphResult<T> = Result<T, GraphError>;

/// Errors that can surface from [`crate::scheduler`] or node `compute`/`init`
/// entry points.
#[derive(thiserror::Error, Debug)]
pub enum GraphError {
    /// A user-supplied `Init`, `Compute`, or `Generate` hook returned an
    /// error. The library does not interpret or recover from it; it is
    /// reported verbatim to the caller of `source_compute`/
    /// `init_root_and_compute`.
    #[error("task hook failed: {0}")]
    Task(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A bounded-retry list/array/hash-table operation exhausted its budget.
    /// Reaching this variant (rather than being retried internally) means a
    /// scheduler-internal invariant about bounded contention was violated.
    #[error("operation {op} on key {key} exhausted its retry budget")]
    ContentionExhausted {
        /// Name of the operation that failed, e.g. `"insert_if_absent"`.
        op: &'static str,
        /// Key involved in the failed operation.
        key: Key,
    },

    /// Two racing inserts both believed they owned key creation; this can
    /// only happen if a prior invariant was already broken.
    #[error("duplicate node created for key {0}")]
    DuplicateKey(Key),

    /// A `rayon::Scope` the scheduler spawned into was poisoned by a panic
    /// in a sibling task.
    #[error("task-graph worker scope poisoned by a panicking task")]
    PoisonedScope,
}

/// Wraps an arbitrary hook error into [`GraphError::Task`].
pub fn task_error<E>(err: E) -> GraphError
where
    E: std::error::Error + Send + Sync + 'static,
{
    GraphError::Task(Box::new(err))
}

/// Wraps a hook error whose type only implements `Display`, for hooks that
/// use a plain `String` error channel.
pub fn task_error_msg(msg: impl fmt::Display) -> GraphError {
    GraphError::Task(msg.to_string().into())
}
