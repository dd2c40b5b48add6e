//! Static DAG, parallel execution atop `rayon`. Join counters and the
//! status field are atomic; notification spawns each ready successor into
//! the enclosing `rayon::Scope` instead of recursing inline.

use super::StaticTask;
use crate::loom::{AtomicIsize, Arc};
use crate::status::{AtomicStatus, NodeStatus};
use crate::Key;
use std::sync::atomic::Ordering;
use std::sync::RwLock;

/// A node in a caller-built DAG executed across `rayon` worker threads.
pub struct Node<T: StaticTask> {
    key: Key,
    status: AtomicStatus,
    join_counter: AtomicIsize,
    predecessors: RwLock<Vec<Arc<Node<T>>>>,
    successors: RwLock<Vec<Arc<Node<T>>>>,
    value: RwLock<Option<T::Value>>,
    task: T,
}

impl<T: StaticTask> Node<T> {
    /// Creates a node. Edges are wired afterwards with [`add_dep`](Self::add_dep).
    pub fn new(key: Key, task: T) -> Arc<Self> {
        Arc::new(Node {
            key,
            status: AtomicStatus::new(NodeStatus::Expanded),
            join_counter: AtomicIsize::new(0),
            predecessors: RwLock::new(Vec::new()),
            successors: RwLock::new(Vec::new()),
            value: RwLock::new(None),
            task,
        })
    }

    /// This node's key.
    pub fn key(&self) -> Key {
        self.key
    }

    /// This node's current lifecycle state.
    pub fn get_status(&self) -> NodeStatus {
        self.status.load(Ordering::Acquire)
    }

    /// This node's computed value; see [`static_serial::Node::value`](super::static_serial::Node::value)
    /// for the happens-before argument that makes this safe to call from a
    /// successor's `compute`.
    pub fn value(&self) -> T::Value {
        self.value
            .read()
            .unwrap()
            .clone()
            .expect("value read before this node's compute ran")
    }

    /// Wires `pred -> self`. Must complete (on any thread, sequentially
    /// before execution starts) before [`source_compute`](Self::source_compute)
    /// is called anywhere in the DAG; edge wiring itself is not part of the
    /// lock-free protocol.
    pub fn add_dep(self: &Arc<Self>, pred: &Arc<Node<T>>) {
        self.predecessors.write().unwrap().push(Arc::clone(pred));
        pred.successors.write().unwrap().push(Arc::clone(self));
        self.join_counter.fetch_add(1, Ordering::AcqRel);
    }

    /// Starts execution from a source (a node with no predecessors).
    pub fn source_compute(self: &Arc<Self>)
    where
        T: 'static,
    {
        debug_assert!(
            self.predecessors.read().unwrap().is_empty(),
            "source_compute called on a node that has predecessors"
        );
        rayon::scope(|scope| {
            self.compute_and_notify(scope);
        });
    }

    fn compute_and_notify<'scope>(self: &Arc<Self>, scope: &rayon::Scope<'scope>)
    where
        T: 'scope,
    {
        let preds: Vec<T::Value> = self
            .predecessors
            .read()
            .unwrap()
            .iter()
            .map(|p| p.value())
            .collect();
        let value = self.task.compute(self.key, &preds);
        *self.value.write().unwrap() = Some(value);
        self.status.transition_or_die(NodeStatus::Expanded, NodeStatus::Computed);

        for succ in self.successors.read().unwrap().iter() {
            if succ.join_counter.fetch_sub(1, Ordering::AcqRel) - 1 == 0 {
                let succ = Arc::clone(succ);
                scope.spawn(move |scope| succ.compute_and_notify(scope));
            }
        }

        self.status.transition_or_die(NodeStatus::Computed, NodeStatus::Completed);
    }
}
