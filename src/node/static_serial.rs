//! Static DAG, single-threaded execution. No atomics: the whole traversal
//! runs on one call stack, so join counters and the status field are plain
//! `Cell`s and notification is a direct recursive call.

use super::StaticTask;
use crate::status::NodeStatus;
use crate::Key;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// A node in a caller-built, single-threaded DAG.
pub struct Node<T: StaticTask> {
    key: Key,
    status: Cell<NodeStatus>,
    join_counter: Cell<i64>,
    predecessors: RefCell<Vec<Rc<Node<T>>>>,
    successors: RefCell<Vec<Rc<Node<T>>>>,
    value: RefCell<Option<T::Value>>,
    task: T,
}

impl<T: StaticTask> Node<T> {
    /// Creates a node. Edges are wired afterwards with [`add_dep`](Self::add_dep);
    /// construction counts as this flavor's "expansion" since the whole DAG
    /// is known up front (there is no separate discovery phase to race on).
    pub fn new(key: Key, task: T) -> Rc<Self> {
        Rc::new(Node {
            key,
            status: Cell::new(NodeStatus::Expanded),
            join_counter: Cell::new(0),
            predecessors: RefCell::new(Vec::new()),
            successors: RefCell::new(Vec::new()),
            value: RefCell::new(None),
            task,
        })
    }

    /// This node's key.
    pub fn key(&self) -> Key {
        self.key
    }

    /// This node's current lifecycle state.
    pub fn get_status(&self) -> NodeStatus {
        self.status.get()
    }

    /// This node's computed value. Panics if called before `compute` ran;
    /// callers only reach for this from within a successor's `compute`,
    /// where the predecessor relationship already guarantees ordering.
    pub fn value(&self) -> T::Value {
        self.value
            .borrow()
            .clone()
            .expect("value read before this node's compute ran")
    }

    /// Wires `pred -> self`: adds `pred` as a predecessor of `self`, and
    /// symmetrically registers `self` as one of `pred`'s successors. Must be
    /// called before [`source_compute`](Self::source_compute) runs anywhere
    /// in the DAG.
    pub fn add_dep(self: &Rc<Self>, pred: &Rc<Node<T>>) {
        self.predecessors.borrow_mut().push(Rc::clone(pred));
        pred.successors.borrow_mut().push(Rc::clone(self));
        self.join_counter.set(self.join_counter.get() + 1);
    }

    /// Starts execution from a source (a node with no predecessors).
    pub fn source_compute(self: &Rc<Self>) {
        debug_assert!(
            self.predecessors.borrow().is_empty(),
            "source_compute called on a node that has predecessors"
        );
        self.compute_and_notify();
    }

    fn compute_and_notify(self: &Rc<Self>) {
        let preds: Vec<T::Value> = self.predecessors.borrow().iter().map(|p| p.value()).collect();
        let value = self.task.compute(self.key, &preds);
        *self.value.borrow_mut() = Some(value);

        let prev = self.status.replace(NodeStatus::Computed);
        debug_assert_eq!(prev, NodeStatus::Expanded);

        for succ in self.successors.borrow().iter() {
            let remaining = succ.join_counter.get() - 1;
            succ.join_counter.set(remaining);
            if remaining == 0 {
                succ.compute_and_notify();
            }
        }

        let prev = self.status.replace(NodeStatus::Completed);
        debug_assert_eq!(prev, NodeStatus::Computed);
    }
}
