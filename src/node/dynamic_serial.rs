//! Dynamic DAG discovery, single-threaded. No race exists between
//! discoverers (there is only one thread), so the blocking-lock protocol of
//! the parallel flavor collapses away entirely: a predecessor is either
//! already `>= Computed` when a successor looks it up, or the successor
//! just registers and waits its turn in the (single-pass) notify loop.
//! Backed by a plain `HashMap`, not [`crate::table::ConcurrentHashTable`]:
//! the latter's whole purpose is absorbing concurrent racy creation, which
//! cannot happen here.

use super::{ComputeContext, DynamicTask, GenerateContext, InitContext};
use crate::status::NodeStatus;
use crate::Key;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

struct Node<T: DynamicTask> {
    key: Key,
    status: Cell<NodeStatus>,
    join_counter: Cell<i64>,
    successors_to_notify: RefCell<Vec<Rc<Node<T>>>>,
    notify_counter: Cell<usize>,
    value: RefCell<Option<T::Value>>,
    task: T,
}

/// Owns the memoizing key→node table for one dynamically-discovered DAG run.
pub struct Graph<T: DynamicTask, F: Fn(Key) -> T> {
    table: RefCell<HashMap<Key, Rc<Node<T>>>>,
    factory: F,
}

impl<T: DynamicTask, F: Fn(Key) -> T> Graph<T, F> {
    /// Builds an empty graph; `factory` constructs a fresh task the first
    /// time each key is discovered.
    pub fn new(factory: F) -> Self {
        Graph {
            table: RefCell::new(HashMap::new()),
            factory,
        }
    }

    /// Drives `root_key` (and everything it transitively discovers) to
    /// `Completed`, and returns its value.
    pub fn run(&self, root_key: Key) -> T::Value {
        self.init_root_and_compute(root_key);
        self.node_value(root_key)
    }

    /// Number of distinct keys discovered so far.
    pub fn node_count(&self) -> usize {
        self.table.borrow().len()
    }

    /// This key's current lifecycle state, if it has been discovered yet.
    pub fn status_of(&self, key: Key) -> Option<NodeStatus> {
        self.table.borrow().get(&key).map(|n| n.status.get())
    }

    fn node_value(&self, key: Key) -> T::Value {
        self.table
            .borrow()
            .get(&key)
            .expect("node_value called for an unknown key")
            .value
            .borrow()
            .clone()
            .expect("node_value called before compute ran")
    }

    fn get_task(&self, key: Key) -> Option<Rc<Node<T>>> {
        self.table
            .borrow()
            .get(&key)
            .filter(|n| n.status.get() >= NodeStatus::Visited)
            .cloned()
    }

    /// Creates the node for `key` if absent. Returns `(node, true)` iff this
    /// call is the one that won the `Unvisited -> Visited` race (trivially
    /// true for every first-time creation, since there is only one thread).
    fn insert_task_if_absent(&self, key: Key) -> (Rc<Node<T>>, bool) {
        if let Some(existing) = self.table.borrow().get(&key) {
            return (Rc::clone(existing), false);
        }
        let node = Rc::new(Node {
            key,
            status: Cell::new(NodeStatus::Unvisited),
            join_counter: Cell::new(1),
            successors_to_notify: RefCell::new(Vec::new()),
            notify_counter: Cell::new(0),
            value: RefCell::new(None),
            task: (self.factory)(key),
        });
        self.table.borrow_mut().insert(key, Rc::clone(&node));
        let prev = node.status.replace(NodeStatus::Visited);
        debug_assert_eq!(prev, NodeStatus::Unvisited);
        (node, true)
    }

    fn try_init_and_compute(&self, successor: &Rc<Node<T>>, pred_key: Key) {
        let pred = match self.get_task(pred_key) {
            Some(p) => p,
            None => {
                let (p, won) = self.insert_task_if_absent(pred_key);
                debug_assert!(won, "single-threaded creation always wins");
                self.init_node_and_compute(&p);
                p
            }
        };

        if pred.status.get() < NodeStatus::Computed {
            pred.successors_to_notify.borrow_mut().push(Rc::clone(successor));
        } else {
            self.decrement_and_maybe_compute(successor);
        }
    }

    fn decrement_and_maybe_compute(&self, node: &Rc<Node<T>>) {
        let remaining = node.join_counter.get() - 1;
        node.join_counter.set(remaining);
        if remaining == 0 {
            self.compute_and_notify(node);
        }
    }

    fn init_node_and_compute(&self, node: &Rc<Node<T>>) {
        let mut deps = Vec::new();
        {
            let mut cx = InitContext { deps: &mut deps };
            node.task.init(&mut cx);
        }
        for _ in &deps {
            node.join_counter.set(node.join_counter.get() + 1);
        }
        let prev = node.status.replace(NodeStatus::Expanded);
        debug_assert_eq!(prev, NodeStatus::Visited);

        for pred_key in deps {
            self.try_init_and_compute(node, pred_key);
        }
        self.decrement_and_maybe_compute(node);
    }

    fn compute_and_notify(&self, node: &Rc<Node<T>>) {
        let value = {
            let lookup = |k: Key| self.node_value(k);
            let cx = ComputeContext {
                key: node.key,
                lookup: &lookup,
            };
            node.task.compute(&cx)
        };
        *node.value.borrow_mut() = Some(value);
        let prev = node.status.replace(NodeStatus::Computed);
        debug_assert_eq!(prev, NodeStatus::Expanded);

        let mut roots = Vec::new();
        {
            let mut cx = GenerateContext { roots: &mut roots };
            node.task.generate(&mut cx);
        }
        for root_key in roots {
            self.init_root_and_compute(root_key);
        }

        let end = node.successors_to_notify.borrow().len();
        for i in node.notify_counter.get()..end {
            let succ = Rc::clone(&node.successors_to_notify.borrow()[i]);
            self.decrement_and_maybe_compute(&succ);
        }
        node.notify_counter.set(end);

        let prev = node.status.replace(NodeStatus::Completed);
        debug_assert_eq!(prev, NodeStatus::Computed);
    }

    /// Creates and runs a fresh DAG root. Unlike [`try_init_and_compute`](Self::try_init_and_compute),
    /// the caller does not register as a successor (a root has none, by
    /// definition, among the keys discovering it). Returns `true` iff this
    /// call created the node.
    fn init_root_and_compute(&self, root_key: Key) -> bool {
        match self.get_task(root_key) {
            Some(_) => false,
            None => {
                let (node, won) = self.insert_task_if_absent(root_key);
                if won {
                    self.init_node_and_compute(&node);
                }
                won
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Counts paths from `key` down to a fixed maximum key over edges
    /// `k -> k+1` and `k -> k+7`, clamped at the max. The factory threads
    /// each node's own key and the shared `max_key` in at construction.
    struct KeyedPathCount {
        key: Key,
        max_key: Key,
    }

    impl DynamicTask for KeyedPathCount {
        type Value = i64;

        fn init(&self, cx: &mut InitContext<'_>) {
            if self.key < self.max_key {
                cx.add_dep(self.key + 1);
                if self.key + 7 <= self.max_key {
                    cx.add_dep(self.key + 7);
                }
            }
        }

        fn compute(&self, cx: &ComputeContext<'_, Self>) -> i64 {
            if self.key == self.max_key {
                return 1;
            }
            let mut total = cx.predecessor(self.key + 1);
            if self.key + 7 <= self.max_key {
                total += cx.predecessor(self.key + 7);
            }
            total
        }
    }

    fn serial_path_count(start: Key, max_key: Key) -> i64 {
        let mut memo = vec![0i64; (max_key + 1) as usize];
        memo[max_key as usize] = 1;
        let mut k = max_key - 1;
        loop {
            let mut total = memo[(k + 1) as usize];
            if k + 7 <= max_key {
                total += memo[(k + 7) as usize];
            }
            memo[k as usize] = total;
            if k == 0 {
                break;
            }
            k -= 1;
        }
        memo[start as usize]
    }

    #[test]
    fn dynamic_memoization_matches_serial_baseline() {
        let max_key = 99;
        let graph = Graph::new(|key| KeyedPathCount { key, max_key });
        let result = graph.run(max_key);
        assert_eq!(graph.node_count(), 100);
        assert_eq!(result, serial_path_count(max_key, max_key));
        for key in 0..=max_key {
            assert_eq!(graph.status_of(key), Some(NodeStatus::Completed));
        }
    }

    struct GeneratingRoot;
    impl DynamicTask for GeneratingRoot {
        type Value = i64;
        fn init(&self, _cx: &mut InitContext<'_>) {}
        fn compute(&self, _cx: &ComputeContext<'_, Self>) -> i64 {
            1
        }
        fn generate(&self, cx: &mut GenerateContext<'_>) {
            cx.generate_task(100);
            cx.generate_task(200);
        }
    }

    struct Leaf;
    impl DynamicTask for Leaf {
        type Value = i64;
        fn init(&self, _cx: &mut InitContext<'_>) {}
        fn compute(&self, _cx: &ComputeContext<'_, Self>) -> i64 {
            1
        }
    }

    enum RootOrLeaf {
        Root(GeneratingRoot),
        Leaf(Leaf),
    }
    impl DynamicTask for RootOrLeaf {
        type Value = i64;
        fn init(&self, cx: &mut InitContext<'_>) {
            match self {
                RootOrLeaf::Root(t) => t.init(cx),
                RootOrLeaf::Leaf(t) => t.init(cx),
            }
        }
        fn compute(&self, _cx: &ComputeContext<'_, Self>) -> i64 {
            1
        }
        fn generate(&self, cx: &mut GenerateContext<'_>) {
            if let RootOrLeaf::Root(t) = self {
                t.generate(cx);
            }
        }
    }

    #[test]
    fn generated_sub_roots_complete_exactly_once() {
        let graph = Graph::new(|key| {
            if key == 1 {
                RootOrLeaf::Root(GeneratingRoot)
            } else {
                RootOrLeaf::Leaf(Leaf)
            }
        });
        graph.run(1);
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.status_of(1), Some(NodeStatus::Completed));
        assert_eq!(graph.status_of(100), Some(NodeStatus::Completed));
        assert_eq!(graph.status_of(200), Some(NodeStatus::Completed));
    }
}
