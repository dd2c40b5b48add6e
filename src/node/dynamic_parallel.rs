//! Dynamic DAG discovery under concurrent, work-stealing execution. This is
//! the subsystem described as "the interesting part" of the design: many
//! workers may race to discover the same key, and a predecessor may finish
//! between the moment a successor looks it up and the moment it registers
//! to be notified. The [`super::BlockingLock`] closes that race (see
//! [`Graph::compute_and_notify`]'s notification loop).

use super::{BlockingLock, ComputeContext, DynamicTask, GenerateContext, InitContext};
use crate::array::ConcurrentAppendOnlyArray;
use crate::config::Config;
use crate::diagnostics::{trace_event, Metrics};
use crate::error::GraphError;
use crate::loom::{AtomicIsize, Arc};
use crate::status::{AtomicStatus, ListOp, NodeStatus};
use crate::table::ConcurrentHashTable;
use crate::Key;
use std::cell::UnsafeCell;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A node in a dynamically discovered, concurrently executed DAG. Not part
/// of the public API: callers drive a DAG through [`Graph`] and observe
/// nodes only via [`Graph::status_of`]/the value a task's `compute` reads.
struct Node<T: DynamicTask> {
    key: Key,
    status: AtomicStatus,
    join_counter: AtomicIsize,
    predecessors: ConcurrentAppendOnlyArray<Key>,
    successors_to_notify: ConcurrentAppendOnlyArray<Arc<Node<T>>>,
    generated_tasks: ConcurrentAppendOnlyArray<Key>,
    notify_counter: AtomicUsize,
    blocking_lock: BlockingLock,
    value: UnsafeCell<Option<T::Value>>,
    task: T,
}

// SAFETY: `value` is only written once, by the single thread that performs
// this node's `Expanded -> Computed` transition, and only read by threads
// that have first observed `status >= Computed` with `Acquire` ordering.
// That load synchronizes-with the `Release` half of the transition's CAS
// (performed after the write), establishing happens-before; see
// `Node::set_value`/`Node::value`.
unsafe impl<T: DynamicTask> Sync for Node<T> {}

impl<T: DynamicTask> Node<T> {
    fn new(key: Key, task: T, config: &Config) -> Self {
        Node {
            key,
            status: AtomicStatus::new(NodeStatus::Unvisited),
            join_counter: AtomicIsize::new(1),
            predecessors: ConcurrentAppendOnlyArray::new(config.array_initial_capacity(), config.retry_budget()),
            successors_to_notify: ConcurrentAppendOnlyArray::new(
                config.successor_list_initial_capacity(),
                config.retry_budget(),
            ),
            generated_tasks: ConcurrentAppendOnlyArray::new(config.array_initial_capacity(), config.retry_budget()),
            notify_counter: AtomicUsize::new(0),
            blocking_lock: BlockingLock::new(),
            value: UnsafeCell::new(None),
            task,
        }
    }

    fn get_status(&self) -> NodeStatus {
        self.status.load(Ordering::Acquire)
    }

    fn set_value(&self, v: T::Value) {
        // SAFETY: called once by the single winner of this node's
        // `Expanded -> Computed` transition, before performing it.
        unsafe {
            *self.value.get() = Some(v);
        }
    }

    fn value(&self) -> T::Value {
        debug_assert!(self.get_status() >= NodeStatus::Computed);
        // SAFETY: see the `unsafe impl Sync` comment above.
        unsafe {
            (*self.value.get())
                .clone()
                .expect("value missing despite status >= Computed")
        }
    }
}

/// Owns the memoizing key→node table for one dynamically-discovered DAG run,
/// and drives execution across a `rayon` thread pool.
pub struct Graph<T: DynamicTask> {
    table: ConcurrentHashTable<Arc<Node<T>>>,
    factory: Box<dyn Fn(Key) -> T + Send + Sync>,
    config: Config,
    metrics: Metrics,
}

impl<T: DynamicTask + 'static> Graph<T> {
    /// `expected_size` sizes the hash table's fixed bucket count (see
    /// [`Config::bucket_count_for`]); it is a hint, not a limit.
    pub fn new(config: Config, expected_size: u64, factory: impl Fn(Key) -> T + Send + Sync + 'static) -> Self {
        let bucket_count = Config::bucket_count_for(expected_size).max(1);
        Graph {
            table: ConcurrentHashTable::new(bucket_count, config.retry_budget()),
            factory: Box::new(factory),
            config,
            metrics: Metrics::new(),
        }
    }

    /// Lifetime counters for this run; see [`Metrics`].
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Number of distinct keys discovered so far.
    pub fn node_count(&self) -> usize {
        self.table.keys().len()
    }

    /// This key's current lifecycle state, if it has been discovered yet.
    pub fn status_of(&self, key: Key) -> Option<NodeStatus> {
        self.get_task(key).map(|n| n.get_status())
    }

    /// Drives `root_key` (and everything it transitively discovers) to
    /// `Completed` across the `rayon` global pool, then returns its value.
    /// Panics from task hooks propagate out of this call; see [`Self::try_run`]
    /// to observe them as a [`GraphError`] instead.
    pub fn run(&self, root_key: Key) -> T::Value {
        rayon::scope(|scope| {
            self.init_root_and_compute(scope, root_key);
        });
        self.node_value(root_key)
    }

    /// Like [`Self::run`], but catches a panicking task hook and reports it
    /// as [`GraphError::PoisonedScope`] instead of unwinding through the
    /// caller.
    pub fn try_run(&self, root_key: Key) -> Result<T::Value, GraphError> {
        std::panic::catch_unwind(AssertUnwindSafe(|| self.run(root_key))).map_err(|_| GraphError::PoisonedScope)
    }

    fn node_value(&self, key: Key) -> T::Value {
        self.get_task(key)
            .unwrap_or_else(|| panic!("node_value called for unknown key {key}"))
            .value()
    }

    fn get_task(&self, key: Key) -> Option<Arc<Node<T>>> {
        match self.table.search_with_metrics(key, Some(&self.metrics)) {
            (ListOp::Found, Some(node)) if node.get_status() >= NodeStatus::Visited => Some(node),
            _ => None,
        }
    }

    /// Returns `(node, true)` iff this call won the `Unvisited -> Visited`
    /// race for `key`'s node (creating it if no entry existed yet).
    fn insert_task_if_absent(&self, key: Key) -> (Arc<Node<T>>, bool) {
        let fresh = Arc::new(Node::new(key, (self.factory)(key), &self.config));
        let (op, node) = self
            .table
            .insert_if_absent_with_metrics(key, fresh, Some(&self.metrics));
        if op == ListOp::Inserted {
            self.metrics.on_node_created();
        }
        let won = node.status.try_transition(NodeStatus::Unvisited, NodeStatus::Visited);
        (node, won)
    }

    fn decrement_and_maybe_compute<'scope>(&'scope self, scope: &rayon::Scope<'scope>, node: &Arc<Node<T>>) {
        let remaining = node.join_counter.fetch_sub(1, Ordering::AcqRel) - 1;
        debug_assert!(remaining >= 0, "join_counter went negative for key {}", node.key);
        if remaining == 0 {
            let node = Arc::clone(node);
            scope.spawn(move |scope| self.compute_and_notify(scope, &node));
        }
    }

    fn try_init_and_compute<'scope>(
        &'scope self,
        scope: &rayon::Scope<'scope>,
        successor: &Arc<Node<T>>,
        pred_key: Key,
    ) {
        let pred = loop {
            if let Some(p) = self.get_task(pred_key) {
                break p;
            }
            let (p, won) = self.insert_task_if_absent(pred_key);
            if won {
                let spawned = Arc::clone(&p);
                scope.spawn(move |scope| self.init_node_and_compute(scope, &spawned));
            }
            if p.get_status() >= NodeStatus::Visited {
                break p;
            }
        };

        pred.blocking_lock.acquire();
        let already_done = pred.get_status() >= NodeStatus::Computed;
        if !already_done {
            pred.successors_to_notify.append_with_metrics(Arc::clone(successor), Some(&self.metrics));
        }
        pred.blocking_lock.release();

        if already_done {
            self.decrement_and_maybe_compute(scope, successor);
        }
    }

    fn init_node_and_compute<'scope>(&'scope self, scope: &rayon::Scope<'scope>, node: &Arc<Node<T>>) {
        let mut deps = Vec::new();
        {
            let mut cx = InitContext { deps: &mut deps };
            node.task.init(&mut cx);
        }
        for &pred_key in &deps {
            node.predecessors.append_with_metrics(pred_key, Some(&self.metrics));
            node.join_counter.fetch_add(1, Ordering::AcqRel);
        }
        node.status.transition_or_die(NodeStatus::Visited, NodeStatus::Expanded);
        trace_event!(key = node.key, deps = deps.len(), "node expanded");

        for pred_key in deps {
            let node = Arc::clone(node);
            scope.spawn(move |scope| self.try_init_and_compute(scope, &node, pred_key));
        }
        self.decrement_and_maybe_compute(scope, node);
    }

    fn compute_and_notify<'scope>(&'scope self, scope: &rayon::Scope<'scope>, node: &Arc<Node<T>>) {
        let value = {
            let lookup = |k: Key| self.node_value(k);
            let cx = ComputeContext {
                key: node.key,
                lookup: &lookup,
            };
            node.task.compute(&cx)
        };
        node.set_value(value);
        node.status.transition_or_die(NodeStatus::Expanded, NodeStatus::Computed);
        self.metrics.on_node_completed();

        let mut roots = Vec::new();
        {
            let mut cx = GenerateContext { roots: &mut roots };
            node.task.generate(&mut cx);
        }
        for &root_key in &roots {
            node.generated_tasks.append_with_metrics(root_key, Some(&self.metrics));
        }
        for root_key in roots {
            self.init_root_and_compute(scope, root_key);
        }

        loop {
            let end = node.successors_to_notify.size_estimate();
            let start = node.notify_counter.load(Ordering::Acquire);
            for i in start..end {
                let succ = node.successors_to_notify.get(i);
                self.decrement_and_maybe_compute(scope, &succ);
            }
            node.notify_counter.store(end, Ordering::Release);

            node.blocking_lock.acquire();
            let still_matches = node.successors_to_notify.size_estimate() == end;
            let completed =
                still_matches && node.status.try_transition(NodeStatus::Computed, NodeStatus::Completed);
            node.blocking_lock.release();
            if completed {
                break;
            }
        }
        trace_event!(key = node.key, "node completed");
    }

    /// Creates and schedules a fresh DAG root (from `generate`, or as the
    /// entry point of [`Self::run`]). Unlike `try_init_and_compute`, the
    /// caller does not register itself as a successor. Returns `true` iff
    /// this call created the node.
    fn init_root_and_compute<'scope>(&'scope self, scope: &rayon::Scope<'scope>, root_key: Key) -> bool {
        if self.get_task(root_key).is_some() {
            return false;
        }
        let (node, won) = self.insert_task_if_absent(root_key);
        if won {
            self.init_node_and_compute(scope, &node);
        }
        won
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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
        let graph = Graph::new(Config::new(), 100, move |key| KeyedPathCount { key, max_key });
        let result = graph.run(max_key);
        assert_eq!(graph.node_count(), 100);
        assert_eq!(result, serial_path_count(max_key, max_key));
        for key in 0..=max_key {
            assert_eq!(graph.status_of(key), Some(NodeStatus::Completed));
        }
    }

    struct GeneratingRoot;
    struct Leaf;

    enum RootOrLeaf {
        Root(GeneratingRoot),
        #[allow(dead_code)]
        Leaf(Leaf),
    }

    impl DynamicTask for RootOrLeaf {
        type Value = i64;
        fn init(&self, _cx: &mut InitContext<'_>) {}
        fn compute(&self, _cx: &ComputeContext<'_, Self>) -> i64 {
            1
        }
        fn generate(&self, cx: &mut GenerateContext<'_>) {
            if matches!(self, RootOrLeaf::Root(_)) {
                cx.generate_task(100);
                cx.generate_task(200);
            }
        }
    }

    #[test]
    fn generated_sub_roots_complete_exactly_once() {
        let graph = Graph::new(Config::new(), 8, |key| {
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
