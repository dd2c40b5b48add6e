//! C1: lock-free, head-inserted singly linked list keyed by [`Key`].
//!
//! The list never deletes a node once inserted (`Dead` is a reserved status
//! code that nothing in this crate ever writes); this is what lets `search`
//! and `insert_if_absent` walk without hazard pointers or epochs — a live
//! node found during a walk stays valid for as long as the list itself does.

use crate::diagnostics::{warn_event, Metrics};
use crate::loom::{AtomicPtr, AtomicUsize};
use crate::status::ListOp;
use crate::Key;
use std::ptr;
use std::sync::atomic::Ordering;

#[derive(PartialEq, Eq, Clone, Copy)]
enum LNodeStatus {
    Valid,
    #[allow(dead_code)]
    Dead,
}

struct LNode<V> {
    key: Key,
    value: V,
    status: LNodeStatus,
    next: AtomicPtr<LNode<V>>,
}

/// A lock-free singly linked list. `V` is the payload type stored per key;
/// it must be cheap to clone since `search`/`insert_if_absent` hand back a
/// copy rather than a reference (the caller may be racing a concurrent
/// insert of a different key at any moment, so no borrow of list internals
/// can safely outlive the call).
pub struct ConcurrentLinkedList<V> {
    head: AtomicPtr<LNode<V>>,
    size_estimate: AtomicUsize,
    retry_budget: usize,
}

unsafe impl<V: Send> Send for ConcurrentLinkedList<V> {}
unsafe impl<V: Send> Sync for ConcurrentLinkedList<V> {}

impl<V: Clone> ConcurrentLinkedList<V> {
    /// Creates an empty list.
    pub fn new(retry_budget: usize) -> Self {
        ConcurrentLinkedList {
            head: AtomicPtr::new(ptr::null_mut()),
            size_estimate: AtomicUsize::new(0),
            retry_budget,
        }
    }

    /// Walks the list for `key`. Returns `(Found, Some(value))`,
    /// `(NotFound, None)`, or `(Failed, None)` if the retry budget was
    /// exhausted by a list that kept changing under us.
    pub fn search(&self, key: Key) -> (ListOp, Option<V>) {
        self.search_with_metrics(key, None)
    }

    pub(crate) fn search_with_metrics(&self, key: Key, metrics: Option<&Metrics>) -> (ListOp, Option<V>) {
        let mut retries = 0usize;
        loop {
            let snapshot = self.head.load(Ordering::Acquire);
            if let Some(found) = self.walk_for(snapshot, key) {
                return (ListOp::Found, Some(found));
            }
            // Not found in this walk. If the head pointer we started from is
            // still current, nothing raced us and the key is genuinely
            // absent. Otherwise a concurrent insert may have spliced the key
            // in ahead of our snapshot; retry against a fresh snapshot.
            if self.head.load(Ordering::Acquire) == snapshot {
                return (ListOp::NotFound, None);
            }
            retries += 1;
            if retries >= self.retry_budget {
                if let Some(m) = metrics {
                    m.on_retry_exhausted();
                }
                warn_event!(key, retries, "list search exhausted retry budget");
                return (ListOp::Failed, None);
            }
        }
    }

    /// If `key` is present, returns its existing value with `Found`.
    /// Otherwise splices a new node at the head via CAS and returns `value`
    /// with `Inserted`. Returns `Failed` if the CAS keeps losing past the
    /// retry budget.
    pub fn insert_if_absent(&self, key: Key, value: V) -> (ListOp, V) {
        self.insert_if_absent_with_metrics(key, value, None)
    }

    pub(crate) fn insert_if_absent_with_metrics(&self, key: Key, value: V, metrics: Option<&Metrics>) -> (ListOp, V) {
        let mut retries = 0usize;
        loop {
            let snapshot = self.head.load(Ordering::Acquire);
            if let Some(found) = self.walk_for(snapshot, key) {
                return (ListOp::Found, found);
            }

            let node = Box::into_raw(Box::new(LNode {
                key,
                value: value.clone(),
                status: LNodeStatus::Valid,
                next: AtomicPtr::new(snapshot),
            }));

            match self.head.compare_exchange(
                snapshot,
                node,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    // Advisory only: see `size_estimate`'s doc comment.
                    self.size_estimate.fetch_add(1, Ordering::Relaxed);
                    return (ListOp::Inserted, value);
                }
                Err(_) => {
                    // SAFETY: `node` was just created by us via `Box::into_raw`
                    // and never published (the CAS that would have published
                    // it failed), so no other thread can hold a reference to it.
                    drop(unsafe { Box::from_raw(node) });
                    retries += 1;
                    if retries >= self.retry_budget {
                        if let Some(m) = metrics {
                            m.on_retry_exhausted();
                        }
                        warn_event!(key, retries, "list insert exhausted retry budget");
                        return (ListOp::Failed, value);
                    }
                }
            }
        }
    }

    /// Advisory element count, incremented non-atomically (via a `Relaxed`
    /// add, not a CAS loop) on every successful insert. Do not use for
    /// correctness; use [`update_size_estimate`](Self::update_size_estimate)
    /// for an exact count of a quiescent list.
    pub fn size_estimate(&self) -> usize {
        self.size_estimate.load(Ordering::Relaxed)
    }

    /// Traverses the list to compute and store an exact live-node count.
    /// Only meaningful when no concurrent insert is in flight.
    pub fn update_size_estimate(&self) -> usize {
        let mut count = 0usize;
        let mut cur = self.head.load(Ordering::Acquire);
        while !cur.is_null() {
            // SAFETY: nodes are never freed while the list is alive.
            let node = unsafe { &*cur };
            if node.status == LNodeStatus::Valid {
                count += 1;
            }
            cur = node.next.load(Ordering::Acquire);
        }
        self.size_estimate.store(count, Ordering::Relaxed);
        count
    }

    /// Snapshot of all live keys, most-recently-inserted first.
    pub fn keys(&self) -> Vec<Key> {
        let mut out = Vec::new();
        let mut cur = self.head.load(Ordering::Acquire);
        while !cur.is_null() {
            // SAFETY: nodes are never freed while the list is alive.
            let node = unsafe { &*cur };
            if node.status == LNodeStatus::Valid {
                out.push(node.key);
            }
            cur = node.next.load(Ordering::Acquire);
        }
        out
    }

    fn walk_for(&self, start: *mut LNode<V>, key: Key) -> Option<V> {
        let mut cur = start;
        while !cur.is_null() {
            // SAFETY: nodes are never freed while the list is alive; `cur`
            // was read from an `Acquire` load of a pointer this list owns.
            let node = unsafe { &*cur };
            if node.key == key && node.status == LNodeStatus::Valid {
                return Some(node.value.clone());
            }
            cur = node.next.load(Ordering::Acquire);
        }
        None
    }
}

impl<V> Drop for ConcurrentLinkedList<V> {
    fn drop(&mut self) {
        let mut cur = *self.head.get_mut();
        while !cur.is_null() {
            // SAFETY: `&mut self` means no other reference to this list's
            // nodes can exist; we own the whole chain exclusively here.
            let node = unsafe { Box::from_raw(cur) };
            cur = node.next.load(Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_search_finds_value() {
        let list = ConcurrentLinkedList::new(10);
        assert_eq!(list.insert_if_absent(1, "a"), (ListOp::Inserted, "a"));
        assert_eq!(list.search(1), (ListOp::Found, Some("a")));
        assert_eq!(list.search(2), (ListOp::NotFound, None));
    }

    #[test]
    fn insert_if_absent_is_idempotent() {
        let list = ConcurrentLinkedList::new(10);
        assert_eq!(list.insert_if_absent(1, "a"), (ListOp::Inserted, "a"));
        assert_eq!(list.insert_if_absent(1, "b"), (ListOp::Found, "a"));
        assert_eq!(list.size_estimate(), 1);
    }

    #[test]
    fn update_size_estimate_counts_exactly() {
        let list = ConcurrentLinkedList::new(10);
        for k in 0..5 {
            list.insert_if_absent(k, k);
        }
        assert_eq!(list.update_size_estimate(), 5);
    }
}
