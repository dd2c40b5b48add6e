//! C2: fixed-bucket concurrent hash table, buckets are [`ConcurrentLinkedList`]s
//! created lazily and racily.

use crate::list::ConcurrentLinkedList;
use crate::loom::AtomicPtr;
use crate::status::ListOp;
use crate::Key;
use std::ptr;
use std::sync::atomic::Ordering;

/// A fixed-bucket-count hash map from [`Key`] to `V`. Bucket count is chosen
/// once at construction (see [`crate::Config::bucket_count_for`]); there is
/// no resize, matching the source's fixed `initial_num_buckets`.
pub struct ConcurrentHashTable<V> {
    buckets: Vec<AtomicPtr<ConcurrentLinkedList<V>>>,
    retry_budget: usize,
}

unsafe impl<V: Send> Send for ConcurrentHashTable<V> {}
unsafe impl<V: Send> Sync for ConcurrentHashTable<V> {}

impl<V: Clone> ConcurrentHashTable<V> {
    /// Creates an empty table with a fixed `bucket_count`.
    pub fn new(bucket_count: usize, retry_budget: usize) -> Self {
        assert!(bucket_count > 0, "bucket_count must be positive");
        let mut buckets = Vec::with_capacity(bucket_count);
        buckets.resize_with(bucket_count, || AtomicPtr::new(ptr::null_mut()));
        ConcurrentHashTable {
            buckets,
            retry_budget,
        }
    }

    fn hash(&self, key: Key) -> usize {
        (key.rem_euclid(self.buckets.len() as i64)) as usize
    }

    /// Returns the existing bucket list for `key`'s hash, if any has been
    /// created yet. Never allocates.
    fn existing_bucket(&self, idx: usize) -> Option<&ConcurrentLinkedList<V>> {
        let ptr = self.buckets[idx].load(Ordering::Acquire);
        if ptr.is_null() {
            None
        } else {
            // SAFETY: once a bucket pointer is published it is never
            // retired while `self` is alive; buckets are append-only.
            Some(unsafe { &*ptr })
        }
    }

    /// Returns the bucket list for `key`'s hash, racily allocating it if
    /// absent: a loser's allocation is dropped, not published.
    fn get_or_create_bucket(&self, idx: usize, metrics: Option<&crate::diagnostics::Metrics>) -> &ConcurrentLinkedList<V> {
        if let Some(existing) = self.existing_bucket(idx) {
            return existing;
        }
        let fresh = Box::into_raw(Box::new(ConcurrentLinkedList::new(self.retry_budget)));
        match self.buckets[idx].compare_exchange(
            ptr::null_mut(),
            fresh,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {
                if let Some(m) = metrics {
                    m.on_hash_bucket_created();
                }
                // SAFETY: we just published this pointer ourselves.
                unsafe { &*fresh }
            }
            Err(winner) => {
                // SAFETY: our allocation was never published; nobody else
                // can have a reference to it.
                drop(unsafe { Box::from_raw(fresh) });
                // SAFETY: `winner` is the pointer that won the CAS above and
                // is therefore published and alive for the table's lifetime.
                unsafe { &*winner }
            }
        }
    }

    /// Looks up `key`. Returns `NotFound` immediately (without touching the
    /// bucket list) if no bucket has ever been created for its hash.
    pub fn search(&self, key: Key) -> (ListOp, Option<V>) {
        self.search_with_metrics(key, None)
    }

    pub(crate) fn search_with_metrics(&self, key: Key, metrics: Option<&crate::diagnostics::Metrics>) -> (ListOp, Option<V>) {
        let idx = self.hash(key);
        match self.existing_bucket(idx) {
            None => (ListOp::NotFound, None),
            Some(bucket) => bucket.search_with_metrics(key, metrics),
        }
    }

    /// Inserts `value` under `key` if absent, creating the bucket list on
    /// demand.
    pub fn insert_if_absent(&self, key: Key, value: V) -> (ListOp, V) {
        self.insert_if_absent_with_metrics(key, value, None)
    }

    pub(crate) fn insert_if_absent_with_metrics(
        &self,
        key: Key,
        value: V,
        metrics: Option<&crate::diagnostics::Metrics>,
    ) -> (ListOp, V) {
        let idx = self.hash(key);
        let bucket = self.get_or_create_bucket(idx, metrics);
        bucket.insert_if_absent_with_metrics(key, value, metrics)
    }

    /// Snapshot of every key currently stored, in unspecified order.
    pub fn keys(&self) -> Vec<Key> {
        let mut out = Vec::new();
        for slot in &self.buckets {
            let ptr = slot.load(Ordering::Acquire);
            if !ptr.is_null() {
                // SAFETY: published bucket pointers live as long as `self`.
                out.extend(unsafe { &*ptr }.keys());
            }
        }
        out
    }
}

impl<V> Drop for ConcurrentHashTable<V> {
    fn drop(&mut self) {
        for slot in &mut self.buckets {
            let ptr = *slot.get_mut();
            if !ptr.is_null() {
                // SAFETY: `&mut self` guarantees exclusive access.
                drop(unsafe { Box::from_raw(ptr) });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_before_insert_is_not_found() {
        let table: ConcurrentHashTable<i64> = ConcurrentHashTable::new(4, 10);
        assert_eq!(table.search(42), (ListOp::NotFound, None));
    }

    #[test]
    fn insert_then_search_round_trips() {
        let table = ConcurrentHashTable::new(4, 10);
        assert_eq!(table.insert_if_absent(42, "v"), (ListOp::Inserted, "v"));
        assert_eq!(table.search(42), (ListOp::Found, Some("v")));
    }

    #[test]
    fn negative_keys_hash_into_range() {
        let table = ConcurrentHashTable::new(4, 10);
        assert_eq!(table.insert_if_absent(-7, "v"), (ListOp::Inserted, "v"));
        assert_eq!(table.search(-7), (ListOp::Found, Some("v")));
    }

    #[test]
    fn high_contention_insert_has_one_winner() {
        use std::sync::Arc;
        use std::thread;

        let table = Arc::new(ConcurrentHashTable::new(4, 10));
        let mut handles = Vec::new();
        for i in 0..16i64 {
            let table = Arc::clone(&table);
            handles.push(thread::spawn(move || table.insert_if_absent(42, i)));
        }
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let winners: Vec<_> = results.iter().filter(|(op, _)| *op == ListOp::Inserted).collect();
        assert_eq!(winners.len(), 1);
        let winning_value = winners[0].1;
        for (op, v) in &results {
            if *op == ListOp::Found {
                assert_eq!(*v, winning_value);
            }
        }
    }
}
