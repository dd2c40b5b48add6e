//! C3: concurrently appendable, exclusively-grown array.
//!
//! Writers race to reserve an index via CAS on `reserved`, then race to
//! publish their write in index order via a spin on `published` — so a
//! reader's `published > i` check is a true guarantee that slot `i` was
//! written, not just that *some* `i` slots were written. Growth swaps the
//! backing buffer under a single-holder flag; old buffers are retired, not
//! freed, until the array itself drops (a reader may still be mid-dereference
//! of one when growth completes).

use crate::diagnostics::{warn_event, Metrics};
use crate::loom::{AtomicBool, AtomicPtr, AtomicUsize};
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::ptr;
use std::sync::atomic::Ordering;
use std::sync::Mutex;

struct Slot<T>(UnsafeCell<MaybeUninit<T>>);

struct Buffer<T> {
    capacity: usize,
    slots: Box<[Slot<T>]>,
}

impl<T> Buffer<T> {
    fn with_capacity(capacity: usize) -> *mut Buffer<T> {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || Slot(UnsafeCell::new(MaybeUninit::uninit())));
        Box::into_raw(Box::new(Buffer {
            capacity,
            slots: slots.into_boxed_slice(),
        }))
    }
}

/// A lock-free, growable append-only sequence.
///
/// `T: Clone` is required because growth must duplicate already-published
/// elements into the new backing buffer while earlier readers may still be
/// dereferencing the old one.
pub struct ConcurrentAppendOnlyArray<T> {
    buffer: AtomicPtr<Buffer<T>>,
    reserved: AtomicUsize,
    published: AtomicUsize,
    resize_lock: AtomicBool,
    retry_budget: usize,
    old_buffers: Mutex<Vec<(*mut Buffer<T>, usize)>>,
}

unsafe impl<T: Send> Send for ConcurrentAppendOnlyArray<T> {}
unsafe impl<T: Send> Sync for ConcurrentAppendOnlyArray<T> {}

impl<T: Clone> ConcurrentAppendOnlyArray<T> {
    /// Creates an empty array with room for `initial_capacity` elements
    /// before the first growth.
    pub fn new(initial_capacity: usize, retry_budget: usize) -> Self {
        let initial_capacity = initial_capacity.max(1);
        ConcurrentAppendOnlyArray {
            buffer: AtomicPtr::new(Buffer::with_capacity(initial_capacity)),
            reserved: AtomicUsize::new(0),
            published: AtomicUsize::new(0),
            resize_lock: AtomicBool::new(false),
            retry_budget,
            old_buffers: Mutex::new(Vec::new()),
        }
    }

    /// Appends `value`, returning its index on success, or `None` if the
    /// retry budget was exhausted by contention on the reservation CAS.
    pub fn append(&self, value: T) -> Option<usize> {
        self.append_with_metrics(value, None)
    }

    pub(crate) fn append_with_metrics(&self, value: T, metrics: Option<&Metrics>) -> Option<usize> {
        let mut retries = 0usize;
        loop {
            let buf_ptr = self.buffer.load(Ordering::Acquire);
            // SAFETY: buffer pointers are published once and retired (never
            // freed) while this array is alive.
            let buf = unsafe { &*buf_ptr };
            let reserved = self.reserved.load(Ordering::Acquire);

            if reserved >= buf.capacity {
                self.grow(buf_ptr);
                retries += 1;
                if retries >= self.retry_budget {
                    if let Some(m) = metrics {
                        m.on_retry_exhausted();
                    }
                    warn_event!(retries, "array append exhausted retry budget during growth");
                    return None;
                }
                continue;
            }

            if self
                .reserved
                .compare_exchange(reserved, reserved + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                // SAFETY: we exclusively won slot `reserved`; no other
                // writer can also have won it (the CAS above is unique per
                // successful reservation), and readers only read a slot
                // after `published` passes it.
                unsafe {
                    (*buf.slots[reserved].0.get()).write(value);
                }
                // Publish in reservation order: wait for our turn before
                // advancing `published`, so `published > i` always implies
                // slot `i` itself (not just some `i` slots) was written.
                while self.published.load(Ordering::Acquire) != reserved {
                    std::hint::spin_loop();
                }
                self.published.store(reserved + 1, Ordering::Release);
                return Some(reserved);
            }
            retries += 1;
            if retries >= self.retry_budget {
                if let Some(m) = metrics {
                    m.on_retry_exhausted();
                }
                warn_event!(retries, "array append exhausted retry budget reserving a slot");
                return None;
            }
        }
    }

    /// Returns the element at `i`, spinning until it has been published.
    /// Callers must only call this for an `i` they know has been (or will
    /// imminently be) reserved; there is no bound on the spin otherwise.
    pub fn get(&self, i: usize) -> T {
        loop {
            if self.published.load(Ordering::Acquire) > i {
                let buf = unsafe { &*self.buffer.load(Ordering::Acquire) };
                // SAFETY: `published > i` means the writer that reserved `i`
                // has completed its write and release-published it; the
                // buffer holding slot `i` (current or an ancestor copied
                // forward during growth) has that slot initialized.
                return unsafe { (*buf.slots[i].0.get()).assume_init_ref() }.clone();
            }
            std::hint::spin_loop();
        }
    }

    /// Monotonically increasing count of reserved (not necessarily
    /// published) slots.
    pub fn size_estimate(&self) -> usize {
        self.reserved.load(Ordering::Acquire)
    }

    fn grow(&self, observed: *mut Buffer<T>) {
        if self
            .resize_lock
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            // Someone else is growing; caller re-checks capacity and retries.
            return;
        }

        let current = self.buffer.load(Ordering::Acquire);
        if current != observed {
            // Already grown by the time we took the lock.
            self.resize_lock.store(false, Ordering::Release);
            return;
        }

        // SAFETY: `current` is a published, live buffer pointer.
        let old = unsafe { &*current };
        let old_capacity = old.capacity;

        while self.published.load(Ordering::Acquire) < old_capacity {
            std::hint::spin_loop();
        }

        let new_ptr = Buffer::with_capacity(old_capacity * 2);
        // SAFETY: `new_ptr` was just allocated and is not yet published.
        let new_buf = unsafe { &*new_ptr };
        for i in 0..old_capacity {
            // SAFETY: every slot below `old_capacity` was confirmed
            // published above, so it holds an initialized `T`.
            let value = unsafe { (*old.slots[i].0.get()).assume_init_ref() }.clone();
            unsafe {
                (*new_buf.slots[i].0.get()).write(value);
            }
        }

        self.buffer.store(new_ptr, Ordering::Release);
        self.old_buffers.lock().unwrap().push((current, old_capacity));
        self.resize_lock.store(false, Ordering::Release);
    }
}

impl<T> Drop for ConcurrentAppendOnlyArray<T> {
    fn drop(&mut self) {
        let published = *self.published.get_mut();
        let current = *self.buffer.get_mut();
        // SAFETY: `&mut self` guarantees exclusive access; every slot below
        // `published` on the live buffer is initialized.
        unsafe {
            let buf = &*current;
            for i in 0..published {
                ptr::drop_in_place((*buf.slots[i].0.get()).as_mut_ptr());
            }
            drop(Box::from_raw(current));
        }
        for (ptr, capacity) in self.old_buffers.get_mut().unwrap().drain(..) {
            // SAFETY: retired buffers were fully copied (every slot below
            // `capacity` initialized) before being retired, and are never
            // read after this array drops.
            unsafe {
                let buf = &*ptr;
                for i in 0..capacity {
                    ptr::drop_in_place((*buf.slots[i].0.get()).as_mut_ptr());
                }
                drop(Box::from_raw(ptr));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn append_then_get_round_trips() {
        let arr = ConcurrentAppendOnlyArray::new(2, 10);
        assert_eq!(arr.append(10), Some(0));
        assert_eq!(arr.append(20), Some(1));
        assert_eq!(arr.get(0), 10);
        assert_eq!(arr.get(1), 20);
    }

    #[test]
    fn append_past_initial_capacity_grows() {
        let arr = ConcurrentAppendOnlyArray::new(2, 10);
        for i in 0..50 {
            assert_eq!(arr.append(i), Some(i as usize));
        }
        for i in 0..50 {
            assert_eq!(arr.get(i as usize), i);
        }
        assert_eq!(arr.size_estimate(), 50);
    }

    #[test]
    fn writer_and_racing_readers_never_see_garbage() {
        let arr = Arc::new(ConcurrentAppendOnlyArray::new(4, 10));
        const N: i64 = 10_000;

        let writer = {
            let arr = Arc::clone(&arr);
            thread::spawn(move || {
                for i in 0..N {
                    arr.append(i).unwrap();
                }
            })
        };

        let readers: Vec<_> = (0..10)
            .map(|_| {
                let arr = Arc::clone(&arr);
                thread::spawn(move || {
                    let mut last_seen = -1i64;
                    while last_seen < N - 1 {
                        let reserved = arr.size_estimate();
                        if reserved > last_seen as usize {
                            let idx = last_seen as usize + 1;
                            if idx < reserved {
                                let v = arr.get(idx);
                                assert_eq!(v, idx as i64);
                                last_seen = idx as i64;
                            }
                        }
                        std::hint::spin_loop();
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for r in readers {
            r.join().unwrap();
        }
    }
}
