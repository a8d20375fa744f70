//! Per-key mutual exclusion.
//!
//! A load serializes only against other loads of the same path or the same
//! name. Each in-flight key gets its own mutex, created on first use and
//! dropped from the table once the last holder releases it.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

pub(crate) struct KeyedLocks<K> {
    table: Mutex<HashMap<K, Arc<Mutex<()>>>>,
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub(crate) fn new() -> Self {
        Self {
            table: Mutex::new(HashMap::new()),
        }
    }

    /// Run `f` while holding the lock for `key`.
    pub(crate) fn with_lock<R>(&self, key: &K, f: impl FnOnce() -> R) -> R {
        let slot = {
            let mut table = self.table.lock();
            Arc::clone(table.entry(key.clone()).or_default())
        };

        let result = {
            let _guard = slot.lock();
            f()
        };

        // Waiters clone the slot under the table lock, so two references
        // (the table's and ours) means nobody else wants this key.
        let mut table = self.table.lock();
        if Arc::strong_count(&slot) == 2 {
            table.remove(key);
        }
        result
    }

    #[cfg(test)]
    fn in_flight(&self) -> usize {
        self.table.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn test_entries_removed_after_release() {
        let locks = KeyedLocks::new();
        let value = locks.with_lock(&"dependency".to_string(), || 42);
        assert_eq!(value, 42);
        assert_eq!(locks.in_flight(), 0);
    }

    #[test]
    fn test_same_key_is_exclusive() {
        let locks = Arc::new(KeyedLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let inside = Arc::clone(&inside);
                let max_inside = Arc::clone(&max_inside);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    locks.with_lock(&"same".to_string(), || {
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_inside.fetch_max(now, Ordering::SeqCst);
                        thread::yield_now();
                        inside.fetch_sub(1, Ordering::SeqCst);
                    });
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert_eq!(locks.in_flight(), 0);
    }

    #[test]
    fn test_distinct_keys_do_not_block() {
        let locks = KeyedLocks::new();
        let nested = locks.with_lock(&"outer".to_string(), || {
            locks.with_lock(&"inner".to_string(), || "both held")
        });
        assert_eq!(nested, "both held");
        assert_eq!(locks.in_flight(), 0);
    }
}
