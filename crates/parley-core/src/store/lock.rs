//! Per-key locks for serializing load-mutate-store cycles.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A table of per-key mutexes.
///
/// Handing out `Arc`s lets a caller hold one key's lock without keeping the
/// table itself locked. Entries nobody holds are pruned on the next lookup.
#[derive(Debug)]
pub struct LockTable<K> {
    locks: Mutex<HashMap<K, Arc<Mutex<()>>>>,
}

impl<K: Eq + Hash + Clone> LockTable<K> {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Get the lock for `key`, creating it if needed.
    pub fn lock_for(&self, key: &K) -> Arc<Mutex<()>> {
        // The table only holds `()` locks, so a poisoned guard is still sound.
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Arc::clone(locks.entry(key.clone()).or_default())
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Eq + Hash + Clone> Default for LockTable<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// Acquire a `()` lock, recovering from poisoning.
///
/// A panic while holding the lock cannot leave a stored record half-written:
/// records are only replaced wholesale after success.
pub fn acquire(lock: &Mutex<()>) -> MutexGuard<'_, ()> {
    lock.lock().unwrap_or_else(PoisonError::into_inner)
}
