use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};

/// A collection of mutexes indexed by arbitrary keys.
///
/// Locking a key blocks until no other caller holds it; unrelated keys do
/// not contend. Entries are refcounted and removed as soon as the last
/// holder lets go, so the table stays small for transient keys.
pub(crate) struct Locker<K> {
    slots: Mutex<HashMap<K, Slot, ahash::RandomState>>,
}

struct Slot {
    refs: usize,
    mutex: Arc<Mutex<()>>,
}

impl<K: Eq + Hash + Clone> Locker<K> {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::default()),
        }
    }

    /// Lock `key`, blocking until it is free. The key unlocks when the
    /// returned guard drops.
    pub fn lock(&self, key: K) -> KeyGuard<'_, K> {
        let mutex = {
            let mut slots = self.slots.lock();
            let slot = slots.entry(key.clone()).or_insert_with(|| Slot {
                refs: 0,
                mutex: Arc::new(Mutex::new(())),
            });
            slot.refs += 1;
            slot.mutex.clone()
        };
        // Block on the per-key mutex outside the table lock.
        let guard = mutex.lock_arc();
        KeyGuard {
            locker: self,
            key,
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.slots.lock().len()
    }
}

/// Holds a key locked until dropped.
pub(crate) struct KeyGuard<'a, K: Eq + Hash + Clone> {
    locker: &'a Locker<K>,
    key: K,
    guard: Option<ArcMutexGuard<RawMutex, ()>>,
}

impl<K: Eq + Hash + Clone> Drop for KeyGuard<'_, K> {
    fn drop(&mut self) {
        // Unlock first, then drop the refcount under the table lock.
        self.guard.take();
        let mut slots = self.locker.slots.lock();
        if let Some(slot) = slots.get_mut(&self.key) {
            slot.refs -= 1;
            if slot.refs == 0 {
                slots.remove(&self.key);
            }
        }
    }
}
