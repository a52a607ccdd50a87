//! Bounded cache of loaded per-key state for the filesystem backends.
//!
//! Each key (a stream or a canvas) owns a slot: an async mutex around the
//! state loaded from its file. At most `capacity` slots stay cached. When a
//! new key arrives at the limit, the least recently used idle slot is dropped
//! and reloaded from disk on its next use. A slot somebody holds or waits on
//! is never evicted, so one key never has two live copies.

use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use lru::LruCache;
use tokio::sync::Mutex as AsyncMutex;

use crate::error::StoreError;

/// Slots kept per backend unless configured otherwise.
pub const DEFAULT_CAPACITY: usize = 1024;

pub type Slot<V> = Arc<AsyncMutex<Option<V>>>;

pub struct SlotCache<K: Hash + Eq, V> {
    capacity: usize,
    slots: Mutex<LruCache<K, Slot<V>>>,
}

impl<K: Hash + Eq + Clone, V> fmt::Debug for SlotCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotCache")
            .field("capacity", &self.capacity)
            .field("cached", &self.len())
            .finish()
    }
}

impl<K, V> SlotCache<K, V>
where
    K: Hash + Eq + Clone,
{
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            slots: Mutex::new(LruCache::unbounded()),
        }
    }

    /// The slot for `key`, created empty when it is not cached.
    pub fn slot(&self, key: &K) -> Result<Slot<V>, StoreError> {
        let mut slots = self.slots.lock().map_err(|_| StoreError::poisoned("slot cache"))?;
        if let Some(slot) = slots.get(key) {
            return Ok(Arc::clone(slot));
        }

        while slots.len() >= self.capacity {
            // Only the cache's own reference left: nobody holds or awaits it.
            let idle = slots
                .iter()
                .rev()
                .find(|(_, slot)| Arc::strong_count(slot) == 1)
                .map(|(key, _)| key.clone());
            match idle {
                Some(key) => {
                    slots.pop(&key);
                }
                None => break,
            }
        }

        let slot: Slot<V> = Arc::new(AsyncMutex::new(None));
        slots.put(key.clone(), Arc::clone(&slot));
        Ok(slot)
    }

    pub fn len(&self) -> usize {
        self.slots.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &K) -> bool {
        self.slots.lock().map(|s| s.contains(key)).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn least_recently_used_idle_slot_is_evicted() {
        let cache: SlotCache<&str, u32> = SlotCache::new(2);
        cache.slot(&"a").unwrap();
        cache.slot(&"b").unwrap();
        cache.slot(&"a").unwrap();
        cache.slot(&"c").unwrap();

        assert_eq!(cache.len(), 2);
        assert!(cache.contains(&"a"));
        assert!(!cache.contains(&"b"));
        assert!(cache.contains(&"c"));
    }

    #[test]
    fn held_slots_are_never_evicted() {
        let cache: SlotCache<&str, u32> = SlotCache::new(1);
        let held = cache.slot(&"a").unwrap();
        cache.slot(&"b").unwrap();

        assert!(cache.contains(&"a"));
        assert!(Arc::ptr_eq(&held, &cache.slot(&"a").unwrap()));

        drop(held);
        cache.slot(&"c").unwrap();
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(&"c"));
    }
}
