//! Per-resource single-writer locks.
//!
//! Each resource key gets its own async mutex, so writers to the same canvas
//! are serialized while different canvases proceed in parallel. Entries are
//! dropped from the table once nobody holds or waits on them.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::error::StoreError;

#[derive(Debug)]
pub struct ResourceLocks<K> {
    table: Arc<Mutex<HashMap<K, Arc<AsyncMutex<()>>>>>,
}

impl<K> Default for ResourceLocks<K> {
    fn default() -> Self {
        Self {
            table: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<K> Clone for ResourceLocks<K> {
    fn clone(&self) -> Self {
        Self {
            table: Arc::clone(&self.table),
        }
    }
}

impl<K> ResourceLocks<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`.
    pub async fn acquire(&self, key: &K) -> Result<ResourceGuard<K>, StoreError> {
        let slot = {
            let mut table = self.table.lock().map_err(|_| StoreError::poisoned("resource"))?;
            Arc::clone(table.entry(key.clone()).or_default())
        };
        let guard = slot.lock_owned().await;
        Ok(ResourceGuard {
            key: key.clone(),
            table: Arc::clone(&self.table),
            guard: Some(guard),
        })
    }

    /// Number of keys currently held or awaited.
    pub fn len(&self) -> usize {
        self.table.lock().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exclusive access to one resource until dropped.
pub struct ResourceGuard<K: Eq + Hash> {
    key: K,
    table: Arc<Mutex<HashMap<K, Arc<AsyncMutex<()>>>>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<K: Eq + Hash> Drop for ResourceGuard<K> {
    fn drop(&mut self) {
        // Release first so the strong count below only counts the table and
        // any waiters.
        self.guard.take();
        if let Ok(mut table) = self.table.lock() {
            if table.get(&self.key).is_some_and(|slot| Arc::strong_count(slot) == 1) {
                table.remove(&self.key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn table_is_emptied_after_release() {
        let locks = ResourceLocks::<String>::new();
        {
            let _a = locks.acquire(&"c1".to_string()).await.unwrap();
            let _b = locks.acquire(&"c2".to_string()).await.unwrap();
            assert_eq!(locks.len(), 2);
        }
        assert!(locks.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn same_key_is_serialized() {
        let locks = ResourceLocks::<&'static str>::new();
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let inside = Arc::clone(&inside);
            let max_seen = Arc::clone(&max_seen);
            tasks.push(tokio::spawn(async move {
                let _guard = locks.acquire(&"c1").await.unwrap();
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn different_keys_do_not_block() {
        let locks = ResourceLocks::<&'static str>::new();
        let _c1 = locks.acquire(&"c1").await.unwrap();
        let c2 = tokio::time::timeout(Duration::from_millis(100), locks.acquire(&"c2")).await;
        assert!(c2.is_ok());
    }
}
