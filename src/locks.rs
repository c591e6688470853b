use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Per-key async mutual exclusion. Hands out one lock per key; entries are
/// removed once nobody holds or waits on them, so the map only ever contains
/// keys that are in use.
pub struct KeyedLocks<K> {
    locks: Mutex<HashMap<K, Arc<AsyncMutex<()>>>>,
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Wait until `key` is free and hold it until the guard is dropped
    pub async fn lock(&self, key: K) -> KeyGuard<'_, K> {
        let mutex = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks
                .entry(key.clone())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        // Built before waiting so a cancelled waiter still cleans up its entry.
        let mut key_guard = KeyGuard {
            owner: self,
            key,
            guard: None,
        };
        key_guard.guard = Some(mutex.lock_owned().await);

        key_guard
    }

    /// Number of keys currently held or waited on
    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl<K: Eq + Hash + Clone> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self::new()
    }
}

pub struct KeyGuard<'a, K: Eq + Hash + Clone> {
    owner: &'a KeyedLocks<K>,
    key: K,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<K: Eq + Hash + Clone> Drop for KeyGuard<'_, K> {
    fn drop(&mut self) {
        self.guard.take();

        let mut locks = self.owner.locks.lock().unwrap_or_else(|e| e.into_inner());
        // Only the map's own reference left: no holder, no waiter.
        if locks
            .get(&self.key)
            .is_some_and(|mutex| Arc::strong_count(mutex) == 1)
        {
            locks.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_entry_removed_after_release() {
        let locks = KeyedLocks::new();
        {
            let _guard = locks.lock("a").await;
            assert_eq!(locks.len(), 1);
        }
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn test_same_key_is_exclusive() {
        let locks = Arc::new(KeyedLocks::new());
        let counter = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..4 {
            let locks = locks.clone();
            let counter = counter.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.lock(1u32).await;
                counter.lock().unwrap().push(("enter", i));
                tokio::time::sleep(Duration::from_millis(5)).await;
                counter.lock().unwrap().push(("exit", i));
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let events = counter.lock().unwrap();
        for pair in events.chunks(2) {
            assert_eq!(pair[0].0, "enter");
            assert_eq!(pair[1].0, "exit");
            assert_eq!(pair[0].1, pair[1].1);
        }
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn test_different_keys_do_not_block() {
        let locks = KeyedLocks::new();
        let _a = locks.lock("a").await;
        let _b = tokio::time::timeout(Duration::from_millis(50), locks.lock("b"))
            .await
            .expect("lock on another key should not wait");
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_removes_entry() {
        let locks = KeyedLocks::new();
        let holder = locks.lock("a").await;

        let mut waiter = Box::pin(locks.lock("a"));
        assert!(tokio::time::timeout(Duration::from_millis(10), &mut waiter)
            .await
            .is_err());

        drop(holder);
        assert_eq!(locks.len(), 1);

        drop(waiter);
        assert_eq!(locks.len(), 0);
    }
}
