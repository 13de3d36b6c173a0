//! Per-key async locks.
//!
//! Writes to one item id run one at a time, in the order they asked for the
//! lock (tokio's mutex is FIFO). Different ids never wait on each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Guard for one key. The key is released when this is dropped.
pub type KeyGuard = OwnedMutexGuard<()>;

#[derive(Debug, Default)]
pub struct KeyedLocks {
    slots: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `key`.
    pub async fn lock(&self, key: &str) -> KeyGuard {
        self.slot(key).lock_owned().await
    }

    /// Locks several keys in sorted order so two callers with overlapping
    /// sets cannot deadlock.
    pub async fn lock_many<I, S>(&self, keys: I) -> Vec<KeyGuard>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut keys: Vec<String> = keys.into_iter().map(|k| k.as_ref().to_string()).collect();
        keys.sort();
        keys.dedup();

        let mut guards = Vec::with_capacity(keys.len());
        for key in &keys {
            guards.push(self.lock(key).await);
        }
        guards
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        // Drop slots nobody holds or waits on.
        slots.retain(|k, slot| k == key || Arc::strong_count(slot) > 1);
        slots
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}
