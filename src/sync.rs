use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Unused slots are dropped once the map grows past this size.
const PRUNE_THRESHOLD: usize = 1024;

/// Per-key async mutexes, used as row locks for accounts and OTP state.
#[derive(Default)]
pub struct KeyedLocks {
    slots: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    async fn slot(&self, key: &str) -> Arc<Mutex<()>> {
        let mut slots = self.slots.lock().await;
        if slots.len() >= PRUNE_THRESHOLD {
            // a slot referenced only by the map has no holder and no waiter
            slots.retain(|_, slot| Arc::strong_count(slot) > 1);
        }
        slots.entry(key.to_string()).or_default().clone()
    }

    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        self.slot(key).await.lock_owned().await
    }

    /// Locks every key in sorted order, so two callers locking overlapping
    /// sets can never wait on each other in a cycle.
    pub async fn lock_all<I, K>(&self, keys: I) -> Vec<OwnedMutexGuard<()>>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        let mut keys: Vec<String> = keys.into_iter().map(|k| k.as_ref().to_string()).collect();
        keys.sort();
        keys.dedup();

        let mut guards = Vec::with_capacity(keys.len());
        for key in keys {
            guards.push(self.lock(&key).await);
        }
        guards
    }
}
