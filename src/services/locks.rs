//! Per-key async mutual exclusion

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

const PRUNE_THRESHOLD: usize = 1024;

/// Hands out one async mutex per key. Entries nobody holds are pruned once
/// the table grows past a threshold.
pub struct KeyedLocks<K> { slots: Mutex<HashMap<K, Arc<AsyncMutex<()>>>> }

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub fn new() -> Self { Self { slots: Mutex::new(HashMap::new()) } }

    pub async fn lock(&self, key: &K) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if slots.len() > PRUNE_THRESHOLD {
                slots.retain(|_, slot| Arc::strong_count(slot) > 1);
            }
            slots.entry(key.clone()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
        };
        slot.lock_owned().await
    }
}

impl<K: Eq + Hash + Clone> Default for KeyedLocks<K> {
    fn default() -> Self { Self::new() }
}
