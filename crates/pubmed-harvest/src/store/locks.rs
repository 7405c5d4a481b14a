//! Per-identifier mutual exclusion.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OwnedMutexGuard;

type Slot = Arc<tokio::sync::Mutex<()>>;

/// One async lock per key, created on demand and dropped when unused.
///
/// Different keys never contend; holders of the same key are serialized.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    slots: Mutex<HashMap<String, Slot>>,
}

impl KeyedLocks {
    /// Empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`.
    pub async fn lock(self: &Arc<Self>, key: &str) -> KeyGuard {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(slots.entry(key.to_string()).or_default())
        };
        let guard = slot.lock_owned().await;
        KeyGuard { owner: Arc::clone(self), key: key.to_string(), guard: Some(guard) }
    }

    /// Keys with a live holder or waiter.
    #[must_use]
    pub fn active(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Held while working on one key. Releases on drop.
#[derive(Debug)]
pub struct KeyGuard {
    owner: Arc<KeyedLocks>,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        let mut slots = self.owner.slots.lock().unwrap_or_else(PoisonError::into_inner);
        // table + this guard: nobody else is waiting
        if slots.get(&self.key).is_some_and(|slot| Arc::strong_count(slot) <= 2) {
            slots.remove(&self.key);
        }
        drop(slots);
        self.guard.take();
    }
}
