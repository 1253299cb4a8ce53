//! Per-key locking so concurrent escalations on the same conversation (or
//! concurrent transitions on the same ticket) are applied one at a time.
//! Distinct keys proceed independently.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};

#[derive(Clone, Default)]
pub struct KeyLocks {
    locks: Arc<Mutex<HashMap<String, Arc<Semaphore>>>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire exclusive access to a key. The returned guard releases the
    /// lock when dropped.
    pub async fn acquire(&self, key: &str) -> KeyLockGuard {
        let sem = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Semaphore::new(1)))
                .clone()
        };

        let permit = sem.acquire_owned().await.expect("semaphore closed");
        KeyLockGuard { _permit: permit }
    }

    /// Drop semaphores nobody is holding or waiting on.
    pub async fn cleanup_unused(&self) {
        let mut locks = self.locks.lock().await;
        locks.retain(|_, sem| sem.available_permits() < 1);
    }
}

/// Guard that releases the key lock when dropped.
pub struct KeyLockGuard {
    _permit: OwnedSemaphorePermit,
}
