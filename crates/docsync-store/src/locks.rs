//! Per-object write serialization.
//!
//! The reconciler holds the guard of an object's remote id for the whole of
//! a reconciliation step, so two events about the same object never
//! interleave their store writes. Entries are weak and vanish once the last
//! guard for an id is dropped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use docsync_core::RemoteId;

/// Guard returned by [`ObjectLocks::lock`].
pub type ObjectGuard = OwnedMutexGuard<()>;

/// Table of per-object async locks keyed by remote id.
#[derive(Default)]
pub struct ObjectLocks {
    locks: Mutex<HashMap<RemoteId, Weak<AsyncMutex<()>>>>,
}

impl ObjectLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `id`.
    pub async fn lock(&self, id: &RemoteId) -> ObjectGuard {
        let mutex = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.retain(|_, weak| weak.strong_count() > 0);
            match locks.get(id).and_then(Weak::upgrade) {
                Some(existing) => existing,
                None => {
                    let fresh = Arc::new(AsyncMutex::new(()));
                    locks.insert(id.clone(), Arc::downgrade(&fresh));
                    fresh
                }
            }
        };
        mutex.lock_owned().await
    }

    /// Number of ids with a live guard or waiter.
    pub fn active(&self) -> usize {
        let locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.values().filter(|w| w.strong_count() > 0).count()
    }
}
