use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

/// Idle owner locks are pruned once the map grows past this many entries
const LOCK_PRUNE_THRESHOLD: usize = 1024;

/// One async mutex per owner, created on demand.
///
/// Every service that writes an owner's items or aggregate shares one
/// instance, so creation, updates, deletion and rebuilds for the same owner
/// queue up behind each other while different owners proceed independently.
#[derive(Default)]
pub struct OwnerLocks {
    locks: Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
}

impl OwnerLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for the owner's lock. Writes are serialised until the guard drops.
    pub async fn acquire(&self, owner_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if locks.len() > LOCK_PRUNE_THRESHOLD {
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            locks.entry(owner_id).or_default().clone()
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().map(|locks| locks.len()).unwrap_or(0)
    }
}
