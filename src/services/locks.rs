use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::rating::ItemId;

const PRUNE_THRESHOLD: usize = 1024;

/// One async mutex per item, created on first use.
///
/// Holding the guard serializes every read-recompute-write for that item;
/// different items never contend.
#[derive(Debug, Default)]
pub struct ItemLocks {
    locks: Mutex<HashMap<ItemId, Arc<AsyncMutex<()>>>>,
}

impl ItemLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, item_id: ItemId) -> OwnedMutexGuard<()> {
        let lock = self.lock_for(item_id);
        lock.lock_owned().await
    }

    fn lock_for(&self, item_id: ItemId) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks.len() >= PRUNE_THRESHOLD {
            // Only the table holds these, so nobody is waiting on them.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        Arc::clone(locks.entry(item_id).or_default())
    }

    pub fn tracked(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
