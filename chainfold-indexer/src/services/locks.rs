//! Per-entity locks serializing reductions of the same id

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

/// One mutex per entity key; different keys never contend
#[derive(Default)]
pub struct EntityLocks {
    locks: RwLock<HashMap<String, Arc<Mutex<()>>>>,
}

impl EntityLocks {
    pub fn new() -> Self {
        Self::default()
    }

    async fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        {
            let locks = self.locks.read().await;
            if let Some(lock) = locks.get(key) {
                return lock.clone();
            }
        }

        let mut locks = self.locks.write().await;
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Wait for exclusive access to `key`
    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        self.lock_for(key).await.lock_owned().await
    }

    /// Drop locks nobody holds or waits on
    pub async fn prune(&self) {
        let mut locks = self.locks.write().await;
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    pub async fn len(&self) -> usize {
        self.locks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.locks.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_is_exclusive() {
        let locks = Arc::new(EntityLocks::new());
        let guard = locks.acquire("a").await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire("a").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_block() {
        let locks = EntityLocks::new();
        let _a = locks.acquire("a").await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.acquire("b")).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_prune_keeps_held_locks() {
        let locks = EntityLocks::new();
        let held = locks.acquire("held").await;
        drop(locks.acquire("released").await);

        locks.prune().await;
        assert_eq!(locks.len().await, 1);
        drop(held);
        locks.prune().await;
        assert!(locks.is_empty().await);
    }
}
