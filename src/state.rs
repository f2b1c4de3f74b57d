use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

const PRUNE_THRESHOLD: usize = 1024;

/// Per-key async locks that serialise writers targeting the same row.
#[derive(Default)]
pub struct KeyLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    pub async fn acquire(&self, key: impl Into<String>) -> OwnedMutexGuard<()> {
        if self.locks.len() > PRUNE_THRESHOLD {
            self.prune();
        }

        let lock = self
            .locks
            .entry(key.into())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone();

        lock.lock_owned().await
    }

    /// Drops locks nobody holds or waits on.
    pub fn prune(&self) {
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn same_key_is_exclusive() {
        tokio_test::block_on(async {
            let locks = KeyLocks::new();
            let guard = locks.acquire("signal:1001").await;

            let second = tokio::time::timeout(Duration::from_millis(20), locks.acquire("signal:1001")).await;
            assert!(second.is_err());

            drop(guard);
            let third = tokio::time::timeout(Duration::from_millis(20), locks.acquire("signal:1001")).await;
            assert!(third.is_ok());
        });
    }

    #[test]
    fn different_keys_do_not_block() {
        tokio_test::block_on(async {
            let locks = KeyLocks::new();
            let _a = locks.acquire("signal:1").await;
            let b = tokio::time::timeout(Duration::from_millis(20), locks.acquire("signal:2")).await;
            assert!(b.is_ok());
        });
    }

    #[test]
    fn prune_keeps_held_locks() {
        tokio_test::block_on(async {
            let locks = KeyLocks::new();
            let held = locks.acquire("held").await;
            drop(locks.acquire("released").await);
            assert_eq!(locks.len(), 2);

            locks.prune();
            assert_eq!(locks.len(), 1);
            drop(held);

            locks.prune();
            assert!(locks.is_empty());
        });
    }
}
