//! Per-key serialization of read-modify-write sequences.
//!
//! Each identity key gets its own fair (FIFO) async mutex, created on first
//! contention and dropped by whoever releases it last. Callers for distinct
//! keys never touch the same lock; the map shard is only held while looking
//! the slot up, never across an `.await`.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Default)]
pub struct KeySerializer {
    slots: DashMap<String, Arc<Mutex<()>>>,
}

// A caller's claim on a key's slot. Holding one keeps the slot in the map;
// the last claim to drop removes it.
struct Slot<'a> {
    owner: &'a KeySerializer,
    key: String,
    lock: Arc<Mutex<()>>,
}

impl Drop for Slot<'_> {
    fn drop(&mut self) {
        // Only the map and this claim reference the lock: nobody is queued
        // behind us, so the slot can go. A slot replaced by `clear()` is left alone.
        self.owner.slots.remove_if(&self.key, |_, tail| {
            Arc::ptr_eq(tail, &self.lock) && Arc::strong_count(tail) == 2
        });
    }
}

/// Exclusive turn for one key. Released when dropped, on every exit path
/// (return, panic, or the owning future being cancelled).
pub struct KeyTurn<'a> {
    // field order matters: the guard must release before the slot cleans up
    _guard: OwnedMutexGuard<()>,
    _slot: Slot<'a>,
}

impl KeySerializer {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &str) -> Slot<'_> {
        let lock = Arc::clone(self.slots.entry(key.to_string()).or_default().value());
        Slot {
            owner: self,
            key: key.to_string(),
            lock,
        }
    }

    /// Wait for this key's turn. Waiters for the same key are served in
    /// arrival order.
    pub async fn acquire(&self, key: &str) -> KeyTurn<'_> {
        let slot = self.slot(key);
        let guard = Arc::clone(&slot.lock).lock_owned().await;
        KeyTurn {
            _guard: guard,
            _slot: slot,
        }
    }

    /// Run `critical` while holding the key's turn.
    pub async fn run<T>(&self, key: &str, critical: impl FnOnce() -> T) -> T {
        let _turn = self.acquire(key).await;
        critical()
    }

    // Number of keys that currently have a holder or waiters
    pub fn pending(&self) -> usize {
        self.slots.len()
    }

    /// Forget every slot. Turns already held or queued keep their own lock;
    /// new callers start fresh chains.
    pub fn clear(&self) {
        self.slots.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn slots_are_removed_after_use() {
        let serializer = KeySerializer::new();

        let value = serializer.run("a", || 7).await;
        assert_eq!(value, 7);
        assert_eq!(serializer.pending(), 0);

        {
            let _turn = serializer.acquire("b").await;
            assert_eq!(serializer.pending(), 1);
        }
        assert_eq!(serializer.pending(), 0);
    }

    #[tokio::test]
    async fn distinct_keys_do_not_block_each_other() {
        let serializer = KeySerializer::new();
        let _held = serializer.acquire("a").await;

        let other = timeout(Duration::from_millis(200), serializer.acquire("b")).await;
        assert!(other.is_ok());
    }

    #[tokio::test]
    async fn same_key_waits_for_holder() {
        let serializer = KeySerializer::new();
        let held = serializer.acquire("a").await;

        let blocked = timeout(Duration::from_millis(50), serializer.acquire("a")).await;
        assert!(blocked.is_err());

        drop(held);
        let turn = timeout(Duration::from_millis(200), serializer.acquire("a")).await;
        assert!(turn.is_ok());
    }

    #[tokio::test]
    async fn waiters_run_in_arrival_order() {
        let serializer = Arc::new(KeySerializer::new());
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let held = serializer.acquire("k").await;

        let mut handles = Vec::new();
        for id in 0..4 {
            let serializer = Arc::clone(&serializer);
            let order = Arc::clone(&order);
            handles.push(tokio::spawn(async move {
                serializer
                    .run("k", || order.lock().unwrap().push(id))
                    .await;
            }));
            // let the task reach the queue before spawning the next one
            tokio::task::yield_now().await;
        }

        drop(held);
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(serializer.pending(), 0);
    }

    #[tokio::test]
    async fn panic_in_critical_section_releases_turn() {
        let serializer = Arc::new(KeySerializer::new());

        let fail: fn() = || panic!("admit failed");
        let task = {
            let serializer = Arc::clone(&serializer);
            tokio::spawn(async move {
                serializer.run("k", fail).await;
            })
        };
        let joined = task.await;
        assert!(joined.unwrap_err().is_panic());
        assert_eq!(serializer.pending(), 0);

        let next = timeout(Duration::from_millis(200), serializer.run("k", || 1)).await;
        assert_eq!(next.unwrap(), 1);
    }

    #[tokio::test]
    async fn cancelled_waiter_does_not_leak_slot() {
        let serializer = Arc::new(KeySerializer::new());
        let held = serializer.acquire("k").await;

        let waiter = {
            let serializer = Arc::clone(&serializer);
            tokio::spawn(async move {
                let _turn = serializer.acquire("k").await;
            })
        };
        tokio::task::yield_now().await;
        waiter.abort();
        let _ = waiter.await;

        drop(held);
        assert_eq!(serializer.pending(), 0);

        let next = timeout(Duration::from_millis(200), serializer.acquire("k")).await;
        assert!(next.is_ok());
    }

    #[tokio::test]
    async fn clear_does_not_disturb_held_turns() {
        let serializer = KeySerializer::new();
        let held = serializer.acquire("k").await;

        serializer.clear();
        assert_eq!(serializer.pending(), 0);

        // new chain for the same key
        let fresh = timeout(Duration::from_millis(200), serializer.acquire("k")).await;
        assert!(fresh.is_ok());
        drop(fresh);
        drop(held);
        assert_eq!(serializer.pending(), 0);
    }
}
