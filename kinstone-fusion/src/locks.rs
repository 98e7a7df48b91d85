//! Entry lock table
//!
//! Exclusive, in-process locks keyed by inventory entry id. A [`LockSet`] is
//! acquired before the unit of work opens its transaction and dropped after it
//! commits or rolls back, so lock scope covers exactly one transaction.
//!
//! Ids are always locked in ascending order regardless of the order the caller
//! supplied them. Two operations touching overlapping pairs therefore queue on
//! the same first lock instead of deadlocking.
//!
//! The table only serializes access. Whether an entry still exists, belongs to
//! the caller and is unlocked is decided by re-reading the store after the
//! locks are held.

use kinstone_common::{Error, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

type Slot = Arc<Mutex<()>>;

struct LockTable {
    slots: StdMutex<HashMap<Uuid, Slot>>,
    wait_timeout: Duration,
}

impl LockTable {
    fn slot(&self, id: Uuid) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(slots.entry(id).or_default())
    }

    /// Drop slots nobody is holding or waiting on
    fn prune(&self, ids: &[Uuid]) {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        for id in ids {
            if slots.get(id).is_some_and(|slot| Arc::strong_count(slot) == 1) {
                slots.remove(id);
            }
        }
    }
}

/// Shared handle to the entry lock table
#[derive(Clone)]
pub struct EntryLocks {
    table: Arc<LockTable>,
}

impl EntryLocks {
    pub fn new(wait_timeout: Duration) -> Self {
        Self {
            table: Arc::new(LockTable {
                slots: StdMutex::new(HashMap::new()),
                wait_timeout,
            }),
        }
    }

    /// Acquire exclusive access to every id, in ascending id order
    ///
    /// Duplicate ids are locked once. Fails with `Conflict` if any lock cannot
    /// be obtained within the configured wait; locks taken so far are released.
    pub async fn acquire(&self, ids: &[Uuid]) -> Result<LockSet> {
        let mut ordered = ids.to_vec();
        ordered.sort_unstable();
        ordered.dedup();

        let mut set = LockSet {
            table: Arc::clone(&self.table),
            held: Vec::with_capacity(ordered.len()),
        };

        for id in ordered {
            let slot = self.table.slot(id);
            let wait = self.table.wait_timeout;
            match tokio::time::timeout(wait, slot.lock_owned()).await {
                Ok(guard) => set.held.push((id, guard)),
                Err(_) => {
                    self.table.prune(&[id]);
                    tracing::debug!(entry_id = %id, "Timed out waiting for entry lock");
                    return Err(Error::Conflict(format!(
                        "timed out waiting for lock on entry {}",
                        id
                    )));
                }
            }
        }

        Ok(set)
    }

    /// Number of ids currently tracked (held or awaited)
    pub fn tracked(&self) -> usize {
        self.table
            .slots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

/// Locks held for one unit of work, released on drop
pub struct LockSet {
    table: Arc<LockTable>,
    held: Vec<(Uuid, OwnedMutexGuard<()>)>,
}

impl LockSet {
    /// Locked ids in acquisition (ascending) order
    pub fn ids(&self) -> Vec<Uuid> {
        self.held.iter().map(|(id, _)| *id).collect()
    }
}

impl Drop for LockSet {
    fn drop(&mut self) {
        let ids: Vec<Uuid> = self
            .held
            .drain(..)
            .map(|(id, guard)| {
                drop(guard);
                id
            })
            .collect();
        self.table.prune(&ids);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_acquires_in_ascending_order() {
        let locks = EntryLocks::new(Duration::from_secs(1));
        let mut a = Uuid::new_v4();
        let mut b = Uuid::new_v4();
        if a > b {
            std::mem::swap(&mut a, &mut b);
        }

        let set = locks.acquire(&[b, a]).await.unwrap();
        assert_eq!(set.ids(), vec![a, b]);
    }

    #[tokio::test]
    async fn test_duplicate_ids_locked_once() {
        let locks = EntryLocks::new(Duration::from_secs(1));
        let id = Uuid::new_v4();

        let set = locks.acquire(&[id, id]).await.unwrap();
        assert_eq!(set.ids(), vec![id]);
    }

    #[tokio::test]
    async fn test_held_lock_times_out_with_conflict() {
        let locks = EntryLocks::new(Duration::from_millis(50));
        let id = Uuid::new_v4();

        let _held = locks.acquire(&[id]).await.unwrap();
        let err = locks.acquire(&[id]).await.err().unwrap();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn test_released_on_drop_and_pruned() {
        let locks = EntryLocks::new(Duration::from_millis(50));
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        {
            let _set = locks.acquire(&[a, b]).await.unwrap();
            assert_eq!(locks.tracked(), 2);
        }

        assert_eq!(locks.tracked(), 0);
        assert!(locks.acquire(&[a, b]).await.is_ok());
    }

    #[tokio::test]
    async fn test_partial_acquire_released_on_timeout() {
        let locks = EntryLocks::new(Duration::from_millis(50));
        let mut a = Uuid::new_v4();
        let mut b = Uuid::new_v4();
        if a > b {
            std::mem::swap(&mut a, &mut b);
        }

        // Hold the higher id so the second acquire gets `a` then stalls on `b`
        let held = locks.acquire(&[b]).await.unwrap();
        assert!(locks.acquire(&[a, b]).await.is_err());

        // `a` must be free again
        let only_a = locks.acquire(&[a]).await;
        assert!(only_a.is_ok());
        drop(held);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_opposite_order_pairs_do_not_deadlock() {
        let locks = EntryLocks::new(Duration::from_secs(5));
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let completed = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for i in 0..50 {
            let locks = locks.clone();
            let completed = Arc::clone(&completed);
            handles.push(tokio::spawn(async move {
                let pair = if i % 2 == 0 { [a, b] } else { [b, a] };
                let _set = locks.acquire(&pair).await.unwrap();
                tokio::task::yield_now().await;
                completed.fetch_add(1, Ordering::SeqCst);
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(completed.load(Ordering::SeqCst), 50);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_mutual_exclusion() {
        let locks = EntryLocks::new(Duration::from_secs(5));
        let id = Uuid::new_v4();
        let inside = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..20 {
            let locks = locks.clone();
            let inside = Arc::clone(&inside);
            handles.push(tokio::spawn(async move {
                let _set = locks.acquire(&[id]).await.unwrap();
                assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                tokio::time::sleep(Duration::from_millis(1)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }
    }
}
