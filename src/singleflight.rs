//! Per-key single-flight lock registry
//!
//! Conversion is expensive (an external process spawn) and idempotent
//! per cache key; without per-key exclusion, N concurrent requests for
//! the same uncached subtitle would spawn N redundant processes racing
//! to write the same file. The registry hands out one binary lock per
//! key: the first acquirer does the work, every waiter then observes
//! the completed cache file.
//!
//! Entries are held as `Weak` references and reclaimed once no holder
//! or waiter keeps the lock alive, so memory stays bounded by the
//! number of in-flight keys rather than every key ever seen.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Scoped handle on a key's lock. Released on drop, on every exit path.
pub struct KeyGuard {
    _guard: OwnedMutexGuard<()>,
}

/// Process-wide map from cache key to its mutual-exclusion primitive.
#[derive(Default)]
pub struct LockRegistry {
    locks: DashMap<String, Weak<Mutex<()>>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    /// Acquire the lock for `key`, waiting if another task holds it.
    ///
    /// Cancellation-safe: dropping the returned future while it is
    /// still waiting releases nothing, performs no conversion work, and
    /// leaves the registry consistent. Note the asymmetry with the
    /// conversion watchdog: cancelling a waiter never affects the
    /// external process another task may be running for the same key.
    pub async fn acquire(&self, key: &str) -> KeyGuard {
        let lock = self.lock_for(key);
        let guard = lock.lock_owned().await;
        KeyGuard { _guard: guard }
    }

    /// Get or atomically install the lock for a key. Two concurrent
    /// first requests for the same key observe the same Arc.
    fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        let (lock, inserted) = match self.locks.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => match occupied.get().upgrade() {
                Some(lock) => (lock, false),
                None => {
                    // Last holder dropped between our lookup and now;
                    // install a fresh lock in place of the dead entry.
                    let fresh = Arc::new(Mutex::new(()));
                    occupied.insert(Arc::downgrade(&fresh));
                    (fresh, false)
                }
            },
            Entry::Vacant(vacant) => {
                let fresh = Arc::new(Mutex::new(()));
                vacant.insert(Arc::downgrade(&fresh));
                (fresh, true)
            }
        };
        // Purge only after the entry guard above is dropped: retain
        // takes every shard lock and must not run while one is held.
        if inserted {
            self.purge_dead();
        }
        lock
    }

    /// Drop map entries whose lock no longer has holders or waiters.
    fn purge_dead(&self) {
        self.locks.retain(|_, weak| weak.strong_count() > 0);
    }

    /// Number of keys with a live (held or awaited) lock.
    pub fn live_locks(&self) -> usize {
        self.locks
            .iter()
            .filter(|entry| entry.value().strong_count() > 0)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_is_exclusive() {
        let registry = Arc::new(LockRegistry::new());
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            let running = running.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                let _guard = registry.acquire("same-key").await;
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_distinct_keys_run_in_parallel() {
        let registry = Arc::new(LockRegistry::new());
        let guard_a = registry.acquire("a").await;
        // Acquiring a different key must not block.
        let guard_b = tokio::time::timeout(Duration::from_secs(1), registry.acquire("b"))
            .await
            .expect("distinct key blocked behind unrelated lock");
        drop(guard_a);
        drop(guard_b);
    }

    #[tokio::test]
    async fn test_concurrent_first_access_installs_one_lock() {
        let registry = Arc::new(LockRegistry::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                let _guard = registry.acquire("fresh-key").await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        // All tasks done, nothing held: the entry is dead or purged.
        assert_eq!(registry.live_locks(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_leaves_registry_consistent() {
        let registry = Arc::new(LockRegistry::new());
        let guard = registry.acquire("key").await;

        let waiter = {
            let registry = registry.clone();
            tokio::spawn(async move {
                let _guard = registry.acquire("key").await;
            })
        };
        tokio::task::yield_now().await;
        waiter.abort();
        let _ = waiter.await;

        drop(guard);
        // The key must still be acquirable after the cancelled wait.
        let _guard = tokio::time::timeout(Duration::from_secs(1), registry.acquire("key"))
            .await
            .expect("lock unusable after cancelled waiter");
    }

    #[tokio::test]
    async fn test_dead_entries_are_reclaimed() {
        let registry = LockRegistry::new();
        for i in 0..100 {
            let _guard = registry.acquire(&format!("key-{}", i)).await;
        }
        assert_eq!(registry.live_locks(), 0);
        // A fresh key triggers the purge of dead weak entries.
        let _guard = registry.acquire("one-more").await;
        assert!(registry.locks.len() <= 2);
    }
}
