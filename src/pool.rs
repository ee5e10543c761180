//! Connection Pool: a keyed LRU cache with TTL, disposal hooks, and
//! single-flight coalescing of concurrent `acquire` calls on the same key.
//!
//! The LRU bookkeeping itself is synchronous (`lru::LruCache` guarded by a
//! blocking-free `tokio::sync::Mutex`); disposal is asynchronous and
//! best-effort on eviction, but `clear()` awaits every outstanding disposal
//! before returning, per §4.3 and §9's "LRU cache with async disposal" note.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use lru::LruCache;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Default pool capacity (§4.3).
pub const DEFAULT_CAPACITY: usize = 10;
/// Default entry TTL: 30 minutes (§4.3).
pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 60);

struct Entry<V> {
    value: V,
    #[allow(dead_code)]
    created_at: Instant,
    last_used_at: Instant,
}

type Disposal<V> = Arc<dyn Fn(V) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// A keyed LRU of values with TTL and a disposal hook invoked on eviction or
/// expiry. Factories for the same key are coalesced so that at most one
/// factory for a given key runs at a time (P3); factories for different
/// keys run independently.
pub struct ConnectionPool<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    capacity: usize,
    ttl: Duration,
    disposal: Disposal<V>,
    entries: Mutex<LruCache<K, Entry<V>>>,
    key_locks: Mutex<HashMap<K, Arc<Mutex<()>>>>,
    outstanding: Mutex<Vec<JoinHandle<()>>>,
    accepting: std::sync::atomic::AtomicBool,
}

impl<K, V> ConnectionPool<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new<F, Fut>(capacity: usize, ttl: Duration, disposal: F) -> Self
    where
        F: Fn(V) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let capacity = capacity.max(1);
        Self {
            capacity,
            ttl,
            disposal: Arc::new(move |v| Box::pin(disposal(v))),
            entries: Mutex::new(LruCache::new(std::num::NonZeroUsize::new(capacity).unwrap())),
            key_locks: Mutex::new(HashMap::new()),
            outstanding: Mutex::new(Vec::new()),
            accepting: std::sync::atomic::AtomicBool::new(true),
        }
    }

    async fn key_lock(&self, key: &K) -> Arc<Mutex<()>> {
        let mut locks = self.key_locks.lock().await;
        locks.entry(key.clone()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Returns a live value for `key`, creating it via `factory` on a miss
    /// or TTL expiry. Concurrent callers for the same key share one
    /// in-flight factory call; callers for other keys are never blocked by
    /// it.
    pub async fn acquire<F, Fut, E>(&self, key: K, factory: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let lock = self.key_lock(&key).await;
        let _guard = lock.lock().await;

        {
            let mut entries = self.entries.lock().await;
            if let Some(entry) = entries.get_mut(&key) {
                if entry.last_used_at.elapsed() <= self.ttl {
                    entry.last_used_at = Instant::now();
                    return Ok(entry.value.clone());
                }
            }
            if let Some(stale) = entries.pop(&key) {
                self.spawn_disposal(stale.value).await;
            }
        }

        let value = factory().await?;

        let evicted = {
            let mut entries = self.entries.lock().await;
            let evicted = if entries.len() >= self.capacity && !entries.contains(&key) {
                entries.pop_lru()
            } else {
                None
            };
            entries.put(
                key,
                Entry {
                    value: value.clone(),
                    created_at: Instant::now(),
                    last_used_at: Instant::now(),
                },
            );
            evicted
        };
        if let Some((_, entry)) = evicted {
            self.spawn_disposal(entry.value).await;
        }

        Ok(value)
    }

    async fn spawn_disposal(&self, value: V) {
        let disposal = self.disposal.clone();
        let handle = tokio::spawn(async move {
            disposal(value).await;
        });
        self.outstanding.lock().await.push(handle);
    }

    /// Current number of live entries.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Evicts everything, disposing each entry, and awaits every disposal —
    /// both the ones just triggered and any still outstanding from earlier
    /// evictions.
    pub async fn clear(&self) {
        self.accepting.store(false, std::sync::atomic::Ordering::SeqCst);
        let drained: Vec<Entry<V>> = {
            let mut entries = self.entries.lock().await;
            let mut drained = Vec::new();
            while let Some((_, entry)) = entries.pop_lru() {
                drained.push(entry);
            }
            drained
        };
        for entry in drained {
            self.spawn_disposal(entry.value).await;
        }
        let handles: Vec<JoinHandle<()>> = {
            let mut outstanding = self.outstanding.lock().await;
            std::mem::take(&mut *outstanding)
        };
        for handle in handles {
            let _ = handle.await;
        }
        self.accepting.store(true, std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// **Scenario**: LRU eviction at capacity closes the coldest entry
    /// before the new one occupies its slot.
    #[tokio::test]
    async fn lru_eviction_disposes_coldest_entry() {
        let disposed: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
        let disposed_for_hook = disposed.clone();
        let pool: ConnectionPool<&'static str, &'static str> =
            ConnectionPool::new(2, Duration::from_secs(60), move |v| {
                let disposed = disposed_for_hook.clone();
                async move {
                    disposed.lock().await.push(v);
                }
            });

        pool.acquire("a", || async { Ok::<_, ()>("client-a") }).await.unwrap();
        pool.acquire("b", || async { Ok::<_, ()>("client-b") }).await.unwrap();
        pool.acquire("c", || async { Ok::<_, ()>("client-c") }).await.unwrap();

        pool.clear().await;
        assert_eq!(disposed.lock().await.as_slice(), &["client-a", "client-b", "client-c"]);
    }

    /// **Scenario**: concurrent acquires on the same key coalesce onto one
    /// factory invocation.
    #[tokio::test]
    async fn concurrent_acquire_same_key_runs_factory_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let pool: Arc<ConnectionPool<&'static str, u32>> =
            Arc::new(ConnectionPool::new(4, Duration::from_secs(60), |_| async {}));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let pool = pool.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                pool.acquire("k", || {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        Ok::<_, ()>(42)
                    }
                })
                .await
            }));
        }
        for h in handles {
            assert_eq!(h.await.unwrap(), Ok(42));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    /// **Scenario**: TTL expiry causes the next acquire to observe the
    /// entry absent and recreate it.
    #[tokio::test]
    async fn ttl_expiry_recreates_entry() {
        let pool: ConnectionPool<&'static str, u32> =
            ConnectionPool::new(4, Duration::from_millis(20), |_| async {});

        pool.acquire("k", || async { Ok::<_, ()>(1) }).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        let value = pool.acquire("k", || async { Ok::<_, ()>(2) }).await.unwrap();
        assert_eq!(value, 2);
    }
}
