/// TTL Cache - Single-Flight Lookup Cache for Chain Clients
///
/// Keeps the results of hot, expensive or rate-limited RPC lookups for a fixed
/// duration. Concurrent lookups of the same key share one in-flight request:
/// the first caller starts the fetch, every later caller awaits the same
/// shared future and receives the same result. Failures are never cached.
///
/// The lock is only held while inspecting or updating the slot map, never
/// across an `.await`.

use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::error::ClientError;

type SharedFetch<V> = Shared<BoxFuture<'static, Result<V, ClientError>>>;

enum Slot<V: Clone> {
    Ready { value: V, expires_at: Instant },
    InFlight { id: u64, fetch: SharedFetch<V> },
}

/// Counters exposed for diagnostics and tests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Lookups that joined an already running fetch
    pub coalesced: u64,
    pub entries: usize,
}

pub struct TtlCache<K, V: Clone> {
    name: &'static str,
    ttl: Duration,
    slots: Mutex<HashMap<K, Slot<V>>>,
    next_id: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(name: &'static str, ttl: Duration) -> Self {
        log::debug!("Initializing {} cache (ttl {:?})", name, ttl);
        Self {
            name,
            ttl,
            slots: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the cached value for `key`, or run `fetch` once for all concurrent callers
    pub async fn get_or_fetch<F, Fut>(&self, key: K, fetch: F) -> Result<V, ClientError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, ClientError>> + Send + 'static,
    {
        let (id, shared) = {
            let mut slots = self.slots.lock();
            match slots.get(&key) {
                Some(Slot::Ready { value, expires_at }) if *expires_at > Instant::now() => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    log::debug!("{} cache hit: {:?}", self.name, key);
                    return Ok(value.clone());
                }
                Some(Slot::InFlight { id, fetch }) => {
                    self.coalesced.fetch_add(1, Ordering::Relaxed);
                    log::debug!("{} cache joining in-flight lookup: {:?}", self.name, key);
                    (*id, fetch.clone())
                }
                _ => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    log::debug!("{} cache miss: {:?}", self.name, key);
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    let shared = fetch().boxed().shared();
                    slots.insert(
                        key.clone(),
                        Slot::InFlight {
                            id,
                            fetch: shared.clone(),
                        },
                    );
                    (id, shared)
                }
            }
        };

        let result = shared.await;

        // Whoever finishes first settles the slot; later waiters see it settled.
        let mut slots = self.slots.lock();
        let still_in_flight =
            matches!(slots.get(&key), Some(Slot::InFlight { id: current, .. }) if *current == id);
        if still_in_flight {
            match &result {
                Ok(value) => {
                    slots.insert(
                        key,
                        Slot::Ready {
                            value: value.clone(),
                            expires_at: Instant::now() + self.ttl,
                        },
                    );
                }
                Err(e) => {
                    log::debug!("{} lookup failed, not caching: {}", self.name, e);
                    slots.remove(&key);
                }
            }
        }

        result
    }

    /// Drop a single entry (e.g. after a broadcast spends cached outputs)
    pub fn invalidate(&self, key: &K) {
        self.slots.lock().remove(key);
    }

    pub fn clear(&self) {
        self.slots.lock().clear();
    }

    /// Remove expired entries; in-flight lookups are kept
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut slots = self.slots.lock();
        let before = slots.len();
        slots.retain(|_, slot| match slot {
            Slot::Ready { expires_at, .. } => *expires_at > now,
            Slot::InFlight { .. } => true,
        });
        let purged = before - slots.len();
        if purged > 0 {
            log::debug!("{} cache purged {} expired entries", self.name, purged);
        }
        purged
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            entries: self.slots.lock().len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn counting_fetch(
        counter: &Arc<AtomicU64>,
        value: u64,
    ) -> impl FnOnce() -> BoxFuture<'static, Result<u64, ClientError>> {
        let counter = counter.clone();
        move || {
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(value)
            }
            .boxed()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_identical_lookups_share_one_fetch() {
        let cache: TtlCache<String, u64> = TtlCache::new("test", Duration::from_secs(60));
        let calls = Arc::new(AtomicU64::new(0));

        let (a, b, c) = tokio::join!(
            cache.get_or_fetch("utxo:addr".to_string(), counting_fetch(&calls, 7)),
            cache.get_or_fetch("utxo:addr".to_string(), counting_fetch(&calls, 8)),
            cache.get_or_fetch("utxo:addr".to_string(), counting_fetch(&calls, 9)),
        );

        assert_eq!((a.unwrap(), b.unwrap(), c.unwrap()), (7, 7, 7));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.coalesced, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_after_ttl() {
        let cache: TtlCache<&'static str, u64> = TtlCache::new("test", Duration::from_secs(60));
        let calls = Arc::new(AtomicU64::new(0));

        cache.get_or_fetch("k", counting_fetch(&calls, 1)).await.unwrap();
        assert_eq!(cache.get_or_fetch("k", counting_fetch(&calls, 2)).await.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(cache.get_or_fetch("k", counting_fetch(&calls, 2)).await.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let cache: TtlCache<&'static str, u64> = TtlCache::new("test", Duration::from_secs(60));

        let err = cache
            .get_or_fetch("k", || async { Err(ClientError::Transport("boom".into())) })
            .await
            .unwrap_err();
        assert_eq!(err, ClientError::Transport("boom".into()));
        assert_eq!(cache.stats().entries, 0);

        let value = cache.get_or_fetch("k", || async { Ok(3) }).await.unwrap();
        assert_eq!(value, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_and_purge() {
        let cache: TtlCache<&'static str, u64> = TtlCache::new("test", Duration::from_secs(10));
        cache.get_or_fetch("a", || async { Ok(1) }).await.unwrap();
        cache.get_or_fetch("b", || async { Ok(2) }).await.unwrap();

        cache.invalidate(&"a");
        assert_eq!(cache.stats().entries, 1);

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.stats().entries, 0);
    }
}
