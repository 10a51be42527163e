use std::future::Future;
use std::hash::Hash;
use std::time::Duration;

use moka::future::Cache;

/// Async memoizing cache with per-instance TTL and bounded capacity.
///
/// Callers pass the computation explicitly (`get_or_compute`) so cache
/// participation stays visible at the call site. Only successful values
/// are stored; failures propagate and cache nothing. Concurrent misses
/// on the same key are collapsed into a single in-flight computation.
pub struct ExpiringCache<K, V> {
    inner: Cache<K, V>,
}

impl<K, V> ExpiringCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Return the live entry for `key`, or run `compute`, store its
    /// success, and return it.
    pub async fn get_or_compute<Fut, E>(&self, key: K, compute: Fut) -> Result<V, E>
    where
        Fut: Future<Output = Result<V, E>>,
        E: Clone + Send + Sync + 'static,
    {
        self.inner
            .try_get_with(key, compute)
            .await
            .map_err(|err| err.as_ref().clone())
    }

    pub async fn invalidate_all(&self) {
        self.inner.invalidate_all();
        self.inner.run_pending_tasks().await;
    }
}
