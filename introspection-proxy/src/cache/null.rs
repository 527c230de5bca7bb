use super::{CacheBackend, CacheEntry, CacheStats, StatsCounter};
use async_trait::async_trait;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

/// NullCache is a cache implementation that stores nothing.
/// It is used when caching is disabled but the cache interface is still required.
#[derive(Debug)]
pub struct NullCache<V> {
    stats: Arc<StatsCounter>,
    _value: PhantomData<fn() -> V>,
}

impl<V> NullCache<V> {
    /// Create a new NullCache instance
    pub fn new() -> Self {
        NullCache {
            stats: Arc::new(StatsCounter::default()),
            _value: PhantomData,
        }
    }
}

impl<V> Default for NullCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Clone for NullCache<V> {
    fn clone(&self) -> Self {
        Self {
            stats: Arc::clone(&self.stats),
            _value: PhantomData,
        }
    }
}

#[async_trait]
impl<V> CacheBackend<V> for NullCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, _key: &str) -> Option<V> {
        self.stats.record_miss();
        None
    }

    async fn set(&self, _key: &str, _value: V) {}

    async fn delete(&self, _key: &str) {}

    async fn delete_if<P>(&self, _key: &str, _predicate: P) -> bool
    where
        P: FnOnce(&V) -> bool + Send + 'static,
    {
        false
    }

    async fn get_or_try_insert_with<F, E>(
        &self,
        _key: &str,
        init: F,
    ) -> Result<CacheEntry<V>, Arc<E>>
    where
        F: Future<Output = Result<V, E>> + Send + 'static,
        E: Send + Sync + 'static,
    {
        self.stats.record_miss();
        match init.await {
            Ok(value) => Ok(CacheEntry::new(value, true)),
            Err(err) => {
                self.stats.record_load_failure();
                Err(Arc::new(err))
            }
        }
    }

    fn record_stale_hit(&self) {
        self.stats.record_stale_hit();
    }

    fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }
}
