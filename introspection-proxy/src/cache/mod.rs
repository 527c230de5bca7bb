use crate::config::{CacheConfig, CacheStore};
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

pub mod memory;
pub mod null;

/// Errors that can occur while setting up a cache
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Approximate in-memory size of a cached value in bytes, used to bound
/// the capacity of the in-memory cache.
pub trait CacheWeight {
    fn weight(&self) -> u32;
}

impl<T: CacheWeight> CacheWeight for Arc<T> {
    fn weight(&self) -> u32 {
        self.as_ref().weight()
    }
}

/// Value returned by [`CacheBackend::get_or_try_insert_with`]
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    value: V,
    fresh: bool,
}

impl<V> CacheEntry<V> {
    pub fn new(value: V, fresh: bool) -> Self {
        Self { value, fresh }
    }

    /// Whether the value was produced by this very call rather than
    /// served from the cache or from another caller's in-flight load
    pub fn is_fresh(&self) -> bool {
        self.fresh
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn into_value(self) -> V {
        self.value
    }
}

/// Expiring key/value cache.
///
/// This trait represents the contract that all cache backends must fulfill,
/// independently of what produces the cached values. Expiry and eviction
/// are the backend's business; callers only `get`, `set`, `delete` and load.
///
/// Implementations must be thread-safe (Send + Sync) and must not serialize
/// access to unrelated keys behind a single lock.
#[async_trait::async_trait]
pub trait CacheBackend<V>: Send + Sync
where
    V: Clone + Send + Sync + 'static,
{
    /// Retrieve a value from the cache
    async fn get(&self, key: &str) -> Option<V>;

    /// Store a value in the cache with the default TTL
    async fn set(&self, key: &str, value: V);

    /// Delete a value from the cache
    async fn delete(&self, key: &str);

    /// Atomically delete the value stored under `key` if `predicate` holds
    /// for it. Returns whether a value was removed.
    async fn delete_if<P>(&self, key: &str, predicate: P) -> bool
    where
        P: FnOnce(&V) -> bool + Send + 'static;

    /// Return the cached value, or run `init` and cache its result.
    ///
    /// Concurrent calls for the same key share a single `init` run. Errors
    /// are handed to every waiting caller and are never cached.
    async fn get_or_try_insert_with<F, E>(
        &self,
        key: &str,
        init: F,
    ) -> Result<CacheEntry<V>, Arc<E>>
    where
        F: Future<Output = Result<V, E>> + Send + 'static,
        E: Send + Sync + 'static;

    /// Reclassify the most recent hit as stale: the value was found but
    /// rejected by the caller and is about to be reloaded.
    fn record_stale_hit(&self);

    /// Snapshot of the cache statistics
    fn stats(&self) -> CacheStats;
}

/// Cache implementation that provides a uniform interface regardless of backend.
///
/// The concrete implementation is chosen at runtime based on the configuration.
#[derive(Clone)]
pub enum Cache<V> {
    /// In-memory cache implementation using Moka
    InMemory(memory::InMemoryCache<V>),
    /// No-op cache implementation that doesn't actually cache anything
    Null(null::NullCache<V>),
}

#[async_trait::async_trait]
impl<V> CacheBackend<V> for Cache<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Option<V> {
        match self {
            Self::InMemory(cache) => cache.get(key).await,
            Self::Null(cache) => cache.get(key).await,
        }
    }

    async fn set(&self, key: &str, value: V) {
        match self {
            Self::InMemory(cache) => cache.set(key, value).await,
            Self::Null(cache) => cache.set(key, value).await,
        }
    }

    async fn delete(&self, key: &str) {
        match self {
            Self::InMemory(cache) => cache.delete(key).await,
            Self::Null(cache) => cache.delete(key).await,
        }
    }

    async fn delete_if<P>(&self, key: &str, predicate: P) -> bool
    where
        P: FnOnce(&V) -> bool + Send + 'static,
    {
        match self {
            Self::InMemory(cache) => cache.delete_if(key, predicate).await,
            Self::Null(cache) => cache.delete_if(key, predicate).await,
        }
    }

    async fn get_or_try_insert_with<F, E>(
        &self,
        key: &str,
        init: F,
    ) -> Result<CacheEntry<V>, Arc<E>>
    where
        F: Future<Output = Result<V, E>> + Send + 'static,
        E: Send + Sync + 'static,
    {
        match self {
            Self::InMemory(cache) => cache.get_or_try_insert_with(key, init).await,
            Self::Null(cache) => cache.get_or_try_insert_with(key, init).await,
        }
    }

    fn record_stale_hit(&self) {
        match self {
            Self::InMemory(cache) => cache.record_stale_hit(),
            Self::Null(cache) => cache.record_stale_hit(),
        }
    }

    fn stats(&self) -> CacheStats {
        match self {
            Self::InMemory(cache) => cache.stats(),
            Self::Null(cache) => cache.stats(),
        }
    }
}

/// Factory function to create the appropriate cache implementation based on configuration.
pub fn create_cache<V>(config: &CacheConfig) -> Result<Cache<V>, CacheError>
where
    V: Clone + Send + Sync + CacheWeight + 'static,
{
    match config.store()? {
        CacheStore::InMemory => {
            let cache = memory::InMemoryCache::new(config.ttl, config.capacity)?;
            Ok(Cache::InMemory(cache))
        }
        CacheStore::None => Ok(Cache::Null(null::NullCache::new())),
    }
}

/// Point-in-time cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Lookups answered from the cache
    pub hits: u64,
    /// Lookups that found nothing and, for loads, ran the loader
    pub misses: u64,
    /// Lookups that found a value the caller rejected as stale. The
    /// reload that follows is counted as a miss.
    pub stale_hits: u64,
    /// Loads whose loader failed
    pub load_failures: u64,
    /// Entries removed by an explicit delete
    pub invalidations: u64,
    /// Entries removed because their TTL elapsed
    pub expirations: u64,
    /// Entries removed to stay under the capacity bound
    pub evictions: u64,
}

impl CacheStats {
    pub fn request_count(&self) -> u64 {
        self.hits + self.misses
    }

    /// Ratio of hits to requests, 1.0 when there were no requests
    pub fn hit_rate(&self) -> f64 {
        match self.request_count() {
            0 => 1.0,
            requests => self.hits as f64 / requests as f64,
        }
    }
}

/// Lock-free counters shared between a backend and its eviction listener
#[derive(Debug, Default)]
pub(crate) struct StatsCounter {
    hits: AtomicU64,
    misses: AtomicU64,
    stale_hits: AtomicU64,
    load_failures: AtomicU64,
    invalidations: AtomicU64,
    expirations: AtomicU64,
    evictions: AtomicU64,
}

impl StatsCounter {
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_stale_hit(&self) {
        let _ = self
            .hits
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |hits| {
                hits.checked_sub(1)
            });
        self.stale_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_load_failure(&self) {
        self.load_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_invalidation(&self) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_expiration(&self) {
        self.expirations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            stale_hits: self.stale_hits.load(Ordering::Relaxed),
            load_failures: self.load_failures.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}
