use super::{CacheBackend, CacheEntry, CacheError, CacheStats, CacheWeight, StatsCounter};
use async_trait::async_trait;
use moka::future::Cache as MokaCache;
use moka::notification::RemovalCause;
use moka::ops::compute::{CompResult, Op};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Longest TTL the moka builder accepts (1000 years)
const MAX_TTL_SECS: u64 = 1000 * 365 * 24 * 60 * 60;

#[derive(Clone)]
pub struct InMemoryCache<V> {
    cache: MokaCache<String, V>,
    stats: Arc<StatsCounter>,
}

impl<V> InMemoryCache<V>
where
    V: Clone + Send + Sync + CacheWeight + 'static,
{
    /// Initialize a new in-memory cache instance
    pub fn new(ttl_secs: u64, capacity_mib: usize) -> Result<Self, CacheError> {
        // Convert MiB to bytes for max_capacity (1 MiB = 1024 * 1024 bytes)
        let max_capacity_bytes = u64::try_from(capacity_mib)
            .ok()
            .and_then(|mib| mib.checked_mul(1024 * 1024))
            .ok_or_else(|| CacheError::Config(format!("Capacity overflow: {capacity_mib} MiB")))?;

        if ttl_secs > MAX_TTL_SECS {
            return Err(CacheError::Config(format!(
                "TTL of {ttl_secs}s exceeds the maximum of {MAX_TTL_SECS}s"
            )));
        }

        let stats = Arc::new(StatsCounter::default());
        let listener_stats = Arc::clone(&stats);

        let cache = MokaCache::builder()
            .time_to_live(Duration::from_secs(ttl_secs))
            .weigher(|key: &String, value: &V| -> u32 {
                let key_len: u32 = key.len().try_into().unwrap_or(u32::MAX);
                key_len.saturating_add(value.weight())
            })
            .max_capacity(max_capacity_bytes)
            .eviction_listener(move |_key, _value, cause| match cause {
                RemovalCause::Expired => listener_stats.record_expiration(),
                RemovalCause::Size => listener_stats.record_eviction(),
                _ => {}
            })
            .build();

        Ok(Self { cache, stats })
    }

    /// Number of entries, including ones not yet reclaimed after expiry
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Run pending housekeeping (expiry reclamation, eviction notifications)
    pub async fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks().await;
    }
}

#[async_trait]
impl<V> CacheBackend<V> for InMemoryCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Option<V> {
        let value = self.cache.get(key).await;
        if value.is_some() {
            self.stats.record_hit();
        } else {
            self.stats.record_miss();
        }
        value
    }

    async fn set(&self, key: &str, value: V) {
        self.cache.insert(key.to_string(), value).await;
    }

    async fn delete(&self, key: &str) {
        if self.cache.remove(key).await.is_some() {
            self.stats.record_invalidation();
        }
    }

    async fn delete_if<P>(&self, key: &str, predicate: P) -> bool
    where
        P: FnOnce(&V) -> bool + Send + 'static,
    {
        let result = self
            .cache
            .entry(key.to_string())
            .and_compute_with(|maybe_entry| {
                let op = match maybe_entry {
                    Some(entry) if predicate(entry.value()) => Op::Remove,
                    _ => Op::Nop,
                };
                std::future::ready(op)
            })
            .await;

        let removed = matches!(result, CompResult::Removed(_));
        if removed {
            self.stats.record_invalidation();
        }
        removed
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
        match self.cache.entry(key.to_string()).or_try_insert_with(init).await {
            Ok(entry) => {
                let fresh = entry.is_fresh();
                if fresh {
                    self.stats.record_miss();
                } else {
                    self.stats.record_hit();
                }
                Ok(CacheEntry::new(entry.into_value(), fresh))
            }
            Err(err) => {
                self.stats.record_miss();
                self.stats.record_load_failure();
                Err(err)
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
