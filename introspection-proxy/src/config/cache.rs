use crate::cache::CacheError;
use confique::Config;
use std::str::FromStr;

/// Specifies which cache store implementation to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheStore {
    #[default]
    InMemory,
    None,
}

impl FromStr for CacheStore {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "in-memory" | "memory" | "" => Ok(Self::InMemory),
            "none" => Ok(Self::None),
            other => Err(CacheError::Config(format!(
                "Unknown cache store '{other}', expected 'in-memory' or 'none'"
            ))),
        }
    }
}

/// Configuration for the introspection result cache
#[derive(Debug, Config, Clone)]
pub struct CacheConfig {
    /// Write-based TTL of cached introspection results in seconds (default: 10).
    /// Keep it short relative to token lifetimes; 0 disables caching.
    #[config(env = "INTROSPECTION_CACHE_TTL", default = 10)]
    pub ttl: u64,

    /// Cache store type: "in-memory" (default) or "none"
    #[config(env = "INTROSPECTION_CACHE_STORE", default = "in-memory")]
    pub store: String,

    /// Maximum in-memory capacity in MiB (default: 64)
    #[config(env = "INTROSPECTION_CACHE_CAPACITY", default = 64)]
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: 10,
            store: "in-memory".to_string(),
            capacity: 64,
        }
    }
}

impl CacheConfig {
    /// Get the configured store, falling back to no caching when the TTL is zero
    pub fn store(&self) -> Result<CacheStore, CacheError> {
        let store = self.store.parse::<CacheStore>()?;
        if self.ttl == 0 {
            return Ok(CacheStore::None);
        }
        Ok(store)
    }
}
