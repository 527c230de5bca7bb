//! Caching proxy in front of a [`TokenIntrospector`].
//!
//! Under load the introspection endpoint must not be called for every
//! request, so results are cached per raw token for a short, write-based
//! TTL. Two independent expiry checks apply to a cached principal:
//!
//! 1. the cache TTL, enforced by the cache backend, after which the entry
//!    silently disappears and the next caller reloads it;
//! 2. the token's own `exp` claim, checked on every cache hit. A token past
//!    its expiry is never served from the cache: the entry is invalidated
//!    and the caller blocks on a fresh introspection.
//!
//! Loads are single-flight per token and never hold a cache-wide lock
//! while the upstream call is in flight.

use crate::cache::{create_cache, Cache, CacheBackend, CacheStats};
use crate::config::IntrospectionConfig;
use crate::errors::{ConfigError, IntrospectionError};
use crate::introspector::TokenIntrospector;
use crate::principal::Principal;
use crate::remote::RemoteIntrospector;
use crate::token::fingerprint;
use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info};
use std::sync::Arc;

pub struct CachingIntrospector<I> {
    delegate: Arc<I>,
    cache: Cache<Arc<Principal>>,
}

impl CachingIntrospector<RemoteIntrospector> {
    /// Build the remote introspector and its cache from configuration
    pub fn from_config(config: &IntrospectionConfig) -> Result<Self, ConfigError> {
        let delegate = RemoteIntrospector::from_config(config)?;
        let cache = create_cache(&config.cache)?;
        match cache {
            Cache::InMemory(_) => info!(
                "Caching introspection results in memory for {}s",
                config.cache.ttl
            ),
            Cache::Null(_) => info!("Introspection result caching is disabled"),
        }
        Ok(Self::new(delegate, cache))
    }
}

impl<I> CachingIntrospector<I>
where
    I: TokenIntrospector + 'static,
{
    pub fn new(delegate: I, cache: Cache<Arc<Principal>>) -> Self {
        Self {
            delegate: Arc::new(delegate),
            cache,
        }
    }

    /// Hit/miss statistics of the underlying cache
    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Drop any cached result for `token`
    pub async fn invalidate(&self, token: &str) {
        self.cache.delete(token).await;
    }

    /// Cached principal for `token`, loading it on a miss. Concurrent
    /// loads of one token share a single upstream call; failures are
    /// returned to every waiter and not cached.
    async fn load(&self, token: &str) -> Result<(Arc<Principal>, bool), IntrospectionError> {
        let delegate = Arc::clone(&self.delegate);
        let owned_token = token.to_string();
        let entry = self
            .cache
            .get_or_try_insert_with(token, async move {
                delegate.introspect(&owned_token).await.map(Arc::new)
            })
            .await
            .map_err(|e| IntrospectionError::clone(&e))?;
        let fresh = entry.is_fresh();
        Ok((entry.into_value(), fresh))
    }
}

#[async_trait]
impl<I> TokenIntrospector for CachingIntrospector<I>
where
    I: TokenIntrospector + 'static,
{
    async fn introspect(&self, token: &str) -> Result<Principal, IntrospectionError> {
        let (mut principal, fresh) = self.load(token).await?;

        // A principal loaded by this very call is the upstream's current
        // answer; only entries served from the cache are checked for expiry.
        if !fresh && principal.is_expired_at(Utc::now()) {
            debug!(
                "Cached principal for token {} is past its expiry, refreshing",
                fingerprint(token)
            );
            self.cache.record_stale_hit();
            let stale = Arc::clone(&principal);
            self.cache
                .delete_if(token, move |current| Arc::ptr_eq(current, &stale))
                .await;
            principal = self.load(token).await?.0;
        } else if !fresh {
            debug!("Cache hit for token {}", fingerprint(token));
        }

        Ok(principal.with_merged_authorities())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{memory::InMemoryCache, null::NullCache};
    use crate::errors::UpstreamError;
    use crate::test_utils::{active_claims, init_test_logger, MockIntrospector};
    use serde_json::json;
    use std::time::Duration;

    fn in_memory(ttl_secs: u64) -> Cache<Arc<Principal>> {
        Cache::InMemory(InMemoryCache::new(ttl_secs, 16).expect("Failed to create test cache"))
    }

    fn in_one_hour() -> i64 {
        Utc::now().timestamp() + 3600
    }

    #[tokio::test]
    async fn test_first_introspection_calls_upstream_once() {
        init_test_logger();
        let mock = MockIntrospector::new();
        mock.respond("token-a", Ok(active_claims(json!({ "sub": "a", "exp": in_one_hour() }))));
        mock.respond("token-b", Ok(active_claims(json!({ "sub": "b", "exp": in_one_hour() }))));
        let proxy = CachingIntrospector::new(mock.clone(), in_memory(60));

        assert_eq!(proxy.introspect("token-a").await.unwrap().subject(), Some("a"));
        assert_eq!(mock.calls("token-a"), 1);
        assert_eq!(proxy.introspect("token-b").await.unwrap().subject(), Some("b"));
        assert_eq!(mock.calls("token-b"), 1);
    }

    #[tokio::test]
    async fn test_cached_within_ttl_and_before_exp() {
        let mock = MockIntrospector::new();
        mock.respond(
            "token",
            Ok(active_claims(json!({
                "sub": "user-1",
                "exp": in_one_hour(),
                "scope": "profile",
                "ext": { "permissions": ["read:heart_rate"] }
            }))),
        );
        let proxy = CachingIntrospector::new(mock.clone(), in_memory(60));

        let first = proxy.introspect("token").await.unwrap();
        let second = proxy.introspect("token").await.unwrap();

        assert_eq!(mock.calls("token"), 1);
        assert_eq!(first.authorities(), second.authorities());
        assert_eq!(first, second);

        let stats = proxy.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
    }

    #[tokio::test]
    async fn test_merged_authorities_are_returned() {
        let mock = MockIntrospector::new();
        mock.respond(
            "token",
            Ok(active_claims(json!({
                "sub": "user-1",
                "scope": "profile",
                "ext": { "permissions": ["read:heart_rate"] }
            }))),
        );
        let proxy = CachingIntrospector::new(mock.clone(), in_memory(60));

        for _ in 0..2 {
            let principal = proxy.introspect("token").await.unwrap();
            let authorities: Vec<&str> =
                principal.authorities().iter().map(|a| a.as_str()).collect();
            assert_eq!(authorities, vec!["read:heart_rate", "SCOPE_profile"]);
            assert_eq!(principal.subject(), Some("user-1"));
        }
    }

    #[tokio::test]
    async fn test_ttl_expiry_triggers_one_reload() {
        let mock = MockIntrospector::new();
        mock.respond("token", Ok(active_claims(json!({ "sub": "user", "exp": in_one_hour() }))));
        let proxy = CachingIntrospector::new(mock.clone(), in_memory(1));

        proxy.introspect("token").await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        proxy.introspect("token").await.unwrap();
        assert_eq!(mock.calls("token"), 2);

        // Cached again after the reload
        proxy.introspect("token").await.unwrap();
        assert_eq!(mock.calls("token"), 2);
    }

    #[tokio::test]
    async fn test_expired_claim_refreshes_on_next_call() {
        init_test_logger();
        let mock = MockIntrospector::new();
        let five_seconds_ago = Utc::now().timestamp() - 5;
        mock.respond(
            "token",
            Ok(active_claims(json!({ "sub": "user", "exp": five_seconds_ago }))),
        );
        let proxy = CachingIntrospector::new(mock.clone(), in_memory(60));

        // Freshly fetched: returned as the upstream answered
        let first = proxy.introspect("token").await.unwrap();
        assert_eq!(first.subject(), Some("user"));
        assert_eq!(mock.calls("token"), 1);

        // Upstream now reports a renewed expiry
        let renewed = in_one_hour();
        mock.respond("token", Ok(active_claims(json!({ "sub": "user", "exp": renewed }))));

        // The stale entry is not served even though the TTL has not elapsed
        let second = proxy.introspect("token").await.unwrap();
        assert_eq!(mock.calls("token"), 2);
        assert_eq!(second.expires_at().unwrap().timestamp(), renewed);

        // The refreshed entry is cached
        proxy.introspect("token").await.unwrap();
        assert_eq!(mock.calls("token"), 2);

        // The rejected stale entry does not count as a hit
        let stats = proxy.stats();
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.stale_hits, 1);
        assert_eq!(stats.hits, 1);
    }

    #[tokio::test]
    async fn test_concurrent_callers_on_expired_entry_refresh_once() {
        init_test_logger();
        let mock = MockIntrospector::with_delay(Duration::from_millis(200));
        mock.respond(
            "token",
            Ok(active_claims(json!({ "sub": "user", "exp": Utc::now().timestamp() - 5 }))),
        );
        let proxy = Arc::new(CachingIntrospector::new(mock.clone(), in_memory(60)));
        proxy.introspect("token").await.unwrap();
        assert_eq!(mock.calls("token"), 1);

        let renewed = in_one_hour();
        mock.respond("token", Ok(active_claims(json!({ "sub": "user", "exp": renewed }))));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let proxy = Arc::clone(&proxy);
            handles.push(tokio::spawn(async move { proxy.introspect("token").await }));
        }
        for handle in handles {
            let principal = handle.await.unwrap().unwrap();
            assert_eq!(principal.expires_at().unwrap().timestamp(), renewed);
        }

        assert_eq!(mock.calls("token"), 2);
    }

    #[tokio::test]
    async fn test_failed_refresh_leaves_no_stale_entry() {
        let mock = MockIntrospector::new();
        mock.respond(
            "token",
            Ok(active_claims(json!({ "sub": "user", "exp": Utc::now().timestamp() - 5 }))),
        );
        let proxy = CachingIntrospector::new(mock.clone(), in_memory(60));
        proxy.introspect("token").await.unwrap();

        mock.respond("token", Err(IntrospectionError::invalid_token("Provided token isn't active")));
        let err = proxy.introspect("token").await.unwrap_err();
        assert!(err.is_invalid_token());
        assert_eq!(mock.calls("token"), 2);

        // Still failing, and nothing stale is resurrected
        let err = proxy.introspect("token").await.unwrap_err();
        assert!(err.is_invalid_token());
        assert_eq!(mock.calls("token"), 3);
    }

    #[tokio::test]
    async fn test_failed_refresh_propagates_upstream_error() {
        let mock = MockIntrospector::new();
        mock.respond(
            "token",
            Ok(active_claims(json!({ "sub": "user", "exp": Utc::now().timestamp() - 5 }))),
        );
        let proxy = CachingIntrospector::new(mock.clone(), in_memory(60));
        proxy.introspect("token").await.unwrap();

        mock.respond("token", Err(UpstreamError::Timeout.into()));
        let err = proxy.introspect("token").await.unwrap_err();
        assert_eq!(err, IntrospectionError::Upstream(UpstreamError::Timeout));
    }

    #[tokio::test]
    async fn test_invalid_token_is_not_cached() {
        let mock = MockIntrospector::new();
        mock.respond("revoked", Err(IntrospectionError::invalid_token("Provided token isn't active")));
        let proxy = CachingIntrospector::new(mock.clone(), in_memory(60));

        for expected_calls in 1..=3 {
            let err = proxy.introspect("revoked").await.unwrap_err();
            assert!(err.is_invalid_token());
            assert_eq!(mock.calls("revoked"), expected_calls);
        }
        assert_eq!(proxy.stats().load_failures, 3);
    }

    #[tokio::test]
    async fn test_upstream_error_is_not_cached() {
        let mock = MockIntrospector::new();
        mock.respond(
            "token",
            Err(UpstreamError::Status {
                status: 502,
                body: "bad gateway".to_string(),
            }
            .into()),
        );
        let proxy = CachingIntrospector::new(mock.clone(), in_memory(60));
        assert!(proxy.introspect("token").await.unwrap_err().is_retryable());

        mock.respond("token", Ok(active_claims(json!({ "sub": "user" }))));
        assert_eq!(proxy.introspect("token").await.unwrap().subject(), Some("user"));
        assert_eq!(mock.calls("token"), 2);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_upstream_call() {
        let mock = MockIntrospector::with_delay(Duration::from_millis(200));
        mock.respond("token", Ok(active_claims(json!({ "sub": "user", "exp": in_one_hour() }))));
        let proxy = Arc::new(CachingIntrospector::new(mock.clone(), in_memory(60)));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let proxy = Arc::clone(&proxy);
            handles.push(tokio::spawn(async move { proxy.introspect("token").await }));
        }

        let mut principals = Vec::new();
        for handle in handles {
            principals.push(handle.await.unwrap().unwrap());
        }
        assert!(principals.windows(2).all(|pair| pair[0] == pair[1]));
        assert_eq!(mock.calls("token"), 1);
    }

    #[tokio::test]
    async fn test_unrelated_tokens_load_concurrently() {
        let mock = MockIntrospector::with_delay(Duration::from_millis(500));
        mock.respond("token-a", Ok(active_claims(json!({ "sub": "a" }))));
        mock.respond("token-b", Ok(active_claims(json!({ "sub": "b" }))));
        let proxy = Arc::new(CachingIntrospector::new(mock.clone(), in_memory(60)));

        let started = std::time::Instant::now();
        let (a, b) = tokio::join!(proxy.introspect("token-a"), proxy.introspect("token-b"));
        assert_eq!(a.unwrap().subject(), Some("a"));
        assert_eq!(b.unwrap().subject(), Some("b"));
        // Two sequential loads would take at least a second
        assert!(started.elapsed() < Duration::from_millis(950));
    }

    #[tokio::test]
    async fn test_invalidate_forces_reload() {
        let mock = MockIntrospector::new();
        mock.respond("token", Ok(active_claims(json!({ "sub": "user" }))));
        let proxy = CachingIntrospector::new(mock.clone(), in_memory(60));

        proxy.introspect("token").await.unwrap();
        proxy.invalidate("token").await;
        proxy.introspect("token").await.unwrap();
        assert_eq!(mock.calls("token"), 2);
    }

    #[tokio::test]
    async fn test_null_cache_always_calls_upstream() {
        let mock = MockIntrospector::new();
        mock.respond("token", Ok(active_claims(json!({ "sub": "user", "exp": in_one_hour() }))));
        let proxy = CachingIntrospector::new(mock.clone(), Cache::Null(NullCache::new()));

        proxy.introspect("token").await.unwrap();
        proxy.introspect("token").await.unwrap();
        assert_eq!(mock.calls("token"), 2);
        assert_eq!(proxy.stats().hits, 0);
    }
}
