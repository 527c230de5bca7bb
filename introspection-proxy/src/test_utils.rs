use crate::errors::IntrospectionError;
use crate::introspector::TokenIntrospector;
use crate::principal::Principal;
use crate::remote::into_principal;
use async_trait::async_trait;
use log::LevelFilter;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Initializes the test logger at debug level.
///
/// Safe to call from every test; only the first call installs the logger.
pub fn init_test_logger() {
    let _ = env_logger::builder()
        .filter_level(LevelFilter::Debug)
        .is_test(true)
        .try_init();
}

/// Adds `"active": true` to an introspection response body
pub fn active_claims(mut claims: Value) -> Value {
    if let Value::Object(map) = &mut claims {
        map.insert("active".to_string(), Value::Bool(true));
    }
    claims
}

/// Scripted introspector that counts how often each token is introspected.
///
/// Clones share responses and counters, so a test can keep a handle while
/// the proxy owns another one.
///
/// # Examples
///
/// ```rust,ignore
/// let mock = MockIntrospector::new();
/// mock.respond("token", Ok(active_claims(json!({ "sub": "user" }))));
/// let proxy = CachingIntrospector::new(mock.clone(), cache);
/// proxy.introspect("token").await.unwrap();
/// assert_eq!(mock.calls("token"), 1);
/// ```
#[derive(Clone, Default)]
pub struct MockIntrospector {
    responses: Arc<Mutex<HashMap<String, Result<Value, IntrospectionError>>>>,
    calls: Arc<Mutex<HashMap<String, usize>>>,
    delay: Option<Duration>,
}

impl MockIntrospector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every introspection waits for `delay` before answering
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    /// Set the response for `token`, replacing any earlier one.
    ///
    /// `Ok` bodies go through the same interpretation as real responses.
    pub fn respond(&self, token: &str, response: Result<Value, IntrospectionError>) {
        self.responses
            .lock()
            .unwrap()
            .insert(token.to_string(), response);
    }

    /// Number of introspections of `token` so far
    pub fn calls(&self, token: &str) -> usize {
        self.calls.lock().unwrap().get(token).copied().unwrap_or(0)
    }
}

#[async_trait]
impl TokenIntrospector for MockIntrospector {
    async fn introspect(&self, token: &str) -> Result<Principal, IntrospectionError> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(token.to_string())
            .or_insert(0) += 1;

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let response = self.responses.lock().unwrap().get(token).cloned();
        match response {
            Some(Ok(body)) => into_principal(body),
            Some(Err(err)) => Err(err),
            None => Err(IntrospectionError::invalid_token("Unknown token")),
        }
    }
}
