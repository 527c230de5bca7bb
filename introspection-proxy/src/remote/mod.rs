//! Client for a remote OAuth 2.0 token introspection endpoint (RFC 7662)

pub mod decorators;
mod response;

pub use decorators::{decorators_for, ApiKeyHeader, BasicAuth, RequestDecorator, API_KEY_HEADER};
pub(crate) use response::into_principal;
pub use response::SCOPE_AUTHORITY_PREFIX;

use crate::config::IntrospectionConfig;
use crate::errors::{ConfigError, IntrospectionError, UpstreamError};
use crate::introspector::TokenIntrospector;
use crate::principal::Principal;
use crate::token::fingerprint;
use async_trait::async_trait;
use http::header::{ACCEPT, HeaderMap, HeaderValue};
use log::{debug, warn};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use url::Url;

/// Performs the actual network call to the introspection endpoint
pub struct RemoteIntrospector {
    client: Client,
    uri: Url,
    decorators: Vec<Box<dyn RequestDecorator>>,
}

impl RemoteIntrospector {
    pub fn new(client: Client, uri: Url, decorators: Vec<Box<dyn RequestDecorator>>) -> Self {
        Self {
            client,
            uri,
            decorators,
        }
    }

    /// Build an introspector with its own HTTP client from configuration
    pub fn from_config(config: &IntrospectionConfig) -> Result<Self, ConfigError> {
        let uri = config.validated_uri()?;
        config.validate_timeouts()?;
        let client = Self::create_client(config.timeout, config.connect_timeout)?;
        let decorators = decorators_for(config)?;
        debug!(
            "Introspection endpoint {} with {} authentication mechanism(s)",
            uri,
            decorators.len()
        );
        Ok(Self::new(client, uri, decorators))
    }

    fn create_client(timeout: u64, connect_timeout: u64) -> Result<Client, ConfigError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        Ok(Client::builder()
            .timeout(Duration::from_secs(timeout))
            .connect_timeout(Duration::from_secs(connect_timeout))
            .default_headers(headers)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Some(Duration::from_secs(90)))
            .build()?)
    }

    async fn send(&self, token: &str) -> Result<Value, UpstreamError> {
        let mut request = self
            .client
            .post(self.uri.clone())
            .form(&[("token", token), ("token_type_hint", "access_token")])
            .build()?;
        for decorator in &self.decorators {
            decorator.decorate(&mut request);
        }

        let response = self.client.execute(request).await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes)
            .map_err(|e| UpstreamError::MalformedResponse(format!("JSON parse error: {e}")))
    }
}

#[async_trait]
impl TokenIntrospector for RemoteIntrospector {
    async fn introspect(&self, token: &str) -> Result<Principal, IntrospectionError> {
        if token.trim().is_empty() {
            return Err(IntrospectionError::invalid_token("Token is empty"));
        }

        let token_id = fingerprint(token);
        debug!("Introspecting token {}", token_id);

        let body = self.send(token).await.map_err(|e| {
            warn!("Introspection of token {} failed: {}", token_id, e);
            IntrospectionError::from(e)
        })?;

        let principal = into_principal(body)?;
        debug!(
            "Token {} is active for '{}' with {} authorities",
            token_id,
            principal.name().unwrap_or("<unknown>"),
            principal.authorities().len()
        );
        Ok(principal)
    }
}
