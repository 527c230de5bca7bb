//! Authentication mechanisms attached to outbound introspection requests

use crate::config::IntrospectionConfig;
use crate::errors::ConfigError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use http::header::{HeaderName, HeaderValue, AUTHORIZATION};
use std::fmt;

/// Header carrying the static API key
pub const API_KEY_HEADER: HeaderName = HeaderName::from_static("x-api-key");

/// Modifies an outbound request before it is dispatched.
///
/// Decorators are applied in order, so later ones see the headers set by
/// earlier ones.
pub trait RequestDecorator: Send + Sync + fmt::Debug {
    fn decorate(&self, request: &mut reqwest::Request);
}

/// HTTP Basic authentication with client credentials
pub struct BasicAuth {
    client_id: String,
    header: HeaderValue,
}

impl BasicAuth {
    pub fn new(client_id: &str, client_secret: &str) -> Result<Self, ConfigError> {
        let encoded = STANDARD.encode(format!("{client_id}:{client_secret}"));
        let mut header = HeaderValue::from_str(&format!("Basic {encoded}"))
            .map_err(|_| ConfigError::InvalidHeaderValue("Authorization"))?;
        header.set_sensitive(true);
        Ok(Self {
            client_id: client_id.to_string(),
            header,
        })
    }
}

impl RequestDecorator for BasicAuth {
    fn decorate(&self, request: &mut reqwest::Request) {
        request.headers_mut().insert(AUTHORIZATION, self.header.clone());
    }
}

impl fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuth")
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

/// Static API key sent in the `X-API-Key` header unless the request already has one
pub struct ApiKeyHeader {
    value: HeaderValue,
}

impl ApiKeyHeader {
    pub fn new(api_key: &str) -> Result<Self, ConfigError> {
        let mut value = HeaderValue::from_str(api_key)
            .map_err(|_| ConfigError::InvalidHeaderValue("X-API-Key"))?;
        value.set_sensitive(true);
        Ok(Self { value })
    }
}

impl RequestDecorator for ApiKeyHeader {
    fn decorate(&self, request: &mut reqwest::Request) {
        let headers = request.headers_mut();
        if !headers.contains_key(&API_KEY_HEADER) {
            headers.insert(API_KEY_HEADER, self.value.clone());
        }
    }
}

impl fmt::Debug for ApiKeyHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKeyHeader").finish_non_exhaustive()
    }
}

/// Ordered decorators for the configured mechanisms: Basic auth first, then
/// the API key. Both are optional and may be combined.
pub fn decorators_for(
    config: &IntrospectionConfig,
) -> Result<Vec<Box<dyn RequestDecorator>>, ConfigError> {
    let mut decorators: Vec<Box<dyn RequestDecorator>> = Vec::new();
    if let Some((client_id, client_secret)) = config.client_credentials() {
        decorators.push(Box::new(BasicAuth::new(client_id, client_secret)?));
    }
    if let Some(api_key) = config.api_key() {
        decorators.push(Box::new(ApiKeyHeader::new(api_key)?));
    }
    Ok(decorators)
}
