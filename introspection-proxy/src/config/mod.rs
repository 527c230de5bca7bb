//! Introspection proxy configuration

pub use crate::config::cache::{CacheConfig, CacheStore};
use crate::errors::ConfigError;
use confique::Config;
use log::warn;
use std::fmt;
use std::path::PathBuf;
use url::Url;

pub mod cache;

/// Environment variable naming an optional TOML configuration file
pub const CONFIG_FILE_ENV: &str = "INTROSPECTION_CONFIG_FILE";

/// Configuration file used when `INTROSPECTION_CONFIG_FILE` is not set
pub const DEFAULT_CONFIG_FILE: &str = "introspection.toml";

/// Main configuration structure for the introspection proxy
#[derive(Config, Clone)]
pub struct IntrospectionConfig {
    /// URI of the OAuth 2.0 token introspection endpoint (required)
    #[config(env = "INTROSPECTION_URI")]
    pub uri: String,

    /// Client id used for HTTP Basic authentication against the endpoint
    #[config(env = "INTROSPECTION_CLIENT_ID")]
    pub client_id: Option<String>,

    /// Client secret used for HTTP Basic authentication against the endpoint
    #[config(env = "INTROSPECTION_CLIENT_SECRET")]
    pub client_secret: Option<String>,

    /// Static API key sent in the X-API-Key header
    #[config(env = "INTROSPECTION_API_KEY")]
    pub api_key: Option<String>,

    /// Timeout for a whole introspection request in seconds (default: 5)
    #[config(env = "INTROSPECTION_TIMEOUT", default = 5)]
    pub timeout: u64,

    /// Timeout for establishing a connection in seconds (default: 2)
    #[config(env = "INTROSPECTION_CONNECT_TIMEOUT", default = 2)]
    pub connect_timeout: u64,

    /// Cache configuration
    #[config(nested)]
    pub cache: CacheConfig,
}

impl IntrospectionConfig {
    /// Loads the configuration from environment variables and the optional
    /// configuration file. Environment variables take precedence.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_FILE_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));

        let mut builder = Self::builder().env();
        if path.exists() {
            builder = builder.file(path);
        }
        let config = builder.load()?;
        config.validated_uri()?;
        config.validate_timeouts()?;
        Ok(config)
    }

    /// Create a configuration for the given endpoint with every optional
    /// setting at its default
    pub fn with_uri<S: Into<String>>(uri: S) -> Self {
        Self {
            uri: uri.into(),
            client_id: None,
            client_secret: None,
            api_key: None,
            timeout: 5,
            connect_timeout: 2,
            cache: CacheConfig::default(),
        }
    }

    /// Parse the introspection endpoint URI
    pub fn validated_uri(&self) -> Result<Url, ConfigError> {
        let uri = self.uri.trim();
        if uri.is_empty() {
            return Err(ConfigError::MissingIntrospectionUri);
        }
        Ok(Url::parse(uri)?)
    }

    /// A zero timeout would fail every upstream call immediately
    pub fn validate_timeouts(&self) -> Result<(), ConfigError> {
        if self.timeout == 0 {
            return Err(ConfigError::InvalidTimeout("INTROSPECTION_TIMEOUT"));
        }
        if self.connect_timeout == 0 {
            return Err(ConfigError::InvalidTimeout("INTROSPECTION_CONNECT_TIMEOUT"));
        }
        Ok(())
    }

    /// Client credentials for Basic authentication, if a client id is configured
    pub fn client_credentials(&self) -> Option<(&str, &str)> {
        let secret = not_blank(&self.client_secret);
        match not_blank(&self.client_id) {
            Some(id) => Some((id, secret.unwrap_or_default())),
            None => {
                if secret.is_some() {
                    warn!("Client secret is configured without a client id, ignoring it");
                }
                None
            }
        }
    }

    pub fn api_key(&self) -> Option<&str> {
        not_blank(&self.api_key)
    }
}

fn not_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

impl fmt::Debug for IntrospectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntrospectionConfig")
            .field("uri", &self.uri)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("cache", &self.cache)
            .finish()
    }
}
