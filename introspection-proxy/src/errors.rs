use crate::cache::CacheError;
use thiserror::Error;

/// Failure of a token introspection.
///
/// The type is `Clone` because a single upstream failure can be handed to
/// every caller that was waiting on the same in-flight load.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum IntrospectionError {
    /// The token is empty, unknown or inactive. This is a user facing
    /// "not authenticated" signal and must be propagated unchanged.
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// The introspection endpoint could not give a usable answer.
    #[error("Introspection endpoint failure: {0}")]
    Upstream(#[from] UpstreamError),
}

impl IntrospectionError {
    /// Create an invalid token error with a reason
    pub fn invalid_token<S: ToString>(reason: S) -> Self {
        Self::InvalidToken(reason.to_string())
    }

    pub fn is_invalid_token(&self) -> bool {
        matches!(self, Self::InvalidToken(_))
    }

    /// Whether retrying the same request may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::InvalidToken(_) => false,
            Self::Upstream(err) => err.is_retryable(),
        }
    }
}

/// Transport, protocol and parsing failures of the upstream call
#[derive(Debug, Clone, Error, PartialEq)]
pub enum UpstreamError {
    #[error("HTTP request failed: {0}")]
    Transport(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Unexpected response status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed introspection response: {0}")]
    MalformedResponse(String),
}

impl UpstreamError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout => true,
            Self::Status { status, .. } => *status >= 500,
            Self::MalformedResponse(_) => false,
        }
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::MalformedResponse(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// Startup failures. Any of these is fatal before traffic is accepted.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] confique::Error),

    #[error("Introspection endpoint URI is required")]
    MissingIntrospectionUri,

    #[error("Invalid introspection endpoint URI: {0}")]
    InvalidIntrospectionUri(#[from] url::ParseError),

    #[error("{0} must be at least one second")]
    InvalidTimeout(&'static str),

    #[error("Invalid value for header {0}")]
    InvalidHeaderValue(&'static str),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}
