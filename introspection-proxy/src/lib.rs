//! OAuth 2.0 opaque token introspection with a short-lived result cache.
//!
//! [`RemoteIntrospector`] asks an RFC 7662 introspection endpoint about a
//! bearer token. [`CachingIntrospector`] sits in front of it, caching each
//! answer for a few seconds, never serving a principal whose token has
//! expired, and merging `ext.permissions` into the returned authorities.

pub mod cache;
pub mod caching;
pub mod config;
pub mod errors;
pub mod introspector;
pub mod permissions;
pub mod principal;
pub mod remote;
pub mod token;
#[cfg(test)]
mod test_utils;

pub use cache::CacheStats;
pub use caching::CachingIntrospector;
pub use config::IntrospectionConfig;
pub use errors::{ConfigError, IntrospectionError, UpstreamError};
pub use introspector::TokenIntrospector;
pub use principal::{Authority, Principal};
pub use remote::RemoteIntrospector;
