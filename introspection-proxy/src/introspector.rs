use crate::errors::IntrospectionError;
use crate::principal::Principal;
use async_trait::async_trait;
use std::sync::Arc;

/// Resolves an opaque bearer token into a [`Principal`].
///
/// `InvalidToken` failures mean the caller is not authenticated and must be
/// surfaced as such; `Upstream` failures are infrastructure problems.
#[async_trait]
pub trait TokenIntrospector: Send + Sync {
    async fn introspect(&self, token: &str) -> Result<Principal, IntrospectionError>;
}

#[async_trait]
impl<T: TokenIntrospector + ?Sized> TokenIntrospector for Arc<T> {
    async fn introspect(&self, token: &str) -> Result<Principal, IntrospectionError> {
        self.as_ref().introspect(token).await
    }
}
