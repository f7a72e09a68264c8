//! Request authentication.
//!
//! The middleware asks an [`Authenticator`] for the calling owner and puts
//! it into the request extensions; handlers read it with
//! `Extension<Owner>`. Every bucket call is scoped to that owner.

use crate::error::HttpError;
use async_trait::async_trait;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, Request};
use axum::middleware::Next;
use axum::response::Response;
use objst_common::validate_owner;
use std::sync::Arc;
use tracing::debug;

/// Authenticated principal
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Owner(pub String);

impl Owner {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Resolves the owner of a request
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Owner for these headers, or an error response (401)
    async fn authenticate(&self, headers: &HeaderMap) -> Result<Owner, HttpError>;
}

/// Takes the owner verbatim from one request header.
///
/// Meant for deployments behind a proxy that has already authenticated the
/// caller and sets the header.
pub struct HeaderAuthenticator {
    header: HeaderName,
}

impl HeaderAuthenticator {
    pub fn new(header: &str) -> Result<Self, HttpError> {
        let header = HeaderName::from_bytes(header.as_bytes())
            .map_err(|e| HttpError::internal(format!("invalid owner header name: {e}")))?;
        Ok(Self { header })
    }
}

#[async_trait]
impl Authenticator for HeaderAuthenticator {
    async fn authenticate(&self, headers: &HeaderMap) -> Result<Owner, HttpError> {
        let value = headers
            .get(&self.header)
            .ok_or_else(|| HttpError::unauthorized(format!("missing {} header", self.header)))?
            .to_str()
            .map_err(|_| HttpError::unauthorized(format!("invalid {} header", self.header)))?;
        validate_owner(value).map_err(|e| HttpError::unauthorized(format!("invalid owner: {e}")))?;
        Ok(Owner(value.to_string()))
    }
}

/// Authentication middleware layer
pub async fn auth_layer(
    State(auth): State<Arc<dyn Authenticator>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, HttpError> {
    // Skip auth for health checks
    if request.uri().path() == "/health" {
        return Ok(next.run(request).await);
    }

    let owner = auth.authenticate(request.headers()).await?;
    debug!("Authenticated owner: {}", owner.as_str());

    request.extensions_mut().insert(owner);
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[tokio::test]
    async fn test_header_authenticator() {
        let auth = HeaderAuthenticator::new("x-objst-owner").unwrap();

        let mut headers = HeaderMap::new();
        assert!(auth.authenticate(&headers).await.is_err());

        headers.insert("x-objst-owner", HeaderValue::from_static("u1"));
        assert_eq!(auth.authenticate(&headers).await.unwrap(), Owner("u1".into()));

        headers.insert("x-objst-owner", HeaderValue::from_static("not valid"));
        let err = auth.authenticate(&headers).await.unwrap_err();
        assert_eq!(err.status.as_u16(), 401);
    }
}
