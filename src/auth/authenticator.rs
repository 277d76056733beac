//! Outbound request authentication
//!
//! [`RequestAuthenticator`] sits between a client's transports and its
//! [`TokenProvider`](crate::auth::provider::TokenProvider). Every outbound
//! REST, GraphQL or gRPC call asks it for credentials exactly once; it keeps
//! no token of its own, so a refresh is visible to the very next request.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::auth::provider::TokenProvider;
use crate::error::Result;

/// Header (and gRPC metadata key) carrying the bearer token.
pub const AUTHORIZATION_HEADER: &str = "Authorization";

/// gRPC metadata keys are lower case.
pub const GRPC_AUTHORIZATION_KEY: &str = "authorization";

/// Anything that can hand out a currently valid access token.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    /// Returns a valid access token.
    async fn access_token(&self) -> Result<String>;
}

#[async_trait]
impl AccessTokenSource for TokenProvider {
    async fn access_token(&self) -> Result<String> {
        self.get_access_token().await
    }
}

/// Attaches bearer credentials to outbound requests.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use weaviate_auth::auth::authenticator::RequestAuthenticator;
/// use weaviate_auth::auth::provider::TokenProvider;
///
/// # async fn example(provider: Arc<TokenProvider>) -> weaviate_auth::error::Result<()> {
/// let authenticator = RequestAuthenticator::new(provider);
/// let http = reqwest::Client::new();
/// let request = authenticator
///     .authorize(http.get("http://localhost:8080/v1/schema"))
///     .await?;
/// let response = request.send().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RequestAuthenticator {
    source: Arc<dyn AccessTokenSource>,
}

impl std::fmt::Debug for RequestAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestAuthenticator").finish_non_exhaustive()
    }
}

impl RequestAuthenticator {
    /// Wraps a token source.
    pub fn new(source: Arc<dyn AccessTokenSource>) -> Self {
        Self { source }
    }

    /// Adds `Authorization: Bearer <token>` to a request under construction.
    ///
    /// # Errors
    ///
    /// Propagates the token source's error; the request is not sent.
    pub async fn authorize(&self, request: reqwest::RequestBuilder) -> Result<reqwest::RequestBuilder> {
        let token = self.source.access_token().await?;
        Ok(request.bearer_auth(token))
    }

    /// Inserts `Authorization: Bearer <token>` into a header map, replacing
    /// any existing value.
    ///
    /// # Errors
    ///
    /// Propagates the token source's error; `headers` is left untouched.
    pub async fn inject_headers(&self, headers: &mut HashMap<String, String>) -> Result<()> {
        let token = self.source.access_token().await?;
        headers.insert(AUTHORIZATION_HEADER.to_string(), bearer_value(&token));
        Ok(())
    }

    /// Returns the gRPC metadata entry carrying the bearer token.
    ///
    /// # Errors
    ///
    /// Propagates the token source's error.
    pub async fn grpc_metadata(&self) -> Result<(&'static str, String)> {
        let token = self.source.access_token().await?;
        Ok((GRPC_AUTHORIZATION_KEY, bearer_value(&token)))
    }
}

/// Formats a bearer credential.
///
/// # Examples
///
/// ```
/// use weaviate_auth::auth::authenticator::bearer_value;
///
/// assert_eq!(bearer_value("abc"), "Bearer abc");
/// ```
pub fn bearer_value(token: &str) -> String {
    format!("Bearer {}", token)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
