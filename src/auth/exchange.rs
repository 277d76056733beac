//! Token endpoint client
//!
//! [`TokenExchanger`] turns an [`AuthorizationGrant`] into a [`Token`] with a
//! single form-encoded POST to the provider's token endpoint (RFC 6749
//! section 3.2).
//!
//! Identity providers disagree on the shape of error bodies. Failed
//! responses are run through an ordered list of parsers; the first parser
//! that extracts both a code and a description wins. When none does, the
//! first partial result is completed from the HTTP status and the raw body.

use std::collections::BTreeSet;
use std::sync::Arc;

use reqwest::StatusCode;
use serde::Deserialize;

use crate::auth::discovery::ProviderMetadata;
use crate::auth::grant::AuthorizationGrant;
use crate::auth::token::Token;
use crate::error::{AuthError, Result};

/// Lifetime assumed when the token endpoint omits `expires_in`.
pub const DEFAULT_TOKEN_LIFETIME_SECONDS: u64 = 60;

/// Error code reported when a successful response carries no usable token.
pub const INVALID_TOKEN_RESPONSE: &str = "invalid_token_response";

// ---------------------------------------------------------------------------
// OidcConfig
// ---------------------------------------------------------------------------

/// Client identity presented to the identity provider.
///
/// # Examples
///
/// ```
/// use weaviate_auth::auth::exchange::OidcConfig;
///
/// let oidc = OidcConfig::new("wcs", ["openid", "offline_access"]);
/// assert_eq!(oidc.scope_param(), "offline_access openid");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OidcConfig {
    /// OAuth client identifier.
    pub client_id: String,

    /// Requested scopes. Ordered so that the `scope` parameter is stable.
    pub scopes: BTreeSet<String>,
}

impl OidcConfig {
    /// Creates a config from a client id and any collection of scopes.
    pub fn new<I, S>(client_id: impl Into<String>, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            client_id: client_id.into(),
            scopes: scopes.into_iter().map(Into::into).collect(),
        }
    }

    /// Space-separated `scope` parameter value; empty when no scopes are set.
    pub fn scope_param(&self) -> String {
        self.scopes
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

// ---------------------------------------------------------------------------
// Token response
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Lifetime {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl Lifetime {
    fn seconds(&self) -> Option<u64> {
        match self {
            Self::Integer(n) => Some(u64::try_from(*n).unwrap_or(0)),
            Self::Float(f) if f.is_finite() => Some(f.max(0.0) as u64),
            Self::Float(_) => None,
            Self::Text(s) => s.trim().parse::<u64>().ok(),
        }
    }
}

/// Successful token endpoint response (RFC 6749 section 5.1).
#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,

    #[serde(default)]
    refresh_token: Option<String>,

    #[serde(default)]
    expires_in: Option<Lifetime>,
}

impl TokenResponse {
    fn into_token(self) -> Result<Token> {
        let access_token = self
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| invalid_response("response carries no access_token"))?;

        let lifetime_seconds = match self.expires_in {
            None => DEFAULT_TOKEN_LIFETIME_SECONDS,
            Some(lifetime) => lifetime
                .seconds()
                .ok_or_else(|| invalid_response("expires_in is not a number of seconds"))?,
        };

        Token::new(access_token, self.refresh_token, lifetime_seconds)
    }
}

fn invalid_response(description: &str) -> AuthError {
    AuthError::TokenExchange {
        code: INVALID_TOKEN_RESPONSE.to_string(),
        description: description.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Error body parsing
// ---------------------------------------------------------------------------

/// Code and description extracted by one error parser.
#[derive(Debug, Default, PartialEq, Eq)]
struct ParsedError {
    code: Option<String>,
    description: Option<String>,
}

impl ParsedError {
    fn is_complete(&self) -> bool {
        self.code.is_some() && self.description.is_some()
    }

    fn is_empty(&self) -> bool {
        self.code.is_none() && self.description.is_none()
    }
}

type ErrorParser = fn(&serde_json::Value) -> ParsedError;

/// Parsers in priority order.
const ERROR_PARSERS: &[ErrorParser] = &[parse_rfc6749_error, parse_vendor_error];

fn string_field(body: &serde_json::Value, key: &str) -> Option<String> {
    body.get(key)
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// RFC 6749 section 5.2: `{"error": ..., "error_description": ...}`.
fn parse_rfc6749_error(body: &serde_json::Value) -> ParsedError {
    ParsedError {
        code: string_field(body, "error"),
        description: string_field(body, "error_description"),
    }
}

/// Vendor shape used by Okta and others: `{"errorCode": ..., "errorSummary": ...}`.
fn parse_vendor_error(body: &serde_json::Value) -> ParsedError {
    ParsedError {
        code: string_field(body, "errorCode"),
        description: string_field(body, "errorSummary"),
    }
}

/// Builds the exchange error for a non-success response.
fn exchange_error(status: StatusCode, body: &str) -> AuthError {
    let json = serde_json::from_str::<serde_json::Value>(body).unwrap_or_default();

    let mut first_partial: Option<ParsedError> = None;
    for parser in ERROR_PARSERS {
        let parsed = parser(&json);
        if parsed.is_complete() {
            first_partial = Some(parsed);
            break;
        }
        if first_partial.is_none() && !parsed.is_empty() {
            first_partial = Some(parsed);
        }
    }

    let parsed = first_partial.unwrap_or_default();
    let trimmed = body.trim();
    AuthError::TokenExchange {
        code: parsed
            .code
            .unwrap_or_else(|| format!("http_{}", status.as_u16())),
        description: parsed.description.unwrap_or_else(|| {
            if trimmed.is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("unknown error")
                    .to_string()
            } else {
                trimmed.to_string()
            }
        }),
    }
}

// ---------------------------------------------------------------------------
// TokenExchanger
// ---------------------------------------------------------------------------

/// Exchanges authorization grants for tokens.
///
/// Cheap to clone; clones share the underlying HTTP client and its
/// connection pool.
#[derive(Debug, Clone)]
pub struct TokenExchanger {
    http: Arc<reqwest::Client>,
}

impl TokenExchanger {
    /// Creates an exchanger on top of a shared HTTP client.
    ///
    /// The client's request timeout bounds every exchange.
    pub fn new(http: Arc<reqwest::Client>) -> Self {
        Self { http }
    }

    /// Performs one token request.
    ///
    /// # Arguments
    ///
    /// * `metadata` - Provider metadata holding the token endpoint.
    /// * `oidc` - Client id and scopes to present.
    /// * `grant` - The grant to redeem.
    ///
    /// # Returns
    ///
    /// The issued [`Token`]. A response without `expires_in` yields a token
    /// living [`DEFAULT_TOKEN_LIFETIME_SECONDS`].
    ///
    /// # Errors
    ///
    /// - [`AuthError::TokenExchange`] when the endpoint rejects the grant, or
    ///   accepts it without returning an access token.
    /// - [`AuthError::Network`] for transport failures and timeouts.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::sync::Arc;
    /// use url::Url;
    /// use weaviate_auth::auth::discovery::ProviderMetadata;
    /// use weaviate_auth::auth::exchange::{OidcConfig, TokenExchanger};
    /// use weaviate_auth::auth::grant::AuthorizationGrant;
    ///
    /// # async fn example() -> weaviate_auth::error::Result<()> {
    /// let exchanger = TokenExchanger::new(Arc::new(reqwest::Client::new()));
    /// let metadata = ProviderMetadata::new(Url::parse("https://idp.example.com/token")?);
    /// let oidc = OidcConfig::new("wcs", ["openid"]);
    /// let grant = AuthorizationGrant::Password {
    ///     username: "alice".to_string(),
    ///     password: "secret".to_string(),
    /// };
    /// let token = exchanger.exchange(&metadata, &oidc, &grant).await?;
    /// println!("expires at {}", token.expires_at());
    /// # Ok(())
    /// # }
    /// ```
    pub async fn exchange(
        &self,
        metadata: &ProviderMetadata,
        oidc: &OidcConfig,
        grant: &AuthorizationGrant,
    ) -> Result<Token> {
        let scope = oidc.scope_param();
        let params = grant.form_params(&oidc.client_id, &scope);

        tracing::debug!(
            grant_type = grant.grant_type(),
            token_endpoint = %metadata.token_endpoint,
            "Requesting access token"
        );

        let resp = self
            .http
            .post(metadata.token_endpoint.clone())
            .form(&params)
            .send()
            .await
            .map_err(AuthError::from)?;

        let status = resp.status();
        let body = resp.text().await.map_err(AuthError::from)?;

        if !status.is_success() {
            let err = exchange_error(status, &body);
            tracing::debug!(
                status = status.as_u16(),
                error = %err,
                "Token endpoint rejected the grant"
            );
            return Err(err.into());
        }

        let raw: TokenResponse = serde_json::from_str(&body).map_err(|e| {
            invalid_response(&format!("token endpoint returned an unreadable response: {e}"))
        })?;
        let token = raw.into_token()?;

        tracing::debug!(
            grant_type = grant.grant_type(),
            lifetime_seconds = token.lifetime_seconds(),
            has_refresh_token = token.refresh_token().is_some(),
            "Access token issued"
        );
        Ok(token)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
