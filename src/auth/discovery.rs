//! OIDC provider discovery for Weaviate deployments
//!
//! A Weaviate server advertises its identity provider at the well-known path
//! `/v1/.well-known/openid-configuration`. The server answers in one of three
//! ways:
//!
//! 1. `404 Not Found`: authentication is not configured.
//! 2. `200 OK` with a full OpenID Connect discovery document.
//! 3. `200 OK` with a small redirect document `{"href": "<url>"}` pointing at
//!    the identity provider's own discovery document. Weaviate adds the
//!    `clientId` and `scopes` it expects clients to use.
//!
//! [`resolve`] follows at most one redirect and returns a [`Discovery`].

use std::collections::HashMap;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{AuthError, Result};

/// Path of the discovery endpoint relative to the Weaviate base URL.
pub const DISCOVERY_PATH: &str = "v1/.well-known/openid-configuration";

// ---------------------------------------------------------------------------
// Provider metadata
// ---------------------------------------------------------------------------

/// Endpoints and capabilities of the OIDC provider guarding a Weaviate
/// deployment.
///
/// Resolved once per token provider and immutable afterwards.
///
/// # Examples
///
/// ```
/// use weaviate_auth::auth::discovery::ProviderMetadata;
///
/// let json = r#"{
///     "issuer": "https://idp.example.com",
///     "token_endpoint": "https://idp.example.com/oauth/token",
///     "grant_types_supported": ["client_credentials", "refresh_token"]
/// }"#;
///
/// let meta: ProviderMetadata = serde_json::from_str(json).unwrap();
/// assert_eq!(meta.token_endpoint.as_str(), "https://idp.example.com/oauth/token");
/// assert!(meta.supports_grant("refresh_token"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderMetadata {
    /// The token endpoint (RFC 6749 section 3.2).
    pub token_endpoint: Url,

    /// Issuer identifier of the provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,

    /// `grant_type` values the provider advertises.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grant_types_supported: Option<Vec<String>>,

    /// Client id suggested by the Weaviate server, if any.
    #[serde(skip)]
    pub client_id_hint: Option<String>,

    /// Scopes suggested by the Weaviate server.
    #[serde(skip)]
    pub scope_hints: Vec<String>,

    /// Additional metadata fields not modelled above.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl ProviderMetadata {
    /// Creates metadata that only knows its token endpoint.
    pub fn new(token_endpoint: Url) -> Self {
        Self {
            token_endpoint,
            issuer: None,
            grant_types_supported: None,
            client_id_hint: None,
            scope_hints: Vec::new(),
            extra: HashMap::new(),
        }
    }

    /// Returns `true` when the provider advertises `grant_type`, or when it
    /// advertises nothing at all.
    pub fn supports_grant(&self, grant_type: &str) -> bool {
        self.grant_types_supported
            .as_ref()
            .map_or(true, |grants| grants.iter().any(|g| g == grant_type))
    }
}

/// Outcome of provider discovery.
#[derive(Debug, Clone, PartialEq)]
pub enum Discovery {
    /// The server answered `404`: no authentication is configured.
    NotConfigured,

    /// The server is protected by the described provider.
    Configured(ProviderMetadata),
}

/// Redirect document served by Weaviate in front of the provider's own
/// discovery document.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RedirectDocument {
    href: String,

    #[serde(default)]
    client_id: Option<String>,

    #[serde(default)]
    scopes: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DiscoveryDocument {
    Redirect(RedirectDocument),
    Metadata(ProviderMetadata),
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

/// Builds the discovery URL for a Weaviate base URL.
///
/// Any path on the base URL is kept, so deployments served under a prefix
/// resolve correctly.
///
/// # Errors
///
/// Returns [`AuthError::Config`] if the resulting URL is not valid.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use weaviate_auth::auth::discovery::discovery_url;
///
/// let base = Url::parse("http://localhost:8080").unwrap();
/// assert_eq!(
///     discovery_url(&base).unwrap().as_str(),
///     "http://localhost:8080/v1/.well-known/openid-configuration"
/// );
/// ```
pub fn discovery_url(base_url: &Url) -> Result<Url> {
    let base = base_url.as_str().trim_end_matches('/');
    Url::parse(&format!("{base}/{DISCOVERY_PATH}")).map_err(|e| {
        AuthError::Config(format!("invalid discovery url for {base_url}: {e}")).into()
    })
}

/// Resolves the OIDC provider guarding the Weaviate server at `base_url`.
///
/// # Arguments
///
/// * `http` - Shared [`reqwest::Client`] used for the discovery requests.
/// * `base_url` - Scheme, host and optional path prefix of the server.
///
/// # Returns
///
/// [`Discovery::NotConfigured`] when the server answers `404`, otherwise
/// [`Discovery::Configured`] with the provider metadata.
///
/// # Errors
///
/// - [`AuthError::Discovery`] for any status other than `200` (or `404` on
///   the first request).
/// - [`AuthError::MalformedDiscovery`] for a body that is neither a redirect
///   nor a metadata document, or a redirect that leads to another redirect.
/// - [`AuthError::Network`] for transport failures.
///
/// # Examples
///
/// ```no_run
/// use url::Url;
/// use weaviate_auth::auth::discovery::{resolve, Discovery};
///
/// # async fn example() -> weaviate_auth::error::Result<()> {
/// let http = reqwest::Client::new();
/// let base = Url::parse("http://localhost:8080")?;
/// match resolve(&http, &base).await? {
///     Discovery::NotConfigured => println!("no authentication"),
///     Discovery::Configured(meta) => println!("token endpoint: {}", meta.token_endpoint),
/// }
/// # Ok(())
/// # }
/// ```
pub async fn resolve(http: &reqwest::Client, base_url: &Url) -> Result<Discovery> {
    let url = discovery_url(base_url)?;
    tracing::debug!(url = %url, "Fetching OIDC discovery document");

    let Some(body) = fetch_document(http, &url, url.as_str(), true).await? else {
        tracing::debug!(url = %url, "Server has no authentication configured");
        return Ok(Discovery::NotConfigured);
    };

    let metadata = match parse_document(url.as_str(), &body)? {
        DiscoveryDocument::Metadata(meta) => meta,
        DiscoveryDocument::Redirect(redirect) => {
            let target = url.join(&redirect.href).map_err(|e| AuthError::MalformedDiscovery {
                url: url.to_string(),
                reason: format!("invalid href '{}': {e}", redirect.href),
            })?;
            tracing::debug!(url = %target, "Following OIDC discovery redirect");

            // Errors name an absolute href exactly as the server sent it.
            let label = if Url::parse(&redirect.href).is_ok() {
                redirect.href.clone()
            } else {
                target.to_string()
            };

            let body = fetch_document(http, &target, &label, false)
                .await?
                .ok_or_else(|| AuthError::Discovery {
                    url: label.clone(),
                    status: StatusCode::NOT_FOUND.as_u16(),
                })?;

            let mut meta = match parse_document(&label, &body)? {
                DiscoveryDocument::Metadata(meta) => meta,
                DiscoveryDocument::Redirect(_) => {
                    return Err(AuthError::MalformedDiscovery {
                        url: label,
                        reason: "redirect document points at another redirect".to_string(),
                    }
                    .into())
                }
            };
            meta.client_id_hint = redirect.client_id.filter(|id| !id.is_empty());
            meta.scope_hints = redirect.scopes;
            meta
        }
    };

    tracing::info!(
        token_endpoint = %metadata.token_endpoint,
        "Resolved OIDC token endpoint"
    );
    Ok(Discovery::Configured(metadata))
}

/// GETs a discovery document. Errors carry `label` as their url.
///
/// Returns `None` for a `404` when `not_found_is_unconfigured` is set.
async fn fetch_document(
    http: &reqwest::Client,
    url: &Url,
    label: &str,
    not_found_is_unconfigured: bool,
) -> Result<Option<Vec<u8>>> {
    let resp = http
        .get(url.clone())
        .send()
        .await
        .map_err(AuthError::from)?;

    let status = resp.status();
    if status == StatusCode::NOT_FOUND && not_found_is_unconfigured {
        return Ok(None);
    }
    if status != StatusCode::OK {
        return Err(AuthError::Discovery {
            url: label.to_string(),
            status: status.as_u16(),
        }
        .into());
    }

    let body = resp.bytes().await.map_err(AuthError::from)?;
    Ok(Some(body.to_vec()))
}

fn parse_document(label: &str, body: &[u8]) -> Result<DiscoveryDocument> {
    serde_json::from_slice(body).map_err(|e| {
        AuthError::MalformedDiscovery {
            url: label.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
