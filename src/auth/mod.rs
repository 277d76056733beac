//! Weaviate OIDC access-token lifecycle
//!
//! Discovers the identity provider protecting a Weaviate deployment,
//! exchanges credentials for tokens, keeps the current token fresh and
//! attaches it to outbound requests.
//!
//! # Module Layout
//!
//! - [`discovery`]     -- `/v1/.well-known/openid-configuration` resolution,
//!   including the one-hop `href` redirect
//! - [`grant`]         -- Grant strategies and the grants they build
//! - [`token`]         -- Immutable token value and expiry arithmetic
//! - [`exchange`]      -- Token endpoint client and error-body parsing
//! - [`provider`]      -- Cached, single-flight refreshing token provider
//! - [`authenticator`] -- Bearer header and gRPC metadata injection

pub mod authenticator;
pub mod discovery;
pub mod exchange;
pub mod grant;
pub mod provider;
pub mod token;

pub use authenticator::{AccessTokenSource, RequestAuthenticator};
pub use discovery::{Discovery, ProviderMetadata};
pub use exchange::{OidcConfig, TokenExchanger};
pub use grant::{AuthorizationGrant, GrantStrategy};
pub use provider::{AuthSettings, Credentials, TokenProvider};
pub use token::Token;
