//! OAuth 2.0 grant strategies
//!
//! A [`GrantStrategy`] knows how to build the [`AuthorizationGrant`] sent to
//! the token endpoint and, for the stateful refresh-token strategy, how to
//! absorb a newly issued token so that the next refresh uses the latest
//! (possibly rotated) refresh token.
//!
//! The set of strategies is closed: the four supported kinds are variants of
//! one enum and every operation matches on them exhaustively.

use std::fmt;

use crate::auth::token::Token;
use crate::error::{AuthError, Result};

// ---------------------------------------------------------------------------
// AuthorizationGrant
// ---------------------------------------------------------------------------

/// The credential half of an OAuth 2.0 token request (RFC 6749 section 4).
#[derive(Clone, PartialEq, Eq)]
pub enum AuthorizationGrant {
    /// `grant_type=client_credentials` (RFC 6749 section 4.4)
    ClientCredentials {
        /// Client identifier sent with the grant.
        client_id: String,
        /// Client secret sent with the grant.
        client_secret: String,
    },

    /// `grant_type=password` (RFC 6749 section 4.3)
    Password {
        /// Resource owner username.
        username: String,
        /// Resource owner password.
        password: String,
    },

    /// `grant_type=refresh_token` (RFC 6749 section 6)
    RefreshToken {
        /// The refresh token to redeem.
        refresh_token: String,
    },
}

impl AuthorizationGrant {
    /// The `grant_type` form value for this grant.
    ///
    /// # Examples
    ///
    /// ```
    /// use weaviate_auth::auth::grant::AuthorizationGrant;
    ///
    /// let grant = AuthorizationGrant::RefreshToken {
    ///     refresh_token: "r1".to_string(),
    /// };
    /// assert_eq!(grant.grant_type(), "refresh_token");
    /// ```
    pub fn grant_type(&self) -> &'static str {
        match self {
            Self::ClientCredentials { .. } => "client_credentials",
            Self::Password { .. } => "password",
            Self::RefreshToken { .. } => "refresh_token",
        }
    }

    /// Builds the form-encoded parameters of the token request.
    ///
    /// `client_id` is used for grants that do not carry their own client
    /// identifier. `scope` is omitted when empty.
    pub(crate) fn form_params<'a>(
        &'a self,
        client_id: &'a str,
        scope: &'a str,
    ) -> Vec<(&'static str, &'a str)> {
        let mut params = vec![("grant_type", self.grant_type())];

        match self {
            Self::ClientCredentials {
                client_id: own_id,
                client_secret,
            } => {
                params.push(("client_id", own_id.as_str()));
                params.push(("client_secret", client_secret.as_str()));
            }
            Self::Password { username, password } => {
                params.push(("client_id", client_id));
                params.push(("username", username.as_str()));
                params.push(("password", password.as_str()));
            }
            Self::RefreshToken { refresh_token } => {
                params.push(("client_id", client_id));
                params.push(("refresh_token", refresh_token.as_str()));
            }
        }

        if !scope.is_empty() {
            params.push(("scope", scope));
        }

        params
    }
}

impl fmt::Debug for AuthorizationGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClientCredentials { client_id, .. } => f
                .debug_struct("ClientCredentials")
                .field("client_id", client_id)
                .field("client_secret", &"<redacted>")
                .finish(),
            Self::Password { username, .. } => f
                .debug_struct("Password")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Self::RefreshToken { .. } => f
                .debug_struct("RefreshToken")
                .field("refresh_token", &"<redacted>")
                .finish(),
        }
    }
}

// ---------------------------------------------------------------------------
// GrantStrategy
// ---------------------------------------------------------------------------

/// How a token provider obtains new tokens.
#[derive(Clone)]
pub enum GrantStrategy {
    /// Exchanges a client id and secret on every refresh. Stateless.
    ClientCredentials {
        /// OAuth client identifier.
        client_id: String,
        /// OAuth client secret.
        secret: String,
    },

    /// Exchanges a username and password on every refresh. Stateless.
    ResourceOwnerPassword {
        /// Resource owner username.
        username: String,
        /// Resource owner password.
        secret: String,
    },

    /// Redeems the refresh token of the most recent token. Stateful: the
    /// provider calls [`absorb`](GrantStrategy::absorb) after every exchange.
    RefreshToken {
        /// The most recently issued token.
        current: Token,
    },

    /// Serves a caller-supplied access token verbatim and never exchanges.
    BearerPassthrough {
        /// The supplied token.
        current: Token,
    },
}

impl GrantStrategy {
    /// Builds the grant for the next token request.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::RefreshUnavailable`] for a refresh-token strategy
    /// whose current token carries no refresh token, and always for
    /// [`GrantStrategy::BearerPassthrough`].
    ///
    /// # Examples
    ///
    /// ```
    /// use weaviate_auth::auth::grant::{AuthorizationGrant, GrantStrategy};
    ///
    /// let strategy = GrantStrategy::ClientCredentials {
    ///     client_id: "wcs".to_string(),
    ///     secret: "s3cret".to_string(),
    /// };
    /// let grant = strategy.build_grant().unwrap();
    /// assert_eq!(grant.grant_type(), "client_credentials");
    /// ```
    pub fn build_grant(&self) -> Result<AuthorizationGrant> {
        match self {
            Self::ClientCredentials { client_id, secret } => {
                Ok(AuthorizationGrant::ClientCredentials {
                    client_id: client_id.clone(),
                    client_secret: secret.clone(),
                })
            }
            Self::ResourceOwnerPassword { username, secret } => Ok(AuthorizationGrant::Password {
                username: username.clone(),
                password: secret.clone(),
            }),
            Self::RefreshToken { current } => match current.refresh_token() {
                Some(refresh_token) => Ok(AuthorizationGrant::RefreshToken {
                    refresh_token: refresh_token.to_string(),
                }),
                None => Err(AuthError::RefreshUnavailable(
                    "the identity provider did not issue a refresh token; re-authenticate with new credentials".to_string(),
                )
                .into()),
            },
            Self::BearerPassthrough { .. } => Err(AuthError::RefreshUnavailable(
                "the bearer token was supplied without a refresh token; supply a new token once it expires".to_string(),
            )
            .into()),
        }
    }

    /// Records a newly issued token for the next round.
    ///
    /// Only the refresh-token strategy keeps state; the other strategies
    /// ignore the call.
    pub fn absorb(&mut self, token: &Token) {
        match self {
            Self::RefreshToken { current } => {
                if token.refresh_token().is_none() {
                    tracing::warn!(
                        "Token endpoint issued no refresh token; the current token cannot be refreshed once it expires"
                    );
                }
                *current = token.clone();
            }
            Self::ClientCredentials { .. }
            | Self::ResourceOwnerPassword { .. }
            | Self::BearerPassthrough { .. } => {}
        }
    }

    /// Returns `true` when the strategy can produce a new grant ahead of
    /// expiry without user interaction: client credentials, or a held
    /// refresh token.
    ///
    /// Providers only refresh refreshable strategies in the background. A
    /// password grant still re-authenticates once its token has expired.
    pub fn is_refreshable(&self) -> bool {
        match self {
            Self::ClientCredentials { .. } => true,
            Self::RefreshToken { current } => current.refresh_token().is_some(),
            Self::ResourceOwnerPassword { .. } | Self::BearerPassthrough { .. } => false,
        }
    }

    /// The caller-supplied token a provider starts out with, if any.
    pub fn seed_token(&self) -> Option<&Token> {
        match self {
            Self::RefreshToken { current } | Self::BearerPassthrough { current } => Some(current),
            Self::ClientCredentials { .. } | Self::ResourceOwnerPassword { .. } => None,
        }
    }

    /// Short name used in log messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ClientCredentials { .. } => "client_credentials",
            Self::ResourceOwnerPassword { .. } => "password",
            Self::RefreshToken { .. } => "refresh_token",
            Self::BearerPassthrough { .. } => "bearer",
        }
    }
}

impl fmt::Debug for GrantStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClientCredentials { client_id, .. } => f
                .debug_struct("ClientCredentials")
                .field("client_id", client_id)
                .field("secret", &"<redacted>")
                .finish(),
            Self::ResourceOwnerPassword { username, .. } => f
                .debug_struct("ResourceOwnerPassword")
                .field("username", username)
                .field("secret", &"<redacted>")
                .finish(),
            Self::RefreshToken { current } => f
                .debug_struct("RefreshToken")
                .field("expires_at", &current.expires_at())
                .finish(),
            Self::BearerPassthrough { current } => f
                .debug_struct("BearerPassthrough")
                .field("expires_at", &current.expires_at())
                .finish(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
