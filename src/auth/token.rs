//! Immutable access-token value
//!
//! A [`Token`] is produced by every successful token exchange (or supplied
//! by the caller for the bearer-token flows). It is never mutated in place:
//! a refresh produces a new value that replaces the cached one wholesale.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, Result};

// ---------------------------------------------------------------------------
// Token
// ---------------------------------------------------------------------------

/// An OAuth 2.0 access token together with its bookkeeping data.
///
/// The expiry instant is derived from `issued_at + lifetime_seconds` rather
/// than stored, so the two can never disagree.
///
/// # Examples
///
/// ```
/// use weaviate_auth::auth::token::Token;
///
/// let token = Token::new("access", Some("refresh".to_string()), 3600).unwrap();
/// assert_eq!(token.access_token(), "access");
/// assert!(!token.is_expired());
///
/// // Empty access tokens are rejected.
/// assert!(Token::new("", None, 3600).is_err());
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    access_token: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,

    #[serde(with = "chrono::serde::ts_seconds")]
    issued_at: DateTime<Utc>,

    lifetime_seconds: u64,
}

impl Token {
    /// Creates a token issued now.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidToken`] if `access_token` is empty.
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        lifetime_seconds: u64,
    ) -> Result<Self> {
        Self::issued(access_token, refresh_token, Utc::now(), lifetime_seconds)
    }

    /// Creates a token with an explicit issue instant.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidToken`] if `access_token` is empty.
    pub fn issued(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        issued_at: DateTime<Utc>,
        lifetime_seconds: u64,
    ) -> Result<Self> {
        let access_token = access_token.into();
        if access_token.is_empty() {
            return Err(AuthError::InvalidToken("access token must not be empty".to_string()).into());
        }

        // An empty refresh token is as good as none.
        let refresh_token = refresh_token.filter(|r| !r.is_empty());

        Ok(Self {
            access_token,
            refresh_token,
            issued_at,
            lifetime_seconds,
        })
    }

    /// The bearer credential.
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// The refresh token issued alongside the access token, if any.
    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    /// Instant at which the token was issued.
    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    /// Lifetime in seconds as reported by the token endpoint.
    pub fn lifetime_seconds(&self) -> u64 {
        self.lifetime_seconds
    }

    /// Literal expiry instant (`issued_at + lifetime_seconds`), saturating at
    /// the maximum representable instant.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.issued_at
            .checked_add_signed(self.lifetime())
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Returns `true` once the literal expiry instant has passed.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Returns `true` if the token is literally expired at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }

    /// Returns `true` when the token should be replaced at `now`.
    ///
    /// The token is treated as expired `margin` before its literal expiry so
    /// that requests in flight do not race the deadline. The margin is capped
    /// at half the token lifetime; a token that lives for two seconds is still
    /// served for the first second instead of being refreshed on every call.
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::{Duration, Utc};
    /// use weaviate_auth::auth::token::Token;
    ///
    /// let issued = Utc::now();
    /// let token = Token::issued("tok", None, issued, 600).unwrap();
    /// let margin = Duration::seconds(60);
    ///
    /// assert!(!token.needs_refresh_at(issued + Duration::seconds(500), margin));
    /// assert!(token.needs_refresh_at(issued + Duration::seconds(550), margin));
    /// ```
    pub fn needs_refresh_at(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        let margin = std::cmp::min(margin, self.lifetime() / 2);
        match self.expires_at().checked_sub_signed(margin) {
            Some(deadline) => now >= deadline,
            None => true,
        }
    }

    /// [`needs_refresh_at`](Self::needs_refresh_at) evaluated now.
    pub fn needs_refresh(&self, margin: Duration) -> bool {
        self.needs_refresh_at(Utc::now(), margin)
    }

    fn lifetime(&self) -> Duration {
        i64::try_from(self.lifetime_seconds)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("access_token", &"<redacted>")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("issued_at", &self.issued_at)
            .field("lifetime_seconds", &self.lifetime_seconds)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
