//! Cached, self-refreshing access-token provider
//!
//! [`TokenProvider`] is the single owner of a client's access token. It
//! serves the cached token while it is fresh and transparently runs the
//! configured [`GrantStrategy`] when the token enters its refresh margin.
//!
//! # Concurrency
//!
//! The provider is shared through an `Arc` by every outbound request of a
//! client. Readers take a snapshot of the current `Arc<Token>` under a read
//! lock. Refreshes are serialised by the mutex guarding the strategy, so at
//! most one exchange is in flight per provider.
//!
//! - A token inside its refresh margin that has not expired is served at
//!   once; a spawned task refreshes it. After a failed attempt, background
//!   refreshes pause for [`REFRESH_RETRY_BACKOFF_SECONDS`].
//! - An expired token blocks the caller. Callers that queued behind an
//!   exchange receive its token or its error instead of starting another.
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use url::Url;
//! use weaviate_auth::auth::provider::{AuthSettings, Credentials, TokenProvider};
//!
//! # async fn example() -> weaviate_auth::error::Result<()> {
//! let http = Arc::new(reqwest::Client::new());
//! let settings = AuthSettings::new(Credentials::ClientCredentials {
//!     client_secret: "s3cret".to_string(),
//! })
//! .with_client_id("wcs");
//!
//! let provider = TokenProvider::connect(http, &Url::parse("http://localhost:8080")?, settings).await?;
//! let token = provider.get_access_token().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::{Mutex, RwLock};
use url::Url;

use crate::auth::discovery::{self, Discovery, ProviderMetadata};
use crate::auth::exchange::{OidcConfig, TokenExchanger, DEFAULT_TOKEN_LIFETIME_SECONDS};
use crate::auth::grant::GrantStrategy;
use crate::auth::token::Token;
use crate::error::{AuthError, Result};

/// Default time before expiry at which a token is refreshed.
pub const DEFAULT_REFRESH_MARGIN_SECONDS: i64 = 30;

/// Pause between background refresh attempts after a failure.
pub const REFRESH_RETRY_BACKOFF_SECONDS: i64 = 5;

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Credentials a client authenticates with.
#[derive(Clone)]
pub enum Credentials {
    /// OAuth client secret for the client credentials grant.
    ClientCredentials {
        /// The client secret.
        client_secret: String,
    },

    /// Resource owner username and password.
    Password {
        /// Username.
        username: String,
        /// Password.
        password: String,
    },

    /// A token obtained out of band.
    BearerToken {
        /// The access token.
        access_token: String,
        /// Remaining lifetime of the access token in seconds.
        lifetime_seconds: u64,
        /// Refresh token, if one was issued with the access token.
        refresh_token: Option<String>,
    },
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ClientCredentials { .. } => f.write_str("ClientCredentials { .. }"),
            Self::Password { username, .. } => f
                .debug_struct("Password")
                .field("username", username)
                .finish_non_exhaustive(),
            Self::BearerToken {
                lifetime_seconds,
                refresh_token,
                ..
            } => f
                .debug_struct("BearerToken")
                .field("lifetime_seconds", lifetime_seconds)
                .field("has_refresh_token", &refresh_token.is_some())
                .finish_non_exhaustive(),
        }
    }
}

impl Credentials {
    /// A bearer token with the default lifetime and no refresh token.
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self::BearerToken {
            access_token: access_token.into(),
            lifetime_seconds: DEFAULT_TOKEN_LIFETIME_SECONDS,
            refresh_token: None,
        }
    }

    /// Builds the grant strategy for these credentials.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidToken`] for a bearer token with an empty
    /// access token.
    pub fn into_strategy(self, client_id: &str) -> Result<GrantStrategy> {
        match self {
            Self::ClientCredentials { client_secret } => Ok(GrantStrategy::ClientCredentials {
                client_id: client_id.to_string(),
                secret: client_secret,
            }),
            Self::Password { username, password } => Ok(GrantStrategy::ResourceOwnerPassword {
                username,
                secret: password,
            }),
            Self::BearerToken {
                access_token,
                lifetime_seconds,
                refresh_token,
            } => {
                let current = Token::new(access_token, refresh_token, lifetime_seconds)?;
                if current.refresh_token().is_some() {
                    Ok(GrantStrategy::RefreshToken { current })
                } else {
                    tracing::warn!(
                        "Bearer token supplied without a refresh token; automatic refresh is impossible, supply a new token once it expires at {}",
                        current.expires_at()
                    );
                    Ok(GrantStrategy::BearerPassthrough { current })
                }
            }
        }
    }
}

/// Caller-supplied authentication settings for [`TokenProvider::connect`].
#[derive(Debug, Clone)]
pub struct AuthSettings {
    /// OAuth client id. Falls back to the server's suggestion when `None`.
    pub client_id: Option<String>,

    /// Requested scopes. Fall back to the server's suggestion when empty.
    pub scopes: Vec<String>,

    /// How to authenticate.
    pub credentials: Credentials,

    /// How long before expiry a token is refreshed.
    pub refresh_margin: Duration,
}

impl AuthSettings {
    /// Creates settings with no client id, no scopes and the default margin.
    pub fn new(credentials: Credentials) -> Self {
        Self {
            client_id: None,
            scopes: Vec::new(),
            credentials,
            refresh_margin: Duration::seconds(DEFAULT_REFRESH_MARGIN_SECONDS),
        }
    }

    /// Sets the client id.
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Sets the requested scopes.
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the refresh margin.
    pub fn with_refresh_margin(mut self, margin: Duration) -> Self {
        self.refresh_margin = margin;
        self
    }

    /// Combines these settings with the server's hints.
    ///
    /// Explicit settings win; an empty client id is treated as absent.
    pub fn oidc_config(&self, metadata: &ProviderMetadata) -> OidcConfig {
        let client_id = self
            .client_id
            .clone()
            .filter(|id| !id.is_empty())
            .or_else(|| metadata.client_id_hint.clone())
            .unwrap_or_default();

        let scopes = if self.scopes.is_empty() {
            &metadata.scope_hints
        } else {
            &self.scopes
        };

        OidcConfig::new(client_id, scopes.iter().filter(|s| !s.is_empty()).cloned())
    }
}

// ---------------------------------------------------------------------------
// TokenProvider
// ---------------------------------------------------------------------------

/// Owns one client's access token and keeps it fresh.
///
/// `TokenProvider` is `Send + Sync`; share it with `Arc`.
#[derive(Debug)]
pub struct TokenProvider {
    inner: Arc<ProviderInner>,
}

/// State shared between the provider and its background refresh tasks.
#[derive(Debug)]
struct ProviderInner {
    metadata: ProviderMetadata,
    oidc: OidcConfig,
    exchanger: TokenExchanger,
    margin: Duration,

    /// Set for bearer passthrough: the token is served verbatim forever.
    passthrough: bool,

    current: RwLock<Option<Arc<Token>>>,

    /// Completed exchange attempts, successful or not.
    attempts: AtomicU64,

    /// Guards the strategy and serialises refreshes.
    refresh: Mutex<RefreshState>,
}

#[derive(Debug)]
struct RefreshState {
    strategy: GrantStrategy,

    /// Error of the most recent attempt; `None` after a success.
    last_error: Option<AuthError>,

    last_failure_at: Option<DateTime<Utc>>,
}

impl RefreshState {
    fn backing_off(&self, now: DateTime<Utc>) -> bool {
        self.last_failure_at
            .map_or(false, |at| now < at + Duration::seconds(REFRESH_RETRY_BACKOFF_SECONDS))
    }
}

impl TokenProvider {
    /// Creates a provider for already resolved provider metadata.
    ///
    /// The cache is primed with the strategy's seed token, if any. No request
    /// is made until [`get_access_token`](Self::get_access_token) is called.
    ///
    /// # Arguments
    ///
    /// * `metadata` - Resolved provider metadata.
    /// * `oidc` - Client id and scopes.
    /// * `strategy` - How new tokens are obtained.
    /// * `exchanger` - Token endpoint client.
    /// * `margin` - Refresh margin, capped per token at half its lifetime.
    pub fn new(
        metadata: ProviderMetadata,
        oidc: OidcConfig,
        strategy: GrantStrategy,
        exchanger: TokenExchanger,
        margin: Duration,
    ) -> Self {
        let passthrough = matches!(strategy, GrantStrategy::BearerPassthrough { .. });
        let seed = strategy.seed_token().cloned().map(Arc::new);

        if !passthrough && !metadata.supports_grant(strategy.kind()) {
            tracing::warn!(
                grant_type = strategy.kind(),
                "Identity provider does not advertise the configured grant type"
            );
        }

        Self {
            inner: Arc::new(ProviderInner {
                metadata,
                oidc,
                exchanger,
                margin: margin.max(Duration::zero()),
                passthrough,
                current: RwLock::new(seed),
                attempts: AtomicU64::new(0),
                refresh: Mutex::new(RefreshState {
                    strategy,
                    last_error: None,
                    last_failure_at: None,
                }),
            }),
        }
    }

    /// Discovers the identity provider of a Weaviate server and builds a
    /// provider for it.
    ///
    /// For strategies that exchange credentials, the first token is acquired
    /// before returning, so bad credentials fail here rather than on the
    /// first request.
    ///
    /// # Arguments
    ///
    /// * `http` - Shared HTTP client; its timeout bounds every request.
    /// * `base_url` - Base URL of the Weaviate server.
    /// * `settings` - Credentials, client id, scopes and refresh margin.
    ///
    /// # Errors
    ///
    /// - [`AuthError::AuthNotConfigured`] when the server has no
    ///   authentication configured.
    /// - [`AuthError::Config`] when no client id is configured and the server
    ///   does not suggest one.
    /// - Any discovery or exchange error of the first acquisition.
    pub async fn connect(
        http: Arc<reqwest::Client>,
        base_url: &Url,
        settings: AuthSettings,
    ) -> Result<Self> {
        let metadata = match discovery::resolve(&http, base_url).await? {
            Discovery::NotConfigured => return Err(AuthError::AuthNotConfigured.into()),
            Discovery::Configured(metadata) => metadata,
        };

        let oidc = settings.oidc_config(&metadata);
        let exchanges = !matches!(
            settings.credentials,
            Credentials::BearerToken {
                refresh_token: None,
                ..
            }
        );
        if exchanges && oidc.client_id.is_empty() {
            return Err(AuthError::Config(
                "no OIDC client id configured and the server does not suggest one".to_string(),
            )
            .into());
        }

        let strategy = settings.credentials.into_strategy(&oidc.client_id)?;
        tracing::debug!(
            strategy = strategy.kind(),
            client_id = %oidc.client_id,
            scopes = %oidc.scope_param(),
            "Creating token provider"
        );

        let provider = Self::new(
            metadata,
            oidc,
            strategy,
            TokenExchanger::new(http),
            settings.refresh_margin,
        );

        if !provider.inner.passthrough {
            provider.get_access_token().await?;
        }
        Ok(provider)
    }

    /// Returns a valid access token.
    ///
    /// A token inside its refresh margin is returned at once while a
    /// background task refreshes it. An expired (or missing) token is
    /// refreshed before returning; concurrent callers share one exchange and
    /// its outcome.
    ///
    /// # Errors
    ///
    /// Returns the exchange error when the cached token has literally
    /// expired (or there is none) and the refresh fails.
    pub async fn get_access_token(&self) -> Result<String> {
        let cached = self.inner.current.read().await.clone();
        if let Some(token) = cached {
            if self.inner.passthrough || !token.needs_refresh(self.inner.margin) {
                return Ok(token.access_token().to_string());
            }
            if !token.is_expired() {
                self.refresh_in_background();
                return Ok(token.access_token().to_string());
            }
        }

        let token = self.inner.refresh_or_join().await?;
        Ok(token.access_token().to_string())
    }

    /// Resolved provider metadata.
    pub fn metadata(&self) -> &ProviderMetadata {
        &self.inner.metadata
    }

    /// Client id and scopes presented to the provider.
    pub fn oidc(&self) -> &OidcConfig {
        &self.inner.oidc
    }

    /// Snapshot of the cached token, if any.
    pub async fn current_token(&self) -> Option<Arc<Token>> {
        self.inner.current.read().await.clone()
    }

    /// Starts a refresh task unless one is in flight, the strategy cannot
    /// refresh, or the last attempt failed less than the back-off ago.
    fn refresh_in_background(&self) {
        let Ok(state) = self.inner.refresh.try_lock() else {
            return;
        };
        if !state.strategy.is_refreshable() || state.backing_off(Utc::now()) {
            return;
        }
        drop(state);

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let mut state = inner.refresh.lock().await;
            if inner.fresh_token().await.is_some() || state.backing_off(Utc::now()) {
                return;
            }
            if let Err(err) = inner.exchange(&mut state).await {
                tracing::warn!(
                    error = %err,
                    "Background token refresh failed, serving the cached token until it expires"
                );
            }
        });
    }
}

impl ProviderInner {
    async fn fresh_token(&self) -> Option<Arc<Token>> {
        let current = self.current.read().await;
        match current.as_ref() {
            Some(token) if self.passthrough || !token.needs_refresh(self.margin) => {
                Some(Arc::clone(token))
            }
            _ => None,
        }
    }

    /// Refreshes the token, or hands back the outcome of an exchange that
    /// finished while this caller waited for the lock.
    async fn refresh_or_join(&self) -> Result<Arc<Token>> {
        let seen = self.attempts.load(Ordering::SeqCst);
        let mut state = self.refresh.lock().await;

        if self.attempts.load(Ordering::SeqCst) != seen {
            match &state.last_error {
                Some(err) => return self.serve_cached_or(err.clone().into()).await,
                None => {
                    if let Some(token) = self.current.read().await.clone() {
                        return Ok(token);
                    }
                }
            }
        }

        if let Some(token) = self.fresh_token().await {
            return Ok(token);
        }

        match self.exchange(&mut state).await {
            Ok(token) => Ok(token),
            Err(err) => self.serve_cached_or(err).await,
        }
    }

    /// Returns the cached token while it is still valid, `err` otherwise.
    async fn serve_cached_or(&self, err: anyhow::Error) -> Result<Arc<Token>> {
        let cached = self.current.read().await.clone();
        match cached {
            Some(token) if !token.is_expired() => {
                tracing::warn!(
                    error = %err,
                    expires_at = %token.expires_at(),
                    "Token refresh failed, serving the cached token until it expires"
                );
                Ok(token)
            }
            _ => Err(err),
        }
    }

    /// Runs one exchange and records its outcome. Must be called with the
    /// refresh lock held.
    async fn exchange(&self, state: &mut RefreshState) -> Result<Arc<Token>> {
        let outcome = self.try_exchange(&mut state.strategy).await;
        match &outcome {
            Ok(_) => {
                state.last_error = None;
                state.last_failure_at = None;
            }
            Err(err) => {
                state.last_error = Some(shared_error(err));
                state.last_failure_at = Some(Utc::now());
            }
        }
        self.attempts.fetch_add(1, Ordering::SeqCst);
        outcome
    }

    async fn try_exchange(&self, strategy: &mut GrantStrategy) -> Result<Arc<Token>> {
        let grant = strategy.build_grant()?;
        let token = self
            .exchanger
            .exchange(&self.metadata, &self.oidc, &grant)
            .await?;
        strategy.absorb(&token);

        let token = Arc::new(token);
        *self.current.write().await = Some(Arc::clone(&token));

        tracing::info!(
            strategy = strategy.kind(),
            expires_at = %token.expires_at(),
            "Access token refreshed"
        );
        Ok(token)
    }
}

fn shared_error(err: &anyhow::Error) -> AuthError {
    err.downcast_ref::<AuthError>()
        .cloned()
        .unwrap_or_else(|| AuthError::RefreshUnavailable(format!("{err:#}")))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
