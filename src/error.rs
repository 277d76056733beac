//! Error types for weaviate-auth
//!
//! This module defines the error taxonomy of the token lifecycle subsystem,
//! using `thiserror` for ergonomic error handling. Functions return the
//! [`Result`] alias; callers that need to branch on a specific failure
//! recover the typed error with `downcast_ref::<AuthError>()`.

use std::sync::Arc;

use thiserror::Error;

/// Main error type for weaviate-auth operations
///
/// Every variant carries enough context (URL, status code, provider error
/// code and description) to diagnose a failure without re-running the
/// request.
///
/// Cloneable: the outcome of one token exchange is handed to every caller
/// that waited on it. Wrapped library errors sit behind an `Arc`.
#[derive(Error, Debug, Clone)]
pub enum AuthError {
    /// Discovery returned `404`: the server has no authentication configured,
    /// but the caller asked for an authenticated client.
    #[error("Auth001: The client was configured to use authentication, but weaviate is configured without authentication. Are you sure this is correct?")]
    AuthNotConfigured,

    /// A discovery document request returned an unexpected status code
    #[error("OIDC configuration url {url} returned status code {status}")]
    Discovery {
        /// The discovery URL that was requested
        url: String,
        /// The HTTP status code returned by the server
        status: u16,
    },

    /// A discovery document could not be parsed
    #[error("OIDC configuration url {url} returned an unreadable document: {reason}")]
    MalformedDiscovery {
        /// The discovery URL that was requested
        url: String,
        /// Parser diagnostic
        reason: String,
    },

    /// The token endpoint rejected the grant
    #[error("{description} (code={code})")]
    TokenExchange {
        /// Provider error code (e.g. `invalid_client`)
        code: String,
        /// Human-readable provider error description
        description: String,
    },

    /// Transport-level failure (DNS, TLS, timeout) during discovery or exchange
    #[error("Network error: {0}")]
    Network(#[source] Arc<reqwest::Error>),

    /// The token has expired and the grant strategy cannot obtain a new one
    #[error("Token refresh unavailable: {0}")]
    RefreshUnavailable(String),

    /// A token without a usable access token was supplied or issued
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[source] Arc<std::io::Error>),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[source] Arc<serde_json::Error>),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[source] Arc<serde_yaml::Error>),
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(Arc::new(err))
    }
}

impl From<std::io::Error> for AuthError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(Arc::new(err))
    }
}

impl From<serde_yaml::Error> for AuthError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Yaml(Arc::new(err))
    }
}

/// Result type alias for weaviate-auth operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;
