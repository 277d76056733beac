//! Configuration management for weaviate-auth
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.
//!
//! Precedence, lowest to highest: built-in defaults, the YAML file,
//! `WEAVIATE_*` environment variables, command-line flags.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::auth::provider::{AuthSettings, Credentials};
use crate::error::{AuthError, Result};

/// Main configuration structure for weaviate-auth
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Weaviate server connection settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Authentication settings
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Weaviate server connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base URL of the Weaviate server (scheme, host, optional port and path)
    #[serde(default = "default_server_url")]
    pub url: String,
}

fn default_server_url() -> String {
    "http://localhost:8080".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: default_server_url(),
        }
    }
}

/// How the client authenticates
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// No authentication
    #[default]
    None,
    /// OAuth client credentials grant
    ClientCredentials,
    /// Resource owner password grant
    Password,
    /// Pre-obtained access token, optionally with a refresh token
    BearerToken,
}

impl FromStr for AuthMethod {
    type Err = AuthError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(Self::None),
            "client_credentials" => Ok(Self::ClientCredentials),
            "password" => Ok(Self::Password),
            "bearer_token" | "bearer" => Ok(Self::BearerToken),
            other => Err(AuthError::Config(format!(
                "Invalid auth method: {}. Must be one of: none, client_credentials, password, bearer_token",
                other
            ))),
        }
    }
}

/// Authentication settings
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Authentication method
    #[serde(default)]
    pub method: AuthMethod,

    /// OAuth client id; the server's suggestion is used when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// Requested scopes; the server's suggestion is used when empty
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<String>,

    /// Client secret for `client_credentials`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    /// Username for `password`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Password for `password`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Access token for `bearer_token`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    /// Refresh token for `bearer_token`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Remaining lifetime of the supplied access token
    #[serde(default = "default_access_token_lifetime_seconds")]
    pub access_token_lifetime_seconds: u64,

    /// How long before expiry tokens are refreshed
    #[serde(default = "default_refresh_margin_seconds")]
    pub refresh_margin_seconds: u64,

    /// Timeout for discovery and token requests
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

fn default_access_token_lifetime_seconds() -> u64 {
    60
}

fn default_refresh_margin_seconds() -> u64 {
    30
}

fn default_request_timeout_seconds() -> u64 {
    30
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            method: AuthMethod::None,
            client_id: None,
            scopes: Vec::new(),
            client_secret: None,
            username: None,
            password: None,
            access_token: None,
            refresh_token: None,
            access_token_lifetime_seconds: default_access_token_lifetime_seconds(),
            refresh_margin_seconds: default_refresh_margin_seconds(),
            request_timeout_seconds: default_request_timeout_seconds(),
        }
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn redact(value: &Option<String>) -> Option<&'static str> {
            value.as_ref().map(|_| "<redacted>")
        }

        f.debug_struct("AuthConfig")
            .field("method", &self.method)
            .field("client_id", &self.client_id)
            .field("scopes", &self.scopes)
            .field("client_secret", &redact(&self.client_secret))
            .field("username", &self.username)
            .field("password", &redact(&self.password))
            .field("access_token", &redact(&self.access_token))
            .field("refresh_token", &redact(&self.refresh_token))
            .field(
                "access_token_lifetime_seconds",
                &self.access_token_lifetime_seconds,
            )
            .field("refresh_margin_seconds", &self.refresh_margin_seconds)
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .finish()
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// A missing file is not an error: defaults are used and a warning is
    /// logged.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the YAML configuration file
    /// * `cli` - Parsed command line, for overrides
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Config`] if the file exists but cannot be read
    /// or parsed.
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| AuthError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| AuthError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(url) = std::env::var("WEAVIATE_URL") {
            self.server.url = url;
        }

        if let Ok(method) = std::env::var("WEAVIATE_AUTH_METHOD") {
            match method.parse() {
                Ok(value) => self.auth.method = value,
                Err(_) => tracing::warn!("Invalid WEAVIATE_AUTH_METHOD: {}", method),
            }
        }

        let string_overrides: [(&str, &mut Option<String>); 6] = [
            ("WEAVIATE_CLIENT_ID", &mut self.auth.client_id),
            ("WEAVIATE_CLIENT_SECRET", &mut self.auth.client_secret),
            ("WEAVIATE_USERNAME", &mut self.auth.username),
            ("WEAVIATE_PASSWORD", &mut self.auth.password),
            ("WEAVIATE_ACCESS_TOKEN", &mut self.auth.access_token),
            ("WEAVIATE_REFRESH_TOKEN", &mut self.auth.refresh_token),
        ];
        for (name, field) in string_overrides {
            if let Ok(value) = std::env::var(name) {
                *field = Some(value);
            }
        }

        if let Ok(scopes) = std::env::var("WEAVIATE_SCOPES") {
            self.auth.scopes = scopes
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Ok(timeout) = std::env::var("WEAVIATE_AUTH_TIMEOUT_SECONDS") {
            if let Ok(value) = timeout.parse() {
                self.auth.request_timeout_seconds = value;
            } else {
                tracing::warn!("Invalid WEAVIATE_AUTH_TIMEOUT_SECONDS: {}", timeout);
            }
        }

        if let Ok(margin) = std::env::var("WEAVIATE_REFRESH_MARGIN_SECONDS") {
            if let Ok(value) = margin.parse() {
                self.auth.refresh_margin_seconds = value;
            } else {
                tracing::warn!("Invalid WEAVIATE_REFRESH_MARGIN_SECONDS: {}", margin);
            }
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let Some(url) = &cli.url {
            self.server.url = url.clone();
        }

        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }
    }

    /// Validate the configuration
    ///
    /// Checks the server URL, the timeouts and that every field the chosen
    /// auth method needs is present.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Config`] describing the first failed check.
    pub fn validate(&self) -> Result<()> {
        self.server_url()?;

        if self.auth.request_timeout_seconds == 0 {
            return Err(AuthError::Config(
                "auth.request_timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        self.refresh_margin()?;

        self.credentials().map(|_| ())
    }

    /// Parsed server base URL
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Config`] for an unparsable URL or a scheme other
    /// than `http`/`https`.
    pub fn server_url(&self) -> Result<Url> {
        let url = Url::parse(&self.server.url).map_err(|e| {
            AuthError::Config(format!("Invalid server.url '{}': {}", self.server.url, e))
        })?;

        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(AuthError::Config(format!(
                "Invalid server.url scheme '{}'. Must be http or https",
                other
            ))
            .into()),
        }
    }

    /// Converts the auth block into provider settings
    ///
    /// Returns `None` when the auth method is `none`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Config`] when a field required by the auth
    /// method is missing.
    pub fn auth_settings(&self) -> Result<Option<AuthSettings>> {
        let Some(credentials) = self.credentials()? else {
            return Ok(None);
        };

        let mut settings = AuthSettings::new(credentials)
            .with_scopes(self.auth.scopes.iter().cloned())
            .with_refresh_margin(self.refresh_margin()?);
        if let Some(client_id) = self.auth.client_id.as_ref().filter(|id| !id.is_empty()) {
            settings = settings.with_client_id(client_id.clone());
        }

        Ok(Some(settings))
    }

    /// Builds the HTTP client used for discovery and token requests
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Config`] if the client cannot be constructed.
    pub fn http_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(
                self.auth.request_timeout_seconds,
            ))
            .build()
            .map_err(|e| AuthError::Config(format!("Failed to build HTTP client: {}", e)).into())
    }

    fn refresh_margin(&self) -> Result<chrono::Duration> {
        i64::try_from(self.auth.refresh_margin_seconds)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .ok_or_else(|| {
                AuthError::Config(format!(
                    "auth.refresh_margin_seconds is out of range: {}",
                    self.auth.refresh_margin_seconds
                ))
                .into()
            })
    }

    fn credentials(&self) -> Result<Option<Credentials>> {
        let auth = &self.auth;
        let credentials = match auth.method {
            AuthMethod::None => return Ok(None),
            AuthMethod::ClientCredentials => Credentials::ClientCredentials {
                client_secret: required(&auth.client_secret, "client_secret", "client_credentials")?,
            },
            AuthMethod::Password => Credentials::Password {
                username: required(&auth.username, "username", "password")?,
                password: required(&auth.password, "password", "password")?,
            },
            AuthMethod::BearerToken => Credentials::BearerToken {
                access_token: required(&auth.access_token, "access_token", "bearer_token")?,
                lifetime_seconds: auth.access_token_lifetime_seconds,
                refresh_token: auth.refresh_token.clone().filter(|t| !t.is_empty()),
            },
        };
        Ok(Some(credentials))
    }
}

fn required(value: &Option<String>, field: &str, method: &str) -> Result<String> {
    value
        .clone()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            AuthError::Config(format!(
                "auth.{} is required when auth.method is {}",
                field, method
            ))
            .into()
        })
}
