/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint.

- `discover` — Resolve the server's OIDC provider
- `token`    — Obtain an access token with the configured credentials
*/

use std::sync::Arc;

use crate::auth::discovery::{self, Discovery};
use crate::auth::provider::TokenProvider;
use crate::auth::RequestAuthenticator;
use crate::config::Config;
use crate::error::{AuthError, Result};

// Discover command handler
pub mod discover {
    //! Prints where a server's tokens come from.

    use super::*;

    /// Resolve and print the OIDC provider of the configured server
    ///
    /// # Arguments
    ///
    /// * `config` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns discovery errors; a server without authentication is reported
    /// on stdout, not as an error.
    pub async fn run_discover(config: Config) -> Result<()> {
        let base_url = config.server_url()?;
        let http = config.http_client()?;

        match discovery::resolve(&http, &base_url).await? {
            Discovery::NotConfigured => {
                println!("Server {} has no authentication configured", base_url);
            }
            Discovery::Configured(metadata) => {
                println!("Token endpoint: {}", metadata.token_endpoint);
                if let Some(issuer) = &metadata.issuer {
                    println!("Issuer: {}", issuer);
                }
                if let Some(grants) = &metadata.grant_types_supported {
                    println!("Grant types: {}", grants.join(", "));
                }
                if let Some(client_id) = &metadata.client_id_hint {
                    println!("Suggested client id: {}", client_id);
                }
                if !metadata.scope_hints.is_empty() {
                    println!("Suggested scopes: {}", metadata.scope_hints.join(" "));
                }
            }
        }

        Ok(())
    }
}

// Token command handler
pub mod token {
    //! Obtains and prints an access token.

    use super::*;
    use std::collections::HashMap;

    use crate::auth::authenticator::AUTHORIZATION_HEADER;

    /// Obtain an access token and print it
    ///
    /// # Arguments
    ///
    /// * `config` - Loaded and validated configuration
    /// * `header` - Print `Bearer <token>` instead of the bare token
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Config`] when no auth method is configured, and
    /// any discovery or exchange error.
    pub async fn run_token(config: Config, header: bool) -> Result<()> {
        let settings = config.auth_settings()?.ok_or_else(|| {
            AuthError::Config("auth.method is none; configure credentials to obtain a token".to_string())
        })?;
        let base_url = config.server_url()?;
        let http = Arc::new(config.http_client()?);

        let provider = Arc::new(TokenProvider::connect(http, &base_url, settings).await?);
        let authenticator = RequestAuthenticator::new(provider.clone());

        if header {
            let mut headers = HashMap::new();
            authenticator.inject_headers(&mut headers).await?;
            if let Some(value) = headers.get(AUTHORIZATION_HEADER) {
                println!("{}", value);
            }
        } else {
            println!("{}", provider.get_access_token().await?);
        }

        if let Some(token) = provider.current_token().await {
            tracing::info!("Token expires at {}", token.expires_at());
        }

        Ok(())
    }
}
