//! weaviate-auth - OIDC access-token lifecycle for Weaviate clients
//!
//! This library discovers the identity provider protecting a Weaviate
//! deployment, exchanges credentials for access tokens, keeps the current
//! token fresh and attaches it to outbound REST, GraphQL and gRPC requests.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `auth`: Discovery, grant strategies, token exchange, the caching token
//!   provider and the request authenticator
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//! - `commands`: Command handlers for the CLI
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use weaviate_auth::{Config, RequestAuthenticator, TokenProvider};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.yaml", &Default::default())?;
//!     config.validate()?;
//!
//!     if let Some(settings) = config.auth_settings()? {
//!         let http = Arc::new(config.http_client()?);
//!         let provider = TokenProvider::connect(http, &config.server_url()?, settings).await?;
//!         let authenticator = RequestAuthenticator::new(Arc::new(provider));
//!         let request = authenticator
//!             .authorize(reqwest::Client::new().get("http://localhost:8080/v1/schema"))
//!             .await?;
//!     }
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;

// Re-export commonly used types
pub use auth::{AuthSettings, Credentials, RequestAuthenticator, Token, TokenProvider};
pub use config::Config;
pub use error::{AuthError, Result};
