//! Command-line interface definition for weaviate-auth
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands to inspect a server's OIDC setup and to obtain
//! access tokens.

use clap::{Parser, Subcommand};

/// weaviate-auth - OIDC token tool for Weaviate
///
/// Discovers the identity provider protecting a Weaviate server and
/// obtains access tokens with the configured credentials.
#[derive(Parser, Debug, Clone)]
#[command(name = "weaviate-auth")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Override the Weaviate server URL from config
    #[arg(long)]
    pub url: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Resolve and print the server's OIDC provider metadata
    Discover,

    /// Obtain an access token with the configured credentials
    Token {
        /// Print a complete `Authorization` header value instead of the bare token
        #[arg(long)]
        header: bool,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/config.yaml".to_string()),
            verbose: false,
            url: None,
            command: Commands::Discover,
        }
    }
}
