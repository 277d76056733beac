//! weaviate-auth - OIDC token tool for Weaviate
//!
#![doc = "weaviate-auth - OIDC token tool for Weaviate"]
#![doc = "Main entry point for the weaviate-auth command line tool."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use weaviate_auth::cli::{Cli, Commands};
use weaviate_auth::commands;
use weaviate_auth::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Initialize tracing
    init_tracing(cli.verbose);

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    // Execute command
    match cli.command {
        Commands::Discover => {
            tracing::info!("Resolving OIDC provider for {}", config.server.url);
            commands::discover::run_discover(config).await?;
            Ok(())
        }
        Commands::Token { header } => {
            tracing::info!("Obtaining access token from {}", config.server.url);
            commands::token::run_token(config, header).await?;
            Ok(())
        }
    }
}

/// Logs go to stderr so that stdout carries only command output.
fn init_tracing(verbose: bool) {
    let default_directive = if verbose {
        "weaviate_auth=debug"
    } else {
        "weaviate_auth=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
