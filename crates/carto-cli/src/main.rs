use clap::Parser;
use tracing_subscriber::EnvFilter;

use carto_server::{CartoServer, ServerConfig};

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    let default_filter = if args.verbose {
        "carto=debug,tower_http=debug"
    } else {
        "carto=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let config = match &args.config {
        Some(path) => ServerConfig::load(path)?,
        None => {
            tracing::warn!("no configuration file given; using defaults");
            ServerConfig::default()
        }
    };

    CartoServer::new(config).serve().await?;
    Ok(())
}
