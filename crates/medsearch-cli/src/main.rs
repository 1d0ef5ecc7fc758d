//! medsearch: cited answers from medical literature, from the terminal.
//! Entry point for the `medsearch` binary.

mod commands;
mod config;
mod render;

use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dotenv = dotenvy::dotenv();

    // Logs go to stderr so answers on stdout stay pipeable.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("medsearch=debug,info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Ok(path) = dotenv {
        debug!("Loaded environment from {}", path.display());
    }

    let cli = commands::Cli::parse();

    let config = config::Config::load()?;
    info!(
        "Configuration loaded. Polling every {}s, up to {} attempts; default source: {}",
        config.polling.interval_secs,
        config.polling.max_attempts,
        config.search.default_source_type
    );

    commands::run(cli, config).await
}
