use anyhow::{Context, Result};
use clap::Parser;
use olapgate_config::GatewayConfig;
use olapgate_server::cli::Cli;
use olapgate_server::start_server;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = LevelFilter::from(cli.log_level);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let mut config = GatewayConfig::load_or_default(cli.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(listen) = cli.listen {
        config.server.listen = listen;
    }

    start_server(config).await?;
    Ok(())
}
