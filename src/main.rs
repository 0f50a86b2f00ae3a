use clap::Parser;
use powledger::api;
use powledger::config::{CliArgs, NodeConfig};
use powledger::runtime::Runtime;
use tracing::Level;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();
    let config = NodeConfig::load(&args)?;

    let level: Level = config
        .log_level
        .parse()
        .map_err(|_| format!("unknown log level: {}", config.log_level))?;
    tracing_subscriber::fmt().with_max_level(level).init();

    tracing::info!(
        listen = %config.listen_addr(),
        difficulty = config.difficulty,
        peers = config.peers.len(),
        "Starting ledger node"
    );

    let runtime = Runtime::from_config(&config)?;
    api::serve(runtime, &config.listen_addr()).await?;
    Ok(())
}
