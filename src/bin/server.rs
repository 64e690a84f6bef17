//! pitchlake-server: the WebSocket fan-out process.
//!
//! Serves `/subscribeHome`, `/subscribeVault` and `/subscribeGas`, pushing
//! committed projection changes to subscribers as they are notified.

use anyhow::{Context, Result};
use dotenv::dotenv;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pitchlake_backend::config::ServerConfig;
use pitchlake_backend::server;

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pitchlake_backend=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    init_tracing();

    let config = ServerConfig::from_env()?;
    server::run(config).await.context("fan-out server stopped")?;
    Ok(())
}
