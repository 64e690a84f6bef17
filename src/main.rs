//! pitchlake-processor: the event replayer process.
//!
//! Owns the projection. Listens on the `driver_events` channel and applies
//! or reverts journaled vault events, one driver event per transaction.

use anyhow::{Context, Result};
use dotenv::dotenv;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pitchlake_backend::config::ProcessorConfig;
use pitchlake_backend::db::Db;
use pitchlake_backend::replay::Replayer;

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

    let config = ProcessorConfig::from_env()?;
    let db = Db::connect(&config.db_url)
        .await
        .context("database connection failed")?;

    info!("event processor starting");
    let replayer = Replayer::new(db, config.db_url.clone());
    // Order preservation: any replay error stops consumption instead of
    // skipping ahead; the process exits non-zero for the operator.
    replayer.run().await.context("replayer stopped")?;
    Ok(())
}
