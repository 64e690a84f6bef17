//! LISTEN task for out-of-band vault registrations.
//!
//! An insert into `vault_registry` fires the `vault_insert` channel with the
//! new row; the task bootstraps the vault from its deployment block and
//! catches it up when it is behind the journal head. Failures are logged and
//! the task keeps listening: a broken registration must not take down block
//! ingestion.

use std::sync::Arc;

use sqlx::postgres::PgListener;
use tracing::{error, info, warn};

use crate::db::{journal, Db};
use crate::errors::IndexerError;
use crate::models::VaultRegistry;

use super::vaults::VaultManager;

pub struct RegistryListener {
    db: Db,
    db_url: String,
    vaults: Arc<VaultManager>,
}

impl RegistryListener {
    pub fn new(db: Db, db_url: &str, vaults: Arc<VaultManager>) -> Self {
        Self {
            db,
            db_url: db_url.to_string(),
            vaults,
        }
    }

    pub async fn run(self) -> Result<(), IndexerError> {
        let mut listener = PgListener::connect(&self.db_url).await?;
        listener.listen("vault_insert").await?;
        info!("listening for vault registrations");

        loop {
            let notification = listener.recv().await?;
            let mut registry: VaultRegistry =
                match serde_json::from_str(notification.payload()) {
                    Ok(registry) => registry,
                    Err(err) => {
                        warn!("unparsable vault_insert payload: {err}");
                        continue;
                    }
                };

            info!(vault = %registry.address, "vault registration received");
            if let Err(err) = self.register(&mut registry).await {
                error!(vault = %registry.address, "vault registration failed: {err}");
            }
        }
    }

    async fn register(&self, registry: &mut VaultRegistry) -> Result<(), IndexerError> {
        if registry.last_block_indexed.is_none() {
            self.vaults.initialize_vault(registry).await?;
        }
        if let Some(head) = journal::get_last_block(self.db.pool()).await? {
            self.vaults.catchup_vault(registry, &head).await?;
        }
        Ok(())
    }
}
