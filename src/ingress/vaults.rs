//! Tracked-vault registry and per-vault catch-up.
//!
//! The in-memory map answers the hot-path `is_tracked` check during block
//! processing; the database row is the durable record. Catch-up must produce
//! rows bit-identical to live ingestion: events are journaled in ascending
//! (block, in-block) order and the per-vault nonce is assigned by insert
//! order.

use std::collections::HashMap;

use parking_lot::Mutex;
use sqlx::{Postgres, Transaction};
use tracing::{info, warn};

use crate::db::{journal, Db};
use crate::errors::IndexerError;
use crate::felt::{self, CONTRACT_DEPLOYED};
use crate::models::{StarknetBlock, VaultRegistry};

use super::rpc::{BlockId, EmittedEvent, StarknetRpc};

pub struct VaultManager {
    db: Db,
    rpc: StarknetRpc,
    udc_address: String,
    registry: Mutex<HashMap<String, VaultRegistry>>,
}

impl VaultManager {
    pub fn new(db: Db, rpc: StarknetRpc, udc_address: &str) -> Result<Self, IndexerError> {
        let udc_address = if udc_address.is_empty() {
            String::new()
        } else {
            felt::normalize_hex(udc_address)?
        };
        Ok(Self {
            db,
            rpc,
            udc_address,
            registry: Mutex::new(HashMap::new()),
        })
    }

    /// Hot path: is this (normalized) address a tracked vault?
    pub fn is_tracked(&self, address: &str) -> bool {
        self.registry.lock().contains_key(address)
    }

    pub fn tracked_count(&self) -> usize {
        self.registry.lock().len()
    }

    fn track(&self, registry: VaultRegistry) {
        self.registry.lock().insert(registry.address.clone(), registry);
    }

    /// Load the registry from the database and bring every vault up to the
    /// current head: bootstrap vaults that were never indexed, and enqueue a
    /// catch-up for any vault whose coverage lags the head by more than one
    /// block.
    pub async fn sync_from_registry(
        &self,
        head: Option<&StarknetBlock>,
    ) -> Result<(), IndexerError> {
        let rows = journal::get_vault_registry(self.db.pool()).await?;
        for mut row in rows {
            row.address = felt::normalize_hex(&row.address)?;
            if row.last_block_indexed.is_none() {
                self.initialize_vault(&mut row).await?;
            }
            self.track(row.clone());

            let Some(head) = head else { continue };
            let Some(last_indexed) = &row.last_block_indexed else { continue };

            let behind = match journal::get_block(self.db.pool(), last_indexed).await? {
                Some(block) => block.block_number < head.block_number - 1,
                None => true,
            };
            if behind {
                self.catchup_vault(&row, head).await?;
            }
        }
        info!(vaults = self.tracked_count(), "vault registry synced");
        Ok(())
    }

    /// Bootstrap a newly discovered vault from its deployment block: journal
    /// the UDC `ContractDeployed` event addressed to it, then every other
    /// event the vault emitted in that block.
    pub async fn initialize_vault(&self, vault: &mut VaultRegistry) -> Result<(), IndexerError> {
        vault.address = felt::normalize_hex(&vault.address)?;
        let deploy_block = self.rpc.get_block(BlockId::hash(&vault.deployed_at)).await?;
        let events = self
            .rpc
            .get_events(
                BlockId::hash(&vault.deployed_at),
                BlockId::hash(&vault.deployed_at),
                None,
            )
            .await?;

        let deployed_selector = felt::event_selector(CONTRACT_DEPLOYED);
        let mut tx = self.db.begin().await?;

        for event in &events {
            let from = felt::normalize_hex(&event.from_address)?;
            let selector = event.keys.first().and_then(|k| felt::normalize_hex(k).ok());
            let deployed_address = event.data.first().and_then(|d| felt::normalize_hex(d).ok());
            let is_deployment = from == self.udc_address
                && selector.as_deref() == Some(deployed_selector.as_str())
                && deployed_address.as_deref() == Some(vault.address.as_str());
            if is_deployment {
                journal::insert_event(
                    &mut tx,
                    &from,
                    &event.transaction_hash,
                    &vault.address,
                    event.block_number,
                    &deploy_block.block_hash,
                    deploy_block.timestamp,
                    CONTRACT_DEPLOYED,
                    &event.keys,
                    &event.data,
                )
                .await?;
                vault.last_block_indexed = Some(deploy_block.block_hash.clone());
            }
        }

        if vault.last_block_indexed.is_none() {
            tx.rollback().await.ok();
            return Err(IndexerError::Invariant(format!(
                "no {CONTRACT_DEPLOYED} event for vault {} in block {}",
                vault.address, vault.deployed_at
            )));
        }

        // Same-block activity from the vault itself.
        for event in &events {
            if felt::normalize_hex(&event.from_address)? == vault.address {
                store_vault_event(&mut tx, &self.db_event(event, vault, &deploy_block)).await?;
            }
        }

        journal::insert_block(&mut tx, &deploy_block).await?;
        journal::insert_vault_registry(&mut tx, vault).await?;
        journal::update_vault_registry_last_indexed(
            &mut tx,
            &vault.address,
            &deploy_block.block_hash,
        )
        .await?;
        tx.commit().await?;

        info!(vault = %vault.address, block = deploy_block.block_number, "vault initialized");
        self.track(vault.clone());
        Ok(())
    }

    /// Journal the vault's missing events over `(last_block_indexed, head]`
    /// and enqueue the CatchupVault driver event covering them.
    pub async fn catchup_vault(
        &self,
        vault: &VaultRegistry,
        head: &StarknetBlock,
    ) -> Result<(), IndexerError> {
        let last_indexed = vault.last_block_indexed.as_deref().ok_or_else(|| {
            IndexerError::Invariant(format!("catchup for uninitialized vault {}", vault.address))
        })?;

        // Resolve the first missing block: journal lineage first, RPC when
        // the hash is not ours to know yet.
        let next = match journal::get_next_block(self.db.pool(), last_indexed).await? {
            Some(block) => block,
            None => {
                let last = match journal::get_block(self.db.pool(), last_indexed).await? {
                    Some(block) => block,
                    None => self.rpc.get_block(BlockId::hash(last_indexed)).await?,
                };
                self.rpc.get_block(BlockId::number(last.block_number + 1)).await?
            }
        };

        if next.block_number > head.block_number {
            return Ok(());
        }

        let events = self
            .rpc
            .get_events(
                BlockId::number(next.block_number),
                BlockId::number(head.block_number),
                Some(&vault.address),
            )
            .await?;

        let mut tx = self.db.begin().await?;
        journal::insert_block(&mut tx, &next).await?;

        let mut timestamps: HashMap<String, i64> = HashMap::new();
        timestamps.insert(next.block_hash.clone(), next.timestamp);
        timestamps.insert(head.block_hash.clone(), head.timestamp);

        for event in &events {
            let timestamp = match timestamps.get(&event.block_hash) {
                Some(ts) => *ts,
                None => {
                    let header = self.rpc.get_block(BlockId::hash(&event.block_hash)).await?;
                    timestamps.insert(event.block_hash.clone(), header.timestamp);
                    header.timestamp
                }
            };
            store_vault_event(
                &mut tx,
                &JournalEvent {
                    from: felt::normalize_hex(&event.from_address)?,
                    transaction_hash: event.transaction_hash.clone(),
                    vault_address: vault.address.clone(),
                    block_number: event.block_number,
                    block_hash: event.block_hash.clone(),
                    timestamp,
                    keys: event.keys.clone(),
                    data: event.data.clone(),
                },
            )
            .await?;
        }

        journal::insert_driver_event_catchup(
            &mut tx,
            &vault.address,
            &next.block_hash,
            &head.block_hash,
        )
        .await?;
        journal::update_vault_registry_last_indexed(&mut tx, &vault.address, &head.block_hash)
            .await?;
        tx.commit().await?;

        info!(
            vault = %vault.address,
            from = next.block_number,
            to = head.block_number,
            events = events.len(),
            "vault caught up"
        );

        let mut updated = vault.clone();
        updated.last_block_indexed = Some(head.block_hash.clone());
        self.track(updated);
        Ok(())
    }

    /// Journal one live event emitted by a tracked vault.
    pub async fn process_vault_event(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        transaction_hash: &str,
        vault_address: &str,
        keys: &[String],
        data: &[String],
        block: &StarknetBlock,
    ) -> Result<(), IndexerError> {
        store_vault_event(
            tx,
            &JournalEvent {
                from: vault_address.to_string(),
                transaction_hash: transaction_hash.to_string(),
                vault_address: vault_address.to_string(),
                block_number: block.block_number,
                block_hash: block.block_hash.clone(),
                timestamp: block.timestamp,
                keys: keys.to_vec(),
                data: data.to_vec(),
            },
        )
        .await
    }

    fn db_event(
        &self,
        event: &EmittedEvent,
        vault: &VaultRegistry,
        block: &StarknetBlock,
    ) -> JournalEvent {
        JournalEvent {
            from: vault.address.clone(),
            transaction_hash: event.transaction_hash.clone(),
            vault_address: vault.address.clone(),
            block_number: event.block_number,
            block_hash: block.block_hash.clone(),
            timestamp: block.timestamp,
            keys: event.keys.clone(),
            data: event.data.clone(),
        }
    }
}

struct JournalEvent {
    from: String,
    transaction_hash: String,
    vault_address: String,
    block_number: i64,
    block_hash: String,
    timestamp: i64,
    keys: Vec<String>,
    data: Vec<String>,
}

/// Decode the selector and journal the event; unknown selectors are silently
/// ignored so untracked event kinds never pollute the journal.
async fn store_vault_event(
    tx: &mut Transaction<'_, Postgres>,
    event: &JournalEvent,
) -> Result<(), IndexerError> {
    let Some(selector) = event.keys.first() else {
        warn!(tx_hash = %event.transaction_hash, "vault event without keys, ignoring");
        return Ok(());
    };
    let Some(name) = felt::decode_event_name(selector) else {
        return Ok(());
    };
    journal::insert_event(
        tx,
        &event.from,
        &event.transaction_hash,
        &event.vault_address,
        event.block_number,
        &event.block_hash,
        event.timestamp,
        name,
        &event.keys,
        &event.data,
    )
    .await
}
