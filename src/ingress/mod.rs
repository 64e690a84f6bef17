//! Chain ingress: the plug-in loaded into a chain-node host.
//!
//! The host delivers canonical blocks and reverts synchronously through
//! [`ChainPlugin`]; everything durable happens inside one journal
//! transaction per callback, and long-running work (vault catch-up, replay)
//! is handed off through driver events rather than blocking the host.

pub mod block;
pub mod registry_listener;
pub mod rpc;
pub mod vaults;

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::PluginConfig;
use crate::db::{journal, Db};
use crate::errors::IndexerError;
use crate::models::StarknetBlock;

use block::BlockProcessor;
use registry_listener::RegistryListener;
use rpc::StarknetRpc;
use vaults::VaultManager;

/// Block shape delivered by the host, receipts and events included.
#[derive(Debug, Clone)]
pub struct HostBlock {
    pub block_number: i64,
    pub block_hash: String,
    pub parent_hash: String,
    pub timestamp: i64,
    pub receipts: Vec<HostReceipt>,
}

#[derive(Debug, Clone)]
pub struct HostReceipt {
    pub transaction_hash: String,
    pub events: Vec<HostEvent>,
}

#[derive(Debug, Clone)]
pub struct HostEvent {
    pub from: String,
    pub keys: Vec<String>,
    pub data: Vec<String>,
}

/// State-diff payloads the host hands over alongside blocks. The ingress
/// journals events only and passes these through untouched.
#[derive(Debug, Clone, Default)]
pub struct StateUpdate;

#[derive(Debug, Clone, Default)]
pub struct ClassDeclarations;

/// The loader contract of the host node. Callbacks are synchronous from the
/// host's perspective: when `new_block` returns, the block is durably
/// journaled or the host is free to redeliver it.
#[async_trait]
pub trait ChainPlugin {
    async fn init(&mut self) -> Result<(), IndexerError>;
    async fn new_block(
        &self,
        block: &HostBlock,
        state_update: &StateUpdate,
        new_classes: &ClassDeclarations,
    ) -> Result<(), IndexerError>;
    async fn revert_block(
        &self,
        from: &HostBlock,
        to: &HostBlock,
        reverse_state_diff: &StateUpdate,
    ) -> Result<(), IndexerError>;
    async fn shutdown(&mut self) -> Result<(), IndexerError>;
}

/// The Pitchlake event logger.
pub struct PitchlakePlugin {
    db: Db,
    config: PluginConfig,
    vaults: Arc<VaultManager>,
    blocks: BlockProcessor,
    synced: Mutex<bool>,
    listener_task: Option<JoinHandle<()>>,
}

impl PitchlakePlugin {
    /// Build the plugin from the environment: database pool, RPC client,
    /// vault manager, block processor.
    pub async fn from_env() -> Result<Self, IndexerError> {
        let config = PluginConfig::from_env()?;
        let db = Db::connect(&config.db_url).await?;
        let rpc = StarknetRpc::new(&config.rpc_url)?;
        let vaults = Arc::new(VaultManager::new(db.clone(), rpc, &config.udc_address)?);

        let last_block = journal::get_last_block(db.pool()).await?;
        let blocks = BlockProcessor::new(
            db.clone(),
            StarknetRpc::new(&config.rpc_url)?,
            Arc::clone(&vaults),
            config.cursor,
            last_block,
        );

        Ok(Self {
            db,
            config,
            vaults,
            blocks,
            synced: Mutex::new(false),
            listener_task: None,
        })
    }

    /// One-time sync against the journal, run lazily off the first callback:
    /// backfill the block lineage behind the delivered block, then bring
    /// every registered vault up to the journal head. Set `synced` only when
    /// everything passed so a failed sync retries on the next callback.
    async fn check_and_sync(&self, current: &StarknetBlock) -> Result<(), IndexerError> {
        if *self.synced.lock() {
            return Ok(());
        }

        info!(block = current.block_number, "syncing journal to host head");
        self.blocks.catchup_blocks(current.block_number).await?;
        let head = journal::get_last_block(self.db.pool()).await?;
        self.vaults.sync_from_registry(head.as_ref()).await?;

        *self.synced.lock() = true;
        Ok(())
    }
}

#[async_trait]
impl ChainPlugin for PitchlakePlugin {
    async fn init(&mut self) -> Result<(), IndexerError> {
        info!("initializing pitchlake plugin");
        let listener = RegistryListener::new(
            self.db.clone(),
            &self.config.db_url,
            Arc::clone(&self.vaults),
        );
        self.listener_task = Some(tokio::spawn(async move {
            if let Err(err) = listener.run().await {
                error!("vault registry listener stopped: {err}");
            }
        }));
        Ok(())
    }

    async fn new_block(
        &self,
        block: &HostBlock,
        _state_update: &StateUpdate,
        _new_classes: &ClassDeclarations,
    ) -> Result<(), IndexerError> {
        self.check_and_sync(&StarknetBlock {
            block_number: block.block_number,
            block_hash: block.block_hash.clone(),
            parent_hash: block.parent_hash.clone(),
            timestamp: block.timestamp,
            status: crate::models::BlockStatus::Mined,
        })
        .await?;
        self.blocks.process_new_block(block).await
    }

    async fn revert_block(
        &self,
        from: &HostBlock,
        _to: &HostBlock,
        _reverse_state_diff: &StateUpdate,
    ) -> Result<(), IndexerError> {
        self.blocks.revert_block(from).await
    }

    async fn shutdown(&mut self) -> Result<(), IndexerError> {
        info!("shutting down pitchlake plugin");
        if let Some(task) = self.listener_task.take() {
            task.abort();
        }
        Ok(())
    }
}
