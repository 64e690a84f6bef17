//! Live block processing: translate host callbacks into journal rows and
//! driver events, and backfill block lineage gaps in windows.

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};

use crate::db::{journal, Db};
use crate::errors::IndexerError;
use crate::felt;
use crate::models::{DriverEventKind, StarknetBlock};

use super::vaults::VaultManager;
use super::HostBlock;

/// Backfill window: one transaction per 1,000 blocks.
const CATCHUP_WINDOW: i64 = 1_000;
/// Blocks re-fetched before the last stored block, tolerating shallow reorgs
/// across restarts.
const CATCHUP_LOOKBACK: i64 = 3;

pub struct BlockProcessor {
    db: Db,
    rpc: super::rpc::StarknetRpc,
    vaults: Arc<VaultManager>,
    cursor: u64,
    last_block: Mutex<Option<StarknetBlock>>,
}

impl BlockProcessor {
    pub fn new(
        db: Db,
        rpc: super::rpc::StarknetRpc,
        vaults: Arc<VaultManager>,
        cursor: u64,
        last_block: Option<StarknetBlock>,
    ) -> Self {
        Self {
            db,
            rpc,
            vaults,
            cursor,
            last_block: Mutex::new(last_block),
        }
    }

    pub fn last_block(&self) -> Option<StarknetBlock> {
        self.last_block.lock().clone()
    }

    /// Journal a canonical new block: its tracked-vault events, the block
    /// row, and the StartBlock driver event, in one transaction. The driver
    /// event is inserted last so its NOTIFY only ever announces committed
    /// rows.
    pub async fn process_new_block(&self, block: &HostBlock) -> Result<(), IndexerError> {
        if (block.block_number as u64) < self.cursor {
            debug!(block = block.block_number, cursor = self.cursor, "below cursor, skipping");
            return Ok(());
        }

        let stored = StarknetBlock {
            block_number: block.block_number,
            block_hash: block.block_hash.clone(),
            parent_hash: block.parent_hash.clone(),
            timestamp: block.timestamp,
            status: crate::models::BlockStatus::Mined,
        };

        let mut tx = self.db.begin().await?;
        for receipt in &block.receipts {
            for event in &receipt.events {
                let from = felt::normalize_hex(&event.from)?;
                if self.vaults.is_tracked(&from) {
                    self.vaults
                        .process_vault_event(
                            &mut tx,
                            &receipt.transaction_hash,
                            &from,
                            &event.keys,
                            &event.data,
                            &stored,
                        )
                        .await?;
                }
            }
        }
        journal::insert_block(&mut tx, &stored).await?;
        journal::insert_driver_event_block(&mut tx, DriverEventKind::StartBlock, &stored.block_hash)
            .await?;
        tx.commit().await?;

        info!(block = stored.block_number, hash = %stored.block_hash, "block journaled");
        *self.last_block.lock() = Some(stored);
        Ok(())
    }

    /// Retract the head block: flip its status and enqueue the RevertBlock
    /// driver event. Event rows stay journaled; the replayer walks them
    /// backwards off the block status change.
    pub async fn revert_block(&self, from: &HostBlock) -> Result<(), IndexerError> {
        let mut tx = self.db.begin().await?;
        journal::mark_block_reverted(&mut tx, from.block_number, &from.block_hash).await?;
        journal::insert_driver_event_block(&mut tx, DriverEventKind::RevertBlock, &from.block_hash)
            .await?;
        tx.commit().await?;

        info!(block = from.block_number, hash = %from.block_hash, "block reverted");
        *self.last_block.lock() = None;
        Ok(())
    }

    /// Fill the block-lineage gap up to (but not including) `latest`,
    /// fetching headers from the RPC in windows.
    pub async fn catchup_blocks(&self, latest: i64) -> Result<(), IndexerError> {
        let mut start = match self.last_block() {
            Some(block) => block.block_number,
            None => (latest - CATCHUP_LOOKBACK).max(self.cursor as i64).max(0),
        };

        while start < latest - 1 {
            let end = (start + CATCHUP_WINDOW).min(latest - 1);
            info!(from = start, to = end, "backfilling block lineage");

            let blocks = self.rpc.get_blocks(start, end).await?;
            let mut tx = self.db.begin().await?;
            for block in &blocks {
                journal::insert_block(&mut tx, block).await?;
            }
            tx.commit().await?;

            if let Some(last) = blocks.last() {
                *self.last_block.lock() = Some(last.clone());
            }
            start = end;
        }
        Ok(())
    }
}
