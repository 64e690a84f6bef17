//! Append-only journal: block lineage, raw vault events, driver events and
//! the vault registry. The chain ingress is the only writer; the replayer
//! reads event slices per driver event.

use sqlx::postgres::{PgExecutor, PgRow};
use sqlx::{Postgres, Row, Transaction};

use crate::errors::IndexerError;
use crate::models::{
    BlockStatus, DriverEvent, DriverEventKind, Event, StarknetBlock, VaultRegistry,
};

use super::parsed;

const BLOCK_COLUMNS: &str = "block_number, block_hash, parent_hash, timestamp, status";

fn block_from_row(row: &PgRow) -> Result<StarknetBlock, sqlx::Error> {
    Ok(StarknetBlock {
        block_number: row.try_get("block_number")?,
        block_hash: row.try_get("block_hash")?,
        parent_hash: row.try_get("parent_hash")?,
        timestamp: row.try_get("timestamp")?,
        status: parsed::<BlockStatus>(row, "status")?,
    })
}

pub async fn insert_block(
    tx: &mut Transaction<'_, Postgres>,
    block: &StarknetBlock,
) -> Result<(), IndexerError> {
    sqlx::query(
        "INSERT INTO starknet_blocks (block_number, block_hash, parent_hash, timestamp, status)
         VALUES ($1, $2, $3, $4, $5)
         ON CONFLICT (block_hash) DO NOTHING",
    )
    .bind(block.block_number)
    .bind(&block.block_hash)
    .bind(&block.parent_hash)
    .bind(block.timestamp)
    .bind(block.status.as_str())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn mark_block_reverted(
    tx: &mut Transaction<'_, Postgres>,
    block_number: i64,
    block_hash: &str,
) -> Result<(), IndexerError> {
    sqlx::query(
        "UPDATE starknet_blocks SET status = 'REVERTED'
         WHERE block_number = $1 AND block_hash = $2",
    )
    .bind(block_number)
    .bind(block_hash)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn get_block<'e, E: PgExecutor<'e>>(
    exec: E,
    block_hash: &str,
) -> Result<Option<StarknetBlock>, IndexerError> {
    let row = sqlx::query(&format!(
        "SELECT {BLOCK_COLUMNS} FROM starknet_blocks WHERE block_hash = $1"
    ))
    .bind(block_hash)
    .fetch_optional(exec)
    .await?;
    row.as_ref().map(block_from_row).transpose().map_err(Into::into)
}

/// The child of `block_hash` in the stored lineage, if already journaled.
pub async fn get_next_block<'e, E: PgExecutor<'e>>(
    exec: E,
    parent_hash: &str,
) -> Result<Option<StarknetBlock>, IndexerError> {
    let row = sqlx::query(&format!(
        "SELECT {BLOCK_COLUMNS} FROM starknet_blocks WHERE parent_hash = $1 AND status = 'MINED'"
    ))
    .bind(parent_hash)
    .fetch_optional(exec)
    .await?;
    row.as_ref().map(block_from_row).transpose().map_err(Into::into)
}

/// Highest MINED block, i.e. the indexer's cursor position.
pub async fn get_last_block<'e, E: PgExecutor<'e>>(
    exec: E,
) -> Result<Option<StarknetBlock>, IndexerError> {
    let row = sqlx::query(&format!(
        "SELECT {BLOCK_COLUMNS} FROM starknet_blocks
         WHERE status = 'MINED'
         ORDER BY block_number DESC
         LIMIT 1"
    ))
    .fetch_optional(exec)
    .await?;
    row.as_ref().map(block_from_row).transpose().map_err(Into::into)
}

const EVENT_COLUMNS: &str = "\"from\", transaction_hash, block_number, block_hash, vault_address,
     timestamp, event_nonce, event_name, event_keys, event_data";

fn event_from_row(row: &PgRow) -> Result<Event, sqlx::Error> {
    Ok(Event {
        from: row.try_get("from")?,
        transaction_hash: row.try_get("transaction_hash")?,
        block_number: row.try_get("block_number")?,
        block_hash: row.try_get("block_hash")?,
        vault_address: row.try_get("vault_address")?,
        timestamp: row.try_get("timestamp")?,
        event_nonce: row.try_get("event_nonce")?,
        event_name: row.try_get("event_name")?,
        event_keys: row.try_get("event_keys")?,
        event_data: row.try_get("event_data")?,
    })
}

/// Journal one raw vault event. The per-vault `event_nonce` is assigned here
/// by insert order; ingress and catch-up share this path so overlapping
/// blocks produce identical rows.
#[allow(clippy::too_many_arguments)]
pub async fn insert_event(
    tx: &mut Transaction<'_, Postgres>,
    from: &str,
    transaction_hash: &str,
    vault_address: &str,
    block_number: i64,
    block_hash: &str,
    timestamp: i64,
    event_name: &str,
    event_keys: &[String],
    event_data: &[String],
) -> Result<(), IndexerError> {
    sqlx::query(
        "INSERT INTO events
         (\"from\", transaction_hash, vault_address, block_number, block_hash, timestamp,
          event_name, event_keys, event_data, event_nonce)
         VALUES ($1, $2, $3::varchar, $4, $5, $6, $7, $8, $9,
             (SELECT COALESCE(MAX(event_nonce), 0) + 1
              FROM events
              WHERE vault_address = $3::varchar))",
    )
    .bind(from)
    .bind(transaction_hash)
    .bind(vault_address)
    .bind(block_number)
    .bind(block_hash)
    .bind(timestamp)
    .bind(event_name)
    .bind(event_keys)
    .bind(event_data)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Events of one block, ordered by `event_nonce`. Forward replay reads
/// ascending, reverse replay descending.
pub async fn get_events_by_block_hash(
    tx: &mut Transaction<'_, Postgres>,
    block_hash: &str,
    ascending: bool,
) -> Result<Vec<Event>, IndexerError> {
    let order = if ascending { "ASC" } else { "DESC" };
    let rows = sqlx::query(&format!(
        "SELECT {EVENT_COLUMNS} FROM events WHERE block_hash = $1 ORDER BY event_nonce {order}"
    ))
    .bind(block_hash)
    .fetch_all(&mut **tx)
    .await?;
    rows.iter().map(event_from_row).collect::<Result<_, _>>().map_err(Into::into)
}

/// Events for one vault over an inclusive block-number range, in replay
/// order.
pub async fn get_events_for_vault(
    tx: &mut Transaction<'_, Postgres>,
    vault_address: &str,
    from_block: i64,
    to_block: i64,
) -> Result<Vec<Event>, IndexerError> {
    let rows = sqlx::query(&format!(
        "SELECT {EVENT_COLUMNS} FROM events
         WHERE vault_address = $1 AND block_number BETWEEN $2 AND $3
         ORDER BY block_number ASC, event_nonce ASC"
    ))
    .bind(vault_address)
    .bind(from_block)
    .bind(to_block)
    .fetch_all(&mut **tx)
    .await?;
    rows.iter().map(event_from_row).collect::<Result<_, _>>().map_err(Into::into)
}

pub async fn get_vault_registry<'e, E: PgExecutor<'e>>(
    exec: E,
) -> Result<Vec<VaultRegistry>, IndexerError> {
    let rows = sqlx::query(
        "SELECT vault_address, deployed_at, last_block_indexed, last_block_processed
         FROM vault_registry",
    )
    .fetch_all(exec)
    .await?;
    rows.iter()
        .map(|row| {
            Ok(VaultRegistry {
                address: row.try_get("vault_address")?,
                deployed_at: row.try_get("deployed_at")?,
                last_block_indexed: row.try_get("last_block_indexed")?,
                last_block_processed: row.try_get("last_block_processed")?,
            })
        })
        .collect::<Result<_, sqlx::Error>>()
        .map_err(Into::into)
}

pub async fn insert_vault_registry(
    tx: &mut Transaction<'_, Postgres>,
    registry: &VaultRegistry,
) -> Result<(), IndexerError> {
    sqlx::query(
        "INSERT INTO vault_registry (vault_address, deployed_at, last_block_indexed, last_block_processed)
         VALUES ($1, $2, $3, $4)
         ON CONFLICT (vault_address) DO NOTHING",
    )
    .bind(&registry.address)
    .bind(&registry.deployed_at)
    .bind(&registry.last_block_indexed)
    .bind(&registry.last_block_processed)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn update_vault_registry_last_indexed(
    tx: &mut Transaction<'_, Postgres>,
    vault_address: &str,
    block_hash: &str,
) -> Result<(), IndexerError> {
    sqlx::query("UPDATE vault_registry SET last_block_indexed = $1 WHERE vault_address = $2")
        .bind(block_hash)
        .bind(vault_address)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Recorded by the replayer after a vault catch-up commits, marking how far
/// the projection has consumed this vault's journal.
pub async fn update_vault_registry_last_processed(
    tx: &mut Transaction<'_, Postgres>,
    vault_address: &str,
    block_hash: &str,
) -> Result<(), IndexerError> {
    sqlx::query("UPDATE vault_registry SET last_block_processed = $1 WHERE vault_address = $2")
        .bind(block_hash)
        .bind(vault_address)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Enqueue a StartBlock/RevertBlock driver event. The insert fires the
/// `driver_events` NOTIFY through a table trigger, so the replayer wakes up
/// only after this transaction commits.
pub async fn insert_driver_event_block(
    tx: &mut Transaction<'_, Postgres>,
    kind: DriverEventKind,
    block_hash: &str,
) -> Result<(), IndexerError> {
    sqlx::query(
        "INSERT INTO driver_events (sequence_index, type, block_hash, timestamp)
         VALUES (nextval('driver_events_sequence'), $1, $2, NOW())",
    )
    .bind(kind.as_str())
    .bind(block_hash)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn insert_driver_event_catchup(
    tx: &mut Transaction<'_, Postgres>,
    vault_address: &str,
    start_block_hash: &str,
    end_block_hash: &str,
) -> Result<(), IndexerError> {
    sqlx::query(
        "INSERT INTO driver_events
         (sequence_index, type, vault_address, start_block_hash, end_block_hash, timestamp)
         VALUES (nextval('driver_events_sequence'), 'CatchupVault', $1, $2, $3, NOW())",
    )
    .bind(vault_address)
    .bind(start_block_hash)
    .bind(end_block_hash)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn get_unprocessed_driver_events<'e, E: PgExecutor<'e>>(
    exec: E,
) -> Result<Vec<DriverEvent>, IndexerError> {
    let rows = sqlx::query(
        "SELECT id, sequence_index, type, timestamp, is_processed, block_hash, vault_address,
                start_block_hash, end_block_hash
         FROM driver_events
         WHERE is_processed = false
         ORDER BY sequence_index ASC",
    )
    .fetch_all(exec)
    .await?;
    rows.iter()
        .map(|row| {
            Ok(DriverEvent {
                id: row.try_get("id")?,
                sequence_index: row.try_get("sequence_index")?,
                kind: parsed::<DriverEventKind>(row, "type")?,
                timestamp: row.try_get("timestamp")?,
                is_processed: row.try_get("is_processed")?,
                block_hash: row.try_get("block_hash")?,
                vault_address: row.try_get("vault_address")?,
                start_block_hash: row.try_get("start_block_hash")?,
                end_block_hash: row.try_get("end_block_hash")?,
            })
        })
        .collect::<Result<_, sqlx::Error>>()
        .map_err(Into::into)
}

pub async fn mark_driver_event_processed(
    tx: &mut Transaction<'_, Postgres>,
    id: i32,
) -> Result<(), IndexerError> {
    sqlx::query("UPDATE driver_events SET is_processed = true WHERE id = $1")
        .bind(id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}
