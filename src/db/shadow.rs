//! Shadow tables: per-block post-state snapshots of every mutable
//! projection row, used to invert forward mutations on reorgs.
//!
//! A forward handler mutates the row and then upserts the snapshot for the
//! mutating block; several events in one block collapse into one snapshot.
//! Reverting a block deletes its snapshot and restores the row from the most
//! recent earlier one. No earlier snapshot means the row was created in the
//! reverted block and is deleted outright.

use sqlx::{Postgres, Row, Transaction};

use crate::errors::IndexerError;
use crate::models::{LiquidityProviderState, OptionRound, VaultState};

use super::{money, projection};

pub async fn upsert_vault_snapshot(
    tx: &mut Transaction<'_, Postgres>,
    vault: &VaultState,
    block_number: i64,
) -> Result<(), IndexerError> {
    sqlx::query(
        "INSERT INTO vault_snapshots
         (address, block_number, current_round_id, current_round_address,
          unlocked_balance, locked_balance, stashed_balance)
         VALUES ($1, $2, $3, $4, $5::numeric, $6::numeric, $7::numeric)
         ON CONFLICT (address, block_number)
         DO UPDATE SET current_round_id = EXCLUDED.current_round_id,
                       current_round_address = EXCLUDED.current_round_address,
                       unlocked_balance = EXCLUDED.unlocked_balance,
                       locked_balance = EXCLUDED.locked_balance,
                       stashed_balance = EXCLUDED.stashed_balance",
    )
    .bind(&vault.address)
    .bind(block_number)
    .bind(vault.current_round_id)
    .bind(&vault.current_round_address)
    .bind(vault.unlocked_balance.to_string())
    .bind(vault.locked_balance.to_string())
    .bind(vault.stashed_balance.to_string())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Undo the vault mutations of `block_number`. No-op when the vault was not
/// touched in that block (its snapshot is already gone after the first
/// reverse handler of the block ran).
pub async fn revert_vault_state(
    tx: &mut Transaction<'_, Postgres>,
    address: &str,
    block_number: i64,
) -> Result<(), IndexerError> {
    let deleted = sqlx::query("DELETE FROM vault_snapshots WHERE address = $1 AND block_number = $2")
        .bind(address)
        .bind(block_number)
        .execute(&mut **tx)
        .await?;
    if deleted.rows_affected() == 0 {
        return Ok(());
    }

    let previous = sqlx::query(
        "SELECT block_number, current_round_id, current_round_address,
                unlocked_balance::text AS unlocked_balance,
                locked_balance::text AS locked_balance,
                stashed_balance::text AS stashed_balance
         FROM vault_snapshots
         WHERE address = $1
         ORDER BY block_number DESC
         LIMIT 1",
    )
    .bind(address)
    .fetch_optional(&mut **tx)
    .await?;

    match previous {
        None => projection::delete_vault_state(tx, address).await,
        Some(row) => {
            let snapshot_block: i64 = row.try_get("block_number").map_err(IndexerError::from)?;
            let round_id: i64 = row.try_get("current_round_id").map_err(IndexerError::from)?;
            let round_address: String =
                row.try_get("current_round_address").map_err(IndexerError::from)?;
            let unlocked = money(&row, "unlocked_balance").map_err(IndexerError::from)?;
            let locked = money(&row, "locked_balance").map_err(IndexerError::from)?;
            let stashed = money(&row, "stashed_balance").map_err(IndexerError::from)?;

            projection::update_vault_balances(tx, address, &unlocked, &locked, &stashed, snapshot_block)
                .await?;
            projection::update_vault_current_round(tx, address, round_id, &round_address, snapshot_block)
                .await
        }
    }
}

pub async fn upsert_lp_snapshot(
    tx: &mut Transaction<'_, Postgres>,
    lp: &LiquidityProviderState,
    block_number: i64,
) -> Result<(), IndexerError> {
    sqlx::query(
        "INSERT INTO lp_snapshots
         (vault_address, address, block_number, unlocked_balance, locked_balance, stashed_balance)
         VALUES ($1, $2, $3, $4::numeric, $5::numeric, $6::numeric)
         ON CONFLICT (vault_address, address, block_number)
         DO UPDATE SET unlocked_balance = EXCLUDED.unlocked_balance,
                       locked_balance = EXCLUDED.locked_balance,
                       stashed_balance = EXCLUDED.stashed_balance",
    )
    .bind(&lp.vault_address)
    .bind(&lp.address)
    .bind(block_number)
    .bind(lp.unlocked_balance.to_string())
    .bind(lp.locked_balance.to_string())
    .bind(lp.stashed_balance.to_string())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn revert_lp_state(
    tx: &mut Transaction<'_, Postgres>,
    vault_address: &str,
    address: &str,
    block_number: i64,
) -> Result<(), IndexerError> {
    let deleted = sqlx::query(
        "DELETE FROM lp_snapshots
         WHERE vault_address = $1 AND address = $2 AND block_number = $3",
    )
    .bind(vault_address)
    .bind(address)
    .bind(block_number)
    .execute(&mut **tx)
    .await?;
    if deleted.rows_affected() == 0 {
        return Ok(());
    }

    let previous = sqlx::query(
        "SELECT block_number,
                unlocked_balance::text AS unlocked_balance,
                locked_balance::text AS locked_balance,
                stashed_balance::text AS stashed_balance
         FROM lp_snapshots
         WHERE vault_address = $1 AND address = $2
         ORDER BY block_number DESC
         LIMIT 1",
    )
    .bind(vault_address)
    .bind(address)
    .fetch_optional(&mut **tx)
    .await?;

    match previous {
        None => projection::delete_lp_state(tx, vault_address, address).await,
        Some(row) => {
            let lp = LiquidityProviderState {
                vault_address: vault_address.to_string(),
                address: address.to_string(),
                unlocked_balance: money(&row, "unlocked_balance").map_err(IndexerError::from)?,
                locked_balance: money(&row, "locked_balance").map_err(IndexerError::from)?,
                stashed_balance: money(&row, "stashed_balance").map_err(IndexerError::from)?,
                latest_block: row.try_get("block_number").map_err(IndexerError::from)?,
            };
            projection::upsert_lp_state(tx, &lp).await
        }
    }
}

/// Undo every LP mutation of `block_number` for a vault.
pub async fn revert_all_lp_states(
    tx: &mut Transaction<'_, Postgres>,
    vault_address: &str,
    block_number: i64,
) -> Result<(), IndexerError> {
    let rows = sqlx::query(
        "SELECT address FROM lp_snapshots WHERE vault_address = $1 AND block_number = $2",
    )
    .bind(vault_address)
    .bind(block_number)
    .fetch_all(&mut **tx)
    .await?;

    let addresses: Vec<String> = rows
        .iter()
        .map(|row| row.try_get("address"))
        .collect::<Result<_, sqlx::Error>>()
        .map_err(IndexerError::from)?;

    for address in addresses {
        revert_lp_state(tx, vault_address, &address, block_number).await?;
    }
    Ok(())
}

/// Round snapshots store the whole row as JSON: rounds carry a dozen
/// mutable pricing fields and the reverse path restores them wholesale.
pub async fn upsert_round_snapshot(
    tx: &mut Transaction<'_, Postgres>,
    round: &OptionRound,
    block_number: i64,
) -> Result<(), IndexerError> {
    let snapshot = serde_json::to_value(round)
        .map_err(|e| IndexerError::Invariant(format!("round snapshot serialization: {e}")))?;
    sqlx::query(
        "INSERT INTO round_snapshots (address, block_number, snapshot)
         VALUES ($1, $2, $3)
         ON CONFLICT (address, block_number)
         DO UPDATE SET snapshot = EXCLUDED.snapshot",
    )
    .bind(&round.address)
    .bind(block_number)
    .bind(snapshot)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn revert_round_state(
    tx: &mut Transaction<'_, Postgres>,
    address: &str,
    block_number: i64,
) -> Result<(), IndexerError> {
    let deleted =
        sqlx::query("DELETE FROM round_snapshots WHERE address = $1 AND block_number = $2")
            .bind(address)
            .bind(block_number)
            .execute(&mut **tx)
            .await?;
    if deleted.rows_affected() == 0 {
        return Ok(());
    }

    let previous = sqlx::query(
        "SELECT snapshot FROM round_snapshots
         WHERE address = $1
         ORDER BY block_number DESC
         LIMIT 1",
    )
    .bind(address)
    .fetch_optional(&mut **tx)
    .await?;

    match previous {
        None => projection::delete_option_round(tx, address).await,
        Some(row) => {
            let snapshot: serde_json::Value = row.try_get("snapshot").map_err(IndexerError::from)?;
            let round: OptionRound = serde_json::from_value(snapshot)
                .map_err(|e| IndexerError::Invariant(format!("corrupt round snapshot: {e}")))?;
            projection::update_option_round(tx, &round).await
        }
    }
}
