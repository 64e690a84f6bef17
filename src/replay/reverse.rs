//! Reverse handlers: undo one journaled vault event during a block revert.
//!
//! Balance mutations restore from the shadow tables (delete the reverted
//! block's snapshot, restore the most recent earlier one); structural events
//! invert directly from their payload. Reverse handlers run in descending
//! `event_nonce`, so a later effect inside the block is undone before the
//! earlier effect it may depend on.

use sqlx::{Postgres, Transaction};
use tracing::debug;

use crate::db::{projection, shadow};
use crate::errors::IndexerError;
use crate::models::{Event, QueuedLiquidity};

use super::clearing;
use super::decode;

/// Dispatch one raw event to its reverse handler.
pub async fn revert_event(
    tx: &mut Transaction<'_, Postgres>,
    event: &Event,
) -> Result<(), IndexerError> {
    debug!(
        name = %event.event_name,
        vault = %event.vault_address,
        block = event.block_number,
        nonce = event.event_nonce,
        "reverting event"
    );
    match event.event_name.as_str() {
        "ContractDeployed" => {
            shadow::revert_vault_state(tx, &event.vault_address, event.block_number).await
        }
        "Deposit" | "Withdrawal" => {
            let p = decode::deposit_or_withdraw(event)?;
            shadow::revert_vault_state(tx, &event.vault_address, event.block_number).await?;
            shadow::revert_lp_state(tx, &event.vault_address, &p.lp_address, event.block_number)
                .await
        }
        "StashWithdrawn" => {
            let p = decode::stash_withdrawn(event)?;
            shadow::revert_vault_state(tx, &event.vault_address, event.block_number).await?;
            shadow::revert_lp_state(tx, &event.vault_address, &p.lp_address, event.block_number)
                .await
        }
        "WithdrawalQueued" => withdrawal_queued(tx, event).await,
        "OptionRoundDeployed" => {
            let p = decode::round_deployed(event)?;
            // Deleting the deployment-block snapshot drops the round row;
            // the vault restore rewinds the current-round pointer.
            shadow::revert_round_state(tx, &p.round_address, event.block_number).await?;
            shadow::revert_vault_state(tx, &event.vault_address, event.block_number).await
        }
        "PricingDataSet" => {
            let p = decode::pricing_data_set(event)?;
            shadow::revert_round_state(tx, &p.round_address, event.block_number).await
        }
        "AuctionStarted" => {
            let p = decode::auction_started(event)?;
            shadow::revert_vault_state(tx, &event.vault_address, event.block_number).await?;
            shadow::revert_all_lp_states(tx, &event.vault_address, event.block_number).await?;
            shadow::revert_round_state(tx, &p.round_address, event.block_number).await
        }
        "AuctionEnded" => {
            let p = decode::auction_ended(event)?;
            shadow::revert_vault_state(tx, &event.vault_address, event.block_number).await?;
            shadow::revert_all_lp_states(tx, &event.vault_address, event.block_number).await?;
            shadow::revert_round_state(tx, &p.round_address, event.block_number).await?;
            projection::reset_option_buyers_for_round(tx, &p.round_address).await
        }
        "OptionRoundSettled" => {
            let p = decode::round_settled(event)?;
            shadow::revert_vault_state(tx, &event.vault_address, event.block_number).await?;
            shadow::revert_all_lp_states(tx, &event.vault_address, event.block_number).await?;
            shadow::revert_round_state(tx, &p.round_address, event.block_number).await
        }
        "BidPlaced" => {
            let p = decode::bid_placed(event)?;
            projection::delete_bid(tx, &p.round_address, &p.bid_id).await
        }
        "BidUpdated" => {
            let p = decode::bid_updated(event)?;
            projection::unbump_bid_price(tx, &p.round_address, &p.bid_id, &p.price, p.tree_nonce_old)
                .await
        }
        "OptionsMinted" => {
            let p = decode::options_minted(event)?;
            projection::set_option_buyer_minted(tx, &p.round_address, &p.buyer_address, false).await
        }
        "OptionsExercised" => {
            let p = decode::options_exercised(event)?;
            // Exercising freshly-minted options also flipped has_minted.
            if !p.mintable_options_exercised.is_zero() {
                projection::set_option_buyer_minted(tx, &p.round_address, &p.buyer_address, false)
                    .await?;
            }
            Ok(())
        }
        "UnusedBidsRefunded" => {
            let p = decode::unused_bids_refunded(event)?;
            projection::set_option_buyer_refunded(tx, &p.round_address, &p.buyer_address, false)
                .await
        }
        "L1RequestFulfilled" => Ok(()),
        _ => Ok(()),
    }
}

/// Restore the queued-withdrawal ledger from the event's before/after
/// values. No shadow rows exist for this event: it moves no balances.
async fn withdrawal_queued(
    tx: &mut Transaction<'_, Postgres>,
    event: &Event,
) -> Result<(), IndexerError> {
    let p = decode::withdrawal_queued(event)?;
    let vault = projection::get_vault_state(&mut **tx, &event.vault_address)
        .await?
        .ok_or_else(|| {
            IndexerError::Invariant(format!("vault {} not in projection", event.vault_address))
        })?;

    projection::upsert_queued_liquidity(
        tx,
        &QueuedLiquidity {
            address: p.lp_address,
            round_address: vault.current_round_address.clone(),
            bps: p.bps,
            queued_liquidity: p.account_queued_before.clone(),
        },
    )
    .await?;

    let restored = clearing::reverted_round_queued(
        &p.vault_queued_now,
        &p.account_queued_before,
        &p.account_queued_now,
    )?;
    projection::update_round_queued_liquidity(tx, &vault.current_round_address, &restored).await
}
