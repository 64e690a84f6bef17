//! Forward handlers: apply one journaled vault event to the projection.
//!
//! Every balance-mutating handler writes the post-state snapshot of each row
//! it touched, keyed by the event's block number, so the matching reverse
//! handler can undo the whole block later. All writes happen inside the
//! driver-event transaction owned by the dispatcher.

use sqlx::{Postgres, Transaction};
use tracing::debug;

use crate::db::{projection, shadow};
use crate::errors::IndexerError;
use crate::models::{
    Bid, BigInt, Event, LiquidityProviderState, OptionRound, QueuedLiquidity, RoundState,
    VaultState,
};

use super::clearing;
use super::decode;

async fn require_vault(
    tx: &mut Transaction<'_, Postgres>,
    address: &str,
) -> Result<VaultState, IndexerError> {
    projection::get_vault_state(&mut **tx, address)
        .await?
        .ok_or_else(|| IndexerError::Invariant(format!("vault {address} not in projection")))
}

async fn require_round(
    tx: &mut Transaction<'_, Postgres>,
    address: &str,
) -> Result<OptionRound, IndexerError> {
    projection::get_option_round(&mut **tx, address)
        .await?
        .ok_or_else(|| IndexerError::Invariant(format!("option round {address} not in projection")))
}

/// Dispatch one raw event to its forward handler.
pub async fn apply_event(
    tx: &mut Transaction<'_, Postgres>,
    event: &Event,
) -> Result<(), IndexerError> {
    debug!(
        name = %event.event_name,
        vault = %event.vault_address,
        block = event.block_number,
        nonce = event.event_nonce,
        "applying event"
    );
    match event.event_name.as_str() {
        "ContractDeployed" => contract_deployed(tx, event).await,
        "Deposit" | "Withdrawal" => deposit_or_withdraw(tx, event).await,
        "WithdrawalQueued" => withdrawal_queued(tx, event).await,
        "StashWithdrawn" => stash_withdrawn(tx, event).await,
        "OptionRoundDeployed" => round_deployed(tx, event).await,
        "PricingDataSet" => pricing_data_set(tx, event).await,
        "AuctionStarted" => auction_started(tx, event).await,
        "AuctionEnded" => auction_ended(tx, event).await,
        "OptionRoundSettled" => round_settled(tx, event).await,
        "BidPlaced" => bid_placed(tx, event).await,
        "BidUpdated" => bid_updated(tx, event).await,
        "OptionsMinted" => options_minted(tx, event).await,
        "OptionsExercised" => options_exercised(tx, event).await,
        "UnusedBidsRefunded" => unused_bids_refunded(tx, event).await,
        // Journaled for completeness, no projection effect.
        "L1RequestFulfilled" => Ok(()),
        _ => Ok(()),
    }
}

/// Vault deployment: create the projection row with its static parameters
/// and zero balances.
async fn contract_deployed(
    tx: &mut Transaction<'_, Postgres>,
    event: &Event,
) -> Result<(), IndexerError> {
    let p = decode::contract_deployed(event)?;
    let vault = VaultState {
        address: p.vault_address,
        current_round_id: 0,
        current_round_address: String::new(),
        unlocked_balance: BigInt::zero(),
        locked_balance: BigInt::zero(),
        stashed_balance: BigInt::zero(),
        latest_block: event.block_number,
        deployment_date: event.timestamp,
        fossil_client_address: p.fossil_client_address,
        eth_address: p.eth_address,
        option_round_class_hash: p.option_round_class_hash,
        alpha: p.alpha,
        strike_level: p.strike_level,
        round_transition_period: p.round_transition_period,
        auction_duration: p.auction_duration,
        round_duration: p.round_duration,
    };
    projection::insert_vault_state(tx, &vault).await?;
    shadow::upsert_vault_snapshot(tx, &vault, event.block_number).await
}

async fn deposit_or_withdraw(
    tx: &mut Transaction<'_, Postgres>,
    event: &Event,
) -> Result<(), IndexerError> {
    let p = decode::deposit_or_withdraw(event)?;
    let mut vault = require_vault(tx, &event.vault_address).await?;

    let prior = projection::get_lp_state(&mut **tx, &event.vault_address, &p.lp_address).await?;
    let lp = LiquidityProviderState {
        vault_address: event.vault_address.clone(),
        address: p.lp_address,
        unlocked_balance: p.lp_unlocked,
        locked_balance: prior.as_ref().map(|l| l.locked_balance.clone()).unwrap_or_default(),
        stashed_balance: prior.as_ref().map(|l| l.stashed_balance.clone()).unwrap_or_default(),
        latest_block: event.block_number,
    };
    projection::upsert_lp_state(tx, &lp).await?;
    shadow::upsert_lp_snapshot(tx, &lp, event.block_number).await?;

    vault.unlocked_balance = p.vault_unlocked;
    vault.latest_block = event.block_number;
    projection::update_vault_balances(
        tx,
        &vault.address,
        &vault.unlocked_balance,
        &vault.locked_balance,
        &vault.stashed_balance,
        event.block_number,
    )
    .await?;
    shadow::upsert_vault_snapshot(tx, &vault, event.block_number).await
}

/// Schedules a withdrawal against the next settlement; no balances move.
async fn withdrawal_queued(
    tx: &mut Transaction<'_, Postgres>,
    event: &Event,
) -> Result<(), IndexerError> {
    let p = decode::withdrawal_queued(event)?;
    let vault = require_vault(tx, &event.vault_address).await?;

    projection::upsert_queued_liquidity(
        tx,
        &QueuedLiquidity {
            address: p.lp_address,
            round_address: vault.current_round_address.clone(),
            bps: p.bps,
            queued_liquidity: p.account_queued_now,
        },
    )
    .await?;
    projection::update_round_queued_liquidity(tx, &vault.current_round_address, &p.vault_queued_now)
        .await
}

async fn stash_withdrawn(
    tx: &mut Transaction<'_, Postgres>,
    event: &Event,
) -> Result<(), IndexerError> {
    let p = decode::stash_withdrawn(event)?;
    let mut vault = require_vault(tx, &event.vault_address).await?;

    let mut lp = projection::get_lp_state(&mut **tx, &event.vault_address, &p.lp_address)
        .await?
        .ok_or_else(|| {
            IndexerError::Invariant(format!("stash withdrawal from unknown LP {}", p.lp_address))
        })?;
    lp.stashed_balance = lp.stashed_balance.checked_sub(&p.amount).ok_or_else(|| {
        IndexerError::Invariant(format!(
            "stash withdrawal of {} exceeds stashed balance of {}",
            p.amount, lp.address
        ))
    })?;
    lp.latest_block = event.block_number;
    projection::upsert_lp_state(tx, &lp).await?;
    shadow::upsert_lp_snapshot(tx, &lp, event.block_number).await?;

    vault.stashed_balance = p.vault_stashed;
    vault.latest_block = event.block_number;
    projection::update_vault_balances(
        tx,
        &vault.address,
        &vault.unlocked_balance,
        &vault.locked_balance,
        &vault.stashed_balance,
        event.block_number,
    )
    .await?;
    shadow::upsert_vault_snapshot(tx, &vault, event.block_number).await
}

async fn round_deployed(
    tx: &mut Transaction<'_, Postgres>,
    event: &Event,
) -> Result<(), IndexerError> {
    let p = decode::round_deployed(event)?;
    let mut vault = require_vault(tx, &event.vault_address).await?;

    let round = OptionRound {
        address: p.round_address.clone(),
        vault_address: event.vault_address.clone(),
        round_id: p.round_id,
        cap_level: None,
        strike_price: None,
        reserve_price: None,
        start_date: p.start_date,
        end_date: p.end_date,
        settlement_date: p.settlement_date,
        deployment_date: event.timestamp,
        starting_liquidity: BigInt::zero(),
        queued_liquidity: BigInt::zero(),
        remaining_liquidity: BigInt::zero(),
        available_options: BigInt::zero(),
        sold_options: None,
        clearing_price: None,
        unsold_liquidity: BigInt::zero(),
        premiums: BigInt::zero(),
        settlement_price: None,
        payout_per_option: None,
        state: RoundState::Open,
    };
    projection::insert_option_round(tx, &round).await?;
    shadow::upsert_round_snapshot(tx, &round, event.block_number).await?;

    vault.current_round_id = p.round_id;
    vault.current_round_address = p.round_address;
    projection::update_vault_current_round(
        tx,
        &vault.address,
        vault.current_round_id,
        &vault.current_round_address,
        event.block_number,
    )
    .await?;
    vault.latest_block = event.block_number;
    shadow::upsert_vault_snapshot(tx, &vault, event.block_number).await
}

async fn pricing_data_set(
    tx: &mut Transaction<'_, Postgres>,
    event: &Event,
) -> Result<(), IndexerError> {
    let p = decode::pricing_data_set(event)?;
    let mut round = require_round(tx, &p.round_address).await?;
    round.strike_price = Some(p.strike_price);
    round.cap_level = Some(p.cap_level);
    round.reserve_price = Some(p.reserve_price);
    projection::update_option_round(tx, &round).await?;
    shadow::upsert_round_snapshot(tx, &round, event.block_number).await
}

/// Lock the vault: every LP's unlocked balance becomes its locked balance
/// for the duration of the round.
async fn auction_started(
    tx: &mut Transaction<'_, Postgres>,
    event: &Event,
) -> Result<(), IndexerError> {
    let p = decode::auction_started(event)?;
    let mut vault = require_vault(tx, &event.vault_address).await?;
    let mut round = require_round(tx, &p.round_address).await?;

    for mut lp in projection::get_lps_for_vault(tx, &event.vault_address).await? {
        lp.locked_balance = lp.unlocked_balance.clone();
        lp.unlocked_balance = BigInt::zero();
        lp.latest_block = event.block_number;
        projection::upsert_lp_state(tx, &lp).await?;
        shadow::upsert_lp_snapshot(tx, &lp, event.block_number).await?;
    }

    vault.locked_balance = vault.unlocked_balance.clone();
    vault.unlocked_balance = BigInt::zero();
    vault.latest_block = event.block_number;
    projection::update_vault_balances(
        tx,
        &vault.address,
        &vault.unlocked_balance,
        &vault.locked_balance,
        &vault.stashed_balance,
        event.block_number,
    )
    .await?;
    shadow::upsert_vault_snapshot(tx, &vault, event.block_number).await?;

    round.starting_liquidity = p.starting_liquidity;
    round.available_options = p.available_options;
    round.state = RoundState::Auctioning;
    projection::update_option_round(tx, &round).await?;
    shadow::upsert_round_snapshot(tx, &round, event.block_number).await
}

/// Clear the auction: fill buyers, release unsold liquidity and credit
/// premiums.
async fn auction_ended(
    tx: &mut Transaction<'_, Postgres>,
    event: &Event,
) -> Result<(), IndexerError> {
    let p = decode::auction_ended(event)?;
    let mut vault = require_vault(tx, &event.vault_address).await?;
    let mut round = require_round(tx, &p.round_address).await?;

    let bids = projection::get_bids_for_round(tx, &p.round_address).await?;
    let fills =
        clearing::allocate_auction(&bids, &p.options_sold, &p.clearing_price, p.clearing_nonce)?;
    for fill in &fills {
        projection::ensure_option_buyer(tx, &p.round_address, &fill.buyer_address).await?;
        projection::add_option_buyer_fill(
            tx,
            &p.round_address,
            &fill.buyer_address,
            &fill.mintable,
            &fill.refundable,
        )
        .await?;
    }

    let lps = projection::get_lps_for_vault(tx, &event.vault_address).await?;
    let rebalanced = clearing::rebalance_lps_auction_end(
        &lps,
        &p.unsold_liquidity,
        &p.premiums,
        &round.starting_liquidity,
    )?;
    for change in &rebalanced {
        let lp = LiquidityProviderState {
            vault_address: event.vault_address.clone(),
            address: change.address.clone(),
            unlocked_balance: change.unlocked.clone(),
            locked_balance: change.locked.clone(),
            stashed_balance: lps
                .iter()
                .find(|l| l.address == change.address)
                .map(|l| l.stashed_balance.clone())
                .unwrap_or_default(),
            latest_block: event.block_number,
        };
        projection::upsert_lp_state(tx, &lp).await?;
        shadow::upsert_lp_snapshot(tx, &lp, event.block_number).await?;
    }

    vault.unlocked_balance = &vault.unlocked_balance + &(&p.unsold_liquidity + &p.premiums);
    vault.locked_balance =
        vault.locked_balance.checked_sub(&p.unsold_liquidity).ok_or_else(|| {
            IndexerError::Invariant(format!(
                "unsold liquidity {} exceeds vault locked balance",
                p.unsold_liquidity
            ))
        })?;
    vault.latest_block = event.block_number;
    projection::update_vault_balances(
        tx,
        &vault.address,
        &vault.unlocked_balance,
        &vault.locked_balance,
        &vault.stashed_balance,
        event.block_number,
    )
    .await?;
    shadow::upsert_vault_snapshot(tx, &vault, event.block_number).await?;

    round.clearing_price = Some(p.clearing_price);
    round.sold_options = Some(p.options_sold);
    round.unsold_liquidity = p.unsold_liquidity;
    round.premiums = p.premiums;
    round.state = RoundState::Running;
    projection::update_option_round(tx, &round).await?;
    shadow::upsert_round_snapshot(tx, &round, event.block_number).await
}

/// Settle the round: pay out options and split the remaining liquidity
/// across LPs, stashing the queued fraction.
async fn round_settled(
    tx: &mut Transaction<'_, Postgres>,
    event: &Event,
) -> Result<(), IndexerError> {
    let p = decode::round_settled(event)?;
    let mut vault = require_vault(tx, &event.vault_address).await?;
    let mut round = require_round(tx, &p.round_address).await?;

    let sold_options = round.sold_options.clone().ok_or_else(|| {
        IndexerError::Invariant(format!("round {} settled before auction end", round.address))
    })?;
    let lps = projection::get_lps_for_vault(tx, &event.vault_address).await?;
    let queued = projection::get_queued_liquidity_for_round(tx, &p.round_address).await?;

    let settlement = clearing::settle_round(
        &lps,
        &queued,
        &round.starting_liquidity,
        &round.unsold_liquidity,
        &round.premiums,
        &sold_options,
        &p.payout_per_option,
    )?;

    for result in &settlement.lps {
        let lp = LiquidityProviderState {
            vault_address: event.vault_address.clone(),
            address: result.address.clone(),
            unlocked_balance: result.unlocked.clone(),
            locked_balance: result.locked.clone(),
            stashed_balance: result.stashed.clone(),
            latest_block: event.block_number,
        };
        projection::upsert_lp_state(tx, &lp).await?;
        shadow::upsert_lp_snapshot(tx, &lp, event.block_number).await?;
    }

    let unstashed = settlement
        .remaining_liquidity
        .checked_sub(&settlement.stashed_total)
        .ok_or_else(|| {
            IndexerError::Invariant("stashed total exceeds remaining liquidity".to_string())
        })?;
    vault.unlocked_balance = &vault.unlocked_balance + &unstashed;
    vault.stashed_balance = &vault.stashed_balance + &settlement.stashed_total;
    vault.locked_balance = BigInt::zero();
    vault.latest_block = event.block_number;
    projection::update_vault_balances(
        tx,
        &vault.address,
        &vault.unlocked_balance,
        &vault.locked_balance,
        &vault.stashed_balance,
        event.block_number,
    )
    .await?;
    shadow::upsert_vault_snapshot(tx, &vault, event.block_number).await?;

    round.settlement_price = Some(p.settlement_price);
    round.payout_per_option = Some(p.payout_per_option);
    round.remaining_liquidity = settlement.remaining_liquidity;
    round.state = RoundState::Settled;
    projection::update_option_round(tx, &round).await?;
    shadow::upsert_round_snapshot(tx, &round, event.block_number).await
}

async fn bid_placed(
    tx: &mut Transaction<'_, Postgres>,
    event: &Event,
) -> Result<(), IndexerError> {
    let p = decode::bid_placed(event)?;
    projection::insert_bid(
        tx,
        &Bid {
            buyer_address: p.buyer_address.clone(),
            round_address: p.round_address.clone(),
            bid_id: p.bid_id,
            tree_nonce: p.tree_nonce,
            amount: p.amount,
            price: p.price,
        },
    )
    .await?;
    projection::ensure_option_buyer(tx, &p.round_address, &p.buyer_address).await
}

async fn bid_updated(
    tx: &mut Transaction<'_, Postgres>,
    event: &Event,
) -> Result<(), IndexerError> {
    let p = decode::bid_updated(event)?;
    projection::bump_bid_price(tx, &p.round_address, &p.bid_id, &p.price, p.tree_nonce_new).await
}

async fn options_minted(
    tx: &mut Transaction<'_, Postgres>,
    event: &Event,
) -> Result<(), IndexerError> {
    let p = decode::options_minted(event)?;
    projection::set_option_buyer_minted(tx, &p.round_address, &p.buyer_address, true).await
}

async fn options_exercised(
    tx: &mut Transaction<'_, Postgres>,
    event: &Event,
) -> Result<(), IndexerError> {
    let p = decode::options_exercised(event)?;
    projection::set_option_buyer_minted(tx, &p.round_address, &p.buyer_address, true).await
}

async fn unused_bids_refunded(
    tx: &mut Transaction<'_, Postgres>,
    event: &Event,
) -> Result<(), IndexerError> {
    let p = decode::unused_bids_refunded(event)?;
    projection::set_option_buyer_refunded(tx, &p.round_address, &p.buyer_address, true).await
}
