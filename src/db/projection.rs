//! The normalized projection: vault and LP balances, option rounds, bids,
//! option buyers and queued liquidity. Written only by the replayer inside
//! one transaction per driver event; the fan-out reads committed rows.

use sqlx::postgres::{PgExecutor, PgRow};
use sqlx::{Postgres, Row, Transaction};

use crate::errors::IndexerError;
use crate::models::{
    Bid, BigInt, LiquidityProviderState, OptionBuyer, OptionRound, QueuedLiquidity, RoundState,
    VaultState,
};

use super::{money, money_opt, parsed};

const VAULT_COLUMNS: &str = "address, current_round_id, current_round_address,
     unlocked_balance::text AS unlocked_balance,
     locked_balance::text AS locked_balance,
     stashed_balance::text AS stashed_balance,
     latest_block, deployment_date, fossil_client_address, eth_address,
     option_round_class_hash,
     alpha::text AS alpha, strike_level::text AS strike_level,
     round_transition_period, auction_duration, round_duration";

fn vault_from_row(row: &PgRow) -> Result<VaultState, sqlx::Error> {
    Ok(VaultState {
        address: row.try_get("address")?,
        current_round_id: row.try_get("current_round_id")?,
        current_round_address: row.try_get("current_round_address")?,
        unlocked_balance: money(row, "unlocked_balance")?,
        locked_balance: money(row, "locked_balance")?,
        stashed_balance: money(row, "stashed_balance")?,
        latest_block: row.try_get("latest_block")?,
        deployment_date: row.try_get("deployment_date")?,
        fossil_client_address: row.try_get("fossil_client_address")?,
        eth_address: row.try_get("eth_address")?,
        option_round_class_hash: row.try_get("option_round_class_hash")?,
        alpha: money(row, "alpha")?,
        strike_level: money(row, "strike_level")?,
        round_transition_period: row.try_get("round_transition_period")?,
        auction_duration: row.try_get("auction_duration")?,
        round_duration: row.try_get("round_duration")?,
    })
}

pub async fn get_vault_state<'e, E: PgExecutor<'e>>(
    exec: E,
    address: &str,
) -> Result<Option<VaultState>, IndexerError> {
    let row = sqlx::query(&format!(
        "SELECT {VAULT_COLUMNS} FROM vault_states WHERE address = $1"
    ))
    .bind(address)
    .fetch_optional(exec)
    .await?;
    row.as_ref().map(vault_from_row).transpose().map_err(Into::into)
}

pub async fn get_vault_addresses<'e, E: PgExecutor<'e>>(
    exec: E,
) -> Result<Vec<String>, IndexerError> {
    let rows = sqlx::query("SELECT address FROM vault_states ORDER BY address")
        .fetch_all(exec)
        .await?;
    rows.iter()
        .map(|row| row.try_get("address"))
        .collect::<Result<_, sqlx::Error>>()
        .map_err(Into::into)
}

pub async fn insert_vault_state(
    tx: &mut Transaction<'_, Postgres>,
    vault: &VaultState,
) -> Result<(), IndexerError> {
    sqlx::query(
        "INSERT INTO vault_states
         (address, current_round_id, current_round_address,
          unlocked_balance, locked_balance, stashed_balance, latest_block,
          deployment_date, fossil_client_address, eth_address, option_round_class_hash,
          alpha, strike_level, round_transition_period, auction_duration, round_duration)
         VALUES ($1, $2, $3, $4::numeric, $5::numeric, $6::numeric, $7,
                 $8, $9, $10, $11, $12::numeric, $13::numeric, $14, $15, $16)",
    )
    .bind(&vault.address)
    .bind(vault.current_round_id)
    .bind(&vault.current_round_address)
    .bind(vault.unlocked_balance.to_string())
    .bind(vault.locked_balance.to_string())
    .bind(vault.stashed_balance.to_string())
    .bind(vault.latest_block)
    .bind(vault.deployment_date)
    .bind(&vault.fossil_client_address)
    .bind(&vault.eth_address)
    .bind(&vault.option_round_class_hash)
    .bind(vault.alpha.to_string())
    .bind(vault.strike_level.to_string())
    .bind(vault.round_transition_period)
    .bind(vault.auction_duration)
    .bind(vault.round_duration)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn update_vault_balances(
    tx: &mut Transaction<'_, Postgres>,
    address: &str,
    unlocked: &BigInt,
    locked: &BigInt,
    stashed: &BigInt,
    latest_block: i64,
) -> Result<(), IndexerError> {
    sqlx::query(
        "UPDATE vault_states
         SET unlocked_balance = $1::numeric,
             locked_balance = $2::numeric,
             stashed_balance = $3::numeric,
             latest_block = $4
         WHERE address = $5",
    )
    .bind(unlocked.to_string())
    .bind(locked.to_string())
    .bind(stashed.to_string())
    .bind(latest_block)
    .bind(address)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn update_vault_current_round(
    tx: &mut Transaction<'_, Postgres>,
    address: &str,
    round_id: i64,
    round_address: &str,
    latest_block: i64,
) -> Result<(), IndexerError> {
    sqlx::query(
        "UPDATE vault_states
         SET current_round_id = $1, current_round_address = $2, latest_block = $3
         WHERE address = $4",
    )
    .bind(round_id)
    .bind(round_address)
    .bind(latest_block)
    .bind(address)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn delete_vault_state(
    tx: &mut Transaction<'_, Postgres>,
    address: &str,
) -> Result<(), IndexerError> {
    sqlx::query("DELETE FROM vault_states WHERE address = $1")
        .bind(address)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

const LP_COLUMNS: &str = "vault_address, address,
     unlocked_balance::text AS unlocked_balance,
     locked_balance::text AS locked_balance,
     stashed_balance::text AS stashed_balance,
     latest_block";

fn lp_from_row(row: &PgRow) -> Result<LiquidityProviderState, sqlx::Error> {
    Ok(LiquidityProviderState {
        vault_address: row.try_get("vault_address")?,
        address: row.try_get("address")?,
        unlocked_balance: money(row, "unlocked_balance")?,
        locked_balance: money(row, "locked_balance")?,
        stashed_balance: money(row, "stashed_balance")?,
        latest_block: row.try_get("latest_block")?,
    })
}

pub async fn get_lp_state<'e, E: PgExecutor<'e>>(
    exec: E,
    vault_address: &str,
    address: &str,
) -> Result<Option<LiquidityProviderState>, IndexerError> {
    let row = sqlx::query(&format!(
        "SELECT {LP_COLUMNS} FROM liquidity_provider_states
         WHERE vault_address = $1 AND address = $2"
    ))
    .bind(vault_address)
    .bind(address)
    .fetch_optional(exec)
    .await?;
    row.as_ref().map(lp_from_row).transpose().map_err(Into::into)
}

pub async fn get_lps_for_vault(
    tx: &mut Transaction<'_, Postgres>,
    vault_address: &str,
) -> Result<Vec<LiquidityProviderState>, IndexerError> {
    let rows = sqlx::query(&format!(
        "SELECT {LP_COLUMNS} FROM liquidity_provider_states
         WHERE vault_address = $1
         ORDER BY address"
    ))
    .bind(vault_address)
    .fetch_all(&mut **tx)
    .await?;
    rows.iter().map(lp_from_row).collect::<Result<_, _>>().map_err(Into::into)
}

pub async fn upsert_lp_state(
    tx: &mut Transaction<'_, Postgres>,
    lp: &LiquidityProviderState,
) -> Result<(), IndexerError> {
    sqlx::query(
        "INSERT INTO liquidity_provider_states
         (vault_address, address, unlocked_balance, locked_balance, stashed_balance, latest_block)
         VALUES ($1, $2, $3::numeric, $4::numeric, $5::numeric, $6)
         ON CONFLICT (vault_address, address)
         DO UPDATE SET unlocked_balance = EXCLUDED.unlocked_balance,
                       locked_balance = EXCLUDED.locked_balance,
                       stashed_balance = EXCLUDED.stashed_balance,
                       latest_block = EXCLUDED.latest_block",
    )
    .bind(&lp.vault_address)
    .bind(&lp.address)
    .bind(lp.unlocked_balance.to_string())
    .bind(lp.locked_balance.to_string())
    .bind(lp.stashed_balance.to_string())
    .bind(lp.latest_block)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn delete_lp_state(
    tx: &mut Transaction<'_, Postgres>,
    vault_address: &str,
    address: &str,
) -> Result<(), IndexerError> {
    sqlx::query("DELETE FROM liquidity_provider_states WHERE vault_address = $1 AND address = $2")
        .bind(vault_address)
        .bind(address)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

const ROUND_COLUMNS: &str = "address, vault_address, round_id,
     cap_level::text AS cap_level,
     strike_price::text AS strike_price,
     reserve_price::text AS reserve_price,
     start_date, end_date, settlement_date, deployment_date,
     starting_liquidity::text AS starting_liquidity,
     queued_liquidity::text AS queued_liquidity,
     remaining_liquidity::text AS remaining_liquidity,
     available_options::text AS available_options,
     sold_options::text AS sold_options,
     clearing_price::text AS clearing_price,
     unsold_liquidity::text AS unsold_liquidity,
     premiums::text AS premiums,
     settlement_price::text AS settlement_price,
     payout_per_option::text AS payout_per_option,
     state";

fn round_from_row(row: &PgRow) -> Result<OptionRound, sqlx::Error> {
    Ok(OptionRound {
        address: row.try_get("address")?,
        vault_address: row.try_get("vault_address")?,
        round_id: row.try_get("round_id")?,
        cap_level: money_opt(row, "cap_level")?,
        strike_price: money_opt(row, "strike_price")?,
        reserve_price: money_opt(row, "reserve_price")?,
        start_date: row.try_get("start_date")?,
        end_date: row.try_get("end_date")?,
        settlement_date: row.try_get("settlement_date")?,
        deployment_date: row.try_get("deployment_date")?,
        starting_liquidity: money(row, "starting_liquidity")?,
        queued_liquidity: money(row, "queued_liquidity")?,
        remaining_liquidity: money(row, "remaining_liquidity")?,
        available_options: money(row, "available_options")?,
        sold_options: money_opt(row, "sold_options")?,
        clearing_price: money_opt(row, "clearing_price")?,
        unsold_liquidity: money(row, "unsold_liquidity")?,
        premiums: money(row, "premiums")?,
        settlement_price: money_opt(row, "settlement_price")?,
        payout_per_option: money_opt(row, "payout_per_option")?,
        state: parsed::<RoundState>(row, "state")?,
    })
}

pub async fn get_option_round<'e, E: PgExecutor<'e>>(
    exec: E,
    address: &str,
) -> Result<Option<OptionRound>, IndexerError> {
    let row = sqlx::query(&format!(
        "SELECT {ROUND_COLUMNS} FROM option_rounds WHERE address = $1"
    ))
    .bind(address)
    .fetch_optional(exec)
    .await?;
    row.as_ref().map(round_from_row).transpose().map_err(Into::into)
}

pub async fn get_option_rounds_by_vault<'e, E: PgExecutor<'e>>(
    exec: E,
    vault_address: &str,
) -> Result<Vec<OptionRound>, IndexerError> {
    let rows = sqlx::query(&format!(
        "SELECT {ROUND_COLUMNS} FROM option_rounds WHERE vault_address = $1 ORDER BY round_id ASC"
    ))
    .bind(vault_address)
    .fetch_all(exec)
    .await?;
    rows.iter().map(round_from_row).collect::<Result<_, _>>().map_err(Into::into)
}

pub async fn insert_option_round(
    tx: &mut Transaction<'_, Postgres>,
    round: &OptionRound,
) -> Result<(), IndexerError> {
    sqlx::query(
        "INSERT INTO option_rounds
         (address, vault_address, round_id, cap_level, strike_price, reserve_price,
          start_date, end_date, settlement_date, deployment_date,
          starting_liquidity, queued_liquidity, remaining_liquidity, available_options,
          sold_options, clearing_price, unsold_liquidity, premiums,
          settlement_price, payout_per_option, state)
         VALUES ($1, $2, $3, $4::numeric, $5::numeric, $6::numeric,
                 $7, $8, $9, $10,
                 $11::numeric, $12::numeric, $13::numeric, $14::numeric,
                 $15::numeric, $16::numeric, $17::numeric, $18::numeric,
                 $19::numeric, $20::numeric, $21)",
    )
    .bind(&round.address)
    .bind(&round.vault_address)
    .bind(round.round_id)
    .bind(round.cap_level.as_ref().map(|v| v.to_string()))
    .bind(round.strike_price.as_ref().map(|v| v.to_string()))
    .bind(round.reserve_price.as_ref().map(|v| v.to_string()))
    .bind(round.start_date)
    .bind(round.end_date)
    .bind(round.settlement_date)
    .bind(round.deployment_date)
    .bind(round.starting_liquidity.to_string())
    .bind(round.queued_liquidity.to_string())
    .bind(round.remaining_liquidity.to_string())
    .bind(round.available_options.to_string())
    .bind(round.sold_options.as_ref().map(|v| v.to_string()))
    .bind(round.clearing_price.as_ref().map(|v| v.to_string()))
    .bind(round.unsold_liquidity.to_string())
    .bind(round.premiums.to_string())
    .bind(round.settlement_price.as_ref().map(|v| v.to_string()))
    .bind(round.payout_per_option.as_ref().map(|v| v.to_string()))
    .bind(round.state.as_str())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Full-row update. Handlers mutate the in-memory round and save it once.
pub async fn update_option_round(
    tx: &mut Transaction<'_, Postgres>,
    round: &OptionRound,
) -> Result<(), IndexerError> {
    sqlx::query(
        "UPDATE option_rounds
         SET cap_level = $1::numeric, strike_price = $2::numeric, reserve_price = $3::numeric,
             starting_liquidity = $4::numeric, queued_liquidity = $5::numeric,
             remaining_liquidity = $6::numeric, available_options = $7::numeric,
             sold_options = $8::numeric, clearing_price = $9::numeric,
             unsold_liquidity = $10::numeric, premiums = $11::numeric,
             settlement_price = $12::numeric, payout_per_option = $13::numeric,
             state = $14
         WHERE address = $15",
    )
    .bind(round.cap_level.as_ref().map(|v| v.to_string()))
    .bind(round.strike_price.as_ref().map(|v| v.to_string()))
    .bind(round.reserve_price.as_ref().map(|v| v.to_string()))
    .bind(round.starting_liquidity.to_string())
    .bind(round.queued_liquidity.to_string())
    .bind(round.remaining_liquidity.to_string())
    .bind(round.available_options.to_string())
    .bind(round.sold_options.as_ref().map(|v| v.to_string()))
    .bind(round.clearing_price.as_ref().map(|v| v.to_string()))
    .bind(round.unsold_liquidity.to_string())
    .bind(round.premiums.to_string())
    .bind(round.settlement_price.as_ref().map(|v| v.to_string()))
    .bind(round.payout_per_option.as_ref().map(|v| v.to_string()))
    .bind(round.state.as_str())
    .bind(&round.address)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn delete_option_round(
    tx: &mut Transaction<'_, Postgres>,
    address: &str,
) -> Result<(), IndexerError> {
    sqlx::query("DELETE FROM option_rounds WHERE address = $1")
        .bind(address)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

const BID_COLUMNS: &str = "buyer_address, round_address, bid_id, tree_nonce,
     amount::text AS amount, price::text AS price";

fn bid_from_row(row: &PgRow) -> Result<Bid, sqlx::Error> {
    Ok(Bid {
        buyer_address: row.try_get("buyer_address")?,
        round_address: row.try_get("round_address")?,
        bid_id: row.try_get("bid_id")?,
        tree_nonce: row.try_get("tree_nonce")?,
        amount: money(row, "amount")?,
        price: money(row, "price")?,
    })
}

pub async fn insert_bid(
    tx: &mut Transaction<'_, Postgres>,
    bid: &Bid,
) -> Result<(), IndexerError> {
    sqlx::query(
        "INSERT INTO bids (buyer_address, round_address, bid_id, tree_nonce, amount, price)
         VALUES ($1, $2, $3, $4, $5::numeric, $6::numeric)",
    )
    .bind(&bid.buyer_address)
    .bind(&bid.round_address)
    .bind(&bid.bid_id)
    .bind(bid.tree_nonce)
    .bind(bid.amount.to_string())
    .bind(bid.price.to_string())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn delete_bid(
    tx: &mut Transaction<'_, Postgres>,
    round_address: &str,
    bid_id: &str,
) -> Result<(), IndexerError> {
    sqlx::query("DELETE FROM bids WHERE round_address = $1 AND bid_id = $2")
        .bind(round_address)
        .bind(bid_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// A bid update raises the standing price by a delta and re-keys the bid in
/// the tree; the delta and both nonces ride on the event, so the reverse
/// path can subtract and restore.
pub async fn bump_bid_price(
    tx: &mut Transaction<'_, Postgres>,
    round_address: &str,
    bid_id: &str,
    price_delta: &BigInt,
    tree_nonce: i64,
) -> Result<(), IndexerError> {
    sqlx::query(
        "UPDATE bids SET price = price + $1::numeric, tree_nonce = $2
         WHERE round_address = $3 AND bid_id = $4",
    )
    .bind(price_delta.to_string())
    .bind(tree_nonce)
    .bind(round_address)
    .bind(bid_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn unbump_bid_price(
    tx: &mut Transaction<'_, Postgres>,
    round_address: &str,
    bid_id: &str,
    price_delta: &BigInt,
    tree_nonce: i64,
) -> Result<(), IndexerError> {
    sqlx::query(
        "UPDATE bids SET price = price - $1::numeric, tree_nonce = $2
         WHERE round_address = $3 AND bid_id = $4",
    )
    .bind(price_delta.to_string())
    .bind(tree_nonce)
    .bind(round_address)
    .bind(bid_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// All bids for a round in clearing order (price DESC, tree nonce ASC).
pub async fn get_bids_for_round(
    tx: &mut Transaction<'_, Postgres>,
    round_address: &str,
) -> Result<Vec<Bid>, IndexerError> {
    let rows = sqlx::query(&format!(
        "SELECT {BID_COLUMNS} FROM bids
         WHERE round_address = $1
         ORDER BY price DESC, tree_nonce ASC"
    ))
    .bind(round_address)
    .fetch_all(&mut **tx)
    .await?;
    rows.iter().map(bid_from_row).collect::<Result<_, _>>().map_err(Into::into)
}

pub async fn get_bids_for_buyer<'e, E: PgExecutor<'e>>(
    exec: E,
    buyer_address: &str,
    round_address: &str,
) -> Result<Vec<Bid>, IndexerError> {
    let rows = sqlx::query(&format!(
        "SELECT {BID_COLUMNS} FROM bids
         WHERE buyer_address = $1 AND round_address = $2
         ORDER BY tree_nonce ASC"
    ))
    .bind(buyer_address)
    .bind(round_address)
    .fetch_all(exec)
    .await?;
    rows.iter().map(bid_from_row).collect::<Result<_, _>>().map_err(Into::into)
}

/// Create a zero option-buyer row if the buyer has none for this round.
pub async fn ensure_option_buyer(
    tx: &mut Transaction<'_, Postgres>,
    round_address: &str,
    address: &str,
) -> Result<(), IndexerError> {
    sqlx::query(
        "INSERT INTO option_buyers
         (address, round_address, mintable_options, refundable_amount, has_minted, has_refunded)
         VALUES ($1, $2, 0, 0, false, false)
         ON CONFLICT (address, round_address) DO NOTHING",
    )
    .bind(address)
    .bind(round_address)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn add_option_buyer_fill(
    tx: &mut Transaction<'_, Postgres>,
    round_address: &str,
    address: &str,
    mintable: &BigInt,
    refundable: &BigInt,
) -> Result<(), IndexerError> {
    sqlx::query(
        "UPDATE option_buyers
         SET mintable_options = mintable_options + $1::numeric,
             refundable_amount = refundable_amount + $2::numeric
         WHERE address = $3 AND round_address = $4",
    )
    .bind(mintable.to_string())
    .bind(refundable.to_string())
    .bind(address)
    .bind(round_address)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn set_option_buyer_minted(
    tx: &mut Transaction<'_, Postgres>,
    round_address: &str,
    address: &str,
    has_minted: bool,
) -> Result<(), IndexerError> {
    sqlx::query("UPDATE option_buyers SET has_minted = $1 WHERE address = $2 AND round_address = $3")
        .bind(has_minted)
        .bind(address)
        .bind(round_address)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

pub async fn set_option_buyer_refunded(
    tx: &mut Transaction<'_, Postgres>,
    round_address: &str,
    address: &str,
    has_refunded: bool,
) -> Result<(), IndexerError> {
    sqlx::query(
        "UPDATE option_buyers SET has_refunded = $1 WHERE address = $2 AND round_address = $3",
    )
    .bind(has_refunded)
    .bind(address)
    .bind(round_address)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Auction end is the only writer of the fill columns and accumulates from
/// zero, so zeroing them is its exact inverse.
pub async fn reset_option_buyers_for_round(
    tx: &mut Transaction<'_, Postgres>,
    round_address: &str,
) -> Result<(), IndexerError> {
    sqlx::query(
        "UPDATE option_buyers SET mintable_options = 0, refundable_amount = 0
         WHERE round_address = $1",
    )
    .bind(round_address)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Option-buyer rows for one user across rounds, bids embedded.
pub async fn get_option_buyers_by_address(
    pool: &sqlx::PgPool,
    address: &str,
) -> Result<Vec<OptionBuyer>, IndexerError> {
    let rows = sqlx::query(
        "SELECT address, round_address,
                mintable_options::text AS mintable_options,
                refundable_amount::text AS refundable_amount,
                has_minted, has_refunded
         FROM option_buyers WHERE address = $1",
    )
    .bind(address)
    .fetch_all(pool)
    .await?;

    let mut buyers = Vec::with_capacity(rows.len());
    for row in &rows {
        let mut buyer = OptionBuyer {
            address: row.try_get("address").map_err(IndexerError::from)?,
            round_address: row.try_get("round_address").map_err(IndexerError::from)?,
            mintable_options: money(row, "mintable_options").map_err(IndexerError::from)?,
            refundable_amount: money(row, "refundable_amount").map_err(IndexerError::from)?,
            has_minted: row.try_get("has_minted").map_err(IndexerError::from)?,
            has_refunded: row.try_get("has_refunded").map_err(IndexerError::from)?,
            bids: Vec::new(),
        };
        buyer.bids = get_bids_for_buyer(pool, &buyer.address, &buyer.round_address).await?;
        buyers.push(buyer);
    }
    Ok(buyers)
}

pub async fn upsert_queued_liquidity(
    tx: &mut Transaction<'_, Postgres>,
    queued: &QueuedLiquidity,
) -> Result<(), IndexerError> {
    sqlx::query(
        "INSERT INTO queued_liquidity (address, round_address, bps, queued_liquidity)
         VALUES ($1, $2, $3, $4::numeric)
         ON CONFLICT (address, round_address)
         DO UPDATE SET bps = EXCLUDED.bps, queued_liquidity = EXCLUDED.queued_liquidity",
    )
    .bind(&queued.address)
    .bind(&queued.round_address)
    .bind(queued.bps)
    .bind(queued.queued_liquidity.to_string())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn get_queued_liquidity_for_round(
    tx: &mut Transaction<'_, Postgres>,
    round_address: &str,
) -> Result<Vec<QueuedLiquidity>, IndexerError> {
    let rows = sqlx::query(
        "SELECT address, round_address, bps, queued_liquidity::text AS queued_liquidity
         FROM queued_liquidity
         WHERE round_address = $1
         ORDER BY address",
    )
    .bind(round_address)
    .fetch_all(&mut **tx)
    .await?;
    rows.iter()
        .map(|row| {
            Ok(QueuedLiquidity {
                address: row.try_get("address")?,
                round_address: row.try_get("round_address")?,
                bps: row.try_get("bps")?,
                queued_liquidity: money(row, "queued_liquidity")?,
            })
        })
        .collect::<Result<_, sqlx::Error>>()
        .map_err(Into::into)
}

pub async fn update_round_queued_liquidity(
    tx: &mut Transaction<'_, Postgres>,
    round_address: &str,
    queued: &BigInt,
) -> Result<(), IndexerError> {
    sqlx::query("UPDATE option_rounds SET queued_liquidity = $1::numeric WHERE address = $2")
        .bind(queued.to_string())
        .bind(round_address)
        .execute(&mut **tx)
        .await?;
    Ok(())
}
