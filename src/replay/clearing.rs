//! Auction clearing and settlement arithmetic.
//!
//! Pure functions over in-memory rows; the forward handlers read the
//! affected rows, run these, and write the results back inside the driver
//! transaction. All arithmetic is exact integer with explicit floors;
//! anything that would drive a balance negative is an `Invariant` error that
//! aborts the transaction.

use std::collections::BTreeMap;

use crate::errors::IndexerError;
use crate::models::{Bid, BigInt, LiquidityProviderState, QueuedLiquidity};

/// Per-buyer result of an auction: options to mint and collateral to refund.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuyerFill {
    pub buyer_address: String,
    pub mintable: BigInt,
    pub refundable: BigInt,
}

/// Distribute `options_sold` across the round's bids at the uniform clearing
/// price.
///
/// A bid is above clearing when `price > clearing_price`, or at the clearing
/// price with `tree_nonce <= clearing_nonce`. Above-clearing bids fill fully
/// in (price DESC, tree_nonce ASC) order except the marginal bid
/// (`tree_nonce == clearing_nonce`), which takes whatever is left and is
/// refunded the unfilled remainder at the clearing price. Below-clearing
/// bids are refunded entirely at their own price.
pub fn allocate_auction(
    bids: &[Bid],
    options_sold: &BigInt,
    clearing_price: &BigInt,
    clearing_nonce: i64,
) -> Result<Vec<BuyerFill>, IndexerError> {
    let mut above: Vec<&Bid> = Vec::new();
    let mut below: Vec<&Bid> = Vec::new();
    for bid in bids {
        let is_above = bid.price > *clearing_price
            || (bid.price == *clearing_price && bid.tree_nonce <= clearing_nonce);
        if is_above {
            above.push(bid);
        } else {
            below.push(bid);
        }
    }
    above.sort_by(|a, b| b.price.cmp(&a.price).then(a.tree_nonce.cmp(&b.tree_nonce)));

    let mut fills: BTreeMap<String, (BigInt, BigInt)> = BTreeMap::new();
    let mut add = |buyer: &str, mintable: BigInt, refundable: BigInt| {
        let entry = fills
            .entry(buyer.to_string())
            .or_insert_with(|| (BigInt::zero(), BigInt::zero()));
        entry.0 = &entry.0 + &mintable;
        entry.1 = &entry.1 + &refundable;
    };

    let mut options_left = options_sold.clone();
    for bid in &above {
        if bid.tree_nonce == clearing_nonce {
            // Marginal bid: partially filled, remainder refunded at clearing.
            let unfilled = bid.amount.checked_sub(&options_left).ok_or_else(|| {
                IndexerError::Invariant(format!(
                    "marginal bid {} smaller than remaining options {options_left}",
                    bid.bid_id
                ))
            })?;
            add(&bid.buyer_address, options_left.clone(), &unfilled * clearing_price);
            options_left = BigInt::zero();
        } else {
            let premium = bid.price.checked_sub(clearing_price).ok_or_else(|| {
                IndexerError::Invariant(format!(
                    "above-clearing bid {} priced below clearing", bid.bid_id
                ))
            })?;
            add(&bid.buyer_address, bid.amount.clone(), &bid.amount * &premium);
            options_left = options_left.checked_sub(&bid.amount).ok_or_else(|| {
                IndexerError::Invariant(format!(
                    "above-clearing bids exceed options sold at bid {}",
                    bid.bid_id
                ))
            })?;
        }
    }

    for bid in &below {
        add(&bid.buyer_address, BigInt::zero(), &bid.amount * &bid.price);
    }

    Ok(fills
        .into_iter()
        .map(|(buyer_address, (mintable, refundable))| BuyerFill {
            buyer_address,
            mintable,
            refundable,
        })
        .collect())
}

/// New (locked, unlocked) balances for one LP after auction end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LpRebalance {
    pub address: String,
    pub locked: BigInt,
    pub unlocked: BigInt,
}

/// Release each LP's share of unsold liquidity back to unlocked and credit
/// its premium share, pro-rata by locked balance at auction start. No-op
/// when the round started with zero liquidity.
pub fn rebalance_lps_auction_end(
    lps: &[LiquidityProviderState],
    unsold_liquidity: &BigInt,
    premiums: &BigInt,
    starting_liquidity: &BigInt,
) -> Result<Vec<LpRebalance>, IndexerError> {
    if starting_liquidity.is_zero() {
        return Ok(Vec::new());
    }

    let mut out = Vec::with_capacity(lps.len());
    for lp in lps {
        let released = (&lp.locked_balance * unsold_liquidity).floor_div(starting_liquidity);
        let premium_share = (&lp.locked_balance * premiums).floor_div(starting_liquidity);
        let locked = lp.locked_balance.checked_sub(&released).ok_or_else(|| {
            IndexerError::Invariant(format!(
                "unsold release exceeds locked balance for {}",
                lp.address
            ))
        })?;
        out.push(LpRebalance {
            address: lp.address.clone(),
            locked,
            unlocked: &(&lp.unlocked_balance + &released) + &premium_share,
        });
    }
    Ok(out)
}

/// Full new balances for one LP after settlement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LpSettlement {
    pub address: String,
    pub unlocked: BigInt,
    pub locked: BigInt,
    pub stashed: BigInt,
}

#[derive(Debug, Clone)]
pub struct Settlement {
    pub total_payout: BigInt,
    pub remaining_liquidity: BigInt,
    /// Sum of per-LP stash movements; the vault stashes this much.
    pub stashed_total: BigInt,
    pub lps: Vec<LpSettlement>,
}

/// Settle a round: pay out sold options, return the remaining liquidity to
/// the LPs pro-rata by locked share, and stash the queued fraction of each
/// LP's return.
pub fn settle_round(
    lps: &[LiquidityProviderState],
    queued: &[QueuedLiquidity],
    starting_liquidity: &BigInt,
    unsold_liquidity: &BigInt,
    premiums: &BigInt,
    sold_options: &BigInt,
    payout_per_option: &BigInt,
) -> Result<Settlement, IndexerError> {
    let total_payout = sold_options * payout_per_option;
    let gross = starting_liquidity + premiums;
    let deductions = &total_payout + unsold_liquidity;
    let remaining_liquidity = gross.checked_sub(&deductions).ok_or_else(|| {
        IndexerError::Invariant(format!(
            "settlement deductions {deductions} exceed gross liquidity {gross}"
        ))
    })?;

    let denominator = starting_liquidity.checked_sub(unsold_liquidity).ok_or_else(|| {
        IndexerError::Invariant("unsold liquidity exceeds starting liquidity".to_string())
    })?;

    let mut results = Vec::with_capacity(lps.len());
    let mut stashed_total = BigInt::zero();
    for lp in lps {
        if lp.locked_balance.is_zero() {
            continue;
        }
        let share = if denominator.is_zero() {
            lp.locked_balance.clone()
        } else {
            (&lp.locked_balance * &remaining_liquidity).floor_div(&denominator)
        };

        let mut unlocked = &lp.unlocked_balance + &share;
        let mut stashed = lp.stashed_balance.clone();

        // Queued withdrawals stash their fraction of this round's return.
        if let Some(row) = queued.iter().find(|q| q.address == lp.address) {
            if !starting_liquidity.is_zero() {
                let stash_amount =
                    (&share * &row.queued_liquidity).floor_div(starting_liquidity);
                unlocked = unlocked.checked_sub(&stash_amount).ok_or_else(|| {
                    IndexerError::Invariant(format!(
                        "stash amount exceeds unlocked balance for {}",
                        lp.address
                    ))
                })?;
                stashed = &stashed + &stash_amount;
                stashed_total = &stashed_total + &stash_amount;
            }
        }

        results.push(LpSettlement {
            address: lp.address.clone(),
            unlocked,
            locked: BigInt::zero(),
            stashed,
        });
    }

    Ok(Settlement {
        total_payout,
        remaining_liquidity,
        stashed_total,
        lps: results,
    })
}

/// Round-level queued liquidity before a `WithdrawalQueued`, reconstructed
/// from the event's before/after account values.
pub fn reverted_round_queued(
    vault_queued_now: &BigInt,
    account_queued_before: &BigInt,
    account_queued_now: &BigInt,
) -> Result<BigInt, IndexerError> {
    match account_queued_now.checked_sub(account_queued_before) {
        Some(delta) => vault_queued_now.checked_sub(&delta).ok_or_else(|| {
            IndexerError::Invariant(
                "queued delta exceeds round queued liquidity on revert".to_string(),
            )
        }),
        None => {
            let delta = account_queued_before
                .checked_sub(account_queued_now)
                .unwrap_or_default();
            Ok(vault_queued_now + &delta)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bid(id: &str, buyer: &str, nonce: i64, amount: u64, price: u64) -> Bid {
        Bid {
            buyer_address: buyer.to_string(),
            round_address: "0xr".to_string(),
            bid_id: id.to_string(),
            tree_nonce: nonce,
            amount: BigInt::from(amount),
            price: BigInt::from(price),
        }
    }

    fn lp(address: &str, unlocked: u64, locked: u64, stashed: u64) -> LiquidityProviderState {
        LiquidityProviderState {
            vault_address: "0xv".to_string(),
            address: address.to_string(),
            unlocked_balance: BigInt::from(unlocked),
            locked_balance: BigInt::from(locked),
            stashed_balance: BigInt::from(stashed),
            latest_block: 0,
        }
    }

    fn fill_for<'a>(fills: &'a [BuyerFill], buyer: &str) -> &'a BuyerFill {
        fills.iter().find(|f| f.buyer_address == buyer).unwrap()
    }

    #[test]
    fn test_clearing_with_marginal_bid() {
        // Three bids in insertion order, clearing at the third.
        let bids = vec![
            bid("b1", "0x1", 1, 40, 5),
            bid("b2", "0x2", 2, 40, 4),
            bid("b3", "0x3", 3, 40, 3),
        ];
        let fills = allocate_auction(&bids, &BigInt::from(100u64), &BigInt::from(3u64), 3).unwrap();

        let b1 = fill_for(&fills, "0x1");
        assert_eq!(b1.mintable, BigInt::from(40u64));
        assert_eq!(b1.refundable, BigInt::from(80u64)); // 40 * (5 - 3)

        let b2 = fill_for(&fills, "0x2");
        assert_eq!(b2.mintable, BigInt::from(40u64));
        assert_eq!(b2.refundable, BigInt::from(40u64)); // 40 * (4 - 3)

        let b3 = fill_for(&fills, "0x3");
        assert_eq!(b3.mintable, BigInt::from(20u64)); // 100 - 40 - 40
        assert_eq!(b3.refundable, BigInt::from(60u64)); // (40 - 20) * 3
    }

    #[test]
    fn test_below_clearing_bids_fully_refunded() {
        let bids = vec![
            bid("b1", "0x1", 1, 10, 9),
            bid("b2", "0x2", 2, 10, 2), // below clearing price
            bid("b3", "0x3", 3, 10, 5), // at clearing, nonce above clearing nonce
        ];
        let fills = allocate_auction(&bids, &BigInt::from(10u64), &BigInt::from(5u64), 1).unwrap();

        assert_eq!(fill_for(&fills, "0x1").mintable, BigInt::from(10u64));
        let b2 = fill_for(&fills, "0x2");
        assert_eq!(b2.mintable, BigInt::zero());
        assert_eq!(b2.refundable, BigInt::from(20u64)); // 10 * 2
        let b3 = fill_for(&fills, "0x3");
        assert_eq!(b3.mintable, BigInt::zero());
        assert_eq!(b3.refundable, BigInt::from(50u64)); // 10 * 5
    }

    #[test]
    fn test_equal_price_ties_break_on_tree_nonce() {
        let bids = vec![
            bid("b2", "0x2", 2, 30, 7),
            bid("b1", "0x1", 1, 30, 7),
        ];
        // Marginal is the later insertion at the same price.
        let fills = allocate_auction(&bids, &BigInt::from(40u64), &BigInt::from(7u64), 2).unwrap();
        assert_eq!(fill_for(&fills, "0x1").mintable, BigInt::from(30u64));
        assert_eq!(fill_for(&fills, "0x2").mintable, BigInt::from(10u64));
        assert_eq!(fill_for(&fills, "0x2").refundable, BigInt::from(140u64)); // (30 - 10) * 7
    }

    #[test]
    fn test_same_buyer_fills_aggregate() {
        let bids = vec![
            bid("b1", "0x1", 1, 10, 6),
            bid("b2", "0x1", 2, 10, 5),
        ];
        let fills = allocate_auction(&bids, &BigInt::from(20u64), &BigInt::from(5u64), 2).unwrap();
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].mintable, BigInt::from(20u64));
        assert_eq!(fills[0].refundable, BigInt::from(10u64)); // first bid 10 * (6 - 5)
    }

    #[test]
    fn test_auction_end_lp_rebalance() {
        let lps = vec![lp("0xa", 0, 600, 0), lp("0xb", 0, 400, 0)];
        let out = rebalance_lps_auction_end(
            &lps,
            &BigInt::from(100u64), // unsold
            &BigInt::from(300u64), // premiums
            &BigInt::from(1000u64),
        )
        .unwrap();

        // A releases 60 and earns 180 premium; B releases 40 and earns 120.
        assert_eq!(out[0].locked, BigInt::from(540u64));
        assert_eq!(out[0].unlocked, BigInt::from(240u64));
        assert_eq!(out[1].locked, BigInt::from(360u64));
        assert_eq!(out[1].unlocked, BigInt::from(160u64));
    }

    #[test]
    fn test_auction_end_rebalance_noop_on_zero_starting_liquidity() {
        let lps = vec![lp("0xa", 0, 600, 0)];
        let out = rebalance_lps_auction_end(
            &lps,
            &BigInt::from(100u64),
            &BigInt::from(300u64),
            &BigInt::zero(),
        )
        .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_settlement_with_queued_withdrawal() {
        // starting = 1000, unsold = 0, premiums = 300, payout = 100 * 1.
        let lps = vec![lp("0xa", 0, 600, 0), lp("0xb", 0, 400, 0)];
        let queued = vec![QueuedLiquidity {
            address: "0xa".to_string(),
            round_address: "0xr".to_string(),
            bps: 10000,
            queued_liquidity: BigInt::from(600u64),
        }];

        let settlement = settle_round(
            &lps,
            &queued,
            &BigInt::from(1000u64),
            &BigInt::zero(),
            &BigInt::from(300u64),
            &BigInt::from(100u64),
            &BigInt::from(1u64),
        )
        .unwrap();

        assert_eq!(settlement.total_payout, BigInt::from(100u64));
        assert_eq!(settlement.remaining_liquidity, BigInt::from(1200u64));

        // A's share = floor(600 * 1200 / 1000) = 720; stash = floor(720 * 600 / 1000) = 432.
        let a = settlement.lps.iter().find(|l| l.address == "0xa").unwrap();
        assert_eq!(a.stashed, BigInt::from(432u64));
        assert_eq!(a.unlocked, BigInt::from(288u64));
        assert_eq!(a.locked, BigInt::zero());

        // B's share = 480, all unlocked.
        let b = settlement.lps.iter().find(|l| l.address == "0xb").unwrap();
        assert_eq!(b.unlocked, BigInt::from(480u64));
        assert_eq!(b.stashed, BigInt::zero());

        assert_eq!(settlement.stashed_total, BigInt::from(432u64));
    }

    #[test]
    fn test_settlement_zero_denominator_returns_locked() {
        // starting == unsold: nothing was at risk, LPs get their locked back.
        let lps = vec![lp("0xa", 5, 100, 0)];
        let settlement = settle_round(
            &lps,
            &[],
            &BigInt::from(100u64),
            &BigInt::from(100u64),
            &BigInt::zero(),
            &BigInt::zero(),
            &BigInt::zero(),
        )
        .unwrap();
        assert_eq!(settlement.lps[0].unlocked, BigInt::from(105u64));
        assert_eq!(settlement.remaining_liquidity, BigInt::zero());
    }

    #[test]
    fn test_settlement_conserves_liquidity() {
        // Locked balances sum to starting - unsold after the auction-end
        // release, so the distributed shares stay within remaining liquidity
        // up to floor dust.
        let lps = vec![lp("0xa", 0, 330, 0), lp("0xb", 0, 660, 0)];
        let settlement = settle_round(
            &lps,
            &[],
            &BigInt::from(1000u64),
            &BigInt::from(10u64),
            &BigInt::from(55u64),
            &BigInt::from(20u64),
            &BigInt::from(3u64),
        )
        .unwrap();
        let distributed = settlement
            .lps
            .iter()
            .fold(BigInt::zero(), |acc, l| &acc + &l.unlocked);
        assert!(distributed <= settlement.remaining_liquidity);
        let dust = settlement.remaining_liquidity.checked_sub(&distributed).unwrap();
        assert!(dust < BigInt::from(2u64));
    }

    #[test]
    fn test_reverted_round_queued() {
        // Queued raised from 100 to 300 with the round at 1000: revert to 800.
        assert_eq!(
            reverted_round_queued(
                &BigInt::from(1000u64),
                &BigInt::from(100u64),
                &BigInt::from(300u64),
            )
            .unwrap(),
            BigInt::from(800u64)
        );
        // Queued lowered from 500 to 200: revert adds the delta back.
        assert_eq!(
            reverted_round_queued(
                &BigInt::from(1000u64),
                &BigInt::from(500u64),
                &BigInt::from(200u64),
            )
            .unwrap(),
            BigInt::from(1300u64)
        );
    }
}
