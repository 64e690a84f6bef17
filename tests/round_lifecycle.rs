//! End-to-end arithmetic of one auction round against the public API:
//! clearing fills, the auction-end liquidity shuffle, and settlement with a
//! queued withdrawal, checked for conservation across the whole cycle.

use pitchlake_backend::models::{Bid, BigInt, LiquidityProviderState, QueuedLiquidity};
use pitchlake_backend::replay::clearing::{
    allocate_auction, rebalance_lps_auction_end, settle_round,
};

fn bid(id: &str, buyer: &str, nonce: i64, amount: u64, price: u64) -> Bid {
    Bid {
        buyer_address: buyer.to_string(),
        round_address: "0xround".to_string(),
        bid_id: id.to_string(),
        tree_nonce: nonce,
        amount: BigInt::from(amount),
        price: BigInt::from(price),
    }
}

fn lp(address: &str, unlocked: u64, locked: u64) -> LiquidityProviderState {
    LiquidityProviderState {
        vault_address: "0xvault".to_string(),
        address: address.to_string(),
        unlocked_balance: BigInt::from(unlocked),
        locked_balance: BigInt::from(locked),
        stashed_balance: BigInt::zero(),
        latest_block: 0,
    }
}

#[test]
fn full_round_cycle_conserves_funds() {
    // Two LPs lock 1000 total; the auction sells every option.
    let starting = BigInt::from(1000u64);
    let unsold = BigInt::zero();
    let clearing_price = BigInt::from(3u64);
    let options_sold = BigInt::from(100u64);
    let premiums = &options_sold * &clearing_price;

    let bids = vec![
        bid("b1", "0xbuyer1", 1, 40, 5),
        bid("b2", "0xbuyer2", 2, 40, 4),
        bid("b3", "0xbuyer3", 3, 40, 3),
    ];
    let fills = allocate_auction(&bids, &options_sold, &clearing_price, 3).unwrap();

    // Every sold option is accounted for across buyers.
    let minted = fills.iter().fold(BigInt::zero(), |acc, f| &acc + &f.mintable);
    assert_eq!(minted, options_sold);

    // Each buyer's outlay splits exactly into premium and refund.
    let refunded = fills.iter().fold(BigInt::zero(), |acc, f| &acc + &f.refundable);
    let outlay = bids.iter().fold(BigInt::zero(), |acc, b| &acc + &(&b.amount * &b.price));
    assert_eq!(&premiums + &refunded, outlay);

    // Auction end credits premiums; nothing was unsold so locked is intact.
    let lps = vec![lp("0xlp1", 0, 600), lp("0xlp2", 0, 400)];
    let rebalanced = rebalance_lps_auction_end(&lps, &unsold, &premiums, &starting).unwrap();
    assert_eq!(rebalanced[0].locked, BigInt::from(600u64));
    assert_eq!(rebalanced[0].unlocked, BigInt::from(180u64)); // 600 * 300 / 1000
    assert_eq!(rebalanced[1].locked, BigInt::from(400u64));
    assert_eq!(rebalanced[1].unlocked, BigInt::from(120u64));

    // Settlement at payout 1 per option, LP1 queued its entire position.
    let after_auction: Vec<LiquidityProviderState> = rebalanced
        .iter()
        .map(|r| LiquidityProviderState {
            vault_address: "0xvault".to_string(),
            address: r.address.clone(),
            unlocked_balance: r.unlocked.clone(),
            locked_balance: r.locked.clone(),
            stashed_balance: BigInt::zero(),
            latest_block: 0,
        })
        .collect();
    let queued = vec![QueuedLiquidity {
        address: "0xlp1".to_string(),
        round_address: "0xround".to_string(),
        bps: 10000,
        queued_liquidity: BigInt::from(600u64),
    }];

    let settlement = settle_round(
        &after_auction,
        &queued,
        &starting,
        &unsold,
        &premiums,
        &options_sold,
        &BigInt::from(1u64),
    )
    .unwrap();

    assert_eq!(settlement.total_payout, BigInt::from(100u64));
    // 1000 - 100 - 0 + 300
    assert_eq!(settlement.remaining_liquidity, BigInt::from(1200u64));

    let lp1 = settlement.lps.iter().find(|l| l.address == "0xlp1").unwrap();
    let lp2 = settlement.lps.iter().find(|l| l.address == "0xlp2").unwrap();

    // LP1's share: floor(600 * 1200 / 1000) = 720, of which
    // floor(720 * 600 / 1000) = 432 is stashed for the queued withdrawal.
    assert_eq!(lp1.stashed, BigInt::from(432u64));
    assert_eq!(lp1.unlocked, BigInt::from(180u64 + 720 - 432));
    assert_eq!(lp1.locked, BigInt::zero());

    // LP2's share: floor(400 * 1200 / 1000) = 480, fully unlocked.
    assert_eq!(lp2.unlocked, BigInt::from(120u64 + 480));
    assert_eq!(lp2.stashed, BigInt::zero());

    // Vault-level split: stashed total + unstashed == remaining liquidity.
    let unstashed = settlement
        .remaining_liquidity
        .checked_sub(&settlement.stashed_total)
        .unwrap();
    assert_eq!(&unstashed + &settlement.stashed_total, settlement.remaining_liquidity);
    assert_eq!(settlement.stashed_total, BigInt::from(432u64));
}

#[test]
fn undersubscribed_auction_releases_unsold_liquidity() {
    // Half the options go unsold; the matching share of liquidity unlocks.
    let starting = BigInt::from(1000u64);
    let unsold = BigInt::from(500u64);
    let clearing_price = BigInt::from(2u64);
    let options_sold = BigInt::from(50u64);
    let premiums = &options_sold * &clearing_price;

    let bids = vec![bid("b1", "0xbuyer1", 1, 50, 2)];
    let fills = allocate_auction(&bids, &options_sold, &clearing_price, 1).unwrap();
    assert_eq!(fills.len(), 1);
    assert_eq!(fills[0].mintable, BigInt::from(50u64));
    assert_eq!(fills[0].refundable, BigInt::zero());

    let lps = vec![lp("0xlp1", 0, 1000)];
    let rebalanced = rebalance_lps_auction_end(&lps, &unsold, &premiums, &starting).unwrap();
    assert_eq!(rebalanced[0].locked, BigInt::from(500u64));
    assert_eq!(rebalanced[0].unlocked, BigInt::from(600u64)); // 500 unsold + 100 premiums
}
