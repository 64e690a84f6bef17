//! Typed views over journaled event payloads.
//!
//! Keys and data are hex felts as journaled by the ingress. u256 values are
//! (low, high) felt pairs at contiguous offsets; addresses are normalized on
//! the way out. A missing or unparsable word is a `MalformedPayload`, which
//! the replayer logs and skips without blocking the journal.

use crate::errors::IndexerError;
use crate::felt::{combine_u256, felt_to_bigint, felt_to_u64, normalize_hex};
use crate::models::{BigInt, Event};

fn data<'a>(event: &'a Event, index: usize) -> Result<&'a str, IndexerError> {
    event.event_data.get(index).map(String::as_str).ok_or_else(|| {
        IndexerError::MalformedPayload(format!(
            "{} event {} is missing data word {index}",
            event.event_name, event.transaction_hash
        ))
    })
}

fn key<'a>(event: &'a Event, index: usize) -> Result<&'a str, IndexerError> {
    event.event_keys.get(index).map(String::as_str).ok_or_else(|| {
        IndexerError::MalformedPayload(format!(
            "{} event {} is missing key {index}",
            event.event_name, event.transaction_hash
        ))
    })
}

fn u256_at(event: &Event, low: usize) -> Result<BigInt, IndexerError> {
    combine_u256(data(event, low)?, data(event, low + 1)?)
}

fn address_at(event: &Event, index: usize) -> Result<String, IndexerError> {
    normalize_hex(data(event, index)?)
}

/// `Deposit` and `Withdrawal` share a payload: both carry the LP's and the
/// vault's resulting unlocked balances.
#[derive(Debug)]
pub struct DepositOrWithdraw {
    pub lp_address: String,
    pub lp_unlocked: BigInt,
    pub vault_unlocked: BigInt,
}

pub fn deposit_or_withdraw(event: &Event) -> Result<DepositOrWithdraw, IndexerError> {
    Ok(DepositOrWithdraw {
        lp_address: normalize_hex(key(event, 1)?)?,
        lp_unlocked: u256_at(event, 2)?,
        vault_unlocked: u256_at(event, 4)?,
    })
}

#[derive(Debug)]
pub struct WithdrawalQueued {
    pub lp_address: String,
    pub bps: i64,
    pub round_id: i64,
    pub account_queued_before: BigInt,
    pub account_queued_now: BigInt,
    pub vault_queued_now: BigInt,
}

pub fn withdrawal_queued(event: &Event) -> Result<WithdrawalQueued, IndexerError> {
    Ok(WithdrawalQueued {
        lp_address: normalize_hex(key(event, 1)?)?,
        bps: felt_to_u64(data(event, 0)?)? as i64,
        round_id: felt_to_u64(data(event, 1)?)? as i64,
        account_queued_before: u256_at(event, 2)?,
        account_queued_now: u256_at(event, 4)?,
        vault_queued_now: u256_at(event, 6)?,
    })
}

#[derive(Debug)]
pub struct StashWithdrawn {
    pub lp_address: String,
    pub amount: BigInt,
    pub vault_stashed: BigInt,
}

pub fn stash_withdrawn(event: &Event) -> Result<StashWithdrawn, IndexerError> {
    Ok(StashWithdrawn {
        lp_address: normalize_hex(key(event, 1)?)?,
        amount: u256_at(event, 0)?,
        vault_stashed: u256_at(event, 2)?,
    })
}

#[derive(Debug)]
pub struct RoundDeployed {
    pub round_id: i64,
    pub round_address: String,
    pub start_date: i64,
    pub end_date: i64,
    pub settlement_date: i64,
}

pub fn round_deployed(event: &Event) -> Result<RoundDeployed, IndexerError> {
    Ok(RoundDeployed {
        round_id: felt_to_u64(data(event, 0)?)? as i64,
        round_address: address_at(event, 1)?,
        start_date: felt_to_u64(data(event, 2)?)? as i64,
        end_date: felt_to_u64(data(event, 3)?)? as i64,
        settlement_date: felt_to_u64(data(event, 4)?)? as i64,
    })
}

#[derive(Debug)]
pub struct PricingDataSet {
    pub strike_price: BigInt,
    pub cap_level: BigInt,
    pub reserve_price: BigInt,
    pub round_address: String,
}

pub fn pricing_data_set(event: &Event) -> Result<PricingDataSet, IndexerError> {
    Ok(PricingDataSet {
        strike_price: u256_at(event, 0)?,
        cap_level: felt_to_bigint(data(event, 2)?)?,
        reserve_price: u256_at(event, 3)?,
        round_address: address_at(event, 5)?,
    })
}

#[derive(Debug)]
pub struct AuctionStarted {
    pub starting_liquidity: BigInt,
    pub available_options: BigInt,
    pub round_address: String,
}

pub fn auction_started(event: &Event) -> Result<AuctionStarted, IndexerError> {
    Ok(AuctionStarted {
        starting_liquidity: u256_at(event, 0)?,
        available_options: u256_at(event, 2)?,
        round_address: address_at(event, 4)?,
    })
}

#[derive(Debug)]
pub struct AuctionEnded {
    pub options_sold: BigInt,
    pub clearing_price: BigInt,
    pub unsold_liquidity: BigInt,
    pub clearing_nonce: i64,
    /// `options_sold * clearing_price`; not carried on the wire.
    pub premiums: BigInt,
    pub round_address: String,
}

pub fn auction_ended(event: &Event) -> Result<AuctionEnded, IndexerError> {
    let options_sold = u256_at(event, 0)?;
    let clearing_price = u256_at(event, 2)?;
    let premiums = &options_sold * &clearing_price;
    Ok(AuctionEnded {
        options_sold,
        clearing_price,
        unsold_liquidity: u256_at(event, 4)?,
        clearing_nonce: felt_to_u64(data(event, 6)?)? as i64,
        premiums,
        round_address: address_at(event, 7)?,
    })
}

#[derive(Debug)]
pub struct RoundSettled {
    pub settlement_price: BigInt,
    pub payout_per_option: BigInt,
    pub round_address: String,
}

pub fn round_settled(event: &Event) -> Result<RoundSettled, IndexerError> {
    Ok(RoundSettled {
        settlement_price: u256_at(event, 0)?,
        payout_per_option: u256_at(event, 2)?,
        round_address: address_at(event, 4)?,
    })
}

#[derive(Debug)]
pub struct BidPlaced {
    pub buyer_address: String,
    pub bid_id: String,
    pub amount: BigInt,
    pub price: BigInt,
    pub tree_nonce: i64,
    pub round_address: String,
}

pub fn bid_placed(event: &Event) -> Result<BidPlaced, IndexerError> {
    Ok(BidPlaced {
        buyer_address: normalize_hex(key(event, 1)?)?,
        bid_id: normalize_hex(data(event, 0)?)?,
        amount: u256_at(event, 1)?,
        price: u256_at(event, 3)?,
        tree_nonce: felt_to_u64(data(event, 5)?)? as i64,
        round_address: address_at(event, 6)?,
    })
}

#[derive(Debug)]
pub struct BidUpdated {
    pub bid_id: String,
    pub price: BigInt,
    pub tree_nonce_old: i64,
    pub tree_nonce_new: i64,
    pub round_address: String,
}

pub fn bid_updated(event: &Event) -> Result<BidUpdated, IndexerError> {
    Ok(BidUpdated {
        bid_id: normalize_hex(data(event, 0)?)?,
        price: u256_at(event, 1)?,
        tree_nonce_old: felt_to_u64(data(event, 3)?)? as i64,
        tree_nonce_new: felt_to_u64(data(event, 4)?)? as i64,
        round_address: address_at(event, 5)?,
    })
}

#[derive(Debug)]
pub struct OptionsMinted {
    pub buyer_address: String,
    pub round_address: String,
}

pub fn options_minted(event: &Event) -> Result<OptionsMinted, IndexerError> {
    Ok(OptionsMinted {
        buyer_address: normalize_hex(key(event, 1)?)?,
        round_address: address_at(event, 2)?,
    })
}

#[derive(Debug)]
pub struct OptionsExercised {
    pub buyer_address: String,
    pub mintable_options_exercised: BigInt,
    pub round_address: String,
}

pub fn options_exercised(event: &Event) -> Result<OptionsExercised, IndexerError> {
    Ok(OptionsExercised {
        buyer_address: normalize_hex(key(event, 1)?)?,
        mintable_options_exercised: u256_at(event, 2)?,
        round_address: address_at(event, 6)?,
    })
}

#[derive(Debug)]
pub struct UnusedBidsRefunded {
    pub buyer_address: String,
    pub round_address: String,
}

pub fn unused_bids_refunded(event: &Event) -> Result<UnusedBidsRefunded, IndexerError> {
    Ok(UnusedBidsRefunded {
        buyer_address: normalize_hex(key(event, 1)?)?,
        round_address: address_at(event, 2)?,
    })
}

/// UDC deployment payload carrying the vault's static parameters.
#[derive(Debug)]
pub struct ContractDeployed {
    pub vault_address: String,
    pub fossil_client_address: String,
    pub eth_address: String,
    pub option_round_class_hash: String,
    pub alpha: BigInt,
    pub strike_level: BigInt,
    pub round_transition_period: i64,
    pub auction_duration: i64,
    pub round_duration: i64,
}

pub fn contract_deployed(event: &Event) -> Result<ContractDeployed, IndexerError> {
    Ok(ContractDeployed {
        vault_address: address_at(event, 0)?,
        fossil_client_address: address_at(event, 5)?,
        eth_address: address_at(event, 6)?,
        option_round_class_hash: address_at(event, 7)?,
        alpha: felt_to_bigint(data(event, 8)?)?,
        strike_level: felt_to_bigint(data(event, 9)?)?,
        round_transition_period: felt_to_u64(data(event, 10)?)? as i64,
        auction_duration: felt_to_u64(data(event, 11)?)? as i64,
        round_duration: felt_to_u64(data(event, 12)?)? as i64,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn event(name: &str, keys: Vec<&str>, data: Vec<&str>) -> Event {
        Event {
            from: "0xdead".to_string(),
            transaction_hash: "0x1".to_string(),
            block_number: 100,
            block_hash: "0xb".to_string(),
            vault_address: "0xdead".to_string(),
            timestamp: 1_700_000_000,
            event_nonce: 1,
            event_name: name.to_string(),
            event_keys: keys.into_iter().map(String::from).collect(),
            event_data: data.into_iter().map(String::from).collect(),
        }
    }

    #[test]
    fn test_deposit_payload() {
        let e = event(
            "Deposit",
            vec!["0xkey", "0x0A"],
            vec!["0x64", "0x0", "0x64", "0x0", "0x64", "0x0"],
        );
        let decoded = deposit_or_withdraw(&e).unwrap();
        assert_eq!(decoded.lp_address, "0xa");
        assert_eq!(decoded.lp_unlocked, BigInt::from(100u64));
        assert_eq!(decoded.vault_unlocked, BigInt::from(100u64));
    }

    #[test]
    fn test_withdrawal_queued_carries_distinct_before_and_after() {
        let e = event(
            "WithdrawalQueued",
            vec!["0xkey", "0xa"],
            vec![
                "0x2710", // bps = 10000
                "0x1",    // round id
                "0x64", "0x0", // queued before = 100
                "0x12c", "0x0", // queued now = 300
                "0x3e8", "0x0", // vault queued now = 1000
            ],
        );
        let decoded = withdrawal_queued(&e).unwrap();
        assert_eq!(decoded.bps, 10000);
        assert_eq!(decoded.account_queued_before, BigInt::from(100u64));
        assert_eq!(decoded.account_queued_now, BigInt::from(300u64));
        assert_eq!(decoded.vault_queued_now, BigInt::from(1000u64));
    }

    #[test]
    fn test_auction_ended_derives_premiums() {
        let e = event(
            "AuctionEnded",
            vec!["0xkey"],
            vec!["0x64", "0x0", "0x3", "0x0", "0x0", "0x0", "0x3", "0x0c0ffee"],
        );
        let decoded = auction_ended(&e).unwrap();
        assert_eq!(decoded.options_sold, BigInt::from(100u64));
        assert_eq!(decoded.clearing_price, BigInt::from(3u64));
        assert_eq!(decoded.premiums, BigInt::from(300u64));
        assert_eq!(decoded.clearing_nonce, 3);
        assert_eq!(decoded.round_address, "0xc0ffee");
    }

    #[test]
    fn test_missing_word_is_malformed() {
        let e = event("Deposit", vec!["0xkey", "0xa"], vec!["0x64", "0x0"]);
        match deposit_or_withdraw(&e) {
            Err(IndexerError::MalformedPayload(msg)) => assert!(msg.contains("Deposit")),
            other => panic!("expected malformed payload, got {other:?}"),
        }
    }
}
