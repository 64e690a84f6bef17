//! Shared entities for the journal, the projection and the fan-out payloads.
//!
//! Client-facing JSON is camelCase; Postgres NOTIFY payloads arrive with the
//! snake_case column names, so every field carries an alias for the column
//! spelling. Money columns are NUMERIC(78,0) and cross the driver boundary
//! as decimal strings (see [`BigInt`]).

use std::fmt;
use std::ops::{Add, Mul};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use num_bigint::BigUint;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Arbitrary-precision non-negative integer used for every balance, price
/// and option count. Arithmetic is exact; division floors; subtraction that
/// would go negative must go through [`BigInt::checked_sub`].
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct BigInt(BigUint);

impl BigInt {
    pub fn zero() -> Self {
        BigInt(BigUint::from(0u8))
    }

    pub fn is_zero(&self) -> bool {
        self.0 == BigUint::from(0u8)
    }

    pub fn from_bytes_be(bytes: &[u8]) -> Self {
        BigInt(BigUint::from_bytes_be(bytes))
    }

    /// `None` when the result would be negative.
    pub fn checked_sub(&self, other: &BigInt) -> Option<BigInt> {
        if self.0 < other.0 {
            None
        } else {
            Some(BigInt(&self.0 - &other.0))
        }
    }

    /// Floor division. Panics on a zero divisor; callers guard explicitly.
    pub fn floor_div(&self, divisor: &BigInt) -> BigInt {
        BigInt(&self.0 / &divisor.0)
    }

    pub fn shl_128(&self) -> BigInt {
        BigInt(&self.0 << 128u32)
    }

    pub fn to_u64(&self) -> Option<u64> {
        u64::try_from(&self.0).ok()
    }
}

impl From<u64> for BigInt {
    fn from(v: u64) -> Self {
        BigInt(BigUint::from(v))
    }
}

impl Add<&BigInt> for &BigInt {
    type Output = BigInt;

    fn add(self, rhs: &BigInt) -> BigInt {
        BigInt(&self.0 + &rhs.0)
    }
}

impl Mul<&BigInt> for &BigInt {
    type Output = BigInt;

    fn mul(self, rhs: &BigInt) -> BigInt {
        BigInt(&self.0 * &rhs.0)
    }
}

impl fmt::Display for BigInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_str_radix(10))
    }
}

impl FromStr for BigInt {
    type Err = num_bigint::ParseBigIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(BigInt(BigUint::from_str(s)?))
    }
}

impl Serialize for BigInt {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for BigInt {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // NOTIFY payloads carry NUMERIC columns as bare JSON numbers while
        // clients send decimal strings; accept both spellings exactly.
        let value = serde_json::Value::deserialize(deserializer)?;
        let text = match &value {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Number(n) => n.to_string(),
            other => {
                return Err(serde::de::Error::custom(format!(
                    "expected decimal string or number, got {other}"
                )))
            }
        };
        text.parse::<BigInt>()
            .map_err(|e| serde::de::Error::custom(format!("invalid big integer {text:?}: {e}")))
    }
}

/// Canonical-chain block lineage row (`starknet_blocks`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StarknetBlock {
    #[serde(alias = "block_number")]
    pub block_number: i64,
    #[serde(alias = "block_hash")]
    pub block_hash: String,
    #[serde(alias = "parent_hash")]
    pub parent_hash: String,
    pub timestamp: i64,
    pub status: BlockStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockStatus {
    #[serde(rename = "MINED")]
    Mined,
    #[serde(rename = "REVERTED")]
    Reverted,
}

impl BlockStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockStatus::Mined => "MINED",
            BlockStatus::Reverted => "REVERTED",
        }
    }
}

impl FromStr for BlockStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MINED" => Ok(BlockStatus::Mined),
            "REVERTED" => Ok(BlockStatus::Reverted),
            other => Err(format!("unknown block status {other:?}")),
        }
    }
}

/// Raw journaled vault event. `event_nonce` is the dense per-vault sequence
/// assigned at insert; application order inside a driver event follows it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub from: String,
    #[serde(alias = "transaction_hash")]
    pub transaction_hash: String,
    #[serde(alias = "block_number")]
    pub block_number: i64,
    #[serde(alias = "block_hash")]
    pub block_hash: String,
    #[serde(alias = "vault_address")]
    pub vault_address: String,
    pub timestamp: i64,
    #[serde(alias = "event_nonce")]
    pub event_nonce: i64,
    #[serde(alias = "event_name")]
    pub event_name: String,
    #[serde(alias = "event_keys")]
    pub event_keys: Vec<String>,
    #[serde(alias = "event_data")]
    pub event_data: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriverEventKind {
    StartBlock,
    RevertBlock,
    CatchupVault,
}

impl DriverEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriverEventKind::StartBlock => "StartBlock",
            DriverEventKind::RevertBlock => "RevertBlock",
            DriverEventKind::CatchupVault => "CatchupVault",
        }
    }
}

impl FromStr for DriverEventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "StartBlock" => Ok(DriverEventKind::StartBlock),
            "RevertBlock" => Ok(DriverEventKind::RevertBlock),
            "CatchupVault" => Ok(DriverEventKind::CatchupVault),
            other => Err(format!("unknown driver event kind {other:?}")),
        }
    }
}

/// Control record instructing the replayer to apply or revert a block, or to
/// catch a vault up over a block range. Consumed in `sequence_index` order;
/// `is_processed` flips exactly once, inside the replay transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverEvent {
    pub id: i32,
    pub sequence_index: i64,
    #[serde(rename = "type")]
    pub kind: DriverEventKind,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    pub is_processed: bool,
    #[serde(default)]
    pub block_hash: Option<String>,
    #[serde(default)]
    pub vault_address: Option<String>,
    #[serde(default)]
    pub start_block_hash: Option<String>,
    #[serde(default)]
    pub end_block_hash: Option<String>,
}

/// Tracked-vault bookkeeping row. `last_block_indexed` advances only after
/// the vault's events for that block are durably journaled.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultRegistry {
    #[serde(alias = "vault_address")]
    pub address: String,
    #[serde(alias = "deployed_at")]
    pub deployed_at: String,
    #[serde(alias = "last_block_indexed")]
    #[serde(default)]
    pub last_block_indexed: Option<String>,
    #[serde(alias = "last_block_processed")]
    #[serde(default)]
    pub last_block_processed: Option<String>,
}

/// Current projection of a vault. Mutated only by the replayer; the balance
/// columns are the cached aggregate of the per-LP rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultState {
    pub address: String,
    #[serde(alias = "current_round_id")]
    pub current_round_id: i64,
    #[serde(alias = "current_round_address")]
    pub current_round_address: String,
    #[serde(alias = "unlocked_balance")]
    pub unlocked_balance: BigInt,
    #[serde(alias = "locked_balance")]
    pub locked_balance: BigInt,
    #[serde(alias = "stashed_balance")]
    pub stashed_balance: BigInt,
    #[serde(alias = "latest_block")]
    pub latest_block: i64,
    #[serde(alias = "deployment_date")]
    pub deployment_date: i64,
    #[serde(alias = "fossil_client_address")]
    pub fossil_client_address: String,
    #[serde(alias = "eth_address")]
    pub eth_address: String,
    #[serde(alias = "option_round_class_hash")]
    pub option_round_class_hash: String,
    pub alpha: BigInt,
    #[serde(alias = "strike_level")]
    pub strike_level: BigInt,
    #[serde(alias = "round_transition_period")]
    pub round_transition_period: i64,
    #[serde(alias = "auction_duration")]
    pub auction_duration: i64,
    #[serde(alias = "round_duration")]
    pub round_duration: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiquidityProviderState {
    #[serde(alias = "vault_address")]
    pub vault_address: String,
    pub address: String,
    #[serde(alias = "unlocked_balance")]
    pub unlocked_balance: BigInt,
    #[serde(alias = "locked_balance")]
    pub locked_balance: BigInt,
    #[serde(alias = "stashed_balance")]
    pub stashed_balance: BigInt,
    #[serde(alias = "latest_block")]
    pub latest_block: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundState {
    Open,
    Auctioning,
    Running,
    Settled,
}

impl RoundState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoundState::Open => "Open",
            RoundState::Auctioning => "Auctioning",
            RoundState::Running => "Running",
            RoundState::Settled => "Settled",
        }
    }
}

impl FromStr for RoundState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Open" => Ok(RoundState::Open),
            "Auctioning" => Ok(RoundState::Auctioning),
            "Running" => Ok(RoundState::Running),
            "Settled" => Ok(RoundState::Settled),
            other => Err(format!("unknown round state {other:?}")),
        }
    }
}

/// One auction + settlement cycle of a vault. Pricing columns stay null
/// until their setting event (`PricingDataSet`, `AuctionEnded`,
/// `OptionRoundSettled`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionRound {
    pub address: String,
    #[serde(alias = "vault_address")]
    pub vault_address: String,
    #[serde(alias = "round_id")]
    pub round_id: i64,
    #[serde(alias = "cap_level")]
    #[serde(default)]
    pub cap_level: Option<BigInt>,
    #[serde(alias = "strike_price")]
    #[serde(default)]
    pub strike_price: Option<BigInt>,
    #[serde(alias = "reserve_price")]
    #[serde(default)]
    pub reserve_price: Option<BigInt>,
    #[serde(rename = "auctionStartDate", alias = "start_date")]
    pub start_date: i64,
    #[serde(rename = "auctionEndDate", alias = "end_date")]
    pub end_date: i64,
    #[serde(rename = "optionSettleDate", alias = "settlement_date")]
    pub settlement_date: i64,
    #[serde(alias = "deployment_date")]
    pub deployment_date: i64,
    #[serde(alias = "starting_liquidity")]
    pub starting_liquidity: BigInt,
    #[serde(alias = "queued_liquidity")]
    pub queued_liquidity: BigInt,
    #[serde(alias = "remaining_liquidity")]
    pub remaining_liquidity: BigInt,
    #[serde(alias = "available_options")]
    pub available_options: BigInt,
    #[serde(alias = "sold_options")]
    #[serde(default)]
    pub sold_options: Option<BigInt>,
    #[serde(alias = "clearing_price")]
    #[serde(default)]
    pub clearing_price: Option<BigInt>,
    #[serde(alias = "unsold_liquidity")]
    pub unsold_liquidity: BigInt,
    pub premiums: BigInt,
    #[serde(alias = "settlement_price")]
    #[serde(default)]
    pub settlement_price: Option<BigInt>,
    #[serde(alias = "payout_per_option")]
    #[serde(default)]
    pub payout_per_option: Option<BigInt>,
    pub state: RoundState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionBuyer {
    pub address: String,
    #[serde(alias = "round_address")]
    pub round_address: String,
    #[serde(alias = "mintable_options")]
    pub mintable_options: BigInt,
    #[serde(alias = "refundable_amount")]
    pub refundable_amount: BigInt,
    #[serde(alias = "has_minted")]
    pub has_minted: bool,
    #[serde(alias = "has_refunded")]
    pub has_refunded: bool,
    #[serde(default)]
    pub bids: Vec<Bid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bid {
    #[serde(rename = "address", alias = "buyer_address")]
    pub buyer_address: String,
    #[serde(alias = "round_address")]
    pub round_address: String,
    #[serde(alias = "bid_id")]
    pub bid_id: String,
    #[serde(alias = "tree_nonce")]
    pub tree_nonce: i64,
    pub amount: BigInt,
    pub price: BigInt,
}

/// Withdrawal scheduled against the next settlement. Overwritten by each
/// `WithdrawalQueued` for the same (round, LP).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedLiquidity {
    pub address: String,
    #[serde(alias = "round_address")]
    pub round_address: String,
    pub bps: i64,
    #[serde(alias = "queued_liquidity")]
    pub queued_liquidity: BigInt,
}

/// Gas-history row (`blocks`), written by the gas producer and read by the
/// fan-out. TWAPs are decimal strings; one column per supported horizon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasBlock {
    #[serde(alias = "block_number")]
    pub block_number: i64,
    pub timestamp: i64,
    #[serde(rename = "baseFee", alias = "basefee")]
    pub basefee: String,
    #[serde(alias = "is_confirmed")]
    pub is_confirmed: bool,
    #[serde(alias = "twelve_min_twap")]
    pub twelve_min_twap: String,
    #[serde(alias = "three_hour_twap")]
    pub three_hour_twap: String,
    #[serde(alias = "thirty_day_twap")]
    pub thirty_day_twap: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bigint_checked_sub_refuses_negative() {
        let a = BigInt::from(5u64);
        let b = BigInt::from(7u64);
        assert!(a.checked_sub(&b).is_none());
        assert_eq!(b.checked_sub(&a), Some(BigInt::from(2u64)));
    }

    #[test]
    fn test_bigint_floor_div() {
        let a = BigInt::from(7u64);
        let b = BigInt::from(2u64);
        assert_eq!(a.floor_div(&b), BigInt::from(3u64));
    }

    #[test]
    fn test_bigint_deserializes_from_string_and_number() {
        let from_str: BigInt =
            serde_json::from_str("\"340282366920938463463374607431768211456\"").unwrap();
        let from_num: BigInt =
            serde_json::from_str("340282366920938463463374607431768211456").unwrap();
        assert_eq!(from_str, from_num);
        assert_eq!(from_str, BigInt::from(1u64).shl_128());
    }

    #[test]
    fn test_driver_event_notify_payload() {
        let payload = r#"{
            "id": 12,
            "sequence_index": 40,
            "type": "CatchupVault",
            "is_processed": false,
            "block_hash": null,
            "vault_address": "0xabc",
            "start_block_hash": "0x1",
            "end_block_hash": "0x2"
        }"#;
        let event: DriverEvent = serde_json::from_str(payload).unwrap();
        assert_eq!(event.kind, DriverEventKind::CatchupVault);
        assert_eq!(event.vault_address.as_deref(), Some("0xabc"));
        assert!(!event.is_processed);
    }

    #[test]
    fn test_lp_state_accepts_both_key_spellings() {
        let notify = r#"{
            "vault_address": "0x1",
            "address": "0x2",
            "unlocked_balance": 100,
            "locked_balance": 0,
            "stashed_balance": 0,
            "latest_block": 7
        }"#;
        let lp: LiquidityProviderState = serde_json::from_str(notify).unwrap();
        assert_eq!(lp.unlocked_balance, BigInt::from(100u64));

        let out = serde_json::to_value(&lp).unwrap();
        assert_eq!(out["vaultAddress"], "0x1");
        assert_eq!(out["unlockedBalance"], "100");
    }
}
