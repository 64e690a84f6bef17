//! Field-element and address helpers.
//!
//! Journaled event keys and data are hex strings as emitted by the node.
//! Event names travel as 250-bit truncated Keccak-256 selectors; amounts are
//! u256 values split into (low, high) 128-bit felt pairs.

use num_bigint::BigUint;
use sha3::{Digest, Keccak256};

use crate::errors::IndexerError;
use crate::models::BigInt;

/// Vault events the ingress journals. Anything else coming out of a tracked
/// contract is silently ignored.
pub const VAULT_EVENT_NAMES: [&str; 15] = [
    "Deposit",
    "Withdrawal",
    "WithdrawalQueued",
    "StashWithdrawn",
    "OptionRoundDeployed",
    "L1RequestFulfilled",
    "PricingDataSet",
    "AuctionStarted",
    "AuctionEnded",
    "OptionRoundSettled",
    "BidPlaced",
    "BidUpdated",
    "UnusedBidsRefunded",
    "OptionsMinted",
    "OptionsExercised",
];

pub const CONTRACT_DEPLOYED: &str = "ContractDeployed";

/// 250-bit truncated Keccak-256 of an event name, hex encoded without
/// leading-zero padding. This is the selector stored in `keys[0]`.
pub fn event_selector(name: &str) -> String {
    let mut hasher = Keccak256::new();
    hasher.update(name.as_bytes());
    let digest = hasher.finalize();

    let mut value = BigUint::from_bytes_be(&digest);
    let mask = (BigUint::from(1u8) << 250u32) - BigUint::from(1u8);
    value &= mask;
    format!("0x{}", value.to_str_radix(16))
}

/// Match `keys[0]` against the vault event whitelist.
pub fn decode_event_name(key: &str) -> Option<&'static str> {
    let normalized = normalize_hex(key).ok()?;
    VAULT_EVENT_NAMES
        .iter()
        .find(|name| event_selector(name) == normalized)
        .copied()
}

/// Parse a `0x` hex felt into an integer.
pub fn felt_to_bigint(felt: &str) -> Result<BigInt, IndexerError> {
    let digits = felt
        .strip_prefix("0x")
        .ok_or_else(|| IndexerError::MalformedPayload(format!("felt {felt:?} missing 0x prefix")))?;
    let digits = if digits.is_empty() { "0" } else { digits };
    let value = BigUint::parse_bytes(digits.as_bytes(), 16)
        .ok_or_else(|| IndexerError::MalformedPayload(format!("invalid felt hex {felt:?}")))?;
    Ok(BigInt::from_bytes_be(&value.to_bytes_be()))
}

pub fn felt_to_u64(felt: &str) -> Result<u64, IndexerError> {
    felt_to_bigint(felt)?
        .to_u64()
        .ok_or_else(|| IndexerError::MalformedPayload(format!("felt {felt:?} exceeds u64")))
}

/// Combine a (low, high) felt pair into a u256: `high << 128 | low`.
pub fn combine_u256(low: &str, high: &str) -> Result<BigInt, IndexerError> {
    let low = felt_to_bigint(low)?;
    let high = felt_to_bigint(high)?;
    if low.checked_sub(&BigInt::from(1u64).shl_128()).is_some() {
        return Err(IndexerError::MalformedPayload(format!(
            "u256 low word {low} exceeds 128 bits"
        )));
    }
    Ok(&high.shl_128() + &low)
}

/// `0x` + leading-zeros-stripped hex, preserving at least one digit.
/// Applied everywhere an address is compared: the node pads to 64 nibbles,
/// deployment payloads do not.
pub fn normalize_hex(hex: &str) -> Result<String, IndexerError> {
    let digits = hex
        .strip_prefix("0x")
        .ok_or_else(|| IndexerError::MalformedPayload(format!("address {hex:?} missing 0x prefix")))?;
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(IndexerError::MalformedPayload(format!(
            "address {hex:?} contains non-hex characters"
        )));
    }
    let trimmed = digits.trim_start_matches('0');
    if trimmed.is_empty() {
        Ok("0x0".to_string())
    } else {
        Ok(format!("0x{}", trimmed.to_ascii_lowercase()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_leading_zeros() {
        assert_eq!(
            normalize_hex("0x050aa16a833664c92d4163b14fed470786fa4411ffd3b3addbb97a70ae56efbd")
                .unwrap(),
            "0x50aa16a833664c92d4163b14fed470786fa4411ffd3b3addbb97a70ae56efbd"
        );
        assert_eq!(normalize_hex("0x0000").unwrap(), "0x0");
        assert_eq!(normalize_hex("0x").unwrap(), "0x0");
        assert!(normalize_hex("50aa").is_err());
        assert!(normalize_hex("0xzz").is_err());
    }

    #[test]
    fn test_selector_round_trips_through_whitelist() {
        for name in VAULT_EVENT_NAMES {
            assert_eq!(decode_event_name(&event_selector(name)), Some(name));
        }
        assert_eq!(decode_event_name(&event_selector("Transfer")), None);
        assert_eq!(decode_event_name("not-hex"), None);
    }

    #[test]
    fn test_selector_matches_padded_key() {
        // Node-emitted keys may carry leading zeros after 0x.
        let selector = event_selector("Deposit");
        let padded = format!("0x00{}", &selector[2..]);
        assert_eq!(decode_event_name(&padded), Some("Deposit"));
    }

    #[test]
    fn test_combine_u256() {
        assert_eq!(combine_u256("0x5", "0x0").unwrap(), BigInt::from(5u64));
        let combined = combine_u256("0x1", "0x2").unwrap();
        assert_eq!(combined, &BigInt::from(2u64).shl_128() + &BigInt::from(1u64));
        // A low word wider than 128 bits is not a valid split.
        assert!(combine_u256("0x100000000000000000000000000000000", "0x0").is_err());
    }

    #[test]
    fn test_felt_to_u64() {
        assert_eq!(felt_to_u64("0x2a").unwrap(), 42);
        assert!(felt_to_u64("0x100000000000000000000").is_err());
    }
}
