//! Boundary validation for client subscribe/update messages. Failures are
//! returned to the client as one structured error before the connection is
//! closed.

use crate::server::messages::{GasRequest, SubscribeVaultMessage, VaultRequest};

/// `0x` followed by hex digits, 42 characters in total.
pub fn is_valid_address(address: &str) -> bool {
    address.len() == 42
        && address.starts_with("0x")
        && address[2..].chars().all(|c| c.is_ascii_hexdigit())
}

pub fn validate_subscription_message(message: &SubscribeVaultMessage) -> Result<(), String> {
    if message.address.is_empty() {
        return Err("address is required".to_string());
    }
    if message.vault_address.is_empty() {
        return Err("vault address is required".to_string());
    }
    if message.user_type.is_empty() {
        return Err("user type is required".to_string());
    }
    if message.user_type != "lp" && message.user_type != "ob" {
        return Err(format!(
            "invalid user type: {}, must be 'lp' or 'ob'",
            message.user_type
        ));
    }
    if !is_valid_address(&message.address) {
        return Err(format!("invalid address format: {}", message.address));
    }
    if !is_valid_address(&message.vault_address) {
        return Err(format!("invalid vault address format: {}", message.vault_address));
    }
    Ok(())
}

pub fn validate_gas_request(request: &GasRequest) -> Result<(), String> {
    if request.start_timestamp == 0 {
        return Err("start timestamp is required".to_string());
    }
    if request.end_timestamp == 0 {
        return Err("end timestamp is required".to_string());
    }
    if request.start_timestamp >= request.end_timestamp {
        return Err("start timestamp must be before end timestamp".to_string());
    }
    if ![960, 13200, 2631600].contains(&request.round_duration) {
        return Err(format!(
            "invalid round duration: {}, must be 960, 13200, or 2631600",
            request.round_duration
        ));
    }
    Ok(())
}

pub fn validate_vault_request(request: &VaultRequest) -> Result<(), String> {
    if request.updated_field.is_empty() {
        return Err("updated field is required".to_string());
    }
    if request.updated_value.is_empty() {
        return Err("updated value is required".to_string());
    }
    if request.updated_field != "address" {
        return Err(format!(
            "invalid field: {}, must be 'address'",
            request.updated_field
        ));
    }
    if !is_valid_address(&request.updated_value) {
        return Err(format!("invalid address format: {}", request.updated_value));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD_ADDRESS: &str = "0x00000000000000000000000000000000000000ab";

    fn subscribe(address: &str, vault: &str, user_type: &str) -> SubscribeVaultMessage {
        SubscribeVaultMessage {
            address: address.to_string(),
            vault_address: vault.to_string(),
            user_type: user_type.to_string(),
        }
    }

    #[test]
    fn test_address_format() {
        assert!(is_valid_address(GOOD_ADDRESS));
        assert!(!is_valid_address("0xab")); // too short
        assert!(!is_valid_address(&format!("{GOOD_ADDRESS}ab"))); // too long
        assert!(!is_valid_address("0x00000000000000000000000000000000000000zz"));
        assert!(!is_valid_address("1x00000000000000000000000000000000000000ab"));
    }

    #[test]
    fn test_subscription_message() {
        assert!(validate_subscription_message(&subscribe(GOOD_ADDRESS, GOOD_ADDRESS, "lp")).is_ok());
        assert!(validate_subscription_message(&subscribe(GOOD_ADDRESS, GOOD_ADDRESS, "ob")).is_ok());

        assert!(validate_subscription_message(&subscribe("", GOOD_ADDRESS, "lp")).is_err());
        assert!(validate_subscription_message(&subscribe(GOOD_ADDRESS, "", "lp")).is_err());
        assert!(validate_subscription_message(&subscribe(GOOD_ADDRESS, GOOD_ADDRESS, "")).is_err());
        assert!(
            validate_subscription_message(&subscribe(GOOD_ADDRESS, GOOD_ADDRESS, "trader")).is_err()
        );
        assert!(validate_subscription_message(&subscribe("0xab", GOOD_ADDRESS, "lp")).is_err());
    }

    #[test]
    fn test_gas_request() {
        let good = GasRequest {
            start_timestamp: 100,
            end_timestamp: 200,
            round_duration: 960,
        };
        assert!(validate_gas_request(&good).is_ok());

        for duration in [13200, 2631600] {
            assert!(validate_gas_request(&GasRequest {
                round_duration: duration,
                ..good.clone()
            })
            .is_ok());
        }

        assert!(validate_gas_request(&GasRequest {
            start_timestamp: 0,
            ..good.clone()
        })
        .is_err());
        assert!(validate_gas_request(&GasRequest {
            end_timestamp: 0,
            ..good.clone()
        })
        .is_err());
        assert!(validate_gas_request(&GasRequest {
            start_timestamp: 200,
            end_timestamp: 200,
            round_duration: 960,
        })
        .is_err());
        assert!(validate_gas_request(&GasRequest {
            round_duration: 961,
            ..good
        })
        .is_err());
    }

    #[test]
    fn test_vault_request() {
        assert!(validate_vault_request(&VaultRequest {
            updated_field: "address".to_string(),
            updated_value: GOOD_ADDRESS.to_string(),
        })
        .is_ok());
        assert!(validate_vault_request(&VaultRequest {
            updated_field: "vaultAddress".to_string(),
            updated_value: GOOD_ADDRESS.to_string(),
        })
        .is_err());
        assert!(validate_vault_request(&VaultRequest {
            updated_field: "address".to_string(),
            updated_value: "nope".to_string(),
        })
        .is_err());
        assert!(validate_vault_request(&VaultRequest {
            updated_field: String::new(),
            updated_value: GOOD_ADDRESS.to_string(),
        })
        .is_err());
    }
}
