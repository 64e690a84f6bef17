//! Wire shapes of the WebSocket surfaces. All client-facing keys are
//! camelCase; notification payloads from Postgres deserialize through the
//! snake_case aliases on the models.

use serde::{Deserialize, Serialize};

use crate::models::{
    GasBlock, LiquidityProviderState, OptionBuyer, OptionRound, VaultState,
};

/// First client message on `/subscribeVault`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeVaultMessage {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub vault_address: String,
    #[serde(default)]
    pub user_type: String,
}

/// Follow-up client message on `/subscribeVault` re-keying the account.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultRequest {
    #[serde(default)]
    pub updated_field: String,
    #[serde(default)]
    pub updated_value: String,
}

/// Client message on `/subscribeGas` selecting the window and horizon.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasRequest {
    #[serde(default)]
    pub start_timestamp: i64,
    #[serde(default)]
    pub end_timestamp: i64,
    #[serde(default)]
    pub round_duration: i64,
}

/// Envelope published by the projection-table triggers.
#[derive(Debug, Deserialize)]
pub struct NotificationEnvelope<T> {
    pub operation: String,
    pub payload: T,
}

/// Projection update pushed to vault subscribers.
#[derive(Debug, Serialize)]
pub struct VaultUpdate<T> {
    pub operation: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub payload: T,
}

/// Initial payload (and `account_update` reply) on `/subscribeVault`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitialVaultPayload {
    pub payload_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub liquidity_provider_state: Option<LiquidityProviderState>,
    pub option_buyer_states: Vec<OptionBuyer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vault_state: Option<VaultState>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub option_round_states: Vec<OptionRound>,
}

/// One gas block with the TWAP column matching the subscriber's horizon.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockResponse {
    pub block_number: i64,
    pub timestamp: i64,
    pub base_fee: String,
    pub is_confirmed: bool,
    pub twap: String,
}

impl BlockResponse {
    /// Select the TWAP horizon for `round_duration`.
    pub fn for_duration(block: &GasBlock, round_duration: i64) -> Self {
        let twap = match round_duration {
            960 => block.twelve_min_twap.clone(),
            13200 => block.three_hour_twap.clone(),
            2631600 => block.thirty_day_twap.clone(),
            _ => block.twelve_min_twap.clone(),
        };
        Self {
            block_number: block.block_number,
            timestamp: block.timestamp,
            base_fee: block.basefee.clone(),
            is_confirmed: block.is_confirmed,
            twap,
        }
    }
}

/// Initial `/subscribeGas` reply: the sampled series split by confirmation.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GasInitialPayload {
    pub confirmed_blocks: Vec<BlockResponse>,
    pub unconfirmed_blocks: Vec<BlockResponse>,
}

/// Incremental gas push.
#[derive(Debug, Serialize)]
pub struct GasUpdate {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub blocks: Vec<BlockResponse>,
}

/// Range carried by a `confirmed_insert` notification.
#[derive(Debug, Deserialize)]
pub struct ConfirmedRange {
    pub start_timestamp: i64,
    pub end_timestamp: i64,
}

/// Single structured error sent before closing a misbehaving connection.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
    pub details: String,
}

impl ErrorResponse {
    pub fn to_json(error: &'static str, details: impl Into<String>) -> String {
        serde_json::to_string(&ErrorResponse {
            error,
            details: details.into(),
        })
        .unwrap_or_else(|_| format!("{{\"error\":\"{error}\"}}"))
    }
}
