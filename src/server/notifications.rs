//! LISTEN demux: one connection subscribed to every projection-change
//! channel, routing each notification to the matching subscribers.
//!
//! Routing is per-key: LP updates reach the one subscriber watching that
//! (vault, address) pair, round and vault updates fan out to the whole
//! vault, buyer-keyed updates match on the buyer address. Slow subscribers
//! are marked and left for their connection task to close; no notification
//! is ever retried.

use std::sync::Arc;

use sqlx::postgres::PgListener;
use sqlx::PgPool;
use tracing::{info, warn};

use crate::db::gas;
use crate::errors::IndexerError;
use crate::models::{Bid, GasBlock, LiquidityProviderState, OptionBuyer, OptionRound, VaultState};

use super::messages::{
    BlockResponse, ConfirmedRange, GasUpdate, NotificationEnvelope, VaultUpdate,
};
use super::subscribers::{Subscribers, UserType};

const CHANNELS: [&str; 7] = [
    "lp_update",
    "vault_update",
    "ob_update",
    "or_update",
    "bids_update",
    "confirmed_insert",
    "unconfirmed_insert",
];

pub async fn run(
    db_url: String,
    pool: PgPool,
    subscribers: Arc<Subscribers>,
) -> Result<(), IndexerError> {
    let mut listener = PgListener::connect(&db_url).await?;
    for channel in CHANNELS {
        listener.listen(channel).await?;
    }
    info!("waiting for projection notifications");

    loop {
        let notification = listener.recv().await?;
        let channel = notification.channel().to_string();
        if let Err(err) = route(&channel, notification.payload(), &pool, &subscribers).await {
            // One bad payload must not stop the fan-out for everyone else.
            warn!(channel = %channel, "dropping notification: {err}");
        }
    }
}

async fn route(
    channel: &str,
    payload: &str,
    pool: &PgPool,
    subscribers: &Subscribers,
) -> Result<(), IndexerError> {
    match channel {
        "lp_update" => {
            let envelope: NotificationEnvelope<LiquidityProviderState> = parse(payload)?;
            let message = render(&envelope.operation, "lpState", &envelope.payload)?;
            for subscriber in subscribers.vault_subscribers(&envelope.payload.vault_address) {
                if subscriber.address() == envelope.payload.address {
                    subscriber.outbox.send_or_mark_slow(message.clone());
                }
            }
        }
        "vault_update" => {
            let envelope: NotificationEnvelope<VaultState> = parse(payload)?;
            let message = render(&envelope.operation, "vaultState", &envelope.payload)?;
            for subscriber in subscribers.vault_subscribers(&envelope.payload.address) {
                subscriber.outbox.send_or_mark_slow(message.clone());
            }
        }
        "or_update" => {
            let envelope: NotificationEnvelope<OptionRound> = parse(payload)?;
            let message = render(&envelope.operation, "optionRoundState", &envelope.payload)?;
            for subscriber in subscribers.vault_subscribers(&envelope.payload.vault_address) {
                subscriber.outbox.send_or_mark_slow(message.clone());
            }
        }
        "ob_update" => {
            let envelope: NotificationEnvelope<OptionBuyer> = parse(payload)?;
            let message = render(&envelope.operation, "optionBuyerState", &envelope.payload)?;
            for subscriber in subscribers.all_vault_subscribers() {
                if subscriber.user_type == UserType::Ob
                    && subscriber.address() == envelope.payload.address
                {
                    subscriber.outbox.send_or_mark_slow(message.clone());
                }
            }
        }
        "bids_update" => {
            let envelope: NotificationEnvelope<Bid> = parse(payload)?;
            let message = render(&envelope.operation, "bid", &envelope.payload)?;
            for subscriber in subscribers.all_vault_subscribers() {
                if subscriber.address() == envelope.payload.buyer_address {
                    subscriber.outbox.send_or_mark_slow(message.clone());
                }
            }
        }
        "confirmed_insert" => {
            let range: ConfirmedRange = parse(payload)?;
            let blocks =
                gas::get_blocks(pool, range.start_timestamp, range.end_timestamp, 0).await?;
            push_gas_update(subscribers, &blocks, "confirmedBlocks")?;
        }
        "unconfirmed_insert" => {
            let block: GasBlock = parse(payload)?;
            push_gas_update(subscribers, std::slice::from_ref(&block), "unconfirmedBlocks")?;
        }
        other => warn!(channel = other, "notification on unknown channel"),
    }
    Ok(())
}

fn parse<T: serde::de::DeserializeOwned>(payload: &str) -> Result<T, IndexerError> {
    serde_json::from_str(payload)
        .map_err(|e| IndexerError::MalformedPayload(format!("notification payload: {e}")))
}

fn render<T: serde::Serialize>(
    operation: &str,
    kind: &'static str,
    payload: &T,
) -> Result<String, IndexerError> {
    serde_json::to_string(&VaultUpdate {
        operation: operation.to_string(),
        kind,
        payload,
    })
    .map_err(|e| IndexerError::MalformedPayload(format!("notification render: {e}")))
}

/// Push a gas update to every gas subscriber, selecting each one's TWAP
/// horizon.
fn push_gas_update(
    subscribers: &Subscribers,
    blocks: &[GasBlock],
    kind: &'static str,
) -> Result<(), IndexerError> {
    for subscriber in subscribers.gas_subscribers() {
        let duration = subscriber.round_duration();
        if duration == 0 {
            // Not configured yet; nothing meaningful to push.
            continue;
        }
        let responses: Vec<BlockResponse> = blocks
            .iter()
            .map(|block| BlockResponse::for_duration(block, duration))
            .collect();
        let message = serde_json::to_string(&GasUpdate {
            kind,
            blocks: responses,
        })
        .map_err(|e| IndexerError::MalformedPayload(format!("gas render: {e}")))?;
        subscriber.outbox.send_or_mark_slow(message);
    }
    Ok(())
}
