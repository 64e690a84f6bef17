//! `/subscribeVault`: the first client message picks the vault and the user
//! identity; the reply is the full current state (vault, rounds, LP
//! position, option-buyer rows). After that the subscriber receives the
//! per-key projection updates routed by the notifications demux, and may
//! re-key its account with an `updatedField: "address"` message.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tracing::debug;

use crate::db::projection;
use crate::errors::IndexerError;

use super::messages::{ErrorResponse, InitialVaultPayload, SubscribeVaultMessage, VaultRequest};
use super::subscribers::{UserType, VaultSubscriber};
use super::validations::{validate_subscription_message, validate_vault_request};
use super::{send_with_deadline, slow_close_frame, AppState};

pub async fn subscribe_vault(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(|socket| handle(socket, state))
}

async fn handle(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();

    // First client message carries the subscription parameters.
    let Some(Ok(Message::Text(first))) = stream.next().await else {
        return;
    };
    let subscription: SubscribeVaultMessage = match serde_json::from_str(&first) {
        Ok(message) => message,
        Err(err) => {
            let _ = reject(&mut sink, "Invalid subscription message", err.to_string()).await;
            return;
        }
    };
    if let Err(reason) = validate_subscription_message(&subscription) {
        debug!("invalid subscription message: {reason}");
        let _ = reject(&mut sink, "Invalid subscription message", reason).await;
        return;
    }
    let user_type = match subscription.user_type.parse::<UserType>() {
        Ok(user_type) => user_type,
        Err(reason) => {
            let _ = reject(&mut sink, "Invalid subscription message", reason).await;
            return;
        }
    };

    let initial = match initial_payload(&state, &subscription.vault_address, &subscription.address)
        .await
    {
        Ok(payload) => payload,
        Err(err) => {
            debug!("vault initial payload failed: {err}");
            let _ = reject(&mut sink, "Subscription failed", err.to_string()).await;
            return;
        }
    };
    let Ok(initial_json) = serde_json::to_string(&initial) else {
        return;
    };
    if send_with_deadline(&mut sink, initial_json).await.is_err() {
        return;
    }

    let (subscriber, mut rx) = VaultSubscriber::new(
        subscription.address,
        subscription.vault_address,
        user_type,
    );
    state.subscribers.add_vault(Arc::clone(&subscriber));

    loop {
        tokio::select! {
            message = rx.recv() => {
                let Some(message) = message else { break };
                if send_with_deadline(&mut sink, message).await.is_err() {
                    break;
                }
            }
            _ = subscriber.outbox.slow_triggered() => {
                let _ = sink.send(Message::Close(Some(slow_close_frame()))).await;
                break;
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if handle_request(&state, &subscriber, &text).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
        }
    }

    state.subscribers.remove_vault(&subscriber);
}

/// Apply one follow-up client request. An invalid request earns a single
/// structured error through the subscriber's queue and ends the connection.
async fn handle_request(
    state: &AppState,
    subscriber: &Arc<VaultSubscriber>,
    text: &str,
) -> Result<(), ()> {
    let request: VaultRequest = match serde_json::from_str(text) {
        Ok(request) => request,
        Err(err) => {
            debug!("incorrect message format: {err}");
            return Err(());
        }
    };
    if let Err(reason) = validate_vault_request(&request) {
        debug!("invalid vault request: {reason}");
        subscriber
            .outbox
            .send_or_mark_slow(ErrorResponse::to_json("Invalid vault request", reason));
        return Err(());
    }

    subscriber.set_address(request.updated_value.clone());
    let update = account_update_payload(state, &subscriber.vault_address, &request.updated_value)
        .await
        .map_err(|err| {
            debug!("account update failed: {err}");
        })?;
    match serde_json::to_string(&update) {
        Ok(json) => {
            subscriber.outbox.send_or_mark_slow(json);
            Ok(())
        }
        Err(_) => Err(()),
    }
}

/// Vault state, its rounds, and the caller's LP and option-buyer positions.
async fn initial_payload(
    state: &AppState,
    vault_address: &str,
    address: &str,
) -> Result<InitialVaultPayload, IndexerError> {
    let vault_state = projection::get_vault_state(&state.pool, vault_address)
        .await?
        .ok_or_else(|| IndexerError::Invariant(format!("unknown vault {vault_address}")))?;
    let option_round_states = projection::get_option_rounds_by_vault(&state.pool, vault_address)
        .await?;
    let liquidity_provider_state =
        projection::get_lp_state(&state.pool, vault_address, address).await?;
    let option_buyer_states = projection::get_option_buyers_by_address(&state.pool, address).await?;

    Ok(InitialVaultPayload {
        payload_type: "initial",
        liquidity_provider_state,
        option_buyer_states,
        vault_state: Some(vault_state),
        option_round_states,
    })
}

/// Positions of the re-keyed account only.
async fn account_update_payload(
    state: &AppState,
    vault_address: &str,
    address: &str,
) -> Result<InitialVaultPayload, IndexerError> {
    let liquidity_provider_state =
        projection::get_lp_state(&state.pool, vault_address, address).await?;
    let option_buyer_states = projection::get_option_buyers_by_address(&state.pool, address).await?;

    Ok(InitialVaultPayload {
        payload_type: "account_update",
        liquidity_provider_state,
        option_buyer_states,
        vault_state: None,
        option_round_states: Vec::new(),
    })
}

async fn reject(
    sink: &mut SplitSink<WebSocket, Message>,
    error: &'static str,
    details: String,
) -> Result<(), ()> {
    let body = ErrorResponse::to_json(error, details);
    send_with_deadline(sink, body).await
}
