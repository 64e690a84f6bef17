//! `/subscribeGas`: the client message picks a time window and round
//! duration; the reply is the sampled block series split by confirmation
//! status, followed by a push per new confirmed/unconfirmed block on the
//! matching TWAP horizon.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tracing::debug;

use crate::db::gas;

use super::messages::{BlockResponse, ErrorResponse, GasInitialPayload, GasRequest};
use super::subscribers::GasSubscriber;
use super::validations::validate_gas_request;
use super::{send_with_deadline, slow_close_frame, AppState};

pub async fn subscribe_gas(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(|socket| handle(socket, state))
}

async fn handle(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();

    let (subscriber, mut rx) = GasSubscriber::new();
    state.subscribers.add_gas(Arc::clone(&subscriber));

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
                        match handle_request(&state, &subscriber, &text).await {
                            Ok(()) => {}
                            Err(Some(details)) => {
                                let body = ErrorResponse::to_json("Invalid request", details);
                                let _ = send_with_deadline(&mut sink, body).await;
                                break;
                            }
                            Err(None) => break,
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
        }
    }

    state.subscribers.remove_gas(&subscriber);
}

/// Validate and apply one gas request, queueing the windowed series.
/// `Err(Some(details))` closes with a structured error, `Err(None)` just
/// closes.
async fn handle_request(
    state: &AppState,
    subscriber: &Arc<GasSubscriber>,
    text: &str,
) -> Result<(), Option<String>> {
    let request: GasRequest = match serde_json::from_str(text) {
        Ok(request) => request,
        Err(err) => {
            debug!("incorrect gas message format: {err}");
            return Err(None);
        }
    };
    validate_gas_request(&request).map_err(Some)?;

    subscriber.set_round_duration(request.round_duration);

    let blocks = gas::get_blocks(
        &state.pool,
        request.start_timestamp,
        request.end_timestamp,
        request.round_duration,
    )
    .await
    .map_err(|err| {
        debug!("gas window query failed: {err}");
        None
    })?;

    let mut confirmed_blocks = Vec::new();
    let mut unconfirmed_blocks = Vec::new();
    for block in &blocks {
        let response = BlockResponse::for_duration(block, request.round_duration);
        if block.is_confirmed {
            confirmed_blocks.push(response);
        } else {
            unconfirmed_blocks.push(response);
        }
    }

    let payload = GasInitialPayload {
        confirmed_blocks,
        unconfirmed_blocks,
    };
    match serde_json::to_string(&payload) {
        Ok(json) => {
            subscriber.outbox.send_or_mark_slow(json);
            Ok(())
        }
        Err(_) => Err(None),
    }
}
