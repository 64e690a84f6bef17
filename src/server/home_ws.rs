//! `/subscribeHome`: sends the vault address list once; no updates after.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

use crate::db::projection;

use super::subscribers::HomeSubscriber;
use super::{send_with_deadline, slow_close_frame, AppState};

pub async fn subscribe_home(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(|socket| handle(socket, state))
}

async fn handle(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();

    let addresses = match projection::get_vault_addresses(&state.pool).await {
        Ok(addresses) => addresses,
        Err(err) => {
            debug!("home initial payload failed: {err}");
            return;
        }
    };
    let initial = json!({ "vaultAddresses": addresses }).to_string();
    if send_with_deadline(&mut sink, initial).await.is_err() {
        return;
    }

    let (subscriber, mut rx) = HomeSubscriber::new();
    state.subscribers.add_home(Arc::clone(&subscriber));

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
                // The home surface takes no client messages; a close or
                // error ends the subscription.
                match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
        }
    }

    state.subscribers.remove_home(&subscriber);
}
