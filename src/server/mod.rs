//! WebSocket fan-out server: three subscription surfaces backed by the
//! committed projection and driven by the database notification channels.

pub mod gas_ws;
pub mod home_ws;
pub mod messages;
pub mod notifications;
pub mod subscribers;
pub mod validations;
pub mod vault_ws;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::http::HeaderValue;
use axum::routing::get;
use axum::Router;
use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use sqlx::PgPool;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::db::Db;
use crate::errors::IndexerError;

use subscribers::{Subscribers, SLOW_CLOSE_REASON};

/// WebSocket close code 1008 (policy violation), used for slow subscribers.
const POLICY_VIOLATION: u16 = 1008;

/// Per-message write deadline; exceeding it is a slow-subscriber condition.
const WRITE_DEADLINE: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub subscribers: Arc<Subscribers>,
}

/// Bind the fan-out server and run until fatal error.
pub async fn run(config: ServerConfig) -> Result<(), IndexerError> {
    let db = Db::connect(&config.db_url).await?;
    let subscribers = Arc::new(Subscribers::default());

    let demux_pool = db.pool().clone();
    let demux_subscribers = Arc::clone(&subscribers);
    let demux_url = config.db_url.clone();
    tokio::spawn(async move {
        if let Err(err) = notifications::run(demux_url, demux_pool, demux_subscribers).await {
            error!("notification demux stopped: {err}");
        }
    });

    let mut cors = CorsLayer::new();
    if let Some(origin) = &config.frontend_url {
        let origin = origin
            .parse::<HeaderValue>()
            .map_err(|e| IndexerError::Config(format!("invalid FRONTEND_URL: {e}")))?;
        cors = cors.allow_origin(origin);
    }

    let state = AppState {
        pool: db.pool().clone(),
        subscribers,
    };
    let app = Router::new()
        .route("/subscribeHome", get(home_ws::subscribe_home))
        .route("/subscribeVault", get(vault_ws::subscribe_vault))
        .route("/subscribeGas", get(gas_ws::subscribe_gas))
        .layer(cors)
        .with_state(state);

    let listener = TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, "fan-out server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

pub(crate) fn slow_close_frame() -> CloseFrame<'static> {
    CloseFrame {
        code: POLICY_VIOLATION,
        reason: SLOW_CLOSE_REASON.into(),
    }
}

/// Write one text frame under the per-message deadline. Any failure (or a
/// blown deadline) means the subscriber is gone or too slow; callers drop
/// the connection.
pub(crate) async fn send_with_deadline(
    sink: &mut SplitSink<WebSocket, Message>,
    message: String,
) -> Result<(), ()> {
    match tokio::time::timeout(WRITE_DEADLINE, sink.send(Message::Text(message))).await {
        Ok(Ok(())) => Ok(()),
        _ => Err(()),
    }
}
