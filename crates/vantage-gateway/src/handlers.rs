//! Session handlers for the Vantage gateway.
//!
//! This module owns the HTTP surface (WebSocket upgrade plus the read-only
//! snapshot endpoints) and the per-session protocol loop.

use crate::config::Config;
use crate::metrics::{self, SessionMetricsGuard};
use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, warn};
use vantage_core::{topic, Delivery, Hub, SessionId};
use vantage_protocol::{codec, Command, ServerFrame};

/// Shared server state.
pub struct AppState {
    /// The fan-out hub.
    pub hub: Arc<Hub>,
    /// Gateway configuration.
    pub config: Config,
}

/// Run the HTTP/WebSocket server until the shutdown future resolves.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(
    config: Config,
    hub: Arc<Hub>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let addr = config.bind_addr()?;
    let ws_path = config.transport.websocket_path.clone();
    let state = Arc::new(AppState { hub, config });

    let app = Router::new()
        .route(&ws_path, get(ws_handler))
        .route("/", get(root_handler))
        .route("/actuator/health", get(health_handler))
        .route("/api/metrics", get(metrics_snapshot))
        .route("/api/anomalies", get(anomalies_snapshot))
        .route("/api/service-health", get(service_health_snapshot))
        .with_state(state);

    let listener = TcpListener::bind(addr).await?;

    tracing::info!("Vantage gateway listening on {}", addr);
    tracing::info!("WebSocket endpoint: ws://{}{}", addr, ws_path);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

/// Service banner.
async fn root_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "message": "Vantage telemetry gateway is running"
    }))
}

/// Liveness check handler.
async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "UP",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Point-in-time copy of one topic's retained history, as bare records.
fn topic_snapshot(hub: &Hub, topic: &str) -> Json<Vec<serde_json::Value>> {
    let records = hub
        .snapshot(topic)
        .iter()
        .map(|event| serde_json::to_value(event.as_ref()).unwrap_or_default())
        .collect();
    Json(records)
}

async fn metrics_snapshot(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    topic_snapshot(&state.hub, topic::METRICS)
}

async fn anomalies_snapshot(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    topic_snapshot(&state.hub, topic::ANOMALIES)
}

async fn service_health_snapshot(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    topic_snapshot(&state.hub, topic::SERVICE_HEALTH)
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_session(socket, state))
}

/// Handle one subscriber session for its whole lifetime.
///
/// The loop multiplexes the hub delivery queue with the inbound command
/// stream. Hub deliveries are drained first so a replay enqueued by a
/// subscribe command reaches the wire before the next command is read.
async fn handle_session(socket: WebSocket, state: Arc<AppState>) {
    let _metrics_guard = SessionMetricsGuard::new();

    let session_id = SessionId::generate();
    debug!(session = %session_id, "Session connected");

    let mut deliveries = state.hub.register(session_id.clone());
    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            biased;

            delivery = deliveries.recv() => {
                match delivery {
                    Some(delivery) => {
                        if send_delivery(&mut sender, &delivery).await.is_err() {
                            break;
                        }
                    }
                    // The hub dropped us after a failed delivery.
                    None => break,
                }
            }

            inbound = receiver.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        handle_command(&text, &session_id, &state);
                    }
                    Some(Ok(Message::Binary(data))) => {
                        match std::str::from_utf8(&data) {
                            Ok(text) => handle_command(text, &session_id, &state),
                            Err(_) => {
                                warn!(session = %session_id, "Ignoring non-UTF-8 command");
                                metrics::record_command_error();
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        // Ignore pongs
                    }
                    Some(Ok(Message::Close(_))) => {
                        debug!(session = %session_id, "Received close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(session = %session_id, error = %e, "WebSocket error");
                        break;
                    }
                    None => {
                        debug!(session = %session_id, "WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    state.hub.unregister(&session_id);
    debug!(session = %session_id, "Session disconnected");
}

/// Encode and send one delivery; an error means the socket is gone.
async fn send_delivery(
    sender: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    delivery: &Delivery,
) -> Result<()> {
    let frame = match delivery {
        Delivery::Connected { .. } => {
            ServerFrame::connection_success("Connected to Vantage gateway")
        }
        Delivery::Event { topic, event } => match event.to_body() {
            Ok(body) => ServerFrame::event(topic.clone(), body),
            Err(e) => {
                warn!(topic = %topic, error = %e, "Skipping unserializable event");
                return Ok(());
            }
        },
    };

    let text = codec::encode_frame(&frame)?;
    metrics::record_delivery();
    sender.send(Message::Text(text)).await?;
    Ok(())
}

/// Interpret one inbound command.
///
/// Malformed or unknown commands are logged and ignored; they never
/// disconnect the session.
fn handle_command(text: &str, session_id: &SessionId, state: &AppState) {
    match codec::decode_command(text) {
        Ok(Command::Subscribe { destination }) => {
            match state.hub.subscribe(session_id, &destination) {
                Ok(replayed) => {
                    debug!(session = %session_id, topic = %destination, replayed, "Subscribed");
                    metrics::record_subscription(&destination);
                }
                Err(e) => {
                    warn!(session = %session_id, topic = %destination, error = %e, "Subscribe rejected");
                    metrics::record_command_error();
                }
            }
        }
        Ok(Command::Unsubscribe { destination }) => {
            state.hub.unsubscribe(session_id, &destination);
            debug!(session = %session_id, topic = %destination, "Unsubscribed");
        }
        Ok(Command::Unknown) => {
            debug!(session = %session_id, "Ignoring unknown command type");
        }
        Err(e) => {
            warn!(session = %session_id, error = %e, "Ignoring malformed command");
            metrics::record_command_error();
        }
    }
}
