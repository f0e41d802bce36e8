//! Session gateway: connection lifecycle and frame processing.
//!
//! Each WebSocket client gets one task running a select loop over its
//! inbound stream, its connection's outbound queue, and an idle deadline.
//! Registry and broadcaster are shared across all client tasks.

use crate::config::Config;
use crate::directory::{RegisterOutcome, UserDirectory};
use crate::metrics::{self, ConnectionMetricsGuard};
use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use palaver_core::{
    Broadcaster, ChatMessage, CloseReason, Connection, ConnectionId, Registry, RegistryConfig,
    RegistryError, MAX_NAME_LENGTH,
};
use palaver_protocol::{codec, codes, Frame, PROTOCOL_VERSION};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// The connection registry.
    pub registry: Arc<Registry>,
    /// The message broadcaster.
    pub broadcaster: Broadcaster,
    /// The username directory.
    pub directory: Arc<dyn UserDirectory>,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create new app state.
    #[must_use]
    pub fn new(config: Config, directory: Arc<dyn UserDirectory>) -> Self {
        let registry = Arc::new(Registry::with_config(RegistryConfig {
            max_connections: config.limits.max_connections,
            outbound_queue_depth: config.limits.outbound_queue_depth,
        }));

        Self {
            broadcaster: Broadcaster::new(Arc::clone(&registry)),
            registry,
            directory,
            config,
        }
    }
}

/// Build the HTTP router.
#[must_use]
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/register", post(register_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    let directory = crate::directory::open_directory(&config.store.url)?;
    let state = Arc::new(AppState::new(config.clone(), directory));

    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let app = app(state);

    let addr = config.bind_addr();
    let listener = TcpListener::bind(addr).await?;

    info!("Palaver server listening on {}", addr);
    info!("WebSocket endpoint: ws://{}/ws", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stats = state.registry.stats();
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "connections": stats.active,
    }))
}

/// Registration request body.
#[derive(Debug, Deserialize)]
struct RegisterRequest {
    #[serde(default)]
    username: String,
}

/// Username registration handler.
async fn register_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> (StatusCode, &'static str) {
    let username = req.username.trim();

    if username.is_empty() {
        warn!("Registration attempted with empty username");
        metrics::record_registration("invalid");
        return (StatusCode::BAD_REQUEST, "Username is required");
    }
    if username.len() > MAX_NAME_LENGTH {
        metrics::record_registration("invalid");
        return (StatusCode::BAD_REQUEST, "Username too long");
    }

    match state.directory.register(username).await {
        Ok(RegisterOutcome::Registered) => {
            info!(username, "New user registered");
            metrics::record_registration("registered");
            (StatusCode::OK, "User registered successfully")
        }
        Ok(RegisterOutcome::AlreadyExists) => {
            info!(username, "Registration attempted with existing username");
            metrics::record_registration("duplicate");
            (StatusCode::BAD_REQUEST, "Username already exists")
        }
        Err(e) => {
            error!(error = %e, "Error during registration");
            metrics::record_registration("error");
            (StatusCode::INTERNAL_SERVER_ERROR, "Registration failed")
        }
    }
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle a WebSocket connection from accept to close.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let _metrics_guard = ConnectionMetricsGuard::new();

    let id = ConnectionId::next();
    let (mut sender, mut receiver) = socket.split();

    let conn = match state.registry.join(id) {
        Ok(conn) => conn,
        Err(e @ RegistryError::AtCapacity(_)) => {
            warn!(connection = %id, error = %e, "Rejecting connection");
            let _ = send_frame(&mut sender, &Frame::error(codes::AT_CAPACITY, e.to_string())).await;
            let _ = sender.close().await;
            return;
        }
        Err(e) => {
            error!(connection = %id, error = %e, "Failed to register connection");
            return;
        }
    };

    debug!(connection = %id, "WebSocket connected");

    let welcome = Frame::welcome(
        id.to_string(),
        PROTOCOL_VERSION,
        state.config.heartbeat.interval_ms,
    );
    if send_frame(&mut sender, &welcome).await.is_err() {
        error!(connection = %id, "Failed to send welcome frame");
        state.registry.leave(id, CloseReason::TransportError);
        return;
    }

    if let Err(e) = state.registry.activate(id) {
        error!(connection = %id, error = %e, "Failed to activate connection");
        state.registry.leave(id, CloseReason::TransportError);
        return;
    }

    let reason = connection_loop(&state, &conn, &mut sender, &mut receiver).await;
    state.registry.leave(id, reason);

    debug!(connection = %id, reason = %reason, "WebSocket disconnected");
}

/// Frame dispatch outcome.
enum Dispatch {
    Continue,
    Disconnect,
}

/// Per-client select loop: outbound drain, inbound frames, idle deadline.
async fn connection_loop(
    state: &Arc<AppState>,
    conn: &Arc<Connection>,
    sender: &mut SplitSink<WebSocket, Message>,
    receiver: &mut SplitStream<WebSocket>,
) -> CloseReason {
    let idle = Duration::from_millis(state.config.heartbeat.timeout_ms);
    let deadline = sleep(idle);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            biased;

            // Deliver queued broadcasts to this client
            () = conn.wait_outbound() => {
                for msg in conn.drain_pending() {
                    let frame = Frame::chat(msg.sender_name.clone(), msg.body.clone());
                    if send_frame(sender, &frame).await.is_err() {
                        return CloseReason::TransportError;
                    }
                }
                if !conn.is_active() {
                    // Closed out from under us (e.g. server shutdown)
                    return CloseReason::Shutdown;
                }
            }

            // Receive from WebSocket
            inbound = receiver.next() => {
                deadline.as_mut().reset(Instant::now() + idle);
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        if text.len() > state.config.limits.max_message_size {
                            warn!(connection = %conn.id(), size = text.len(), "Inbound frame too large");
                            metrics::record_error("oversized_frame");
                            let frame = Frame::error(codes::INVALID_FRAME, "frame too large");
                            if send_frame(sender, &frame).await.is_err() {
                                return CloseReason::TransportError;
                            }
                            continue;
                        }

                        match codec::decode(&text) {
                            Ok(frame) => {
                                metrics::record_message(text.len(), "inbound");
                                match dispatch_frame(state, conn, sender, frame).await {
                                    Ok(Dispatch::Continue) => {}
                                    Ok(Dispatch::Disconnect) => return CloseReason::ClientDisconnect,
                                    Err(e) => {
                                        warn!(connection = %conn.id(), error = %e, "Failed to answer client");
                                        return CloseReason::TransportError;
                                    }
                                }
                            }
                            Err(e) => {
                                warn!(connection = %conn.id(), error = %e, "Undecodable frame");
                                metrics::record_error("protocol");
                                let frame = Frame::error(codes::INVALID_FRAME, e.to_string());
                                if send_frame(sender, &frame).await.is_err() {
                                    return CloseReason::TransportError;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Binary(_))) => {
                        warn!(connection = %conn.id(), "Ignoring binary frame on text protocol");
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            return CloseReason::TransportError;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        // Ignore pongs
                    }
                    Some(Ok(Message::Close(_))) => {
                        debug!(connection = %conn.id(), "Received close frame");
                        return CloseReason::ClientDisconnect;
                    }
                    Some(Err(e)) => {
                        warn!(connection = %conn.id(), error = %e, "WebSocket error");
                        metrics::record_error("websocket");
                        return CloseReason::TransportError;
                    }
                    None => {
                        debug!(connection = %conn.id(), "WebSocket stream ended");
                        return CloseReason::ClientDisconnect;
                    }
                }
            }

            // No inbound traffic within the idle window
            () = &mut deadline => {
                info!(connection = %conn.id(), "Idle timeout");
                return CloseReason::IdleTimeout;
            }
        }
    }
}

/// Handle a decoded frame.
async fn dispatch_frame(
    state: &Arc<AppState>,
    conn: &Arc<Connection>,
    sender: &mut SplitSink<WebSocket, Message>,
    frame: Frame,
) -> Result<Dispatch> {
    match frame {
        Frame::Join { display_name } => {
            let name = display_name.trim();
            if name.is_empty() || name.len() > MAX_NAME_LENGTH {
                warn!(connection = %conn.id(), "Rejected join with invalid display name");
                let frame = Frame::error(codes::INVALID_NAME, "Display name must be 1-80 characters");
                send_frame(sender, &frame).await?;
            } else if conn.set_display_name(name).is_err() {
                let frame = Frame::error(codes::ALREADY_JOINED, "Display name already set");
                send_frame(sender, &frame).await?;
            } else {
                info!(connection = %conn.id(), display_name = name, "Client joined");
                send_frame(sender, &Frame::joined(name)).await?;
            }
        }

        Frame::Chat { sender_name, body } => {
            let message = ChatMessage::new(sender_name, body);
            match state.broadcaster.broadcast(message) {
                Ok(report) => {
                    metrics::record_broadcast(&report);
                    debug!(
                        connection = %conn.id(),
                        delivered = report.delivered,
                        skipped = report.skipped,
                        "Chat broadcast"
                    );
                }
                Err(e) => {
                    // Dropped, not surfaced to the sender
                    warn!(connection = %conn.id(), error = %e, "Dropping invalid chat message");
                    metrics::record_error("invalid_message");
                }
            }
        }

        Frame::Ping { timestamp } => {
            send_frame(sender, &Frame::pong(timestamp)).await?;
        }

        Frame::Leave => {
            debug!(connection = %conn.id(), "Client requested disconnect");
            return Ok(Dispatch::Disconnect);
        }

        other => {
            warn!(connection = %conn.id(), frame = other.name(), "Unexpected frame from client");
        }
    }

    Ok(Dispatch::Continue)
}

/// Encode and send a frame to the WebSocket.
async fn send_frame(sender: &mut SplitSink<WebSocket, Message>, frame: &Frame) -> Result<()> {
    let text = codec::encode(frame)?;
    metrics::record_message(text.len(), "outbound");
    sender.send(Message::Text(text)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::open_directory;

    fn test_state() -> Arc<AppState> {
        let directory = open_directory("memory://").unwrap();
        Arc::new(AppState::new(Config::default(), directory))
    }

    #[tokio::test]
    async fn test_register_endpoint_statuses() {
        let state = test_state();

        let (status, body) = register_handler(
            State(Arc::clone(&state)),
            Json(RegisterRequest {
                username: "alice".into(),
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "User registered successfully");

        let (status, body) = register_handler(
            State(Arc::clone(&state)),
            Json(RegisterRequest {
                username: "alice".into(),
            }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "Username already exists");

        let (status, body) = register_handler(
            State(Arc::clone(&state)),
            Json(RegisterRequest {
                username: "  ".into(),
            }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "Username is required");

        let (status, _) = register_handler(
            State(state),
            Json(RegisterRequest {
                username: "x".repeat(MAX_NAME_LENGTH + 1),
            }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
