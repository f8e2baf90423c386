//! Connection handlers for the Relay server.
//!
//! This module owns the HTTP surface (WebSocket upgrade, health, CORS) and
//! the per-connection task that feeds decoded commands into the gateway and
//! drains the connection's outbound queue back into the socket.

use crate::config::{Config, CorsConfig};
use crate::metrics::{self, ConnectionMetricsGuard};
use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use bytes::BytesMut;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use relay_core::{Command, Gateway};
use relay_protocol::{codec, Address, Frame, ProtocolError, WireFormat};
use relay_transport::{ConnectionId, Hub, RoomAdapter};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::Instant;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// Room registry and outbound queues.
    pub hub: Arc<Hub>,
    /// Command routing over the hub.
    pub gateway: Gateway,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create new app state.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let hub = Arc::new(Hub::new());
        let gateway = Gateway::new(hub.clone());

        Self {
            hub,
            gateway,
            config,
        }
    }
}

/// Build the HTTP router: WebSocket endpoint, health check and CORS.
///
/// # Errors
///
/// Returns an error if the CORS settings contain invalid origins or headers.
pub fn build_router(state: Arc<AppState>) -> Result<Router> {
    let mut app = Router::new()
        .route(&state.config.transport.websocket_path, get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state.clone());

    if state.config.cors.enabled {
        app = app.layer(cors_layer(&state.config.cors)?);
    }

    Ok(app)
}

/// Build the CORS layer.
///
/// An allowed origin of `*` mirrors the request's `Origin` header back, which
/// keeps credentialed requests working.
///
/// # Errors
///
/// Returns an error if an origin or header name is not a valid header token.
pub fn cors_layer(cors: &CorsConfig) -> Result<CorsLayer> {
    let origin = if cors.allow_origin.trim() == "*" {
        AllowOrigin::mirror_request()
    } else {
        let origins = cors
            .allow_origin
            .split(',')
            .map(|o| HeaderValue::from_str(o.trim()))
            .collect::<Result<Vec<_>, _>>()
            .context("Invalid CORS origin")?;
        AllowOrigin::list(origins)
    };

    let headers = cors
        .allow_headers
        .iter()
        .map(|h| HeaderName::from_bytes(h.trim().as_bytes()))
        .collect::<Result<Vec<_>, _>>()
        .context("Invalid CORS header name")?;

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(cors.allow_credentials)
        .allow_headers(headers)
        .allow_methods([Method::GET, Method::OPTIONS]))
}

/// Run the HTTP/WebSocket server until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let addr = config.bind_addr()?;
    let state = Arc::new(AppState::new(config));
    let app = build_router(state.clone())?;

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Relay server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, state.config.transport.websocket_path
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "connections": state.hub.connection_count(),
        "channels": state.hub.room_count(),
    }))
}

/// Query parameters accepted on the WebSocket endpoint.
#[derive(Debug, Default, Deserialize)]
struct ConnectParams {
    /// `json` for a JSON text handshake; MessagePack binary otherwise. Later
    /// frames follow whatever the client sends.
    format: Option<String>,
}

impl ConnectParams {
    fn wire_format(&self) -> WireFormat {
        match self.format.as_deref() {
            Some("json") | Some("text") => WireFormat::Text,
            _ => WireFormat::Binary,
        }
    }
}

/// WebSocket upgrade handler.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<Arc<AppState>>,
) -> Response {
    if state.hub.connection_count() >= state.config.limits.max_connections {
        warn!(
            limit = state.config.limits.max_connections,
            "Connection limit reached"
        );
        metrics::record_error("connection_limit");
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    let format = params.wire_format();
    ws.max_message_size(state.config.limits.max_message_size)
        .on_upgrade(move |socket| handle_websocket(socket, state, format))
        .into_response()
}

/// A connection's registration with the hub.
///
/// Dropping it runs the disconnect hook and unregisters the connection, so
/// every way out of [`handle_websocket`] goes through the same teardown.
struct Session {
    state: Arc<AppState>,
    connection_id: ConnectionId,
    reason: &'static str,
}

impl Session {
    fn open(state: Arc<AppState>, connection_id: ConnectionId) -> Self {
        if let Err(e) = state.gateway.connect(&connection_id) {
            warn!(connection = %connection_id, error = %e, "Connect hook failed");
        }
        Self {
            state,
            connection_id,
            reason: "server shutdown",
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(e) = self
            .state
            .gateway
            .disconnect(&self.connection_id, self.reason)
        {
            warn!(connection = %self.connection_id, error = %e, "Disconnect cleanup failed");
        }
        self.state.hub.unregister(&self.connection_id);
        metrics::set_active_channels(self.state.hub.room_count());

        debug!(connection = %self.connection_id, reason = self.reason, "WebSocket disconnected");
    }
}

/// Handle a WebSocket connection.
///
/// The handshake uses the format requested at upgrade. After that, acks and
/// events go out in the format of the client's most recent message.
async fn handle_websocket(socket: WebSocket, state: Arc<AppState>, mut format: WireFormat) {
    let _metrics_guard = ConnectionMetricsGuard::new();

    let connection_id = ConnectionId::generate();
    let mut outbound = state.hub.register(&connection_id);
    let mut session = Session::open(state.clone(), connection_id.clone());

    debug!(connection = %connection_id, format = ?format, "WebSocket connected");

    let (mut sender, mut receiver) = socket.split();

    let connected = Frame::connected(
        connection_id.as_str(),
        state.config.heartbeat.interval_ms as u32,
    );
    if let Err(e) = send_frame(&mut sender, format, &connected).await {
        error!(connection = %connection_id, error = %e, "Failed to send Connected frame");
        session.reason = "transport error";
        return;
    }

    let idle_timeout = Duration::from_millis(state.config.heartbeat.timeout_ms);
    let mut deadline = Instant::now() + idle_timeout;

    // Read buffer for partial binary frames
    let mut read_buffer = BytesMut::with_capacity(4096);

    'session: loop {
        tokio::select! {
            biased;

            // Events queued for this connection by the hub
            Some(delivery) = outbound.recv() => {
                let frame = Frame::emit(delivery.address.as_ref(), delivery.payload.as_ref().clone());
                if let Err(e) = send_frame(&mut sender, format, &frame).await {
                    debug!(connection = %connection_id, error = %e, "Outbound send failed");
                    session.reason = "transport error";
                    break;
                }
            }

            msg = receiver.next() => {
                deadline = Instant::now() + idle_timeout;

                let replies = match msg {
                    Some(Ok(Message::Binary(data))) => {
                        format = WireFormat::Binary;
                        metrics::record_message(data.len(), "inbound");
                        read_buffer.extend_from_slice(&data);
                        drain_binary(&mut read_buffer, &connection_id, &state)
                    }
                    Some(Ok(Message::Text(text))) => {
                        format = WireFormat::Text;
                        metrics::record_message(text.len(), "inbound");
                        match codec::decode_text(&text) {
                            Ok(frame) => handle_frame(frame, &connection_id, &state).into_iter().collect(),
                            Err(e) => {
                                reject_frame(&connection_id, &state, &e);
                                Vec::new()
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            session.reason = "transport error";
                            break;
                        }
                        Vec::new()
                    }
                    Some(Ok(Message::Pong(_))) => Vec::new(),
                    Some(Ok(Message::Close(_))) => {
                        debug!(connection = %connection_id, "Received close frame");
                        session.reason = "client disconnect";
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(connection = %connection_id, error = %e, "WebSocket error");
                        metrics::record_error("websocket");
                        session.reason = "transport error";
                        break;
                    }
                    None => {
                        debug!(connection = %connection_id, "WebSocket stream ended");
                        session.reason = "transport close";
                        break;
                    }
                };

                for reply in &replies {
                    if send_frame(&mut sender, format, reply).await.is_err() {
                        session.reason = "transport error";
                        break 'session;
                    }
                }
            }

            _ = tokio::time::sleep_until(deadline) => {
                debug!(connection = %connection_id, "Idle timeout");
                session.reason = "ping timeout";
                break;
            }
        }
    }
}

/// Decode every complete binary frame in the buffer and handle it.
fn drain_binary(
    read_buffer: &mut BytesMut,
    connection_id: &ConnectionId,
    state: &AppState,
) -> Vec<Frame> {
    let mut replies = Vec::new();
    loop {
        match codec::decode_from(read_buffer) {
            Ok(Some(frame)) => replies.extend(handle_frame(frame, connection_id, state)),
            Ok(None) => break,
            Err(e) => {
                reject_frame(connection_id, state, &e);
                read_buffer.clear();
                break;
            }
        }
    }
    replies
}

/// Handle a decoded frame, returning the frame to send back, if any.
fn handle_frame(frame: Frame, connection_id: &ConnectionId, state: &AppState) -> Option<Frame> {
    match frame {
        Frame::Emit { id, event, data } => {
            let start = std::time::Instant::now();
            let reply = state.gateway.handle(connection_id, &event, data);

            let command = Command::from_event(&event).map_or("unknown", |c| c.as_str());
            metrics::record_command(command, &reply, start.elapsed().as_secs_f64());
            metrics::set_active_channels(state.hub.room_count());

            id.map(|id| Frame::ack(id, reply.as_str()))
        }

        Frame::Ping { timestamp } => Some(Frame::pong(timestamp)),

        Frame::Pong { .. } => None,

        other => {
            warn!(
                connection = %connection_id,
                frame_type = ?other.frame_type(),
                "Unexpected frame type"
            );
            None
        }
    }
}

/// Report an undecodable frame to its sender.
fn reject_frame(connection_id: &ConnectionId, state: &AppState, err: &ProtocolError) {
    warn!(connection = %connection_id, error = %err, "Frame decoding failed");
    metrics::record_error("decode");

    if let Err(e) = state.hub.emit(
        connection_id,
        &Address::error(),
        Value::String(err.to_string()),
    ) {
        debug!(connection = %connection_id, error = %e, "Could not emit error event");
    }
}

/// Send a frame to the WebSocket in the connection's wire format.
async fn send_frame(
    sender: &mut SplitSink<WebSocket, Message>,
    format: WireFormat,
    frame: &Frame,
) -> Result<()> {
    let message = match format {
        WireFormat::Binary => Message::Binary(codec::encode(frame)?.to_vec()),
        WireFormat::Text => Message::Text(codec::encode_text(frame)?),
    };
    let len = match &message {
        Message::Binary(data) => data.len(),
        Message::Text(text) => text.len(),
        _ => 0,
    };

    metrics::record_message(len, "outbound");
    sender.send(message).await?;
    Ok(())
}
