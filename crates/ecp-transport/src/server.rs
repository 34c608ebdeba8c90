//! WebSocket transport server using Axum.
//!
//! Handles HTTP upgrade to WebSocket, the authentication handshake,
//! heartbeat-driven staleness detection, notification fan-out, and the
//! optional static-asset route.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    Router,
    extract::{
        Query, State, WebSocketUpgrade,
        ws::{CloseFrame, Message, WebSocket},
    },
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Json},
    routing::get,
};
use ecp_protocol::{
    ECPError, ECPErrorCode, ECPNotification, ECPResponse,
    auth::{AuthConfig, AuthRequiredParams, HandshakeClientInfo, HandshakeParams, HandshakeResult, constant_time_eq},
    context::RequestContext,
    jsonrpc::RequestId,
    methods::Methods,
    notifications::Notifications,
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use rand::Rng;
use serde_json::json;
use tokio::sync::{broadcast, mpsc};
use tower_http::cors::CorsLayer;
use tracing::{debug, error, info, warn};

use crate::connection::{ConnectionHandle, ConnectionTable, OutboundMessage};
use crate::heartbeat;
use crate::origin::is_origin_allowed;

/// Trait implemented by the ECP server to handle incoming requests.
/// The transport layer calls this for every authenticated JSON-RPC request,
/// passing along the connection-scoped identifiers (client id, session id,
/// handshake client descriptor) the server needs to build a middleware
/// context — never anything taken from the request's own `params`.
pub trait RequestHandler: Send + Sync + 'static {
    fn handle_request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
        ctx: RequestContext,
    ) -> impl std::future::Future<Output = ecp_protocol::HandlerResult> + Send;
}

/// Transport server configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Port to listen on (0 for OS-assigned)
    pub port: u16,
    /// Hostname to bind to
    pub hostname: String,
    /// Authentication configuration. Always present — ECP has no
    /// unauthenticated mode.
    pub auth: AuthConfig,
    /// Origins allowed to open a connection besides loopback / the bound
    /// host. `"*"` disables the Origin check entirely.
    pub allow_origins: Vec<String>,
    /// Enable permissive CORS on the HTTP surface.
    pub enable_cors: bool,
    /// Maximum concurrent connections.
    pub max_connections: Option<usize>,
    /// Workspace root (sent in welcome message).
    pub workspace_root: Option<String>,
    /// Directory to serve static assets from, if any. `None` disables the
    /// static route entirely (404 on every path).
    pub static_dir: Option<PathBuf>,
    /// Server version string reported in handshake and welcome payloads.
    pub server_version: String,
    /// Enable verbose connection logging.
    pub verbose_logging: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            port: 7070,
            hostname: "127.0.0.1".into(),
            auth: AuthConfig::default(),
            allow_origins: Vec::new(),
            enable_cors: false,
            max_connections: Some(32),
            workspace_root: None,
            static_dir: None,
            server_version: env!("CARGO_PKG_VERSION").to_string(),
            verbose_logging: false,
        }
    }
}

/// Shared state for the transport server.
struct AppState<H: RequestHandler> {
    handler: Arc<H>,
    config: TransportConfig,
    notification_tx: broadcast::Sender<String>,
    table: Arc<ConnectionTable>,
    started_at: Instant,
}

/// The transport server — manages WebSocket connections and routes messages.
pub struct TransportServer {
    notification_tx: broadcast::Sender<String>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
    heartbeat_handle: Option<tokio::task::JoinHandle<()>>,
    port: u16,
}

impl TransportServer {
    /// Start the transport server with the given request handler.
    pub async fn start<H: RequestHandler>(
        config: TransportConfig,
        handler: H,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let (notification_tx, _) = broadcast::channel(1024);
        Self::start_with_sender(config, Arc::new(handler), notification_tx).await
    }

    /// Start the transport server with a pre-existing broadcast channel, so
    /// callers can hold onto a sender for out-of-band notifications (e.g.
    /// file-watch events) before the server accepts its first connection.
    pub async fn start_with_sender<H: RequestHandler>(
        config: TransportConfig,
        handler: Arc<H>,
        notification_tx: broadcast::Sender<String>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);

        let table = Arc::new(ConnectionTable::new());
        let heartbeat_handle = heartbeat::spawn(table.clone(), config.auth.heartbeat_interval_ms);

        let state = Arc::new(AppState {
            handler,
            config: config.clone(),
            notification_tx: notification_tx.clone(),
            table,
            started_at: Instant::now(),
        });

        let mut app = Router::new()
            .route("/ws", get(ws_upgrade_handler::<H>))
            .route("/health", get(health_handler::<H>))
            .fallback(static_handler::<H>);
        if config.enable_cors {
            app = app.layer(CorsLayer::permissive());
        }
        let app = app.with_state(state);

        let addr: SocketAddr = format!("{}:{}", config.hostname, config.port).parse()?;
        let listener = tokio::net::TcpListener::bind(addr).await?;
        let actual_port = listener.local_addr()?.port();

        info!("ECP transport listening on ws://{}:{}/ws", config.hostname, actual_port);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.recv().await;
                })
                .await
                .ok();
        });

        Ok(Self {
            notification_tx,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
            heartbeat_handle,
            port: actual_port,
        })
    }

    /// Broadcast a notification to all connected, authenticated clients.
    pub fn broadcast(&self, notification: ECPNotification) {
        if let Ok(json) = serde_json::to_string(&notification) {
            let _ = self.notification_tx.send(json);
        }
    }

    pub fn notification_sender(&self) -> broadcast::Sender<String> {
        self.notification_tx.clone()
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Gracefully stop the server: stop accepting new connections and
    /// drop the heartbeat task. Existing connections are not force-closed
    /// here — that is the caller's job (see `ecpd`'s shutdown sequence,
    /// which closes each one with code 1000 before calling this).
    pub async fn stop(&mut self) {
        if let Some(handle) = self.heartbeat_handle.take() {
            handle.abort();
        }
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        info!("ECP transport server stopped");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP handlers
// ─────────────────────────────────────────────────────────────────────────────

#[derive(serde::Deserialize)]
struct LegacyAuthQuery {
    token: Option<String>,
}

async fn ws_upgrade_handler<H: RequestHandler>(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState<H>>>,
    headers: HeaderMap,
    Query(query): Query<LegacyAuthQuery>,
) -> impl IntoResponse {
    let origin = headers.get(header::ORIGIN).and_then(|v| v.to_str().ok());
    if !is_origin_allowed(origin, &state.config.allow_origins, &state.config.hostname) {
        warn!(?origin, "rejecting upgrade: origin not allowed");
        return StatusCode::FORBIDDEN.into_response();
    }

    if let Some(max) = state.config.max_connections {
        if state.table.count() >= max {
            warn!("connection rejected: max connections reached ({max})");
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
    }

    ws.on_upgrade(move |socket| handle_ws_connection(socket, state, query.token))
        .into_response()
}

async fn health_handler<H: RequestHandler>(State(state): State<Arc<AppState<H>>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "clients": state.table.count(),
        "uptime_seconds": state.started_at.elapsed().as_secs(),
    }))
}

/// Minimal, path-traversal-protected static file handler, gated behind
/// `--static-dir`. Not a general-purpose asset server — no directory
/// listings, no range requests, just enough to hand an editor extension's
/// bundled webview assets back over plain HTTP.
async fn static_handler<H: RequestHandler>(
    State(state): State<Arc<AppState<H>>>,
    uri: axum::http::Uri,
) -> impl IntoResponse {
    let Some(dir) = &state.config.static_dir else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let requested = uri.path().trim_start_matches('/');
    let requested = if requested.is_empty() { "index.html" } else { requested };

    if requested.split('/').any(|segment| segment == "..") {
        return StatusCode::FORBIDDEN.into_response();
    }

    let root = match dir.canonicalize() {
        Ok(r) => r,
        Err(_) => return StatusCode::NOT_FOUND.into_response(),
    };
    let resolved = match dir.join(requested).canonicalize() {
        Ok(r) => r,
        Err(_) => return StatusCode::NOT_FOUND.into_response(),
    };
    if !resolved.starts_with(&root) {
        return StatusCode::FORBIDDEN.into_response();
    }

    match tokio::fs::read(&resolved).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, content_type_for(&resolved))], bytes).into_response(),
        Err(_) => StatusCode::NOT_FOUND.into_response(),
    }
}

fn content_type_for(path: &std::path::Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html") => "text/html; charset=utf-8",
        Some("js") => "text/javascript; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("json") => "application/json",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("ico") => "image/x-icon",
        Some("wasm") => "application/wasm",
        _ => "application/octet-stream",
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// WebSocket connection handling
// ─────────────────────────────────────────────────────────────────────────────

/// Own the socket's write half and serialize every outbound frame through
/// it. This is the only task allowed to touch `ws_tx`; everything else
/// reaches it by pushing onto `outbox`.
async fn run_writer(mut ws_tx: SplitSink<WebSocket, Message>, mut outbox: mpsc::UnboundedReceiver<OutboundMessage>) {
    while let Some(message) = outbox.recv().await {
        let result = match message {
            OutboundMessage::Text(text) => ws_tx.send(Message::Text(text.into())).await,
            OutboundMessage::Ping => ws_tx.send(Message::Ping(Vec::new().into())).await,
            OutboundMessage::Pong(data) => ws_tx.send(Message::Pong(data.into())).await,
            OutboundMessage::Close { code, reason } => {
                let frame = CloseFrame { code, reason: reason.into() };
                let _ = ws_tx.send(Message::Close(Some(frame))).await;
                break;
            }
        };
        if result.is_err() {
            break;
        }
    }
    let _ = ws_tx.close().await;
}

async fn handle_ws_connection<H: RequestHandler>(socket: WebSocket, state: Arc<AppState<H>>, legacy_token: Option<String>) {
    let (ws_tx, mut ws_rx) = socket.split();
    let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();

    let id = state.table.next_id();
    let client_id = uuid::Uuid::new_v4().to_string();

    let legacy_authed = match legacy_token {
        Some(token) if state.config.auth.allow_legacy_auth && constant_time_eq(&token, &state.config.auth.token) => true,
        Some(_) => {
            warn!(connection_id = id, "legacy ?token= auth rejected");
            false
        }
        None => false,
    };

    let conn = if legacy_authed {
        warn!(connection_id = id, "client authenticated via deprecated ?token= query parameter; prefer auth/handshake");
        Arc::new(ConnectionHandle::new_authenticated(id, outbox_tx.clone(), generate_session_id()))
    } else {
        Arc::new(ConnectionHandle::new(id, outbox_tx.clone()))
    };
    state.table.insert(conn.clone());
    info!(connection_id = id, "client connected");

    tokio::spawn(run_writer(ws_tx, outbox_rx));

    if legacy_authed {
        send_welcome(&conn, &state.config, &client_id);
    } else {
        send_auth_required(&conn, &state.config);
    }

    let mut notification_rx = state.notification_tx.subscribe();
    let handshake_deadline = (!legacy_authed)
        .then(|| tokio::time::Instant::now() + Duration::from_millis(state.config.auth.handshake_timeout_ms));

    loop {
        let authenticated = conn.is_authenticated();
        let handshake_sleep = async {
            match handshake_deadline {
                Some(deadline) if !authenticated => tokio::time::sleep_until(deadline).await,
                _ => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        conn.touch();
                        if conn.is_authenticated() {
                            let req_ctx = RequestContext {
                                client_id: client_id.clone(),
                                session_id: conn.session_id(),
                                client_info: conn.client_info(),
                            };
                            if let Some(response) = handle_message(&text, &state.handler, req_ctx).await {
                                conn.send_text(response);
                            }
                        } else {
                            handle_handshake_message(&text, &conn, &state.config, &client_id);
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        conn.touch();
                        conn.send_pong(data.to_vec());
                    }
                    Some(Ok(Message::Pong(_))) => {
                        conn.touch();
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(connection_id = id, "client disconnected");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(connection_id = id, error = %e, "websocket error");
                        break;
                    }
                    _ => {}
                }
            }

            notification = notification_rx.recv() => {
                if conn.is_authenticated() {
                    if let Ok(msg) = notification {
                        conn.send_text(msg);
                    }
                }
            }

            _ = handshake_sleep => {
                warn!(connection_id = id, "handshake timeout");
                conn.reject();
                let err = ECPResponse::error(None, ECPError::handshake_timeout());
                conn.send_text(serde_json::to_string(&err).unwrap());
                conn.force_close(4000, "Handshake timeout");
                break;
            }

            _ = conn.close_notify.notified() => {
                break;
            }
        }
    }

    state.table.remove(id);
    info!(connection_id = id, remaining = state.table.count(), "connection closed");
}

// ─────────────────────────────────────────────────────────────────────────────
// Handshake and dispatch helpers
// ─────────────────────────────────────────────────────────────────────────────

fn send_auth_required(conn: &ConnectionHandle, config: &TransportConfig) {
    let notification = ECPNotification::new(
        Notifications::AUTH_REQUIRED,
        Some(
            serde_json::to_value(AuthRequiredParams {
                server_version: config.server_version.clone(),
                timeout: config.auth.handshake_timeout_ms,
            })
            .unwrap(),
        ),
    );
    conn.send_text(serde_json::to_string(&notification).unwrap());
}

fn send_welcome(conn: &ConnectionHandle, config: &TransportConfig, client_id: &str) {
    let welcome = ECPNotification::new(
        Notifications::SERVER_CONNECTED,
        Some(json!({
            "clientId": client_id,
            "sessionId": conn.session_id(),
            "serverVersion": config.server_version,
            "workspaceRoot": config.workspace_root,
        })),
    );
    conn.send_text(serde_json::to_string(&welcome).unwrap());
}

enum HandshakeOutcome {
    Authenticated {
        response: String,
        session_id: String,
        client_info: Option<HandshakeClientInfo>,
    },
    Rejected(String),
    NotHandshake(String),
}

fn parse_handshake(text: &str, config: &TransportConfig, client_id: &str) -> HandshakeOutcome {
    let parsed: serde_json::Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(_) => {
            let err = ECPResponse::error(None, ECPError::parse_error("Invalid JSON"));
            return HandshakeOutcome::NotHandshake(serde_json::to_string(&err).unwrap());
        }
    };

    let method = parsed.get("method").and_then(|m| m.as_str());
    let id: Option<RequestId> = parsed.get("id").cloned().and_then(|v| serde_json::from_value(v).ok());

    if method != Some(Methods::AUTH_HANDSHAKE) {
        let err = ECPResponse::error(
            id,
            ECPError::new(ECPErrorCode::NotAuthenticated, "Not authenticated. Send auth/handshake first."),
        );
        return HandshakeOutcome::NotHandshake(serde_json::to_string(&err).unwrap());
    }

    let params: Option<HandshakeParams> = parsed.get("params").cloned().and_then(|v| serde_json::from_value(v).ok());

    match params {
        Some(p) if constant_time_eq(&p.token, &config.auth.token) => {
            let session_id = generate_session_id();
            let result = HandshakeResult {
                client_id: client_id.to_string(),
                session_id: session_id.clone(),
                server_version: config.server_version.clone(),
                workspace_root: config.workspace_root.clone(),
            };
            let resp = ECPResponse::success(id.unwrap_or(RequestId::Number(0)), serde_json::to_value(result).unwrap());
            HandshakeOutcome::Authenticated {
                response: serde_json::to_string(&resp).unwrap(),
                session_id,
                client_info: p.client,
            }
        }
        _ => {
            let err = ECPResponse::error(id, ECPError::invalid_token());
            HandshakeOutcome::Rejected(serde_json::to_string(&err).unwrap())
        }
    }
}

fn handle_handshake_message(text: &str, conn: &ConnectionHandle, config: &TransportConfig, client_id: &str) {
    match parse_handshake(text, config, client_id) {
        HandshakeOutcome::Authenticated { response, session_id, client_info } => {
            conn.authenticate(session_id, client_info);
            conn.send_text(response);
            debug!(connection_id = conn.id, "client authenticated");
        }
        HandshakeOutcome::Rejected(response) => {
            conn.reject();
            conn.send_text(response);
            conn.force_close(4001, "Handshake failed");
            warn!(connection_id = conn.id, "client auth failed");
        }
        HandshakeOutcome::NotHandshake(response) => {
            conn.send_text(response);
        }
    }
}

async fn handle_message<H: RequestHandler>(text: &str, handler: &Arc<H>, ctx: RequestContext) -> Option<String> {
    let parsed: serde_json::Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(_) => {
            let err = ECPResponse::error(None, ECPError::parse_error("Failed to parse JSON"));
            return Some(serde_json::to_string(&err).unwrap());
        }
    };

    let jsonrpc = parsed.get("jsonrpc").and_then(|v| v.as_str());
    let method = parsed.get("method").and_then(|v| v.as_str());
    let id: Option<RequestId> = parsed.get("id").cloned().and_then(|v| serde_json::from_value(v).ok());

    if jsonrpc != Some("2.0") || method.is_none() {
        let err = ECPResponse::error(id, ECPError::invalid_request("Invalid JSON-RPC 2.0 request"));
        return Some(serde_json::to_string(&err).unwrap());
    }

    let method = method.unwrap();
    let params = parsed.get("params").cloned();
    let is_notification = id.is_none();

    match handler.handle_request(method, params, ctx).await {
        Ok(result) => {
            if is_notification {
                None
            } else {
                let resp = ECPResponse::success(id.unwrap(), result);
                Some(serde_json::to_string(&resp).unwrap())
            }
        }
        Err(ecp_err) => {
            if is_notification {
                warn!(method, error = %ecp_err, "notification handler failed; no response channel to report it on");
                None
            } else {
                let resp = ECPResponse::error(id, ecp_err);
                Some(serde_json::to_string(&resp).unwrap())
            }
        }
    }
}

/// A 32-character lowercase hex session id, per the handshake result's
/// stated format.
fn generate_session_id() -> String {
    let mut bytes = [0u8; 16];
    rand::rng().fill(&mut bytes);
    hex::encode(bytes)
}
