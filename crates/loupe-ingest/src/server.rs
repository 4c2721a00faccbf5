use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use loupe_core::ids::ConnectionId;
use loupe_core::kinds::DisconnectReason;
use loupe_core::wire::{InboundFrame, OutboundFrame};
use loupe_redact::Redactor;
use loupe_session::SessionRegistry;
use loupe_store::Store;

use crate::connection::ConnectionRegistry;
use crate::dispatch::{dispatch_frame, now_ms, IngestContext};
use crate::error::IngestError;
use crate::heartbeat::spawn_heartbeat_task;

pub struct ServerConfig {
    pub port: u16,
    pub redaction_safe_mode: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 7717, redaction_safe_mode: false }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub ctx: IngestContext,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .merge(crate::admin::admin_router())
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// Starts the ingest listener and its heartbeat sweep. Returns a handle
/// that can shut both down and wait for them to drain (spec.md §4.5).
pub async fn start(config: ServerConfig, store: Store) -> Result<ServerHandle, std::io::Error> {
    let ctx = IngestContext {
        store,
        redactor: Redactor::new(config.redaction_safe_mode),
        sessions: Arc::new(SessionRegistry::new()),
        connections: Arc::new(ConnectionRegistry::new()),
    };

    let shutdown = CancellationToken::new();
    let heartbeat = spawn_heartbeat_task(ctx.clone(), shutdown.clone());

    let router = build_router(AppState { ctx: ctx.clone() });
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;
    info!(port = local_addr.port(), "ingest listener started");

    let shutdown_for_axum = shutdown.clone();
    let server_task = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown_for_axum.cancelled().await;
            })
            .await
            .ok();
    });

    Ok(ServerHandle { port: local_addr.port(), shutdown, server: server_task, heartbeat, ctx })
}

pub struct ServerHandle {
    pub port: u16,
    shutdown: CancellationToken,
    server: tokio::task::JoinHandle<()>,
    heartbeat: tokio::task::JoinHandle<()>,
    pub ctx: IngestContext,
}

impl ServerHandle {
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub async fn drain(self) {
        let _ = self.server.await;
        let _ = self.heartbeat.await;
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn health_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({ "status": "healthy" }))
}

/// Owns one socket end to end: registers the connection, pumps inbound
/// frames through `dispatch_frame`, forwards outbound frames (replies and
/// `capture_command`s queued by `send_capture`) back over the wire, and
/// unwinds the session binding on disconnect (spec.md §4.5).
async fn handle_socket(socket: WebSocket, state: AppState) {
    let ctx = state.ctx;
    let now = now_ms();
    let (connection_id, mut outbound_rx) = ctx.connections.register(now);
    info!(connection = %connection_id, "connection opened");

    let (mut write, mut read) = socket.split();
    let (closed_tx, mut closed_rx) = mpsc::channel::<()>(1);

    let forward_ctx = connection_id.clone();
    let forward_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = closed_rx.recv() => break,
                frame = outbound_rx.recv() => {
                    let Some(frame) = frame else { break };
                    let Ok(text) = serde_json::to_string(&frame) else { continue };
                    if write.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
            }
        }
        let _ = forward_ctx;
    });

    while let Some(msg) = read.next().await {
        let msg = match msg {
            Ok(msg) => msg,
            Err(_) => break,
        };
        match msg {
            Message::Text(text) => handle_text_frame(&ctx, &connection_id, text.as_str()),
            Message::Close(_) => break,
            _ => {}
        }
    }

    let _ = closed_tx.send(()).await;
    let _ = forward_task.await;

    if let Some(session_id) = ctx.connections.bound_session(&connection_id) {
        ctx.sessions.unbind_connection(&session_id, DisconnectReason::NormalClosure, now_ms());
    }
    ctx.connections.unregister(&connection_id);
    info!(connection = %connection_id, "connection closed");
}

fn handle_text_frame(ctx: &IngestContext, connection_id: &ConnectionId, text: &str) {
    let frame: InboundFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            ctx.connections.send_to(
                connection_id,
                OutboundFrame::Error { error: format!("invalid message: {e}"), code: error_code(&IngestError::InvalidMessage(e.to_string())) },
            );
            return;
        }
    };

    match dispatch_frame(ctx, connection_id, frame) {
        Ok(Some(reply)) => {
            ctx.connections.send_to(connection_id, reply);
        }
        Ok(None) => {}
        Err(e) => {
            warn!(connection = %connection_id, error = %e, "frame dispatch failed");
            ctx.connections.send_to(
                connection_id,
                OutboundFrame::Error { error: e.to_string(), code: error_code(&e) },
            );
        }
    }
}

fn error_code(err: &IngestError) -> String {
    use loupe_core::errors::ErrorKind;
    err.error_kind().to_string()
}
