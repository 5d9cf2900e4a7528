//! WebSocket upgrade handler and per-connection event loop.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time;

use crate::auth::tokens::bearer_token;
use crate::AppState;

use super::events::ServerEvent;
use super::handler::{AuthenticationError, Gateway};
use super::session::ConnectionId;

/// Close codes (4000-range for application-level).
const CLOSE_AUTH_FAILED: u16 = 4004;
const CLOSE_SESSION_TIMEOUT: u16 = 4009;
const CLOSE_PING_TIMEOUT: u16 = 4010;

/// Frames held while the handshake is pending. Anything past this is dropped.
pub const MAX_EARLY_FRAMES: usize = 32;

/// How often the server pings an idle client.
const PING_INTERVAL: Duration = Duration::from_secs(25);
/// A client silent for this long is considered gone.
const PING_TIMEOUT: Duration = Duration::from_secs(60);

type WsSink = SplitSink<WebSocket, Message>;
type WsStream = SplitStream<WebSocket>;

#[derive(Debug, Default, Deserialize)]
pub struct HandshakeQuery {
    token: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/gateway", get(ws_upgrade))
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    Query(query): Query<HandshakeQuery>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> impl IntoResponse {
    // The explicit auth field wins over the header.
    let token = query.token.filter(|t| !t.is_empty()).or_else(|| {
        headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(bearer_token)
            .map(str::to_string)
    });
    ws.on_upgrade(move |socket| handle_connection(socket, state, token))
}

async fn handle_connection(socket: WebSocket, state: AppState, token: Option<String>) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let gateway = state.gateway.clone();

    // Step 1: authenticate while watching the socket. Frames that arrive early
    // are held until the connection is attached; a close aborts the handshake
    // before anything is registered.
    let handshake = time::timeout(
        state.config.handshake_timeout,
        gateway.authenticate(token.as_deref()),
    );
    tokio::pin!(handshake);
    let mut early_frames: Vec<Utf8Bytes> = Vec::new();

    let principal = loop {
        tokio::select! {
            result = &mut handshake => {
                let err = match result {
                    Ok(Ok(principal)) => break principal,
                    Ok(Err(err)) => err,
                    Err(_elapsed) => AuthenticationError::Timeout,
                };
                tracing::debug!(error = %err, "socket authentication failed");
                let code = match err {
                    AuthenticationError::Timeout => CLOSE_SESSION_TIMEOUT,
                    _ => CLOSE_AUTH_FAILED,
                };
                let _ = send_close(&mut ws_tx, code, &err.to_string()).await;
                return;
            }
            frame = ws_rx.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if early_frames.len() < MAX_EARLY_FRAMES {
                        early_frames.push(text);
                    } else {
                        tracing::debug!("handshake frame buffer full, dropping frame");
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    tracing::debug!("client closed during handshake");
                    return;
                }
                Some(Err(e)) => {
                    tracing::debug!(?e, "ws read error during handshake");
                    return;
                }
                Some(Ok(_)) => continue,
            }
        }
    };

    // Step 2: attach and replay anything the client sent early.
    let (outbound_tx, outbound_rx) = mpsc::channel(state.config.outbound_buffer);
    let connection_id = gateway.attach(principal, outbound_tx);
    for text in &early_frames {
        gateway.handle_frame(&connection_id, text.as_str());
    }

    // Step 3: run until either side goes away, then clean up.
    run_connection(&gateway, &connection_id, ws_tx, ws_rx, outbound_rx).await;
    gateway.detach(&connection_id);
}

/// Main loop: read client events, forward queued server events, keep the
/// connection alive with pings.
async fn run_connection(
    gateway: &Gateway,
    connection_id: &ConnectionId,
    mut ws_tx: WsSink,
    mut ws_rx: WsStream,
    mut outbound_rx: mpsc::Receiver<Arc<ServerEvent>>,
) {
    let mut ping_timer = time::interval(PING_INTERVAL);
    ping_timer.tick().await; // First tick fires immediately; skip it.
    let mut last_seen = Instant::now();

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        last_seen = Instant::now();
                        gateway.handle_frame(connection_id, text.as_str());
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                        last_seen = Instant::now();
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(?e, connection_id = %connection_id, "ws read error");
                        break;
                    }
                    Some(Ok(Message::Binary(_))) => continue,
                }
            }

            event = outbound_rx.recv() => {
                // `None` means the registry dropped this connection.
                let Some(event) = event else { break };
                let frame = match event.to_frame() {
                    Ok(frame) => frame,
                    Err(err) => {
                        tracing::error!(?err, event = event.name(), "failed to encode event");
                        continue;
                    }
                };
                if ws_tx.send(Message::Text(frame.into())).await.is_err() {
                    break;
                }
            }

            _ = ping_timer.tick() => {
                if last_seen.elapsed() > PING_TIMEOUT {
                    tracing::debug!(connection_id = %connection_id, "ping timeout, closing connection");
                    let _ = send_close(&mut ws_tx, CLOSE_PING_TIMEOUT, "Ping timeout").await;
                    break;
                }
                if ws_tx.send(Message::Ping(Default::default())).await.is_err() {
                    break;
                }
            }
        }
    }
}

/// Send a WebSocket close frame with a code and reason.
async fn send_close(ws_tx: &mut WsSink, code: u16, reason: &str) -> Result<(), axum::Error> {
    let close_msg = Message::Close(Some(CloseFrame {
        code,
        reason: reason.to_string().into(),
    }));
    ws_tx.send(close_msg).await
}
