//! WebSocket session lifecycle: one connected client from upgrade
//! through guaranteed group cleanup.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::connect_info::ConnectInfo;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::header::ORIGIN;
use axum::http::HeaderMap;
use axum::response::Response;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use murmur_core::{
    GroupKey, GroupKind, InboundFrame, ReadyEnvelope, RelayError, WelcomeFrame,
};

use super::connection::{ConnectionHandle, OutboundFrame};
use super::keepalive::run_keepalive;
use super::listener::run_listener;
use super::registry::GroupRegistry;
use crate::config::{MalformedFramePolicy, RelayConfig};
use crate::metrics as names;
use crate::server::AppState;

/// Close code for connections rejected before joining a group.
const CLOSE_POLICY_VIOLATION: u16 = 1008;
/// Close code for protocol errors under the disconnect policy.
const CLOSE_PROTOCOL_ERROR: u16 = 1002;
/// Close code for server-initiated teardown of an active session.
const CLOSE_INTERNAL_ERROR: u16 = 1011;

/// Required query parameters for the websocket route. A missing
/// `session_id` is rejected pre-upgrade with HTTP 400 by the extractor.
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Session the client wants notifications for.
    pub session_id: String,
}

/// What ended an active session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseReason {
    /// The client closed or dropped the connection.
    ClientClosed,
    /// The transport errored while reading.
    TransportError,
    /// Malformed frame under the disconnect policy.
    MalformedFrame,
    /// Server-wide shutdown.
    Shutdown,
}

/// `GET /ws/{group_kind}` — validate, upgrade, and run the session.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(group_kind): Path<String>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    let origin = headers
        .get(ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let client_ip = addr.ip().to_string();
    ws.on_upgrade(move |socket| {
        run_session(socket, state, group_kind, query.session_id, origin, client_ip)
    })
}

/// Validate the origin and resolve the group key, in that order.
fn screen(
    config: &RelayConfig,
    origin: Option<&str>,
    kind: &str,
    session_id: &str,
) -> Result<GroupKey, RelayError> {
    if !config.origin_allowed(origin) {
        return Err(RelayError::ForbiddenOrigin(origin.map(str::to_owned)));
    }
    let kind: GroupKind = kind.parse()?;
    Ok(GroupKey::resolve(kind, session_id)?)
}

/// Run one session: screen, join, spawn keepalive and bridge listener,
/// pump inbound frames, and clean up on every exit path.
#[instrument(skip_all, fields(kind = %group_kind, session_id = %session_id, client_ip = %client_ip))]
pub(crate) async fn run_session(
    socket: WebSocket,
    state: AppState,
    group_kind: String,
    session_id: String,
    origin: Option<String>,
    client_ip: String,
) {
    // Connecting -> OriginChecked -> Joined, or a 1008 close.
    let group = match screen(&state.config, origin.as_deref(), &group_kind, &session_id) {
        Ok(group) => group,
        Err(error) => {
            let reason = match &error {
                RelayError::ForbiddenOrigin(_) => "origin",
                RelayError::InvalidGroup(_) => "invalid_group",
            };
            warn!(%error, "rejecting connection");
            counter!(names::WS_REJECTIONS_TOTAL, "reason" => reason).increment(1);
            reject(socket, CLOSE_POLICY_VIOLATION, "policy violation").await;
            return;
        }
    };

    let (ws_tx, mut ws_rx) = socket.split();
    let (tx, rx) = mpsc::channel(state.config.outbound_capacity);
    let handle = Arc::new(ConnectionHandle::new(client_ip.clone(), group.clone(), tx));

    info!(conn_id = %handle.id, group = group.as_str(), "client connected");
    counter!(names::WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(names::WS_CONNECTIONS_ACTIVE).increment(1.0);

    state.registry.join(handle.clone());

    // Joined -> Active. A failed subscription degrades the session to
    // registry-only delivery instead of tearing it down.
    let subscription = match state.broker.subscribe(group.as_str()).await {
        Ok(subscription) => Some(subscription),
        Err(error) => {
            warn!(%error, group = group.as_str(), "subscribe failed, continuing registry-only");
            None
        }
    };

    let cancel = state.shutdown.child_token();
    let writer = tokio::spawn(run_writer(ws_tx, rx));
    let keepalive = tokio::spawn(run_keepalive(
        handle.clone(),
        state.config.ping_interval(),
        cancel.clone(),
    ));
    let listener = subscription
        .map(|sub| tokio::spawn(run_listener(handle.clone(), sub, cancel.clone())));

    let guard = SessionGuard {
        registry: state.registry.clone(),
        group_key: group.as_str().to_string(),
        id: handle.id,
        cancel: cancel.clone(),
    };

    let welcome = WelcomeFrame::new(group.kind(), &group, &client_ip);
    if !handle.send_json(&welcome) {
        debug!(conn_id = %handle.id, "welcome frame not queued");
    }

    let close_reason = loop {
        tokio::select! {
            () = cancel.cancelled() => break CloseReason::Shutdown,
            frame = ws_rx.next() => {
                let Some(frame) = frame else { break CloseReason::ClientClosed };
                let message = match frame {
                    Ok(message) => message,
                    Err(error) => {
                        debug!(conn_id = %handle.id, %error, "transport read error");
                        break CloseReason::TransportError;
                    }
                };
                match classify(message) {
                    Classified::Text(text) => {
                        if let Some(reason) = handle_text(&state, &handle, &group, &text).await {
                            break reason;
                        }
                    }
                    Classified::Closed => break CloseReason::ClientClosed,
                    Classified::Ignored => {}
                }
            }
        }
    };

    // Active -> Closing: the server queues its close code; a client
    // close needs no frame of ours.
    let close_code = match close_reason {
        CloseReason::ClientClosed => None,
        CloseReason::MalformedFrame => Some(CLOSE_PROTOCOL_ERROR),
        CloseReason::TransportError | CloseReason::Shutdown => Some(CLOSE_INTERNAL_ERROR),
    };
    if let Some(code) = close_code {
        if !handle.close(code) {
            warn!(conn_id = %handle.id, code, "close frame not queued, writer queue full or gone");
        }
    }

    info!(
        conn_id = %handle.id,
        group = group.as_str(),
        reason = ?close_reason,
        dropped_frames = handle.drop_count(),
        "client disconnected"
    );
    counter!(names::WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(names::WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(names::WS_CONNECTION_DURATION_SECONDS).record(handle.age().as_secs_f64());

    // Closing -> Closed: leave the registry and cancel the tasks, then
    // wait them out so nothing outlives the session.
    drop(guard);
    let _ = keepalive.await;
    if let Some(listener) = listener {
        let _ = listener.await;
    }
    drop(handle);
    let _ = writer.await;
}

/// Scope-exit cleanup; runs exactly once on every exit path, panics
/// included.
struct SessionGuard {
    registry: Arc<GroupRegistry>,
    group_key: String,
    id: Uuid,
    cancel: CancellationToken,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.registry.leave(&self.group_key, self.id);
        debug!(conn_id = %self.id, group = %self.group_key, "session cleanup complete");
    }
}

/// Inbound message reduced to what the session cares about.
#[derive(Debug)]
enum Classified {
    /// Text (or UTF-8 binary) to interpret as a frame.
    Text(String),
    /// The client is closing.
    Closed,
    /// Control traffic or undecodable binary.
    Ignored,
}

fn classify(message: Message) -> Classified {
    match message {
        Message::Text(text) => Classified::Text(text.to_string()),
        Message::Binary(data) => match std::str::from_utf8(&data) {
            Ok(text) => Classified::Text(text.to_string()),
            Err(_) => {
                debug!(len = data.len(), "ignoring non-UTF8 binary frame");
                Classified::Ignored
            }
        },
        Message::Close(_) => Classified::Closed,
        Message::Ping(_) | Message::Pong(_) => Classified::Ignored,
    }
}

/// Interpret one text frame. Returns a close reason only when the frame
/// must end the session.
async fn handle_text(
    state: &AppState,
    handle: &Arc<ConnectionHandle>,
    group: &GroupKey,
    text: &str,
) -> Option<CloseReason> {
    match InboundFrame::parse(text) {
        Ok(InboundFrame::Ready(payload)) => {
            debug!(conn_id = %handle.id, "ready received, publishing to group");
            let envelope = ReadyEnvelope::wrap(payload);
            match serde_json::to_string(&envelope) {
                Ok(json) => {
                    counter!(names::BRIDGE_PUBLISH_TOTAL).increment(1);
                    if let Err(error) = state.broker.publish(group.as_str(), &json).await {
                        counter!(names::BRIDGE_PUBLISH_ERRORS_TOTAL).increment(1);
                        warn!(%error, "publish failed, ready envelope dropped");
                    }
                }
                Err(error) => warn!(%error, "ready envelope not serializable"),
            }
            None
        }
        Ok(InboundFrame::Other(kind)) => {
            debug!(
                conn_id = %handle.id,
                kind = kind.as_deref().unwrap_or("<untyped>"),
                "ignoring inbound frame"
            );
            None
        }
        Err(error) => match state.config.malformed_frame_policy {
            MalformedFramePolicy::Skip => {
                warn!(conn_id = %handle.id, %error, "malformed frame skipped");
                None
            }
            MalformedFramePolicy::Disconnect => {
                warn!(conn_id = %handle.id, %error, "malformed frame, closing");
                Some(CloseReason::MalformedFrame)
            }
        },
    }
}

/// Close a socket that never joined a group.
async fn reject(mut socket: WebSocket, code: u16, reason: &'static str) {
    let frame = CloseFrame {
        code,
        reason: reason.into(),
    };
    if socket.send(Message::Close(Some(frame))).await.is_err() {
        debug!("client gone before rejection close");
    }
}

/// Drain the outbound queue into the socket sink.
///
/// Ends when every sender is gone or the transport dies; a queued close
/// frame ends the drain right after it is flushed.
async fn run_writer(mut sink: SplitSink<WebSocket, Message>, mut rx: mpsc::Receiver<OutboundFrame>) {
    while let Some(frame) = rx.recv().await {
        match frame {
            OutboundFrame::Text(text) => {
                if sink.send(Message::Text(text.as_str().into())).await.is_err() {
                    break;
                }
            }
            OutboundFrame::Close(code) => {
                let frame = CloseFrame {
                    code,
                    reason: "".into(),
                };
                let _ = sink.send(Message::Close(Some(frame))).await;
                break;
            }
        }
    }
}
