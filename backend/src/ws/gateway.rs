//! Channel endpoint: upgrade handling and the per-connection event loop.
//!
//! Authorization happens before the upgrade; once admitted, a connection may
//! only send `request` envelopes. Anything else gets a structured error
//! frame back instead of reaching routing logic.

use std::net::SocketAddr;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        ConnectInfo, Query, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::AppError;
use crate::services::presence::PresenceRecord;
use crate::state::AppState;
use crate::ws::handshake::{self, AdmittedActor, HandshakeParams, PRESENCE_TTL_SECONDS};

const EVENT_REQUEST: &str = "request";
const EVENT_RESPONSE: &str = "response";
const EVENT_ERROR: &str = "error";

#[derive(Debug, Deserialize)]
struct InboundEnvelope {
    event: String,
    #[serde(default)]
    request_id: Option<String>,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Serialize)]
struct OutboundEnvelope<'a> {
    event: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_id: Option<&'a str>,
    data: Value,
}

impl OutboundEnvelope<'_> {
    fn into_message(self) -> Message {
        // Serializing a struct of plain fields cannot fail.
        let json = serde_json::to_string(&self).unwrap_or_default();
        Message::Text(json.into())
    }
}

fn error_frame(code: &str, message: &str, request_id: Option<&str>) -> Message {
    OutboundEnvelope {
        event: EVENT_ERROR,
        request_id,
        data: serde_json::json!({ "code": code, "message": message }),
    }
    .into_message()
}

pub async fn channel_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<HandshakeParams>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Result<Response, AppError> {
    let admitted = handshake::authorize(&state, &params, addr.to_string()).await?;
    tracing::info!(
        actor = %admitted.subject,
        instance = %admitted.instance_id,
        rooms = admitted.rooms.len(),
        "Channel admitted"
    );
    Ok(ws.on_upgrade(move |socket| run_connection(state, socket, admitted, addr)))
}

async fn run_connection(
    state: AppState,
    socket: WebSocket,
    admitted: AdmittedActor,
    addr: SocketAddr,
) {
    let conn_id = admitted.connection_id();
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    state.rooms.register(&conn_id, tx.clone()).await;
    for room in &admitted.rooms {
        state.rooms.join(&conn_id, room).await;
    }

    let mut send_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if ws_sender.send(message).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            incoming = ws_receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if let Err(err) =
                            handle_text(&state, &admitted, &addr, &tx, text.as_str()).await
                        {
                            tracing::error!(error = %err, actor = %admitted.subject, "Channel event failed");
                            let _ = tx.send(error_frame(
                                "INTERNAL_ERROR",
                                "event processing failed",
                                None,
                            ));
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = tx.send(Message::Pong(payload));
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {
                        let _ = tx.send(error_frame(
                            "INVALID_EVENT",
                            "only text request envelopes are accepted",
                            None,
                        ));
                    }
                    Some(Err(err)) => {
                        tracing::debug!(error = %err, "Channel read error");
                        break;
                    }
                }
            }
            _ = &mut send_task => break,
        }
    }

    // Disconnect is the cleanup signal: leave rooms and drop presence.
    send_task.abort();
    state.rooms.remove(&conn_id).await;
    if let Err(err) = state.presence.remove(&admitted.presence_key).await {
        tracing::warn!(error = %err, key = %admitted.presence_key, "Presence cleanup failed");
    }
    tracing::info!(actor = %admitted.subject, instance = %admitted.instance_id, "Channel closed");
}

async fn handle_text(
    state: &AppState,
    admitted: &AdmittedActor,
    addr: &SocketAddr,
    tx: &mpsc::UnboundedSender<Message>,
    text: &str,
) -> anyhow::Result<()> {
    let envelope: InboundEnvelope = match serde_json::from_str(text) {
        Ok(envelope) => envelope,
        Err(_) => {
            let _ = tx.send(error_frame(
                "INVALID_EVENT",
                "frames must be JSON envelopes with an \"event\" field",
                None,
            ));
            return Ok(());
        }
    };

    if envelope.event != EVENT_REQUEST {
        let _ = tx.send(error_frame(
            "INVALID_EVENT",
            &format!("unsupported event \"{}\"", envelope.event),
            envelope.request_id.as_deref(),
        ));
        return Ok(());
    }

    touch_presence(state, admitted, addr).await?;

    let Some(room) = target_room(&envelope.data) else {
        let _ = tx.send(error_frame(
            "INVALID_EVENT",
            "request does not name a routable target",
            envelope.request_id.as_deref(),
        ));
        return Ok(());
    };

    let forwarded = OutboundEnvelope {
        event: EVENT_REQUEST,
        request_id: envelope.request_id.as_deref(),
        data: serde_json::json!({
            "from": admitted.subject.to_string(),
            "payload": envelope.data,
        }),
    }
    .into_message();
    let delivered = state.rooms.send_to_room(&room, forwarded).await;

    let ack = OutboundEnvelope {
        event: EVENT_RESPONSE,
        request_id: envelope.request_id.as_deref(),
        data: serde_json::json!({ "room": room, "delivered": delivered }),
    }
    .into_message();
    let _ = tx.send(ack);
    Ok(())
}

/// Routing target of a request payload. Requests address either an
/// application (optionally a specific task room) or a user.
fn target_room(data: &Value) -> Option<String> {
    if let Some(app) = data.get("app").and_then(Value::as_str) {
        if let Some(task) = data.get("task").and_then(Value::as_str) {
            return Some(format!("task:{app}:{task}"));
        }
        return Some(format!("app:{app}"));
    }
    if let Some(user_id) = data.get("user_id").and_then(Value::as_str) {
        return Some(format!("user:{user_id}"));
    }
    if let Some(folder_id) = data.get("folder_id").and_then(Value::as_str) {
        return Some(format!("folder:{folder_id}"));
    }
    None
}

/// Rewrites the presence record so an active connection never expires out of
/// the registry.
async fn touch_presence(
    state: &AppState,
    admitted: &AdmittedActor,
    addr: &SocketAddr,
) -> anyhow::Result<()> {
    let mut record = PresenceRecord::new(
        &admitted.subject,
        admitted.instance_id.clone(),
        addr.to_string(),
        admitted.rooms.clone(),
    );
    if let Some(existing) = state.presence.get(&admitted.presence_key).await? {
        record.connected_at = existing.connected_at;
    }
    state.presence.record(&record, PRESENCE_TTL_SECONDS).await
}
