//! Real-time channel
//!
//! A WebSocket carrying JSON frames. Clients join rooms (their user id,
//! `event-{id}`) and receive `{event, payload}` frames published to them.
//! Typing indicators are relayed to the event room minus the sender.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::service::realtime::{
    event_room, user_room, ConnectionId, RealtimeHub, USER_STOPPED_TYPING, USER_TYPING,
};

/// Client to server frames
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientFrame {
    #[serde(rename_all = "camelCase")]
    JoinUser { user_id: String },
    #[serde(rename_all = "camelCase")]
    LeaveUser { user_id: String },
    #[serde(rename_all = "camelCase")]
    JoinEvent { event_id: String },
    #[serde(rename_all = "camelCase")]
    LeaveEvent { event_id: String },
    #[serde(rename_all = "camelCase")]
    Typing { event_id: String, username: String },
    #[serde(rename_all = "camelCase")]
    StopTyping {
        event_id: String,
        #[serde(default)]
        username: Option<String>,
    },
}

/// Apply one client frame to the hub on behalf of `conn`
pub fn apply_frame(hub: &RealtimeHub, conn: ConnectionId, frame: ClientFrame) {
    match frame {
        ClientFrame::JoinUser { user_id } => hub.join(conn, &user_room(&user_id)),
        ClientFrame::LeaveUser { user_id } => hub.leave(conn, &user_room(&user_id)),
        ClientFrame::JoinEvent { event_id } => hub.join(conn, &event_room(&event_id)),
        ClientFrame::LeaveEvent { event_id } => hub.leave(conn, &event_room(&event_id)),
        ClientFrame::Typing { event_id, username } => {
            hub.publish_except(
                &event_room(&event_id),
                Some(conn),
                USER_TYPING,
                json!({ "username": username, "eventId": event_id }),
            );
        }
        ClientFrame::StopTyping { event_id, username } => {
            hub.publish_except(
                &event_room(&event_id),
                Some(conn),
                USER_STOPPED_TYPING,
                json!({ "username": username, "eventId": event_id }),
            );
        }
    }
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(hub): State<Arc<RealtimeHub>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, hub))
}

async fn handle_socket(socket: WebSocket, hub: Arc<RealtimeHub>) {
    let (conn, mut frames) = hub.connect();
    info!(conn, "Live connection opened");

    let (mut sender, mut receiver) = socket.split();

    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = frames.recv().await {
            let text = match serde_json::to_string(&frame) {
                Ok(text) => text,
                Err(e) => {
                    warn!(error = %e, "Failed to encode frame");
                    continue;
                }
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let recv_hub = hub.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<ClientFrame>(&text) {
                    Ok(frame) => {
                        debug!(conn, ?frame, "Client frame");
                        apply_frame(&recv_hub, conn, frame);
                    }
                    Err(e) => warn!(conn, error = %e, "Ignoring malformed client frame"),
                },
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    }

    hub.disconnect(conn);
    info!(conn, "Live connection closed");
}

pub fn realtime_router(hub: Arc<RealtimeHub>) -> Router {
    Router::new().route("/ws", get(ws_handler)).with_state(hub)
}
