//! axum WebSocket adapter for `/ws/{session_id}`.

use crate::defaults;
use crate::pipeline::events::EventSender;
use crate::server::AppState;
use crate::server::connection::serve_connection;
use crate::server::protocol::{InboundFrame, OutboundFrame};
use crate::session::registry::SessionRegistry;
use axum::Json;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Validate the session id, then upgrade.
pub async fn ws_handler(
    Path(session_id): Path<String>,
    State(state): State<AppState>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let id = match Uuid::parse_str(&session_id) {
        Ok(id) => id,
        Err(_) => {
            tracing::warn!(session = %session_id, "Rejecting WebSocket with malformed session id");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "detail": "Invalid session id" })),
            )
                .into_response();
        }
    };
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    let registry = Arc::clone(&state.registry);
    ws.max_message_size(defaults::WS_MAX_MESSAGE_BYTES)
        .on_upgrade(move |socket| handle_socket(socket, registry, id))
}

async fn handle_socket(socket: WebSocket, registry: Arc<SessionRegistry>, id: Uuid) {
    let (sink, stream) = socket.split();
    let (events, outbound) = EventSender::channel();
    let writer = tokio::spawn(write_frames(sink, outbound, id));

    let inbound = stream.filter_map(|message| async move {
        match message {
            Ok(Message::Binary(bytes)) => Some(InboundFrame::Binary(bytes)),
            Ok(Message::Text(text)) => Some(InboundFrame::Text(text)),
            Ok(Message::Close(_)) => Some(InboundFrame::Close),
            // Ping/pong are answered by axum.
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(session = %id, error = %e, "WebSocket read failed");
                Some(InboundFrame::Close)
            }
        }
    });

    serve_connection(registry, id, Box::pin(inbound), events).await;

    if let Err(e) = writer.await {
        tracing::warn!(session = %id, error = %e, "WebSocket writer task failed");
    }
}

/// Forward queued frames to the socket until the queue closes or a close is requested.
async fn write_frames<S>(mut sink: S, mut outbound: mpsc::UnboundedReceiver<OutboundFrame>, id: Uuid)
where
    S: futures_util::Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    while let Some(frame) = outbound.recv().await {
        let message = match frame {
            OutboundFrame::Event(event) => match event.to_json() {
                Ok(json) => Message::Text(json),
                Err(e) => {
                    tracing::error!(session = %id, error = %e, "Failed to encode event");
                    continue;
                }
            },
            OutboundFrame::Audio(bytes) => Message::Binary(bytes),
            OutboundFrame::Close => Message::Close(None),
        };
        let closing = matches!(message, Message::Close(_));
        if let Err(e) = sink.send(message).await {
            tracing::debug!(session = %id, error = %e, "WebSocket write failed");
            break;
        }
        if closing {
            break;
        }
    }
    if let Err(e) = sink.close().await {
        tracing::debug!(session = %id, error = %e, "WebSocket close failed");
    }
}
