//! WebSocket transport: one reader and one writer task per connection.

use std::sync::Arc;

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use crew_core::Error;
use crew_core::event::Event;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::fanout::encode;
use crate::registry::Outbound;
use crate::relay::RelayState;

/// Query params for GET /ws.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectParams {
    /// Client-chosen session id. A random one is assigned when absent.
    pub session_id: Option<String>,
}

/// GET /ws — upgrade to a relay connection.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<Arc<RelayState>>,
) -> impl IntoResponse {
    let session_id = params
        .session_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    ws.on_upgrade(move |socket| handle_connection(socket, state, session_id))
}

/// Drive a single WebSocket connection until either side closes.
pub async fn handle_connection(socket: WebSocket, state: Arc<RelayState>, session_id: String) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (outbound, mut outbound_rx) = Outbound::channel();

    if let Err(e) = state.connect(&session_id, outbound).await {
        warn!("Refusing connection {session_id}: {e}");
        if let Some(frame) = encode(&Event::error(&e)) {
            let _ = ws_tx.send(Message::Text(frame.to_string().into())).await;
        }
        let _ = ws_tx.close().await;
        return;
    }

    // Forward queued frames to the socket.
    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            if ws_tx.send(Message::Text(frame.to_string().into())).await.is_err() {
                break;
            }
        }
    });

    // Read incoming envelopes from the client.
    let state_clone = state.clone();
    let session_for_recv = session_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            match msg {
                Message::Text(text) => {
                    state_clone.handle_text(&session_for_recv, text.as_str()).await;
                }
                Message::Binary(bytes) => match std::str::from_utf8(&bytes) {
                    Ok(text) => state_clone.handle_text(&session_for_recv, text).await,
                    Err(_) => {
                        debug!("Non-UTF-8 binary frame from {session_for_recv}");
                        let err = Error::MalformedEnvelope("binary frame is not valid UTF-8".into());
                        state_clone.reply_error(&session_for_recv, &err).await;
                    }
                },
                Message::Close(_) => break,
                Message::Ping(_) | Message::Pong(_) => {}
            }
        }
    });

    // Wait for either task to finish.
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.disconnect(&session_id).await;
}
