//! HTTP API for non-interactive producers.
//!
//! Lets bots and webhooks post and read messages without a WebSocket
//! connection.
//!
//! Endpoints:
//! - POST /api/send-message — inject a chat message for a roster identity
//! - GET  /api/messages     — poll recent message history
//! - GET  /api/peers        — list identified connections
//! - GET  /health           — connection and history counters

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use crew_core::event::{ChatMessage, ConnectionInfo};
use crew_core::{Error, now_millis};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;

use crate::relay::RelayState;

/// Default page size for GET /api/messages.
const DEFAULT_PAGE: usize = 50;
/// Largest page GET /api/messages will return.
const MAX_PAGE: usize = 200;

/// Query params for POST /api/send-message.
#[derive(Debug, Default, Deserialize)]
pub struct SendQuery {
    /// Sender identity, for bodies that cannot carry one (plain strings).
    /// Takes precedence over an `identity` field in the body.
    pub identity: Option<String>,
}

/// Response for POST /api/send-message.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResponse {
    pub success: bool,
    pub message_id: String,
    pub timestamp: u64,
}

/// Query params for GET /api/messages.
#[derive(Debug, Default, Deserialize)]
pub struct MessagesQuery {
    /// Only return messages after this cursor.
    pub after: Option<usize>,
    /// Max messages to return (default 50).
    pub limit: Option<usize>,
}

/// Response for GET /api/messages.
#[derive(Debug, Serialize)]
pub struct MessagesResponse {
    pub messages: Vec<ChatMessage>,
    /// Messages appended so far, up to the last one returned. Pass back as
    /// `after` to poll; it stays valid once old messages are evicted.
    pub cursor: usize,
}

/// Response for GET /health.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub active_connections: usize,
    pub total_connections: usize,
    pub message_history: usize,
    pub uptime_secs: u64,
    pub version: &'static str,
    pub timestamp: u64,
}

/// A rejected API request.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": self.0.to_string(),
            "kind": self.0.kind(),
        });
        (StatusCode::BAD_REQUEST, Json(body)).into_response()
    }
}

/// POST /api/send-message — inject a message as a roster identity.
///
/// The body may be `{"identity", "message", "tags"}`, a content-block shape
/// `{"identity", "content": [{"text"}]}`, or a plain JSON string with the
/// identity given as `?identity=`. When both are present, `?identity=` wins
/// over the body's `identity`.
pub async fn send_message(
    State(state): State<Arc<RelayState>>,
    Query(query): Query<SendQuery>,
    Json(body): Json<Value>,
) -> Result<Json<SendResponse>, ApiError> {
    let identity = query
        .identity
        .or_else(|| body.get("identity").and_then(Value::as_str).map(str::to_string))
        .ok_or_else(|| Error::UnknownIdentity(String::new()))?;
    let tags: Vec<String> = body
        .get("tags")
        .and_then(Value::as_array)
        .map(|tags| {
            tags.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let chat = state.submit(&identity, &body, tags).await?;

    Ok(Json(SendResponse {
        success: true,
        message_id: chat.id.to_string(),
        timestamp: chat.timestamp,
    }))
}

/// GET /api/messages — poll recent messages.
pub async fn get_messages(
    State(state): State<Arc<RelayState>>,
    Query(params): Query<MessagesQuery>,
) -> Json<MessagesResponse> {
    let after = params.after.unwrap_or(0);
    let limit = params.limit.unwrap_or(DEFAULT_PAGE).min(MAX_PAGE);

    let (messages, cursor) = state.history_page(after, limit).await;

    Json(MessagesResponse { messages, cursor })
}

/// GET /api/peers — list identified connections.
pub async fn get_peers(State(state): State<Arc<RelayState>>) -> Json<Vec<ConnectionInfo>> {
    Json(state.active_connections().await)
}

/// GET /health — read-only counters.
pub async fn health(State(state): State<Arc<RelayState>>) -> Json<HealthResponse> {
    let health = state.health().await;
    Json(HealthResponse {
        status: "healthy",
        active_connections: health.active_connections,
        total_connections: health.total_connections,
        message_history: health.history_length,
        uptime_secs: state.start_time.elapsed().as_secs(),
        version: env!("BUILD_VERSION"),
        timestamp: now_millis(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crew_core::roster::Roster;

    fn state() -> Arc<RelayState> {
        Arc::new(RelayState::new(Roster::crew(), 100, 20))
    }

    async fn send(state: &Arc<RelayState>, identity: Option<&str>, body: Value) -> Result<SendResponse, ApiError> {
        let query = SendQuery {
            identity: identity.map(str::to_string),
        };
        send_message(State(state.clone()), Query(query), Json(body))
            .await
            .map(|Json(resp)| resp)
    }

    #[tokio::test]
    async fn send_with_direct_field_and_tags() {
        let state = state();
        let resp = send(&state, None, json!({"identity": "G", "message": "deploy done", "tags": ["ops", 3]}))
            .await
            .unwrap();
        assert!(resp.success);
        assert!(resp.message_id.starts_with("msg_"));

        let (page, _) = state.history_page(0, 10).await;
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].message, "deploy done");
        assert_eq!(page[0].tags, ["ops"]);
    }

    #[tokio::test]
    async fn send_plain_string_with_query_identity() {
        let state = state();
        send(&state, Some("emmy"), json!("from a webhook")).await.unwrap();
        let (page, _) = state.history_page(0, 10).await;
        assert_eq!(page[0].sender, "emmy");
        assert_eq!(page[0].message, "from a webhook");
    }

    #[tokio::test]
    async fn query_identity_overrides_body_identity() {
        let state = state();
        send(&state, Some("emmy"), json!({"identity": "heather", "message": "who"}))
            .await
            .unwrap();
        let (page, _) = state.history_page(0, 10).await;
        assert_eq!(page[0].sender, "emmy");
    }

    #[tokio::test]
    async fn send_rejections_are_bad_requests() {
        let state = state();
        let err = send(&state, None, json!({"identity": "nobody", "message": "x"})).await.unwrap_err();
        assert_eq!(err.0.kind(), "unknown_identity");
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);

        let err = send(&state, None, json!({"identity": "G", "attachments": []})).await.unwrap_err();
        assert_eq!(err.0, Error::NoExtractableMessage);

        let err = send(&state, None, json!({"message": "who am I"})).await.unwrap_err();
        assert_eq!(err.0.kind(), "unknown_identity");
    }

    #[tokio::test]
    async fn messages_page_with_cursor() {
        let state = state();
        for i in 0..5 {
            send(&state, Some("G"), json!(format!("m{i}"))).await.unwrap();
        }
        let query = MessagesQuery {
            after: Some(3),
            limit: Some(10),
        };
        let Json(resp) = get_messages(State(state.clone()), Query(query)).await;
        assert_eq!(resp.cursor, 5);
        let texts: Vec<_> = resp.messages.iter().map(|m| m.message.as_str()).collect();
        assert_eq!(texts, ["m3", "m4"]);
    }

    #[tokio::test]
    async fn polling_continues_past_eviction() {
        let state = state();
        for i in 0..100 {
            send(&state, Some("G"), json!(format!("m{i}"))).await.unwrap();
        }
        let query = MessagesQuery {
            after: Some(0),
            limit: Some(MAX_PAGE),
        };
        let Json(resp) = get_messages(State(state.clone()), Query(query)).await;
        assert_eq!(resp.messages.len(), 100);
        assert_eq!(resp.cursor, 100);

        for i in 100..110 {
            send(&state, Some("G"), json!(format!("m{i}"))).await.unwrap();
        }
        let query = MessagesQuery {
            after: Some(resp.cursor),
            limit: Some(MAX_PAGE),
        };
        let Json(resp) = get_messages(State(state.clone()), Query(query)).await;
        assert_eq!(resp.messages.len(), 10);
        assert_eq!(resp.messages[0].message, "m100");
        assert_eq!(resp.cursor, 110);
    }

    #[tokio::test]
    async fn health_reports_counts() {
        let state = state();
        send(&state, Some("G"), json!("ping")).await.unwrap();
        let Json(resp) = health(State(state.clone())).await;
        assert_eq!(resp.status, "healthy");
        assert_eq!(resp.active_connections, 0);
        assert_eq!(resp.message_history, 1);
        assert!(!resp.version.is_empty());
    }
}
