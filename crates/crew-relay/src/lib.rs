//! Crew relay server.
//!
//! A WebSocket relay that lets a fixed roster of participants exchange chat
//! messages, presence and typing signals, with a bounded replay history and
//! an HTTP injection path for bots and webhooks.

pub mod api;
pub mod config;
pub mod fanout;
pub mod registry;
pub mod relay;
pub mod ws;

use axum::{
    Router,
    routing::{get, post},
};
use std::path::Path;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};

use relay::RelayState;

/// Build the HTTP router: WebSocket endpoint, bot API, health, and the
/// static web client as fallback.
pub fn router(state: Arc<RelayState>, static_dir: &Path) -> Router {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/health", get(api::health))
        // Bot HTTP API
        .route("/api/send-message", post(api::send_message))
        .route("/api/messages", get(api::get_messages))
        .route("/api/peers", get(api::get_peers))
        .fallback_service(
            ServeDir::new(static_dir).fallback(ServeFile::new(static_dir.join("index.html"))),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}
