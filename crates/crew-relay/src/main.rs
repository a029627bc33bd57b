//! Crew relay server binary.

use std::sync::Arc;

use crew_relay::config::RelayConfig;
use crew_relay::relay::RelayState;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = RelayConfig::from_env()?;
    let roster = config.load_roster()?;
    let state = Arc::new(RelayState::from_config(&config, roster));

    let app = crew_relay::router(state, &config.static_dir);

    let addr = config.bind_addr;
    tracing::info!("Crew relay listening on {addr}");
    tracing::info!("WebSocket:  ws://{addr}/ws");
    tracing::info!("Bot API:    http://{addr}/api/");
    tracing::info!(
        "History: {} messages kept, {} replayed",
        config.history_capacity,
        config.history_replay
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Crew relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
