use anyhow::{Context, Result};
use axum::{Router, routing::get};
use lectern_server::{
    AppState, MediaPathSelector, RoomManager, ServerConfig, SessionRegistry, SignalingService,
    ws_handler,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Arc::new(ServerConfig::from_env()?);
    info!(
        addr = %config.bind_addr,
        topology = %config.topology,
        max_tier = ?config.max_tier,
        "starting lectern signaling server"
    );

    let signaling = SignalingService::new();
    let registry = SessionRegistry::new();
    let selector = MediaPathSelector::new(config.topology);
    let rooms = RoomManager::new(
        config.clone(),
        selector,
        registry,
        Arc::new(signaling.clone()),
    );

    let state = Arc::new(AppState {
        signaling,
        rooms,
    });

    let app = Router::new()
        .route("/ws/{user_id}", get(ws_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}
