//! `GET /health` endpoint for monitoring and the systemd watchdog.

use anyhow::{Context, Result};
use axum::{extract::State, routing::get, Json, Router};
use serde_json::json;
use std::sync::Arc;

use spindle_core::SpoolStatus;

use crate::daemon::Daemon;

pub async fn serve_health(daemon: Arc<Daemon>, host: String, port: u16) -> Result<()> {
    let app = Router::new()
        .route("/health", get(health))
        .with_state(daemon);
    let listener = tokio::net::TcpListener::bind(format!("{host}:{port}"))
        .await
        .with_context(|| format!("Failed to bind health endpoint on {host}:{port}"))?;
    axum::serve(listener, app)
        .await
        .context("health endpoint server failed")?;
    Ok(())
}

async fn health(State(daemon): State<Arc<Daemon>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "uptime_seconds": daemon.started_at.elapsed().as_secs(),
        "running_spools": daemon.store.count_with_status(SpoolStatus::Running),
        "max_concurrent": daemon.settings.max_concurrent,
    }))
}
