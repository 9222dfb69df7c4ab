//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::job::JobState;
use crate::stats::StatsSnapshot;
use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status ("ok" or "degraded")
    pub status: String,
    /// Module name ("pcv-server")
    pub module: String,
    /// Crate version from Cargo.toml
    pub version: String,
    /// Seconds since service started
    pub uptime_seconds: u64,
    /// Jobs waiting for a worker
    pub queued_jobs: i64,
    /// Users with an open live session
    pub live_sessions: usize,
    pub pipeline: StatsSnapshot,
}

/// GET /health
///
/// Needs no identity; reports "degraded" when the job table is unreadable.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let uptime_seconds = uptime.num_seconds().max(0) as u64;

    let (status, queued_jobs) = match state.queue.count_in_state(JobState::Queued).await {
        Ok(count) => ("ok", count),
        Err(e) => {
            tracing::warn!("Health check could not read job queue: {}", e);
            ("degraded", 0)
        }
    };

    Json(HealthResponse {
        status: status.to_string(),
        module: "pcv-server".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds,
        queued_jobs,
        live_sessions: state.sessions.user_count().await,
        pipeline: state.stats.snapshot(),
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
