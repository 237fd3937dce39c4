//! Health check and statistics endpoints.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::hub::ConnectionStats;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub connections: usize,
    pub unique_users: usize,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub uptime_seconds: u64,
    #[serde(flatten)]
    pub hub: ConnectionStats,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let stats = state.hub.connection_stats().await;

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        connections: stats.total_connections(),
        unique_users: stats.registry.unique_users,
    })
}

pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        uptime_seconds: state.start_time.elapsed().as_secs(),
        hub: state.hub.connection_stats().await,
    })
}
