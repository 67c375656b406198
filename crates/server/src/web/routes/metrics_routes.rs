use std::sync::Arc;

use axum::{extract::State, Json};

use crate::web::{models::MetricsSnapshot, AppState};

/// Liveness endpoint: entity counts plus process uptime.
pub async fn metrics(State(state): State<Arc<AppState>>) -> Json<MetricsSnapshot> {
    Json(MetricsSnapshot {
        success: true,
        agents: state.registry.list().len(),
        online_agents: state.registry.online_count(),
        targets: state.targets.count(),
        open_incidents: state.monitor.open_incident_count(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
    })
}
