use std::sync::Arc;

use axum::{extract::State, http::HeaderMap, Json};
use tracing::info;

use storm_common::{AgentsResponse, HeartbeatResponse, RegisterRequest, RegisterResponse};

use crate::web::{error::ApiError, middleware::agent_id, AppState};

pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, ApiError> {
    if payload.name.trim().is_empty() {
        return Err(ApiError::BadRequest("agent name must not be empty".to_string()));
    }
    let location = if payload.location.trim().is_empty() {
        "Unknown"
    } else {
        payload.location.trim()
    };

    let agent = state.registry.register(payload.name.trim(), location)?;
    Ok(Json(RegisterResponse {
        success: true,
        agent_id: agent.id,
        server_id: state.server_id.clone(),
    }))
}

pub async fn heartbeat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<HeartbeatResponse>, ApiError> {
    let id = agent_id(&headers)?;
    let timestamp = state.registry.heartbeat(&id)?;
    Ok(Json(HeartbeatResponse {
        success: true,
        timestamp,
    }))
}

pub async fn list_agents(
    State(state): State<Arc<AppState>>,
) -> Result<Json<AgentsResponse>, ApiError> {
    let agents = state.registry.list();
    info!(count = agents.len(), "Serving agent registry.");
    Ok(Json(AgentsResponse {
        success: true,
        agents,
    }))
}
