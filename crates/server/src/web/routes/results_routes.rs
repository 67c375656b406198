use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use storm_common::{SubmitResultsRequest, SubmitResultsResponse};

use crate::web::{error::ApiError, middleware::agent_id, AppState};

pub async fn submit_results(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<SubmitResultsRequest>,
) -> Result<Json<SubmitResultsResponse>, ApiError> {
    let id = agent_id(&headers)?;
    if !state.registry.is_known(&id) {
        return Err(ApiError::UnknownAgent(id));
    }
    if payload.results.is_empty() {
        return Err(ApiError::BadRequest("results must not be empty".to_string()));
    }

    debug!(agent_id = %id, count = payload.results.len(), "Accepting check results.");
    let received = state.monitor.submit(&payload.results);
    Ok(Json(SubmitResultsResponse {
        success: true,
        received,
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawResultsQuery {
    pub agent_id: Option<String>,
    pub target_id: Option<u64>,
    pub date: Option<String>,
}

pub async fn raw_results(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RawResultsQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let tree = state.monitor.raw_results(
        query.agent_id.as_deref(),
        query.target_id,
        query.date.as_deref(),
    );
    Ok(Json(json!({ "success": true, "results": tree })))
}
