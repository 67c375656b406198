use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use storm_common::{CheckUpdatesResponse, Target, TargetsResponse};

use crate::web::{error::ApiError, AppState};

pub async fn list_targets(
    State(state): State<Arc<AppState>>,
) -> Result<Json<TargetsResponse>, ApiError> {
    let (targets, last_updated) = state.targets.list();
    Ok(Json(TargetsResponse {
        success: true,
        targets,
        last_updated,
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckUpdatesQuery {
    pub last_checked: Option<i64>,
}

pub async fn check_updates(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CheckUpdatesQuery>,
) -> Result<Json<CheckUpdatesResponse>, ApiError> {
    let last_checked = query
        .last_checked
        .ok_or_else(|| ApiError::BadRequest("missing lastChecked parameter".to_string()))?;
    Ok(Json(CheckUpdatesResponse {
        success: true,
        has_updates: state.targets.has_changes_since(last_checked),
        last_updated: state.targets.last_updated(),
    }))
}

pub async fn upsert_target(
    State(state): State<Arc<AppState>>,
    Json(target): Json<Target>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.targets.upsert(target.clone())?;
    Ok(Json(json!({ "success": true, "target": target })))
}

pub async fn delete_target(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !state.targets.delete(id)? {
        return Err(ApiError::NotFound(format!("no target with id {id}")));
    }
    Ok(Json(json!({ "success": true })))
}

pub async fn target_uptime(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if state.targets.get(id).is_none() {
        return Err(ApiError::NotFound(format!("no target with id {id}")));
    }
    let windows = state.monitor.uptime_windows(id, Utc::now().timestamp_millis());
    Ok(Json(json!({ "success": true, "uptime": windows })))
}
