use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::monitor::records::local_date_string;
use crate::web::{
    error::ApiError,
    models::{StatusEntry, StatusSummary},
    AppState,
};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateQuery {
    pub target_id: Option<u64>,
    pub date: Option<String>,
}

/// Per-day, per-target aggregates fused across agents. Cached for the TTL
/// window; any submission drops the cache.
pub async fn uptime(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AggregateQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let now = Utc::now().timestamp_millis();
    let date = query.date.unwrap_or_else(|| local_date_string(now));
    let key = format!("uptime:{:?}:{date}", query.target_id);

    if let Some(cached) = state.monitor.cache().get(&key) {
        return Ok(Json(cached));
    }

    let results = state.monitor.daily_target_summary(&date, query.target_id, now);
    let body = json!({ "success": true, "results": results, "date": date });
    state.monitor.cache().put(&key, body.clone());
    Ok(Json(body))
}

pub async fn latency(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AggregateQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let key = format!("latency:{:?}:{:?}", query.target_id, query.date);
    if let Some(cached) = state.monitor.cache().get(&key) {
        return Ok(Json(cached));
    }

    let series = state
        .monitor
        .latency_series(query.target_id, query.date.as_deref());
    let body = json!({ "success": true, "latencyData": series });
    state.monitor.cache().put(&key, body.clone());
    Ok(Json(body))
}

pub async fn target_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    const KEY: &str = "target-status";
    if let Some(cached) = state.monitor.cache().get(KEY) {
        return Ok(Json(cached));
    }

    let statuses = state.monitor.statuses();
    let current: Vec<StatusEntry> = statuses
        .into_iter()
        .map(|(target_id, status)| StatusEntry {
            target_id,
            name: state.targets.get(target_id).map(|t| t.name),
            is_down: status.is_down,
            agents_reporting: status.agents_reporting,
            last_updated: status.last_updated,
        })
        .collect();
    let down = current.iter().filter(|s| s.is_down).count();
    let summary = StatusSummary {
        total: current.len(),
        up: current.len() - down,
        down,
    };

    let body = json!({ "success": true, "currentStatus": current, "summary": summary });
    state.monitor.cache().put(KEY, body.clone());
    Ok(Json(body))
}

pub async fn reset_uptime(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.monitor.reset()?;
    Ok(Json(json!({ "success": true })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForceCheckQuery {
    pub target_id: Option<u64>,
}

pub async fn force_check(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ForceCheckQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.monitor.recheck(query.target_id);
    Ok(Json(json!({ "success": true })))
}
