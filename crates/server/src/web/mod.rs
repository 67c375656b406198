//! HTTP API surface of the coordinator.
//!
//! All bodies are JSON with a `success` flag. The four mutating
//! agent/admin routes require the shared `x-api-key` secret; everything
//! else is open to the dashboard. CORS is wide open by design.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    http::Method,
    middleware as axum_middleware,
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::monitor::MonitorEngine;
use crate::registry::AgentRegistry;
use crate::targets::TargetConfigManager;

pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;

use routes::{agent_routes, metrics_routes, results_routes, target_routes, uptime_routes};

pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub targets: Arc<TargetConfigManager>,
    pub registry: Arc<AgentRegistry>,
    pub monitor: Arc<MonitorEngine>,
    /// Opaque per-process id handed to agents at registration.
    pub server_id: String,
    pub started_at: Instant,
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let require_key =
        axum_middleware::from_fn_with_state(state.clone(), middleware::require_api_key);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(vec![
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    Router::new()
        .route(
            "/api/register",
            post(agent_routes::register).route_layer(require_key.clone()),
        )
        .route(
            "/api/heartbeat",
            post(agent_routes::heartbeat).route_layer(require_key.clone()),
        )
        .route("/api/agents", get(agent_routes::list_agents))
        .route(
            "/api/targets",
            get(target_routes::list_targets).post(target_routes::upsert_target),
        )
        .route("/api/targets/check-updates", get(target_routes::check_updates))
        .route("/api/targets/{id}", delete(target_routes::delete_target))
        .route("/api/targets/{id}/uptime", get(target_routes::target_uptime))
        .route(
            "/api/results",
            get(results_routes::raw_results).post(results_routes::submit_results),
        )
        .route("/api/uptime", get(uptime_routes::uptime))
        .route(
            "/api/uptime/reset",
            post(uptime_routes::reset_uptime).route_layer(require_key.clone()),
        )
        .route(
            "/api/uptime/check",
            post(uptime_routes::force_check).route_layer(require_key),
        )
        .route("/api/latency", get(uptime_routes::latency))
        .route("/api/target-status", get(uptime_routes::target_status))
        .route("/metrics", get(metrics_routes::metrics))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
