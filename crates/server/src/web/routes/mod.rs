pub mod agent_routes;
pub mod metrics_routes;
pub mod results_routes;
pub mod target_routes;
pub mod uptime_routes;
