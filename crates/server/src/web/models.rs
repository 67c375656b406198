//! Response models for the dashboard-facing endpoints.

use std::collections::HashMap;

use serde::Serialize;

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct StatusEntry {
    pub target_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub is_down: bool,
    pub agents_reporting: HashMap<String, bool>,
    pub last_updated: i64,
}

#[derive(Serialize, Debug, Clone, Copy)]
#[serde(rename_all = "camelCase")]
pub struct StatusSummary {
    pub total: usize,
    pub up: usize,
    pub down: usize,
}

#[derive(Serialize, Debug, Clone, Copy)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub success: bool,
    pub agents: usize,
    pub online_agents: usize,
    pub targets: usize,
    pub open_incidents: usize,
    pub uptime_seconds: u64,
}
