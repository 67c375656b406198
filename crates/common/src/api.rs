//! Request and response bodies for the coordinator HTTP API.
//!
//! Every response carries a `success` flag; error responses are
//! `{ "success": false, "error": "…" }` and are produced coordinator-side.

use serde::{Deserialize, Serialize};

use crate::types::{AgentInfo, CheckResult, Target};

/// Header carrying the shared API secret.
pub const API_KEY_HEADER: &str = "x-api-key";
/// Header identifying the calling agent.
pub const AGENT_ID_HEADER: &str = "x-agent-id";

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub name: String,
    pub location: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub success: bool,
    pub agent_id: String,
    /// Opaque id of the coordinator process, fresh per start.
    pub server_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatResponse {
    pub success: bool,
    pub timestamp: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TargetsResponse {
    pub success: bool,
    pub targets: Vec<Target>,
    /// TargetSetVersion: unix milliseconds of the last accepted reload.
    pub last_updated: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CheckUpdatesResponse {
    pub success: bool,
    pub has_updates: bool,
    pub last_updated: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResultsRequest {
    pub results: Vec<CheckResult>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResultsResponse {
    pub success: bool,
    pub received: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AgentsResponse {
    pub success: bool,
    pub agents: Vec<AgentInfo>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}
