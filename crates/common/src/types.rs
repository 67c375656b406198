use serde::{Deserialize, Serialize};

/// Probe flavour for a monitoring target.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Http,
    Icmp,
}

impl std::fmt::Display for TargetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetKind::Http => write!(f, "http"),
            TargetKind::Icmp => write!(f, "icmp"),
        }
    }
}

/// A network endpoint to be probed.
///
/// For `http` targets `endpoint` is a full URL; for `icmp` targets it is a
/// bare hostname or IP address.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    pub id: u64,
    pub name: String,
    pub kind: TargetKind,
    pub endpoint: String,
    pub interval_ms: u64,
    pub timeout_ms: u64,
}

impl Target {
    /// Check the structural rules that every target must satisfy.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err(format!("target {}: name must not be empty", self.id));
        }
        if self.endpoint.trim().is_empty() {
            return Err(format!("target {}: endpoint must not be empty", self.id));
        }
        if self.kind == TargetKind::Http
            && !self.endpoint.starts_with("http://")
            && !self.endpoint.starts_with("https://")
        {
            return Err(format!(
                "target {}: http endpoint must be an http(s) URL",
                self.id
            ));
        }
        if self.interval_ms == 0 {
            return Err(format!("target {}: intervalMs must be > 0", self.id));
        }
        if self.timeout_ms == 0 {
            return Err(format!("target {}: timeoutMs must be > 0", self.id));
        }
        if self.timeout_ms > self.interval_ms {
            return Err(format!(
                "target {}: timeoutMs must not exceed intervalMs",
                self.id
            ));
        }
        Ok(())
    }
}

/// Liveness state of a registered agent.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Online,
    Offline,
}

/// A remote probing worker as tracked by the coordinator.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AgentInfo {
    pub id: String,
    pub name: String,
    pub location: String,
    pub status: AgentStatus,
    /// Unix milliseconds of the last register/heartbeat.
    pub last_seen: i64,
}

/// One probe observation, as submitted by an agent. Immutable once created.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    pub target_id: u64,
    pub agent_id: String,
    /// Unix milliseconds at which the check ran.
    pub timestamp: i64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(kind: TargetKind, endpoint: &str, interval: u64, timeout: u64) -> Target {
        Target {
            id: 1,
            name: "example".to_string(),
            kind,
            endpoint: endpoint.to_string(),
            interval_ms: interval,
            timeout_ms: timeout,
        }
    }

    #[test]
    fn validate_accepts_reasonable_targets() {
        assert!(target(TargetKind::Http, "https://example.com", 60_000, 5_000)
            .validate()
            .is_ok());
        assert!(target(TargetKind::Icmp, "example.com", 30_000, 2_000)
            .validate()
            .is_ok());
        // interval == timeout is the boundary and is allowed
        assert!(target(TargetKind::Http, "http://example.com", 5_000, 5_000)
            .validate()
            .is_ok());
    }

    #[test]
    fn validate_rejects_bad_targets() {
        assert!(target(TargetKind::Http, "example.com", 60_000, 5_000)
            .validate()
            .is_err());
        assert!(target(TargetKind::Http, "https://example.com", 0, 5_000)
            .validate()
            .is_err());
        assert!(target(TargetKind::Http, "https://example.com", 60_000, 0)
            .validate()
            .is_err());
        assert!(target(TargetKind::Icmp, "example.com", 1_000, 2_000)
            .validate()
            .is_err());
        assert!(target(TargetKind::Icmp, "  ", 1_000, 500).validate().is_err());
    }

    #[test]
    fn check_result_wire_format_is_camel_case() {
        let r = CheckResult {
            target_id: 7,
            agent_id: "agent-1".to_string(),
            timestamp: 1_700_000_000_000,
            success: true,
            response_time_ms: Some(12.5),
            status_code: Some(200),
            error_text: None,
        };
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["targetId"], 7);
        assert_eq!(v["agentId"], "agent-1");
        assert_eq!(v["responseTimeMs"], 12.5);
        assert!(v.get("errorText").is_none());
    }
}
