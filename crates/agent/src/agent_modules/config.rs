use std::env;

use sysinfo::System;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required config: `{0}`")]
    Missing(&'static str),
    #[error("Invalid value for `{0}`: {1}")]
    Invalid(&'static str, String),
}

/// Agent configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Coordinator base URL, without a trailing slash.
    pub server_url: String,
    pub api_key: String,
    /// Stable identity used to reclaim the agent id on reconnect.
    pub name: String,
    pub location: String,
    /// Informational only; per-target intervals govern scheduling.
    pub check_interval_ms: Option<u64>,
}

impl AgentConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let server_url = env::var("SERVER_URL")
            .map_err(|_| ConfigError::Missing("SERVER_URL"))?
            .trim_end_matches('/')
            .to_string();
        let api_key = env::var("API_KEY").map_err(|_| ConfigError::Missing("API_KEY"))?;

        let name = env::var("AGENT_NAME")
            .ok()
            .filter(|n| !n.trim().is_empty())
            .or_else(System::host_name)
            .unwrap_or_else(|| "storm-agent".to_string());

        let location = env::var("AGENT_LOCATION")
            .ok()
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| "Unknown".to_string());

        let check_interval_ms = match env::var("CHECK_INTERVAL") {
            Ok(raw) => Some(
                raw.parse::<u64>()
                    .map_err(|_| ConfigError::Invalid("CHECK_INTERVAL", raw))?,
            ),
            Err(_) => None,
        };

        Ok(AgentConfig {
            server_url,
            api_key,
            name,
            location,
            check_interval_ms,
        })
    }
}
