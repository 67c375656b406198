//! Agent registry and liveness tracking.
//!
//! Agents are keyed by a coordinator-minted id of the form `agent-<N>`.
//! The name is the stable identity: re-registering with a previously seen
//! name reclaims the old id, so an agent keeps its history across restarts
//! on both sides. Every persisted agent starts a coordinator run as
//! offline until it heartbeats again.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Duration;
use tracing::{error, info, warn};

use storm_common::{AgentInfo, AgentStatus};

use crate::persist::{self, PersistError};

/// How often the liveness sweep runs.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(30);
/// An agent silent for longer than this is flipped offline by the sweep.
pub const OFFLINE_THRESHOLD_MS: i64 = 120_000;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("unknown agent: {0}")]
    UnknownAgent(String),
    #[error(transparent)]
    Persist(#[from] PersistError),
}

#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct AgentsFile {
    agents: Vec<AgentInfo>,
    #[serde(default)]
    next_id: u64,
}

struct RegistryState {
    agents: HashMap<String, AgentInfo>,
    next_id: u64,
}

pub struct AgentRegistry {
    path: PathBuf,
    inner: RwLock<RegistryState>,
}

impl AgentRegistry {
    /// Load the persisted registry, resetting every agent to offline.
    pub fn load(path: PathBuf) -> Result<Self, PersistError> {
        let file = persist::load_json::<AgentsFile>(&path)?.unwrap_or_default();

        let mut agents = HashMap::new();
        let mut max_seen = 0u64;
        for mut agent in file.agents {
            if let Some(n) = parse_agent_number(&agent.id) {
                max_seen = max_seen.max(n);
            }
            agent.status = AgentStatus::Offline;
            agents.insert(agent.id.clone(), agent);
        }
        let next_id = file.next_id.max(max_seen + 1);

        info!(count = agents.len(), path = %path.display(), "Loaded agent registry.");
        Ok(AgentRegistry {
            path,
            inner: RwLock::new(RegistryState { agents, next_id }),
        })
    }

    /// Register an agent, reclaiming its id when the name is known.
    pub fn register(&self, name: &str, location: &str) -> Result<AgentInfo, RegistryError> {
        let mut state = self.inner.write().unwrap();
        let now = Utc::now().timestamp_millis();

        let existing_id = state
            .agents
            .values()
            .find(|a| a.name == name)
            .map(|a| a.id.clone());

        let agent = match existing_id {
            Some(id) => {
                let agent = state.agents.get_mut(&id).unwrap();
                agent.location = location.to_string();
                agent.status = AgentStatus::Online;
                agent.last_seen = now;
                info!(agent_id = %id, name = %name, "Agent reconnected.");
                agent.clone()
            }
            None => {
                let id = format!("agent-{}", state.next_id);
                state.next_id += 1;
                let agent = AgentInfo {
                    id: id.clone(),
                    name: name.to_string(),
                    location: location.to_string(),
                    status: AgentStatus::Online,
                    last_seen: now,
                };
                state.agents.insert(id.clone(), agent.clone());
                info!(agent_id = %id, name = %name, location = %location, "Registered new agent.");
                agent
            }
        };

        self.persist(&state)?;
        Ok(agent)
    }

    /// Refresh liveness for a known agent. Returns the heartbeat timestamp.
    pub fn heartbeat(&self, agent_id: &str) -> Result<i64, RegistryError> {
        let mut state = self.inner.write().unwrap();
        let now = Utc::now().timestamp_millis();
        let agent = state
            .agents
            .get_mut(agent_id)
            .ok_or_else(|| RegistryError::UnknownAgent(agent_id.to_string()))?;
        agent.status = AgentStatus::Online;
        agent.last_seen = now;
        self.persist(&state)?;
        Ok(now)
    }

    /// Whether the id belongs to a registered agent.
    pub fn is_known(&self, agent_id: &str) -> bool {
        self.inner.read().unwrap().agents.contains_key(agent_id)
    }

    pub fn list(&self) -> Vec<AgentInfo> {
        let state = self.inner.read().unwrap();
        let mut agents: Vec<AgentInfo> = state.agents.values().cloned().collect();
        agents.sort_by(|a, b| a.id.cmp(&b.id));
        agents
    }

    pub fn online_count(&self) -> usize {
        self.inner
            .read()
            .unwrap()
            .agents
            .values()
            .filter(|a| a.status == AgentStatus::Online)
            .count()
    }

    /// Flip agents that have gone silent to offline. This sweep is the only
    /// place an online agent becomes offline.
    pub fn sweep(&self, threshold_ms: i64) {
        let mut state = self.inner.write().unwrap();
        let now = Utc::now().timestamp_millis();
        let mut changed = false;
        for agent in state.agents.values_mut() {
            if agent.status == AgentStatus::Online && now - agent.last_seen > threshold_ms {
                warn!(agent_id = %agent.id, name = %agent.name, "Agent timed out, marking offline.");
                agent.status = AgentStatus::Offline;
                changed = true;
            }
        }
        if changed {
            if let Err(e) = self.persist(&state) {
                error!(error = %e, "Failed to persist registry after liveness sweep.");
            }
        }
    }

    /// Periodic liveness sweep task. Never exits.
    pub async fn run_sweep(self: Arc<Self>) {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        info!("Agent liveness sweep started.");
        loop {
            interval.tick().await;
            self.sweep(OFFLINE_THRESHOLD_MS);
        }
    }

    fn persist(&self, state: &RegistryState) -> Result<(), PersistError> {
        let mut agents: Vec<AgentInfo> = state.agents.values().cloned().collect();
        agents.sort_by(|a, b| a.id.cmp(&b.id));
        persist::store_json(
            &self.path,
            &AgentsFile {
                agents,
                next_id: state.next_id,
            },
        )
    }
}

fn parse_agent_number(id: &str) -> Option<u64> {
    id.strip_prefix("agent-")?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_mints_monotonic_ids() {
        let dir = tempfile::tempdir().unwrap();
        let registry = AgentRegistry::load(dir.path().join("agents.json")).unwrap();
        let a = registry.register("eu-1", "Frankfurt").unwrap();
        let b = registry.register("us-1", "Dallas").unwrap();
        assert_eq!(a.id, "agent-1");
        assert_eq!(b.id, "agent-2");
    }

    #[test]
    fn reconnect_reclaims_id_across_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agents.json");
        {
            let registry = AgentRegistry::load(path.clone()).unwrap();
            let a = registry.register("eu-1", "Frankfurt").unwrap();
            assert_eq!(a.id, "agent-1");
        }

        // Restart: everyone starts offline, ids are not recycled.
        let registry = AgentRegistry::load(path).unwrap();
        let listed = registry.list();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].status, AgentStatus::Offline);

        let again = registry.register("eu-1", "Frankfurt").unwrap();
        assert_eq!(again.id, "agent-1");
        assert_eq!(again.status, AgentStatus::Online);

        let fresh = registry.register("ap-1", "Tokyo").unwrap();
        assert_eq!(fresh.id, "agent-2");
    }

    #[test]
    fn heartbeat_for_unknown_agent_is_a_distinct_error() {
        let dir = tempfile::tempdir().unwrap();
        let registry = AgentRegistry::load(dir.path().join("agents.json")).unwrap();
        let err = registry.heartbeat("agent-9").unwrap_err();
        assert!(matches!(err, RegistryError::UnknownAgent(_)));
    }

    #[test]
    fn sweep_flips_stale_agents_offline() {
        let dir = tempfile::tempdir().unwrap();
        let registry = AgentRegistry::load(dir.path().join("agents.json")).unwrap();
        let a = registry.register("eu-1", "Frankfurt").unwrap();

        // Fresh heartbeat survives the sweep.
        registry.sweep(OFFLINE_THRESHOLD_MS);
        assert_eq!(registry.online_count(), 1);

        // Backdate the agent past the threshold, then sweep again.
        {
            let mut state = registry.inner.write().unwrap();
            state.agents.get_mut(&a.id).unwrap().last_seen -= OFFLINE_THRESHOLD_MS + 1;
        }
        registry.sweep(OFFLINE_THRESHOLD_MS);
        assert_eq!(registry.online_count(), 0);
    }
}
