//! Target-update polling.
//!
//! The coordinator never pushes: every two minutes the agent asks whether
//! the target set version moved. On a change it stops every checker task,
//! re-fetches the full list and starts fresh tasks. Stop-then-restart is
//! deliberate: simpler than diffing and it cannot leave old and new
//! intervals running side by side.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::agent_modules::client::CoordinatorClient;
use crate::agent_modules::scheduler::CheckScheduler;

pub const POLL_INTERVAL: Duration = Duration::from_secs(120);

/// One poll cycle. `last_version` advances only after a successful
/// re-fetch, so a failed refresh is retried at the next cycle.
pub async fn poll_once(
    client: &Arc<CoordinatorClient>,
    scheduler: &mut CheckScheduler,
    agent_name: &str,
    last_version: &mut i64,
) {
    let response = match client.check_updates(*last_version).await {
        Ok(response) => response,
        Err(e) => {
            warn!(error = %e, "Target update check failed.");
            return;
        }
    };
    if !response.has_updates {
        debug!("Target set unchanged.");
        return;
    }

    info!(last_updated = response.last_updated, "Target set changed, restarting schedulers.");
    scheduler.stop_all();
    match client.fetch_targets().await {
        Ok((targets, version)) => {
            *last_version = version;
            scheduler.start_all(&targets, client, agent_name);
        }
        Err(e) => {
            error!(error = %e, "Failed to fetch updated targets; retrying at the next poll.");
        }
    }
}
