//! Per-target check scheduling.
//!
//! Every target gets its own task: an immediate first check, then a ticker
//! at the target's interval. The check runs inline in the task, so checks
//! for one target never overlap; a check outlasting its interval simply
//! absorbs the missed ticks. Targets are independent of each other.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use storm_common::Target;

use crate::agent_modules::checker::ProbeClient;
use crate::agent_modules::client::CoordinatorClient;

pub struct CheckScheduler {
    tasks: HashMap<u64, (JoinHandle<()>, oneshot::Sender<()>)>,
}

impl CheckScheduler {
    pub fn new() -> Self {
        CheckScheduler {
            tasks: HashMap::new(),
        }
    }

    /// Spawn one checker task per target. Call [`stop_all`] first when
    /// replacing a previous set.
    ///
    /// [`stop_all`]: CheckScheduler::stop_all
    pub fn start_all(
        &mut self,
        targets: &[Target],
        client: &Arc<CoordinatorClient>,
        agent_name: &str,
    ) {
        for target in targets {
            let (handle, shutdown_tx) =
                spawn_check_task(target.clone(), client.clone(), agent_name.to_string());
            self.tasks.insert(target.id, (handle, shutdown_tx));
        }
        info!(count = self.tasks.len(), "Check schedulers started.");
    }

    /// Signal every checker task to stop and forget them.
    pub fn stop_all(&mut self) {
        for (target_id, (_, shutdown_tx)) in self.tasks.drain() {
            if shutdown_tx.send(()).is_err() {
                warn!(target_id, "Checker task was already gone at shutdown.");
            }
        }
    }
}

fn spawn_check_task(
    target: Target,
    client: Arc<CoordinatorClient>,
    agent_name: String,
) -> (JoinHandle<()>, oneshot::Sender<()>) {
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
    let handle = tokio::spawn(async move {
        // Small start jitter so a large target set does not probe in
        // lockstep after a restart.
        let jitter = rand::random::<u64>() % 250;
        tokio::time::sleep(Duration::from_millis(jitter)).await;

        let probe = ProbeClient::new(&agent_name);
        let mut interval = tokio::time::interval(Duration::from_millis(target.interval_ms.max(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(target_id = target.id, name = %target.name, kind = %target.kind, "Checker task started.");

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown_rx => {
                    info!(target_id = target.id, "Checker task received shutdown signal.");
                    break;
                }

                _ = interval.tick() => {
                    let result = probe.run(&target, &client.agent_id()).await;
                    if let Err(e) = client.submit_results(std::slice::from_ref(&result)).await {
                        // No spill buffer: after exhausted retries the
                        // observation is gone.
                        error!(
                            target_id = target.id,
                            timestamp = result.timestamp,
                            error = %e,
                            "DROPPING check result after exhausted retries."
                        );
                    }
                }
            }
        }
    });
    (handle, shutdown_tx)
}
