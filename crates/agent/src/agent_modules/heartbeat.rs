use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::agent_modules::client::CoordinatorClient;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Fixed-interval heartbeat. Failures are logged and retried at the next
/// tick; the client re-registers by itself if the coordinator lost us.
pub async fn heartbeat_loop(client: Arc<CoordinatorClient>, mut shutdown_rx: watch::Receiver<()>) {
    let mut interval = tokio::time::interval(HEARTBEAT_INTERVAL);
    loop {
        tokio::select! {
            biased;

            _ = shutdown_rx.changed() => {
                info!("Heartbeat loop received shutdown signal.");
                break;
            }

            _ = interval.tick() => {
                match client.heartbeat().await {
                    Ok(()) => debug!("Heartbeat acknowledged."),
                    Err(e) => warn!(error = %e, "Heartbeat failed."),
                }
            }
        }
    }
}
