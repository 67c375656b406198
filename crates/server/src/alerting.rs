//! Best-effort outbound alerting.
//!
//! Alerts are fire-and-forget: the webhook POST runs on its own task and
//! failures are logged and swallowed, so the aggregation path can never
//! block or fail on a slow sink. Without a configured URL every call is a
//! silent no-op.

use std::time::Duration;

use serde_json::json;
use tracing::{debug, warn};

use storm_common::Target;

pub struct AlertSink {
    client: reqwest::Client,
    webhook_url: Option<String>,
}

impl AlertSink {
    pub fn new(webhook_url: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap(); // default settings cannot fail
        AlertSink {
            client,
            webhook_url,
        }
    }

    /// Post `message` to the configured webhook, tagging the target and
    /// agent when known.
    pub fn send_alert(&self, message: String, target: Option<&Target>, agent: Option<&str>) {
        let Some(url) = self.webhook_url.clone() else {
            debug!("No webhook configured, dropping alert.");
            return;
        };

        let mut body = json!({ "content": message, "username": "Storm" });
        if let Some(target) = target {
            body["target"] = json!({ "id": target.id, "name": target.name });
        }
        if let Some(agent) = agent {
            body["agent"] = json!(agent);
        }

        let client = self.client.clone();
        tokio::spawn(async move {
            match client.post(&url).json(&body).send().await {
                Ok(response) if !response.status().is_success() => {
                    warn!(status = %response.status(), "Alert webhook returned non-success status.");
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "Failed to deliver alert.");
                }
            }
        });
    }
}
