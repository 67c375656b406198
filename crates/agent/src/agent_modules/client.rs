//! HTTP client for the coordinator API.
//!
//! Register, target fetch and result submission retry up to three times
//! with exponential backoff capped at ten seconds; every request carries a
//! ten-second timeout. A distinct unknown-agent rejection makes the client
//! re-register and reclaim its id before giving up.

use std::sync::RwLock;
use std::time::Duration;

use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{info, warn};

use storm_common::{
    CheckResult, CheckUpdatesResponse, ErrorResponse, HeartbeatResponse, RegisterRequest,
    RegisterResponse, SubmitResultsRequest, SubmitResultsResponse, Target, TargetsResponse,
    AGENT_ID_HEADER, API_KEY_HEADER,
};

use crate::agent_modules::config::AgentConfig;

const MAX_ATTEMPTS: u32 = 3;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Backoff before retry `n` (zero-based): `min(1000 · 2^n, 10000)` ms.
pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_millis((1000u64 << attempt.min(16)).min(10_000))
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("coordinator rejected request: {0}")]
    Rejected(String),
    #[error("coordinator does not know this agent")]
    UnknownAgent,
}

pub struct CoordinatorClient {
    http: reqwest::Client,
    base_url: String,
    name: String,
    location: String,
    agent_id: RwLock<String>,
}

impl CoordinatorClient {
    pub fn new(config: &AgentConfig) -> Result<Self, ClientError> {
        let mut headers = reqwest::header::HeaderMap::new();
        let mut key = reqwest::header::HeaderValue::from_str(&config.api_key)
            .map_err(|_| ClientError::Rejected("API_KEY is not a valid header value".to_string()))?;
        key.set_sensitive(true);
        headers.insert(API_KEY_HEADER, key);

        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .default_headers(headers)
            .build()?;

        Ok(CoordinatorClient {
            http,
            base_url: config.server_url.clone(),
            name: config.name.clone(),
            location: config.location.clone(),
            agent_id: RwLock::new(String::new()),
        })
    }

    pub fn agent_id(&self) -> String {
        self.agent_id.read().unwrap().clone()
    }

    /// Register (or reclaim the id for) this agent. Retries with backoff.
    pub async fn register(&self) -> Result<String, ClientError> {
        let body = RegisterRequest {
            name: self.name.clone(),
            location: self.location.clone(),
        };
        let response: RegisterResponse = self
            .with_retries("register", || async {
                let response = self
                    .http
                    .post(format!("{}/api/register", self.base_url))
                    .json(&body)
                    .send()
                    .await?;
                parse_response(response).await
            })
            .await?;

        info!(agent_id = %response.agent_id, server_id = %response.server_id, "Registered with coordinator.");
        *self.agent_id.write().unwrap() = response.agent_id.clone();
        Ok(response.agent_id)
    }

    /// Fetch the full target list and its version. Retries with backoff.
    pub async fn fetch_targets(&self) -> Result<(Vec<Target>, i64), ClientError> {
        let response: TargetsResponse = self
            .with_retries("fetch-targets", || async {
                let response = self
                    .http
                    .get(format!("{}/api/targets", self.base_url))
                    .header(AGENT_ID_HEADER, self.agent_id())
                    .send()
                    .await?;
                parse_response(response).await
            })
            .await?;
        Ok((response.targets, response.last_updated))
    }

    /// Cheap change poll. Single attempt; the poller runs on a timer anyway.
    pub async fn check_updates(&self, last_checked: i64) -> Result<CheckUpdatesResponse, ClientError> {
        let response = self
            .http
            .get(format!(
                "{}/api/targets/check-updates?lastChecked={last_checked}",
                self.base_url
            ))
            .header(AGENT_ID_HEADER, self.agent_id())
            .send()
            .await?;
        parse_response(response).await
    }

    /// Refresh liveness. Re-registers once if the coordinator lost us.
    pub async fn heartbeat(&self) -> Result<(), ClientError> {
        let send = || async {
            let response = self
                .http
                .post(format!("{}/api/heartbeat", self.base_url))
                .header(AGENT_ID_HEADER, self.agent_id())
                .send()
                .await?;
            parse_response::<HeartbeatResponse>(response).await
        };

        match send().await {
            Err(ClientError::UnknownAgent) => {
                warn!("Coordinator does not know this agent, re-registering.");
                self.register().await?;
                send().await.map(|_| ())
            }
            other => other.map(|_| ()),
        }
    }

    /// Submit a batch of results. Retries with backoff, re-registering on
    /// an unknown-agent rejection. Callers drop the batch on error.
    pub async fn submit_results(&self, results: &[CheckResult]) -> Result<(), ClientError> {
        let body = SubmitResultsRequest {
            results: results.to_vec(),
        };
        let outcome = self
            .with_retries("submit-results", || async {
                let response = self
                    .http
                    .post(format!("{}/api/results", self.base_url))
                    .header(AGENT_ID_HEADER, self.agent_id())
                    .json(&body)
                    .send()
                    .await?;
                parse_response::<SubmitResultsResponse>(response).await
            })
            .await;

        match outcome {
            Err(ClientError::UnknownAgent) => {
                warn!("Coordinator does not know this agent, re-registering.");
                self.register().await?;
                let response = self
                    .http
                    .post(format!("{}/api/results", self.base_url))
                    .header(AGENT_ID_HEADER, self.agent_id())
                    .json(&body)
                    .send()
                    .await?;
                parse_response::<SubmitResultsResponse>(response).await.map(|_| ())
            }
            other => other.map(|_| ()),
        }
    }

    /// Run `operation` up to [`MAX_ATTEMPTS`] times. Unknown-agent
    /// rejections abort immediately so the caller can re-register.
    async fn with_retries<T, F, Fut>(&self, what: &str, operation: F) -> Result<T, ClientError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, ClientError>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e @ ClientError::UnknownAgent) => return Err(e),
                Err(e) => {
                    attempt += 1;
                    if attempt >= MAX_ATTEMPTS {
                        return Err(e);
                    }
                    let delay = backoff_delay(attempt - 1);
                    warn!(
                        operation = what,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Request failed, backing off."
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

async fn parse_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json::<T>().await?);
    }
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorResponse>(&text)
        .map(|e| e.error)
        .unwrap_or_else(|_| format!("HTTP {status}"));
    if message.contains("unknown agent") {
        Err(ClientError::UnknownAgent)
    } else {
        Err(ClientError::Rejected(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(backoff_delay(0), Duration::from_millis(1000));
        assert_eq!(backoff_delay(1), Duration::from_millis(2000));
        assert_eq!(backoff_delay(2), Duration::from_millis(4000));
        assert_eq!(backoff_delay(4), Duration::from_millis(10_000));
        assert_eq!(backoff_delay(63), Duration::from_millis(10_000));
    }
}
