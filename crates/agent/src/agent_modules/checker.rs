//! Probe implementations.
//!
//! Probe failures are data, not faults: every outcome becomes a
//! `CheckResult`, and the scheduler carries on regardless. HTTP probes go
//! through reqwest with redirects disabled so 3xx responses are observable;
//! ICMP probes shell out to the platform ping utility and parse the
//! reported round trip out of its stdout.

use std::process::Stdio;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use chrono::Utc;
use regex::Regex;
use tokio::process::Command;
use tracing::debug;

use storm_common::{CheckResult, Target, TargetKind};

pub struct ProbeClient {
    http: reqwest::Client,
    user_agent: String,
}

impl ProbeClient {
    pub fn new(agent_name: &str) -> Self {
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap(); // default settings cannot fail
        ProbeClient {
            http,
            user_agent: format!("Storm/{agent_name}"),
        }
    }

    /// Run one check against `target`, bounded by the target's timeout.
    pub async fn run(&self, target: &Target, agent_id: &str) -> CheckResult {
        let outcome = match target.kind {
            TargetKind::Http => self.check_http(target).await,
            TargetKind::Icmp => check_icmp(target).await,
        };
        debug!(
            target_id = target.id,
            success = outcome.success,
            "Check finished."
        );
        CheckResult {
            target_id: target.id,
            agent_id: agent_id.to_string(),
            timestamp: Utc::now().timestamp_millis(),
            ..outcome
        }
    }

    async fn check_http(&self, target: &Target) -> CheckResult {
        let timeout = Duration::from_millis(target.timeout_ms);
        let started = Instant::now();
        let sent = self
            .http
            .get(&target.endpoint)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .timeout(timeout)
            .send()
            .await;

        match sent {
            Ok(response) => {
                let elapsed = started.elapsed().as_secs_f64() * 1000.0;
                let status = response.status();
                let success = status.is_success() || status.is_redirection();
                CheckResult {
                    success,
                    response_time_ms: success.then_some(elapsed),
                    status_code: Some(status.as_u16()),
                    error_text: (!success).then(|| format!("HTTP status {}", status.as_u16())),
                    ..blank()
                }
            }
            Err(e) if e.is_timeout() => CheckResult {
                success: false,
                response_time_ms: None,
                status_code: Some(408),
                error_text: Some(format!("request timed out after {}ms", target.timeout_ms)),
                ..blank()
            },
            Err(e) => CheckResult {
                success: false,
                response_time_ms: None,
                status_code: Some(0),
                error_text: Some(format!("transport error: {e}")),
                ..blank()
            },
        }
    }
}

async fn check_icmp(target: &Target) -> CheckResult {
    let started = Instant::now();
    // Give the utility a grace second over the probe timeout before the
    // whole invocation is cancelled.
    let bound = Duration::from_millis(target.timeout_ms + 1000);
    let run = tokio::time::timeout(
        bound,
        ping_command(&target.endpoint, target.timeout_ms).output(),
    )
    .await;

    match run {
        Err(_) => CheckResult {
            success: false,
            response_time_ms: None,
            status_code: None,
            error_text: Some(format!("ping timed out after {}ms", target.timeout_ms)),
            ..blank()
        },
        Ok(Err(e)) => CheckResult {
            success: false,
            response_time_ms: None,
            status_code: None,
            error_text: Some(format!("failed to execute ping: {e}")),
            ..blank()
        },
        Ok(Ok(output)) => {
            if output.status.success() {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let elapsed = started.elapsed().as_secs_f64() * 1000.0;
                let rtt = parse_ping_time_ms(&stdout).unwrap_or(elapsed);
                CheckResult {
                    success: true,
                    response_time_ms: Some(rtt),
                    status_code: None,
                    error_text: None,
                    ..blank()
                }
            } else {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let stdout = String::from_utf8_lossy(&output.stdout);
                let detail = if stderr.trim().is_empty() { stdout } else { stderr };
                CheckResult {
                    success: false,
                    response_time_ms: None,
                    status_code: None,
                    error_text: Some(format!("ping failed: {}", detail.trim())),
                    ..blank()
                }
            }
        }
    }
}

/// One echo request with the platform's timeout flag: whole seconds
/// (rounded up) on POSIX, milliseconds on Windows.
#[cfg(not(windows))]
fn ping_command(host: &str, timeout_ms: u64) -> Command {
    let mut cmd = Command::new("ping");
    cmd.args(["-c", "1", "-W", &posix_timeout_secs(timeout_ms).to_string(), host])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    cmd
}

#[cfg(windows)]
fn ping_command(host: &str, timeout_ms: u64) -> Command {
    let mut cmd = Command::new("ping");
    cmd.args(["-n", "1", "-w", &timeout_ms.to_string(), host])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    cmd
}

fn posix_timeout_secs(timeout_ms: u64) -> u64 {
    timeout_ms.div_ceil(1000).max(1)
}

/// Pull the reported round trip out of ping's stdout: `time=12.3 ms` on
/// most platforms, a bare `12ms` on some. None means the caller should
/// fall back to wall-clock elapsed time.
fn parse_ping_time_ms(stdout: &str) -> Option<f64> {
    static TIME_RE: OnceLock<Regex> = OnceLock::new();
    let time_re = TIME_RE.get_or_init(|| Regex::new(r"time[=<]([0-9.]+)\s*ms").unwrap());
    if let Some(caps) = time_re.captures(stdout) {
        return caps[1].parse().ok();
    }

    static BARE_RE: OnceLock<Regex> = OnceLock::new();
    let bare_re = BARE_RE.get_or_init(|| Regex::new(r"([0-9][0-9.]*)\s*ms").unwrap());
    bare_re
        .captures(stdout)
        .and_then(|caps| caps[1].parse().ok())
}

fn blank() -> CheckResult {
    CheckResult {
        target_id: 0,
        agent_id: String::new(),
        timestamp: 0,
        success: false,
        response_time_ms: None,
        status_code: None,
        error_text: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_linux_ping_output() {
        let out = "64 bytes from 8.8.8.8: icmp_seq=1 ttl=117 time=12.345 ms";
        assert_eq!(parse_ping_time_ms(out), Some(12.345));
    }

    #[test]
    fn parses_sub_millisecond_output() {
        let out = "64 bytes from 127.0.0.1: icmp_seq=1 ttl=64 time<1 ms";
        assert_eq!(parse_ping_time_ms(out), Some(1.0));
    }

    #[test]
    fn parses_bare_millisecond_output() {
        let out = "Reply from 10.0.0.1: bytes=32 42ms TTL=56";
        assert_eq!(parse_ping_time_ms(out), Some(42.0));
    }

    #[test]
    fn unparsable_output_is_none() {
        assert_eq!(parse_ping_time_ms("no round trip here"), None);
    }

    #[test]
    fn posix_timeout_rounds_up_to_whole_seconds() {
        assert_eq!(posix_timeout_secs(1), 1);
        assert_eq!(posix_timeout_secs(1000), 1);
        assert_eq!(posix_timeout_secs(1001), 2);
        assert_eq!(posix_timeout_secs(2500), 3);
    }
}
