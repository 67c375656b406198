//! The results aggregator and incident engine.
//!
//! Every submitted check result flows through [`MonitorEngine::submit`]:
//! response times fold into 30-minute buckets, the per-agent report map is
//! updated, target consensus is re-evaluated and the per-(agent, target)
//! incident state machine advances. The whole store persists after each
//! batch and is reconstituted from disk on startup.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};

use storm_common::CheckResult;

use crate::alerting::AlertSink;
use crate::monitor::cache::QueryCache;
use crate::monitor::records::{
    local_date_string, local_day_bounds, DailyRecord, ResultsTree,
};
use crate::monitor::uptime::{fused_downtime_ms, round2, window_uptime_percent};
use crate::persist::{self, PersistError};
use crate::targets::TargetConfigManager;

/// Agents that must report a target down before consensus flips, once two
/// or more agents are reporting it at all. A lone reporter is trusted
/// unilaterally.
pub const MIN_AGENTS_FOR_DOWNTIME: usize = 2;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Derived per-target view: consensus flag plus the raw per-agent reports.
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TargetStatus {
    pub is_down: bool,
    /// agentId → that agent's latest report (true = down).
    pub agents_reporting: HashMap<String, bool>,
    pub last_updated: i64,
}

impl TargetStatus {
    fn new(now: i64) -> Self {
        TargetStatus {
            is_down: false,
            agents_reporting: HashMap::new(),
            last_updated: now,
        }
    }
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct LatencyPoint {
    pub timestamp: i64,
    pub value: f64,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UptimeWindows {
    pub day: f64,
    pub week: f64,
    pub month: f64,
    pub year: f64,
}

/// Per-target aggregate for one local day, fused across agents.
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TargetDailySummary {
    pub is_down: bool,
    pub downtime_ms: i64,
    pub uptime_percentage: f64,
    pub avg_response_time: Option<f64>,
    pub agent_reports: HashMap<String, bool>,
}

struct MonitorState {
    tree: ResultsTree,
    statuses: HashMap<u64, TargetStatus>,
}

pub struct MonitorEngine {
    path: PathBuf,
    min_agents: usize,
    targets: Arc<TargetConfigManager>,
    alerts: Arc<AlertSink>,
    cache: QueryCache,
    inner: RwLock<MonitorState>,
}

impl MonitorEngine {
    /// Load the persisted results tree and rebuild the derived status map
    /// from each pair's most recent daily record.
    pub fn load(
        path: PathBuf,
        targets: Arc<TargetConfigManager>,
        alerts: Arc<AlertSink>,
    ) -> Result<Self, PersistError> {
        let tree = persist::load_json::<ResultsTree>(&path)?.unwrap_or_default();
        let now = Utc::now().timestamp_millis();
        let statuses = rebuild_statuses(&tree, MIN_AGENTS_FOR_DOWNTIME, now);
        info!(
            agents = tree.len(),
            targets = statuses.len(),
            path = %path.display(),
            "Loaded results store."
        );
        Ok(MonitorEngine {
            path,
            min_agents: MIN_AGENTS_FOR_DOWNTIME,
            targets,
            alerts,
            cache: QueryCache::default(),
            inner: RwLock::new(MonitorState { tree, statuses }),
        })
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    /// Ingest a batch of results, in arrival order, then persist and drop
    /// the query cache. Persistence failures are logged; in-memory state is
    /// kept so a later successful write converges.
    pub fn submit(&self, results: &[CheckResult]) -> usize {
        let mut state = self.inner.write().unwrap();
        let now = Utc::now().timestamp_millis();
        for result in results {
            self.process_one(&mut state, result, now);
        }
        if let Err(e) = persist::store_json(&self.path, &state.tree) {
            error!(error = %e, "Failed to persist results store.");
        }
        self.cache.invalidate_all();
        results.len()
    }

    fn process_one(&self, state: &mut MonitorState, result: &CheckResult, now: i64) {
        let date = local_date_string(result.timestamp);

        // 1–2: locate/create the daily record and fold the response time.
        let record = day_record(&mut state.tree, &result.agent_id, result.target_id, &date);
        if result.success {
            if let Some(rt) = result.response_time_ms {
                record.fold_response_time(result.timestamp, rt);
            }
        }

        // 3–4: update this agent's report and re-evaluate consensus.
        let (was_down, is_down, down_agents, total_agents) = {
            let status = state
                .statuses
                .entry(result.target_id)
                .or_insert_with(|| TargetStatus::new(now));
            status
                .agents_reporting
                .insert(result.agent_id.clone(), !result.success);
            let was_down = status.is_down;
            let is_down = consensus(&status.agents_reporting, self.min_agents);
            status.is_down = is_down;
            status.last_updated = now;
            let down_agents: Vec<String> = status
                .agents_reporting
                .iter()
                .filter(|(_, down)| **down)
                .map(|(agent, _)| agent.clone())
                .collect();
            (was_down, is_down, down_agents, status.agents_reporting.len())
        };

        // 5: drive the incident state machine.
        if is_down && !was_down {
            // Consensus flipped down: every agent currently reporting the
            // failure gets an incident stamped with this result's time.
            for agent in &down_agents {
                open_pair(&mut state.tree, agent, result.target_id, &date, result.timestamp);
            }
            let target = self.targets.get(result.target_id);
            let name = target
                .as_ref()
                .map(|t| t.name.clone())
                .unwrap_or_else(|| format!("target {}", result.target_id));
            warn!(
                target_id = result.target_id,
                reporting_down = down_agents.len(),
                reporting_total = total_agents,
                "Consensus flipped to DOWN."
            );
            self.alerts.send_alert(
                format!(
                    "{name} is DOWN ({}/{} agents report failures)",
                    down_agents.len(),
                    total_agents
                ),
                target.as_ref(),
                Some(&result.agent_id),
            );
        } else if !is_down && was_down {
            info!(target_id = result.target_id, agent_id = %result.agent_id, "Consensus flipped to UP.");
            close_pair(&mut state.tree, &result.agent_id, result.target_id, result.timestamp);
        } else if is_down {
            // Already down: the submitter's pair follows the consensus even
            // if its own report was a success.
            open_pair(
                &mut state.tree,
                &result.agent_id,
                result.target_id,
                &date,
                result.timestamp,
            );
        } else {
            // Already up: close a leftover open incident for this pair, if
            // any (the agent recovering after the consensus already did).
            close_pair(&mut state.tree, &result.agent_id, result.target_id, result.timestamp);
        }
    }

    /// Persist the current tree. Used at shutdown.
    pub fn flush(&self) -> Result<(), PersistError> {
        let state = self.inner.read().unwrap();
        persist::store_json(&self.path, &state.tree)
    }

    /// Wipe the persistent store and every derived map.
    pub fn reset(&self) -> Result<(), PersistError> {
        let mut state = self.inner.write().unwrap();
        state.tree.clear();
        state.statuses.clear();
        persist::store_json(&self.path, &state.tree)?;
        self.cache.invalidate_all();
        warn!("Uptime data reset.");
        Ok(())
    }

    /// Recompute consensus from the current report maps and drop the
    /// query cache.
    pub fn recheck(&self, target_id: Option<u64>) {
        let mut state = self.inner.write().unwrap();
        let now = Utc::now().timestamp_millis();
        let min_agents = self.min_agents;
        for (id, status) in state.statuses.iter_mut() {
            if target_id.is_some_and(|t| t != *id) {
                continue;
            }
            status.is_down = consensus(&status.agents_reporting, min_agents);
            status.last_updated = now;
        }
        self.cache.invalidate_all();
    }

    /// Drop daily records older than `retention_days`. Returns how many
    /// records were removed.
    pub fn prune(&self, retention_days: i64) -> usize {
        let cutoff = local_date_string(Utc::now().timestamp_millis() - retention_days * DAY_MS);
        let mut state = self.inner.write().unwrap();
        let mut removed = 0usize;
        for targets in state.tree.values_mut() {
            for days in targets.values_mut() {
                let before = days.len();
                days.retain(|date, _| date.as_str() >= cutoff.as_str());
                removed += before - days.len();
            }
            targets.retain(|_, days| !days.is_empty());
        }
        state.tree.retain(|_, targets| !targets.is_empty());
        if removed > 0 {
            info!(removed, cutoff = %cutoff, "Pruned aged daily records.");
            if let Err(e) = persist::store_json(&self.path, &state.tree) {
                error!(error = %e, "Failed to persist results store after prune.");
            }
            self.cache.invalidate_all();
        }
        removed
    }

    /// Daily retention task. Never exits.
    pub async fn run_prune(self: Arc<Self>, retention_days: i64) {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(24 * 60 * 60));
        loop {
            interval.tick().await;
            self.prune(retention_days);
        }
    }

    // --- Queries ---

    /// agentId → targetId → total downtime on `date`, in ms. Incidents
    /// still open contribute `now − startTime`.
    pub fn daily_downtime_summary(&self, date: &str, now: i64) -> BTreeMap<String, BTreeMap<u64, i64>> {
        let state = self.inner.read().unwrap();
        let mut summary: BTreeMap<String, BTreeMap<u64, i64>> = BTreeMap::new();
        for (agent, targets) in &state.tree {
            for (target, days) in targets {
                let Some(record) = days.get(date) else {
                    continue;
                };
                let open = record.open_incident_start().map(|s| (now - s).max(0)).unwrap_or(0);
                summary
                    .entry(agent.clone())
                    .or_default()
                    .insert(*target, record.downtime_ms + open);
            }
        }
        summary
    }

    /// Response-time series per target, averaged across agents bucket by
    /// bucket, optionally filtered by target and local date.
    pub fn latency_series(
        &self,
        target_filter: Option<u64>,
        date_filter: Option<&str>,
    ) -> BTreeMap<u64, Vec<LatencyPoint>> {
        let state = self.inner.read().unwrap();
        // target → bucket start → (weighted sum, count)
        let mut merged: BTreeMap<u64, BTreeMap<i64, (f64, u64)>> = BTreeMap::new();
        for targets in state.tree.values() {
            for (target, days) in targets {
                if target_filter.is_some_and(|t| t != *target) {
                    continue;
                }
                for (date, record) in days {
                    if date_filter.is_some_and(|d| d != date) {
                        continue;
                    }
                    for bucket in &record.response_time_intervals {
                        let slot = merged
                            .entry(*target)
                            .or_default()
                            .entry(bucket.start_time)
                            .or_insert((0.0, 0));
                        slot.0 += bucket.avg_response_time * bucket.count as f64;
                        slot.1 += bucket.count;
                    }
                }
            }
        }
        merged
            .into_iter()
            .map(|(target, buckets)| {
                let points = buckets
                    .into_iter()
                    .map(|(timestamp, (sum, count))| LatencyPoint {
                        timestamp,
                        value: round2(sum / count as f64),
                    })
                    .collect();
                (target, points)
            })
            .collect()
    }

    /// Uptime percentages over trailing day/week/month/year windows.
    pub fn uptime_windows(&self, target_id: u64, now: i64) -> UptimeWindows {
        let state = self.inner.read().unwrap();
        let pct = |days: i64| {
            window_uptime_percent(
                &state.tree,
                target_id,
                now - days * DAY_MS,
                now,
                self.min_agents,
                now,
            )
        };
        UptimeWindows {
            day: pct(1),
            week: pct(7),
            month: pct(30),
            year: pct(365),
        }
    }

    /// Snapshot of the derived status map, ordered by target id.
    pub fn statuses(&self) -> BTreeMap<u64, TargetStatus> {
        let state = self.inner.read().unwrap();
        state
            .statuses
            .iter()
            .map(|(id, status)| (*id, status.clone()))
            .collect()
    }

    /// The raw tree, filtered. Serves `/api/results`.
    pub fn raw_results(
        &self,
        agent_filter: Option<&str>,
        target_filter: Option<u64>,
        date_filter: Option<&str>,
    ) -> ResultsTree {
        let state = self.inner.read().unwrap();
        let mut out = ResultsTree::new();
        for (agent, targets) in &state.tree {
            if agent_filter.is_some_and(|a| a != agent) {
                continue;
            }
            for (target, days) in targets {
                if target_filter.is_some_and(|t| t != *target) {
                    continue;
                }
                for (date, record) in days {
                    if date_filter.is_some_and(|d| d != date) {
                        continue;
                    }
                    out.entry(agent.clone())
                        .or_default()
                        .entry(*target)
                        .or_default()
                        .insert(date.clone(), record.clone());
                }
            }
        }
        out
    }

    /// Per-target aggregate for one local day, fused across agents with
    /// the consensus threshold.
    pub fn daily_target_summary(
        &self,
        date: &str,
        target_filter: Option<u64>,
        now: i64,
    ) -> BTreeMap<u64, TargetDailySummary> {
        let state = self.inner.read().unwrap();
        let Some((day_start, day_end)) = local_day_bounds(date) else {
            return BTreeMap::new();
        };

        // Collect the union of targets with records on this date and
        // targets with a live status.
        let mut target_ids: Vec<u64> = state.statuses.keys().copied().collect();
        for targets in state.tree.values() {
            for (target, days) in targets {
                if days.contains_key(date) {
                    target_ids.push(*target);
                }
            }
        }
        target_ids.sort_unstable();
        target_ids.dedup();

        let mut out = BTreeMap::new();
        for target in target_ids {
            if target_filter.is_some_and(|t| t != target) {
                continue;
            }

            let mut spans: Vec<(i64, Option<i64>)> = Vec::new();
            let mut rt_sum = 0.0;
            let mut rt_count = 0u64;
            let mut observing_agents = 0usize;
            for targets in state.tree.values() {
                let Some(record) = targets.get(&target).and_then(|days| days.get(date)) else {
                    continue;
                };
                observing_agents += 1;
                for incident in &record.incidents {
                    spans.push((
                        incident.start_time,
                        Some(incident.end_time.unwrap_or(now)),
                    ));
                }
                for bucket in &record.response_time_intervals {
                    rt_sum += bucket.avg_response_time * bucket.count as f64;
                    rt_count += bucket.count;
                }
            }

            let effective_min = if observing_agents <= 1 { 1 } else { self.min_agents };
            // Closed incidents may run past midnight; their full duration
            // belongs to this day's record, so only the left edge is clipped.
            let downtime_ms = fused_downtime_ms(&spans, day_start, i64::MAX / 2, effective_min);
            let day_len = day_end - day_start;
            let uptime_percentage =
                round2((100.0 * (1.0 - downtime_ms as f64 / day_len as f64)).clamp(0.0, 100.0));

            let (is_down, agent_reports) = state
                .statuses
                .get(&target)
                .map(|s| (s.is_down, s.agents_reporting.clone()))
                .unwrap_or((false, HashMap::new()));

            out.insert(
                target,
                TargetDailySummary {
                    is_down,
                    downtime_ms,
                    uptime_percentage,
                    avg_response_time: (rt_count > 0).then(|| round2(rt_sum / rt_count as f64)),
                    agent_reports,
                },
            );
        }
        out
    }

    pub fn open_incident_count(&self) -> usize {
        let state = self.inner.read().unwrap();
        state
            .tree
            .values()
            .flat_map(|targets| targets.values())
            .flat_map(|days| days.values())
            .filter(|record| record.open_incident_start().is_some())
            .count()
    }
}

/// The consensus rule: a single reporter is authoritative; with two or
/// more reporters at least `min_agents` must agree the target is down.
fn consensus(reports: &HashMap<String, bool>, min_agents: usize) -> bool {
    let total = reports.len();
    let down = reports.values().filter(|d| **d).count();
    if total <= 1 {
        down == 1
    } else {
        down >= min_agents
    }
}

fn day_record<'a>(
    tree: &'a mut ResultsTree,
    agent: &str,
    target: u64,
    date: &str,
) -> &'a mut DailyRecord {
    tree.entry(agent.to_string())
        .or_default()
        .entry(target)
        .or_default()
        .entry(date.to_string())
        .or_insert_with(|| DailyRecord::new(date))
}

fn pair_has_open_incident(tree: &ResultsTree, agent: &str, target: u64) -> bool {
    tree.get(agent)
        .and_then(|targets| targets.get(&target))
        .map(|days| days.values().any(|r| r.open_incident_start().is_some()))
        .unwrap_or(false)
}

/// Open an incident for (agent, target) on `date` unless the pair already
/// has one open — an outage continuing across midnight stays attached to
/// the day it started on.
fn open_pair(tree: &mut ResultsTree, agent: &str, target: u64, date: &str, ts: i64) {
    if pair_has_open_incident(tree, agent, target) {
        return;
    }
    day_record(tree, agent, target, date).open_incident(ts);
}

/// Close the pair's open incident, wherever (whichever day) it lives.
fn close_pair(tree: &mut ResultsTree, agent: &str, target: u64, ts: i64) {
    let Some(days) = tree.get_mut(agent).and_then(|targets| targets.get_mut(&target)) else {
        return;
    };
    for record in days.values_mut().rev() {
        if record.open_incident_start().is_some() {
            record.close_incident(ts);
            return;
        }
    }
}

fn rebuild_statuses(
    tree: &ResultsTree,
    min_agents: usize,
    now: i64,
) -> HashMap<u64, TargetStatus> {
    let mut statuses: HashMap<u64, TargetStatus> = HashMap::new();
    for (agent, targets) in tree {
        for (target, days) in targets {
            let Some(latest) = days.values().next_back() else {
                continue;
            };
            statuses
                .entry(*target)
                .or_insert_with(|| TargetStatus::new(now))
                .agents_reporting
                .insert(agent.clone(), latest.is_down);
        }
    }
    for status in statuses.values_mut() {
        status.is_down = consensus(&status.agents_reporting, min_agents);
    }
    statuses
}

#[cfg(test)]
mod tests {
    use super::*;
    use storm_common::{Target, TargetKind};

    fn engine(dir: &std::path::Path) -> MonitorEngine {
        let targets =
            Arc::new(TargetConfigManager::load(dir.join("targets.json")).unwrap());
        targets
            .upsert(Target {
                id: 1,
                name: "web".to_string(),
                kind: TargetKind::Http,
                endpoint: "https://example.com".to_string(),
                interval_ms: 1_000,
                timeout_ms: 1_000,
            })
            .unwrap();
        let alerts = Arc::new(AlertSink::new(None));
        MonitorEngine::load(dir.join("results.json"), targets, alerts).unwrap()
    }

    fn result(agent: &str, target: u64, ts: i64, success: bool) -> CheckResult {
        CheckResult {
            target_id: target,
            agent_id: agent.to_string(),
            timestamp: ts,
            success,
            response_time_ms: success.then_some(25.0),
            status_code: Some(if success { 200 } else { 503 }),
            error_text: (!success).then(|| "connection refused".to_string()),
        }
    }

    /// Base timestamp inside yesterday, away from midnight on both sides,
    /// so tests never straddle a day boundary.
    fn base_ts() -> i64 {
        let now = Utc::now().timestamp_millis();
        crate::monitor::records::local_midnight_ms(now) - 12 * 60 * 60 * 1000
    }

    #[test]
    fn single_agent_outage_produces_one_incident() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let t0 = base_ts();

        engine.submit(&[result("agent-1", 1, t0, true)]);
        engine.submit(&[result("agent-1", 1, t0 + 1_000, false)]);
        engine.submit(&[result("agent-1", 1, t0 + 2_000, false)]);
        engine.submit(&[result("agent-1", 1, t0 + 3_000, true)]);

        let date = local_date_string(t0);
        let tree = engine.raw_results(Some("agent-1"), Some(1), Some(&date));
        let record = &tree["agent-1"][&1][&date];
        assert_eq!(record.incidents.len(), 1);
        assert_eq!(record.incidents[0].start_time, t0 + 1_000);
        assert_eq!(record.incidents[0].end_time, Some(t0 + 3_000));
        assert_eq!(record.downtime_ms, 2_000);
        assert!(!record.is_down);

        let summary = engine.daily_target_summary(&date, Some(1), t0 + 4_000);
        let day = &summary[&1];
        assert_eq!(day.downtime_ms, 2_000);
        assert!((day.uptime_percentage - 100.0 * (1.0 - 2_000.0 / 86_400_000.0)).abs() < 0.01);
        assert!(!day.is_down);
    }

    #[test]
    fn flaky_minority_does_not_open_an_incident() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let t0 = base_ts();
        let date = local_date_string(t0);

        engine.submit(&[result("agent-1", 1, t0, true)]);
        engine.submit(&[result("agent-2", 1, t0, true)]);

        // A alone reports down: consensus holds, nothing opens.
        engine.submit(&[result("agent-1", 1, t0 + 10_000, false)]);
        assert!(!engine.statuses()[&1].is_down);
        assert_eq!(engine.open_incident_count(), 0);

        // B agrees: consensus flips, incidents open on both records with
        // the triggering timestamp.
        engine.submit(&[result("agent-2", 1, t0 + 20_000, false)]);
        assert!(engine.statuses()[&1].is_down);
        let tree = engine.raw_results(None, None, None);
        for agent in ["agent-1", "agent-2"] {
            let record = &tree[agent][&1][&date];
            assert_eq!(record.open_incident_start(), Some(t0 + 20_000));
        }

        // A recovers: consensus flips up, A's incident closes, B's stays
        // open until B itself reports up.
        engine.submit(&[result("agent-1", 1, t0 + 30_000, true)]);
        assert!(!engine.statuses()[&1].is_down);
        let tree = engine.raw_results(None, None, None);
        assert_eq!(
            tree["agent-1"][&1][&date].incidents[0].end_time,
            Some(t0 + 30_000)
        );
        assert_eq!(tree["agent-1"][&1][&date].downtime_ms, 10_000);
        assert!(tree["agent-2"][&1][&date].open_incident_start().is_some());

        engine.submit(&[result("agent-2", 1, t0 + 40_000, true)]);
        let tree = engine.raw_results(None, None, None);
        assert_eq!(
            tree["agent-2"][&1][&date].incidents[0].end_time,
            Some(t0 + 40_000)
        );
        assert_eq!(engine.open_incident_count(), 0);
    }

    #[test]
    fn stale_result_does_not_rewind_the_timeline() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let t0 = base_ts();
        let date = local_date_string(t0);

        engine.submit(&[result("agent-1", 1, t0 + 10_000, false)]);
        // Success stamped before the incident started: the bucket gets the
        // sample, the incident closes clamped to its own start.
        engine.submit(&[result("agent-1", 1, t0 + 5_000, true)]);

        let tree = engine.raw_results(None, None, None);
        let record = &tree["agent-1"][&1][&date];
        assert_eq!(record.incidents[0].end_time, Some(t0 + 10_000));
        assert_eq!(record.downtime_ms, 0);
        assert_eq!(record.response_time_intervals.len(), 1);
    }

    #[test]
    fn day_rollover_keeps_the_incident_on_its_original_day() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let now = Utc::now().timestamp_millis();
        let midnight = crate::monitor::records::local_midnight_ms(now);
        let before = midnight - 60_000; // yesterday 23:59
        let after = midnight + 60_000; // today 00:01

        engine.submit(&[result("agent-1", 1, before, false)]);
        engine.submit(&[result("agent-1", 1, after, false)]);

        let yesterday = local_date_string(before);
        let today = local_date_string(after);
        let tree = engine.raw_results(None, None, None);
        // The outage continues: still a single open incident, attached to
        // the day it started on.
        assert_eq!(
            tree["agent-1"][&1][&yesterday].open_incident_start(),
            Some(before)
        );
        assert!(tree["agent-1"][&1][&today].incidents.is_empty());

        engine.submit(&[result("agent-1", 1, after + 60_000, true)]);
        let tree = engine.raw_results(None, None, None);
        let record = &tree["agent-1"][&1][&yesterday];
        assert_eq!(record.incidents[0].end_time, Some(after + 60_000));
        assert_eq!(record.downtime_ms, after + 60_000 - before);
    }

    #[test]
    fn open_incident_counts_into_the_daily_summary() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let t0 = base_ts();
        let date = local_date_string(t0);

        engine.submit(&[result("agent-1", 1, t0, false)]);
        let summary = engine.daily_downtime_summary(&date, t0 + 30_000);
        assert_eq!(summary["agent-1"][&1], 30_000);
    }

    #[test]
    fn store_survives_a_restart() {
        let dir = tempfile::tempdir().unwrap();
        let t0 = base_ts();
        let date = local_date_string(t0);
        {
            let engine = engine(dir.path());
            engine.submit(&[result("agent-1", 1, t0, false)]);
        }

        // Reload from disk: records and the rebuilt status map agree.
        let targets =
            Arc::new(TargetConfigManager::load(dir.path().join("targets.json")).unwrap());
        let alerts = Arc::new(AlertSink::new(None));
        let engine =
            MonitorEngine::load(dir.path().join("results.json"), targets, alerts).unwrap();
        assert!(engine.statuses()[&1].is_down);
        let tree = engine.raw_results(None, None, None);
        assert!(tree["agent-1"][&1][&date].open_incident_start().is_some());
    }

    #[test]
    fn reset_wipes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        engine.submit(&[result("agent-1", 1, base_ts(), false)]);
        engine.reset().unwrap();
        assert!(engine.statuses().is_empty());
        assert!(engine.raw_results(None, None, None).is_empty());
    }

    #[test]
    fn prune_drops_old_days() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let now = Utc::now().timestamp_millis();
        let old = now - 500 * DAY_MS;

        engine.submit(&[result("agent-1", 1, old, true)]);
        engine.submit(&[result("agent-1", 1, now, true)]);
        assert_eq!(engine.prune(400), 1);

        let tree = engine.raw_results(None, None, None);
        assert!(tree["agent-1"][&1].contains_key(&local_date_string(now)));
        assert!(!tree["agent-1"][&1].contains_key(&local_date_string(old)));
    }

    #[test]
    fn consensus_rule_branches() {
        let mut reports = HashMap::new();
        assert!(!consensus(&reports, 2));

        reports.insert("a".to_string(), true);
        assert!(consensus(&reports, 2)); // single reporter is authoritative

        reports.insert("b".to_string(), false);
        assert!(!consensus(&reports, 2)); // 1 of 2 below threshold

        reports.insert("b".to_string(), true);
        assert!(consensus(&reports, 2)); // threshold met
    }
}
