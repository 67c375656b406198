//! Multi-agent downtime fusion over a time window.
//!
//! Incidents from all agents are flattened into boundary events (+1 at
//! each start, -1 at each end) and swept in time order. Time during which
//! at least `min_concurrent` agents were down counts as fused downtime.

use std::collections::BTreeSet;

use super::records::{local_day_bounds, ResultsTree};

/// Days beyond this horizon are ignored by the window queries.
pub const LOOKBACK_DAYS: i64 = 45;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Downtime within `[window_start, window_end)` during which at least
/// `min_concurrent` of the given incident spans overlap. Open spans
/// (`end == None`) run to the window end.
pub fn fused_downtime_ms(
    spans: &[(i64, Option<i64>)],
    window_start: i64,
    window_end: i64,
    min_concurrent: usize,
) -> i64 {
    let mut events: Vec<(i64, i32)> = Vec::with_capacity(spans.len() * 2);
    for &(start, end) in spans {
        let s = start.max(window_start);
        let e = end.unwrap_or(window_end).min(window_end);
        if s < e {
            events.push((s, 1));
            events.push((e, -1));
        }
    }
    // Ends sort before starts at the same instant so back-to-back
    // incidents from different agents do not briefly double-count.
    events.sort_by_key(|&(t, delta)| (t, delta));

    let mut active = 0i32;
    let mut fused = 0i64;
    let mut since = 0i64;
    for (t, delta) in events {
        if active >= min_concurrent as i32 {
            fused += t - since;
        }
        active += delta;
        if active >= min_concurrent as i32 {
            since = t;
        }
    }
    fused
}

/// Per-target downtime fraction over `[window_start, window_end)`.
///
/// The denominator is the span of local days that carry any observation
/// for the target, clipped to the window; days with no observations
/// contribute neither uptime nor downtime. With a single observing agent
/// its reports are authoritative, otherwise the consensus threshold
/// applies. Returns a percentage with two-decimal precision; an
/// unobserved window reports 100%.
pub fn window_uptime_percent(
    tree: &ResultsTree,
    target_id: u64,
    window_start: i64,
    window_end: i64,
    min_agents: usize,
    now_ms: i64,
) -> f64 {
    let horizon = now_ms - LOOKBACK_DAYS * DAY_MS;
    let mut spans: Vec<(i64, Option<i64>)> = Vec::new();
    let mut observed_days: BTreeSet<String> = BTreeSet::new();
    let mut observing_agents = 0usize;

    for targets in tree.values() {
        let Some(days) = targets.get(&target_id) else {
            continue;
        };
        let mut agent_observes = false;
        for (date, record) in days {
            let Some((day_start, day_end)) = local_day_bounds(date) else {
                continue;
            };
            if day_end < horizon || day_start >= window_end || day_end <= window_start {
                continue;
            }
            agent_observes = true;
            observed_days.insert(date.clone());
            for incident in &record.incidents {
                spans.push((incident.start_time, incident.end_time));
            }
        }
        if agent_observes {
            observing_agents += 1;
        }
    }

    let denominator: i64 = observed_days
        .iter()
        .filter_map(|date| local_day_bounds(date))
        .map(|(day_start, day_end)| day_end.min(window_end) - day_start.max(window_start))
        .filter(|span| *span > 0)
        .sum();
    if denominator == 0 {
        return 100.0;
    }

    let effective_min = if observing_agents <= 1 { 1 } else { min_agents };
    let fused = fused_downtime_ms(&spans, window_start, window_end, effective_min);
    let pct = 100.0 * (1.0 - fused as f64 / denominator as f64);
    round2(pct.clamp(0.0, 100.0))
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::records::{local_date_string, DailyRecord, Incident};

    const MIN: i64 = 60 * 1000;

    #[test]
    fn sweep_counts_only_overlap_above_threshold() {
        // A down [0, 20min), B down [10min, 30min), C never down.
        let spans = vec![(0, Some(20 * MIN)), (10 * MIN, Some(30 * MIN))];
        assert_eq!(fused_downtime_ms(&spans, 0, 60 * MIN, 2), 10 * MIN);
        // With a threshold of one, the union counts.
        assert_eq!(fused_downtime_ms(&spans, 0, 60 * MIN, 1), 30 * MIN);
    }

    #[test]
    fn open_spans_run_to_the_window_end() {
        let spans = vec![(50 * MIN, None)];
        assert_eq!(fused_downtime_ms(&spans, 0, 60 * MIN, 1), 10 * MIN);
    }

    #[test]
    fn adjacent_spans_do_not_double_count() {
        let spans = vec![
            (0, Some(10 * MIN)),
            (0, Some(10 * MIN)),
            (10 * MIN, Some(20 * MIN)),
        ];
        // At t=10min the first pair ends as the third begins; concurrency
        // never reaches two afterwards.
        assert_eq!(fused_downtime_ms(&spans, 0, 60 * MIN, 2), 10 * MIN);
    }

    #[test]
    fn spans_outside_the_window_are_clipped_away() {
        let spans = vec![(-(5 * MIN), Some(5 * MIN)), (55 * MIN, Some(90 * MIN))];
        assert_eq!(fused_downtime_ms(&spans, 0, 60 * MIN, 1), 10 * MIN);
    }

    fn record_with(date: &str, incidents: Vec<Incident>) -> DailyRecord {
        let mut record = DailyRecord::new(date);
        record.incidents = incidents;
        record
    }

    #[test]
    fn consensus_window_matches_the_three_agent_scenario() {
        // Target 7, one-hour window. A down [0, 20min], B down [10, 30min],
        // C observes but is never down. Overlap above the threshold is
        // 10 minutes, so uptime is 83.33%.
        let now = chrono::Utc::now().timestamp_millis();
        let date = local_date_string(now);
        let w0 = crate::monitor::records::local_midnight_ms(now);
        let w1 = w0 + 60 * MIN;

        let mut tree = ResultsTree::new();
        for (agent, incidents) in [
            (
                "agent-1",
                vec![Incident {
                    start_time: w0,
                    end_time: Some(w0 + 20 * MIN),
                }],
            ),
            (
                "agent-2",
                vec![Incident {
                    start_time: w0 + 10 * MIN,
                    end_time: Some(w0 + 30 * MIN),
                }],
            ),
            ("agent-3", vec![]),
        ] {
            tree.entry(agent.to_string())
                .or_default()
                .entry(7)
                .or_default()
                .insert(date.clone(), record_with(&date, incidents));
        }

        let pct = window_uptime_percent(&tree, 7, w0, w1, 2, now);
        assert_eq!(pct, 83.33);
    }

    #[test]
    fn single_agent_reports_are_authoritative() {
        let now = chrono::Utc::now().timestamp_millis();
        let date = local_date_string(now);
        let w0 = crate::monitor::records::local_midnight_ms(now);
        let w1 = w0 + 60 * MIN;

        let mut tree = ResultsTree::new();
        tree.entry("agent-1".to_string())
            .or_default()
            .entry(1)
            .or_default()
            .insert(
                date.clone(),
                record_with(
                    &date,
                    vec![Incident {
                        start_time: w0,
                        end_time: Some(w0 + 6 * MIN),
                    }],
                ),
            );

        // One observer: the consensus threshold degrades to one.
        let pct = window_uptime_percent(&tree, 1, w0, w1, 2, now);
        assert_eq!(pct, 90.0);
    }

    #[test]
    fn unobserved_window_reports_full_uptime() {
        let tree = ResultsTree::new();
        let now = chrono::Utc::now().timestamp_millis();
        assert_eq!(window_uptime_percent(&tree, 1, 0, 60 * MIN, 2, now), 100.0);
    }
}
