//! Persisted per-day monitoring records.
//!
//! The results store is a three-level tree `agentId → targetId → date →
//! DailyRecord`, kept in `BTreeMap`s so a load-then-save round trip is
//! byte-identical. Day keys and bucket alignment use the coordinator's
//! local time zone.

use std::collections::BTreeMap;

use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Width of a response-time aggregation bucket.
pub const BUCKET_MS: i64 = 30 * 60 * 1000;

/// agentId → targetId → date (`YYYY-MM-DD`, local) → record.
pub type ResultsTree = BTreeMap<String, BTreeMap<u64, BTreeMap<String, DailyRecord>>>;

/// A maximal interval during which consensus said the target was down,
/// from one (agent, target, day) perspective. `end_time` is null while
/// the incident is ongoing.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Incident {
    pub start_time: i64,
    pub end_time: Option<i64>,
}

/// 30-minute half-open window `[start_time, end_time)` of successful
/// response times, aligned to local midnight.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResponseTimeBucket {
    pub start_time: i64,
    pub end_time: i64,
    pub avg_response_time: f64,
    pub count: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DailyRecord {
    pub date: String,
    /// Cumulative closed downtime. Open incidents are added at query time.
    pub downtime_ms: i64,
    /// Ordered, newest last. At most one incident is open and it is the
    /// last element.
    pub incidents: Vec<Incident>,
    pub response_time_intervals: Vec<ResponseTimeBucket>,
    /// Cached per-(agent, target) state, driven by global consensus.
    pub is_down: bool,
}

impl DailyRecord {
    pub fn new(date: &str) -> Self {
        DailyRecord {
            date: date.to_string(),
            downtime_ms: 0,
            incidents: Vec::new(),
            response_time_intervals: Vec::new(),
            is_down: false,
        }
    }

    /// Fold a successful response time into the bucket containing `ts_ms`,
    /// creating the bucket lazily.
    pub fn fold_response_time(&mut self, ts_ms: i64, response_time_ms: f64) {
        let start = bucket_start_ms(ts_ms);
        match self
            .response_time_intervals
            .iter_mut()
            .find(|b| b.start_time == start)
        {
            Some(bucket) => {
                let count = bucket.count as f64;
                bucket.avg_response_time =
                    (bucket.avg_response_time * count + response_time_ms) / (count + 1.0);
                bucket.count += 1;
            }
            None => {
                let bucket = ResponseTimeBucket {
                    start_time: start,
                    end_time: start + BUCKET_MS,
                    avg_response_time: response_time_ms,
                    count: 1,
                };
                let pos = self
                    .response_time_intervals
                    .partition_point(|b| b.start_time < start);
                self.response_time_intervals.insert(pos, bucket);
            }
        }
    }

    pub fn open_incident(&mut self, start_ms: i64) {
        self.incidents.push(Incident {
            start_time: start_ms,
            end_time: None,
        });
        self.is_down = true;
    }

    /// Close the open incident, clamping so the timeline never rewinds.
    pub fn close_incident(&mut self, end_ms: i64) {
        if let Some(open) = self.incidents.last_mut().filter(|i| i.end_time.is_none()) {
            let end = end_ms.max(open.start_time);
            open.end_time = Some(end);
            self.downtime_ms += end - open.start_time;
        }
        self.is_down = false;
    }

    pub fn open_incident_start(&self) -> Option<i64> {
        self.incidents
            .last()
            .filter(|i| i.end_time.is_none())
            .map(|i| i.start_time)
    }
}

fn local_datetime(ts_ms: i64) -> DateTime<Local> {
    DateTime::<Utc>::from_timestamp_millis(ts_ms)
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
        .with_timezone(&Local)
}

/// `YYYY-MM-DD` of the local day containing `ts_ms`.
pub fn local_date_string(ts_ms: i64) -> String {
    local_datetime(ts_ms).format("%Y-%m-%d").to_string()
}

/// Unix ms of local midnight of the day containing `ts_ms`.
pub fn local_midnight_ms(ts_ms: i64) -> i64 {
    let date = local_datetime(ts_ms).date_naive();
    local_day_start(date)
}

/// Start of the bucket containing `ts_ms`. A timestamp exactly on a
/// boundary belongs to the later bucket.
pub fn bucket_start_ms(ts_ms: i64) -> i64 {
    let midnight = local_midnight_ms(ts_ms);
    midnight + ((ts_ms - midnight) / BUCKET_MS) * BUCKET_MS
}

/// `[start, end)` unix ms bounds of a local `YYYY-MM-DD` day.
pub fn local_day_bounds(date: &str) -> Option<(i64, i64)> {
    let day = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
    let next = day.succ_opt()?;
    Some((local_day_start(day), local_day_start(next)))
}

fn local_day_start(day: NaiveDate) -> i64 {
    // `earliest` resolves DST gaps at midnight.
    Local
        .from_local_datetime(&day.and_hms_opt(0, 0, 0).unwrap())
        .earliest()
        .map(|dt| dt.timestamp_millis())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fold_updates_running_mean() {
        let mut record = DailyRecord::new("2026-08-01");
        let base = local_midnight_ms(Utc::now().timestamp_millis());
        record.fold_response_time(base + 100, 10.0);
        record.fold_response_time(base + 200, 20.0);
        record.fold_response_time(base + 300, 30.0);

        assert_eq!(record.response_time_intervals.len(), 1);
        let bucket = &record.response_time_intervals[0];
        assert_eq!(bucket.count, 3);
        assert!((bucket.avg_response_time - 20.0).abs() < f64::EPSILON);
        assert_eq!(bucket.end_time - bucket.start_time, BUCKET_MS);
    }

    #[test]
    fn boundary_timestamp_goes_into_the_later_bucket() {
        let midnight = local_midnight_ms(Utc::now().timestamp_millis());
        let boundary = midnight + BUCKET_MS;
        assert_eq!(bucket_start_ms(boundary), boundary);
        assert_eq!(bucket_start_ms(boundary - 1), midnight);
        assert_eq!(bucket_start_ms(boundary + 1), boundary);
    }

    #[test]
    fn buckets_stay_sorted_and_unique() {
        let mut record = DailyRecord::new("2026-08-01");
        let midnight = local_midnight_ms(Utc::now().timestamp_millis());
        record.fold_response_time(midnight + 2 * BUCKET_MS, 5.0);
        record.fold_response_time(midnight, 5.0);
        record.fold_response_time(midnight + BUCKET_MS, 5.0);
        record.fold_response_time(midnight + 10, 7.0);

        let starts: Vec<i64> = record
            .response_time_intervals
            .iter()
            .map(|b| b.start_time)
            .collect();
        assert_eq!(
            starts,
            vec![midnight, midnight + BUCKET_MS, midnight + 2 * BUCKET_MS]
        );
        assert_eq!(record.response_time_intervals[0].count, 2);
    }

    #[test]
    fn close_clamps_to_the_incident_start() {
        let mut record = DailyRecord::new("2026-08-01");
        record.open_incident(10_000);
        // A stale result must not rewind the timeline.
        record.close_incident(5_000);
        assert_eq!(record.incidents[0].end_time, Some(10_000));
        assert_eq!(record.downtime_ms, 0);
        assert!(!record.is_down);
    }

    #[test]
    fn closed_downtime_accumulates() {
        let mut record = DailyRecord::new("2026-08-01");
        record.open_incident(1_000);
        record.close_incident(3_000);
        record.open_incident(10_000);
        record.close_incident(14_000);
        assert_eq!(record.downtime_ms, 6_000);
        assert!(record.open_incident_start().is_none());
    }

    #[test]
    fn day_bounds_cover_one_day() {
        let (start, end) = local_day_bounds("2026-03-03").unwrap();
        assert_eq!(local_date_string(start), "2026-03-03");
        assert_eq!(local_date_string(end - 1), "2026-03-03");
        assert_eq!(local_date_string(end), "2026-03-04");
    }
}
