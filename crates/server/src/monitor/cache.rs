//! Short-TTL read cache for the expensive aggregated queries.
//!
//! Entries live for ten seconds and the whole cache is dropped on every
//! result submission, so readers never see pre-submission aggregates for
//! longer than one TTL.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde_json::Value;

pub const QUERY_CACHE_TTL: Duration = Duration::from_secs(10);

pub struct QueryCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, (Instant, Value)>>,
}

impl QueryCache {
    pub fn new(ttl: Duration) -> Self {
        QueryCache {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let entries = self.entries.lock().unwrap();
        let (inserted, value) = entries.get(key)?;
        if inserted.elapsed() > self.ttl {
            return None;
        }
        Some(value.clone())
    }

    pub fn put(&self, key: &str, value: Value) {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), (Instant::now(), value));
    }

    pub fn invalidate_all(&self) {
        self.entries.lock().unwrap().clear();
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(QUERY_CACHE_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hit_then_invalidate() {
        let cache = QueryCache::default();
        cache.put("uptime:all", json!({"ok": true}));
        assert!(cache.get("uptime:all").is_some());

        cache.invalidate_all();
        assert!(cache.get("uptime:all").is_none());
    }

    #[test]
    fn expired_entries_miss() {
        let cache = QueryCache::new(Duration::from_millis(0));
        cache.put("latency:1", json!([1, 2, 3]));
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("latency:1").is_none());
    }
}
