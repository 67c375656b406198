//! Authoritative target configuration.
//!
//! The target set lives in `data/config/targets.json` and is the only input
//! to what agents monitor. A successful load atomically replaces the
//! in-memory set and advances the published version timestamp that agents
//! poll against. A background watcher re-reads the file when it changes on
//! disk, collapsing bursts of writes into a single reload.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};
use std::time::SystemTime;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Duration;
use tracing::{info, warn};

use storm_common::Target;

use crate::persist::{self, PersistError};

/// Quiet window a changed file must survive before it is re-read.
const DEBOUNCE_WINDOW: Duration = Duration::from_millis(300);
/// How often the watcher polls for modification.
const WATCH_POLL: Duration = Duration::from_millis(250);

#[derive(Error, Debug)]
pub enum TargetConfigError {
    #[error("invalid target config: {0}")]
    Validation(String),
    #[error(transparent)]
    Persist(#[from] PersistError),
}

#[derive(Serialize, Deserialize, Debug, Default, Clone)]
struct TargetsFile {
    targets: Vec<Target>,
}

struct TargetSet {
    targets: Vec<Target>,
    /// TargetSetVersion: wall-clock ms of the last accepted load.
    last_updated: i64,
}

pub struct TargetConfigManager {
    path: PathBuf,
    inner: RwLock<TargetSet>,
    /// Mtime of the last write we performed or load we accepted, so the
    /// watcher does not re-read a file the manager itself just wrote.
    seen_mtime: Mutex<Option<SystemTime>>,
}

impl TargetConfigManager {
    /// Load the target file, creating an empty one if it does not exist.
    pub fn load(path: PathBuf) -> Result<Self, TargetConfigError> {
        let file = match persist::load_json::<TargetsFile>(&path)? {
            Some(file) => {
                validate_set(&file.targets).map_err(TargetConfigError::Validation)?;
                file
            }
            None => {
                info!(path = %path.display(), "No target config found, creating an empty one.");
                let empty = TargetsFile::default();
                persist::store_json(&path, &empty)?;
                empty
            }
        };

        info!(count = file.targets.len(), path = %path.display(), "Loaded target config.");
        let manager = TargetConfigManager {
            inner: RwLock::new(TargetSet {
                targets: file.targets,
                last_updated: Utc::now().timestamp_millis(),
            }),
            seen_mtime: Mutex::new(file_mtime(&path)),
            path,
        };
        Ok(manager)
    }

    /// Current targets plus the version agents compare against.
    pub fn list(&self) -> (Vec<Target>, i64) {
        let set = self.inner.read().unwrap();
        (set.targets.clone(), set.last_updated)
    }

    pub fn last_updated(&self) -> i64 {
        self.inner.read().unwrap().last_updated
    }

    pub fn has_changes_since(&self, client_version: i64) -> bool {
        self.inner.read().unwrap().last_updated > client_version
    }

    pub fn get(&self, id: u64) -> Option<Target> {
        self.inner
            .read()
            .unwrap()
            .targets
            .iter()
            .find(|t| t.id == id)
            .cloned()
    }

    pub fn count(&self) -> usize {
        self.inner.read().unwrap().targets.len()
    }

    /// Insert or replace a target, persisting the new set back to disk.
    pub fn upsert(&self, target: Target) -> Result<(), TargetConfigError> {
        target.validate().map_err(TargetConfigError::Validation)?;
        let mut set = self.inner.write().unwrap();
        let mut targets = set.targets.clone();
        match targets.iter_mut().find(|t| t.id == target.id) {
            Some(slot) => *slot = target,
            None => targets.push(target),
        }
        self.persist(&targets)?;
        set.targets = targets;
        set.last_updated = next_version(set.last_updated);
        Ok(())
    }

    /// Remove a target by id. Returns false when the id was absent.
    pub fn delete(&self, id: u64) -> Result<bool, TargetConfigError> {
        let mut set = self.inner.write().unwrap();
        if !set.targets.iter().any(|t| t.id == id) {
            return Ok(false);
        }
        let targets: Vec<Target> = set.targets.iter().filter(|t| t.id != id).cloned().collect();
        self.persist(&targets)?;
        set.targets = targets;
        set.last_updated = next_version(set.last_updated);
        Ok(true)
    }

    fn persist(&self, targets: &[Target]) -> Result<(), PersistError> {
        persist::store_json(
            &self.path,
            &TargetsFile {
                targets: targets.to_vec(),
            },
        )?;
        *self.seen_mtime.lock().unwrap() = file_mtime(&self.path);
        Ok(())
    }

    /// Re-read the file from disk. A failed read or invalid schema leaves
    /// the previous set in place.
    pub fn reload_from_disk(&self) {
        let file = match persist::load_json::<TargetsFile>(&self.path) {
            Ok(Some(file)) => file,
            Ok(None) => {
                warn!(path = %self.path.display(), "Target config file is missing, keeping the last valid set.");
                return;
            }
            Err(e) => {
                warn!(error = %e, "Failed to re-read target config, keeping the last valid set.");
                return;
            }
        };
        if let Err(e) = validate_set(&file.targets) {
            warn!(error = %e, "Rejected target config reload, keeping the last valid set.");
            return;
        }

        let mut set = self.inner.write().unwrap();
        info!(count = file.targets.len(), "Target config reloaded.");
        set.targets = file.targets;
        set.last_updated = next_version(set.last_updated);
        *self.seen_mtime.lock().unwrap() = file_mtime(&self.path);
    }

    /// Watch the config file for modification. On change, wait for the file
    /// to sit still for the debounce window, then reload once. Never exits.
    pub async fn watch(self: Arc<Self>) {
        info!(path = %self.path.display(), "Target config watcher started.");
        loop {
            tokio::time::sleep(WATCH_POLL).await;

            let current = file_mtime(&self.path);
            let known = *self.seen_mtime.lock().unwrap();
            if current == known {
                continue;
            }
            if current.is_none() {
                warn!(path = %self.path.display(), "Target config file disappeared, keeping the last valid set.");
                *self.seen_mtime.lock().unwrap() = None;
                continue;
            }

            // Burst collapse: an editor save can produce several writes in
            // quick succession. Wait until the mtime stops moving.
            let mut last = current;
            loop {
                tokio::time::sleep(DEBOUNCE_WINDOW).await;
                let next = file_mtime(&self.path);
                if next == last {
                    break;
                }
                last = next;
            }

            self.reload_from_disk();
        }
    }
}

/// Versions are wall-clock ms, nudged forward so two edits inside one
/// millisecond still publish distinct versions.
fn next_version(prev: i64) -> i64 {
    Utc::now().timestamp_millis().max(prev + 1)
}

fn validate_set(targets: &[Target]) -> Result<(), String> {
    let mut seen = HashSet::new();
    for target in targets {
        target.validate()?;
        if !seen.insert(target.id) {
            return Err(format!("duplicate target id {}", target.id));
        }
    }
    Ok(())
}

fn file_mtime(path: &std::path::Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use storm_common::TargetKind;

    fn target(id: u64) -> Target {
        Target {
            id,
            name: format!("t{id}"),
            kind: TargetKind::Http,
            endpoint: "https://example.com".to_string(),
            interval_ms: 60_000,
            timeout_ms: 5_000,
        }
    }

    #[test]
    fn load_creates_empty_file_and_crud_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config/targets.json");
        let manager = TargetConfigManager::load(path.clone()).unwrap();
        assert_eq!(manager.list().0.len(), 0);

        manager.upsert(target(1)).unwrap();
        manager.upsert(target(2)).unwrap();
        let v1 = manager.last_updated();
        assert!(manager.has_changes_since(v1 - 1));
        assert!(!manager.has_changes_since(v1));

        // A fresh manager sees the persisted set.
        let reloaded = TargetConfigManager::load(path).unwrap();
        let (targets, _) = reloaded.list();
        assert_eq!(targets.len(), 2);
        assert!(reloaded.get(2).is_some());

        assert!(reloaded.delete(2).unwrap());
        assert!(!reloaded.delete(2).unwrap());
        assert_eq!(reloaded.count(), 1);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("targets.json");
        let file = serde_json::json!({ "targets": [
            { "id": 1, "name": "a", "kind": "http", "endpoint": "https://a.example",
              "intervalMs": 1000, "timeoutMs": 500 },
            { "id": 1, "name": "b", "kind": "http", "endpoint": "https://b.example",
              "intervalMs": 1000, "timeoutMs": 500 },
        ]});
        std::fs::write(&path, serde_json::to_vec_pretty(&file).unwrap()).unwrap();
        assert!(matches!(
            TargetConfigManager::load(path),
            Err(TargetConfigError::Validation(_))
        ));
    }

    #[test]
    fn bad_reload_keeps_previous_set() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("targets.json");
        let manager = TargetConfigManager::load(path.clone()).unwrap();
        manager.upsert(target(1)).unwrap();
        let version = manager.last_updated();

        std::fs::write(&path, b"{broken").unwrap();
        manager.reload_from_disk();

        assert_eq!(manager.count(), 1);
        assert_eq!(manager.last_updated(), version);
    }

    #[tokio::test]
    async fn watcher_picks_up_rewrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("targets.json");
        let manager = Arc::new(TargetConfigManager::load(path.clone()).unwrap());
        let version = manager.last_updated();

        tokio::spawn(manager.clone().watch());
        // Wait past coarse filesystem mtime granularity before rewriting.
        tokio::time::sleep(Duration::from_millis(1100)).await;

        let file = serde_json::json!({ "targets": [
            { "id": 3, "name": "c", "kind": "icmp", "endpoint": "c.example",
              "intervalMs": 30000, "timeoutMs": 2000 },
        ]});
        std::fs::write(&path, serde_json::to_vec_pretty(&file).unwrap()).unwrap();

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(manager.has_changes_since(version));
        assert!(manager.get(3).is_some());
    }
}
