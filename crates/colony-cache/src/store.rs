//! Durable store: the state the host keeps between cycles.
//!
//! The persisted layout is one [`ColonySnapshot`]: per-zone records with
//! `facts`, `requests`, and `plans` sections, plus one [`AgentRecord`] per
//! live agent. Nothing in it is authoritative source data; everything can
//! be re-derived from the world within a few cycles, so losing the last
//! unflushed cycle on a crash is acceptable.
//!
//! Two implementations are provided:
//!
//! - [`MemoryStore`] -- holds the snapshot in memory (tests, embedding hosts
//!   that persist the snapshot themselves).
//! - [`JsonFileStore`] -- writes the snapshot to a JSON file on every commit,
//!   via a temp file and rename so a crash never leaves a torn file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use colony_types::{AgentId, AgentRecord, ZoneId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::field::{Section, ZoneField};

/// Persisted values of a single zone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ZoneRecord {
    /// Derived facts and counters.
    #[serde(default)]
    pub facts: BTreeMap<String, Value>,
    /// Open resource requests keyed by request id.
    #[serde(default)]
    pub requests: BTreeMap<String, Value>,
    /// Placement plans keyed by plan name.
    #[serde(default)]
    pub plans: BTreeMap<String, Value>,
}

impl ZoneRecord {
    /// Borrow one section.
    pub const fn section(&self, section: Section) -> &BTreeMap<String, Value> {
        match section {
            Section::Facts => &self.facts,
            Section::Requests => &self.requests,
            Section::Plans => &self.plans,
        }
    }

    /// Mutably borrow one section.
    pub const fn section_mut(&mut self, section: Section) -> &mut BTreeMap<String, Value> {
        match section {
            Section::Facts => &mut self.facts,
            Section::Requests => &mut self.requests,
            Section::Plans => &mut self.plans,
        }
    }
}

/// Everything the scheduler persists between cycles.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColonySnapshot {
    /// Last cycle that was flushed.
    #[serde(default)]
    pub tick: u64,
    /// Per-zone records.
    #[serde(default)]
    pub zones: BTreeMap<ZoneId, ZoneRecord>,
    /// Per-agent records.
    #[serde(default)]
    pub agents: BTreeMap<AgentId, AgentRecord>,
}

/// Host-side persistence for flushed state.
pub trait DurableStore: Send {
    /// Borrow the current snapshot.
    fn snapshot(&self) -> &ColonySnapshot;

    /// Mutably borrow the current snapshot.
    fn snapshot_mut(&mut self) -> &mut ColonySnapshot;

    /// Make everything written since the last commit durable.
    fn commit(&mut self) -> Result<(), StoreError>;

    /// Read one per-zone value.
    fn read_field(&self, zone: ZoneId, field: &ZoneField) -> Option<&Value> {
        self.snapshot()
            .zones
            .get(&zone)
            .and_then(|record| record.section(field.section()).get(&field.key()))
    }

    /// Write one per-zone value.
    fn write_field(&mut self, zone: ZoneId, field: &ZoneField, value: Value) {
        self.snapshot_mut()
            .zones
            .entry(zone)
            .or_default()
            .section_mut(field.section())
            .insert(field.key(), value);
    }

    /// Delete one per-zone value. Returns `true` if it existed.
    fn remove_field(&mut self, zone: ZoneId, field: &ZoneField) -> bool {
        self.snapshot_mut()
            .zones
            .get_mut(&zone)
            .and_then(|record| record.section_mut(field.section()).remove(&field.key()))
            .is_some()
    }
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    snapshot: ColonySnapshot,
    writes: u64,
    commits: u64,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with a snapshot.
    pub fn from_snapshot(snapshot: ColonySnapshot) -> Self {
        Self {
            snapshot,
            ..Self::default()
        }
    }

    /// Number of field writes received.
    pub const fn writes(&self) -> u64 {
        self.writes
    }

    /// Number of commits received.
    pub const fn commits(&self) -> u64 {
        self.commits
    }
}

impl DurableStore for MemoryStore {
    fn snapshot(&self) -> &ColonySnapshot {
        &self.snapshot
    }

    fn snapshot_mut(&mut self) -> &mut ColonySnapshot {
        &mut self.snapshot
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        self.commits = self.commits.saturating_add(1);
        Ok(())
    }

    fn write_field(&mut self, zone: ZoneId, field: &ZoneField, value: Value) {
        self.writes = self.writes.saturating_add(1);
        self.snapshot
            .zones
            .entry(zone)
            .or_default()
            .section_mut(field.section())
            .insert(field.key(), value);
    }
}

/// Store that persists the snapshot as a JSON file.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    snapshot: ColonySnapshot,
}

impl JsonFileStore {
    /// Open the store at `path`, loading the existing snapshot if there is one.
    ///
    /// A missing file is a fresh start. A file that cannot be parsed is an
    /// error; the caller decides whether to discard it.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let snapshot = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            let snapshot: ColonySnapshot = serde_json::from_str(&contents)?;
            info!(
                path = %path.display(),
                tick = snapshot.tick,
                zones = snapshot.zones.len(),
                agents = snapshot.agents.len(),
                "Snapshot restored"
            );
            snapshot
        } else {
            debug!(path = %path.display(), "No snapshot found, starting fresh");
            ColonySnapshot::default()
        };
        Ok(Self { path, snapshot })
    }

    /// Create a store at `path` that ignores any existing file.
    pub fn fresh(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            snapshot: ColonySnapshot::default(),
        }
    }

    /// Location of the snapshot file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DurableStore for JsonFileStore {
    fn snapshot(&self) -> &ColonySnapshot {
        &self.snapshot
    }

    fn snapshot_mut(&mut self) -> &mut ColonySnapshot {
        &mut self.snapshot
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        let encoded = serde_json::to_vec(&self.snapshot)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, encoded)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), tick = self.snapshot.tick, "Snapshot committed");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use colony_types::{FactClass, Role};
    use serde_json::json;

    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("colony-store-{name}-{}.json", uuid::Uuid::new_v4()))
    }

    #[test]
    fn fields_route_to_sections() {
        let mut store = MemoryStore::new();
        let zone = ZoneId::new();
        store.write_field(zone, &ZoneField::RoleCount(Role::Builder), json!(3));
        store.write_field(zone, &ZoneField::Plan("extensions".to_owned()), json!([[1, 2]]));

        let record = store.snapshot().zones.get(&zone).unwrap();
        assert_eq!(record.facts.get("role_count.builder"), Some(&json!(3)));
        assert_eq!(record.plans.len(), 1);
        assert!(record.requests.is_empty());
        assert_eq!(
            store.read_field(zone, &ZoneField::RoleCount(Role::Builder)),
            Some(&json!(3))
        );
        assert_eq!(store.writes(), 2);
    }

    #[test]
    fn remove_field_reports_existence() {
        let mut store = MemoryStore::new();
        let zone = ZoneId::new();
        let field = ZoneField::Fact(FactClass::EnergySinks);
        assert!(!store.remove_field(zone, &field));
        store.write_field(zone, &field, json!([]));
        assert!(store.remove_field(zone, &field));
        assert!(store.read_field(zone, &field).is_none());
    }

    #[test]
    fn json_store_survives_reopen() {
        let path = temp_path("reopen");
        let zone = ZoneId::new();
        {
            let mut store = JsonFileStore::open(&path).unwrap();
            store.snapshot_mut().tick = 42;
            store.write_field(zone, &ZoneField::OpenRequests, json!(2));
            store.commit().unwrap();
        }
        let reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(reopened.snapshot().tick, 42);
        assert_eq!(reopened.read_field(zone, &ZoneField::OpenRequests), Some(&json!(2)));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn corrupt_snapshot_is_an_error() {
        let path = temp_path("corrupt");
        std::fs::write(&path, b"{not json").unwrap();
        let result = JsonFileStore::open(&path);
        assert!(matches!(result, Err(StoreError::Json { .. })));
        let _ = std::fs::remove_file(&path);
    }
}
