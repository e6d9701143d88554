//! End-of-cycle write buffer.
//!
//! Agent logic never writes to the durable store directly. Every write is
//! staged here and the whole buffer is flushed once, after all agents have
//! run. Staging the same field twice keeps only the later value, so a field
//! touched by many agents in one cycle costs a single durable write.

use std::collections::BTreeMap;

use colony_types::{AgentId, AgentRecord, ZoneId};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::field::ZoneField;
use crate::store::DurableStore;

/// Summary of one flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Per-zone values written.
    pub writes: usize,
    /// Per-zone values removed.
    pub removals: usize,
    /// Agent records written or removed.
    pub agents: usize,
}

impl FlushReport {
    /// Total durable operations performed.
    pub const fn total(&self) -> usize {
        self.writes
            .saturating_add(self.removals)
            .saturating_add(self.agents)
    }
}

/// Staged per-zone and per-agent writes for the current cycle.
///
/// `None` values are staged removals.
#[derive(Debug, Default)]
pub struct DurableStateBuffer {
    fields: BTreeMap<(ZoneId, ZoneField), Option<Value>>,
    agents: BTreeMap<AgentId, Option<AgentRecord>>,
    last_flushed: Option<u64>,
}

impl DurableStateBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a per-zone value. A later stage of the same field wins.
    pub fn stage(&mut self, zone: ZoneId, field: ZoneField, value: Value) {
        self.fields.insert((zone, field), Some(value));
    }

    /// Stage the removal of a per-zone value.
    pub fn stage_removal(&mut self, zone: ZoneId, field: ZoneField) {
        self.fields.insert((zone, field), None);
    }

    /// Stage an agent record.
    pub fn stage_agent(&mut self, agent: AgentId, record: AgentRecord) {
        self.agents.insert(agent, Some(record));
    }

    /// Stage the removal of an agent record.
    pub fn remove_agent(&mut self, agent: AgentId) {
        self.agents.insert(agent, None);
    }

    /// The currently staged value of a field.
    ///
    /// Returns `None` if nothing is staged, `Some(None)` for a staged removal.
    pub fn staged(&self, zone: ZoneId, field: &ZoneField) -> Option<Option<&Value>> {
        self.fields
            .get(&(zone, field.clone()))
            .map(Option::as_ref)
    }

    /// Number of staged per-zone operations.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether nothing at all is staged.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.agents.is_empty()
    }

    /// Last tick that was flushed.
    pub const fn last_flushed(&self) -> Option<u64> {
        self.last_flushed
    }

    /// Apply every staged operation to `store` and commit it.
    ///
    /// May run at most once per tick. The buffer is emptied even when the
    /// commit fails; the next cycle re-derives whatever was lost.
    pub fn flush(
        &mut self,
        tick: u64,
        store: &mut dyn DurableStore,
    ) -> Result<FlushReport, StoreError> {
        if self.last_flushed == Some(tick) {
            return Err(StoreError::AlreadyFlushed { tick });
        }
        self.last_flushed = Some(tick);

        let mut report = FlushReport::default();
        for ((zone, field), value) in std::mem::take(&mut self.fields) {
            match value {
                Some(value) => {
                    store.write_field(zone, &field, value);
                    report.writes = report.writes.saturating_add(1);
                }
                None => {
                    if store.remove_field(zone, &field) {
                        report.removals = report.removals.saturating_add(1);
                    }
                }
            }
        }
        for (agent, record) in std::mem::take(&mut self.agents) {
            let agents = &mut store.snapshot_mut().agents;
            match record {
                Some(record) => {
                    agents.insert(agent, record);
                    report.agents = report.agents.saturating_add(1);
                }
                None => {
                    if agents.remove(&agent).is_some() {
                        report.agents = report.agents.saturating_add(1);
                    }
                }
            }
        }
        store.snapshot_mut().tick = tick;

        if let Err(e) = store.commit() {
            warn!(tick, error = %e, "Durable commit failed");
            return Err(e);
        }
        debug!(
            tick,
            writes = report.writes,
            removals = report.removals,
            agents = report.agents,
            "Durable state flushed"
        );
        Ok(report)
    }
}
