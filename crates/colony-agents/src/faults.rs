//! Bounded record of agent step faults.
//!
//! Only the most recent [`FAULT_LOG_CAPACITY`] faults are kept; older ones
//! are dropped as new ones arrive. The total count keeps growing so a
//! flood of faults is still visible after the ring has wrapped.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use colony_types::{AgentId, Role};

/// Default number of faults retained.
pub const FAULT_LOG_CAPACITY: usize = 10;

/// One caught fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultRecord {
    /// Cycle the fault happened in.
    pub tick: u64,
    /// Agent whose step failed.
    pub agent: AgentId,
    /// Role of that agent.
    pub role: Role,
    /// State label at the time of the fault.
    pub state: &'static str,
    /// Rendered error.
    pub message: String,
    /// Wall-clock time the fault was recorded.
    pub at: DateTime<Utc>,
}

/// Ring buffer of recent faults.
#[derive(Debug)]
pub struct FaultLog {
    entries: VecDeque<FaultRecord>,
    capacity: usize,
    total: u64,
}

impl Default for FaultLog {
    fn default() -> Self {
        Self::new(FAULT_LOG_CAPACITY)
    }
}

impl FaultLog {
    /// Create a log retaining at most `capacity` faults (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            total: 0,
        }
    }

    /// Record a fault, evicting the oldest one when full.
    pub fn record(
        &mut self,
        tick: u64,
        agent: AgentId,
        role: Role,
        state: &'static str,
        message: String,
    ) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(FaultRecord {
            tick,
            agent,
            role,
            state,
            message,
            at: Utc::now(),
        });
        self.total = self.total.saturating_add(1);
    }

    /// Retained faults, oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &FaultRecord> {
        self.entries.iter()
    }

    /// The most recent fault.
    pub fn latest(&self) -> Option<&FaultRecord> {
        self.entries.back()
    }

    /// Number of retained faults.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no fault is retained.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Faults recorded since creation, including evicted ones.
    pub const fn total(&self) -> u64 {
        self.total
    }
}
