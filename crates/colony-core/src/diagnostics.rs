//! Per-cycle diagnostic counters.

use std::collections::BTreeMap;

use colony_cache::CacheStats;
use colony_types::{BudgetLevel, Tier};
use tracing::{debug, info};

use crate::budget::{LevelChange, TierUsage};

/// Everything the orchestrator reports about one cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    /// Tick the cycle ran at.
    pub tick: u64,
    /// Budget level at the end of the cycle.
    pub level: BudgetLevel,
    /// Level transition this cycle, if any.
    pub level_change: Option<LevelChange>,
    /// Compute and agent counts per tier.
    pub tiers: BTreeMap<Tier, TierUsage>,
    /// Registered agents after hygiene.
    pub agents: usize,
    /// Agents purged by hygiene.
    pub purged: usize,
    /// Agent-step faults caught this cycle.
    pub faults: u32,
    /// Requests removed by market validation.
    pub invalidated: usize,
    /// Requests open at the end of the cycle.
    pub open_requests: usize,
    /// Cache hits and misses this cycle.
    pub cache: CacheStats,
    /// Durable operations applied at flush.
    pub flushed: usize,
    /// Orchestrator-level fault, if one was caught.
    pub orchestrator_fault: Option<String>,
}

impl CycleReport {
    /// An empty report for `tick`.
    pub fn new(tick: u64, level: BudgetLevel) -> Self {
        Self {
            tick,
            level,
            level_change: None,
            tiers: BTreeMap::new(),
            agents: 0,
            purged: 0,
            faults: 0,
            invalidated: 0,
            open_requests: 0,
            cache: CacheStats::default(),
            flushed: 0,
            orchestrator_fault: None,
        }
    }

    /// Agents stepped across all tiers.
    pub fn ran(&self) -> u32 {
        self.tiers.values().fold(0_u32, |acc, t| acc.saturating_add(t.ran))
    }

    /// Agents held back by the gate across all tiers.
    pub fn skipped(&self) -> u32 {
        self.tiers.values().fold(0_u32, |acc, t| acc.saturating_add(t.skipped))
    }

    /// Compute charged to agent steps.
    pub fn compute_used(&self) -> f64 {
        self.tiers.values().map(|t| t.used).sum()
    }

    /// Emit the report as one structured log line, plus one per tier at debug.
    pub fn log(&self) {
        info!(
            tick = self.tick,
            level = self.level.label(),
            agents = self.agents,
            ran = self.ran(),
            skipped = self.skipped(),
            faults = self.faults,
            open_requests = self.open_requests,
            cache_hits = self.cache.hits,
            cache_misses = self.cache.misses,
            flushed = self.flushed,
            "Cycle complete"
        );
        for (tier, usage) in &self.tiers {
            debug!(
                tick = self.tick,
                tier = tier.label(),
                used = usage.used,
                ran = usage.ran,
                skipped = usage.skipped,
                "Tier usage"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_sum_over_tiers() {
        let mut report = CycleReport::new(3, BudgetLevel::Normal);
        report.tiers.insert(
            Tier::Critical,
            TierUsage {
                used: 1.5,
                ran: 3,
                skipped: 0,
            },
        );
        report.tiers.insert(
            Tier::Low,
            TierUsage {
                used: 0.5,
                ran: 1,
                skipped: 2,
            },
        );
        assert_eq!(report.ran(), 4);
        assert_eq!(report.skipped(), 2);
        assert!((report.compute_used() - 2.0).abs() < f64::EPSILON);
    }
}
