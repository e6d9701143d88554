//! Budget controller: the single gate that decides which tiers run.
//!
//! The controller looks at two signals:
//!
//! - a rolling window of per-cycle utilization ratios (`used / limit`),
//!   which moves the operating [`BudgetLevel`] between `Normal` and the two
//!   degraded levels once per cycle, with hysteresis on the way back;
//! - the instantaneous reserve, snapshotted by [`BudgetController::begin_cycle`],
//!   which sheds load immediately while the level is still `Normal`.
//!
//! Call sites only ever ask [`BudgetController::may_run`]; the raw level is
//! exposed for diagnostics.

use std::collections::{BTreeMap, VecDeque};

use colony_types::{BudgetLevel, Tier};
use serde::Deserialize;
use tracing::{info, warn};

/// Thresholds of the budget controller.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BudgetConfig {
    /// Number of recent cycles averaged.
    #[serde(default = "default_window")]
    pub window: usize,

    /// Mean utilization above which the controller degrades.
    #[serde(default = "default_enter_mean")]
    pub enter_mean: f64,

    /// Mean utilization below which a degraded controller may recover.
    #[serde(default = "default_exit_mean")]
    pub exit_mean: f64,

    /// Reserve below which degradation is critical.
    #[serde(default = "default_critical_reserve")]
    pub critical_reserve: u64,

    /// Reserve below which the controller degrades, and below which only
    /// Critical work runs under `Normal`.
    #[serde(default = "default_low_reserve")]
    pub low_reserve: u64,

    /// Reserve below which Medium and Low work is shed under `Normal`.
    #[serde(default = "default_medium_reserve")]
    pub medium_reserve: u64,

    /// Reserve below which Low work is shed under `Normal`; recovery needs
    /// the reserve above it.
    #[serde(default = "default_high_reserve")]
    pub high_reserve: u64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            window: default_window(),
            enter_mean: default_enter_mean(),
            exit_mean: default_exit_mean(),
            critical_reserve: default_critical_reserve(),
            low_reserve: default_low_reserve(),
            medium_reserve: default_medium_reserve(),
            high_reserve: default_high_reserve(),
        }
    }
}

const fn default_window() -> usize {
    10
}

const fn default_enter_mean() -> f64 {
    0.9
}

const fn default_exit_mean() -> f64 {
    0.7
}

const fn default_critical_reserve() -> u64 {
    1_000
}

const fn default_low_reserve() -> u64 {
    2_000
}

const fn default_medium_reserve() -> u64 {
    5_000
}

const fn default_high_reserve() -> u64 {
    8_000
}

/// Compute spent and agents run or skipped for one tier this cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TierUsage {
    /// Compute used by the tier's agents.
    pub used: f64,
    /// Agents stepped.
    pub ran: u32,
    /// Agents skipped by the gate.
    pub skipped: u32,
}

/// A level transition, returned for logging and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelChange {
    /// Level before the transition.
    pub from: BudgetLevel,
    /// Level after the transition.
    pub to: BudgetLevel,
    /// Tick the transition happened at.
    pub tick: u64,
    /// Mean utilization of the window, if any samples exist.
    pub mean: Option<f64>,
    /// Reserve at the end of the cycle.
    pub reserve: u64,
}

/// Rolling-window budget controller with a reserve-aware gate.
#[derive(Debug, Clone)]
pub struct BudgetController {
    config: BudgetConfig,
    samples: VecDeque<f64>,
    level: BudgetLevel,
    degraded_since: Option<u64>,
    latched: bool,
    gate_reserve: u64,
    usage: BTreeMap<Tier, TierUsage>,
}

impl BudgetController {
    /// A controller at `Normal` with an empty window and a full gate.
    pub const fn new(config: BudgetConfig) -> Self {
        Self {
            config,
            samples: VecDeque::new(),
            level: BudgetLevel::Normal,
            degraded_since: None,
            latched: false,
            gate_reserve: u64::MAX,
            usage: BTreeMap::new(),
        }
    }

    /// Configured thresholds.
    pub const fn config(&self) -> &BudgetConfig {
        &self.config
    }

    /// Current operating level.
    pub const fn level(&self) -> BudgetLevel {
        self.level
    }

    /// Tick at which the current degradation began.
    pub const fn degraded_since(&self) -> Option<u64> {
        self.degraded_since
    }

    /// Whether the failsafe latch is engaged.
    pub const fn is_latched(&self) -> bool {
        self.latched
    }

    /// Mean utilization over the window, or `None` before the first sample.
    pub fn mean_utilization(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let sum: f64 = self.samples.iter().sum();
        Some(sum / self.samples.len() as f64)
    }

    /// Snapshot the reserve that gates this cycle and reset per-tier usage.
    ///
    /// Must run before any gated work so every tier sees the same decision.
    pub fn begin_cycle(&mut self, reserve: u64) {
        self.gate_reserve = reserve;
        self.usage.clear();
    }

    /// Whether work of `tier` may run this cycle.
    pub fn may_run(&self, tier: Tier) -> bool {
        tier <= self.lowest_allowed()
    }

    /// Least important tier the gate currently admits.
    pub const fn lowest_allowed(&self) -> Tier {
        match self.level {
            BudgetLevel::DegradedCritical => Tier::Critical,
            BudgetLevel::DegradedHigh => Tier::High,
            BudgetLevel::Normal => {
                let reserve = self.gate_reserve;
                if reserve < self.config.low_reserve {
                    Tier::Critical
                } else if reserve < self.config.medium_reserve {
                    Tier::High
                } else if reserve < self.config.high_reserve {
                    Tier::Medium
                } else {
                    Tier::Low
                }
            }
        }
    }

    /// Charge `used` compute to `tier` for one agent step.
    pub fn record_run(&mut self, tier: Tier, used: f64) {
        let entry = self.usage.entry(tier).or_default();
        entry.used += used.max(0.0);
        entry.ran = entry.ran.saturating_add(1);
    }

    /// Count `agents` the gate held back.
    pub fn record_skips(&mut self, tier: Tier, agents: usize) {
        let entry = self.usage.entry(tier).or_default();
        let agents = u32::try_from(agents).unwrap_or(u32::MAX);
        entry.skipped = entry.skipped.saturating_add(agents);
    }

    /// Per-tier usage since [`begin_cycle`](Self::begin_cycle).
    pub const fn usage(&self) -> &BTreeMap<Tier, TierUsage> {
        &self.usage
    }

    /// Close the cycle: record its utilization and re-evaluate the level.
    ///
    /// A non-positive `limit` counts as full utilization.
    pub fn end_cycle(&mut self, tick: u64, used: f64, limit: f64, reserve: u64) -> Option<LevelChange> {
        let ratio = if limit > 0.0 { (used / limit).max(0.0) } else { 1.0 };
        self.samples.push_back(ratio);
        while self.samples.len() > self.config.window.max(1) {
            self.samples.pop_front();
        }

        if self.latched {
            return None;
        }

        let mean = self.mean_utilization();
        let overloaded = mean.is_some_and(|m| m > self.config.enter_mean);
        let next = if overloaded || reserve < self.config.low_reserve {
            if reserve < self.config.critical_reserve {
                BudgetLevel::DegradedCritical
            } else {
                BudgetLevel::DegradedHigh
            }
        } else if self.level.is_degraded()
            && mean.is_some_and(|m| m < self.config.exit_mean)
            && reserve > self.config.high_reserve
        {
            BudgetLevel::Normal
        } else {
            self.level
        };

        self.transition(next, tick, mean, reserve)
    }

    /// Pin the controller to `DegradedCritical` for the rest of the run.
    pub fn force_critical(&mut self, tick: u64) -> Option<LevelChange> {
        self.latched = true;
        let reserve = self.gate_reserve;
        let mean = self.mean_utilization();
        self.transition(BudgetLevel::DegradedCritical, tick, mean, reserve)
    }

    fn transition(
        &mut self,
        next: BudgetLevel,
        tick: u64,
        mean: Option<f64>,
        reserve: u64,
    ) -> Option<LevelChange> {
        if next == self.level {
            return None;
        }
        let change = LevelChange {
            from: self.level,
            to: next,
            tick,
            mean,
            reserve,
        };
        self.level = next;
        if next.is_degraded() {
            if self.degraded_since.is_none() {
                self.degraded_since = Some(tick);
            }
            warn!(
                tick,
                from = change.from.label(),
                level = next.label(),
                mean = ?mean,
                reserve,
                latched = self.latched,
                "Budget degraded"
            );
        } else {
            let since = self.degraded_since.take();
            info!(
                tick,
                from = change.from.label(),
                mean = ?mean,
                reserve,
                degraded_since = ?since,
                "Budget recovered"
            );
        }
        Some(change)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn controller() -> BudgetController {
        BudgetController::new(BudgetConfig::default())
    }

    /// Feed `cycles` samples of `ratio` against a limit of 100.
    fn feed(c: &mut BudgetController, cycles: u64, ratio: f64, reserve: u64) -> Vec<LevelChange> {
        (1..=cycles)
            .filter_map(|tick| {
                c.begin_cycle(reserve);
                c.end_cycle(tick, ratio * 100.0, 100.0, reserve)
            })
            .collect()
    }

    #[test]
    fn overload_with_exhausted_reserve_is_critical() {
        let mut c = controller();
        feed(&mut c, 10, 0.95, 800);

        assert_eq!(c.level(), BudgetLevel::DegradedCritical);
        assert!(!c.may_run(Tier::Low));
        assert!(!c.may_run(Tier::Medium));
        assert!(c.may_run(Tier::Critical));
        assert_eq!(c.degraded_since(), Some(1));
    }

    #[test]
    fn overload_with_reserve_is_high() {
        let mut c = controller();
        let changes = feed(&mut c, 10, 0.95, 9_000);
        assert_eq!(c.level(), BudgetLevel::DegradedHigh);
        assert_eq!(changes.len(), 1);
        assert!(c.may_run(Tier::High));
        assert!(!c.may_run(Tier::Medium));
    }

    #[test]
    fn gate_truth_table() {
        let config = BudgetConfig::default();
        let bands = [
            (500, Tier::Critical),
            (config.low_reserve, Tier::High),
            (config.medium_reserve, Tier::Medium),
            (config.high_reserve, Tier::Low),
        ];
        let levels = [
            BudgetLevel::Normal,
            BudgetLevel::DegradedHigh,
            BudgetLevel::DegradedCritical,
        ];

        for level in levels {
            for (reserve, normal_floor) in bands {
                let mut c = controller();
                c.level = level;
                c.begin_cycle(reserve);
                for tier in Tier::ALL {
                    let expected = match level {
                        BudgetLevel::DegradedCritical => tier == Tier::Critical,
                        BudgetLevel::DegradedHigh => matches!(tier, Tier::Critical | Tier::High),
                        BudgetLevel::Normal => tier <= normal_floor,
                    };
                    assert_eq!(
                        c.may_run(tier),
                        expected,
                        "level {level:?} reserve {reserve} tier {tier:?}"
                    );
                }
                assert!(c.may_run(Tier::Critical));
            }
        }
    }

    #[test]
    fn gate_uses_the_reserve_snapshot() {
        let mut c = controller();
        c.begin_cycle(3_000);
        assert!(c.may_run(Tier::High));
        assert!(!c.may_run(Tier::Medium));
        c.begin_cycle(10_000);
        assert!(c.may_run(Tier::Low));
    }

    #[test]
    fn recovery_needs_sustained_headroom() {
        let mut c = controller();
        feed(&mut c, 10, 0.95, 9_000);
        assert_eq!(c.level(), BudgetLevel::DegradedHigh);

        // Mean drifts down but stays above the exit threshold.
        feed(&mut c, 3, 0.5, 9_000);
        assert!(c.mean_utilization().unwrap() > 0.7);
        assert_eq!(c.level(), BudgetLevel::DegradedHigh);

        // Low usage but not enough reserve.
        feed(&mut c, 10, 0.5, 6_000);
        assert_eq!(c.level(), BudgetLevel::DegradedHigh);

        let changes = feed(&mut c, 1, 0.5, 9_000);
        assert_eq!(c.level(), BudgetLevel::Normal);
        assert_eq!(changes.first().map(|ch| ch.from), Some(BudgetLevel::DegradedHigh));
        assert_eq!(c.degraded_since(), None);
    }

    #[test]
    fn reserve_alone_degrades() {
        let mut c = controller();
        feed(&mut c, 1, 0.1, 1_500);
        assert_eq!(c.level(), BudgetLevel::DegradedHigh);
        feed(&mut c, 1, 0.1, 900);
        assert_eq!(c.level(), BudgetLevel::DegradedCritical);
    }

    #[test]
    fn window_is_bounded() {
        let mut c = controller();
        feed(&mut c, 25, 0.2, 9_000);
        assert_eq!(c.samples.len(), 10);
        feed(&mut c, 10, 0.8, 9_000);
        assert!((c.mean_utilization().unwrap() - 0.8).abs() < 1e-9);
    }

    #[test]
    fn zero_limit_counts_as_full() {
        let mut c = controller();
        c.begin_cycle(9_000);
        c.end_cycle(1, 5.0, 0.0, 9_000);
        assert!((c.mean_utilization().unwrap() - 1.0).abs() < f64::EPSILON);
        assert_eq!(c.level(), BudgetLevel::DegradedHigh);
    }

    #[test]
    fn latch_pins_critical() {
        let mut c = controller();
        c.begin_cycle(9_000);
        let change = c.force_critical(4).unwrap();
        assert_eq!(change.to, BudgetLevel::DegradedCritical);
        assert!(c.is_latched());

        feed(&mut c, 20, 0.1, 20_000);
        assert_eq!(c.level(), BudgetLevel::DegradedCritical);
        assert!(!c.may_run(Tier::High));
        assert!(c.force_critical(30).is_none());
    }

    #[test]
    fn per_tier_accounting_resets_each_cycle() {
        let mut c = controller();
        c.begin_cycle(9_000);
        c.record_run(Tier::Critical, 1.5);
        c.record_run(Tier::Critical, 0.5);
        c.record_skips(Tier::Low, 1);

        let critical = c.usage().get(&Tier::Critical).copied().unwrap();
        assert!((critical.used - 2.0).abs() < f64::EPSILON);
        assert_eq!(critical.ran, 2);
        assert_eq!(c.usage().get(&Tier::Low).map(|u| u.skipped), Some(1));

        c.begin_cycle(9_000);
        assert!(c.usage().is_empty());
    }
}
