//! Cycle loop runner.
//!
//! [`run_colony`] drives [`run_cycle`] on an interval until the cycle limit
//! is reached or a stop is requested. Between cycles a [`CycleCallback`]
//! gets mutable access to the world and host so it can advance world time.
//!
//! [`run_cycle`]: crate::cycle::run_cycle

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use colony_world::World;
use tracing::info;

use crate::config::RunConfig;
use crate::cycle::{self, ColonyState};
use crate::diagnostics::CycleReport;
use crate::host::ComputeHost;

/// Why the run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunEndReason {
    /// `max_cycles` cycles completed.
    CycleLimit,
    /// A stop was requested through the [`StopSignal`].
    Stopped,
}

/// Result of a run.
#[derive(Debug)]
pub struct RunSummary {
    /// Why the run ended.
    pub end_reason: RunEndReason,
    /// Report of the last cycle, if any ran.
    pub final_report: Option<CycleReport>,
    /// Cycles executed.
    pub total_cycles: u64,
    /// Agent-step faults across the run.
    pub agent_faults: u64,
    /// Cycles that ended in an orchestrator fault.
    pub orchestrator_faults: u64,
}

/// Shared flag an operator (or a signal handler) sets to end the run after
/// the current cycle.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    stopped: Arc<AtomicBool>,
}

impl StopSignal {
    /// A signal that has not fired.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the runner to stop.
    pub fn request_stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    /// Whether a stop was requested.
    pub fn is_stop_requested(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Hook invoked after every cycle.
pub trait CycleCallback<W, H>: Send {
    /// Called with the cycle's report and mutable access to the host side.
    fn on_cycle(&mut self, report: &CycleReport, state: &ColonyState, world: &mut W, host: &mut H);
}

/// A callback that does nothing.
pub struct NoOpCallback;

impl<W, H> CycleCallback<W, H> for NoOpCallback {
    fn on_cycle(&mut self, _report: &CycleReport, _state: &ColonyState, _world: &mut W, _host: &mut H) {}
}

/// Run cycles until a termination condition is met.
///
/// A `max_cycles` of zero runs until stopped.
pub async fn run_colony<W, H, C>(
    state: &mut ColonyState,
    world: &mut W,
    host: &mut H,
    config: &RunConfig,
    stop: &StopSignal,
    callback: &mut C,
) -> RunSummary
where
    W: World + Send,
    H: ComputeHost + Send,
    C: CycleCallback<W, H>,
{
    let mut summary = RunSummary {
        end_reason: RunEndReason::CycleLimit,
        final_report: None,
        total_cycles: 0,
        agent_faults: 0,
        orchestrator_faults: 0,
    };

    info!(
        start_tick = state.tick(),
        max_cycles = config.max_cycles,
        tick_interval_ms = config.tick_interval_ms,
        "Colony starting"
    );

    loop {
        if stop.is_stop_requested() {
            info!(tick = state.tick(), "Stop requested");
            summary.end_reason = RunEndReason::Stopped;
            return summary;
        }

        let report = cycle::run_cycle(state, &mut *world, &*host);
        report.log();
        summary.total_cycles = summary.total_cycles.saturating_add(1);
        summary.agent_faults = summary.agent_faults.saturating_add(u64::from(report.faults));
        if report.orchestrator_fault.is_some() {
            summary.orchestrator_faults = summary.orchestrator_faults.saturating_add(1);
        }

        callback.on_cycle(&report, state, world, host);

        let done = config.max_cycles > 0 && summary.total_cycles >= config.max_cycles;
        summary.final_report = Some(report);
        if done {
            info!(tick = state.tick(), max_cycles = config.max_cycles, "Cycle limit reached");
            return summary;
        }

        if config.tick_interval_ms > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(config.tick_interval_ms)).await;
        }
    }
}

/// Log the end of a run.
pub fn log_run_end(summary: &RunSummary) {
    info!(
        reason = ?summary.end_reason,
        total_cycles = summary.total_cycles,
        final_tick = summary.final_report.as_ref().map(|r| r.tick),
        final_level = summary.final_report.as_ref().map(|r| r.level.label()),
        agent_faults = summary.agent_faults,
        orchestrator_faults = summary.orchestrator_faults,
        "Colony run ended"
    );
}
