//! Host-side work between cycles.

use colony_core::diagnostics::CycleReport;
use colony_core::host::ComputeHost;
use colony_core::{ColonyState, CycleCallback};
use colony_world::SimWorld;
use tracing::{debug, info};

use crate::sim_host::{MeteredWorld, SimHost};
use crate::spawner::Spawner;

/// Advances world time, runs the spawner, and settles the compute meter.
#[derive(Debug)]
pub struct HostCallback {
    spawner: Spawner,
    status_every: u64,
}

impl HostCallback {
    /// Log a colony status line every `status_every` cycles (0 disables).
    pub const fn new(spawner: Spawner, status_every: u64) -> Self {
        Self { spawner, status_every }
    }
}

impl CycleCallback<MeteredWorld<SimWorld>, SimHost> for HostCallback {
    fn on_cycle(
        &mut self,
        report: &CycleReport,
        state: &ColonyState,
        world: &mut MeteredWorld<SimWorld>,
        host: &mut SimHost,
    ) {
        let expired = world.inner_mut().advance_cycle();
        let spawned = self.spawner.run(state, world.inner_mut());
        let used = host.settle();
        debug!(
            tick = report.tick,
            expired = expired.len(),
            spawned,
            used,
            reserve = host.reserve(),
            "Host cycle closed"
        );

        if self.status_every > 0 && report.tick.checked_rem(self.status_every) == Some(0) {
            info!(
                tick = report.tick,
                level = report.level.label(),
                agents = report.agents,
                open_requests = report.open_requests,
                reserve = host.reserve(),
                total_faults = state.faults.total(),
                "Colony status"
            );
        }
    }
}
