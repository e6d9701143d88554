//! Memory hygiene, the first phase of every cycle.
//!
//! Takes a census of live bodies, registers agents on first sighting, and
//! purges agents from every shared structure one cycle after they were
//! observed missing or out of lifetime. Also drops node bindings for nodes
//! that no longer exist and evicts expired cache entries.

use std::collections::BTreeSet;

use colony_agents::{AgentRegistry, NodeAssignments};
use colony_cache::{DurableStateBuffer, WorldFactsCache};
use colony_market::RequestMarket;
use colony_types::{AgentId, EntityRef};
use colony_world::WorldQuery;
use tracing::debug;

/// Shared structures hygiene cleans.
pub struct HygieneTargets<'a> {
    /// Agent registry.
    pub registry: &'a mut AgentRegistry,
    /// Gatherer-to-node bindings.
    pub assignments: &'a mut NodeAssignments,
    /// Request market.
    pub market: &'a mut RequestMarket,
    /// Fact cache.
    pub cache: &'a mut WorldFactsCache,
    /// Durable buffer, for dropping persisted agent records.
    pub buffer: &'a mut DurableStateBuffer,
}

/// What one hygiene pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HygieneReport {
    /// Agents registered on first sighting.
    pub registered: usize,
    /// Agents purged this cycle.
    pub purged: Vec<AgentId>,
    /// Agents observed missing, to be purged next cycle.
    pub pending: usize,
    /// Node bindings dropped because the node vanished.
    pub unbound: usize,
    /// Expired cache entries evicted.
    pub expired_facts: usize,
}

/// Tracks agents awaiting their deferred purge.
#[derive(Debug, Clone, Default)]
pub struct Hygiene {
    pending: BTreeSet<AgentId>,
}

impl Hygiene {
    /// No agent pending.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `agent` was observed missing and is awaiting purge.
    pub fn is_pending(&self, agent: AgentId) -> bool {
        self.pending.contains(&agent)
    }

    /// Run one pass at tick `now`.
    pub fn run<W: WorldQuery + ?Sized>(
        &mut self,
        now: u64,
        world: &W,
        targets: &mut HygieneTargets<'_>,
    ) -> HygieneReport {
        let mut report = HygieneReport::default();
        let census = world.census();
        let live: BTreeSet<AgentId> = census
            .iter()
            .filter(|b| b.ticks_to_live > 0)
            .map(|b| b.id)
            .collect();

        // Purge what was missing last cycle and is still gone.
        for id in std::mem::take(&mut self.pending) {
            if live.contains(&id) {
                continue;
            }
            targets.registry.remove(id);
            targets.assignments.unbind(id);
            targets.market.forget_agent(id);
            targets.buffer.remove_agent(id);
            debug!(tick = now, agent_id = %id, "Agent purged");
            report.purged.push(id);
        }

        for body in census.iter().filter(|b| live.contains(&b.id)) {
            if targets.registry.register(body) {
                report.registered = report.registered.saturating_add(1);
            } else if let Some(agent) = targets.registry.get_mut(body.id) {
                agent.ticks_to_live = body.ticks_to_live;
            }
        }

        for agent in targets.registry.iter() {
            if !live.contains(&agent.id) || agent.is_expired() {
                debug!(tick = now, agent_id = %agent.id, role = %agent.role, "Agent missing, purging next cycle");
                self.pending.insert(agent.id);
            }
        }
        report.pending = self.pending.len();

        let vanished: Vec<_> = targets
            .assignments
            .nodes()
            .filter(|node| world.resolve(EntityRef::Node(*node)).is_none())
            .collect();
        for node in vanished {
            let dropped = targets.assignments.purge_node(node);
            report.unbound = report.unbound.saturating_add(dropped.len());
        }

        report.expired_facts = targets.cache.purge_expired(now);
        report
    }
}
