//! Simulated compute host.
//!
//! [`MeteredWorld`] wraps a world and charges every query and action to a
//! shared [`ComputeMeter`]. [`SimHost`] reads that meter as the cycle's
//! compute usage and keeps a reserve bucket: unused compute below the limit
//! refills it up to the cap, overspend drains it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use colony_core::config::HostConfig;
use colony_core::host::ComputeHost;
use colony_types::{AgentId, Body, Category, Entity, EntityRef, NodeId, Position, SiteId, ZoneId};
use colony_world::{MoveOutcome, WorldActions, WorldError, WorldQuery};
use tracing::trace;

/// Compute units spent this cycle, shared between the world and the host.
#[derive(Debug, Clone, Default)]
pub struct ComputeMeter {
    used: Arc<AtomicU64>,
}

impl ComputeMeter {
    /// A meter at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `units` to the running total.
    pub fn charge(&self, units: u64) {
        let _ = self
            .used
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |used| {
                Some(used.saturating_add(units))
            });
    }

    /// Units spent since the last [`take`](Self::take).
    pub fn used(&self) -> u64 {
        self.used.load(Ordering::Relaxed)
    }

    /// Return the total and reset it to zero.
    pub fn take(&self) -> u64 {
        self.used.swap(0, Ordering::Relaxed)
    }
}

/// A world whose every call costs compute.
#[derive(Debug)]
pub struct MeteredWorld<W> {
    inner: W,
    meter: ComputeMeter,
    query_cost: u64,
    action_cost: u64,
}

impl<W> MeteredWorld<W> {
    /// Wrap `inner`, charging to `meter` at the rates in `config`.
    pub const fn new(inner: W, meter: ComputeMeter, config: &HostConfig) -> Self {
        Self {
            inner,
            meter,
            query_cost: config.query_cost,
            action_cost: config.action_cost,
        }
    }

    /// The unmetered world, for host-side bookkeeping such as spawning.
    pub const fn inner_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    fn query_charge(&self) {
        self.meter.charge(self.query_cost);
    }

    fn action_charge(&self) {
        self.meter.charge(self.action_cost);
    }
}

impl<W: WorldQuery> WorldQuery for MeteredWorld<W> {
    fn query(&self, zone: ZoneId, category: Category, filter: &dyn Fn(&Entity) -> bool) -> Vec<Entity> {
        self.query_charge();
        self.inner.query(zone, category, filter)
    }

    fn resolve(&self, target: EntityRef) -> Option<Entity> {
        self.query_charge();
        self.inner.resolve(target)
    }

    fn census(&self) -> Vec<Body> {
        self.query_charge();
        self.inner.census()
    }

    fn zones(&self) -> Vec<ZoneId> {
        self.inner.zones()
    }

    fn idle_position(&self, zone: ZoneId) -> Option<Position> {
        self.inner.idle_position(zone)
    }

    fn controller(&self, zone: ZoneId) -> Option<SiteId> {
        self.inner.controller(zone)
    }
}

impl<W: WorldActions> WorldActions for MeteredWorld<W> {
    fn move_toward(&mut self, agent: AgentId, to: Position, path_budget: u32) -> MoveOutcome {
        self.action_charge();
        self.inner.move_toward(agent, to, path_budget)
    }

    fn harvest(&mut self, agent: AgentId, node: NodeId) -> Result<u32, WorldError> {
        self.action_charge();
        self.inner.harvest(agent, node)
    }

    fn withdraw(&mut self, agent: AgentId, from: SiteId, amount: u32) -> Result<u32, WorldError> {
        self.action_charge();
        self.inner.withdraw(agent, from, amount)
    }

    fn transfer(&mut self, agent: AgentId, to: EntityRef, amount: u32) -> Result<u32, WorldError> {
        self.action_charge();
        self.inner.transfer(agent, to, amount)
    }

    fn build(&mut self, agent: AgentId, site: SiteId) -> Result<u32, WorldError> {
        self.action_charge();
        self.inner.build(agent, site)
    }

    fn upgrade(&mut self, agent: AgentId, site: SiteId) -> Result<u32, WorldError> {
        self.action_charge();
        self.inner.upgrade(agent, site)
    }
}

/// Host with a per-cycle limit and a replenishing reserve.
#[derive(Debug)]
pub struct SimHost {
    meter: ComputeMeter,
    config: HostConfig,
    reserve: u64,
}

impl SimHost {
    /// A host with a full reserve. The first cycle's overhead is charged
    /// immediately.
    pub fn new(meter: ComputeMeter, config: HostConfig) -> Self {
        meter.charge(config.overhead);
        Self {
            meter,
            reserve: config.reserve_cap,
            config,
        }
    }

    /// Close the cycle's accounting: move the difference between the limit
    /// and what was spent into or out of the reserve, then start the next
    /// cycle's meter at the fixed overhead. Returns the units spent.
    pub fn settle(&mut self) -> u64 {
        let used = self.meter.take();
        let limit = self.config.compute_limit;
        self.reserve = if used <= limit {
            self.reserve
                .saturating_add(limit.saturating_sub(used))
                .min(self.config.reserve_cap)
        } else {
            self.reserve.saturating_sub(used.saturating_sub(limit))
        };
        trace!(used, limit, reserve = self.reserve, "Host settled");
        self.meter.charge(self.config.overhead);
        used
    }
}

impl ComputeHost for SimHost {
    fn compute_used(&self) -> f64 {
        self.meter.used() as f64
    }

    fn compute_limit(&self) -> f64 {
        self.config.compute_limit as f64
    }

    fn reserve(&self) -> u64 {
        self.reserve
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use colony_world::{SimWorld, SimWorldConfig};

    use super::*;

    fn config() -> HostConfig {
        HostConfig {
            compute_limit: 100,
            query_cost: 1,
            action_cost: 3,
            overhead: 10,
            reserve_cap: 1_000,
        }
    }

    #[test]
    fn world_calls_are_charged() {
        let meter = ComputeMeter::new();
        let mut inner = SimWorld::new(SimWorldConfig::default());
        let zone = inner.add_zone(Position::new(0, 0));
        let agent = inner.spawn_body(zone, colony_types::Role::Gatherer, Position::new(0, 0), 50, 100);
        let mut world = MeteredWorld::new(inner, meter.clone(), &config());

        world.census();
        world.body(agent);
        world.move_toward(agent, Position::new(5, 5), 10);
        assert_eq!(meter.used(), 5);

        // Spawning through the inner world is free.
        world
            .inner_mut()
            .spawn_body(zone, colony_types::Role::Builder, Position::new(1, 1), 50, 100);
        assert_eq!(meter.used(), 5);
    }

    #[test]
    fn overspend_drains_and_underspend_refills() {
        let meter = ComputeMeter::new();
        let mut host = SimHost::new(meter.clone(), config());
        assert_eq!(host.reserve(), 1_000);
        assert!((host.compute_used() - 10.0).abs() < f64::EPSILON);

        meter.charge(290);
        assert_eq!(host.settle(), 300);
        assert_eq!(host.reserve(), 800);

        meter.charge(30);
        assert_eq!(host.settle(), 40);
        assert_eq!(host.reserve(), 860);

        for _ in 0..5 {
            host.settle();
        }
        assert_eq!(host.reserve(), 1_000);
    }
}
