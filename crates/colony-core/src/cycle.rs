//! The cycle orchestrator.
//!
//! [`run_cycle`] is the single entry point the host calls once per tick.
//! Phases, in order:
//!
//! 1. **Clock and gate** -- advance the tick, snapshot the reserve into the
//!    budget gate. The gate is fixed before any gated work runs.
//! 2. **Hygiene** -- census, first-sighting registration, deferred purge.
//! 3. **Cache refresh** -- role counts and zone topology through
//!    `get_or_compute`.
//! 4. **Market validation** -- drop requests whose preconditions broke.
//! 5. **Dispatch** -- step agents tier by tier, most important first,
//!    skipping tiers the gate holds back. A faulting agent is logged to the
//!    ring buffer and sent home; the rest are unaffected.
//! 6. **Stage and flush** -- role counts, open requests, dirty facts, and
//!    agent records go into the durable buffer, which is flushed once.
//! 7. **Budget** -- record the cycle's utilization and re-evaluate the level.
//!
//! Anything escaping these phases is an orchestrator fault: it is logged at
//! `error` and pins the budget controller to `DegradedCritical` for the rest
//! of the run. The colony never halts.

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};

use colony_agents::{
    AgentConfig, AgentRegistry, FaultLog, NodeAssignments, StepContext, guarded_step,
    panic_message, return_to_base,
};
use colony_cache::{DurableStateBuffer, DurableStore, FactKey, WorldFactsCache, ZoneField};
use colony_market::{MarketView, RequestMarket};
use colony_types::{AgentId, Fact, FactClass, RequestId, ResourceRequest, Role, Tier, ZoneId};
use colony_world::World;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::budget::BudgetController;
use crate::clock::{ClockError, CycleClock};
use crate::config::{ColonyConfig, ScheduleConfig};
use crate::diagnostics::CycleReport;
use crate::host::ComputeHost;
use crate::hygiene::{Hygiene, HygieneTargets};

/// Errors that abort a cycle and count as orchestrator faults.
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    /// The clock could not advance.
    #[error("clock error: {source}")]
    Clock {
        /// The underlying clock error.
        #[from]
        source: ClockError,
    },

    /// A staged value could not be encoded.
    #[error("failed to encode staged value: {source}")]
    Encode {
        /// The underlying JSON error.
        #[from]
        source: serde_json::Error,
    },
}

/// A cached fact as persisted under `fact.<class>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedFact {
    /// Tick the fact was computed at.
    pub written_at: u64,
    /// The fact itself.
    pub fact: Fact,
}

/// Every structure the orchestrator owns, constructed once per process.
pub struct ColonyState {
    /// Cycle counter.
    pub clock: CycleClock,
    /// Budget gate.
    pub budget: BudgetController,
    /// Zone-scoped fact cache.
    pub cache: WorldFactsCache,
    /// End-of-cycle write buffer.
    pub buffer: DurableStateBuffer,
    /// Request market.
    pub market: RequestMarket,
    /// Known agents.
    pub registry: AgentRegistry,
    /// Gatherer-to-node bindings.
    pub assignments: NodeAssignments,
    /// Recent agent-step faults.
    pub faults: FaultLog,
    /// Deferred-purge bookkeeping.
    pub hygiene: Hygiene,
    /// Role to tier mapping.
    pub schedule: ScheduleConfig,
    /// Agent tunables.
    pub agent_config: AgentConfig,
    /// Host-side durable store.
    pub store: Box<dyn DurableStore>,
}

impl ColonyState {
    /// Fresh state at tick 0. The store's contents are not read.
    pub fn new(config: &ColonyConfig, store: Box<dyn DurableStore>) -> Self {
        Self {
            clock: CycleClock::new(),
            budget: BudgetController::new(config.budget.clone()),
            cache: WorldFactsCache::new(config.cache.clone()),
            buffer: DurableStateBuffer::new(),
            market: RequestMarket::new(config.market.clone()),
            registry: AgentRegistry::new(),
            assignments: NodeAssignments::new(),
            faults: FaultLog::default(),
            hygiene: Hygiene::new(),
            schedule: config.schedule.clone(),
            agent_config: config.agents.clone(),
            store,
        }
    }

    /// State resumed from whatever `store` last committed: the tick, agent
    /// records, open requests, and cached facts. Unreadable entries are
    /// skipped with a warning.
    pub fn restore(config: &ColonyConfig, store: Box<dyn DurableStore>) -> Self {
        let mut state = Self::new(config, store);
        let snapshot = state.store.snapshot();
        state.clock = CycleClock::from_tick(snapshot.tick);
        let agents = state.registry.restore(&snapshot.agents);

        let mut requests = Vec::new();
        let mut facts: usize = 0;
        for (zone, record) in &snapshot.zones {
            for (key, value) in &record.requests {
                match serde_json::from_value::<ResourceRequest>(value.clone()) {
                    Ok(request) => requests.push(request),
                    Err(e) => warn!(zone = %zone, request = %key, error = %e, "Skipping unreadable request"),
                }
            }
            for class in FactClass::ALL {
                if let Some(value) = record.facts.get(&ZoneField::Fact(class).key())
                    && let Ok(stored) = serde_json::from_value::<PersistedFact>(value.clone())
                {
                    state
                        .cache
                        .restore(FactKey::new(*zone, class), stored.fact, stored.written_at);
                    facts = facts.saturating_add(1);
                }
            }
        }
        let request_count = requests.len();
        state.market.restore(requests);

        info!(
            tick = state.clock.tick(),
            agents,
            requests = request_count,
            facts,
            "Colony state restored"
        );
        state
    }

    /// The current tick.
    pub const fn tick(&self) -> u64 {
        self.clock.tick()
    }

    /// Read-only per-zone value for external spawn and placement logic:
    /// the value staged this cycle if any, else the durable one.
    pub fn zone_data(&self, zone: ZoneId, field: &ZoneField) -> Option<&Value> {
        match self.buffer.staged(zone, field) {
            Some(staged) => staged,
            None => self.store.read_field(zone, field),
        }
    }

    /// Stage a placement plan so it is persisted at the next flush.
    pub fn stage_plan(&mut self, zone: ZoneId, name: impl Into<String>, plan: Value) {
        self.buffer.stage(zone, ZoneField::Plan(name.into()), plan);
    }
}

/// Run one cycle. Never fails: faults degrade the colony instead.
pub fn run_cycle(state: &mut ColonyState, world: &mut dyn World, host: &dyn ComputeHost) -> CycleReport {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| cycle(state, world, host)));
    let message = match outcome {
        Ok(Ok(report)) => return report,
        Ok(Err(e)) => e.to_string(),
        Err(payload) => panic_message(payload.as_ref()),
    };

    let tick = state.clock.tick();
    let level_change = state.budget.force_critical(tick);
    error!(tick, error = %message, "Orchestrator fault, budget pinned to critical");

    let mut report = CycleReport::new(tick, state.budget.level());
    report.level_change = level_change;
    report.agents = state.registry.len();
    report.open_requests = state.market.len();
    report.orchestrator_fault = Some(message);
    report
}

fn cycle(
    state: &mut ColonyState,
    world: &mut dyn World,
    host: &dyn ComputeHost,
) -> Result<CycleReport, CycleError> {
    let tick = state.clock.advance()?;
    state.budget.begin_cycle(host.reserve());
    state.cache.reset_stats();

    let hygiene = state.hygiene.run(
        tick,
        &*world,
        &mut HygieneTargets {
            registry: &mut state.registry,
            assignments: &mut state.assignments,
            market: &mut state.market,
            cache: &mut state.cache,
            buffer: &mut state.buffer,
        },
    );

    let zones = world.zones();
    refresh_zone_facts(state, &*world, &zones, tick);

    let invalidations = state.market.validate(
        tick,
        &CycleView {
            world: &*world,
            registry: &state.registry,
            hygiene: &state.hygiene,
        },
    );
    for inv in &invalidations {
        debug!(
            tick,
            request = %inv.request,
            zone = %inv.zone,
            requester = %inv.requester,
            reason = inv.reason.label(),
            "Request invalidated"
        );
    }

    let faults = dispatch(state, world, host, tick);

    stage_zone_data(state, &zones, tick)?;
    let flushed = match state.buffer.flush(tick, state.store.as_mut()) {
        Ok(flush) => flush.total(),
        Err(e) => {
            warn!(tick, error = %e, "Flush failed, staged state dropped");
            0
        }
    };

    let level_change = state.budget.end_cycle(
        tick,
        host.compute_used(),
        host.compute_limit(),
        host.reserve(),
    );

    let mut report = CycleReport::new(tick, state.budget.level());
    report.level_change = level_change;
    report.tiers = state.budget.usage().clone();
    report.agents = state.registry.len();
    report.purged = hygiene.purged.len();
    report.faults = faults;
    report.invalidated = invalidations.len();
    report.open_requests = state.market.len();
    report.cache = state.cache.stats();
    report.flushed = flushed;
    Ok(report)
}

/// Recompute role counts and topology for every zone if their windows
/// lapsed. Misses are marked dirty and persisted at flush.
fn refresh_zone_facts(state: &mut ColonyState, world: &dyn World, zones: &[ZoneId], tick: u64) {
    for &zone in zones {
        let registry = &state.registry;
        let hygiene = &state.hygiene;
        let ttl = state.cache.ttl_for(FactClass::RoleCounts);
        state.cache.get_or_compute(
            FactKey::new(zone, FactClass::RoleCounts),
            tick,
            ttl,
            || Fact::RoleCounts(role_counts(registry, hygiene, zone)),
        );

        if let Some(idle_position) = world.idle_position(zone) {
            let ttl = state.cache.ttl_for(FactClass::Topology);
            state.cache.get_or_compute(FactKey::new(zone, FactClass::Topology), tick, ttl, || {
                Fact::Topology {
                    controller: world.controller(zone),
                    idle_position,
                }
            });
        }
    }
}

fn role_counts(registry: &AgentRegistry, hygiene: &Hygiene, zone: ZoneId) -> BTreeMap<Role, u32> {
    let mut counts: BTreeMap<Role, u32> = Role::ALL.into_iter().map(|r| (r, 0)).collect();
    for agent in registry
        .iter()
        .filter(|a| a.home_zone == zone && !hygiene.is_pending(a.id))
    {
        let count = counts.entry(agent.role).or_insert(0);
        *count = count.saturating_add(1);
    }
    counts
}

/// Step every live agent whose tier the gate admits. Returns the number
/// of faults caught.
fn dispatch(state: &mut ColonyState, world: &mut dyn World, host: &dyn ComputeHost, tick: u64) -> u32 {
    let mut faults: u32 = 0;
    for tier in Tier::ALL {
        let ids: Vec<AgentId> = Role::ALL
            .into_iter()
            .filter(|role| state.schedule.tier_for(*role) == tier)
            .flat_map(|role| state.registry.ids_with_role(role))
            .filter(|id| !state.hygiene.is_pending(*id))
            .collect();
        if ids.is_empty() {
            continue;
        }
        if !state.budget.may_run(tier) {
            state.budget.record_skips(tier, ids.len());
            debug!(tick, tier = tier.label(), skipped = ids.len(), "Tier held back by budget gate");
            continue;
        }

        for id in ids {
            let Some(agent) = state.registry.get_mut(id) else {
                continue;
            };
            let before = host.compute_used();
            let mut ctx = StepContext {
                world: &mut *world,
                cache: &mut state.cache,
                market: &mut state.market,
                assignments: &mut state.assignments,
                config: &state.agent_config,
                now: tick,
            };
            if let Err(e) = guarded_step(agent, &mut ctx) {
                let label = agent.memory.state_label();
                warn!(
                    tick,
                    agent_id = %id,
                    role = %agent.role,
                    state = label,
                    error = %e,
                    "Agent step fault, returning to base"
                );
                state.faults.record(tick, id, agent.role, label, e.to_string());
                return_to_base(agent, &mut ctx);
                faults = faults.saturating_add(1);
            }
            state.budget.record_run(tier, host.compute_used() - before);
        }
    }
    faults
}

/// Stage everything external readers and crash recovery need.
fn stage_zone_data(state: &mut ColonyState, zones: &[ZoneId], tick: u64) -> Result<(), CycleError> {
    for &zone in zones {
        if let Some(Fact::RoleCounts(counts)) = state.cache.get(&FactKey::new(zone, FactClass::RoleCounts), tick) {
            for (role, count) in counts {
                state
                    .buffer
                    .stage(zone, ZoneField::RoleCount(*role), Value::from(*count));
            }
        }

        let open: Vec<&ResourceRequest> = state.market.open_in(zone).collect();
        state
            .buffer
            .stage(zone, ZoneField::OpenRequests, Value::from(open.len()));
        for request in open {
            state
                .buffer
                .stage(zone, ZoneField::Request(request.id), serde_json::to_value(request)?);
        }
    }

    for (zone, id) in state.market.drain_closed() {
        state.buffer.stage_removal(zone, ZoneField::Request(id));
    }

    for (key, fact, written_at) in state.cache.drain_dirty() {
        let stored = serde_json::to_value(PersistedFact { written_at, fact })?;
        state.buffer.stage(key.zone, ZoneField::Fact(key.class), stored);
    }

    for agent in state.registry.iter().filter(|a| !state.hygiene.is_pending(a.id)) {
        state.buffer.stage_agent(agent.id, agent.record());
    }
    Ok(())
}

/// What market validation needs to know about agents, answered from the
/// world and the registry.
struct CycleView<'a> {
    world: &'a dyn World,
    registry: &'a AgentRegistry,
    hygiene: &'a Hygiene,
}

impl MarketView for CycleView<'_> {
    fn requester_alive(&self, requester: AgentId) -> bool {
        !self.hygiene.is_pending(requester) && self.world.body(requester).is_some()
    }

    fn need_satisfied(&self, request: &ResourceRequest) -> bool {
        self.world
            .body(request.requester)
            .is_some_and(|body| body.is_full())
    }

    fn fulfiller_target(&self, fulfiller: AgentId) -> Option<RequestId> {
        self.registry
            .get(fulfiller)
            .and_then(|agent| agent.memory.serving())
    }
}
