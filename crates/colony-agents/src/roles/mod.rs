//! Per-role agent steps.
//!
//! [`step`] runs one agent's state machine for one cycle. [`guarded_step`]
//! wraps it so that neither an error nor a panic escapes; the caller logs
//! the fault and sends the agent home with [`return_to_base`].

mod consumer;
mod gatherer;
mod transporter;

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use colony_cache::WorldFactsCache;
use colony_market::RequestMarket;
use colony_types::{AgentId, Position, Role, ZoneId};
use colony_world::{MoveOutcome, World};

use crate::agent::Agent;
use crate::assignments::NodeAssignments;
use crate::config::AgentConfig;
use crate::error::AgentError;
use crate::targeting::idle_position;

/// Shared structures an agent step may read and mutate.
pub struct StepContext<'a> {
    /// The world collaborator.
    pub world: &'a mut dyn World,
    /// Zone-scoped fact cache.
    pub cache: &'a mut WorldFactsCache,
    /// Request market.
    pub market: &'a mut RequestMarket,
    /// Gatherer-to-node bindings.
    pub assignments: &'a mut NodeAssignments,
    /// Agent tunables.
    pub config: &'a AgentConfig,
    /// Current tick.
    pub now: u64,
}

/// What an agent did this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Moved toward a target.
    Moved(MoveOutcome),
    /// Harvested energy from a node.
    Harvested(u32),
    /// Withdrew energy from a site.
    Withdrew(u32),
    /// Handed energy to a site or agent.
    Transferred(u32),
    /// Spent energy on construction.
    Built(u32),
    /// Spent energy on the controller.
    Upgraded(u32),
    /// Holding position while a delivery is on its way.
    Waiting,
    /// Nothing to do.
    Idle,
}

/// Run one cycle of `agent`'s state machine.
pub fn step(agent: &mut Agent, ctx: &mut StepContext<'_>) -> Result<Action, AgentError> {
    let body = ctx
        .world
        .body(agent.id)
        .ok_or(AgentError::BodyMissing { agent: agent.id })?;
    agent.ticks_to_live = body.ticks_to_live;
    match agent.role {
        Role::Gatherer => gatherer::step(agent, &body, ctx),
        Role::Transporter => transporter::step(agent, &body, ctx),
        Role::Builder | Role::Upgrader => consumer::step(agent, &body, ctx),
    }
}

/// Run [`step`], turning a panic into [`AgentError::Panicked`].
pub fn guarded_step(agent: &mut Agent, ctx: &mut StepContext<'_>) -> Result<Action, AgentError> {
    match panic::catch_unwind(AssertUnwindSafe(|| step(agent, ctx))) {
        Ok(result) => result,
        Err(payload) => Err(AgentError::Panicked {
            message: panic_message(payload.as_ref()),
        }),
    }
}

/// Fallback after a fault: drop the cached target and head for the idle
/// position.
pub fn return_to_base(agent: &mut Agent, ctx: &mut StepContext<'_>) -> Action {
    agent.memory.clear_target();
    let Some(body) = ctx.world.body(agent.id) else {
        return Action::Idle;
    };
    wait_at(ctx, agent.id, body.position, agent.home_zone)
}

/// Render a panic payload caught by `catch_unwind`.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

/// Move toward `to` unless already in range. `None` means "arrived, act now".
fn approach(ctx: &mut StepContext<'_>, agent: AgentId, from: Position, to: Position) -> Option<Action> {
    if from.is_near(to) {
        None
    } else {
        Some(Action::Moved(ctx.world.move_toward(agent, to, ctx.config.path_budget)))
    }
}

/// Walk to the zone's idle position, or stay put if there is none.
fn wait_at(ctx: &mut StepContext<'_>, agent: AgentId, from: Position, zone: ZoneId) -> Action {
    match idle_position(&*ctx.world, &*ctx.cache, zone, ctx.now) {
        Some(spot) if !from.is_near(spot) => {
            Action::Moved(ctx.world.move_toward(agent, spot, ctx.config.path_budget))
        }
        _ => Action::Idle,
    }
}

/// Walk to an idle spot already picked by the cascade.
fn idle_toward(ctx: &mut StepContext<'_>, agent: AgentId, from: Position, spot: Option<Position>) -> Action {
    match spot {
        Some(spot) if !from.is_near(spot) => {
            Action::Moved(ctx.world.move_toward(agent, spot, ctx.config.path_budget))
        }
        _ => Action::Idle,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use colony_cache::CacheConfig;
    use colony_market::MarketConfig;
    use colony_world::{SimWorld, SimWorldConfig, WorldQuery};

    use super::*;

    /// Everything a step needs, owned.
    pub(crate) struct Harness {
        pub world: SimWorld,
        pub cache: WorldFactsCache,
        pub market: RequestMarket,
        pub assignments: NodeAssignments,
        pub config: AgentConfig,
        pub zone: ZoneId,
        pub now: u64,
    }

    impl Harness {
        pub(crate) fn new() -> Self {
            let mut world = SimWorld::new(SimWorldConfig::default());
            let zone = world.add_zone(Position::new(0, 0));
            Self {
                world,
                cache: WorldFactsCache::new(CacheConfig::default()),
                market: RequestMarket::new(MarketConfig::default()),
                assignments: NodeAssignments::new(),
                config: AgentConfig::default(),
                zone,
                now: 0,
            }
        }

        pub(crate) fn spawn(&mut self, role: Role, at: Position, capacity: u32) -> Agent {
            let id = self.world.spawn_body(self.zone, role, at, capacity, 1_000);
            Agent::new(id, role, self.zone, 1_000)
        }

        pub(crate) fn step(&mut self, agent: &mut Agent) -> Result<Action, AgentError> {
            let mut ctx = StepContext {
                world: &mut self.world,
                cache: &mut self.cache,
                market: &mut self.market,
                assignments: &mut self.assignments,
                config: &self.config,
                now: self.now,
            };
            guarded_step(agent, &mut ctx)
        }

        pub(crate) fn run(&mut self, agent: &mut Agent, cycles: u64) {
            for _ in 0..cycles {
                self.now = self.now.saturating_add(1);
                let _ = self.step(agent);
            }
        }
    }

    #[test]
    fn missing_body_is_an_error() {
        let mut h = Harness::new();
        let mut agent = h.spawn(Role::Gatherer, Position::new(0, 0), 50);
        h.world.remove_body(agent.id);
        let result = h.step(&mut agent);
        assert!(matches!(result, Err(AgentError::BodyMissing { .. })));
    }

    #[test]
    fn panic_payloads_are_rendered() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }

    #[test]
    fn return_to_base_heads_for_idle_spot() {
        let mut h = Harness::new();
        let mut agent = h.spawn(Role::Transporter, Position::new(6, 0), 50);
        let mut ctx = StepContext {
            world: &mut h.world,
            cache: &mut h.cache,
            market: &mut h.market,
            assignments: &mut h.assignments,
            config: &h.config,
            now: 1,
        };
        let action = return_to_base(&mut agent, &mut ctx);
        assert_eq!(action, Action::Moved(MoveOutcome::EnRoute));
        assert_eq!(h.world.body(agent.id).unwrap().position, Position::new(5, 0));
    }
}
