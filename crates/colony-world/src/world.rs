//! Collaborator traits the scheduling core consumes.
//!
//! Queries are assumed idempotent within a cycle but not across cycles:
//! anything returned here may be gone by the next cycle, so callers hold
//! on to [`EntityRef`]s and re-resolve them before every use.

use colony_types::{AgentId, Body, Category, Entity, EntityRef, NodeId, Position, SiteId, ZoneId};

use crate::error::WorldError;

/// Result of a single movement step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    /// The agent is within interaction range of the destination.
    Arrived,
    /// The agent moved and is still travelling.
    EnRoute,
    /// No progress was possible this cycle.
    Blocked,
}

/// Read-only world primitives.
pub trait WorldQuery {
    /// Return every entity of `category` in `zone` that passes `filter`.
    fn query(&self, zone: ZoneId, category: Category, filter: &dyn Fn(&Entity) -> bool)
    -> Vec<Entity>;

    /// Resolve a reference to a live entity, or `None` if it vanished.
    fn resolve(&self, target: EntityRef) -> Option<Entity>;

    /// Every live agent body.
    fn census(&self) -> Vec<Body>;

    /// Every zone the colony operates in.
    fn zones(&self) -> Vec<ZoneId>;

    /// Default waiting position for idle agents in `zone`.
    fn idle_position(&self, zone: ZoneId) -> Option<Position>;

    /// The controller site of `zone`, if it has one.
    fn controller(&self, zone: ZoneId) -> Option<SiteId>;

    /// Resolve an agent body.
    fn body(&self, agent: AgentId) -> Option<Body> {
        match self.resolve(EntityRef::Agent(agent)) {
            Some(Entity::Agent(body)) => Some(body),
            _ => None,
        }
    }
}

/// Mutating world primitives invoked from agent steps.
pub trait WorldActions {
    /// Move `agent` one step toward `to`, spending at most `path_budget`
    /// pathing effort.
    fn move_toward(&mut self, agent: AgentId, to: Position, path_budget: u32) -> MoveOutcome;

    /// Extract energy from an adjacent node. Returns the amount gained.
    fn harvest(&mut self, agent: AgentId, node: NodeId) -> Result<u32, WorldError>;

    /// Take up to `amount` energy from an adjacent site. Returns the amount taken.
    fn withdraw(&mut self, agent: AgentId, from: SiteId, amount: u32) -> Result<u32, WorldError>;

    /// Hand up to `amount` energy to an adjacent site or agent. Returns the
    /// amount delivered.
    fn transfer(&mut self, agent: AgentId, to: EntityRef, amount: u32) -> Result<u32, WorldError>;

    /// Spend carried energy on an adjacent construction site.
    fn build(&mut self, agent: AgentId, site: SiteId) -> Result<u32, WorldError>;

    /// Spend carried energy on an adjacent controller.
    fn upgrade(&mut self, agent: AgentId, site: SiteId) -> Result<u32, WorldError>;
}

/// A complete world collaborator.
pub trait World: WorldQuery + WorldActions {}

impl<T: WorldQuery + WorldActions + ?Sized> World for T {}
