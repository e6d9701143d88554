//! In-memory reference world.
//!
//! [`SimWorld`] implements both collaborator traits over plain `BTreeMap`s.
//! Movement is one Chebyshev step per call, interaction requires range 1,
//! and every action uses saturating arithmetic. There is no terrain.

use std::cell::Cell;
use std::collections::BTreeMap;

use colony_types::{
    AgentId, Body, Category, Entity, EntityRef, NodeId, Position, ResourceNode, Role, Site,
    SiteId, SiteKind, ZoneId,
};
use serde::Deserialize;
use tracing::debug;

use crate::error::WorldError;
use crate::world::{MoveOutcome, WorldActions, WorldQuery};

/// Tunables for the reference world.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SimWorldConfig {
    /// Energy extracted per harvest action.
    #[serde(default = "default_harvest_rate")]
    pub harvest_rate: u32,

    /// Energy spent per build action.
    #[serde(default = "default_build_rate")]
    pub build_rate: u32,

    /// Energy spent per upgrade action.
    #[serde(default = "default_upgrade_rate")]
    pub upgrade_rate: u32,

    /// Energy a node regenerates per cycle, up to its original yield.
    #[serde(default = "default_node_regen")]
    pub node_regen: u32,

    /// Capacity of an extension created when a construction site completes.
    #[serde(default = "default_built_capacity")]
    pub built_capacity: u32,
}

impl Default for SimWorldConfig {
    fn default() -> Self {
        Self {
            harvest_rate: default_harvest_rate(),
            build_rate: default_build_rate(),
            upgrade_rate: default_upgrade_rate(),
            node_regen: default_node_regen(),
            built_capacity: default_built_capacity(),
        }
    }
}

const fn default_harvest_rate() -> u32 {
    2
}

const fn default_build_rate() -> u32 {
    5
}

const fn default_upgrade_rate() -> u32 {
    1
}

const fn default_node_regen() -> u32 {
    1
}

const fn default_built_capacity() -> u32 {
    50
}

/// Static layout of a zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ZoneLayout {
    idle_position: Position,
    controller: Option<SiteId>,
}

/// In-memory world holding zones, nodes, sites, and agent bodies.
#[derive(Debug, Default)]
pub struct SimWorld {
    config: SimWorldConfig,
    zones: BTreeMap<ZoneId, ZoneLayout>,
    nodes: BTreeMap<NodeId, ResourceNode>,
    node_max: BTreeMap<NodeId, u32>,
    sites: BTreeMap<SiteId, Site>,
    bodies: BTreeMap<AgentId, Body>,
    queries: Cell<u64>,
}

impl SimWorld {
    /// Create an empty world.
    pub fn new(config: SimWorldConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Add a zone whose idle agents wait at `idle_position`.
    pub fn add_zone(&mut self, idle_position: Position) -> ZoneId {
        let id = ZoneId::new();
        self.zones.insert(
            id,
            ZoneLayout {
                idle_position,
                controller: None,
            },
        );
        id
    }

    /// Add a resource node.
    pub fn add_node(&mut self, zone: ZoneId, position: Position, remaining: u32, slots: u32) -> NodeId {
        let id = NodeId::new();
        self.nodes.insert(
            id,
            ResourceNode {
                id,
                zone,
                position,
                remaining,
                slots,
            },
        );
        self.node_max.insert(id, remaining);
        id
    }

    /// Add a site. A [`SiteKind::Controller`] becomes the zone's controller.
    pub fn add_site(
        &mut self,
        zone: ZoneId,
        kind: SiteKind,
        position: Position,
        stored: u32,
        capacity: u32,
        progress_total: u32,
    ) -> SiteId {
        let id = SiteId::new();
        self.sites.insert(
            id,
            Site {
                id,
                zone,
                kind,
                position,
                stored,
                capacity,
                progress: 0,
                progress_total,
            },
        );
        if kind == SiteKind::Controller
            && let Some(layout) = self.zones.get_mut(&zone)
        {
            layout.controller = Some(id);
        }
        id
    }

    /// Place a new agent body. This is the spawn collaborator's hook.
    pub fn spawn_body(
        &mut self,
        zone: ZoneId,
        role: Role,
        position: Position,
        capacity: u32,
        ticks_to_live: u32,
    ) -> AgentId {
        let id = AgentId::new();
        self.bodies.insert(
            id,
            Body {
                id,
                zone,
                role,
                position,
                carried: 0,
                capacity,
                ticks_to_live,
            },
        );
        id
    }

    /// Remove `amount` stored energy from a site. Returns `false`, leaving
    /// the site untouched, if it is missing or holds less.
    pub fn take_stored(&mut self, site: SiteId, amount: u32) -> bool {
        match self.sites.get_mut(&site) {
            Some(state) if state.stored >= amount => {
                state.stored = state.stored.saturating_sub(amount);
                true
            }
            _ => false,
        }
    }

    /// Remove an agent body. Returns `true` if it existed.
    pub fn remove_body(&mut self, agent: AgentId) -> bool {
        self.bodies.remove(&agent).is_some()
    }

    /// Remove a resource node. Returns `true` if it existed.
    pub fn remove_node(&mut self, node: NodeId) -> bool {
        self.node_max.remove(&node);
        self.nodes.remove(&node).is_some()
    }

    /// Remove a site. Returns `true` if it existed.
    pub fn remove_site(&mut self, site: SiteId) -> bool {
        self.sites.remove(&site).is_some()
    }

    /// Overwrite the energy carried by a body (test and demo setup).
    pub fn set_carried(&mut self, agent: AgentId, carried: u32) {
        if let Some(body) = self.bodies.get_mut(&agent) {
            body.carried = carried.min(body.capacity);
        }
    }

    /// Overwrite the position of a body (test and demo setup).
    pub fn set_position(&mut self, agent: AgentId, position: Position) {
        if let Some(body) = self.bodies.get_mut(&agent) {
            body.position = position;
        }
    }

    /// Look up a site by id.
    pub fn site(&self, site: SiteId) -> Option<&Site> {
        self.sites.get(&site)
    }

    /// Look up a node by id.
    pub fn node(&self, node: NodeId) -> Option<&ResourceNode> {
        self.nodes.get(&node)
    }

    /// Number of `query` calls served so far.
    pub fn query_count(&self) -> u64 {
        self.queries.get()
    }

    /// Advance world time by one cycle: age bodies (removing expired ones)
    /// and regenerate nodes. Returns the agents that expired.
    pub fn advance_cycle(&mut self) -> Vec<AgentId> {
        let mut expired = Vec::new();
        for body in self.bodies.values_mut() {
            body.ticks_to_live = body.ticks_to_live.saturating_sub(1);
            if body.ticks_to_live == 0 {
                expired.push(body.id);
            }
        }
        for id in &expired {
            self.bodies.remove(id);
            debug!(agent_id = %id, "Body expired");
        }

        for node in self.nodes.values_mut() {
            let max = self.node_max.get(&node.id).copied().unwrap_or(node.remaining);
            node.remaining = node.remaining.saturating_add(self.config.node_regen).min(max);
        }

        expired
    }

    /// Resolve a body and check that `target` is within interaction range.
    fn body_near(&self, agent: AgentId, target: EntityRef, at: Position) -> Result<&Body, WorldError> {
        let body = self.bodies.get(&agent).ok_or(WorldError::AgentNotFound(agent))?;
        if body.position.is_near(at) {
            Ok(body)
        } else {
            Err(WorldError::OutOfRange { agent, target })
        }
    }

    fn site_position(&self, site: SiteId) -> Result<Position, WorldError> {
        self.sites
            .get(&site)
            .map(|s| s.position)
            .ok_or(WorldError::EntityNotFound(EntityRef::Site(site)))
    }
}

impl WorldQuery for SimWorld {
    fn query(
        &self,
        zone: ZoneId,
        category: Category,
        filter: &dyn Fn(&Entity) -> bool,
    ) -> Vec<Entity> {
        self.queries.set(self.queries.get().saturating_add(1));

        let candidates: Vec<Entity> = match category {
            Category::ResourceNodes => self
                .nodes
                .values()
                .filter(|n| n.zone == zone)
                .cloned()
                .map(Entity::Node)
                .collect(),
            Category::EnergySinks => self.sites_where(zone, |kind| kind.accepts_energy()),
            Category::EnergySources => self.sites_where(zone, |kind| kind.provides_energy()),
            Category::ConstructionSites => {
                self.sites_where(zone, |kind| kind == SiteKind::ConstructionSite)
            }
            Category::Controllers => self.sites_where(zone, |kind| kind == SiteKind::Controller),
        };

        candidates.into_iter().filter(|e| filter(e)).collect()
    }

    fn resolve(&self, target: EntityRef) -> Option<Entity> {
        match target {
            EntityRef::Node(id) => self.nodes.get(&id).cloned().map(Entity::Node),
            EntityRef::Site(id) => self.sites.get(&id).cloned().map(Entity::Site),
            EntityRef::Agent(id) => self.bodies.get(&id).cloned().map(Entity::Agent),
        }
    }

    fn census(&self) -> Vec<Body> {
        self.bodies.values().cloned().collect()
    }

    fn zones(&self) -> Vec<ZoneId> {
        self.zones.keys().copied().collect()
    }

    fn idle_position(&self, zone: ZoneId) -> Option<Position> {
        self.zones.get(&zone).map(|z| z.idle_position)
    }

    fn controller(&self, zone: ZoneId) -> Option<SiteId> {
        self.zones.get(&zone).and_then(|z| z.controller)
    }
}

impl SimWorld {
    fn sites_where(&self, zone: ZoneId, keep: impl Fn(SiteKind) -> bool) -> Vec<Entity> {
        self.sites
            .values()
            .filter(|s| s.zone == zone && keep(s.kind))
            .cloned()
            .map(Entity::Site)
            .collect()
    }
}

/// Move `from` one step toward `to` on each axis.
const fn step_toward(from: Position, to: Position) -> Position {
    Position::new(
        from.x.saturating_add(signum(to.x.saturating_sub(from.x))),
        from.y.saturating_add(signum(to.y.saturating_sub(from.y))),
    )
}

const fn signum(v: i32) -> i32 {
    if v > 0 {
        1
    } else if v < 0 {
        -1
    } else {
        0
    }
}

impl WorldActions for SimWorld {
    fn move_toward(&mut self, agent: AgentId, to: Position, path_budget: u32) -> MoveOutcome {
        let Some(body) = self.bodies.get_mut(&agent) else {
            return MoveOutcome::Blocked;
        };
        if body.position.is_near(to) {
            return MoveOutcome::Arrived;
        }
        if path_budget == 0 {
            return MoveOutcome::Blocked;
        }
        body.position = step_toward(body.position, to);
        if body.position.is_near(to) {
            MoveOutcome::Arrived
        } else {
            MoveOutcome::EnRoute
        }
    }

    fn harvest(&mut self, agent: AgentId, node: NodeId) -> Result<u32, WorldError> {
        let target = EntityRef::Node(node);
        let node_pos = self
            .nodes
            .get(&node)
            .map(|n| n.position)
            .ok_or(WorldError::EntityNotFound(target))?;
        let free = self.body_near(agent, target, node_pos)?.free_capacity();

        let Some(node_state) = self.nodes.get_mut(&node) else {
            return Err(WorldError::EntityNotFound(target));
        };
        let gained = self.config.harvest_rate.min(node_state.remaining).min(free);
        node_state.remaining = node_state.remaining.saturating_sub(gained);

        if let Some(body) = self.bodies.get_mut(&agent) {
            body.carried = body.carried.saturating_add(gained);
        }
        Ok(gained)
    }

    fn withdraw(&mut self, agent: AgentId, from: SiteId, amount: u32) -> Result<u32, WorldError> {
        let target = EntityRef::Site(from);
        let pos = self.site_position(from)?;
        let free = self.body_near(agent, target, pos)?.free_capacity();

        let Some(site) = self.sites.get_mut(&from) else {
            return Err(WorldError::EntityNotFound(target));
        };
        if !site.kind.provides_energy() {
            return Err(WorldError::WrongKind {
                target,
                action: "withdraw",
            });
        }
        let taken = amount.min(site.stored).min(free);
        site.stored = site.stored.saturating_sub(taken);

        if let Some(body) = self.bodies.get_mut(&agent) {
            body.carried = body.carried.saturating_add(taken);
        }
        Ok(taken)
    }

    fn transfer(&mut self, agent: AgentId, to: EntityRef, amount: u32) -> Result<u32, WorldError> {
        let (to_pos, room) = match to {
            EntityRef::Site(id) => {
                let site = self.sites.get(&id).ok_or(WorldError::EntityNotFound(to))?;
                if !site.kind.accepts_energy() {
                    return Err(WorldError::WrongKind {
                        target: to,
                        action: "transfer",
                    });
                }
                (site.position, site.free_capacity())
            }
            EntityRef::Agent(id) => {
                let other = self.bodies.get(&id).ok_or(WorldError::EntityNotFound(to))?;
                (other.position, other.free_capacity())
            }
            EntityRef::Node(_) => {
                return Err(WorldError::WrongKind {
                    target: to,
                    action: "transfer",
                });
            }
        };
        let carried = self.body_near(agent, to, to_pos)?.carried;
        let moved = amount.min(carried).min(room);

        match to {
            EntityRef::Site(id) => {
                if let Some(site) = self.sites.get_mut(&id) {
                    site.stored = site.stored.saturating_add(moved);
                }
            }
            EntityRef::Agent(id) => {
                if let Some(other) = self.bodies.get_mut(&id) {
                    other.carried = other.carried.saturating_add(moved);
                }
            }
            EntityRef::Node(_) => {}
        }
        if let Some(body) = self.bodies.get_mut(&agent) {
            body.carried = body.carried.saturating_sub(moved);
        }
        Ok(moved)
    }

    fn build(&mut self, agent: AgentId, site: SiteId) -> Result<u32, WorldError> {
        let target = EntityRef::Site(site);
        let pos = self.site_position(site)?;
        let carried = self.body_near(agent, target, pos)?.carried;
        let built_capacity = self.config.built_capacity;

        let Some(state) = self.sites.get_mut(&site) else {
            return Err(WorldError::EntityNotFound(target));
        };
        if state.kind != SiteKind::ConstructionSite {
            return Err(WorldError::WrongKind {
                target,
                action: "build",
            });
        }
        let remaining = state.progress_total.saturating_sub(state.progress);
        let spent = self.config.build_rate.min(carried).min(remaining);
        state.progress = state.progress.saturating_add(spent);
        if state.is_complete() {
            state.kind = SiteKind::Extension;
            state.capacity = built_capacity;
            debug!(site_id = %site, "Construction completed");
        }

        if let Some(body) = self.bodies.get_mut(&agent) {
            body.carried = body.carried.saturating_sub(spent);
        }
        Ok(spent)
    }

    fn upgrade(&mut self, agent: AgentId, site: SiteId) -> Result<u32, WorldError> {
        let target = EntityRef::Site(site);
        let pos = self.site_position(site)?;
        let carried = self.body_near(agent, target, pos)?.carried;

        let Some(state) = self.sites.get_mut(&site) else {
            return Err(WorldError::EntityNotFound(target));
        };
        if state.kind != SiteKind::Controller {
            return Err(WorldError::WrongKind {
                target,
                action: "upgrade",
            });
        }
        let spent = self.config.upgrade_rate.min(carried);
        state.progress = state.progress.saturating_add(spent);
        if state.progress_total > 0 && state.progress >= state.progress_total {
            state.progress = state.progress.saturating_sub(state.progress_total);
        }

        if let Some(body) = self.bodies.get_mut(&agent) {
            body.carried = body.carried.saturating_sub(spent);
        }
        Ok(spent)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn world_with_zone() -> (SimWorld, ZoneId) {
        let mut world = SimWorld::new(SimWorldConfig::default());
        let zone = world.add_zone(Position::new(25, 25));
        (world, zone)
    }

    #[test]
    fn query_filters_by_category_and_predicate() {
        let (mut world, zone) = world_with_zone();
        world.add_site(zone, SiteKind::Spawn, Position::new(1, 1), 0, 300, 0);
        world.add_site(zone, SiteKind::Storage, Position::new(2, 2), 500, 1000, 0);
        world.add_site(zone, SiteKind::Controller, Position::new(3, 3), 0, 0, 100);

        let sinks = world.query(zone, Category::EnergySinks, &|_| true);
        assert_eq!(sinks.len(), 2);

        let sources = world.query(zone, Category::EnergySources, &|e| match e {
            Entity::Site(s) => s.stored > 0,
            _ => false,
        });
        assert_eq!(sources.len(), 1);
        assert_eq!(world.query_count(), 2);
        assert!(world.controller(zone).is_some());
    }

    #[test]
    fn move_then_harvest() {
        let (mut world, zone) = world_with_zone();
        let node = world.add_node(zone, Position::new(5, 0), 100, 2);
        let agent = world.spawn_body(zone, Role::Gatherer, Position::new(0, 0), 10, 100);

        let err = world.harvest(agent, node);
        assert!(matches!(err, Err(WorldError::OutOfRange { .. })));

        let mut outcome = MoveOutcome::EnRoute;
        for _ in 0..10 {
            outcome = world.move_toward(agent, Position::new(5, 0), 10);
            if outcome == MoveOutcome::Arrived {
                break;
            }
        }
        assert_eq!(outcome, MoveOutcome::Arrived);

        let gained = world.harvest(agent, node).unwrap();
        assert_eq!(gained, 2);
        assert_eq!(world.body(agent).unwrap().carried, 2);
        assert_eq!(world.node(node).unwrap().remaining, 98);
    }

    #[test]
    fn transfer_to_agent_respects_room() {
        let (mut world, zone) = world_with_zone();
        let giver = world.spawn_body(zone, Role::Transporter, Position::new(0, 0), 50, 100);
        let taker = world.spawn_body(zone, Role::Builder, Position::new(1, 0), 20, 100);
        world.set_carried(giver, 50);
        world.set_carried(taker, 15);

        let moved = world.transfer(giver, EntityRef::Agent(taker), 50).unwrap();
        assert_eq!(moved, 5);
        assert_eq!(world.body(giver).unwrap().carried, 45);
        assert!(world.body(taker).unwrap().is_full());
    }

    #[test]
    fn construction_completes_into_extension() {
        let (mut world, zone) = world_with_zone();
        let site = world.add_site(zone, SiteKind::ConstructionSite, Position::new(1, 0), 0, 0, 5);
        let agent = world.spawn_body(zone, Role::Builder, Position::new(0, 0), 50, 100);
        world.set_carried(agent, 50);

        let spent = world.build(agent, site).unwrap();
        assert_eq!(spent, 5);
        let built = world.site(site).unwrap();
        assert_eq!(built.kind, SiteKind::Extension);
        assert_eq!(built.capacity, 50);
    }

    #[test]
    fn bodies_expire() {
        let (mut world, zone) = world_with_zone();
        let short = world.spawn_body(zone, Role::Gatherer, Position::new(0, 0), 10, 1);
        let long = world.spawn_body(zone, Role::Gatherer, Position::new(0, 0), 10, 5);

        let expired = world.advance_cycle();
        assert_eq!(expired, vec![short]);
        assert!(world.body(short).is_none());
        assert!(world.body(long).is_some());
    }

    #[test]
    fn take_stored_is_all_or_nothing() {
        let (mut world, zone) = world_with_zone();
        let spawn = world.add_site(zone, SiteKind::Spawn, Position::new(1, 1), 120, 300, 0);

        assert!(world.take_stored(spawn, 100));
        assert_eq!(world.site(spawn).unwrap().stored, 20);
        assert!(!world.take_stored(spawn, 50));
        assert_eq!(world.site(spawn).unwrap().stored, 20);
        assert!(!world.take_stored(SiteId::new(), 1));
    }
}
