//! Target selection cascade.
//!
//! Every role picks targets the same way:
//!
//! 1. **Cached** -- reuse the agent's own cached target if it still resolves
//!    and passes the caller's validity check.
//! 2. **Shared** -- take the first valid entry of the zone's pre-ranked list
//!    in the [`WorldFactsCache`].
//! 3. **Fresh** -- if the agent's own search cooldown has expired, query the
//!    world, rank by class priority then distance, publish the ranked list
//!    to the zone cache, and take the first valid entry.
//! 4. **Idle** -- fall back to the zone's idle position.
//!
//! Each step is an `Option` lookup; a miss just moves on to the next step.

use colony_cache::{FactKey, WorldFactsCache};
use colony_types::{Category, Entity, EntityRef, Fact, FactClass, Position, SiteId, SiteKind, ZoneId};
use colony_world::WorldQuery;
use tracing::trace;

/// Outcome of the cascade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetChoice {
    /// The agent's own cached target was still valid.
    Cached(Entity),
    /// Taken from the zone's shared ranked list.
    Shared(Entity),
    /// Found by a fresh world query this step.
    Fresh(Entity),
    /// Nothing valid; wait at the zone's idle position if it has one.
    Idle(Option<Position>),
}

impl TargetChoice {
    /// The chosen entity, unless idle.
    pub const fn entity(&self) -> Option<&Entity> {
        match self {
            Self::Cached(e) | Self::Shared(e) | Self::Fresh(e) => Some(e),
            Self::Idle(_) => None,
        }
    }

    /// Consume into the chosen entity, unless idle.
    pub fn into_entity(self) -> Option<Entity> {
        match self {
            Self::Cached(e) | Self::Shared(e) | Self::Fresh(e) => Some(e),
            Self::Idle(_) => None,
        }
    }

    /// Short label used in logs and tests.
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Cached(_) => "cached",
            Self::Shared(_) => "shared",
            Self::Fresh(_) => "fresh",
            Self::Idle(_) => "idle",
        }
    }
}

/// What an agent is looking for.
pub struct Search<'a> {
    /// Zone to search in.
    pub zone: ZoneId,
    /// Fact class whose ranked list is shared through the cache.
    pub class: FactClass,
    /// Caller-specific validity check applied to every candidate.
    pub valid: &'a dyn Fn(&Entity) -> bool,
    /// Current tick.
    pub now: u64,
    /// Cooldown applied after a fresh query.
    pub cooldown: u64,
}

/// World query category backing a ranked fact class.
pub const fn category_for(class: FactClass) -> Option<Category> {
    match class {
        FactClass::EnergySinks => Some(Category::EnergySinks),
        FactClass::EnergySources => Some(Category::EnergySources),
        FactClass::ConstructionSites => Some(Category::ConstructionSites),
        FactClass::ResourceNodes => Some(Category::ResourceNodes),
        FactClass::RoleCounts | FactClass::Topology => None,
    }
}

/// Base filter of a ranked fact class. Caller checks narrow it further.
pub fn admits(class: FactClass, entity: &Entity) -> bool {
    match (class, entity) {
        (FactClass::EnergySinks, Entity::Site(s)) => s.kind.accepts_energy() && s.free_capacity() > 0,
        (FactClass::EnergySources, Entity::Site(s)) => s.kind.provides_energy() && s.stored > 0,
        (FactClass::ConstructionSites, Entity::Site(s)) => {
            s.kind == SiteKind::ConstructionSite && !s.is_complete()
        }
        (FactClass::ResourceNodes, Entity::Node(n)) => n.remaining > 0,
        _ => false,
    }
}

/// Sort candidates by class priority, then distance from `origin`, then id.
pub fn rank(candidates: &mut [Entity], origin: Position) {
    candidates.sort_by_key(|e| (e.class_priority(), origin.range_to(e.position()), e.entity_ref()));
}

/// Run the cascade for one agent.
///
/// `search_ready_at` is the agent's own cooldown; it is pushed forward only
/// when a fresh query actually runs.
pub fn select_target<W: WorldQuery + ?Sized>(
    world: &W,
    cache: &mut WorldFactsCache,
    search_ready_at: &mut u64,
    origin: Position,
    cached: Option<EntityRef>,
    search: &Search<'_>,
) -> TargetChoice {
    let usable = |entity: &Entity| admits(search.class, entity) && (search.valid)(entity);

    if let Some(entity) = cached.and_then(|r| world.resolve(r)).filter(|e| usable(e)) {
        return TargetChoice::Cached(entity);
    }

    let key = FactKey::new(search.zone, search.class);
    if let Some(entity) = cache
        .get(&key, search.now)
        .and_then(Fact::targets)
        .and_then(|list| list.iter().filter_map(|r| world.resolve(*r)).find(|e| usable(e)))
    {
        return TargetChoice::Shared(entity);
    }

    if *search_ready_at <= search.now
        && let Some(category) = category_for(search.class)
    {
        *search_ready_at = search.now.saturating_add(search.cooldown);
        let mut candidates = world.query(search.zone, category, &|e: &Entity| admits(search.class, e));
        rank(&mut candidates, origin);
        let pick = candidates.iter().find(|e| usable(e)).cloned();
        trace!(
            zone = %search.zone,
            class = search.class.label(),
            candidates = candidates.len(),
            found = pick.is_some(),
            "Fresh target query"
        );
        cache.put(
            key,
            Fact::Targets(candidates.iter().map(Entity::entity_ref).collect()),
            search.now,
        );
        if let Some(entity) = pick {
            return TargetChoice::Fresh(entity);
        }
    }

    TargetChoice::Idle(idle_position(world, cache, search.zone, search.now))
}

/// Where idle agents of `zone` wait: the cached topology, else the world.
pub fn idle_position<W: WorldQuery + ?Sized>(
    world: &W,
    cache: &WorldFactsCache,
    zone: ZoneId,
    now: u64,
) -> Option<Position> {
    match cache.get(&FactKey::new(zone, FactClass::Topology), now) {
        Some(Fact::Topology { idle_position, .. }) => Some(*idle_position),
        _ => world.idle_position(zone),
    }
}

/// The controller of `zone`: the cached topology, else the world.
pub fn zone_controller<W: WorldQuery + ?Sized>(
    world: &W,
    cache: &WorldFactsCache,
    zone: ZoneId,
    now: u64,
) -> Option<SiteId> {
    match cache.get(&FactKey::new(zone, FactClass::Topology), now) {
        Some(Fact::Topology { controller, .. }) => *controller,
        _ => world.controller(zone),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use colony_cache::CacheConfig;
    use colony_world::{SimWorld, SimWorldConfig};

    use super::*;

    fn any(_: &Entity) -> bool {
        true
    }

    fn sinks(zone: ZoneId, now: u64, valid: &dyn Fn(&Entity) -> bool) -> Search<'_> {
        Search {
            zone,
            class: FactClass::EnergySinks,
            valid,
            now,
            cooldown: 5,
        }
    }

    #[test]
    fn vanished_cached_target_falls_through_to_fresh_query() {
        let mut world = SimWorld::new(SimWorldConfig::default());
        let zone = world.add_zone(Position::new(0, 0));
        let gone = world.add_site(zone, SiteKind::Extension, Position::new(2, 2), 0, 50, 0);
        let live = world.add_site(zone, SiteKind::Extension, Position::new(4, 4), 0, 50, 0);
        world.remove_site(gone);

        let mut cache = WorldFactsCache::new(CacheConfig::default());
        let mut ready_at = 0;
        let choice = select_target(
            &world,
            &mut cache,
            &mut ready_at,
            Position::new(0, 0),
            Some(EntityRef::Site(gone)),
            &sinks(zone, 1, &any),
        );
        assert_eq!(choice.label(), "fresh");
        assert_eq!(choice.entity().map(Entity::entity_ref), Some(EntityRef::Site(live)));
        assert_eq!(ready_at, 6);
    }

    #[test]
    fn ranking_prefers_class_then_distance() {
        let mut world = SimWorld::new(SimWorldConfig::default());
        let zone = world.add_zone(Position::new(0, 0));
        let far_spawn = world.add_site(zone, SiteKind::Spawn, Position::new(9, 9), 0, 300, 0);
        world.add_site(zone, SiteKind::Extension, Position::new(1, 1), 0, 50, 0);
        let near_container = world.add_site(zone, SiteKind::Container, Position::new(1, 0), 0, 500, 0);

        let mut cache = WorldFactsCache::new(CacheConfig::default());
        let mut ready_at = 0;
        let origin = Position::new(0, 0);
        let choice = select_target(&world, &mut cache, &mut ready_at, origin, None, &sinks(zone, 0, &any));
        assert_eq!(choice.entity().map(Entity::entity_ref), Some(EntityRef::Site(far_spawn)));

        let list = cache
            .get(&FactKey::new(zone, FactClass::EnergySinks), 0)
            .and_then(Fact::targets)
            .unwrap()
            .to_vec();
        assert_eq!(list.len(), 3);
        assert_eq!(list.last(), Some(&EntityRef::Site(near_container)));
    }

    #[test]
    fn shared_list_serves_other_agents_without_querying() {
        let mut world = SimWorld::new(SimWorldConfig::default());
        let zone = world.add_zone(Position::new(0, 0));
        world.add_site(zone, SiteKind::Spawn, Position::new(3, 3), 0, 300, 0);
        let mut cache = WorldFactsCache::new(CacheConfig::default());

        let mut first = 0;
        select_target(&world, &mut cache, &mut first, Position::new(0, 0), None, &sinks(zone, 0, &any));
        assert_eq!(world.query_count(), 1);

        for _ in 0..20 {
            let mut ready_at = 0;
            let choice = select_target(&world, &mut cache, &mut ready_at, Position::new(0, 0), None, &sinks(zone, 1, &any));
            assert_eq!(choice.label(), "shared");
        }
        assert_eq!(world.query_count(), 1);
    }

    #[test]
    fn cooldown_throttles_fresh_queries() {
        let mut world = SimWorld::new(SimWorldConfig::default());
        let zone = world.add_zone(Position::new(7, 7));
        let mut cache = WorldFactsCache::new(CacheConfig::default());
        let mut ready_at = 0;

        // No sinks exist: every step would want a fresh query.
        for now in 0..10 {
            let choice = select_target(&world, &mut cache, &mut ready_at, Position::new(0, 0), None, &sinks(zone, now, &any));
            assert_eq!(choice, TargetChoice::Idle(Some(Position::new(7, 7))));
        }
        // Ticks 0 and 5 only.
        assert_eq!(world.query_count(), 2);
    }

    #[test]
    fn caller_check_skips_invalid_shared_entries() {
        let mut world = SimWorld::new(SimWorldConfig::default());
        let zone = world.add_zone(Position::new(0, 0));
        world.add_site(zone, SiteKind::Spawn, Position::new(1, 1), 0, 300, 0);
        let extension = world.add_site(zone, SiteKind::Extension, Position::new(2, 2), 0, 50, 0);
        let mut cache = WorldFactsCache::new(CacheConfig::default());
        let mut ready_at = 0;
        select_target(&world, &mut cache, &mut ready_at, Position::new(0, 0), None, &sinks(zone, 0, &any));

        let not_spawn = |e: &Entity| matches!(e, Entity::Site(s) if s.kind != SiteKind::Spawn);
        let mut other = 0;
        let choice = select_target(&world, &mut cache, &mut other, Position::new(0, 0), None, &sinks(zone, 1, &not_spawn));
        assert_eq!(choice.label(), "shared");
        assert_eq!(choice.entity().map(Entity::entity_ref), Some(EntityRef::Site(extension)));
    }

    #[test]
    fn idle_prefers_cached_topology() {
        let mut world = SimWorld::new(SimWorldConfig::default());
        let zone = world.add_zone(Position::new(1, 1));
        let mut cache = WorldFactsCache::new(CacheConfig::default());
        assert_eq!(idle_position(&world, &cache, zone, 0), Some(Position::new(1, 1)));
        cache.put(
            FactKey::new(zone, FactClass::Topology),
            Fact::Topology {
                controller: None,
                idle_position: Position::new(4, 4),
            },
            0,
        );
        assert_eq!(idle_position(&world, &cache, zone, 10), Some(Position::new(4, 4)));
    }
}
