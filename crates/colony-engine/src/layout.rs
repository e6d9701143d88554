//! Demo world layout.
//!
//! Zones sit side by side along the x axis, `ZONE_SPAN` tiles apart. Each
//! gets a spawn and a storage at its centre, a controller, resource nodes
//! with a container next to each, and a few construction sites. Positions
//! that are not fixed come from an RNG seeded with `world.seed`, so a given
//! config always yields the same layout.

use colony_core::config::WorldConfig;
use colony_types::{Position, SiteId, SiteKind, ZoneId};
use colony_world::{SimWorld, SimWorldConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

use crate::error::EngineError;

const ZONE_SPAN: i32 = 50;
const SPAWN_STOCK: u32 = 300;
const SPAWN_CAPACITY: u32 = 300;
const STORAGE_STOCK: u32 = 500;
const STORAGE_CAPACITY: u32 = 5_000;
const NODE_STOCK: u32 = 1_000;
const NODE_SLOTS: u32 = 2;
const CONTAINER_CAPACITY: u32 = 500;
const CONSTRUCTION_COST: u32 = 50;

/// Handles the spawner needs for one zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneSetup {
    /// The zone.
    pub zone: ZoneId,
    /// Its spawn site, which pays for new bodies.
    pub spawn: SiteId,
    /// Where new bodies appear.
    pub spawn_position: Position,
}

/// Build the demo world described by `config`.
pub fn build_world(
    config: &WorldConfig,
    sim: SimWorldConfig,
) -> Result<(SimWorld, Vec<ZoneSetup>), EngineError> {
    if config.zones == 0 {
        return Err(EngineError::Layout {
            message: "world.zones must be at least 1".to_owned(),
        });
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut world = SimWorld::new(sim);
    let mut zones = Vec::new();

    for index in 0..config.zones {
        let origin = i32::try_from(index).map_or(i32::MAX, |i| i.saturating_mul(ZONE_SPAN));
        let at = |x: i32, y: i32| Position::new(origin.saturating_add(x), y);

        let zone = world.add_zone(at(23, 23));
        let spawn_position = at(20, 20);
        let spawn = world.add_site(zone, SiteKind::Spawn, spawn_position, SPAWN_STOCK, SPAWN_CAPACITY, 0);
        world.add_site(zone, SiteKind::Storage, at(17, 20), STORAGE_STOCK, STORAGE_CAPACITY, 0);

        let controller = at(rng.random_range(5..35), rng.random_range(5..35));
        world.add_site(zone, SiteKind::Controller, controller, 0, 0, 0);

        for _ in 0..config.nodes_per_zone {
            let node = at(rng.random_range(2..38), rng.random_range(2..38));
            world.add_node(zone, node, NODE_STOCK, NODE_SLOTS);
            let container = Position::new(node.x.saturating_add(1), node.y);
            world.add_site(zone, SiteKind::Container, container, 0, CONTAINER_CAPACITY, 0);
        }

        for _ in 0..config.construction_per_zone {
            let site = at(rng.random_range(12..28), rng.random_range(12..28));
            world.add_site(zone, SiteKind::ConstructionSite, site, 0, 0, CONSTRUCTION_COST);
        }

        info!(
            zone = %zone,
            index,
            nodes = config.nodes_per_zone,
            construction_sites = config.construction_per_zone,
            "Zone laid out"
        );
        zones.push(ZoneSetup {
            zone,
            spawn,
            spawn_position,
        });
    }

    Ok((world, zones))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use colony_types::{Category, Entity};
    use colony_world::WorldQuery;

    use super::*;

    fn node_positions(world: &SimWorld, zone: ZoneId) -> Vec<Position> {
        let mut positions: Vec<Position> = world
            .query(zone, Category::ResourceNodes, &|_| true)
            .into_iter()
            .map(|e| e.position())
            .collect();
        positions.sort_by_key(|p| (p.x, p.y));
        positions
    }

    #[test]
    fn default_layout_has_every_zone_stocked() {
        let config = WorldConfig::default();
        let (world, zones) = build_world(&config, SimWorldConfig::default()).unwrap();
        assert_eq!(zones.len(), 2);
        for setup in &zones {
            assert_eq!(node_positions(&world, setup.zone).len(), 3);
            assert!(world.controller(setup.zone).is_some());
            assert_eq!(world.site(setup.spawn).unwrap().stored, SPAWN_STOCK);
            let sites = world.query(setup.zone, Category::ConstructionSites, &|e| {
                matches!(e, Entity::Site(_))
            });
            assert_eq!(sites.len(), 2);
        }
    }

    #[test]
    fn same_seed_same_layout() {
        let config = WorldConfig::default();
        let (a, zones_a) = build_world(&config, SimWorldConfig::default()).unwrap();
        let (b, zones_b) = build_world(&config, SimWorldConfig::default()).unwrap();
        for (za, zb) in zones_a.iter().zip(&zones_b) {
            assert_eq!(node_positions(&a, za.zone), node_positions(&b, zb.zone));
            assert_eq!(za.spawn_position, zb.spawn_position);
        }
    }

    #[test]
    fn zero_zones_is_rejected() {
        let config = WorldConfig {
            zones: 0,
            ..WorldConfig::default()
        };
        let result = build_world(&config, SimWorldConfig::default());
        assert!(matches!(result, Err(EngineError::Layout { .. })));
    }
}
