//! Spawn collaborator.
//!
//! After every cycle the spawner reads each zone's persisted
//! `role_count.<role>` fields through [`ColonyState::zone_data`]. A role
//! below its quota gets a new body next to the zone's spawn, paid for out
//! of the spawn's stored energy. Roles are checked in dispatch order, so
//! gatherers are replaced before anyone else.

use std::path::Path;

use colony_cache::ZoneField;
use colony_core::ColonyState;
use colony_core::config::ConfigError;
use colony_types::{Position, Role};
use colony_world::SimWorld;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::EngineError;
use crate::layout::ZoneSetup;

// -----------------------------------------------------------------------
// Configuration
// -----------------------------------------------------------------------

/// Per-zone population targets, read from the `spawner` section of
/// `colony-config.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SpawnerConfig {
    /// Gatherers per zone.
    #[serde(default = "default_gatherers")]
    pub gatherers: u32,

    /// Transporters per zone.
    #[serde(default = "default_transporters")]
    pub transporters: u32,

    /// Builders per zone.
    #[serde(default = "default_builders")]
    pub builders: u32,

    /// Upgraders per zone.
    #[serde(default = "default_upgraders")]
    pub upgraders: u32,

    /// Energy a new body costs.
    #[serde(default = "default_body_cost")]
    pub body_cost: u32,

    /// Carry capacity of new bodies.
    #[serde(default = "default_capacity")]
    pub capacity: u32,

    /// Carry capacity of new transporters.
    #[serde(default = "default_transporter_capacity")]
    pub transporter_capacity: u32,

    /// Bodies a zone may spawn per cycle.
    #[serde(default = "default_spawns_per_cycle")]
    pub spawns_per_cycle: u32,
}

impl Default for SpawnerConfig {
    fn default() -> Self {
        Self {
            gatherers: default_gatherers(),
            transporters: default_transporters(),
            builders: default_builders(),
            upgraders: default_upgraders(),
            body_cost: default_body_cost(),
            capacity: default_capacity(),
            transporter_capacity: default_transporter_capacity(),
            spawns_per_cycle: default_spawns_per_cycle(),
        }
    }
}

impl SpawnerConfig {
    /// Target population of `role` per zone.
    pub const fn quota(&self, role: Role) -> u32 {
        match role {
            Role::Gatherer => self.gatherers,
            Role::Transporter => self.transporters,
            Role::Builder => self.builders,
            Role::Upgrader => self.upgraders,
        }
    }

    /// Carry capacity of a new body of `role`.
    pub const fn capacity_for(&self, role: Role) -> u32 {
        match role {
            Role::Transporter => self.transporter_capacity,
            Role::Gatherer | Role::Builder | Role::Upgrader => self.capacity,
        }
    }
}

const fn default_gatherers() -> u32 {
    2
}

const fn default_transporters() -> u32 {
    2
}

const fn default_builders() -> u32 {
    1
}

const fn default_upgraders() -> u32 {
    2
}

const fn default_body_cost() -> u32 {
    100
}

const fn default_capacity() -> u32 {
    50
}

const fn default_transporter_capacity() -> u32 {
    100
}

const fn default_spawns_per_cycle() -> u32 {
    1
}

/// Load the `spawner` section of the config file at `path`.
///
/// A missing file or a missing section yields the defaults.
pub fn load_spawner_config(path: &Path) -> Result<SpawnerConfig, EngineError> {
    if !path.exists() {
        return Ok(SpawnerConfig::default());
    }
    let contents = std::fs::read_to_string(path).map_err(ConfigError::from)?;
    let raw: serde_yml::Value = serde_yml::from_str(&contents)?;
    match raw.get("spawner") {
        Some(section) => Ok(serde_yml::from_value(section.clone())?),
        None => Ok(SpawnerConfig::default()),
    }
}

// -----------------------------------------------------------------------
// Spawner
// -----------------------------------------------------------------------

/// Keeps every zone at its quota.
#[derive(Debug)]
pub struct Spawner {
    config: SpawnerConfig,
    zones: Vec<ZoneSetup>,
    lifetime: u32,
}

impl Spawner {
    /// A spawner for `zones`, giving new bodies `lifetime` cycles.
    pub const fn new(config: SpawnerConfig, zones: Vec<ZoneSetup>, lifetime: u32) -> Self {
        Self {
            config,
            zones,
            lifetime,
        }
    }

    /// Spawn what the persisted role counts say is missing. Returns the
    /// number of bodies placed.
    pub fn run(&self, state: &ColonyState, world: &mut SimWorld) -> usize {
        let mut spawned: usize = 0;
        for setup in &self.zones {
            let mut allowance = self.config.spawns_per_cycle;
            'roles: for role in Role::ALL {
                let have = state
                    .zone_data(setup.zone, &ZoneField::RoleCount(role))
                    .and_then(Value::as_u64)
                    .unwrap_or(0);
                let mut count = have;
                while allowance > 0 && count < u64::from(self.config.quota(role)) {
                    if !world.take_stored(setup.spawn, self.config.body_cost) {
                        debug!(zone = %setup.zone, role = %role, "Spawn short of energy");
                        break 'roles;
                    }

                    let at = Position::new(
                        setup.spawn_position.x.saturating_add(1),
                        setup.spawn_position.y.saturating_add(1),
                    );
                    let id = world.spawn_body(setup.zone, role, at, self.config.capacity_for(role), self.lifetime);
                    info!(
                        tick = state.tick(),
                        zone = %setup.zone,
                        role = %role,
                        agent_id = %id,
                        have,
                        "Spawned body"
                    );
                    count = count.saturating_add(1);
                    allowance = allowance.saturating_sub(1);
                    spawned = spawned.saturating_add(1);
                }
                if allowance == 0 {
                    break;
                }
            }
        }
        spawned
    }
}
