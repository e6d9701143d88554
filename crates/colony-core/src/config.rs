//! Configuration loading and typed config structures.
//!
//! The canonical configuration lives in `colony-config.yaml` at the project
//! root. Every section and field is optional; missing values fall back to
//! the defaults below. Component-level sections reuse the config structs of
//! the crates that own them ([`CacheConfig`], [`MarketConfig`],
//! [`AgentConfig`], [`BudgetConfig`]).

use std::path::{Path, PathBuf};

use colony_agents::AgentConfig;
use colony_cache::CacheConfig;
use colony_market::MarketConfig;
use colony_types::{Role, Tier};
use serde::Deserialize;

use crate::budget::BudgetConfig;

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "COLONY_CONFIG";

/// Environment variable overriding `persistence.snapshot_path`.
pub const SNAPSHOT_PATH_ENV: &str = "COLONY_SNAPSHOT";

/// Config file used when [`CONFIG_PATH_ENV`] is unset.
pub const DEFAULT_CONFIG_PATH: &str = "colony-config.yaml";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// The configuration parsed but its values are inconsistent.
    #[error("invalid config: {reason}")]
    Invalid {
        /// What is wrong.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ColonyConfig {
    /// Budget controller thresholds.
    #[serde(default)]
    pub budget: BudgetConfig,

    /// Validity window per fact class.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Request market scoring.
    #[serde(default)]
    pub market: MarketConfig,

    /// Agent step tunables.
    #[serde(default)]
    pub agents: AgentConfig,

    /// Role to tier mapping.
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Durable store location.
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Loop bounds.
    #[serde(default)]
    pub run: RunConfig,

    /// Demo world layout.
    #[serde(default)]
    pub world: WorldConfig,

    /// Simulated compute host.
    #[serde(default)]
    pub host: HostConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ColonyConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// `COLONY_SNAPSHOT` overrides `persistence.snapshot_path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if [`validate`](Self::validate) rejects it.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.persistence.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Reject values the budget controller and the market cannot work with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let market = &self.market;
        for (name, value) in [
            ("market.distance_weight", market.distance_weight),
            ("market.wait_rate", market.wait_rate),
            ("market.wait_cap", market.wait_cap),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(format!("{name} must be a finite non-negative number, got {value}")));
            }
        }

        let budget = &self.budget;
        if budget.window == 0 {
            return Err(invalid("budget.window must be at least 1".to_owned()));
        }
        if !budget.enter_mean.is_finite() || !budget.exit_mean.is_finite() {
            return Err(invalid("budget.enter_mean and budget.exit_mean must be finite".to_owned()));
        }
        if budget.exit_mean > budget.enter_mean {
            return Err(invalid(format!(
                "budget.exit_mean ({}) must not exceed budget.enter_mean ({})",
                budget.exit_mean, budget.enter_mean
            )));
        }
        let ordered = budget.critical_reserve <= budget.low_reserve
            && budget.low_reserve <= budget.medium_reserve
            && budget.medium_reserve <= budget.high_reserve;
        if !ordered {
            return Err(invalid(format!(
                "budget reserves must satisfy critical <= low <= medium <= high, got {} / {} / {} / {}",
                budget.critical_reserve, budget.low_reserve, budget.medium_reserve, budget.high_reserve
            )));
        }
        Ok(())
    }

    /// Config path from `COLONY_CONFIG`, else [`DEFAULT_CONFIG_PATH`].
    pub fn path_from_env() -> PathBuf {
        std::env::var_os(CONFIG_PATH_ENV).map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from)
    }
}

/// Tier each role's agents are scheduled under.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScheduleConfig {
    /// Tier of gatherers.
    #[serde(default = "default_gatherer_tier")]
    pub gatherer: Tier,

    /// Tier of transporters.
    #[serde(default = "default_transporter_tier")]
    pub transporter: Tier,

    /// Tier of builders.
    #[serde(default = "default_builder_tier")]
    pub builder: Tier,

    /// Tier of upgraders.
    #[serde(default = "default_upgrader_tier")]
    pub upgrader: Tier,
}

impl ScheduleConfig {
    /// Tier of `role`.
    pub const fn tier_for(&self, role: Role) -> Tier {
        match role {
            Role::Gatherer => self.gatherer,
            Role::Transporter => self.transporter,
            Role::Builder => self.builder,
            Role::Upgrader => self.upgrader,
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            gatherer: default_gatherer_tier(),
            transporter: default_transporter_tier(),
            builder: default_builder_tier(),
            upgrader: default_upgrader_tier(),
        }
    }
}

/// Where flushed state is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PersistenceConfig {
    /// JSON snapshot file.
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,
}

impl PersistenceConfig {
    /// Apply `COLONY_SNAPSHOT` if set.
    pub fn apply_env_overrides(&mut self) {
        if let Some(path) = std::env::var_os(SNAPSHOT_PATH_ENV) {
            self.snapshot_path = PathBuf::from(path);
        }
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            snapshot_path: default_snapshot_path(),
        }
    }
}

/// Loop bounds of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RunConfig {
    /// Stop after this many cycles (0 = unlimited).
    #[serde(default = "default_max_cycles")]
    pub max_cycles: u64,

    /// Real-time milliseconds between cycles.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_cycles: default_max_cycles(),
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

/// Layout of the demo world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct WorldConfig {
    /// Random seed for reproducible layouts.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Number of zones.
    #[serde(default = "default_zones")]
    pub zones: u32,

    /// Resource nodes per zone.
    #[serde(default = "default_nodes_per_zone")]
    pub nodes_per_zone: u32,

    /// Construction sites seeded per zone.
    #[serde(default = "default_construction_per_zone")]
    pub construction_per_zone: u32,

    /// Lifetime of a freshly spawned body, in cycles.
    #[serde(default = "default_body_lifetime")]
    pub body_lifetime: u32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            zones: default_zones(),
            nodes_per_zone: default_nodes_per_zone(),
            construction_per_zone: default_construction_per_zone(),
            body_lifetime: default_body_lifetime(),
        }
    }
}

/// Simulated compute host. Compute is counted in whole units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct HostConfig {
    /// Compute allowed per cycle.
    #[serde(default = "default_compute_limit")]
    pub compute_limit: u64,

    /// Compute charged per world query.
    #[serde(default = "default_query_cost")]
    pub query_cost: u64,

    /// Compute charged per world action.
    #[serde(default = "default_action_cost")]
    pub action_cost: u64,

    /// Fixed compute charged per cycle for bookkeeping.
    #[serde(default = "default_overhead")]
    pub overhead: u64,

    /// Reserve at start-up and its ceiling.
    #[serde(default = "default_reserve_cap")]
    pub reserve_cap: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            compute_limit: default_compute_limit(),
            query_cost: default_query_cost(),
            action_cost: default_action_cost(),
            overhead: default_overhead(),
            reserve_cap: default_reserve_cap(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` wins.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

const fn invalid(reason: String) -> ConfigError {
    ConfigError::Invalid { reason }
}

// ---------------------------------------------------------------------------
// Default value functions
// ---------------------------------------------------------------------------

const fn default_gatherer_tier() -> Tier {
    Tier::Critical
}

const fn default_transporter_tier() -> Tier {
    Tier::High
}

const fn default_builder_tier() -> Tier {
    Tier::Medium
}

const fn default_upgrader_tier() -> Tier {
    Tier::Low
}

fn default_snapshot_path() -> PathBuf {
    PathBuf::from("colony-snapshot.json")
}

const fn default_max_cycles() -> u64 {
    500
}

const fn default_tick_interval_ms() -> u64 {
    100
}

const fn default_seed() -> u64 {
    42
}

const fn default_zones() -> u32 {
    2
}

const fn default_nodes_per_zone() -> u32 {
    3
}

const fn default_construction_per_zone() -> u32 {
    2
}

const fn default_body_lifetime() -> u32 {
    1_500
}

const fn default_compute_limit() -> u64 {
    400
}

const fn default_query_cost() -> u64 {
    1
}

const fn default_action_cost() -> u64 {
    2
}

const fn default_overhead() -> u64 {
    10
}

const fn default_reserve_cap() -> u64 {
    10_000
}

fn default_log_level() -> String {
    "info".to_owned()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use colony_cache::Ttl;

    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = ColonyConfig::default();
        assert_eq!(config.budget.window, 10);
        assert_eq!(config.schedule.tier_for(Role::Gatherer), Tier::Critical);
        assert_eq!(config.schedule.tier_for(Role::Upgrader), Tier::Low);
        assert_eq!(config.run.max_cycles, 500);
        assert_eq!(config.market.stale_after, 50);
    }

    #[test]
    fn empty_yaml_uses_defaults() {
        let config = ColonyConfig::parse("{}").unwrap();
        assert_eq!(config.world, WorldConfig::default());
        assert_eq!(config.agents, AgentConfig::default());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r#"
budget:
  window: 5
  enter_mean: 0.85
  low_reserve: 2500
cache:
  energy_sinks:
    cycles: 4
  topology: planned
market:
  wait_cap: 60.0
  stale_after: 80
agents:
  search_cooldown: 3
  builder_priority: 25
schedule:
  upgrader: medium
run:
  max_cycles: 0
  tick_interval_ms: 0
world:
  seed: 7
  zones: 3
host:
  compute_limit: 120
  action_cost: 3
logging:
  level: debug
  json: true
"#;
        let config = ColonyConfig::parse(yaml).unwrap();
        assert_eq!(config.budget.window, 5);
        assert!((config.budget.enter_mean - 0.85).abs() < f64::EPSILON);
        assert_eq!(config.budget.low_reserve, 2_500);
        assert_eq!(config.budget.high_reserve, 8_000);
        assert_eq!(config.cache.energy_sinks, Ttl::Cycles(4));
        assert_eq!(config.cache.topology, Ttl::Planned);
        assert_eq!(config.market.stale_after, 80);
        assert_eq!(config.agents.search_cooldown, 3);
        assert_eq!(config.agents.builder_priority, 25);
        assert_eq!(config.schedule.tier_for(Role::Upgrader), Tier::Medium);
        assert_eq!(config.schedule.tier_for(Role::Builder), Tier::Medium);
        assert_eq!(config.run.max_cycles, 0);
        assert_eq!(config.world.seed, 7);
        assert_eq!(config.world.nodes_per_zone, 3);
        assert_eq!(config.host.compute_limit, 120);
        assert_eq!(config.host.action_cost, 3);
        assert_eq!(config.host.query_cost, 1);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
    }

    #[test]
    fn shipped_config_matches_defaults() {
        let config = ColonyConfig::parse(include_str!("../../../colony-config.yaml")).unwrap();
        assert_eq!(config, ColonyConfig::default());
    }

    fn assert_invalid(yaml: &str, field: &str) {
        match ColonyConfig::parse(yaml) {
            Err(ConfigError::Invalid { reason }) => assert!(reason.contains(field), "{reason}"),
            other => panic!("expected an invalid config naming {field}, got {other:?}"),
        }
    }

    #[test]
    fn negative_wait_cap_is_rejected() {
        assert_invalid("market:\n  wait_cap: -5.0\n", "market.wait_cap");
    }

    #[test]
    fn negative_wait_rate_is_rejected() {
        assert_invalid("market:\n  wait_rate: -0.5\n", "market.wait_rate");
    }

    #[test]
    fn non_finite_wait_cap_is_rejected() {
        assert_invalid("market:\n  wait_cap: .nan\n", "market.wait_cap");
        assert_invalid("market:\n  wait_rate: .inf\n", "market.wait_rate");
    }

    #[test]
    fn unordered_reserves_are_rejected() {
        assert_invalid("budget:\n  low_reserve: 6000\n", "critical <= low <= medium <= high");
        assert_invalid("budget:\n  critical_reserve: 3000\n", "critical <= low <= medium <= high");
        assert_invalid("budget:\n  high_reserve: 4000\n", "critical <= low <= medium <= high");
    }

    #[test]
    fn exit_mean_above_enter_mean_is_rejected() {
        assert_invalid("budget:\n  enter_mean: 0.6\n", "budget.exit_mean");
    }

    #[test]
    fn equal_thresholds_are_accepted() {
        let yaml = "budget:\n  enter_mean: 0.8\n  exit_mean: 0.8\n  low_reserve: 5000\n  medium_reserve: 5000\n";
        assert!(ColonyConfig::parse(yaml).is_ok());
    }

    #[test]
    fn malformed_yaml_is_an_error() {
        let result = ColonyConfig::parse("budget: [not, a, map]");
        assert!(matches!(result, Err(ConfigError::Yaml { .. })));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let path = std::env::temp_dir().join("colony-config-does-not-exist.yaml");
        let result = ColonyConfig::from_file(&path);
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
