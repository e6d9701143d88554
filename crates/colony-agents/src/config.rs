//! Tunables for agent steps.

use colony_types::{Body, Role};
use serde::Deserialize;

/// Agent behaviour parameters.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AgentConfig {
    /// Cycles an agent waits between two fresh world queries of its own.
    #[serde(default = "default_search_cooldown")]
    pub search_cooldown: u64,

    /// Pathing effort handed to every movement call.
    #[serde(default = "default_path_budget")]
    pub path_budget: u32,

    /// Consumers post a request once their buffer falls below this
    /// percentage of capacity.
    #[serde(default = "default_request_threshold_pct")]
    pub request_threshold_pct: u32,

    /// Request priority posted by builders. Lower is more urgent.
    #[serde(default = "default_builder_priority")]
    pub builder_priority: u32,

    /// Request priority posted by upgraders. Lower is more urgent.
    #[serde(default = "default_upgrader_priority")]
    pub upgrader_priority: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            search_cooldown: default_search_cooldown(),
            path_budget: default_path_budget(),
            request_threshold_pct: default_request_threshold_pct(),
            builder_priority: default_builder_priority(),
            upgrader_priority: default_upgrader_priority(),
        }
    }
}

impl AgentConfig {
    /// Priority of the requests posted by `role`, if it posts any.
    pub const fn request_priority(&self, role: Role) -> Option<u32> {
        match role {
            Role::Builder => Some(self.builder_priority),
            Role::Upgrader => Some(self.upgrader_priority),
            Role::Gatherer | Role::Transporter => None,
        }
    }

    /// Whether `body` has dropped below the request threshold.
    pub fn below_threshold(&self, body: &Body) -> bool {
        let carried = u64::from(body.carried).saturating_mul(100);
        let limit = u64::from(body.capacity).saturating_mul(u64::from(self.request_threshold_pct));
        carried < limit
    }
}

const fn default_search_cooldown() -> u64 {
    5
}

const fn default_path_budget() -> u32 {
    20
}

const fn default_request_threshold_pct() -> u32 {
    50
}

const fn default_builder_priority() -> u32 {
    30
}

const fn default_upgrader_priority() -> u32 {
    50
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use colony_types::{AgentId, Position, ZoneId};

    use super::*;

    fn body(carried: u32) -> Body {
        Body {
            id: AgentId::new(),
            zone: ZoneId::new(),
            role: Role::Builder,
            position: Position::new(0, 0),
            carried,
            capacity: 50,
            ticks_to_live: 100,
        }
    }

    #[test]
    fn threshold_is_a_strict_percentage() {
        let config = AgentConfig::default();
        assert!(config.below_threshold(&body(24)));
        assert!(!config.below_threshold(&body(25)));
    }

    #[test]
    fn only_consumers_post_requests() {
        let config = AgentConfig::default();
        assert_eq!(config.request_priority(Role::Builder), Some(30));
        assert_eq!(config.request_priority(Role::Transporter), None);
    }

    #[test]
    fn yaml_overrides_one_field() {
        let config: AgentConfig = serde_yml::from_str("search_cooldown: 12\n").unwrap();
        assert_eq!(config.search_cooldown, 12);
        assert_eq!(config.path_budget, 20);
    }
}
