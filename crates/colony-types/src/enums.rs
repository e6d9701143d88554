//! Enumeration types shared across the scheduler.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

/// The task a worker agent was spawned for.
///
/// Each role owns a fixed memory struct and state machine in
/// `colony-agents`; the role never changes over an agent's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Extracts energy from resource nodes and drops it at the nearest sink.
    Gatherer,
    /// Collects stored energy and fulfils open resource requests.
    Transporter,
    /// Consumes energy to progress construction sites.
    Builder,
    /// Consumes energy to upgrade the zone controller.
    Upgrader,
}

impl Role {
    /// Every role, in dispatch order.
    pub const ALL: [Self; 4] = [Self::Gatherer, Self::Transporter, Self::Builder, Self::Upgrader];

    /// Stable lowercase label used in persisted field names and logs.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Gatherer => "gatherer",
            Self::Transporter => "transporter",
            Self::Builder => "builder",
            Self::Upgrader => "upgrader",
        }
    }

    /// Whether agents of this role open resource requests.
    pub const fn is_consumer(self) -> bool {
        matches!(self, Self::Builder | Self::Upgrader)
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// Scheduling
// ---------------------------------------------------------------------------

/// Priority class assigned to a unit of recurring work.
///
/// Ordered from most to least important, so `Tier::Critical < Tier::Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Always runs, even in the deepest degradation.
    Critical,
    /// Runs unless the controller is critically degraded.
    High,
    /// Runs only with healthy headroom.
    Medium,
    /// First to be shed.
    Low,
}

impl Tier {
    /// Every tier, most important first.
    pub const ALL: [Self; 4] = [Self::Critical, Self::High, Self::Medium, Self::Low];

    /// Stable lowercase label.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl core::fmt::Display for Tier {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.label())
    }
}

/// Operating level of the budget controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetLevel {
    /// No sustained overload; the gate follows the instantaneous reserve.
    Normal,
    /// Sustained overload; only Critical and High work runs.
    DegradedHigh,
    /// Severe overload or failsafe; only Critical work runs.
    DegradedCritical,
}

impl BudgetLevel {
    /// Stable lowercase label.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::DegradedHigh => "degraded_high",
            Self::DegradedCritical => "degraded_critical",
        }
    }

    /// Whether this level is one of the degraded ("emergency") levels.
    pub const fn is_degraded(self) -> bool {
        !matches!(self, Self::Normal)
    }
}

// ---------------------------------------------------------------------------
// World queries
// ---------------------------------------------------------------------------

/// Category argument of the world-query primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Resource nodes that can be harvested.
    ResourceNodes,
    /// Sites that accept energy deliveries (spawns, extensions, towers, storage).
    EnergySinks,
    /// Sites energy can be withdrawn from (containers, storage).
    EnergySources,
    /// Sites still under construction.
    ConstructionSites,
    /// Zone controllers.
    Controllers,
}

/// Kind of a consumer site, used for class-priority ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiteKind {
    /// Produces new agents; refilled first.
    Spawn,
    /// Extra spawn energy capacity.
    Extension,
    /// Defensive structure.
    Tower,
    /// Small buffer next to a resource node.
    Container,
    /// Large zone-wide buffer.
    Storage,
    /// The zone controller, consumed by upgraders.
    Controller,
    /// A structure that has not been built yet.
    ConstructionSite,
}

impl SiteKind {
    /// Class priority for target ranking; lower is served first.
    pub const fn class_priority(self) -> u8 {
        match self {
            Self::Spawn => 0,
            Self::Extension => 1,
            Self::Tower => 2,
            Self::Container => 3,
            Self::Storage => 4,
            Self::Controller => 5,
            Self::ConstructionSite => 6,
        }
    }

    /// Whether energy can be delivered into this kind of site.
    pub const fn accepts_energy(self) -> bool {
        matches!(
            self,
            Self::Spawn | Self::Extension | Self::Tower | Self::Container | Self::Storage
        )
    }

    /// Whether energy can be withdrawn from this kind of site.
    pub const fn provides_energy(self) -> bool {
        matches!(self, Self::Container | Self::Storage)
    }
}

/// Class of a cached world fact. Each class has its own validity window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactClass {
    /// Ranked list of sites that still accept energy.
    EnergySinks,
    /// Ranked list of sites holding withdrawable energy.
    EnergySources,
    /// Ranked list of unfinished construction sites.
    ConstructionSites,
    /// Ranked list of resource nodes with remaining yield.
    ResourceNodes,
    /// Live agent counts per role.
    RoleCounts,
    /// Zone layout facts (controller, idle position); planned once.
    Topology,
}

impl FactClass {
    /// Every fact class.
    pub const ALL: [Self; 6] = [
        Self::EnergySinks,
        Self::EnergySources,
        Self::ConstructionSites,
        Self::ResourceNodes,
        Self::RoleCounts,
        Self::Topology,
    ];

    /// Stable lowercase label used as the persisted field suffix.
    pub const fn label(self) -> &'static str {
        match self {
            Self::EnergySinks => "energy_sinks",
            Self::EnergySources => "energy_sources",
            Self::ConstructionSites => "construction_sites",
            Self::ResourceNodes => "resource_nodes",
            Self::RoleCounts => "role_counts",
            Self::Topology => "topology",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers_order_most_important_first() {
        assert!(Tier::Critical < Tier::High);
        assert!(Tier::High < Tier::Medium);
        assert!(Tier::Medium < Tier::Low);
    }

    #[test]
    fn only_consumers_open_requests() {
        assert!(!Role::Gatherer.is_consumer());
        assert!(!Role::Transporter.is_consumer());
        assert!(Role::Builder.is_consumer());
        assert!(Role::Upgrader.is_consumer());
    }

    #[test]
    fn spawn_outranks_storage() {
        assert!(SiteKind::Spawn.class_priority() < SiteKind::Storage.class_priority());
        assert!(SiteKind::Storage.accepts_energy());
        assert!(SiteKind::Storage.provides_energy());
        assert!(!SiteKind::Spawn.provides_energy());
    }

    #[test]
    fn role_serializes_snake_case() {
        let json = serde_json::to_string(&Role::Transporter).ok();
        assert_eq!(json.as_deref(), Some("\"transporter\""));
    }
}
