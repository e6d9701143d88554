//! Core entity structs: positions, world entities, requests, and cached facts.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::enums::{Role, SiteKind};
use crate::ids::{AgentId, NodeId, RequestId, SiteId, ZoneId};

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

/// A tile coordinate inside a zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    /// Column.
    pub x: i32,
    /// Row.
    pub y: i32,
}

impl Position {
    /// Create a position.
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Chebyshev distance: the number of moves needed with diagonal steps.
    pub const fn range_to(self, other: Self) -> u32 {
        let dx = self.x.abs_diff(other.x);
        let dy = self.y.abs_diff(other.y);
        if dx > dy { dx } else { dy }
    }

    /// Whether `other` is within interaction range (adjacent or same tile).
    pub const fn is_near(self, other: Self) -> bool {
        self.range_to(other) <= 1
    }
}

// ---------------------------------------------------------------------------
// World entities
// ---------------------------------------------------------------------------

/// A location supplying energy.
///
/// The number of gatherers currently bound to a node is not stored here; it
/// is tracked by the zone's assignment map so the world collaborator stays
/// unaware of scheduling decisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceNode {
    /// Node identifier.
    pub id: NodeId,
    /// Zone the node belongs to.
    pub zone: ZoneId,
    /// Tile position.
    pub position: Position,
    /// Remaining yield.
    pub remaining: u32,
    /// Maximum number of gatherers that may work the node at once.
    pub slots: u32,
}

/// A structure or construction site that stores, accepts, or consumes energy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    /// Site identifier.
    pub id: SiteId,
    /// Zone the site belongs to.
    pub zone: ZoneId,
    /// What kind of site this is.
    pub kind: SiteKind,
    /// Tile position.
    pub position: Position,
    /// Energy currently stored.
    pub stored: u32,
    /// Maximum energy the site can hold.
    pub capacity: u32,
    /// Build or upgrade progress so far.
    pub progress: u32,
    /// Progress needed to complete the build or the next upgrade level.
    pub progress_total: u32,
}

impl Site {
    /// Energy the site can still accept.
    pub const fn free_capacity(&self) -> u32 {
        self.capacity.saturating_sub(self.stored)
    }

    /// Whether construction has finished.
    pub const fn is_complete(&self) -> bool {
        self.progress >= self.progress_total
    }
}

/// The physical body of an agent as seen by the world.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Body {
    /// Agent identifier.
    pub id: AgentId,
    /// Zone the body currently stands in.
    pub zone: ZoneId,
    /// Role the body was spawned with.
    pub role: Role,
    /// Tile position.
    pub position: Position,
    /// Energy carried.
    pub carried: u32,
    /// Maximum energy the body can carry.
    pub capacity: u32,
    /// Remaining lifetime estimate in cycles.
    pub ticks_to_live: u32,
}

impl Body {
    /// Whether the carry buffer is empty.
    pub const fn is_empty(&self) -> bool {
        self.carried == 0
    }

    /// Whether the carry buffer is full.
    pub const fn is_full(&self) -> bool {
        self.carried >= self.capacity
    }

    /// Energy the body can still pick up.
    pub const fn free_capacity(&self) -> u32 {
        self.capacity.saturating_sub(self.carried)
    }
}

/// A resolved world entity.
///
/// Replaces shape-sniffing ("does it have a `remaining` field?") with an
/// explicit discriminant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "entity", rename_all = "snake_case")]
pub enum Entity {
    /// A resource node.
    Node(ResourceNode),
    /// A consumer site.
    Site(Site),
    /// An agent body (requesters are agents).
    Agent(Body),
}

impl Entity {
    /// Tile position of the entity.
    pub const fn position(&self) -> Position {
        match self {
            Self::Node(node) => node.position,
            Self::Site(site) => site.position,
            Self::Agent(body) => body.position,
        }
    }

    /// Reference that resolves back to this entity.
    pub const fn entity_ref(&self) -> EntityRef {
        match self {
            Self::Node(node) => EntityRef::Node(node.id),
            Self::Site(site) => EntityRef::Site(site.id),
            Self::Agent(body) => EntityRef::Agent(body.id),
        }
    }

    /// Class priority used as the first ranking key. Nodes and agents rank
    /// after every site class.
    pub const fn class_priority(&self) -> u8 {
        match self {
            Self::Site(site) => site.kind.class_priority(),
            Self::Node(_) | Self::Agent(_) => u8::MAX,
        }
    }
}

/// A by-id reference to a world entity. May dangle across cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum EntityRef {
    /// Reference to a resource node.
    Node(NodeId),
    /// Reference to a consumer site.
    Site(SiteId),
    /// Reference to an agent body.
    Agent(AgentId),
}

// ---------------------------------------------------------------------------
// Coordination records
// ---------------------------------------------------------------------------

/// An open ask for energy delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequest {
    /// Request identifier.
    pub id: RequestId,
    /// Zone the request lives in.
    pub zone: ZoneId,
    /// Agent that needs the energy.
    pub requester: AgentId,
    /// Last known position of the requester.
    pub requester_position: Position,
    /// Energy still needed.
    pub amount: u32,
    /// Priority score; lower numbers are more urgent.
    pub priority: u32,
    /// Tick the request record was created (drives the staleness timeout).
    pub created_at: u64,
    /// Tick the requester started waiting (drives the wait bonus).
    pub wait_start: u64,
    /// Site the energy is ultimately meant for, if any.
    pub hint: Option<SiteId>,
    /// Fulfiller currently bound to this request.
    pub assigned: Option<AgentId>,
}

/// Persisted per-agent record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRecord {
    /// Role of the agent.
    pub role: Role,
    /// Label of the current FSM state.
    pub state: String,
    /// State-scoped cached target, if any.
    pub cached_target: Option<EntityRef>,
    /// Zone the agent works for.
    pub home_zone: ZoneId,
}

/// Value stored in the world facts cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Fact {
    /// Pre-ranked candidate list, best first.
    Targets(Vec<EntityRef>),
    /// Live agent count per role.
    RoleCounts(BTreeMap<Role, u32>),
    /// Zone layout.
    Topology {
        /// The zone controller, if the zone has one.
        controller: Option<SiteId>,
        /// Where idle agents wait.
        idle_position: Position,
    },
}

impl Fact {
    /// The ranked candidate list, if this fact is one.
    pub fn targets(&self) -> Option<&[EntityRef]> {
        match self {
            Self::Targets(targets) => Some(targets),
            Self::RoleCounts(_) | Self::Topology { .. } => None,
        }
    }
}
