//! Agents, their per-role memory, and the registry that owns them.
//!
//! Each role gets a fixed memory struct holding only what its state machine
//! uses. Every memory follows the same rule: changing state drops the
//! state-scoped cached target.

use std::collections::BTreeMap;

use colony_types::{AgentId, AgentRecord, Body, EntityRef, Position, RequestId, Role, SiteId, ZoneId};
use tracing::{debug, trace, warn};

use crate::error::AgentError;

/// A remembered target: what it was and where it was last seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachedTarget {
    /// The entity.
    pub target: EntityRef,
    /// Position when it was last resolved, if known.
    pub last_seen: Option<Position>,
}

impl CachedTarget {
    /// A target resolved at `position` this cycle.
    pub const fn seen(target: EntityRef, position: Position) -> Self {
        Self {
            target,
            last_seen: Some(position),
        }
    }
}

// ---------------------------------------------------------------------------
// Gatherer
// ---------------------------------------------------------------------------

/// Gatherer states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GathererState {
    /// Looking for a node with a free slot.
    Seeking,
    /// Harvesting the bound node until full.
    Extracting,
    /// Dropping energy at a sink until empty.
    Delivering,
}

impl GathererState {
    /// Persisted label.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Seeking => "seeking",
            Self::Extracting => "extracting",
            Self::Delivering => "delivering",
        }
    }

    fn from_label(label: &str) -> Option<Self> {
        match label {
            "seeking" => Some(Self::Seeking),
            "extracting" => Some(Self::Extracting),
            "delivering" => Some(Self::Delivering),
            _ => None,
        }
    }
}

/// Gatherer memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GathererMemory {
    /// Current state.
    pub state: GathererState,
    /// State-scoped target.
    pub target: Option<CachedTarget>,
}

impl GathererMemory {
    /// Move to `to`, dropping the cached target. Returns `false` if already there.
    pub fn transition(&mut self, to: GathererState) -> bool {
        if self.state == to {
            return false;
        }
        trace!(from = self.state.label(), to = to.label(), "Gatherer transition");
        self.state = to;
        self.target = None;
        true
    }
}

// ---------------------------------------------------------------------------
// Transporter
// ---------------------------------------------------------------------------

/// Transporter states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransporterState {
    /// Withdrawing from sources until full.
    Collecting,
    /// Serving a request or filling sinks until empty.
    Delivering,
}

impl TransporterState {
    /// Persisted label.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Collecting => "collecting",
            Self::Delivering => "delivering",
        }
    }

    fn from_label(label: &str) -> Option<Self> {
        match label {
            "collecting" => Some(Self::Collecting),
            "delivering" => Some(Self::Delivering),
            _ => None,
        }
    }
}

/// Transporter memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransporterMemory {
    /// Current state.
    pub state: TransporterState,
    /// State-scoped target.
    pub target: Option<CachedTarget>,
    /// Request this transporter is serving.
    pub request: Option<RequestId>,
}

impl TransporterMemory {
    /// Move to `to`, dropping the cached target. Returns `false` if already there.
    pub fn transition(&mut self, to: TransporterState) -> bool {
        if self.state == to {
            return false;
        }
        trace!(from = self.state.label(), to = to.label(), "Transporter transition");
        self.state = to;
        self.target = None;
        true
    }
}

// ---------------------------------------------------------------------------
// Consumers (builders and upgraders)
// ---------------------------------------------------------------------------

/// Consumer states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    /// Waiting for or fetching energy until full.
    Refilling,
    /// Spending energy on a site until empty.
    Working,
}

impl ConsumerState {
    /// Persisted label.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Refilling => "refilling",
            Self::Working => "working",
        }
    }

    fn from_label(label: &str) -> Option<Self> {
        match label {
            "refilling" => Some(Self::Refilling),
            "working" => Some(Self::Working),
            _ => None,
        }
    }
}

/// Builder and upgrader memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerMemory {
    /// Current state.
    pub state: ConsumerState,
    /// State-scoped target.
    pub target: Option<CachedTarget>,
    /// Open request posted by this consumer.
    pub request: Option<RequestId>,
    /// Site last worked on; sent as the request hint.
    pub work_site: Option<SiteId>,
}

impl ConsumerMemory {
    /// Move to `to`, dropping the cached target. Returns `false` if already there.
    pub fn transition(&mut self, to: ConsumerState) -> bool {
        if self.state == to {
            return false;
        }
        trace!(from = self.state.label(), to = to.label(), "Consumer transition");
        self.state = to;
        self.target = None;
        true
    }
}

// ---------------------------------------------------------------------------
// Role memory
// ---------------------------------------------------------------------------

/// Memory of one agent, one variant per state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleMemory {
    /// Gatherer memory.
    Gatherer(GathererMemory),
    /// Transporter memory.
    Transporter(TransporterMemory),
    /// Builder or upgrader memory.
    Consumer(ConsumerMemory),
}

impl RoleMemory {
    /// Fresh memory for a newly registered agent of `role`.
    pub const fn for_role(role: Role) -> Self {
        match role {
            Role::Gatherer => Self::Gatherer(GathererMemory {
                state: GathererState::Seeking,
                target: None,
            }),
            Role::Transporter => Self::Transporter(TransporterMemory {
                state: TransporterState::Collecting,
                target: None,
                request: None,
            }),
            Role::Builder | Role::Upgrader => Self::Consumer(ConsumerMemory {
                state: ConsumerState::Refilling,
                target: None,
                request: None,
                work_site: None,
            }),
        }
    }

    /// Rebuild memory from a persisted state label and target.
    pub fn from_parts(
        role: Role,
        state: &str,
        target: Option<EntityRef>,
    ) -> Result<Self, AgentError> {
        let unknown = || AgentError::UnknownState {
            role,
            state: state.to_owned(),
        };
        let target = target.map(|target| CachedTarget {
            target,
            last_seen: None,
        });
        let memory = match role {
            Role::Gatherer => Self::Gatherer(GathererMemory {
                state: GathererState::from_label(state).ok_or_else(unknown)?,
                target,
            }),
            Role::Transporter => Self::Transporter(TransporterMemory {
                state: TransporterState::from_label(state).ok_or_else(unknown)?,
                target,
                request: None,
            }),
            Role::Builder | Role::Upgrader => Self::Consumer(ConsumerMemory {
                state: ConsumerState::from_label(state).ok_or_else(unknown)?,
                target,
                request: None,
                work_site: None,
            }),
        };
        Ok(memory)
    }

    /// Label of the current state.
    pub const fn state_label(&self) -> &'static str {
        match self {
            Self::Gatherer(m) => m.state.label(),
            Self::Transporter(m) => m.state.label(),
            Self::Consumer(m) => m.state.label(),
        }
    }

    /// The state-scoped cached target.
    pub const fn cached_target(&self) -> Option<CachedTarget> {
        match self {
            Self::Gatherer(m) => m.target,
            Self::Transporter(m) => m.target,
            Self::Consumer(m) => m.target,
        }
    }

    /// Forget the cached target without changing state.
    pub const fn clear_target(&mut self) {
        match self {
            Self::Gatherer(m) => m.target = None,
            Self::Transporter(m) => m.target = None,
            Self::Consumer(m) => m.target = None,
        }
    }

    /// Request the transporter is serving, if this is a transporter.
    pub const fn serving(&self) -> Option<RequestId> {
        match self {
            Self::Transporter(m) => m.request,
            Self::Gatherer(_) | Self::Consumer(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Agent
// ---------------------------------------------------------------------------

/// One worker as the scheduler sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Agent {
    /// Identifier, shared with the world body.
    pub id: AgentId,
    /// Role.
    pub role: Role,
    /// Zone the agent works for.
    pub home_zone: ZoneId,
    /// Role-specific state machine memory.
    pub memory: RoleMemory,
    /// First tick at which the agent may run another fresh query.
    pub search_ready_at: u64,
    /// Remaining lifetime, refreshed from the census every cycle.
    pub ticks_to_live: u32,
}

impl Agent {
    /// A newly sighted agent.
    pub const fn new(id: AgentId, role: Role, home_zone: ZoneId, ticks_to_live: u32) -> Self {
        Self {
            id,
            role,
            home_zone,
            memory: RoleMemory::for_role(role),
            search_ready_at: 0,
            ticks_to_live,
        }
    }

    /// Rebuild an agent from its persisted record.
    pub fn from_record(id: AgentId, record: &AgentRecord) -> Result<Self, AgentError> {
        Ok(Self {
            id,
            role: record.role,
            home_zone: record.home_zone,
            memory: RoleMemory::from_parts(record.role, &record.state, record.cached_target)?,
            search_ready_at: 0,
            ticks_to_live: u32::MAX,
        })
    }

    /// The record persisted for this agent.
    pub fn record(&self) -> AgentRecord {
        AgentRecord {
            role: self.role,
            state: self.memory.state_label().to_owned(),
            cached_target: self.memory.cached_target().map(|t| t.target),
            home_zone: self.home_zone,
        }
    }

    /// Whether the agent's lifetime has run out.
    pub const fn is_expired(&self) -> bool {
        self.ticks_to_live == 0
    }
}

/// Every agent the scheduler knows about.
#[derive(Debug, Default)]
pub struct AgentRegistry {
    agents: BTreeMap<AgentId, Agent>,
}

impl AgentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a body seen for the first time. Returns `false` if the agent
    /// is already known.
    pub fn register(&mut self, body: &Body) -> bool {
        if self.agents.contains_key(&body.id) {
            return false;
        }
        self.agents.insert(
            body.id,
            Agent::new(body.id, body.role, body.zone, body.ticks_to_live),
        );
        debug!(agent_id = %body.id, role = %body.role, zone = %body.zone, "Agent registered");
        true
    }

    /// Look up an agent.
    pub fn get(&self, id: AgentId) -> Option<&Agent> {
        self.agents.get(&id)
    }

    /// Look up an agent mutably.
    pub fn get_mut(&mut self, id: AgentId) -> Option<&mut Agent> {
        self.agents.get_mut(&id)
    }

    /// Remove an agent.
    pub fn remove(&mut self, id: AgentId) -> Option<Agent> {
        self.agents.remove(&id)
    }

    /// Whether the agent is registered.
    pub fn contains(&self, id: AgentId) -> bool {
        self.agents.contains_key(&id)
    }

    /// Every registered agent in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Agent> {
        self.agents.values()
    }

    /// Ids of every registered agent with `role`, in id order.
    pub fn ids_with_role(&self, role: Role) -> Vec<AgentId> {
        self.agents
            .values()
            .filter(|a| a.role == role)
            .map(|a| a.id)
            .collect()
    }

    /// Number of registered agents.
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// Whether no agent is registered.
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Reload persisted agent records. Records with an unknown state are
    /// skipped. Returns the number restored.
    pub fn restore(&mut self, records: &BTreeMap<AgentId, AgentRecord>) -> usize {
        let mut restored: usize = 0;
        for (id, record) in records {
            match Agent::from_record(*id, record) {
                Ok(agent) => {
                    self.agents.insert(*id, agent);
                    restored = restored.saturating_add(1);
                }
                Err(e) => warn!(agent_id = %id, error = %e, "Skipping unreadable agent record"),
            }
        }
        restored
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use colony_types::NodeId;

    use super::*;

    #[test]
    fn transition_clears_target() {
        let mut memory = GathererMemory {
            state: GathererState::Extracting,
            target: Some(CachedTarget::seen(EntityRef::Node(NodeId::new()), Position::new(1, 1))),
        };
        assert!(!memory.transition(GathererState::Extracting));
        assert!(memory.target.is_some());
        assert!(memory.transition(GathererState::Delivering));
        assert!(memory.target.is_none());
    }

    #[test]
    fn record_round_trips_state_and_target() {
        let site = EntityRef::Site(SiteId::new());
        let mut agent = Agent::new(AgentId::new(), Role::Builder, ZoneId::new(), 100);
        if let RoleMemory::Consumer(m) = &mut agent.memory {
            m.transition(ConsumerState::Working);
            m.target = Some(CachedTarget::seen(site, Position::new(3, 3)));
        }
        let record = agent.record();
        assert_eq!(record.state, "working");
        let restored = Agent::from_record(agent.id, &record).unwrap();
        assert_eq!(restored.memory.state_label(), "working");
        assert_eq!(restored.memory.cached_target().map(|t| t.target), Some(site));
    }

    #[test]
    fn unknown_state_is_rejected() {
        let result = RoleMemory::from_parts(Role::Gatherer, "working", None);
        assert!(matches!(result, Err(AgentError::UnknownState { .. })));
    }

    #[test]
    fn registry_registers_once() {
        let mut registry = AgentRegistry::new();
        let body = Body {
            id: AgentId::new(),
            zone: ZoneId::new(),
            role: Role::Transporter,
            position: Position::new(0, 0),
            carried: 0,
            capacity: 100,
            ticks_to_live: 30,
        };
        assert!(registry.register(&body));
        assert!(!registry.register(&body));
        assert_eq!(registry.ids_with_role(Role::Transporter), vec![body.id]);
        assert_eq!(registry.get(body.id).unwrap().memory.state_label(), "collecting");
    }

    #[test]
    fn restore_skips_bad_records() {
        let zone = ZoneId::new();
        let mut records = BTreeMap::new();
        let good = AgentId::new();
        records.insert(
            good,
            AgentRecord {
                role: Role::Upgrader,
                state: "refilling".to_owned(),
                cached_target: None,
                home_zone: zone,
            },
        );
        records.insert(
            AgentId::new(),
            AgentRecord {
                role: Role::Transporter,
                state: "dancing".to_owned(),
                cached_target: None,
                home_zone: zone,
            },
        );
        let mut registry = AgentRegistry::new();
        assert_eq!(registry.restore(&records), 1);
        assert!(registry.contains(good));
    }
}
