//! Gatherer-to-node bindings.
//!
//! A node admits at most `slots` gatherers at once. Counts are kept here,
//! not on the node, and change by exactly one per bind or unbind.

use std::collections::BTreeMap;

use colony_types::{AgentId, NodeId};
use tracing::trace;

/// Which gatherer works which node.
#[derive(Debug, Default)]
pub struct NodeAssignments {
    counts: BTreeMap<NodeId, u32>,
    by_agent: BTreeMap<AgentId, NodeId>,
}

impl NodeAssignments {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of gatherers bound to `node`.
    pub fn count(&self, node: NodeId) -> u32 {
        self.counts.get(&node).copied().unwrap_or(0)
    }

    /// Whether `node` has a free slot.
    pub fn has_room(&self, node: NodeId, slots: u32) -> bool {
        self.count(node) < slots
    }

    /// The node `agent` is bound to.
    pub fn node_of(&self, agent: AgentId) -> Option<NodeId> {
        self.by_agent.get(&agent).copied()
    }

    /// Bind `agent` to `node`, moving it off any other node first.
    ///
    /// Returns `false` and leaves the map unchanged if `node` is full.
    pub fn bind(&mut self, agent: AgentId, node: NodeId, slots: u32) -> bool {
        if self.node_of(agent) == Some(node) {
            return true;
        }
        if !self.has_room(node, slots) {
            return false;
        }
        self.unbind(agent);
        let count = self.counts.entry(node).or_insert(0);
        *count = count.saturating_add(1);
        self.by_agent.insert(agent, node);
        trace!(agent_id = %agent, node_id = %node, "Gatherer bound to node");
        true
    }

    /// Release the binding of `agent`.
    pub fn unbind(&mut self, agent: AgentId) -> Option<NodeId> {
        let node = self.by_agent.remove(&agent)?;
        if let Some(count) = self.counts.get_mut(&node) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.counts.remove(&node);
            }
        }
        Some(node)
    }

    /// Drop a node that left the world. Returns the agents that were bound.
    pub fn purge_node(&mut self, node: NodeId) -> Vec<AgentId> {
        let agents: Vec<AgentId> = self
            .by_agent
            .iter()
            .filter(|(_, n)| **n == node)
            .map(|(a, _)| *a)
            .collect();
        for agent in &agents {
            self.by_agent.remove(agent);
        }
        self.counts.remove(&node);
        agents
    }

    /// Every node with at least one gatherer.
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.counts.keys().copied()
    }

    /// Number of bound agents.
    pub fn len(&self) -> usize {
        self.by_agent.len()
    }

    /// Whether nobody is bound.
    pub fn is_empty(&self) -> bool {
        self.by_agent.is_empty()
    }
}
