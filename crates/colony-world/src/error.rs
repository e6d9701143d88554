//! Error types for the `colony-world` crate.

use colony_types::{AgentId, EntityRef};

/// Errors returned by world actions.
///
/// A query never fails: a missing entity is reported as `None` or an empty
/// list. Only actions that were attempted on something invalid error out.
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    /// The acting agent has no body in the world.
    #[error("agent not found: {0}")]
    AgentNotFound(AgentId),

    /// The target entity no longer exists.
    #[error("entity not found: {0:?}")]
    EntityNotFound(EntityRef),

    /// The target is farther than interaction range.
    #[error("agent {agent} is out of range of {target:?}")]
    OutOfRange {
        /// The acting agent.
        agent: AgentId,
        /// The target it tried to reach.
        target: EntityRef,
    },

    /// The target exists but does not support the action.
    #[error("{target:?} cannot be used for {action}")]
    WrongKind {
        /// The target.
        target: EntityRef,
        /// The attempted action.
        action: &'static str,
    },
}
