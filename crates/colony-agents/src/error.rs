//! Error types for the `colony-agents` crate.
//!
//! A missing target is never an error; the targeting cascade reports it as
//! an idle choice. These variants cover genuine faults inside a step.

use colony_types::{AgentId, Role};
use colony_world::WorldError;

/// Errors that can occur while stepping an agent.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// The agent has no body in the world this cycle.
    #[error("agent {agent} has no body")]
    BodyMissing {
        /// The agent.
        agent: AgentId,
    },

    /// The agent's memory does not belong to its role.
    #[error("agent {agent} carries memory that does not fit role {role}")]
    MemoryMismatch {
        /// The agent.
        agent: AgentId,
        /// The role it was stepped as.
        role: Role,
    },

    /// A persisted state label is not a state of the role.
    #[error("unknown state {state:?} for role {role}")]
    UnknownState {
        /// The role.
        role: Role,
        /// The label that failed to parse.
        state: String,
    },

    /// A world action failed.
    #[error("world action failed: {source}")]
    World {
        /// The underlying world error.
        #[from]
        source: WorldError,
    },

    /// The step panicked and was caught.
    #[error("agent step panicked: {message}")]
    Panicked {
        /// The panic payload, if it was a string.
        message: String,
    },
}
