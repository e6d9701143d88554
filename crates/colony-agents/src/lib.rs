//! Agent logic for the colony scheduling engine.
//!
//! Every worker runs a small role-specific state machine. Transitions are
//! driven only by the agent's own carry buffer (empty or full); targets are
//! picked through a shared cascade that keeps fresh world queries to about
//! one per cooldown window per zone.
//!
//! # Modules
//!
//! - [`agent`] -- [`Agent`], per-role memory structs, and [`AgentRegistry`].
//! - [`assignments`] -- [`NodeAssignments`], gatherer-to-node bindings.
//! - [`config`] -- [`AgentConfig`] tunables.
//! - [`error`] -- [`AgentError`].
//! - [`faults`] -- [`FaultLog`], the bounded ring buffer of step faults.
//! - [`roles`] -- Per-role steps, [`StepContext`], and the guarded entry point.
//! - [`targeting`] -- The cached / shared / fresh / idle target cascade.

pub mod agent;
pub mod assignments;
pub mod config;
pub mod error;
pub mod faults;
pub mod roles;
pub mod targeting;

pub use agent::{
    Agent, AgentRegistry, CachedTarget, ConsumerMemory, ConsumerState, GathererMemory,
    GathererState, RoleMemory, TransporterMemory, TransporterState,
};
pub use assignments::NodeAssignments;
pub use config::AgentConfig;
pub use error::AgentError;
pub use faults::{FAULT_LOG_CAPACITY, FaultLog, FaultRecord};
pub use roles::{Action, StepContext, guarded_step, panic_message, return_to_base, step};
pub use targeting::{Search, TargetChoice, select_target};
