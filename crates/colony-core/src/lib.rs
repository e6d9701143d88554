//! Cycle orchestration for the colony scheduling engine.
//!
//! This crate owns the per-tick cycle: memory hygiene, fact refresh,
//! market validation, tiered agent dispatch under the budget gate, and the
//! single end-of-cycle flush.
//!
//! # Modules
//!
//! - [`budget`] -- Budget controller with hysteresis and reserve-banded
//!   tier gating.
//! - [`clock`] -- Monotonic cycle counter.
//! - [`config`] -- Configuration loading from `colony-config.yaml`.
//! - [`cycle`] -- [`ColonyState`] and the [`run_cycle`] orchestrator.
//! - [`diagnostics`] -- Per-cycle [`CycleReport`].
//! - [`host`] -- [`ComputeHost`] seam for compute usage and reserve.
//! - [`hygiene`] -- Census, registration, and deferred purge.
//! - [`runner`] -- Async loop around [`run_cycle`].
//!
//! [`ColonyState`]: cycle::ColonyState
//! [`run_cycle`]: cycle::run_cycle
//! [`CycleReport`]: diagnostics::CycleReport
//! [`ComputeHost`]: host::ComputeHost

pub mod budget;
pub mod clock;
pub mod config;
pub mod cycle;
pub mod diagnostics;
pub mod host;
pub mod hygiene;
pub mod runner;

pub use budget::{BudgetConfig, BudgetController, LevelChange, TierUsage};
pub use clock::{ClockError, CycleClock};
pub use config::{ColonyConfig, ConfigError};
pub use cycle::{ColonyState, CycleError, PersistedFact, run_cycle};
pub use diagnostics::CycleReport;
pub use host::{ComputeHost, FixedHost};
pub use runner::{CycleCallback, NoOpCallback, RunEndReason, RunSummary, StopSignal, log_run_end, run_colony};
