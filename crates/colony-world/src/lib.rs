//! World collaborator seams for the colony scheduling engine.
//!
//! The scheduling core never inspects terrain, pathing, or raw game state
//! directly. It talks to the world through two traits:
//!
//! - [`WorldQuery`] -- read-only queries (`query`, `resolve`, census, zone layout).
//! - [`WorldActions`] -- mutations performed by agents (move, harvest, withdraw,
//!   transfer, build, upgrade).
//!
//! [`SimWorld`] is an in-memory implementation used by the tests and the
//! demo engine binary.
//!
//! # Modules
//!
//! - [`error`] -- [`WorldError`] returned by world actions.
//! - [`sim`] -- [`SimWorld`], the in-memory reference world.
//! - [`world`] -- The collaborator traits and [`MoveOutcome`].

pub mod error;
pub mod sim;
pub mod world;

pub use error::WorldError;
pub use sim::{SimWorld, SimWorldConfig};
pub use world::{MoveOutcome, World, WorldActions, WorldQuery};
