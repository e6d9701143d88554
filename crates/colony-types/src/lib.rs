//! Shared type definitions for the colony scheduling engine.
//!
//! This crate is the single source of truth for identifiers, enumerations,
//! and entity shapes used across the workspace. Every other crate depends
//! on it; it depends on nothing but `serde` and `uuid`.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers for agents, zones, nodes, sites, requests
//! - [`enums`] -- Roles, priority tiers, budget levels, query categories, fact classes
//! - [`structs`] -- Positions, world entities, resource requests, cached facts

pub mod enums;
pub mod ids;
pub mod structs;

pub use enums::{BudgetLevel, Category, FactClass, Role, SiteKind, Tier};
pub use ids::{AgentId, NodeId, RequestId, SiteId, ZoneId};
pub use structs::{
    AgentRecord, Body, Entity, EntityRef, Fact, Position, ResourceNode, ResourceRequest, Site,
};
