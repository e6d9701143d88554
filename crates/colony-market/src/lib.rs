//! Request market for the colony scheduling engine.
//!
//! Consumers post [`ResourceRequest`](colony_types::ResourceRequest)s when
//! their buffers run low; transporters scan the open requests of their zone
//! and claim the one with the lowest score. Each request has at most one
//! fulfiller and each fulfiller holds at most one request.
//!
//! # Modules
//!
//! - [`config`] -- [`MarketConfig`] scoring weights and staleness timeout.
//! - [`error`] -- [`MarketError`] for rejected assignments.
//! - [`market`] -- [`RequestMarket`], validation, and persistence hooks.
//! - [`score`] -- the scoring function and its wait bonus.

pub mod config;
pub mod error;
pub mod market;
pub mod score;

pub use config::MarketConfig;
pub use error::MarketError;
pub use market::{Invalidation, InvalidationReason, MarketView, RequestMarket};
pub use score::{score, wait_bonus};
