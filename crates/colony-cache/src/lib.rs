//! Caching and durable-state machinery for the colony scheduling engine.
//!
//! Two layers sit between agents and the expensive parts of the host:
//!
//! - The read path: [`WorldFactsCache`] memoizes world queries per
//!   `(zone, fact class)` with a validity window, so a ranked candidate list
//!   is computed at most once per window no matter how many agents ask.
//! - The write path: [`DurableStateBuffer`] stages per-zone fields and agent
//!   records during the cycle and flushes them into a [`DurableStore`]
//!   exactly once, after all agent logic has run.
//!
//! # Modules
//!
//! - [`buffer`] -- [`DurableStateBuffer`] with last-write-wins staging.
//! - [`error`] -- [`StoreError`] for flush and persistence failures.
//! - [`facts`] -- [`WorldFactsCache`], [`FactKey`], [`Ttl`], [`CacheConfig`].
//! - [`field`] -- [`ZoneField`], the typed name of a persisted per-zone value.
//! - [`store`] -- [`DurableStore`] trait, [`MemoryStore`], [`JsonFileStore`],
//!   and the persisted layout ([`ColonySnapshot`], [`ZoneRecord`]).

pub mod buffer;
pub mod error;
pub mod facts;
pub mod field;
pub mod store;

pub use buffer::{DurableStateBuffer, FlushReport};
pub use error::StoreError;
pub use facts::{CacheConfig, CacheStats, FactKey, Ttl, WorldFactsCache};
pub use field::{Section, ZoneField};
pub use store::{ColonySnapshot, DurableStore, JsonFileStore, MemoryStore, ZoneRecord};
