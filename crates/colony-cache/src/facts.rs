//! Time-to-live cache for expensive world queries.
//!
//! Entries are keyed by `(zone, fact class)`. Each class has its own
//! validity window: fast-changing facts such as open energy sinks expire
//! after a handful of cycles, slow facts such as zone topology are
//! "planned" once and kept until explicitly invalidated.
//!
//! A reader never observes a value older than its window: [`WorldFactsCache::get`]
//! treats a stale entry exactly like a missing one.
//!
//! Every write (a [`WorldFactsCache::put`] or a miss inside
//! [`WorldFactsCache::get_or_compute`]) marks the key dirty. The orchestrator
//! drains dirty keys into the durable state buffer at the end of the cycle,
//! so a freshly computed fact is persisted even if nobody reads it again.

use std::cell::Cell;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

use colony_types::{Fact, FactClass, ZoneId};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Validity window of a cached fact.
///
/// In config a window is written `{ cycles: 10 }` (or a bare `10`) and the
/// no-expiry form is the word `planned`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "TtlRepr", into = "TtlRepr")]
pub enum Ttl {
    /// Valid while `now - written_at < n`.
    Cycles(u64),
    /// Valid until explicitly invalidated.
    Planned,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum TtlRepr {
    Bare(u64),
    Window { cycles: u64 },
    Keyword(TtlKeyword),
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum TtlKeyword {
    Planned,
}

impl From<TtlRepr> for Ttl {
    fn from(repr: TtlRepr) -> Self {
        match repr {
            TtlRepr::Bare(cycles) | TtlRepr::Window { cycles } => Self::Cycles(cycles),
            TtlRepr::Keyword(TtlKeyword::Planned) => Self::Planned,
        }
    }
}

impl From<Ttl> for TtlRepr {
    fn from(ttl: Ttl) -> Self {
        match ttl {
            Ttl::Cycles(cycles) => Self::Window { cycles },
            Ttl::Planned => Self::Keyword(TtlKeyword::Planned),
        }
    }
}

impl Ttl {
    /// Whether a value written at `written_at` is still fresh at `now`.
    pub const fn is_fresh(self, written_at: u64, now: u64) -> bool {
        match self {
            Self::Cycles(window) => now.saturating_sub(written_at) < window,
            Self::Planned => true,
        }
    }
}

/// Cache key: one namespace per zone, one slot per fact class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FactKey {
    /// Zone namespace.
    pub zone: ZoneId,
    /// Fact class within the zone.
    pub class: FactClass,
}

impl FactKey {
    /// Create a key.
    pub const fn new(zone: ZoneId, class: FactClass) -> Self {
        Self { zone, class }
    }
}

/// Validity window per fact class.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CacheConfig {
    /// Window for [`FactClass::EnergySinks`].
    #[serde(default = "default_fast_ttl")]
    pub energy_sinks: Ttl,

    /// Window for [`FactClass::EnergySources`].
    #[serde(default = "default_fast_ttl")]
    pub energy_sources: Ttl,

    /// Window for [`FactClass::ConstructionSites`].
    #[serde(default = "default_construction_ttl")]
    pub construction_sites: Ttl,

    /// Window for [`FactClass::ResourceNodes`].
    #[serde(default = "default_node_ttl")]
    pub resource_nodes: Ttl,

    /// Window for [`FactClass::RoleCounts`].
    #[serde(default = "default_role_count_ttl")]
    pub role_counts: Ttl,

    /// Window for [`FactClass::Topology`].
    #[serde(default = "default_topology_ttl")]
    pub topology: Ttl,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            energy_sinks: default_fast_ttl(),
            energy_sources: default_fast_ttl(),
            construction_sites: default_construction_ttl(),
            resource_nodes: default_node_ttl(),
            role_counts: default_role_count_ttl(),
            topology: default_topology_ttl(),
        }
    }
}

impl CacheConfig {
    /// The validity window configured for `class`.
    pub const fn ttl_for(&self, class: FactClass) -> Ttl {
        match class {
            FactClass::EnergySinks => self.energy_sinks,
            FactClass::EnergySources => self.energy_sources,
            FactClass::ConstructionSites => self.construction_sites,
            FactClass::ResourceNodes => self.resource_nodes,
            FactClass::RoleCounts => self.role_counts,
            FactClass::Topology => self.topology,
        }
    }
}

const fn default_fast_ttl() -> Ttl {
    Ttl::Cycles(10)
}

const fn default_construction_ttl() -> Ttl {
    Ttl::Cycles(20)
}

const fn default_node_ttl() -> Ttl {
    Ttl::Cycles(100)
}

const fn default_role_count_ttl() -> Ttl {
    Ttl::Cycles(1)
}

const fn default_topology_ttl() -> Ttl {
    Ttl::Planned
}

/// Hit/miss counters, reset at the start of every cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups served from a fresh entry.
    pub hits: u64,
    /// Lookups that found nothing fresh.
    pub misses: u64,
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    written_at: u64,
    ttl: Ttl,
}

/// TTL-keyed store memoizing world query results.
#[derive(Debug)]
pub struct WorldFactsCache<V = Fact> {
    config: CacheConfig,
    entries: BTreeMap<FactKey, CacheEntry<V>>,
    dirty: BTreeSet<FactKey>,
    hits: Cell<u64>,
    misses: Cell<u64>,
}

impl<V: Clone> WorldFactsCache<V> {
    /// Create an empty cache.
    pub const fn new(config: CacheConfig) -> Self {
        Self {
            config,
            entries: BTreeMap::new(),
            dirty: BTreeSet::new(),
            hits: Cell::new(0),
            misses: Cell::new(0),
        }
    }

    /// The configured window for `class`.
    pub const fn ttl_for(&self, class: FactClass) -> Ttl {
        self.config.ttl_for(class)
    }

    /// Return the cached value if it is still within its window.
    pub fn get(&self, key: &FactKey, now: u64) -> Option<&V> {
        let fresh = self
            .entries
            .get(key)
            .filter(|entry| entry.ttl.is_fresh(entry.written_at, now))
            .map(|entry| &entry.value);
        if fresh.is_some() {
            self.hits.set(self.hits.get().saturating_add(1));
        } else {
            self.misses.set(self.misses.get().saturating_add(1));
        }
        fresh
    }

    /// Store `value` under `key` with the class's configured window.
    pub fn put(&mut self, key: FactKey, value: V, now: u64) {
        let ttl = self.config.ttl_for(key.class);
        self.insert(key, value, now, ttl);
    }

    /// Return the fresh cached value, or invoke `compute`, store its result
    /// with `written_at = now`, and return it.
    pub fn get_or_compute(
        &mut self,
        key: FactKey,
        now: u64,
        ttl: Ttl,
        compute: impl FnOnce() -> V,
    ) -> &V {
        let entry = match self.entries.entry(key) {
            Entry::Occupied(occupied) if occupied.get().ttl.is_fresh(occupied.get().written_at, now) => {
                self.hits.set(self.hits.get().saturating_add(1));
                occupied.into_mut()
            }
            Entry::Occupied(mut occupied) => {
                self.misses.set(self.misses.get().saturating_add(1));
                trace!(zone = %key.zone, class = ?key.class, now, "Fact expired, recomputing");
                occupied.insert(CacheEntry {
                    value: compute(),
                    written_at: now,
                    ttl,
                });
                self.dirty.insert(key);
                occupied.into_mut()
            }
            Entry::Vacant(vacant) => {
                self.misses.set(self.misses.get().saturating_add(1));
                trace!(zone = %key.zone, class = ?key.class, now, "Fact missing, computing");
                self.dirty.insert(key);
                vacant.insert(CacheEntry {
                    value: compute(),
                    written_at: now,
                    ttl,
                })
            }
        };
        &entry.value
    }

    /// Seed an entry from persisted state without marking it dirty.
    pub fn restore(&mut self, key: FactKey, value: V, written_at: u64) {
        let ttl = self.config.ttl_for(key.class);
        self.entries.insert(
            key,
            CacheEntry {
                value,
                written_at,
                ttl,
            },
        );
    }

    /// Drop one entry. Returns `true` if it existed.
    pub fn invalidate(&mut self, key: &FactKey) -> bool {
        self.dirty.remove(key);
        self.entries.remove(key).is_some()
    }

    /// Drop every entry of a zone. Returns the number removed.
    pub fn invalidate_zone(&mut self, zone: ZoneId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| key.zone != zone);
        self.dirty.retain(|key| key.zone != zone);
        before.saturating_sub(self.entries.len())
    }

    /// Drop every entry that is no longer fresh. Returns the number removed.
    pub fn purge_expired(&mut self, now: u64) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.ttl.is_fresh(entry.written_at, now));
        let entries = &self.entries;
        self.dirty.retain(|key| entries.contains_key(key));
        before.saturating_sub(self.entries.len())
    }

    /// Take every key written since the last drain, with its current value
    /// and write tick.
    pub fn drain_dirty(&mut self) -> Vec<(FactKey, V, u64)> {
        let dirty = std::mem::take(&mut self.dirty);
        dirty
            .into_iter()
            .filter_map(|key| {
                self.entries
                    .get(&key)
                    .map(|entry| (key, entry.value.clone(), entry.written_at))
            })
            .collect()
    }

    /// Number of keys waiting to be drained.
    pub fn dirty_len(&self) -> usize {
        self.dirty.len()
    }

    /// Number of stored entries, fresh or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Counters since the last [`WorldFactsCache::reset_stats`].
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.get(),
            misses: self.misses.get(),
        }
    }

    /// Zero the hit/miss counters.
    pub fn reset_stats(&self) {
        self.hits.set(0);
        self.misses.set(0);
    }

    fn insert(&mut self, key: FactKey, value: V, now: u64, ttl: Ttl) {
        self.entries.insert(
            key,
            CacheEntry {
                value,
                written_at: now,
                ttl,
            },
        );
        self.dirty.insert(key);
    }
}
