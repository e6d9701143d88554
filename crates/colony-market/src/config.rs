//! Scoring and staleness parameters.

use serde::Deserialize;

/// Tunables of the request market.
///
/// Only the shape of the score is fixed (priority plus weighted distance
/// minus a capped wait bonus); the weights are configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MarketConfig {
    /// Score added per tile between fulfiller and requester.
    #[serde(default = "default_distance_weight")]
    pub distance_weight: f64,

    /// Wait bonus earned per cycle of waiting.
    #[serde(default = "default_wait_rate")]
    pub wait_rate: f64,

    /// Upper bound of the wait bonus.
    #[serde(default = "default_wait_cap")]
    pub wait_cap: f64,

    /// A request older than this many cycles is dropped.
    #[serde(default = "default_stale_after")]
    pub stale_after: u64,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            distance_weight: default_distance_weight(),
            wait_rate: default_wait_rate(),
            wait_cap: default_wait_cap(),
            stale_after: default_stale_after(),
        }
    }
}

const fn default_distance_weight() -> f64 {
    1.0
}

const fn default_wait_rate() -> f64 {
    1.0
}

const fn default_wait_cap() -> f64 {
    40.0
}

const fn default_stale_after() -> u64 {
    50
}
