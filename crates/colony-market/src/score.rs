//! Request scoring. Lower scores win.

use colony_types::{Position, ResourceRequest};

use crate::config::MarketConfig;

/// Bonus earned by a request that has waited `age` cycles.
///
/// Grows linearly with age and saturates at `wait_cap`, so an old request
/// can overtake newer ones but never by more than the cap. A negative or
/// NaN product earns nothing.
pub fn wait_bonus(config: &MarketConfig, age: u64) -> f64 {
    (config.wait_rate * age as f64).min(config.wait_cap).max(0.0)
}

/// Score of `request` as seen by a fulfiller standing at `from` at tick `now`.
pub fn score(config: &MarketConfig, request: &ResourceRequest, from: Position, now: u64) -> f64 {
    let age = now.saturating_sub(request.wait_start);
    f64::from(request.priority)
        + config.distance_weight * f64::from(from.range_to(request.requester_position))
        - wait_bonus(config, age)
}
