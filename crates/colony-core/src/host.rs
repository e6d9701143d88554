//! Compute-budget seam to the host.
//!
//! The host imposes a per-cycle compute limit and keeps a replenishing
//! reserve. The orchestrator reads usage between role groups to charge
//! compute to tiers, and reads the reserve to drive the budget gate.

/// Host-side compute accounting.
pub trait ComputeHost {
    /// Compute spent so far this cycle.
    fn compute_used(&self) -> f64;

    /// Compute the host allows per cycle.
    fn compute_limit(&self) -> f64;

    /// Current reserve pool.
    fn reserve(&self) -> u64;
}

/// A host with fixed readings, for tests and offline tools.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedHost {
    /// Reported usage.
    pub used: f64,
    /// Reported limit.
    pub limit: f64,
    /// Reported reserve.
    pub reserve: u64,
}

impl Default for FixedHost {
    fn default() -> Self {
        Self {
            used: 0.0,
            limit: 100.0,
            reserve: 10_000,
        }
    }
}

impl ComputeHost for FixedHost {
    fn compute_used(&self) -> f64 {
        self.used
    }

    fn compute_limit(&self) -> f64 {
        self.limit
    }

    fn reserve(&self) -> u64 {
        self.reserve
    }
}
