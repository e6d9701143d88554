//! Cycle counter.
//!
//! The clock is the single source of truth for the current tick. Every
//! TTL, wait bonus, cooldown, and staleness check in the workspace is
//! measured against it. It advances once at the start of each cycle using
//! checked arithmetic.

/// Errors that can occur during clock operations.
#[derive(Debug, thiserror::Error)]
pub enum ClockError {
    /// Tick counter would overflow.
    #[error("tick counter overflow: cannot advance beyond u64::MAX")]
    TickOverflow,
}

/// Monotonic cycle counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleClock {
    tick: u64,
}

impl CycleClock {
    /// A clock at tick 0.
    pub const fn new() -> Self {
        Self { tick: 0 }
    }

    /// A clock resumed at `tick` (state restoration).
    pub const fn from_tick(tick: u64) -> Self {
        Self { tick }
    }

    /// Advance by one tick. Returns the new tick number.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::TickOverflow`] if the tick counter would exceed
    /// `u64::MAX`.
    pub fn advance(&mut self) -> Result<u64, ClockError> {
        self.tick = self.tick.checked_add(1).ok_or(ClockError::TickOverflow)?;
        Ok(self.tick)
    }

    /// The current tick.
    pub const fn tick(&self) -> u64 {
        self.tick
    }
}
