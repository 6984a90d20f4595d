//! Reconnection policy.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

// ============================================================================
// ReconnectPolicy
// ============================================================================

/// Bounded reconnection with capped exponential backoff.
///
/// `retry_budget` counts reconnection attempts after the first try, so an
/// endpoint makes at most `1 + retry_budget` handshake attempts before it
/// gives up. The count restarts after every successful handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Reconnection attempts allowed after the first try.
    pub retry_budget: u32,
    /// Delay before the first reconnection.
    pub base_delay: Duration,
    /// Upper bound on any delay.
    pub max_delay: Duration,
    /// Limit for one connect-and-handshake attempt.
    pub attempt_timeout: Duration,
}

impl ReconnectPolicy {
    /// Budget for automatic connects.
    pub const DEFAULT_RETRY_BUDGET: u32 = 2;

    /// Budget after the user asks to retry or launches the relay.
    pub const MANUAL_RETRY_BUDGET: u32 = 5;

    /// Returns a copy with a different budget.
    #[inline]
    #[must_use]
    pub const fn with_retry_budget(mut self, retry_budget: u32) -> Self {
        self.retry_budget = retry_budget;
        self
    }

    /// Returns `true` if another reconnection is allowed after
    /// `reconnects_done` reconnections.
    #[inline]
    #[must_use]
    pub const fn allows(&self, reconnects_done: u32) -> bool {
        reconnects_done < self.retry_budget
    }

    /// Delay before reconnection number `reconnect` (1-based).
    #[must_use]
    pub fn delay_for(&self, reconnect: u32) -> Duration {
        let exponent = reconnect.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1 << exponent)
            .min(self.max_delay)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            retry_budget: Self::DEFAULT_RETRY_BUDGET,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(1),
            attempt_timeout: Duration::from_secs(1),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
