//! Reconnection Policy
//!
//! Bounded exponential backoff with jitter for the upstream connection.
//! Attempts are numbered from 1; once `max_attempts` have failed the
//! connection is declared degraded and no further attempts are made until
//! a new subscribe arrives.

use std::time::Duration;

use rand::Rng;

/// Backoff schedule for upstream connection attempts.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Ceiling applied after exponential growth.
    pub max_delay: Duration,
    /// Growth factor between consecutive attempts.
    pub multiplier: f64,
    /// Attempts allowed before declaring the feed degraded.
    pub max_attempts: u32,
    /// Random fraction of the delay added as jitter (0.0 to disable).
    pub jitter: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            max_attempts: 10,
            jitter: 0.1,
        }
    }
}

impl ReconnectPolicy {
    /// Whether the given attempt number exceeds the budget.
    #[must_use]
    pub const fn exhausted(&self, attempt: u32) -> bool {
        attempt > self.max_attempts
    }

    /// Delay to sleep before the given attempt (numbered from 1).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32);
        let raw = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent as i32);
        let capped = raw.min(self.max_delay.as_secs_f64());

        let jittered = if self.jitter > 0.0 {
            capped + rand::rng().random_range(0.0..capped * self.jitter)
        } else {
            capped
        };
        Duration::from_secs_f64(jittered.min(self.max_delay.as_secs_f64()))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter() -> ReconnectPolicy {
        ReconnectPolicy {
            jitter: 0.0,
            ..ReconnectPolicy::default()
        }
    }

    #[test]
    fn delays_grow_exponentially() {
        let policy = no_jitter();
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_secs(1));
        assert_eq!(policy.delay_for(3), Duration::from_secs(2));
        assert_eq!(policy.delay_for(4), Duration::from_secs(4));
    }

    #[test]
    fn delay_is_capped_at_max() {
        let policy = no_jitter();
        assert_eq!(policy.delay_for(20), Duration::from_secs(30));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = ReconnectPolicy::default();
        for attempt in 1..=12 {
            let base = no_jitter().delay_for(attempt);
            let jittered = policy.delay_for(attempt);
            assert!(jittered >= base);
            assert!(jittered <= policy.max_delay.max(base.mul_f64(1.0 + policy.jitter)));
        }
    }

    #[test]
    fn budget_exhaustion() {
        let policy = ReconnectPolicy::default();
        assert!(!policy.exhausted(1));
        assert!(!policy.exhausted(10));
        assert!(policy.exhausted(11));
    }
}
