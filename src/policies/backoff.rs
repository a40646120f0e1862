//! # Delay schedule between retry attempts.
//!
//! [`BackoffPolicy`] decides how long to wait before attempt `n + 1` after attempt `n`
//! failed. Connection establishment, acknowledgment resends and batch-level session
//! retries all draw their delays from one of these.
//!
//! The delay for retry `n` (0-indexed) is `first × factor^n`, capped at `max`, then
//! jittered. The base is derived from the retry index alone, so jitter never feeds back
//! into later delays.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use calvisor::{BackoffPolicy, JitterPolicy};
//!
//! // Reconnect every 5s, as a serial link usually needs a moment to re-enumerate.
//! let reconnect = BackoffPolicy::constant(Duration::from_secs(5));
//! assert_eq!(reconnect.next(0), Duration::from_secs(5));
//! assert_eq!(reconnect.next(7), Duration::from_secs(5));
//!
//! let growing = BackoffPolicy {
//!     first: Duration::from_millis(500),
//!     max: Duration::from_secs(4),
//!     factor: 2.0,
//!     jitter: JitterPolicy::None,
//! };
//! assert_eq!(growing.next(1), Duration::from_secs(1));
//! assert_eq!(growing.next(5), Duration::from_secs(4));
//! ```

use std::time::Duration;

use crate::policies::jitter::JitterPolicy;

/// Retry delay schedule.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub first: Duration,
    /// Upper bound for any delay.
    pub max: Duration,
    /// Multiplicative growth per retry (`1.0` = constant).
    pub factor: f64,
    /// Randomization applied to the computed delay.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// Constant 1s delay, capped at 30s, no jitter.
    fn default() -> Self {
        Self {
            first: Duration::from_secs(1),
            max: Duration::from_secs(30),
            factor: 1.0,
            jitter: JitterPolicy::None,
        }
    }
}

impl BackoffPolicy {
    /// A fixed delay between attempts, without jitter.
    pub fn constant(delay: Duration) -> Self {
        Self {
            first: delay,
            max: delay,
            factor: 1.0,
            jitter: JitterPolicy::None,
        }
    }

    /// Returns the delay before retry number `retry` (0 = first retry).
    pub fn next(&self, retry: u32) -> Duration {
        let max_secs = self.max.as_secs_f64();
        let exp = retry.min(i32::MAX as u32) as i32;
        let raw = self.first.as_secs_f64() * self.factor.powi(exp);

        let base = if !raw.is_finite() || raw < 0.0 || raw > max_secs {
            self.max
        } else {
            Duration::from_secs_f64(raw)
        };

        match self.jitter {
            JitterPolicy::Decorrelated => {
                self.jitter
                    .apply_decorrelated(self.first.min(self.max), base, self.max)
            }
            _ => self.jitter.apply(base),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_policy_never_grows() {
        let policy = BackoffPolicy::constant(Duration::from_secs(5));
        for retry in 0..20 {
            assert_eq!(policy.next(retry), Duration::from_secs(5));
        }
    }

    #[test]
    fn exponential_growth_is_capped() {
        let policy = BackoffPolicy {
            first: Duration::from_millis(250),
            max: Duration::from_secs(2),
            factor: 2.0,
            jitter: JitterPolicy::None,
        };
        assert_eq!(policy.next(0), Duration::from_millis(250));
        assert_eq!(policy.next(1), Duration::from_millis(500));
        assert_eq!(policy.next(2), Duration::from_secs(1));
        assert_eq!(policy.next(3), Duration::from_secs(2));
        assert_eq!(policy.next(60), Duration::from_secs(2));
    }

    #[test]
    fn overflowing_exponent_clamps_to_max() {
        let policy = BackoffPolicy {
            first: Duration::from_millis(100),
            max: Duration::from_secs(10),
            factor: 2.0,
            jitter: JitterPolicy::None,
        };
        assert_eq!(policy.next(u32::MAX), Duration::from_secs(10));
    }

    #[test]
    fn first_larger_than_max_is_clamped() {
        let policy = BackoffPolicy {
            first: Duration::from_secs(10),
            max: Duration::from_secs(3),
            factor: 1.0,
            jitter: JitterPolicy::None,
        };
        assert_eq!(policy.next(0), Duration::from_secs(3));
    }

    #[test]
    fn equal_jitter_stays_within_half_and_full_base() {
        let policy = BackoffPolicy {
            first: Duration::from_secs(4),
            max: Duration::from_secs(4),
            factor: 1.0,
            jitter: JitterPolicy::Equal,
        };
        for retry in 0..50 {
            let d = policy.next(retry);
            assert!(d >= Duration::from_secs(2), "retry {retry}: {d:?}");
            assert!(d <= Duration::from_secs(4), "retry {retry}: {d:?}");
        }
    }
}
