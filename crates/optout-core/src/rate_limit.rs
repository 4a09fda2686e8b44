//! Decline attempt rate limiting
//!
//! Pathological pages re-render their banner over and over. Every automated
//! decline attempt must be at least [`MIN_ATTEMPT_INTERVAL`] after the previous
//! one, and a page load gets at most [`MAX_ATTEMPTS`] attempts in total.

use std::time::{Duration, Instant};

pub const MIN_ATTEMPT_INTERVAL: Duration = Duration::from_secs(2);
pub const MAX_ATTEMPTS: u32 = 5;

/// Whether a decline attempt may run now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    /// Too soon after the previous attempt
    Throttled { retry_at: Instant },
    /// Attempt ceiling reached for this page load
    Exhausted,
    /// Consent already resolved
    Resolved,
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimiter {
    min_interval: Duration,
    max_attempts: u32,
}

impl RateLimiter {
    /// Limits looser than the built-in floor are clamped to it
    pub fn new(min_interval: Duration, max_attempts: u32) -> Self {
        Self {
            min_interval: min_interval.max(MIN_ATTEMPT_INTERVAL),
            max_attempts: max_attempts.min(MAX_ATTEMPTS),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn admit(&self, last_attempt: Option<Instant>, attempt_count: u32, now: Instant) -> Admission {
        if attempt_count >= self.max_attempts {
            return Admission::Exhausted;
        }

        match last_attempt {
            Some(last) if now.saturating_duration_since(last) < self.min_interval => {
                Admission::Throttled {
                    retry_at: last + self.min_interval,
                }
            }
            _ => Admission::Allowed,
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(MIN_ATTEMPT_INTERVAL, MAX_ATTEMPTS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_attempt_allowed() {
        let limiter = RateLimiter::default();
        assert_eq!(limiter.admit(None, 0, Instant::now()), Admission::Allowed);
    }

    #[test]
    fn test_interval() {
        let limiter = RateLimiter::default();
        let t0 = Instant::now();

        assert_eq!(
            limiter.admit(Some(t0), 1, t0 + Duration::from_millis(1999)),
            Admission::Throttled {
                retry_at: t0 + Duration::from_secs(2)
            }
        );
        assert_eq!(
            limiter.admit(Some(t0), 1, t0 + Duration::from_secs(2)),
            Admission::Allowed
        );
    }

    #[test]
    fn test_ceiling() {
        let limiter = RateLimiter::default();
        let t0 = Instant::now();
        assert_eq!(
            limiter.admit(Some(t0), MAX_ATTEMPTS, t0 + Duration::from_secs(60)),
            Admission::Exhausted
        );
    }

    #[test]
    fn test_clamped() {
        let limiter = RateLimiter::new(Duration::from_millis(1), 100);
        assert_eq!(limiter.min_interval(), MIN_ATTEMPT_INTERVAL);
        assert_eq!(limiter.max_attempts(), MAX_ATTEMPTS);

        let stricter = RateLimiter::new(Duration::from_secs(10), 1);
        assert_eq!(stricter.min_interval(), Duration::from_secs(10));
        assert_eq!(stricter.max_attempts(), 1);
    }
}
