//! Automatic rescan policy for lost connections.
//!
//! When a connection drops without the user asking for it, the session can
//! schedule a fresh scan after a backoff delay instead of sitting dead
//! until someone calls `start_scan()` again. Disabled by default; a user
//! `stop_scan()` always cancels pending rescans.

use std::time::Duration;

use crate::error::{Error, Result};

/// Backoff policy for automatic rescans after unexpected disconnects.
#[derive(Debug, Clone)]
pub struct RescanPolicy {
    /// Whether automatic rescans happen at all.
    pub enabled: bool,
    /// Maximum number of rescan attempts per outage (None = unlimited).
    pub max_attempts: Option<u32>,
    /// Delay before the first rescan attempt.
    pub initial_delay: Duration,
    /// Cap on the delay between attempts.
    pub max_delay: Duration,
    /// Multiplier applied to the delay after each attempt.
    pub backoff_multiplier: f64,
}

impl Default for RescanPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            max_attempts: Some(5),
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
        }
    }
}

impl RescanPolicy {
    /// Policy that never rescans automatically.
    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Enabled policy with the default bounded backoff.
    #[must_use]
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }

    /// Enabled policy that retries forever (for always-on monitors).
    #[must_use]
    pub fn unlimited() -> Self {
        Self {
            enabled: true,
            max_attempts: None,
            ..Self::default()
        }
    }

    /// Set the maximum number of attempts per outage.
    #[must_use]
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Set the delay before the first attempt.
    #[must_use]
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the cap on the delay between attempts.
    #[must_use]
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the backoff multiplier.
    #[must_use]
    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Whether another attempt is allowed after `attempts_so_far`.
    #[must_use]
    pub fn allows_attempt(&self, attempts_so_far: u32) -> bool {
        self.enabled
            && self
                .max_attempts
                .is_none_or(|max| attempts_so_far < max)
    }

    /// Calculate the delay for a given attempt number (0-based).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay_ms =
            self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_millis(delay_ms as u64).min(self.max_delay)
    }

    /// Validate the policy and return an error if invalid.
    ///
    /// Checks that:
    /// - `backoff_multiplier` is >= 1.0
    /// - `initial_delay` is > 0
    /// - `max_delay` >= `initial_delay`
    pub fn validate(&self) -> Result<()> {
        if self.backoff_multiplier < 1.0 {
            return Err(Error::invalid_config("backoff_multiplier must be >= 1.0"));
        }
        if self.initial_delay.is_zero() {
            return Err(Error::invalid_config("initial_delay must be > 0"));
        }
        if self.max_delay < self.initial_delay {
            return Err(Error::invalid_config("max_delay must be >= initial_delay"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_disabled() {
        let policy = RescanPolicy::default();
        assert!(!policy.enabled);
        assert!(!policy.allows_attempt(0));
    }

    #[test]
    fn test_delay_calculation() {
        let policy = RescanPolicy::enabled();

        assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(8));
    }

    #[test]
    fn test_delay_capped_at_max() {
        let policy = RescanPolicy::enabled().max_delay(Duration::from_secs(10));

        // 2^10 = 1024 seconds, but capped at 10
        assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(10));
    }

    #[test]
    fn test_attempt_budget() {
        let policy = RescanPolicy::enabled().max_attempts(3);
        assert!(policy.allows_attempt(0));
        assert!(policy.allows_attempt(2));
        assert!(!policy.allows_attempt(3));

        assert!(RescanPolicy::unlimited().allows_attempt(10_000));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(RescanPolicy::enabled().backoff_multiplier(0.5).validate().is_err());
        assert!(
            RescanPolicy::enabled()
                .initial_delay(Duration::ZERO)
                .validate()
                .is_err()
        );
        assert!(
            RescanPolicy::enabled()
                .initial_delay(Duration::from_secs(30))
                .max_delay(Duration::from_secs(10))
                .validate()
                .is_err()
        );
        assert!(RescanPolicy::enabled().validate().is_ok());
    }
}
