//! Session configuration.

use std::time::Duration;

use cocolog_types::{ReadingLimits, frame, wire};

use crate::error::{Error, Result};
use crate::rescan::RescanPolicy;

/// Default bounded window for the Connecting phase.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default bounded window for the Negotiating phase.
pub const DEFAULT_NEGOTIATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for a device session.
///
/// Use the builder pattern for convenient configuration:
///
/// ```
/// use std::time::Duration;
/// use cocolog_core::SessionConfig;
///
/// let config = SessionConfig::new()
///     .device_prefix("CocoLog-01")
///     .connect_timeout(Duration::from_secs(20));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Advertised-name prefix a peripheral must match to be pursued.
    pub device_prefix: String,
    /// How long Connecting may run before the attempt fails.
    pub connect_timeout: Duration,
    /// How long Negotiating may run before the attempt fails.
    pub negotiation_timeout: Duration,
    /// Cap on the frame decoder's buffer, in bytes.
    pub max_frame_buffer: usize,
    /// Accepted value ranges for incoming readings.
    pub limits: ReadingLimits,
    /// Write the `start` command on entering Ready when a write endpoint exists.
    pub send_start_on_ready: bool,
    /// Buffer capacity of the session event channel.
    pub event_capacity: usize,
    /// Automatic rescan behavior after unexpected disconnects.
    pub rescan: RescanPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            device_prefix: wire::DEVICE_NAME_PREFIX.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            negotiation_timeout: DEFAULT_NEGOTIATION_TIMEOUT,
            max_frame_buffer: frame::DEFAULT_MAX_BUFFER,
            limits: ReadingLimits::default(),
            send_start_on_ready: true,
            event_capacity: 64,
            rescan: RescanPolicy::disabled(),
        }
    }
}

impl SessionConfig {
    /// Create a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the advertised-name prefix to match.
    #[must_use]
    pub fn device_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.device_prefix = prefix.into();
        self
    }

    /// Set the Connecting-phase timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the Negotiating-phase timeout.
    #[must_use]
    pub fn negotiation_timeout(mut self, timeout: Duration) -> Self {
        self.negotiation_timeout = timeout;
        self
    }

    /// Set the frame-buffer cap in bytes.
    #[must_use]
    pub fn max_frame_buffer(mut self, bytes: usize) -> Self {
        self.max_frame_buffer = bytes;
        self
    }

    /// Set the accepted value ranges.
    #[must_use]
    pub fn limits(mut self, limits: ReadingLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Set whether `start` is written on entering Ready.
    #[must_use]
    pub fn send_start_on_ready(mut self, send: bool) -> Self {
        self.send_start_on_ready = send;
        self
    }

    /// Set the session event channel capacity.
    #[must_use]
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Set the automatic rescan policy.
    #[must_use]
    pub fn rescan(mut self, policy: RescanPolicy) -> Self {
        self.rescan = policy;
        self
    }

    /// Validate the config and return an error if invalid.
    ///
    /// Checks that:
    /// - `device_prefix` is non-empty
    /// - both timeouts are > 0
    /// - `max_frame_buffer` and `event_capacity` are > 0
    /// - the rescan policy is internally consistent
    pub fn validate(&self) -> Result<()> {
        if self.device_prefix.is_empty() {
            return Err(Error::invalid_config("device_prefix must not be empty"));
        }
        if self.connect_timeout.is_zero() {
            return Err(Error::invalid_config("connect_timeout must be > 0"));
        }
        if self.negotiation_timeout.is_zero() {
            return Err(Error::invalid_config("negotiation_timeout must be > 0"));
        }
        if self.max_frame_buffer == 0 {
            return Err(Error::invalid_config("max_frame_buffer must be > 0"));
        }
        if self.event_capacity == 0 {
            return Err(Error::invalid_config("event_capacity must be > 0"));
        }
        self.rescan.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.device_prefix, "CocoLog");
        assert_eq!(config.connect_timeout, Duration::from_secs(15));
        assert_eq!(config.negotiation_timeout, Duration::from_secs(10));
        assert_eq!(config.max_frame_buffer, 4096);
        assert!(config.send_start_on_ready);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = SessionConfig::new()
            .device_prefix("CocoLog-01")
            .connect_timeout(Duration::from_secs(30))
            .event_capacity(128)
            .rescan(RescanPolicy::unlimited());

        assert_eq!(config.device_prefix, "CocoLog-01");
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
        assert!(config.rescan.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(SessionConfig::new().device_prefix("").validate().is_err());
        assert!(
            SessionConfig::new()
                .connect_timeout(Duration::ZERO)
                .validate()
                .is_err()
        );
        assert!(SessionConfig::new().max_frame_buffer(0).validate().is_err());
        assert!(SessionConfig::new().event_capacity(0).validate().is_err());
        assert!(
            SessionConfig::new()
                .rescan(RescanPolicy::enabled().backoff_multiplier(0.0))
                .validate()
                .is_err()
        );
    }
}
