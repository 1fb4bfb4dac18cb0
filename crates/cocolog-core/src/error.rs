//! Error types for cocolog-core.
//!
//! This module defines every failure the session engine can surface.
//!
//! # Propagation policy
//!
//! | Error | Effect on the session |
//! |-------|-----------------------|
//! | [`Error::Decode`] / [`Error::Validation`] | Local: the frame is dropped, a diagnostic event fires, the session stays Ready |
//! | [`Error::Transport`] / [`Error::Bluetooth`] | The current connection attempt ends in Disconnected or Failed; never swallowed |
//! | [`Error::Negotiation`] / [`Error::Timeout`] | Terminal for the attempt: handle released, state Failed, recoverable via `start_scan()` |
//! | [`Error::NotReady`] / [`Error::NoWriteCharacteristic`] | Command rejected, session state untouched |
//!
//! Nothing here is process-fatal: every error is recoverable by restarting
//! the scan/connect cycle.

use std::time::Duration;

use thiserror::Error;

use cocolog_types::{DecodeError, ValidationError};

/// Errors that can occur while driving a CocoLog device session.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Bluetooth Low Energy error from the platform stack.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// A transport adapter request failed.
    #[error("transport request '{operation}' failed: {reason}")]
    Transport {
        /// The request that failed (e.g. `"connect"`).
        operation: &'static str,
        /// Adapter-provided failure description.
        reason: String,
    },

    /// A buffered frame could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// A decoded frame carried out-of-domain values.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Service/characteristic negotiation found no usable endpoint.
    #[error("negotiation failed: {0}")]
    Negotiation(#[from] NegotiationError),

    /// A connection phase exceeded its bounded window.
    #[error("{phase} timed out after {duration:?}")]
    Timeout {
        /// The phase that timed out (`"connect"` or `"negotiation"`).
        phase: &'static str,
        /// The configured window.
        duration: Duration,
    },

    /// A command required the Ready state.
    #[error("session is not ready")]
    NotReady,

    /// A write command was issued but negotiation found no write endpoint.
    #[error("no write-capable characteristic is known")]
    NoWriteCharacteristic,

    /// The session task has shut down; commands can no longer be delivered.
    #[error("session is closed")]
    SessionClosed,

    /// Invalid configuration provided.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Why service/characteristic negotiation could not produce a usable endpoint.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new reasons
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum NegotiationError {
    /// Discovery completed without any notify-capable characteristic.
    #[error("no notify-capable characteristic found across {service_count} services")]
    NoNotifyCharacteristic {
        /// Number of services that were searched.
        service_count: usize,
    },

    /// More than one plausible endpoint; refusing to guess which is correct.
    #[error("ambiguous endpoints: {notify} notify and {write} write candidates")]
    AmbiguousCharacteristics {
        /// Count of notify-capable candidates found.
        notify: usize,
        /// Count of write-capable candidates found.
        write: usize,
    },
}

impl Error {
    /// Create a transport error with operation context.
    pub fn transport(operation: &'static str, reason: impl Into<String>) -> Self {
        Self::Transport {
            operation,
            reason: reason.into(),
        }
    }

    /// Create a timeout error for a connection phase.
    pub fn timeout(phase: &'static str, duration: Duration) -> Self {
        Self::Timeout { phase, duration }
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}

/// Result type alias using cocolog-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
