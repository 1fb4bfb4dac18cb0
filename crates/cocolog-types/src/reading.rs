//! Core reading type for CocoLog heart sensors.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use time::OffsetDateTime;

/// A single validated physiological reading.
///
/// Produced only by the frame decoder/validator pair; immutable once
/// constructed. Consumers receive it by value through the session snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Reading {
    /// Heart rate in beats per minute.
    pub bpm: u16,
    /// Heart-rate variability in milliseconds.
    pub hrv_ms: f32,
    /// Blood oxygen saturation as a percentage (0-100).
    pub spo2: u8,
    /// When the reading was accepted by the validator.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub captured_at: OffsetDateTime,
}

impl Reading {
    /// Create a reading stamped with the current wall clock.
    #[must_use]
    pub fn new(bpm: u16, hrv_ms: f32, spo2: u8) -> Self {
        Self::with_timestamp(bpm, hrv_ms, spo2, OffsetDateTime::now_utc())
    }

    /// Create a reading with an explicit timestamp.
    #[must_use]
    pub fn with_timestamp(bpm: u16, hrv_ms: f32, spo2: u8, captured_at: OffsetDateTime) -> Self {
        Self {
            bpm,
            hrv_ms,
            spo2,
            captured_at,
        }
    }

    /// Compare the measured fields, ignoring the capture timestamp.
    #[must_use]
    pub fn same_values(&self, other: &Reading) -> bool {
        self.bpm == other.bpm && self.hrv_ms == other.hrv_ms && self.spo2 == other.spo2
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} bpm, HRV {:.1} ms, SpO2 {}%",
            self.bpm, self.hrv_ms, self.spo2
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_format() {
        let reading = Reading::new(72, 45.3, 98);
        assert_eq!(reading.to_string(), "72 bpm, HRV 45.3 ms, SpO2 98%");
    }

    #[test]
    fn test_same_values_ignores_timestamp() {
        let a = Reading::with_timestamp(88, 30.5, 97, OffsetDateTime::UNIX_EPOCH);
        let b = Reading::new(88, 30.5, 97);
        assert!(a.same_values(&b));
        assert!(!a.same_values(&Reading::new(89, 30.5, 97)));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serialization_roundtrip() {
        let reading = Reading::with_timestamp(72, 45.3, 98, OffsetDateTime::UNIX_EPOCH);
        let json = serde_json::to_string(&reading).unwrap();
        assert!(json.contains("\"bpm\":72"));
        assert!(json.contains("\"spo2\":98"));

        let back: Reading = serde_json::from_str(&json).unwrap();
        assert_eq!(back, reading);
    }
}
