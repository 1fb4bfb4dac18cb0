//! Range and shape checking for decoded frames.
//!
//! A frame is accepted whole or rejected whole: the published reading is
//! never updated from a frame that fails any field check.

use crate::error::{FieldKind, ValidationError};
use crate::reading::Reading;

/// Accepted value ranges for incoming frames.
///
/// The defaults cover anything a human heart can plausibly produce; use
/// [`ReadingLimits::strict`] to reject values that are technically possible
/// but clinically suspect, or the builder setters for custom ranges.
///
/// # Example
///
/// ```
/// use cocolog_types::validate::ReadingLimits;
///
/// let limits = ReadingLimits::new().bpm_max(220);
/// assert!(limits.parse("72,45.3,98").is_ok());
/// assert!(limits.parse("250,45.3,98").is_err());
/// ```
#[derive(Debug, Clone)]
pub struct ReadingLimits {
    /// Maximum accepted heart rate (bpm).
    pub bpm_max: u16,
    /// Maximum accepted HRV (ms).
    pub hrv_max: f32,
}

impl Default for ReadingLimits {
    fn default() -> Self {
        Self {
            bpm_max: 300,
            hrv_max: 200.0,
        }
    }
}

impl ReadingLimits {
    /// Create limits with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum accepted heart rate (bpm).
    #[must_use]
    pub fn bpm_max(mut self, max: u16) -> Self {
        self.bpm_max = max;
        self
    }

    /// Set the maximum accepted HRV (ms).
    #[must_use]
    pub fn hrv_max(mut self, max: f32) -> Self {
        self.hrv_max = max;
        self
    }

    /// Narrow limits for adult resting measurements.
    #[must_use]
    pub fn strict() -> Self {
        Self {
            bpm_max: 220,
            hrv_max: 150.0,
        }
    }

    /// Wide limits for stress testing or unusual firmware.
    #[must_use]
    pub fn relaxed() -> Self {
        Self {
            bpm_max: 500,
            hrv_max: 500.0,
        }
    }

    /// Parse a decoded frame into a [`Reading`].
    ///
    /// The frame must split on `,` into exactly three fields: a
    /// non-negative integer heart rate, a finite non-negative HRV float,
    /// and an integer SpO2 percentage in `[0, 100]`.
    pub fn parse(&self, raw: &str) -> Result<Reading, ValidationError> {
        let mut fields = raw.split(',');
        let (bpm_raw, hrv_raw, spo2_raw) = match (fields.next(), fields.next(), fields.next()) {
            (Some(b), Some(h), Some(s)) if fields.next().is_none() => (b, h, s),
            _ => return Err(ValidationError::new(FieldKind::FieldCount, raw)),
        };

        let bpm: u16 = bpm_raw
            .trim()
            .parse()
            .map_err(|_| ValidationError::new(FieldKind::Bpm, raw))?;
        if bpm > self.bpm_max {
            return Err(ValidationError::new(FieldKind::Bpm, raw));
        }

        let hrv_ms: f32 = hrv_raw
            .trim()
            .parse()
            .map_err(|_| ValidationError::new(FieldKind::Hrv, raw))?;
        if !hrv_ms.is_finite() || hrv_ms < 0.0 || hrv_ms > self.hrv_max {
            return Err(ValidationError::new(FieldKind::Hrv, raw));
        }

        let spo2: u8 = spo2_raw
            .trim()
            .parse()
            .map_err(|_| ValidationError::new(FieldKind::Spo2, raw))?;
        if spo2 > 100 {
            return Err(ValidationError::new(FieldKind::Spo2, raw));
        }

        Ok(Reading::new(bpm, hrv_ms, spo2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_frame() {
        let reading = ReadingLimits::new().parse("72,45.3,98").unwrap();
        assert_eq!(reading.bpm, 72);
        assert!((reading.hrv_ms - 45.3).abs() < f32::EPSILON);
        assert_eq!(reading.spo2, 98);
    }

    #[test]
    fn test_boundary_values_accepted() {
        let limits = ReadingLimits::new();
        assert!(limits.parse("0,0.0,0").is_ok());
        assert!(limits.parse("300,200.0,100").is_ok());
    }

    #[test]
    fn test_field_count_rejected() {
        let limits = ReadingLimits::new();
        for raw in ["", "72", "72,45.3", "72,45.3,98,1", ",,,"] {
            let err = limits.parse(raw).unwrap_err();
            assert_eq!(err.field, FieldKind::FieldCount, "frame {raw:?}");
        }
    }

    #[test]
    fn test_bpm_rejected() {
        let limits = ReadingLimits::new();
        for raw in ["-1,45.3,98", "abc,45.3,98", "301,45.3,98", "1.5,45.3,98"] {
            let err = limits.parse(raw).unwrap_err();
            assert_eq!(err.field, FieldKind::Bpm, "frame {raw:?}");
        }
    }

    #[test]
    fn test_hrv_rejected() {
        let limits = ReadingLimits::new();
        for raw in ["72,x,98", "72,-0.1,98", "72,200.5,98", "72,inf,98", "72,NaN,98"] {
            let err = limits.parse(raw).unwrap_err();
            assert_eq!(err.field, FieldKind::Hrv, "frame {raw:?}");
        }
    }

    #[test]
    fn test_spo2_rejected() {
        let limits = ReadingLimits::new();
        for raw in ["72,45.3,101", "72,45.3,-3", "72,45.3,ok", "72,45.3,9.5"] {
            let err = limits.parse(raw).unwrap_err();
            assert_eq!(err.field, FieldKind::Spo2, "frame {raw:?}");
        }
    }

    #[test]
    fn test_inner_whitespace_tolerated() {
        // Firmware occasionally pads fields; trimming per field keeps those frames.
        let reading = ReadingLimits::new().parse("72, 45.3, 98").unwrap();
        assert_eq!(reading.bpm, 72);
    }

    #[test]
    fn test_custom_limits() {
        let limits = ReadingLimits::new().bpm_max(100).hrv_max(50.0);
        assert!(limits.parse("100,50.0,98").is_ok());
        assert_eq!(
            limits.parse("101,50.0,98").unwrap_err().field,
            FieldKind::Bpm
        );
        assert_eq!(
            limits.parse("100,50.1,98").unwrap_err().field,
            FieldKind::Hrv
        );
    }

    #[test]
    fn test_presets() {
        assert!(ReadingLimits::strict().parse("230,45.3,98").is_err());
        assert!(ReadingLimits::relaxed().parse("400,300.0,98").is_ok());
    }
}
