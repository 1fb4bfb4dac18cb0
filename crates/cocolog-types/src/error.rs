//! Error types for frame decoding and reading validation.

use core::fmt;

use thiserror::Error;

/// Errors produced while slicing the notification byte stream into frames.
///
/// These errors are local to the offending frame: the decoder drops the
/// bad data and keeps going, so a session never dies over one garbled
/// notification.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum DecodeError {
    /// A completed frame contained bytes that are not valid UTF-8.
    #[error("frame is not valid UTF-8")]
    NotUtf8,

    /// Buffered data grew past the configured cap without a delimiter.
    ///
    /// The buffer is flushed when this is reported so memory stays bounded.
    #[error("decode buffer exceeded {limit} bytes without a frame delimiter")]
    Overflow {
        /// The configured buffer cap in bytes.
        limit: usize,
    },
}

/// Which field of a frame failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum FieldKind {
    /// The frame did not split into exactly three fields.
    FieldCount,
    /// Heart-rate field failed to parse or was out of range.
    Bpm,
    /// HRV field failed to parse or was out of range.
    Hrv,
    /// SpO2 field failed to parse or was out of range.
    Spo2,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::FieldCount => write!(f, "field count"),
            FieldKind::Bpm => write!(f, "bpm"),
            FieldKind::Hrv => write!(f, "hrv"),
            FieldKind::Spo2 => write!(f, "spo2"),
        }
    }
}

/// A well-formed frame carried a value outside the accepted domain.
///
/// The whole frame is discarded; a reading is never partially applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {field} in frame {raw:?}")]
pub struct ValidationError {
    /// The field that was rejected.
    pub field: FieldKind,
    /// The raw frame text, for diagnostics.
    pub raw: String,
}

impl ValidationError {
    /// Create a validation error for a specific field of a frame.
    pub fn new(field: FieldKind, raw: impl Into<String>) -> Self {
        Self {
            field,
            raw: raw.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_display() {
        assert_eq!(DecodeError::NotUtf8.to_string(), "frame is not valid UTF-8");

        let err = DecodeError::Overflow { limit: 4096 };
        assert!(err.to_string().contains("4096"));
    }

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::new(FieldKind::Spo2, "72,45.3,120");
        let msg = err.to_string();
        assert!(msg.contains("spo2"));
        assert!(msg.contains("72,45.3,120"));
    }

    #[test]
    fn test_field_kind_display() {
        assert_eq!(FieldKind::FieldCount.to_string(), "field count");
        assert_eq!(FieldKind::Bpm.to_string(), "bpm");
        assert_eq!(FieldKind::Hrv.to_string(), "hrv");
        assert_eq!(FieldKind::Spo2.to_string(), "spo2");
    }
}
