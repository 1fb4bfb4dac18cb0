//! Platform-agnostic types for CocoLog heart sensors.
//!
//! This crate provides the data layer shared by every CocoLog frontend:
//! the validated [`Reading`] type, the stateful line-oriented
//! [`FrameDecoder`], the [`ReadingLimits`] validator, and the wire
//! constants for the sensor's GATT service. It has no Bluetooth
//! dependency, so it can be reused by simulators and test harnesses.
//!
//! # Wire format
//!
//! The wearable streams one reading per newline-terminated frame, fields
//! comma-separated: `<bpm:int>,<hrv:float>,<spo2:int>`, e.g. `72,45.3,98`.
//!
//! # Example
//!
//! ```
//! use cocolog_types::{FrameDecoder, ReadingLimits};
//!
//! let mut decoder = FrameDecoder::new();
//! let limits = ReadingLimits::default();
//!
//! for frame in decoder.feed(b"72,45.3,98\n") {
//!     let reading = limits.parse(&frame.unwrap()).unwrap();
//!     assert_eq!(reading.bpm, 72);
//! }
//! ```

pub mod error;
pub mod frame;
pub mod reading;
pub mod validate;
pub mod wire;

pub use error::{DecodeError, FieldKind, ValidationError};
pub use frame::{DEFAULT_MAX_BUFFER, FrameDecoder};
pub use reading::Reading;
pub use validate::ReadingLimits;

#[cfg(test)]
mod tests {
    use super::*;

    // --- Decoder + validator pipeline tests ---

    #[test]
    fn test_decode_then_validate_pipeline() {
        let mut decoder = FrameDecoder::new();
        let limits = ReadingLimits::default();

        let mut readings = Vec::new();
        for chunk in [&b"88,30"[..], &b".5,97\n64,52.1,99\n"[..]] {
            for frame in decoder.feed(chunk) {
                readings.push(limits.parse(&frame.unwrap()).unwrap());
            }
        }

        assert_eq!(readings.len(), 2);
        assert_eq!(readings[0].bpm, 88);
        assert_eq!(readings[1].spo2, 99);
    }

    #[test]
    fn test_bad_frame_does_not_poison_stream() {
        let mut decoder = FrameDecoder::new();
        let limits = ReadingLimits::default();

        let frames = decoder.feed(b"72,45.3,120\n72,45.3,98\n");
        let results: Vec<_> = frames
            .into_iter()
            .map(|f| limits.parse(&f.unwrap()))
            .collect();

        assert_eq!(results[0].as_ref().unwrap_err().field, FieldKind::Spo2);
        assert_eq!(results[1].as_ref().unwrap().bpm, 72);
    }
}

#[cfg(test)]
mod proptests {
    use proptest::prelude::*;

    use super::*;

    proptest! {
        /// Every in-range triple round-trips through format + parse.
        #[test]
        fn valid_triples_parse(bpm in 0u16..=300, hrv in 0.0f32..=200.0, spo2 in 0u8..=100) {
            let frame = format!("{bpm},{hrv},{spo2}");
            let reading = ReadingLimits::default().parse(&frame).unwrap();
            prop_assert_eq!(reading.bpm, bpm);
            prop_assert_eq!(reading.spo2, spo2);
            prop_assert!((reading.hrv_ms - hrv).abs() < 1e-3);
        }

        /// The decoder emits identical frames regardless of how the input
        /// is split into chunks.
        #[test]
        fn chunking_is_invisible(frames in prop::collection::vec("[0-9]{1,3},[0-9]{1,3}\\.[0-9]", 1..8), split in 1usize..16) {
            let joined: String = frames.iter().map(|f| format!("{f}\n")).collect();
            let bytes = joined.as_bytes();

            let mut whole = FrameDecoder::new();
            let expected: Vec<_> = whole.feed(bytes).into_iter().map(|f| f.unwrap()).collect();

            let mut chunked = FrameDecoder::new();
            let mut got = Vec::new();
            for chunk in bytes.chunks(split) {
                got.extend(chunked.feed(chunk).into_iter().map(|f| f.unwrap()));
            }

            prop_assert_eq!(got, expected);
        }

        /// Arbitrary garbage never panics the decoder or validator, and the
        /// decoder's buffer stays bounded.
        #[test]
        fn garbage_never_panics(chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..512), 0..16)) {
            let mut decoder = FrameDecoder::new();
            let limits = ReadingLimits::default();
            for chunk in &chunks {
                for frame in decoder.feed(chunk) {
                    if let Ok(text) = frame {
                        let _ = limits.parse(&text);
                    }
                }
                prop_assert!(decoder.buffered() <= DEFAULT_MAX_BUFFER);
            }
        }
    }
}
