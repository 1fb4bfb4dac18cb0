//! Session event stream for diagnostics and UI status.
//!
//! Presentation layers render "searching / connected / lost connection"
//! from the snapshot; this stream carries everything else worth surfacing:
//! discoveries, disconnect reasons, dropped frames, rejected commands.
//! All events are serializable for logging and IPC.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use cocolog_types::Reading;

use crate::session::FailureReason;
use crate::transport::{DeviceHandle, DisconnectReason};

/// Events emitted by a device session.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new event types
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum SessionEvent {
    /// Scanning started.
    ScanStarted,
    /// Scanning stopped without a connection.
    ScanStopped,
    /// A matching peripheral was found and is being pursued.
    DeviceDiscovered {
        /// The matched peripheral.
        handle: DeviceHandle,
    },
    /// Transport-level link established; negotiation begins.
    Connected {
        /// The connected peripheral.
        handle: DeviceHandle,
    },
    /// The session reached Ready: subscribed and streaming.
    Ready {
        /// The ready peripheral.
        handle: DeviceHandle,
    },
    /// The connection ended.
    Disconnected {
        /// The peripheral that disconnected.
        handle: DeviceHandle,
        /// Why the connection ended.
        reason: DisconnectReason,
    },
    /// A validated reading was published.
    ReadingReceived {
        /// The accepted reading.
        reading: Reading,
    },
    /// A frame was dropped by the decoder or validator.
    FrameDropped {
        /// Description of what was wrong with the frame.
        error: String,
    },
    /// The `start` command was written to the device.
    StartSignalSent,
    /// A command could not be executed in the current state.
    CommandRejected {
        /// The rejected command.
        command: String,
        /// Why it was rejected.
        error: String,
    },
    /// A connection attempt ended in failure.
    SessionFailed {
        /// The failure recorded in the session state.
        reason: FailureReason,
    },
    /// An automatic rescan was scheduled after an unexpected disconnect.
    RescanScheduled {
        /// 1-based attempt number within the current outage.
        attempt: u32,
        /// Delay before the rescan, in milliseconds.
        delay_ms: u64,
    },
}

/// Sender for session events.
pub type EventSender = broadcast::Sender<SessionEvent>;

/// Receiver for session events.
pub type EventReceiver = broadcast::Receiver<SessionEvent>;

/// Create a new session event channel with the given capacity.
pub fn event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    broadcast::channel(capacity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization_tag() {
        let event = SessionEvent::FrameDropped {
            error: "invalid spo2 in frame \"72,45.3,120\"".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"frame_dropped\""));

        let back: SessionEvent = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, SessionEvent::FrameDropped { .. }));
    }

    #[test]
    fn test_reading_event_roundtrip() {
        let event = SessionEvent::ReadingReceived {
            reading: Reading::with_timestamp(88, 30.5, 97, time::OffsetDateTime::UNIX_EPOCH),
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: SessionEvent = serde_json::from_str(&json).unwrap();
        match back {
            SessionEvent::ReadingReceived { reading } => {
                assert_eq!(reading.bpm, 88);
                assert_eq!(reading.spo2, 97);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_broadcast_fanout() {
        let (tx, mut rx_a) = event_channel(8);
        let mut rx_b = tx.subscribe();

        tx.send(SessionEvent::ScanStarted).unwrap();

        assert!(matches!(rx_a.try_recv().unwrap(), SessionEvent::ScanStarted));
        assert!(matches!(rx_b.try_recv().unwrap(), SessionEvent::ScanStarted));
    }
}
