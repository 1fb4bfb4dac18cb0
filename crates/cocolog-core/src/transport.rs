//! Transport boundary between the session engine and the radio stack.
//!
//! The session never talks to a BLE library directly. It issues requests
//! through the [`Transport`] trait and consumes [`TransportEvent`]s from a
//! single queue, which is what serializes every state transition. The
//! production implementation is [`crate::ble::BleTransport`]; tests use
//! [`crate::mock::MockTransport`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::Result;

/// Opaque reference to a discovered peripheral.
///
/// A session holds at most one handle at a time; it is replaced wholesale
/// on reconnect and never mutated in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceHandle {
    /// Platform identifier (MAC address, or a UUID on macOS).
    pub id: String,
    /// Advertised name, if the advertisement carried one.
    pub name: Option<String>,
}

impl DeviceHandle {
    /// Create a handle without a name.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
        }
    }

    /// Create a handle with an advertised name.
    pub fn with_name(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: Some(name.into()),
        }
    }

    /// Human-readable label: the name when known, the id otherwise.
    #[must_use]
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// A data endpoint on the peripheral, as reported during discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicHandle {
    /// The characteristic UUID.
    pub uuid: Uuid,
    /// UUID of the service that owns it.
    pub service: Uuid,
    /// Supports notifications (device push).
    pub notify: bool,
    /// Supports acknowledged writes.
    pub write: bool,
    /// Supports unacknowledged writes.
    pub write_without_response: bool,
}

impl CharacteristicHandle {
    /// Whether any write mode is available.
    #[must_use]
    pub fn writable(&self) -> bool {
        self.write || self.write_without_response
    }
}

/// Why a connection ended.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new reasons
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum DisconnectReason {
    /// The session itself asked for the teardown.
    Requested,
    /// The link dropped without a request.
    ConnectionLost,
    /// A bounded connection phase expired.
    Timeout,
    /// The platform stack reported an error.
    BleError(String),
    /// No reason available.
    Unknown,
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Requested => write!(f, "requested"),
            Self::ConnectionLost => write!(f, "connection lost"),
            Self::Timeout => write!(f, "timed out"),
            Self::BleError(msg) => write!(f, "BLE error: {}", msg),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Events a transport adapter delivers to the session.
///
/// Adapters may emit these from any execution context; the session's event
/// queue is the serialization point.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new event types
/// in future versions without breaking downstream code.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum TransportEvent {
    /// A peripheral advertisement was seen (or updated with a name).
    Discovered {
        /// The peripheral, with its advertised name if known.
        handle: DeviceHandle,
    },
    /// The link to a peripheral is up.
    Connected {
        /// The connected peripheral.
        handle: DeviceHandle,
    },
    /// The link to a peripheral went down.
    Disconnected {
        /// The peripheral that disconnected.
        handle: DeviceHandle,
        /// Adapter's best knowledge of why.
        reason: DisconnectReason,
    },
    /// Service discovery finished.
    ServicesDiscovered {
        /// The peripheral the services belong to.
        handle: DeviceHandle,
        /// UUIDs of every discovered service.
        services: Vec<Uuid>,
    },
    /// Characteristic discovery finished for one service.
    CharacteristicsDiscovered {
        /// The peripheral the characteristics belong to.
        handle: DeviceHandle,
        /// The service that was inspected.
        service: Uuid,
        /// Every characteristic of that service.
        characteristics: Vec<CharacteristicHandle>,
    },
    /// A subscribed characteristic delivered a value.
    ValueUpdated {
        /// The peripheral that sent the value.
        handle: DeviceHandle,
        /// UUID of the characteristic that notified.
        characteristic: Uuid,
        /// Raw payload bytes.
        data: Vec<u8>,
    },
    /// Outcome of an acknowledged write.
    WriteResult {
        /// The peripheral that was written to.
        handle: DeviceHandle,
        /// UUID of the written characteristic.
        characteristic: Uuid,
        /// Whether the device acknowledged the write.
        success: bool,
    },
}

/// Sender half of a transport event queue.
pub type TransportEventSender = mpsc::Sender<TransportEvent>;

/// Receiver half of a transport event queue.
pub type TransportEventReceiver = mpsc::Receiver<TransportEvent>;

/// Create a transport event queue with the given capacity.
pub fn transport_channel(capacity: usize) -> (TransportEventSender, TransportEventReceiver) {
    mpsc::channel(capacity)
}

/// Abstraction over the underlying radio stack.
///
/// All requests are non-blocking from the session's point of view: they
/// enqueue work with the platform stack and return; completion and failure
/// surface later as [`TransportEvent`]s. Request methods return `Err` only
/// when the stack refuses the request outright.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Begin advertising discovery.
    async fn request_scan(&self) -> Result<()>;

    /// Stop advertising discovery.
    async fn request_stop_scan(&self) -> Result<()>;

    /// Open a link to a discovered peripheral.
    async fn request_connect(&self, handle: &DeviceHandle) -> Result<()>;

    /// Tear down the link to a peripheral.
    async fn request_disconnect(&self, handle: &DeviceHandle) -> Result<()>;

    /// Enumerate the peripheral's services.
    async fn request_discover_services(&self, handle: &DeviceHandle) -> Result<()>;

    /// Enumerate the characteristics of one service.
    async fn request_discover_characteristics(
        &self,
        handle: &DeviceHandle,
        service: Uuid,
    ) -> Result<()>;

    /// Subscribe to notifications from a characteristic.
    async fn request_subscribe(
        &self,
        handle: &DeviceHandle,
        characteristic: &CharacteristicHandle,
    ) -> Result<()>;

    /// Write a payload to a characteristic.
    async fn request_write(
        &self,
        handle: &DeviceHandle,
        characteristic: &CharacteristicHandle,
        payload: &[u8],
        with_ack: bool,
    ) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_handle_label() {
        let anon = DeviceHandle::new("AA:BB:CC:DD:EE:FF");
        assert_eq!(anon.label(), "AA:BB:CC:DD:EE:FF");

        let named = DeviceHandle::with_name("AA:BB:CC:DD:EE:FF", "CocoLog-01");
        assert_eq!(named.label(), "CocoLog-01");
    }

    #[test]
    fn test_characteristic_writable() {
        let mut ch = CharacteristicHandle {
            uuid: cocolog_types::wire::UART_RX_WRITE,
            service: cocolog_types::wire::UART_SERVICE,
            notify: false,
            write: false,
            write_without_response: false,
        };
        assert!(!ch.writable());

        ch.write_without_response = true;
        assert!(ch.writable());

        ch.write_without_response = false;
        ch.write = true;
        assert!(ch.writable());
    }

    #[test]
    fn test_disconnect_reason_display() {
        assert_eq!(DisconnectReason::Requested.to_string(), "requested");
        assert_eq!(
            DisconnectReason::BleError("gatt 133".into()).to_string(),
            "BLE error: gatt 133"
        );
    }

    #[test]
    fn test_device_handle_serialization() {
        let handle = DeviceHandle::with_name("id-1", "CocoLog-01");
        let json = serde_json::to_string(&handle).unwrap();
        let back: DeviceHandle = serde_json::from_str(&json).unwrap();
        assert_eq!(back, handle);
    }
}
