//! Wire-protocol constants for CocoLog wearables.
//!
//! The sensor exposes a UART-style GATT service: one notify characteristic
//! streaming text frames, one write characteristic accepting commands.

use uuid::{Uuid, uuid};

/// Advertised-name prefix that identifies a CocoLog wearable.
pub const DEVICE_NAME_PREFIX: &str = "CocoLog";

/// Command payload that tells the firmware to begin streaming.
///
/// Written verbatim, no acknowledgment required.
pub const START_COMMAND: &[u8] = b"start";

// --- CocoLog Service and Characteristic UUIDs ---

/// UART-style streaming service exposed by the firmware.
pub const UART_SERVICE: Uuid = uuid!("6e400001-b5a3-f393-e0a9-e50e24dcca9e");

/// Write characteristic: host-to-device commands.
pub const UART_RX_WRITE: Uuid = uuid!("6e400002-b5a3-f393-e0a9-e50e24dcca9e");

/// Notify characteristic: device-to-host reading frames.
pub const UART_TX_NOTIFY: Uuid = uuid!("6e400003-b5a3-f393-e0a9-e50e24dcca9e");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uart_uuids_are_distinct() {
        assert_ne!(UART_SERVICE, UART_RX_WRITE);
        assert_ne!(UART_RX_WRITE, UART_TX_NOTIFY);
        assert_ne!(UART_SERVICE, UART_TX_NOTIFY);
    }

    #[test]
    fn test_uart_uuid_family() {
        // All three share the vendor base; only the short id differs.
        for uuid in [UART_SERVICE, UART_RX_WRITE, UART_TX_NOTIFY] {
            assert!(uuid.to_string().starts_with("6e4000"));
            assert!(uuid.to_string().ends_with("b5a3-f393-e0a9-e50e24dcca9e"));
        }
    }

    #[test]
    fn test_start_command_payload() {
        assert_eq!(START_COMMAND, b"start");
    }
}
