//! BLE device-session engine for CocoLog heart sensors.
//!
//! This crate drives one wearable at a time through discovery, connection,
//! service/characteristic negotiation, and subscription, then decodes the
//! sensor's textual frame protocol and publishes validated readings as an
//! atomically swapped snapshot.
//!
//! # Architecture
//!
//! - **[`transport`]**: the boundary to the radio stack. The session only
//!   ever sees [`Transport`] requests and [`transport::TransportEvent`]s.
//! - **[`session`]**: the state machine (`Idle → Scanning → Connecting →
//!   Negotiating → Ready`, with `Disconnected`/`Failed` re-entry) and the
//!   [`DeviceSession`] facade. All transitions are serialized through one
//!   task; commands are fire-and-forget.
//! - **[`ble`]**: the production [`BleTransport`] over btleplug.
//! - **[`mock`]**: a scripted transport for tests.
//! - **[`rescan`]**: bounded-backoff automatic rescans after unexpected
//!   disconnects.
//!
//! Frame decoding and validation live in [`cocolog_types`], which this
//! crate re-exports.
//!
//! # Quick Start
//!
//! ```no_run
//! use cocolog_core::{BleTransport, DeviceSession, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (transport, events) = BleTransport::new().await?;
//!     let session = DeviceSession::spawn(transport, events, SessionConfig::default())?;
//!
//!     session.start_scan()?;
//!
//!     let mut snapshots = session.watch();
//!     while snapshots.changed().await.is_ok() {
//!         let snapshot = snapshots.borrow().clone();
//!         println!("{}: {:?}", snapshot.state, snapshot.latest_reading);
//!     }
//!     Ok(())
//! }
//! ```

pub mod ble;
pub mod config;
pub mod error;
pub mod events;
pub mod mock;
pub mod rescan;
pub mod session;
pub mod transport;

// Re-export the data layer for convenience
pub use cocolog_types::{
    DecodeError, FieldKind, FrameDecoder, Reading, ReadingLimits, ValidationError, wire,
};

// Core exports
pub use ble::BleTransport;
pub use config::SessionConfig;
pub use error::{Error, NegotiationError, Result};
pub use events::{EventReceiver, EventSender, SessionEvent};
pub use mock::{MockRequest, MockTransport};
pub use rescan::RescanPolicy;
pub use session::{DeviceSession, FailureReason, SessionState, Snapshot};
pub use transport::{
    CharacteristicHandle, DeviceHandle, DisconnectReason, Transport, TransportEvent,
    TransportEventReceiver, TransportEventSender,
};
