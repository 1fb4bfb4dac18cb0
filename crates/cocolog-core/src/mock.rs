//! Mock transport implementation for testing.
//!
//! This module provides a transport double that can be used for unit and
//! integration testing without BLE hardware. Tests drive the session by
//! injecting [`TransportEvent`]s and assert on the requests the session
//! issued.
//!
//! # Features
//!
//! - **Request recording**: every request is logged for assertions
//! - **Failure injection**: arm one-shot failures for specific requests
//! - **Event injection**: push adapter events into the session's queue
//!
//! # Example
//!
//! ```
//! use cocolog_core::mock::{MockRequest, MockTransport};
//! use cocolog_core::{DeviceSession, SessionConfig};
//! use cocolog_core::transport::{DeviceHandle, TransportEvent};
//!
//! #[tokio::main]
//! async fn main() {
//!     let (transport, events) = MockTransport::new();
//!     let session = DeviceSession::spawn(
//!         std::sync::Arc::clone(&transport),
//!         events,
//!         SessionConfig::default(),
//!     )
//!     .unwrap();
//!
//!     session.start_scan().unwrap();
//!     transport
//!         .inject(TransportEvent::Discovered {
//!             handle: DeviceHandle::with_name("mock-1", "CocoLog-01"),
//!         })
//!         .await
//!         .unwrap();
//! }
//! ```

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::transport::{
    CharacteristicHandle, DeviceHandle, Transport, TransportEvent, TransportEventReceiver,
    TransportEventSender, transport_channel,
};

/// A request the session issued against the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockRequest {
    /// `request_scan`
    Scan,
    /// `request_stop_scan`
    StopScan,
    /// `request_connect` with the device id.
    Connect(String),
    /// `request_disconnect` with the device id.
    Disconnect(String),
    /// `request_discover_services` with the device id.
    DiscoverServices(String),
    /// `request_discover_characteristics` with device id and service.
    DiscoverCharacteristics(String, Uuid),
    /// `request_subscribe` with device id and characteristic.
    Subscribe(String, Uuid),
    /// `request_write` with the full payload.
    Write {
        /// Device id the write targeted.
        device: String,
        /// Characteristic the write targeted.
        characteristic: Uuid,
        /// Payload bytes.
        payload: Vec<u8>,
        /// Whether an acknowledged write was requested.
        with_ack: bool,
    },
}

/// A mock transport for driving a session in tests.
#[derive(Debug)]
pub struct MockTransport {
    events: TransportEventSender,
    requests: Mutex<Vec<MockRequest>>,
    fail_scan: AtomicBool,
    fail_connect: AtomicBool,
    fail_subscribe: AtomicBool,
    fail_write: AtomicBool,
}

impl MockTransport {
    /// Create a mock and the event receiver to hand to the session.
    pub fn new() -> (std::sync::Arc<Self>, TransportEventReceiver) {
        let (events, receiver) = transport_channel(32);
        let mock = std::sync::Arc::new(Self {
            events,
            requests: Mutex::new(Vec::new()),
            fail_scan: AtomicBool::new(false),
            fail_connect: AtomicBool::new(false),
            fail_subscribe: AtomicBool::new(false),
            fail_write: AtomicBool::new(false),
        });
        (mock, receiver)
    }

    /// Push an adapter event into the session's queue.
    ///
    /// Returns [`Error::SessionClosed`] once the session task is gone.
    pub async fn inject(&self, event: TransportEvent) -> Result<()> {
        self.events
            .send(event)
            .await
            .map_err(|_| Error::SessionClosed)
    }

    /// Every request recorded so far, oldest first.
    pub fn requests(&self) -> Vec<MockRequest> {
        self.lock_requests().clone()
    }

    /// Drain and return the recorded requests.
    pub fn take_requests(&self) -> Vec<MockRequest> {
        std::mem::take(&mut *self.lock_requests())
    }

    /// Make the next `request_scan` fail.
    pub fn fail_next_scan(&self) {
        self.fail_scan.store(true, Ordering::SeqCst);
    }

    /// Make the next `request_connect` fail.
    pub fn fail_next_connect(&self) {
        self.fail_connect.store(true, Ordering::SeqCst);
    }

    /// Make the next `request_subscribe` fail.
    pub fn fail_next_subscribe(&self) {
        self.fail_subscribe.store(true, Ordering::SeqCst);
    }

    /// Make the next `request_write` fail.
    pub fn fail_next_write(&self) {
        self.fail_write.store(true, Ordering::SeqCst);
    }

    fn lock_requests(&self) -> std::sync::MutexGuard<'_, Vec<MockRequest>> {
        self.requests
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn record(&self, request: MockRequest) {
        self.lock_requests().push(request);
    }

    fn maybe_fail(&self, flag: &AtomicBool, operation: &'static str) -> Result<()> {
        if flag.swap(false, Ordering::SeqCst) {
            Err(Error::transport(operation, "injected failure"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn request_scan(&self) -> Result<()> {
        self.record(MockRequest::Scan);
        self.maybe_fail(&self.fail_scan, "scan")
    }

    async fn request_stop_scan(&self) -> Result<()> {
        self.record(MockRequest::StopScan);
        Ok(())
    }

    async fn request_connect(&self, handle: &DeviceHandle) -> Result<()> {
        self.record(MockRequest::Connect(handle.id.clone()));
        self.maybe_fail(&self.fail_connect, "connect")
    }

    async fn request_disconnect(&self, handle: &DeviceHandle) -> Result<()> {
        self.record(MockRequest::Disconnect(handle.id.clone()));
        Ok(())
    }

    async fn request_discover_services(&self, handle: &DeviceHandle) -> Result<()> {
        self.record(MockRequest::DiscoverServices(handle.id.clone()));
        Ok(())
    }

    async fn request_discover_characteristics(
        &self,
        handle: &DeviceHandle,
        service: Uuid,
    ) -> Result<()> {
        self.record(MockRequest::DiscoverCharacteristics(
            handle.id.clone(),
            service,
        ));
        Ok(())
    }

    async fn request_subscribe(
        &self,
        handle: &DeviceHandle,
        characteristic: &CharacteristicHandle,
    ) -> Result<()> {
        self.record(MockRequest::Subscribe(
            handle.id.clone(),
            characteristic.uuid,
        ));
        self.maybe_fail(&self.fail_subscribe, "subscribe")
    }

    async fn request_write(
        &self,
        handle: &DeviceHandle,
        characteristic: &CharacteristicHandle,
        payload: &[u8],
        with_ack: bool,
    ) -> Result<()> {
        self.record(MockRequest::Write {
            device: handle.id.clone(),
            characteristic: characteristic.uuid,
            payload: payload.to_vec(),
            with_ack,
        });
        self.maybe_fail(&self.fail_write, "write")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_requests_in_order() {
        let (mock, _events) = MockTransport::new();

        mock.request_scan().await.unwrap();
        mock.request_connect(&DeviceHandle::new("d1")).await.unwrap();

        assert_eq!(
            mock.take_requests(),
            vec![MockRequest::Scan, MockRequest::Connect("d1".to_string())]
        );
        assert!(mock.requests().is_empty());
    }

    #[tokio::test]
    async fn injected_failure_is_one_shot() {
        let (mock, _events) = MockTransport::new();

        mock.fail_next_scan();
        assert!(mock.request_scan().await.is_err());
        assert!(mock.request_scan().await.is_ok());
    }

    #[tokio::test]
    async fn inject_fails_after_receiver_drops() {
        let (mock, events) = MockTransport::new();
        drop(events);

        let result = mock
            .inject(TransportEvent::Discovered {
                handle: DeviceHandle::new("d1"),
            })
            .await;
        assert!(matches!(result, Err(Error::SessionClosed)));
    }
}
