//! btleplug-backed transport adapter.
//!
//! Bridges the platform BLE stack to the session's event-driven
//! [`Transport`] boundary: central events and characteristic notifications
//! are pumped into the session's queue, and session requests are forwarded
//! to the adapter/peripheral APIs.
//!
//! Peripheral identifiers differ by platform: Linux/Windows expose the
//! Bluetooth MAC address, macOS a CoreBluetooth UUID. [`DeviceHandle::id`]
//! carries whichever the platform provides, verbatim.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use btleplug::api::{
    Central, CentralEvent, CharPropFlags, Characteristic, Manager as _, Peripheral as _,
    ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::transport::{
    CharacteristicHandle, DeviceHandle, DisconnectReason, Transport, TransportEvent,
    TransportEventReceiver, TransportEventSender, transport_channel,
};

/// Buffer capacity of the adapter-to-session event queue.
const EVENT_QUEUE_CAPACITY: usize = 64;

type SharedPeripherals = Arc<Mutex<HashMap<String, Peripheral>>>;

/// Production [`Transport`] over the first available Bluetooth adapter.
///
/// Must be created inside a tokio runtime: a background task pumps central
/// events (discoveries, disconnects) for as long as the transport lives,
/// and each subscription spawns a notification pump for its peripheral.
pub struct BleTransport {
    adapter: Adapter,
    events: TransportEventSender,
    peripherals: SharedPeripherals,
    notify_pumps: Mutex<HashMap<String, JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl BleTransport {
    /// Acquire an adapter and start the central event pump.
    ///
    /// Returns the transport and the event receiver to hand to
    /// [`crate::DeviceSession::spawn`].
    pub async fn new() -> Result<(Arc<Self>, TransportEventReceiver)> {
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::transport("adapter", "no Bluetooth adapter available"))?;

        Self::with_adapter(adapter).await
    }

    /// Start the transport on a specific adapter.
    pub async fn with_adapter(adapter: Adapter) -> Result<(Arc<Self>, TransportEventReceiver)> {
        let (events, receiver) = transport_channel(EVENT_QUEUE_CAPACITY);
        let peripherals: SharedPeripherals = Arc::new(Mutex::new(HashMap::new()));
        let cancel = CancellationToken::new();

        let central_stream = adapter.events().await?;
        tokio::spawn(central_pump(
            adapter.clone(),
            central_stream,
            Arc::clone(&peripherals),
            events.clone(),
            cancel.clone(),
        ));

        let transport = Arc::new(Self {
            adapter,
            events,
            peripherals,
            notify_pumps: Mutex::new(HashMap::new()),
            cancel,
        });
        Ok((transport, receiver))
    }

    fn lock_peripherals(&self) -> MutexGuard<'_, HashMap<String, Peripheral>> {
        self.peripherals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_pumps(&self) -> MutexGuard<'_, HashMap<String, JoinHandle<()>>> {
        self.notify_pumps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn find(&self, handle: &DeviceHandle) -> Result<Peripheral> {
        self.lock_peripherals()
            .get(&handle.id)
            .cloned()
            .ok_or_else(|| Error::transport("lookup", format!("unknown device {}", handle.id)))
    }

    fn find_characteristic(
        peripheral: &Peripheral,
        uuid: Uuid,
    ) -> Result<Characteristic> {
        peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == uuid)
            .ok_or_else(|| Error::transport("characteristic", format!("{uuid} not discovered")))
    }

    fn stop_notify_pump(&self, device_id: &str) {
        if let Some(pump) = self.lock_pumps().remove(device_id) {
            pump.abort();
        }
    }
}

impl Drop for BleTransport {
    fn drop(&mut self) {
        self.cancel.cancel();
        for (_, pump) in self.lock_pumps().drain() {
            pump.abort();
        }
    }
}

#[async_trait]
impl Transport for BleTransport {
    async fn request_scan(&self) -> Result<()> {
        debug!("starting BLE scan");
        self.adapter.start_scan(ScanFilter::default()).await?;
        Ok(())
    }

    async fn request_stop_scan(&self) -> Result<()> {
        debug!("stopping BLE scan");
        self.adapter.stop_scan().await?;
        Ok(())
    }

    async fn request_connect(&self, handle: &DeviceHandle) -> Result<()> {
        let peripheral = self.find(handle)?;
        debug!(device = %handle.label(), "connecting");
        // The Connected event arrives via the central pump.
        peripheral.connect().await?;
        Ok(())
    }

    async fn request_disconnect(&self, handle: &DeviceHandle) -> Result<()> {
        self.stop_notify_pump(&handle.id);
        let peripheral = self.find(handle)?;
        debug!(device = %handle.label(), "disconnecting");
        peripheral.disconnect().await?;
        Ok(())
    }

    async fn request_discover_services(&self, handle: &DeviceHandle) -> Result<()> {
        let peripheral = self.find(handle)?;
        peripheral.discover_services().await?;

        let services: Vec<Uuid> = peripheral.services().iter().map(|s| s.uuid).collect();
        debug!(device = %handle.label(), count = services.len(), "services discovered");
        send_event(
            &self.events,
            TransportEvent::ServicesDiscovered {
                handle: handle.clone(),
                services,
            },
        )
        .await;
        Ok(())
    }

    async fn request_discover_characteristics(
        &self,
        handle: &DeviceHandle,
        service: Uuid,
    ) -> Result<()> {
        let peripheral = self.find(handle)?;
        let found = peripheral
            .services()
            .into_iter()
            .find(|s| s.uuid == service)
            .ok_or_else(|| Error::transport("service", format!("{service} not discovered")))?;

        let characteristics = found
            .characteristics
            .into_iter()
            .map(|c| CharacteristicHandle {
                uuid: c.uuid,
                service,
                notify: c.properties.contains(CharPropFlags::NOTIFY),
                write: c.properties.contains(CharPropFlags::WRITE),
                write_without_response: c
                    .properties
                    .contains(CharPropFlags::WRITE_WITHOUT_RESPONSE),
            })
            .collect();

        send_event(
            &self.events,
            TransportEvent::CharacteristicsDiscovered {
                handle: handle.clone(),
                service,
                characteristics,
            },
        )
        .await;
        Ok(())
    }

    async fn request_subscribe(
        &self,
        handle: &DeviceHandle,
        characteristic: &CharacteristicHandle,
    ) -> Result<()> {
        let peripheral = self.find(handle)?;
        let target = Self::find_characteristic(&peripheral, characteristic.uuid)?;
        peripheral.subscribe(&target).await?;
        debug!(device = %handle.label(), characteristic = %characteristic.uuid, "subscribed");

        let stream = peripheral.notifications().await?;
        let pump = tokio::spawn(notification_pump(
            stream,
            handle.clone(),
            self.events.clone(),
            self.cancel.child_token(),
        ));

        // One pump per device; a resubscribe replaces the previous one.
        if let Some(previous) = self.lock_pumps().insert(handle.id.clone(), pump) {
            previous.abort();
        }
        Ok(())
    }

    async fn request_write(
        &self,
        handle: &DeviceHandle,
        characteristic: &CharacteristicHandle,
        payload: &[u8],
        with_ack: bool,
    ) -> Result<()> {
        let peripheral = self.find(handle)?;
        let target = Self::find_characteristic(&peripheral, characteristic.uuid)?;
        let write_type = if with_ack {
            WriteType::WithResponse
        } else {
            WriteType::WithoutResponse
        };
        peripheral.write(&target, payload, write_type).await?;

        if with_ack {
            send_event(
                &self.events,
                TransportEvent::WriteResult {
                    handle: handle.clone(),
                    characteristic: characteristic.uuid,
                    success: true,
                },
            )
            .await;
        }
        Ok(())
    }
}

/// Forward an event to the session, tolerating a closed queue.
async fn send_event(events: &TransportEventSender, event: TransportEvent) {
    if events.send(event).await.is_err() {
        debug!("session event queue closed");
    }
}

/// Translate central events into transport events for the session.
async fn central_pump(
    adapter: Adapter,
    mut stream: std::pin::Pin<Box<dyn futures::Stream<Item = CentralEvent> + Send>>,
    peripherals: SharedPeripherals,
    events: TransportEventSender,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("central pump cancelled");
                break;
            }
            event = stream.next() => {
                let Some(event) = event else {
                    debug!("central event stream ended");
                    break;
                };
                match event {
                    CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => {
                        if let Some(handle) =
                            register_peripheral(&adapter, &peripherals, &id).await
                        {
                            send_event(&events, TransportEvent::Discovered { handle }).await;
                        }
                    }
                    CentralEvent::DeviceConnected(id) => {
                        send_event(
                            &events,
                            TransportEvent::Connected {
                                handle: DeviceHandle::new(peripheral_key(&id)),
                            },
                        )
                        .await;
                    }
                    CentralEvent::DeviceDisconnected(id) => {
                        send_event(
                            &events,
                            TransportEvent::Disconnected {
                                handle: DeviceHandle::new(peripheral_key(&id)),
                                reason: DisconnectReason::ConnectionLost,
                            },
                        )
                        .await;
                    }
                    _ => {}
                }
            }
        }
    }
}

/// Cache a discovered peripheral and build its handle.
async fn register_peripheral(
    adapter: &Adapter,
    peripherals: &SharedPeripherals,
    id: &PeripheralId,
) -> Option<DeviceHandle> {
    let peripheral = match adapter.peripheral(id).await {
        Ok(p) => p,
        Err(e) => {
            debug!(error = %e, "peripheral lookup failed");
            return None;
        }
    };

    let name = match peripheral.properties().await {
        Ok(props) => props.and_then(|p| p.local_name),
        Err(e) => {
            debug!(error = %e, "property read failed");
            None
        }
    };

    let key = peripheral_key(id);
    peripherals
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(key.clone(), peripheral);

    Some(DeviceHandle { id: key, name })
}

/// Forward characteristic notifications for one peripheral.
async fn notification_pump(
    mut stream: std::pin::Pin<
        Box<dyn futures::Stream<Item = btleplug::api::ValueNotification> + Send>,
    >,
    handle: DeviceHandle,
    events: TransportEventSender,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            notification = stream.next() => {
                let Some(notification) = notification else {
                    debug!(device = %handle.label(), "notification stream ended");
                    break;
                };
                send_event(
                    &events,
                    TransportEvent::ValueUpdated {
                        handle: handle.clone(),
                        characteristic: notification.uuid,
                        data: notification.value,
                    },
                )
                .await;
            }
        }
    }
}

/// Extract the useful identifier string from a peripheral id.
///
/// On macOS peripheral ids are UUIDs; elsewhere they wrap the MAC address.
fn peripheral_key(id: &PeripheralId) -> String {
    format!("{:?}", id)
        .trim_start_matches("PeripheralId(")
        .trim_end_matches(')')
        .to_string()
}
