//! Device session state machine and facade.
//!
//! The session owns discovery, connection, service/characteristic
//! negotiation, subscription, and teardown for exactly one CocoLog
//! peripheral. Its state is advanced by a single event-intake function
//! running in one tokio task, which consumes user commands and
//! [`TransportEvent`]s from the same queue: every transition runs to
//! completion before the next is processed, so callbacks can never
//! interleave on session state.
//!
//! Consumers never see the machine directly. They hold a
//! [`DeviceSession`], read the atomically published [`Snapshot`], and
//! subscribe to [`SessionEvent`]s for diagnostics.
//!
//! # Example
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
//!         if let Some(reading) = snapshot.latest_reading {
//!             println!("{reading}");
//!         }
//!     }
//!     Ok(())
//! }
//! ```

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use cocolog_types::{FrameDecoder, Reading, wire};

use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::events::{EventReceiver, EventSender, SessionEvent, event_channel};
use crate::transport::{
    CharacteristicHandle, DeviceHandle, DisconnectReason, Transport, TransportEvent,
    TransportEventReceiver,
};

/// Lifecycle state of a device session.
///
/// Exactly one instance exists per session, owned by the session task and
/// mutated only by its transition function. `Idle` is only the initial
/// state; the session never returns to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum SessionState {
    /// Initial state; nothing has been requested yet.
    Idle,
    /// Discovery is running; waiting for a matching advertisement.
    Scanning,
    /// A matching peripheral was found; waiting for the link to come up.
    Connecting,
    /// Link is up; discovering services and characteristics.
    Negotiating,
    /// Subscribed and streaming readings.
    Ready,
    /// No connection; re-entered via `start_scan()`.
    Disconnected,
    /// The last connection attempt failed; re-entered via `start_scan()`.
    Failed(FailureReason),
}

impl SessionState {
    /// Whether the session is subscribed and streaming.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, SessionState::Ready)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Scanning => write!(f, "scanning"),
            SessionState::Connecting => write!(f, "connecting"),
            SessionState::Negotiating => write!(f, "negotiating"),
            SessionState::Ready => write!(f, "ready"),
            SessionState::Disconnected => write!(f, "disconnected"),
            SessionState::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Why a connection attempt ended in [`SessionState::Failed`].
///
/// This enum is marked `#[non_exhaustive]` to allow adding new reasons
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum FailureReason {
    /// The link did not come up within the connect window.
    ConnectTimeout,
    /// Negotiation did not finish within its window.
    NegotiationTimeout,
    /// Discovery found no notify-capable characteristic.
    NoNotifyCharacteristic {
        /// Number of services that were searched.
        service_count: usize,
    },
    /// More than one plausible endpoint; the session refuses to guess.
    AmbiguousCharacteristics {
        /// Count of notify-capable candidates.
        notify: usize,
        /// Count of write-capable candidates.
        write: usize,
    },
    /// A transport request was refused mid-attempt.
    Transport {
        /// Adapter-provided failure description.
        message: String,
    },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::ConnectTimeout => write!(f, "connect timed out"),
            FailureReason::NegotiationTimeout => write!(f, "negotiation timed out"),
            FailureReason::NoNotifyCharacteristic { service_count } => write!(
                f,
                "no notify-capable characteristic across {service_count} services"
            ),
            FailureReason::AmbiguousCharacteristics { notify, write } => write!(
                f,
                "ambiguous endpoints: {notify} notify / {write} write candidates"
            ),
            FailureReason::Transport { message } => write!(f, "transport: {message}"),
        }
    }
}

/// Atomically published view of a session.
///
/// Recomputed on every state or reading change. `connected` is true iff
/// the state is [`SessionState::Ready`]. `latest_reading` survives
/// disconnects and is cleared only by `reset_readings()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// True iff the session is Ready.
    pub connected: bool,
    /// True iff discovery is currently running.
    pub scanning: bool,
    /// Most recent validated reading, if any.
    pub latest_reading: Option<Reading>,
    /// Full session state, for consumers that want more than the flags.
    pub state: SessionState,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            connected: false,
            scanning: false,
            latest_reading: None,
            state: SessionState::Idle,
        }
    }
}

/// User commands consumed by the session task.
#[derive(Debug)]
enum Command {
    StartScan,
    StopScan,
    SendStartSignal,
    ResetReadings,
}

/// Which bounded phase the current deadline belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Connect,
    Negotiate,
}

/// Bookkeeping for an in-flight negotiation.
#[derive(Debug, Default)]
struct Negotiation {
    /// Services still awaiting a characteristic report.
    pending: Vec<Uuid>,
    /// Total services discovered, for diagnostics.
    total: usize,
    notify_candidates: Vec<CharacteristicHandle>,
    write_candidates: Vec<CharacteristicHandle>,
}

/// The state machine proper. Lives inside the session task; everything
/// here runs serialized.
struct SessionCore<T: Transport> {
    transport: Arc<T>,
    config: SessionConfig,
    state: SessionState,
    device: Option<DeviceHandle>,
    notify_char: Option<CharacteristicHandle>,
    write_char: Option<CharacteristicHandle>,
    negotiation: Option<Negotiation>,
    decoder: FrameDecoder,
    latest_reading: Option<Reading>,
    deadline: Option<(Instant, Phase)>,
    pending_rescan: Option<Instant>,
    rescan_attempts: u32,
    snapshot_tx: watch::Sender<Snapshot>,
    events: EventSender,
}

impl<T: Transport> SessionCore<T> {
    fn new(
        transport: Arc<T>,
        config: SessionConfig,
        snapshot_tx: watch::Sender<Snapshot>,
        events: EventSender,
    ) -> Self {
        let decoder = FrameDecoder::with_max_buffer(config.max_frame_buffer);
        Self {
            transport,
            config,
            state: SessionState::Idle,
            device: None,
            notify_char: None,
            write_char: None,
            negotiation: None,
            decoder,
            latest_reading: None,
            deadline: None,
            pending_rescan: None,
            rescan_attempts: 0,
            snapshot_tx,
            events,
        }
    }

    /// Commit the current state as the published snapshot.
    fn publish(&self) {
        self.snapshot_tx.send_replace(Snapshot {
            connected: self.state.is_ready(),
            scanning: matches!(self.state, SessionState::Scanning),
            latest_reading: self.latest_reading,
            state: self.state.clone(),
        });
    }

    fn emit(&self, event: SessionEvent) {
        // Ignore error if no receivers
        let _ = self.events.send(event);
    }

    /// The next instant the task must wake at, if any.
    fn next_wakeup(&self) -> Option<Instant> {
        match (self.deadline.map(|(at, _)| at), self.pending_rescan) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    // --- Command handling ---

    async fn handle_command(&mut self, command: Command) {
        debug!(state = %self.state, ?command, "command");
        match command {
            Command::StartScan => self.start_scan_command().await,
            Command::StopScan => self.stop_scan_command().await,
            Command::SendStartSignal => self.send_start_signal_command().await,
            Command::ResetReadings => {
                self.latest_reading = None;
                self.publish();
            }
        }
    }

    async fn start_scan_command(&mut self) {
        match self.state {
            SessionState::Idle | SessionState::Disconnected | SessionState::Failed(_) => {
                // A user command resets the automatic-rescan budget.
                self.pending_rescan = None;
                self.rescan_attempts = 0;
                self.begin_scan().await;
            }
            SessionState::Scanning => {}
            SessionState::Connecting | SessionState::Negotiating | SessionState::Ready => {
                self.emit(SessionEvent::CommandRejected {
                    command: "start_scan".to_string(),
                    error: format!("session is busy ({})", self.state),
                });
            }
        }
    }

    async fn begin_scan(&mut self) {
        match self.transport.request_scan().await {
            Ok(()) => {
                info!("scanning for devices");
                self.state = SessionState::Scanning;
                self.emit(SessionEvent::ScanStarted);
                self.publish();
            }
            Err(e) => {
                warn!(error = %e, "scan request failed");
                self.fail(FailureReason::Transport {
                    message: e.to_string(),
                });
            }
        }
    }

    /// Cancels whatever is in flight and lands in Disconnected (or stays
    /// Idle if nothing ever started). Safe from every state.
    async fn stop_scan_command(&mut self) {
        self.pending_rescan = None;
        self.rescan_attempts = 0;

        match self.state {
            SessionState::Idle => {}
            SessionState::Scanning => {
                if let Err(e) = self.transport.request_stop_scan().await {
                    warn!(error = %e, "stop scan request failed");
                }
                self.state = SessionState::Disconnected;
                self.emit(SessionEvent::ScanStopped);
                self.publish();
            }
            SessionState::Disconnected | SessionState::Failed(_) => {
                self.state = SessionState::Disconnected;
                self.publish();
            }
            SessionState::Connecting | SessionState::Negotiating | SessionState::Ready => {
                if let Some(handle) = self.device.clone()
                    && let Err(e) = self.transport.request_disconnect(&handle).await
                {
                    warn!(error = %e, "disconnect request failed");
                }
                self.finish_disconnect(DisconnectReason::Requested);
            }
        }
    }

    async fn send_start_signal_command(&mut self) {
        if !self.state.is_ready() {
            self.emit(SessionEvent::CommandRejected {
                command: "send_start_signal".to_string(),
                error: Error::NotReady.to_string(),
            });
            return;
        }
        let (Some(handle), Some(write_char)) = (self.device.clone(), self.write_char.clone())
        else {
            self.emit(SessionEvent::CommandRejected {
                command: "send_start_signal".to_string(),
                error: Error::NoWriteCharacteristic.to_string(),
            });
            return;
        };
        self.write_start(&handle, &write_char).await;
    }

    async fn write_start(&mut self, handle: &DeviceHandle, write_char: &CharacteristicHandle) {
        let with_ack = !write_char.write_without_response;
        match self
            .transport
            .request_write(handle, write_char, wire::START_COMMAND, with_ack)
            .await
        {
            Ok(()) => {
                debug!(device = %handle.label(), "start signal written");
                self.emit(SessionEvent::StartSignalSent);
            }
            Err(e) => {
                warn!(error = %e, "start write failed");
                self.finish_disconnect(DisconnectReason::BleError(e.to_string()));
                self.maybe_schedule_rescan();
            }
        }
    }

    // --- Transport event handling ---

    async fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Discovered { handle } => self.on_discovered(handle).await,
            TransportEvent::Connected { handle } => self.on_connected(handle).await,
            TransportEvent::Disconnected { handle, reason } => {
                self.on_disconnected(handle, reason);
            }
            TransportEvent::ServicesDiscovered { handle, services } => {
                self.on_services(handle, services).await;
            }
            TransportEvent::CharacteristicsDiscovered {
                handle,
                service,
                characteristics,
            } => self.on_characteristics(handle, service, characteristics).await,
            TransportEvent::ValueUpdated {
                handle,
                characteristic,
                data,
            } => self.on_value(handle, characteristic, &data),
            TransportEvent::WriteResult {
                characteristic,
                success,
                ..
            } => self.on_write_result(characteristic, success),
        }
    }

    fn is_current_device(&self, handle: &DeviceHandle) -> bool {
        self.device.as_ref().is_some_and(|d| d.id == handle.id)
    }

    async fn on_discovered(&mut self, handle: DeviceHandle) {
        if !matches!(self.state, SessionState::Scanning) {
            return;
        }
        let Some(name) = handle.name.as_deref() else {
            return;
        };
        if !name.starts_with(&self.config.device_prefix) {
            debug!(device = %handle.label(), "ignoring non-matching device");
            return;
        }

        // Only the first match is pursued; scanning stops immediately.
        info!(device = %handle.label(), "matching device discovered");
        self.emit(SessionEvent::DeviceDiscovered {
            handle: handle.clone(),
        });
        if let Err(e) = self.transport.request_stop_scan().await {
            warn!(error = %e, "stop scan request failed");
        }

        self.device = Some(handle.clone());
        self.state = SessionState::Connecting;
        self.deadline = Some((Instant::now() + self.config.connect_timeout, Phase::Connect));
        self.publish();

        if let Err(e) = self.transport.request_connect(&handle).await {
            warn!(error = %e, "connect request failed");
            self.fail(FailureReason::Transport {
                message: e.to_string(),
            });
        }
    }

    async fn on_connected(&mut self, handle: DeviceHandle) {
        if !matches!(self.state, SessionState::Connecting) || !self.is_current_device(&handle) {
            debug!(device = %handle.label(), state = %self.state, "ignoring stale connect event");
            return;
        }

        info!(device = %handle.label(), "connected, negotiating");
        self.emit(SessionEvent::Connected {
            handle: handle.clone(),
        });
        self.state = SessionState::Negotiating;
        self.deadline = Some((
            Instant::now() + self.config.negotiation_timeout,
            Phase::Negotiate,
        ));
        self.negotiation = Some(Negotiation::default());
        self.publish();

        if let Err(e) = self.transport.request_discover_services(&handle).await {
            warn!(error = %e, "service discovery request failed");
            self.fail(FailureReason::Transport {
                message: e.to_string(),
            });
        }
    }

    fn on_disconnected(&mut self, handle: DeviceHandle, reason: DisconnectReason) {
        if !self.is_current_device(&handle) {
            return;
        }
        match self.state {
            SessionState::Connecting | SessionState::Negotiating | SessionState::Ready => {
                warn!(device = %handle.label(), %reason, "disconnected");
                let unexpected = reason != DisconnectReason::Requested;
                self.finish_disconnect(reason);
                if unexpected {
                    self.maybe_schedule_rescan();
                }
            }
            _ => {}
        }
    }

    async fn on_services(&mut self, handle: DeviceHandle, services: Vec<Uuid>) {
        if !matches!(self.state, SessionState::Negotiating) || !self.is_current_device(&handle) {
            return;
        }
        if services.is_empty() {
            self.fail(FailureReason::NoNotifyCharacteristic { service_count: 0 });
            return;
        }

        debug!(count = services.len(), "services discovered");
        if let Some(negotiation) = self.negotiation.as_mut() {
            negotiation.pending = services.clone();
            negotiation.total = services.len();
        }

        for service in services {
            if let Err(e) = self
                .transport
                .request_discover_characteristics(&handle, service)
                .await
            {
                warn!(error = %e, %service, "characteristic discovery request failed");
                self.fail(FailureReason::Transport {
                    message: e.to_string(),
                });
                return;
            }
        }
    }

    async fn on_characteristics(
        &mut self,
        handle: DeviceHandle,
        service: Uuid,
        characteristics: Vec<CharacteristicHandle>,
    ) {
        if !matches!(self.state, SessionState::Negotiating) || !self.is_current_device(&handle) {
            return;
        }
        let Some(negotiation) = self.negotiation.as_mut() else {
            return;
        };

        negotiation.pending.retain(|s| *s != service);
        for characteristic in characteristics {
            if characteristic.notify {
                negotiation.notify_candidates.push(characteristic.clone());
            }
            if characteristic.writable() {
                negotiation.write_candidates.push(characteristic);
            }
        }

        if negotiation.pending.is_empty() {
            self.finish_negotiation().await;
        }
    }

    /// All services have reported; pick the endpoint pair or fail.
    async fn finish_negotiation(&mut self) {
        let Some(negotiation) = self.negotiation.take() else {
            return;
        };
        let Some(handle) = self.device.clone() else {
            return;
        };

        let notify_count = negotiation.notify_candidates.len();
        let write_count = negotiation.write_candidates.len();

        if notify_count == 0 {
            self.fail(FailureReason::NoNotifyCharacteristic {
                service_count: negotiation.total,
            });
            return;
        }
        if notify_count > 1 || write_count > 1 {
            self.fail(FailureReason::AmbiguousCharacteristics {
                notify: notify_count,
                write: write_count,
            });
            return;
        }

        let Some(notify_char) = negotiation.notify_candidates.into_iter().next() else {
            return;
        };
        let write_char = negotiation.write_candidates.into_iter().next();

        if let Err(e) = self.transport.request_subscribe(&handle, &notify_char).await {
            warn!(error = %e, "subscribe request failed");
            self.fail(FailureReason::Transport {
                message: e.to_string(),
            });
            return;
        }

        info!(device = %handle.label(), characteristic = %notify_char.uuid, "session ready");
        self.notify_char = Some(notify_char);
        self.write_char = write_char;
        self.deadline = None;
        self.rescan_attempts = 0;
        self.state = SessionState::Ready;
        self.emit(SessionEvent::Ready {
            handle: handle.clone(),
        });
        self.publish();

        if self.config.send_start_on_ready
            && let Some(write_char) = self.write_char.clone()
        {
            self.write_start(&handle, &write_char).await;
        }
    }

    fn on_value(&mut self, handle: DeviceHandle, characteristic: Uuid, data: &[u8]) {
        if !self.state.is_ready() || !self.is_current_device(&handle) {
            debug!("dropping value update outside Ready");
            return;
        }
        if self.notify_char.as_ref().is_none_or(|c| c.uuid != characteristic) {
            return;
        }

        for frame in self.decoder.feed(data) {
            match frame {
                Ok(text) => match self.config.limits.parse(&text) {
                    Ok(reading) => {
                        debug!(%reading, "reading accepted");
                        self.latest_reading = Some(reading);
                        self.emit(SessionEvent::ReadingReceived { reading });
                        self.publish();
                    }
                    Err(e) => {
                        warn!(error = %e, "frame rejected");
                        self.emit(SessionEvent::FrameDropped {
                            error: e.to_string(),
                        });
                    }
                },
                Err(e) => {
                    warn!(error = %e, "frame dropped");
                    self.emit(SessionEvent::FrameDropped {
                        error: e.to_string(),
                    });
                }
            }
        }
    }

    fn on_write_result(&mut self, characteristic: Uuid, success: bool) {
        if success {
            debug!(%characteristic, "write acknowledged");
            return;
        }
        if matches!(
            self.state,
            SessionState::Negotiating | SessionState::Ready
        ) {
            warn!(%characteristic, "write rejected by device");
            self.finish_disconnect(DisconnectReason::BleError("write rejected".to_string()));
            self.maybe_schedule_rescan();
        }
    }

    // --- Timers ---

    async fn on_timer(&mut self, now: Instant) {
        if let Some(at) = self.pending_rescan
            && now >= at
        {
            self.pending_rescan = None;
            if matches!(
                self.state,
                SessionState::Disconnected | SessionState::Failed(_)
            ) {
                info!(attempt = self.rescan_attempts, "automatic rescan");
                self.begin_scan().await;
            }
            return;
        }

        if let Some((at, phase)) = self.deadline
            && now >= at
        {
            self.deadline = None;
            let reason = match phase {
                Phase::Connect => FailureReason::ConnectTimeout,
                Phase::Negotiate => FailureReason::NegotiationTimeout,
            };
            warn!(%reason, "phase deadline expired");
            if let Some(handle) = self.device.clone()
                && let Err(e) = self.transport.request_disconnect(&handle).await
            {
                debug!(error = %e, "disconnect after timeout failed");
            }
            self.fail(reason);
        }
    }

    // --- Teardown helpers ---

    /// Drop the connection state and land in Disconnected. The latest
    /// reading is retained; only `reset_readings()` clears it.
    fn finish_disconnect(&mut self, reason: DisconnectReason) {
        let handle = self.device.take();
        self.notify_char = None;
        self.write_char = None;
        self.negotiation = None;
        self.deadline = None;
        self.decoder.reset();
        self.state = SessionState::Disconnected;
        if let Some(handle) = handle {
            self.emit(SessionEvent::Disconnected { handle, reason });
        }
        self.publish();
    }

    /// Record a failed attempt and release everything it held.
    fn fail(&mut self, reason: FailureReason) {
        self.device = None;
        self.notify_char = None;
        self.write_char = None;
        self.negotiation = None;
        self.deadline = None;
        self.decoder.reset();
        self.state = SessionState::Failed(reason.clone());
        self.emit(SessionEvent::SessionFailed { reason });
        self.publish();
        self.maybe_schedule_rescan();
    }

    fn maybe_schedule_rescan(&mut self) {
        if !self.config.rescan.allows_attempt(self.rescan_attempts) {
            return;
        }
        self.rescan_attempts += 1;
        let delay = self.config.rescan.delay_for_attempt(self.rescan_attempts - 1);
        self.pending_rescan = Some(Instant::now() + delay);
        info!(attempt = self.rescan_attempts, ?delay, "rescan scheduled");
        self.emit(SessionEvent::RescanScheduled {
            attempt: self.rescan_attempts,
            delay_ms: delay.as_millis() as u64,
        });
    }
}

/// Session task driver: one loop, one transition at a time.
async fn run<T: Transport>(
    mut core: SessionCore<T>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    mut transport_events: TransportEventReceiver,
    cancel: CancellationToken,
) {
    core.publish();

    loop {
        let wakeup = core.next_wakeup();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("session task cancelled");
                break;
            }
            command = commands.recv() => match command {
                Some(command) => core.handle_command(command).await,
                None => {
                    debug!("session facade dropped");
                    break;
                }
            },
            event = transport_events.recv() => match event {
                Some(event) => core.handle_event(event).await,
                None => {
                    warn!("transport event channel closed");
                    if core.device.is_some() {
                        core.finish_disconnect(DisconnectReason::ConnectionLost);
                    }
                    break;
                }
            },
            _ = sleep_until(wakeup), if wakeup.is_some() => {
                core.on_timer(Instant::now()).await;
            }
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Handle to a running device session.
///
/// All commands are fire-and-forget: they enqueue work for the session
/// task and return immediately. Outcomes are observed through
/// [`DeviceSession::snapshot`] / [`DeviceSession::watch`] and the
/// diagnostic [`DeviceSession::events`] stream.
///
/// Dropping the handle cancels the session task.
pub struct DeviceSession {
    commands: mpsc::UnboundedSender<Command>,
    snapshot_rx: watch::Receiver<Snapshot>,
    events: EventSender,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl DeviceSession {
    /// Validate the config and spawn the session task.
    ///
    /// `transport_events` must be the receiver paired with the adapter's
    /// sender; the session drains it as its single serialization point.
    pub fn spawn<T: Transport>(
        transport: Arc<T>,
        transport_events: TransportEventReceiver,
        config: SessionConfig,
    ) -> Result<Self> {
        config.validate()?;

        let (snapshot_tx, snapshot_rx) = watch::channel(Snapshot::default());
        let (events, _) = event_channel(config.event_capacity);
        let (commands, command_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let core = SessionCore::new(transport, config, snapshot_tx, events.clone());
        let task = tokio::spawn(run(core, command_rx, transport_events, cancel.clone()));

        Ok(Self {
            commands,
            snapshot_rx,
            events,
            cancel,
            task,
        })
    }

    /// Begin scanning for a matching peripheral.
    pub fn start_scan(&self) -> Result<()> {
        self.send(Command::StartScan)
    }

    /// Cancel scanning and any in-flight connection, landing in Disconnected.
    ///
    /// Safe to call from every state, including Ready (clean teardown).
    pub fn stop_scan(&self) -> Result<()> {
        self.send(Command::StopScan)
    }

    /// Ask the device to begin streaming.
    ///
    /// Rejected with a [`SessionEvent::CommandRejected`] if the session is
    /// not Ready or negotiation found no write endpoint.
    pub fn send_start_signal(&self) -> Result<()> {
        self.send(Command::SendStartSignal)
    }

    /// Clear the published `latest_reading`.
    pub fn reset_readings(&self) -> Result<()> {
        self.send(Command::ResetReadings)
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| Error::SessionClosed)
    }

    /// The latest committed snapshot. Never blocks.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Subscribe to snapshot changes.
    ///
    /// The receiver observes at most one notification per publish and is
    /// consumed on the caller's own executor, never the transport's.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<Snapshot> {
        self.snapshot_rx.clone()
    }

    /// Subscribe to the diagnostic event stream.
    #[must_use]
    pub fn events(&self) -> EventReceiver {
        self.events.subscribe()
    }

    /// Whether the session task is still running.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop the session task.
    ///
    /// Pending commands are discarded; the transport is left to the
    /// caller (drop the adapter to release the radio).
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
