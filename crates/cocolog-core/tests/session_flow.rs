//! End-to-end session flows driven through the public facade over a
//! scripted transport.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use cocolog_core::mock::{MockRequest, MockTransport};
use cocolog_core::transport::{DeviceHandle, DisconnectReason, TransportEvent};
use cocolog_core::{
    CharacteristicHandle, DeviceSession, FailureReason, RescanPolicy, SessionConfig, SessionEvent,
    SessionState, Snapshot, wire,
};

fn notify_char() -> CharacteristicHandle {
    CharacteristicHandle {
        uuid: wire::UART_TX_NOTIFY,
        service: wire::UART_SERVICE,
        notify: true,
        write: false,
        write_without_response: false,
    }
}

fn write_char() -> CharacteristicHandle {
    CharacteristicHandle {
        uuid: wire::UART_RX_WRITE,
        service: wire::UART_SERVICE,
        notify: false,
        write: false,
        write_without_response: true,
    }
}

/// Wait until the published snapshot satisfies a predicate.
async fn wait_for(
    rx: &mut watch::Receiver<Snapshot>,
    what: &str,
    pred: impl Fn(&Snapshot) -> bool,
) -> Snapshot {
    tokio::time::timeout(Duration::from_secs(30), async {
        loop {
            let snapshot = rx.borrow_and_update().clone();
            if pred(&snapshot) {
                return snapshot;
            }
            rx.changed().await.expect("session task ended");
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {what}"))
}

/// Drive a fresh session to Ready against a device with the given id.
async fn bring_ready(
    mock: &MockTransport,
    rx: &mut watch::Receiver<Snapshot>,
    session: &DeviceSession,
    device_id: &str,
) -> DeviceHandle {
    let handle = DeviceHandle::with_name(device_id, "CocoLog-01");

    session.start_scan().unwrap();
    mock.inject(TransportEvent::Discovered {
        handle: handle.clone(),
    })
    .await
    .unwrap();
    mock.inject(TransportEvent::Connected {
        handle: handle.clone(),
    })
    .await
    .unwrap();
    mock.inject(TransportEvent::ServicesDiscovered {
        handle: handle.clone(),
        services: vec![wire::UART_SERVICE],
    })
    .await
    .unwrap();
    mock.inject(TransportEvent::CharacteristicsDiscovered {
        handle: handle.clone(),
        service: wire::UART_SERVICE,
        characteristics: vec![notify_char(), write_char()],
    })
    .await
    .unwrap();

    wait_for(rx, "Ready", |s| s.connected).await;
    handle
}

#[tokio::test]
async fn end_to_end_happy_path() {
    let (mock, events) = MockTransport::new();
    let session =
        DeviceSession::spawn(Arc::clone(&mock), events, SessionConfig::default()).unwrap();
    let mut rx = session.watch();

    let handle = bring_ready(&mock, &mut rx, &session, "coco-1").await;

    // The whole negotiation happened through the transport boundary,
    // ending with a subscription and the start command.
    let requests = mock.take_requests();
    assert_eq!(requests[0], MockRequest::Scan);
    assert!(requests.contains(&MockRequest::StopScan));
    assert!(requests.contains(&MockRequest::Connect("coco-1".to_string())));
    assert!(requests.contains(&MockRequest::DiscoverServices("coco-1".to_string())));
    assert!(requests.contains(&MockRequest::Subscribe(
        "coco-1".to_string(),
        wire::UART_TX_NOTIFY
    )));
    assert!(requests.contains(&MockRequest::Write {
        device: "coco-1".to_string(),
        characteristic: wire::UART_RX_WRITE,
        payload: b"start".to_vec(),
        with_ack: false,
    }));

    mock.inject(TransportEvent::ValueUpdated {
        handle,
        characteristic: wire::UART_TX_NOTIFY,
        data: b"88,30.5,97\n".to_vec(),
    })
    .await
    .unwrap();

    let snapshot = wait_for(&mut rx, "a reading", |s| s.latest_reading.is_some()).await;
    let reading = snapshot.latest_reading.unwrap();
    assert_eq!(reading.bpm, 88);
    assert!((reading.hrv_ms - 30.5).abs() < f32::EPSILON);
    assert_eq!(reading.spo2, 97);
    assert!(snapshot.connected);
}

#[tokio::test]
async fn split_frames_reassemble_across_notifications() {
    let (mock, events) = MockTransport::new();
    let session =
        DeviceSession::spawn(Arc::clone(&mock), events, SessionConfig::default()).unwrap();
    let mut rx = session.watch();

    let handle = bring_ready(&mock, &mut rx, &session, "coco-1").await;

    for chunk in [&b"72,45.3,98\n33,1"[..], &b".2,95\n"[..]] {
        mock.inject(TransportEvent::ValueUpdated {
            handle: handle.clone(),
            characteristic: wire::UART_TX_NOTIFY,
            data: chunk.to_vec(),
        })
        .await
        .unwrap();
    }

    let snapshot = wait_for(&mut rx, "second frame", |s| {
        s.latest_reading.is_some_and(|r| r.bpm == 33)
    })
    .await;
    let reading = snapshot.latest_reading.unwrap();
    assert!((reading.hrv_ms - 1.2).abs() < f32::EPSILON);
    assert_eq!(reading.spo2, 95);
}

#[tokio::test]
async fn stop_scan_cancels_inflight_connect() {
    let (mock, events) = MockTransport::new();
    let session =
        DeviceSession::spawn(Arc::clone(&mock), events, SessionConfig::default()).unwrap();
    let mut rx = session.watch();

    session.start_scan().unwrap();
    mock.inject(TransportEvent::Discovered {
        handle: DeviceHandle::with_name("coco-1", "CocoLog-01"),
    })
    .await
    .unwrap();
    wait_for(&mut rx, "Connecting", |s| {
        s.state == SessionState::Connecting
    })
    .await;

    session.stop_scan().unwrap();
    let snapshot = wait_for(&mut rx, "Disconnected", |s| {
        s.state == SessionState::Disconnected
    })
    .await;
    assert!(!snapshot.connected);
    assert!(
        mock.requests()
            .contains(&MockRequest::Disconnect("coco-1".to_string()))
    );
}

#[tokio::test]
async fn reconnection_uses_fresh_handle_and_keeps_reading() {
    let (mock, events) = MockTransport::new();
    let session =
        DeviceSession::spawn(Arc::clone(&mock), events, SessionConfig::default()).unwrap();
    let mut rx = session.watch();

    let old = bring_ready(&mock, &mut rx, &session, "coco-old").await;
    mock.inject(TransportEvent::ValueUpdated {
        handle: old.clone(),
        characteristic: wire::UART_TX_NOTIFY,
        data: b"72,45.3,98\n".to_vec(),
    })
    .await
    .unwrap();
    wait_for(&mut rx, "a reading", |s| s.latest_reading.is_some()).await;

    mock.inject(TransportEvent::Disconnected {
        handle: old,
        reason: DisconnectReason::ConnectionLost,
    })
    .await
    .unwrap();
    let snapshot = wait_for(&mut rx, "Disconnected", |s| {
        s.state == SessionState::Disconnected
    })
    .await;
    // The last reading outlives the connection.
    assert_eq!(snapshot.latest_reading.unwrap().bpm, 72);
    assert!(!snapshot.connected);

    mock.take_requests();
    session.start_scan().unwrap();
    mock.inject(TransportEvent::Discovered {
        handle: DeviceHandle::with_name("coco-new", "CocoLog-01"),
    })
    .await
    .unwrap();
    wait_for(&mut rx, "Connecting", |s| {
        s.state == SessionState::Connecting
    })
    .await;

    let requests = mock.requests();
    assert!(requests.contains(&MockRequest::Connect("coco-new".to_string())));
    assert!(!requests.contains(&MockRequest::Connect("coco-old".to_string())));
}

#[tokio::test(start_paused = true)]
async fn connect_phase_times_out_into_failed() {
    let (mock, events) = MockTransport::new();
    let session =
        DeviceSession::spawn(Arc::clone(&mock), events, SessionConfig::default()).unwrap();
    let mut rx = session.watch();

    session.start_scan().unwrap();
    mock.inject(TransportEvent::Discovered {
        handle: DeviceHandle::with_name("coco-1", "CocoLog-01"),
    })
    .await
    .unwrap();

    // No Connected event ever arrives; the bounded window expires.
    let snapshot = wait_for(&mut rx, "Failed", |s| {
        matches!(s.state, SessionState::Failed(FailureReason::ConnectTimeout))
    })
    .await;
    assert!(!snapshot.connected);
    assert!(
        mock.requests()
            .contains(&MockRequest::Disconnect("coco-1".to_string()))
    );
}

#[tokio::test(start_paused = true)]
async fn negotiation_phase_times_out_into_failed() {
    let (mock, events) = MockTransport::new();
    let session =
        DeviceSession::spawn(Arc::clone(&mock), events, SessionConfig::default()).unwrap();
    let mut rx = session.watch();

    let handle = DeviceHandle::with_name("coco-1", "CocoLog-01");
    session.start_scan().unwrap();
    mock.inject(TransportEvent::Discovered {
        handle: handle.clone(),
    })
    .await
    .unwrap();
    mock.inject(TransportEvent::Connected { handle }).await.unwrap();

    wait_for(&mut rx, "Failed", |s| {
        matches!(
            s.state,
            SessionState::Failed(FailureReason::NegotiationTimeout)
        )
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn unexpected_disconnect_triggers_automatic_rescan() {
    let (mock, events) = MockTransport::new();
    let config = SessionConfig::default().rescan(RescanPolicy::enabled());
    let session = DeviceSession::spawn(Arc::clone(&mock), events, config).unwrap();
    let mut rx = session.watch();

    let handle = bring_ready(&mock, &mut rx, &session, "coco-1").await;
    mock.take_requests();

    mock.inject(TransportEvent::Disconnected {
        handle,
        reason: DisconnectReason::ConnectionLost,
    })
    .await
    .unwrap();

    // The session schedules a backoff rescan on its own.
    wait_for(&mut rx, "rescan", |s| s.scanning).await;
    assert!(mock.requests().contains(&MockRequest::Scan));
}

#[tokio::test]
async fn send_start_signal_rejected_when_not_ready() {
    let (mock, events) = MockTransport::new();
    let session =
        DeviceSession::spawn(Arc::clone(&mock), events, SessionConfig::default()).unwrap();
    let mut session_events = session.events();

    session.send_start_signal().unwrap();

    let event = tokio::time::timeout(Duration::from_secs(5), session_events.recv())
        .await
        .expect("no event")
        .unwrap();
    match event {
        SessionEvent::CommandRejected { command, error } => {
            assert_eq!(command, "send_start_signal");
            assert!(error.contains("not ready"));
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn dropped_frames_surface_as_events() {
    let (mock, events) = MockTransport::new();
    let session =
        DeviceSession::spawn(Arc::clone(&mock), events, SessionConfig::default()).unwrap();
    let mut rx = session.watch();

    let handle = bring_ready(&mock, &mut rx, &session, "coco-1").await;
    let mut session_events = session.events();

    mock.inject(TransportEvent::ValueUpdated {
        handle,
        characteristic: wire::UART_TX_NOTIFY,
        data: b"72,45.3,250\n".to_vec(),
    })
    .await
    .unwrap();

    let event = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let SessionEvent::FrameDropped { error } = session_events.recv().await.unwrap() {
                return error;
            }
        }
    })
    .await
    .expect("no FrameDropped event");
    assert!(event.contains("spo2"));

    // The bad frame never reached the snapshot.
    assert!(session.snapshot().latest_reading.is_none());
}

#[tokio::test]
async fn close_shuts_the_session_down() {
    let (mock, events) = MockTransport::new();
    let session =
        DeviceSession::spawn(Arc::clone(&mock), events, SessionConfig::default()).unwrap();

    session.close();
    tokio::time::timeout(Duration::from_secs(5), async {
        while session.is_active() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("session task did not stop");

    // Once the task is gone, injected events are rejected.
    let result = mock
        .inject(TransportEvent::Discovered {
            handle: DeviceHandle::with_name("coco-1", "CocoLog-01"),
        })
        .await;
    assert!(result.is_err());
}
