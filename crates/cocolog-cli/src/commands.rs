//! Command implementations for the CocoLog CLI.

use std::collections::HashSet;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

use cocolog_core::transport::TransportEvent;
use cocolog_core::{
    BleTransport, DeviceSession, RescanPolicy, SessionConfig, SessionEvent, Transport, wire,
};

/// Scan for `timeout` seconds and list what the adapter saw.
pub async fn scan(timeout: u64, all: bool) -> Result<()> {
    let (transport, mut events) = BleTransport::new()
        .await
        .context("failed to start Bluetooth transport")?;

    println!("Scanning for {timeout} seconds...");
    println!();

    transport.request_scan().await.context("scan failed")?;

    let deadline = tokio::time::sleep(Duration::from_secs(timeout));
    tokio::pin!(deadline);

    let mut seen = HashSet::new();
    let mut matches = 0usize;

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            event = events.recv() => {
                let Some(event) = event else { break };
                let TransportEvent::Discovered { handle } = event else {
                    continue;
                };
                if !seen.insert(handle.id.clone()) {
                    continue;
                }

                let is_cocolog = handle
                    .name
                    .as_deref()
                    .is_some_and(|n| n.starts_with(wire::DEVICE_NAME_PREFIX));
                if is_cocolog {
                    matches += 1;
                }
                if all || is_cocolog {
                    let name = handle.name.as_deref().unwrap_or("Unknown");
                    let marker = if is_cocolog { "  *" } else { "" };
                    println!("  {:<24} {}{}", name, handle.id, marker);
                }
            }
        }
    }

    if let Err(e) = transport.request_stop_scan().await {
        debug!(error = %e, "stop scan failed");
    }

    println!();
    if matches == 0 {
        println!("No CocoLog devices found.");
        println!();
        println!("Make sure:");
        println!("  - The wearable is powered on");
        println!("  - Bluetooth is enabled on this computer");
        println!("  - The device is within range");
    } else {
        println!("Found {matches} CocoLog device(s) (marked *).");
    }

    Ok(())
}

/// Run a full device session, printing readings until Ctrl-C.
pub async fn watch(prefix: &str, json: bool, rescan: bool) -> Result<()> {
    let (transport, events) = BleTransport::new()
        .await
        .context("failed to start Bluetooth transport")?;

    let policy = if rescan {
        RescanPolicy::unlimited()
    } else {
        RescanPolicy::disabled()
    };
    let config = SessionConfig::default().device_prefix(prefix).rescan(policy);

    let session =
        DeviceSession::spawn(transport, events, config).context("failed to start session")?;
    let mut session_events = session.events();
    session.start_scan().context("start scan failed")?;

    if !json {
        println!("Searching for \"{prefix}\"... (Ctrl-C to quit)");
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = session_events.recv() => match event {
                Ok(event) => report(&event, json)?,
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "event stream lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    session.stop_scan().ok();
    session.close();
    if !json {
        println!("Stopped.");
    }

    Ok(())
}

/// Print one session event in the selected format.
fn report(event: &SessionEvent, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(event)?);
        return Ok(());
    }

    match event {
        SessionEvent::ScanStarted => println!("scanning..."),
        SessionEvent::DeviceDiscovered { handle } => println!("found {}", handle.label()),
        SessionEvent::Connected { handle } => println!("connected to {}", handle.label()),
        SessionEvent::Ready { handle } => println!("streaming from {}", handle.label()),
        SessionEvent::ReadingReceived { reading } => println!("{reading}"),
        SessionEvent::Disconnected { handle, reason } => {
            println!("lost {} ({reason})", handle.label());
        }
        SessionEvent::SessionFailed { reason } => println!("failed: {reason}"),
        SessionEvent::RescanScheduled { attempt, delay_ms } => {
            println!("rescan #{attempt} in {delay_ms} ms");
        }
        SessionEvent::FrameDropped { error } => debug!(%error, "frame dropped"),
        _ => {}
    }
    Ok(())
}
