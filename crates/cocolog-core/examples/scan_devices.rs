//! Example: Scanning for CocoLog Devices
//!
//! This example starts a raw transport scan and prints every peripheral
//! the adapter reports for ten seconds, marking the ones whose advertised
//! name matches the CocoLog prefix.
//!
//! Run with: `cargo run --example scan_devices`

use std::time::Duration;

use cocolog_core::transport::TransportEvent;
use cocolog_core::{BleTransport, Transport, wire};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let (transport, mut events) = BleTransport::new().await?;

    println!("Scanning for BLE devices for 10 seconds...");
    println!();

    transport.request_scan().await?;

    let deadline = tokio::time::sleep(Duration::from_secs(10));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            event = events.recv() => {
                let Some(event) = event else { break };
                if let TransportEvent::Discovered { handle } = event {
                    let name = handle.name.as_deref().unwrap_or("Unknown");
                    let marker = if name.starts_with(wire::DEVICE_NAME_PREFIX) {
                        " <-- CocoLog"
                    } else {
                        ""
                    };
                    println!("  {} [{}]{}", name, handle.id, marker);
                }
            }
        }
    }

    transport.request_stop_scan().await?;
    println!();
    println!("Scan complete.");

    Ok(())
}
