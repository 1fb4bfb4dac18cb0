//! Example: Streaming Readings from a CocoLog Device
//!
//! This example spawns a full device session: it scans for the first
//! peripheral advertising the CocoLog name prefix, connects, negotiates
//! the streaming characteristics, and prints every validated reading
//! until Ctrl-C.
//!
//! Run with: `cargo run --example watch_readings`

use cocolog_core::{BleTransport, DeviceSession, RescanPolicy, SessionConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let (transport, events) = BleTransport::new().await?;

    // Keep trying after connection drops; the wearable sleeps aggressively.
    let config = SessionConfig::default().rescan(RescanPolicy::unlimited());
    let session = DeviceSession::spawn(transport, events, config)?;

    session.start_scan()?;
    println!("Searching for a CocoLog wearable... (Ctrl-C to quit)");

    let mut snapshots = session.watch();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow().clone();
                match snapshot.latest_reading {
                    Some(reading) if snapshot.connected => println!("{reading}"),
                    _ => println!("[{}]", snapshot.state),
                }
            }
        }
    }

    session.stop_scan()?;
    session.close();
    println!("Stopped.");

    Ok(())
}
