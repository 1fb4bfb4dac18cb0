use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "cocolog")]
#[command(author, version, about = "CLI for CocoLog heart sensors", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan for nearby BLE devices and highlight CocoLog wearables
    Scan {
        /// Scan timeout in seconds
        #[arg(short, long, default_value = "10")]
        timeout: u64,

        /// List every device, not just CocoLog matches
        #[arg(short, long)]
        all: bool,
    },

    /// Connect to a CocoLog wearable and stream readings
    Watch {
        /// Advertised-name prefix to match
        #[arg(short, long, default_value = "CocoLog")]
        prefix: String,

        /// Emit readings as JSON lines instead of text
        #[arg(short, long)]
        json: bool,

        /// Keep rescanning after the connection drops
        #[arg(short, long)]
        rescan: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    // When quiet mode is enabled, suppress info-level logging
    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Scan { timeout, all } => commands::scan(timeout, all).await,
        Commands::Watch {
            prefix,
            json,
            rescan,
        } => commands::watch(&prefix, json, rescan).await,
    }
}
