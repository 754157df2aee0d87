// rild -- standalone RIL daemon for AT-command modems.
//
// Usage:
//   rild -p 5038                  modem AT port on a loopback TCP listener
//   rild -d /dev/ttyUSB2          modem AT port as a character device
//   rild -s /dev/socket/modem     modem AT port behind a Unix socket
//
// Logging defaults to `info`; RUST_LOG takes precedence over --log-level.

use anyhow::{Context, Result};
use clap::Parser;
use ril_core::events::RilEvent;
use ril_modem::RilArgs;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// RIL daemon -- keeps a modem's AT port open and reports what it says.
#[derive(Parser)]
#[command(name = "rild", version, about)]
struct Cli {
    #[command(flatten)]
    ril: RilArgs,

    /// Log filter used when RUST_LOG is unset (e.g. `debug`, `ril_at=trace`).
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn init_logging(default_filter: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_filter)
            .with_context(|| format!("invalid --log-level {default_filter:?}"))?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
    Ok(())
}

fn log_event(event: &RilEvent) {
    match event {
        RilEvent::RadioStateChanged { state } => info!(%state, "radio state changed"),
        RilEvent::NitzTimeReceived { time } => info!(%time, "network time"),
        other => info!(event = ?other, "unsolicited"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    let source = cli
        .ril
        .source()
        .context("one of -p, -d or -s is required")?;
    let ril = cli
        .ril
        .builder()
        .build()
        .with_context(|| format!("failed to start RIL on {source}"))?;
    info!(version = ril.version(), %source, "rild started");

    let mut events = ril.subscribe();
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for ctrl-c")?;
                info!("shutting down");
                break;
            }
            event = events.recv() => match event {
                Ok(event) => log_event(&event),
                Err(RecvError::Lagged(missed)) => warn!(missed, "event log fell behind"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    ril.shutdown().await;
    Ok(())
}
