//! HF timewatch
//!
//! Multi-broadcast HF time-standard monitor: ingests RTP/AES67 multicast
//! IQ from an SDR daemon, archives gap-filled minute records, detects
//! WWV/WWVH/CHU timing tones, discriminates WWV from WWVH on shared
//! channels, solves for propagation mode and D_clock, and fuses every
//! usable broadcast into one EMA-calibrated clock estimate.

use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use hf_timewatch::config::Config;
use hf_timewatch::supervisor::Supervisor;

fn main() -> ExitCode {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(true)
        .with_thread_ids(true)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("failed to install tracing subscriber");
    }

    info!("hf-timewatch v{}", env!("CARGO_PKG_VERSION"));

    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!(
        callsign = %config.station.callsign,
        site = %config.station.site_id,
        channels = config.channels.len(),
        "configuration loaded"
    );

    let running = Arc::new(AtomicBool::new(true));
    let running_for_handler = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("shutdown requested");
        running_for_handler.store(false, Ordering::Relaxed);
    }) {
        tracing::warn!("failed to install signal handler: {}", e);
    }

    let supervisor = Supervisor::new(config);
    let exit_code = supervisor.run(running);

    if exit_code == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
