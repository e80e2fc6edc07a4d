//! Configuration loading.
//!
//! The core treats configuration as an opaque typed record: it is loaded
//! once at startup and handed down to the supervisor, never touched again.

use std::fs;
use std::net::SocketAddrV4;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::types::StationFamily;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub station: StationIdentity,
    pub status_multicast: SocketAddrV4,
    pub data_root: PathBuf,
    pub channels: Vec<ChannelConfig>,

    #[serde(default = "default_resequence_buffer_size")]
    pub resequence_buffer_size: usize,

    #[serde(default = "default_catastrophic_gap_secs")]
    pub catastrophic_gap_secs: f64,

    #[serde(default = "default_time_snap_error_threshold_ms")]
    pub time_snap_error_threshold_ms: f64,

    #[serde(default = "default_fusion_ema_alpha")]
    pub fusion_ema_alpha: f64,

    #[serde(default = "default_holdover_deadline_ms")]
    pub holdover_deadline_ms: u64,

    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,

    #[serde(default = "default_watchdog_timeout_secs")]
    pub watchdog_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationIdentity {
    pub callsign: String,
    pub grid: String,
    pub site_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub ssrc: u32,
    pub frequency_hz: u32,
    pub preset: String,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    pub description: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Multicast group the SDR daemon publishes this channel's RTP on.
    pub multicast: std::net::SocketAddrV4,
    #[serde(default = "default_sample_format")]
    pub sample_format: crate::types::SampleFormat,
}

impl ChannelConfig {
    pub fn station_family(&self) -> CoreResult<StationFamily> {
        StationFamily::for_frequency(self.frequency_hz)
    }

    pub fn directory_name(&self) -> String {
        crate::channel_naming::to_directory(&self.description)
    }

    pub fn key(&self) -> String {
        crate::channel_naming::to_key(&self.description)
    }
}

fn default_sample_format() -> crate::types::SampleFormat {
    crate::types::SampleFormat::Int16
}

fn default_resequence_buffer_size() -> usize {
    64
}
fn default_catastrophic_gap_secs() -> f64 {
    20.0
}
fn default_time_snap_error_threshold_ms() -> f64 {
    5.0
}
fn default_fusion_ema_alpha() -> f64 {
    0.5
}
fn default_holdover_deadline_ms() -> u64 {
    100
}
fn default_flush_interval_secs() -> u64 {
    60
}
fn default_watchdog_timeout_secs() -> u64 {
    120
}
fn default_sample_rate() -> u32 {
    20_000
}
fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            station: StationIdentity {
                callsign: "UNSET".to_string(),
                grid: "AA00aa".to_string(),
                site_id: "default".to_string(),
            },
            status_multicast: "239.192.0.1:5004".parse().unwrap(),
            data_root: PathBuf::from("./data"),
            channels: vec![],
            resequence_buffer_size: default_resequence_buffer_size(),
            catastrophic_gap_secs: default_catastrophic_gap_secs(),
            time_snap_error_threshold_ms: default_time_snap_error_threshold_ms(),
            fusion_ema_alpha: default_fusion_ema_alpha(),
            holdover_deadline_ms: default_holdover_deadline_ms(),
            flush_interval_secs: default_flush_interval_secs(),
            watchdog_timeout_secs: default_watchdog_timeout_secs(),
        }
    }
}

impl Config {
    /// Search a short list of candidate paths, falling back to defaults
    /// with a warning if none exist.
    pub fn load() -> CoreResult<Self> {
        let config_paths = [
            "config.toml".to_string(),
            "/etc/hf-timewatch/config.toml".to_string(),
            "~/.config/hf-timewatch/config.toml".to_string(),
        ];

        for path in &config_paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::load_from_file(expanded.as_ref());
            }
        }

        tracing::warn!("no config.toml found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_file(path: &str) -> CoreResult<Self> {
        let content = fs::read_to_string(path).map_err(CoreError::Io)?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| CoreError::Configuration(format!("parsing {}: {}", path, e)))?;

        if config.channels.is_empty() {
            return Err(CoreError::Configuration(
                "no channels configured".to_string(),
            ));
        }

        for channel in &config.channels {
            channel.station_family().map_err(|e| {
                CoreError::Configuration(format!(
                    "channel {:?} (ssrc {}): {}",
                    channel.description, channel.ssrc, e
                ))
            })?;
        }

        tracing::info!("configuration loaded from: {}", path);
        Ok(config)
    }
}
