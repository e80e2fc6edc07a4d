//! Per-channel and system-wide status snapshots. Unlike `sink.rs` these
//! are overwritten in place on every update — a dashboard or operator
//! script reads the latest snapshot, never a history of them.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::types::AnchorState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelStatus {
    pub channel_key: String,
    pub time_base_established: bool,
    pub completeness_pct: f64,
    pub latest_snr_db: HashMap<String, f64>,
    pub latest_time_snap_utc: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalStatus {
    pub anchor_state: AnchorState,
    pub channels: HashMap<String, ChannelSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelSummary {
    pub enabled: bool,
    pub completeness_pct: f64,
    pub failed: bool,
}

pub struct StatusWriter {
    data_root: PathBuf,
}

impl StatusWriter {
    pub fn new(data_root: PathBuf) -> Self {
        Self { data_root }
    }

    pub fn write_channel_status(&self, channel_key: &str, status: &ChannelStatus) -> CoreResult<()> {
        let dir = self.data_root.join("phase2").join(channel_key).join("state");
        fs::create_dir_all(&dir).map_err(CoreError::Io)?;
        let path = dir.join("channel-status.json");
        let json = serde_json::to_string_pretty(status)
            .map_err(|e| CoreError::Resource(format!("serializing channel status: {}", e)))?;
        fs::write(path, json).map_err(CoreError::Io)
    }

    pub fn write_global_status(&self, status: &GlobalStatus) -> CoreResult<()> {
        let dir = self.data_root.join("status");
        fs::create_dir_all(&dir).map_err(CoreError::Io)?;
        let path = dir.join("timing_status.json");
        let json = serde_json::to_string_pretty(status)
            .map_err(|e| CoreError::Resource(format!("serializing global status: {}", e)))?;
        fs::write(path, json).map_err(CoreError::Io)
    }
}
