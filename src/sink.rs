//! C9: append-only per-day quality records. Each row is written exactly
//! once and never updated; on restart the writer detects the last
//! complete row and resumes, discarding any torn tail left by a prior
//! unclean shutdown.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{CoreError, CoreResult};
use crate::types::{DClockMeasurement, DiscriminationResult, FusedClock, GapEvent, ToneDetection};

pub struct QualitySink {
    data_root: PathBuf,
    channel_dir: String,
}

impl QualitySink {
    pub fn new(data_root: PathBuf, channel_dir: String) -> Self {
        Self {
            data_root,
            channel_dir,
        }
    }

    pub fn append_minute_quality(
        &self,
        day: &str,
        minute_boundary_utc: i64,
        completeness_pct: f64,
        packet_loss_pct: f64,
        gap_count: u64,
    ) -> CoreResult<()> {
        self.append_row(
            "minute_quality",
            day,
            "minute_boundary_utc,completeness_pct,packet_loss_pct,gap_count",
            &format!(
                "{},{:.4},{:.4},{}",
                minute_boundary_utc, completeness_pct, packet_loss_pct, gap_count
            ),
        )
    }

    pub fn append_gap_event(&self, day: &str, gap: &GapEvent) -> CoreResult<()> {
        self.append_row(
            "gap_events",
            day,
            "timestamp_utc,source,position_samples,duration_samples,packets_affected",
            &format!(
                "{:.6},{:?},{},{},{}",
                gap.timestamp_utc, gap.source, gap.position_samples, gap.duration_samples, gap.packets_affected
            ),
        )
    }

    pub fn append_tone_detection(&self, day: &str, detection: &ToneDetection) -> CoreResult<()> {
        self.append_row(
            "tone_detections",
            day,
            "timestamp_utc,station,frequency_hz,timing_error_ms,snr_db,confidence",
            &format!(
                "{:.6},{},{},{:.4},{:.2},{:.3}",
                detection.timestamp_utc,
                detection.station.as_str(),
                detection.frequency_hz,
                detection.timing_error_ms,
                detection.snr_db,
                detection.confidence
            ),
        )
    }

    pub fn append_discrimination(&self, day: &str, result: &DiscriminationResult) -> CoreResult<()> {
        self.append_row(
            "discrimination",
            day,
            "minute,dominant_station,confidence,differential_delay_ms",
            &format!(
                "{},{:?},{:?},{}",
                result.minute,
                result.dominant_station,
                result.confidence,
                result
                    .differential_delay_ms
                    .map(|v| format!("{:.3}", v))
                    .unwrap_or_default()
            ),
        )
    }

    /// M2's tick-window coherence score for the minute (`tick_windows/`).
    pub fn append_tick_window(&self, day: &str, result: &DiscriminationResult) -> CoreResult<()> {
        self.append_row(
            "tick_windows",
            day,
            "minute,m2_coherence",
            &format!(
                "{},{}",
                result.minute,
                result
                    .m2_coherence
                    .map(|v| format!("{:.4}", v))
                    .unwrap_or_default(),
            ),
        )
    }

    /// M3's 440 Hz station-ID vote for the minute (`station_id_440hz/`).
    pub fn append_station_id(&self, day: &str, result: &DiscriminationResult) -> CoreResult<()> {
        self.append_row(
            "station_id_440hz",
            day,
            "minute,m3_vote",
            &format!(
                "{},{}",
                result.minute,
                result
                    .m3_vote
                    .map(|v| format!("{:?}", v))
                    .unwrap_or_default(),
            ),
        )
    }

    /// M4's BCD-correlation differential delay for the minute
    /// (`bcd_discrimination/`).
    pub fn append_bcd_discrimination(&self, day: &str, result: &DiscriminationResult) -> CoreResult<()> {
        self.append_row(
            "bcd_discrimination",
            day,
            "minute,m4_correlation_diff_ms",
            &format!(
                "{},{}",
                result.minute,
                result
                    .m4_correlation_diff_ms
                    .map(|v| format!("{:.3}", v))
                    .unwrap_or_default(),
            ),
        )
    }

    pub fn append_d_clock(&self, day: &str, measurement: &DClockMeasurement) -> CoreResult<()> {
        self.append_row(
            "clock_offset",
            day,
            "arrival_utc,station,propagation_mode,d_clock_ms,uncertainty_ms,quality_grade",
            &format!(
                "{:.6},{},{:?},{:.4},{:.4},{:?}",
                measurement.arrival_utc,
                measurement.station.as_str(),
                measurement.propagation_mode,
                measurement.d_clock_ms,
                measurement.uncertainty_ms,
                measurement.quality_grade
            ),
        )
    }

    pub fn append_fused_clock(&self, day: &str, fused: &FusedClock) -> CoreResult<()> {
        // Per-station breakdown packed as one semicolon-separated field so the
        // row stays one CSV line regardless of how many stations contributed.
        let breakdown = fused
            .per_station_breakdown
            .iter()
            .map(|c| format!("{}:{:.4}:{:.4}", c.station.as_str(), c.calibrated_d_clock_ms, c.weight))
            .collect::<Vec<_>>()
            .join(";");

        self.append_row(
            "fused_clock",
            day,
            "utc,d_clock_fused_ms,uncertainty_ms,n_broadcasts,per_station_breakdown,anchor_state",
            &format!(
                "{:.6},{:.4},{:.4},{},{},{:?}",
                fused.utc,
                fused.d_clock_fused_ms,
                fused.uncertainty_ms,
                fused.n_broadcasts,
                breakdown,
                fused.anchor_state
            ),
        )
    }

    fn append_row(&self, method: &str, day: &str, header: &str, row: &str) -> CoreResult<()> {
        let path = self.path_for(method, day);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(CoreError::Io)?;
        }

        let mut file = open_resumable(&path, header)?;
        writeln!(file, "{}", row).map_err(CoreError::Io)?;
        Ok(())
    }

    fn path_for(&self, method: &str, day: &str) -> PathBuf {
        self.data_root
            .join("phase2")
            .join(&self.channel_dir)
            .join(method)
            .join(format!("{}_{}_{}.csv", self.channel_dir, method, day))
    }
}

/// Opens `path` in append mode, writing the header only if the file is
/// new. If the file already has content, the last line is validated
/// (simply: does it end with a newline) and truncated back to the last
/// complete line if a prior process died mid-write.
fn open_resumable(path: &Path, header: &str) -> CoreResult<File> {
    let is_new = !path.exists();

    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)
        .map_err(CoreError::Io)?;

    if is_new {
        writeln!(file, "{}", header).map_err(CoreError::Io)?;
        return Ok(file);
    }

    let len = file.metadata().map_err(CoreError::Io)?.len();
    if len == 0 {
        writeln!(file, "{}", header).map_err(CoreError::Io)?;
        return Ok(file);
    }

    let mut reader = BufReader::new(&file);
    reader.seek(SeekFrom::Start(0)).map_err(CoreError::Io)?;
    let mut last_complete_end = 0u64;
    let mut pos = 0u64;
    let mut line = String::new();
    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).map_err(CoreError::Io)?;
        if bytes_read == 0 {
            break;
        }
        pos += bytes_read as u64;
        if line.ends_with('\n') {
            last_complete_end = pos;
        }
    }

    if last_complete_end < len {
        file.set_len(last_complete_end).map_err(CoreError::Io)?;
    }
    file.seek(SeekFrom::End(0)).map_err(CoreError::Io)?;

    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn torn_tail_is_truncated_on_resume() {
        let dir = std::env::temp_dir().join(format!("hftw-sink-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("torn.csv");

        std::fs::write(&path, "header\nrow1\nrow2_torn_no_newline").unwrap();
        let mut file = open_resumable(&path, "header").unwrap();
        writeln!(file, "row3").unwrap();
        drop(file);

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(!content.contains("row2_torn_no_newline"));
        assert!(content.contains("row3"));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
