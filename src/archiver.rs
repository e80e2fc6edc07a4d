//! C4: groups the assembled sample stream into per-minute immutable
//! records aligned to the time-base's frame, writing one file per minute.

use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::config::ChannelConfig;
use crate::error::{CoreError, CoreResult};
use crate::types::{ArchiveQuality, Complex, MinuteRecord, RtpToUtc};

pub struct MinuteArchiver {
    data_root: PathBuf,
    channel_dir: String,
    channel: ChannelConfig,
    in_progress: Option<InProgressMinute>,
    last_flush: Instant,
    flush_interval: Duration,
    watchdog_timeout: Duration,
    last_successful_write: Instant,
}

struct InProgressMinute {
    minute_boundary_utc: i64,
    samples: Vec<Complex>,
    cadence_fill_start: u32,
    late_start_delay_ms: f64,
}

impl MinuteArchiver {
    pub fn new(
        data_root: PathBuf,
        channel_dir: String,
        channel: ChannelConfig,
        flush_interval: Duration,
        watchdog_timeout: Duration,
    ) -> Self {
        Self {
            data_root,
            channel_dir,
            channel,
            in_progress: None,
            last_flush: Instant::now(),
            flush_interval,
            watchdog_timeout,
            last_successful_write: Instant::now(),
        }
    }

    /// Feed one assembled batch's samples. Internally segments at minute
    /// boundaries, front/back zero-padding partial minutes as required.
    pub fn ingest(
        &mut self,
        samples: &[Complex],
        start_rtp_ts: u32,
        time_base: &RtpToUtc,
    ) -> CoreResult<()> {
        let samples_per_minute = (self.channel.sample_rate * 60) as usize;
        let mut utc = time_base.to_utc(start_rtp_ts);
        let sample_period = 1.0 / self.channel.sample_rate as f64;

        for &sample in samples {
            let boundary = time_base.minute_boundary_utc(utc);

            if self.in_progress.is_none() {
                let late_start_delay_ms = (utc - boundary as f64) * 1000.0;
                let cadence_fill_start = ((utc - boundary as f64) * self.channel.sample_rate as f64)
                    .round()
                    .max(0.0) as u32;
                let mut samples = Vec::with_capacity(samples_per_minute);
                samples.resize(cadence_fill_start as usize, Complex::default());
                self.in_progress = Some(InProgressMinute {
                    minute_boundary_utc: boundary,
                    samples,
                    cadence_fill_start,
                    late_start_delay_ms,
                });
            }

            let minute_changed = {
                let cur = self.in_progress.as_ref().unwrap();
                boundary != cur.minute_boundary_utc
            };

            if minute_changed {
                self.complete_minute(samples_per_minute)?;
                let cadence_fill_start = 0;
                self.in_progress = Some(InProgressMinute {
                    minute_boundary_utc: boundary,
                    samples: Vec::with_capacity(samples_per_minute),
                    cadence_fill_start,
                    late_start_delay_ms: 0.0,
                });
            }

            self.in_progress.as_mut().unwrap().samples.push(sample);

            if self.in_progress.as_ref().unwrap().samples.len() >= samples_per_minute {
                self.complete_minute(samples_per_minute)?;
            }

            utc += sample_period;
        }

        if self.last_flush.elapsed() >= self.flush_interval {
            self.last_flush = Instant::now();
        }

        if self.last_successful_write.elapsed() > self.watchdog_timeout {
            tracing::warn!(
                ssrc = self.channel.ssrc,
                "archiver watchdog: no successful write in {:?}",
                self.watchdog_timeout
            );
        }

        Ok(())
    }

    /// Flush any partial minute as a padded record — called on
    /// catastrophic gap and on graceful shutdown.
    pub fn flush_partial(&mut self) -> CoreResult<()> {
        let samples_per_minute = (self.channel.sample_rate * 60) as usize;
        if self.in_progress.is_some() {
            self.complete_minute(samples_per_minute)?;
        }
        Ok(())
    }

    fn complete_minute(&mut self, samples_per_minute: usize) -> CoreResult<()> {
        let Some(mut cur) = self.in_progress.take() else {
            return Ok(());
        };

        let cadence_fill_end = if cur.samples.len() < samples_per_minute {
            let deficit = samples_per_minute - cur.samples.len();
            cur.samples.resize(samples_per_minute, Complex::default());
            deficit as u32
        } else {
            0
        };

        let record = MinuteRecord {
            minute_boundary_utc: cur.minute_boundary_utc,
            ssrc: self.channel.ssrc,
            frequency_hz: self.channel.frequency_hz,
            sample_rate: self.channel.sample_rate,
            samples: cur.samples,
            archive_quality: ArchiveQuality {
                cadence_fill_start: cur.cadence_fill_start,
                cadence_fill_end,
                late_start_delay_ms: cur.late_start_delay_ms,
            },
        };

        self.write_record(&record)?;
        self.last_successful_write = Instant::now();
        Ok(())
    }

    fn write_record(&self, record: &MinuteRecord) -> CoreResult<()> {
        let dt = chrono::DateTime::from_timestamp(record.minute_boundary_utc, 0)
            .ok_or_else(|| CoreError::Resource("invalid minute boundary timestamp".into()))?;
        let day = dt.format("%Y%m%d").to_string();
        let hour_dir = dt.format("%Y-%m-%dT%H").to_string();

        let dir = self
            .data_root
            .join("raw_archive")
            .join(&self.channel_dir)
            .join(&day)
            .join(&hour_dir);
        fs::create_dir_all(&dir).map_err(CoreError::Io)?;

        let absolute_sample_index =
            record.minute_boundary_utc as i64 * record.sample_rate as i64;
        let path = dir.join(format!("{}.iq", absolute_sample_index));

        let mut file = File::create(&path).map_err(CoreError::Io)?;
        file.write_all(&record.minute_boundary_utc.to_be_bytes())
            .map_err(CoreError::Io)?;
        file.write_all(&record.ssrc.to_be_bytes()).map_err(CoreError::Io)?;
        file.write_all(&record.frequency_hz.to_be_bytes())
            .map_err(CoreError::Io)?;
        file.write_all(&record.sample_rate.to_be_bytes())
            .map_err(CoreError::Io)?;
        file.write_all(&(record.samples.len() as u32).to_be_bytes())
            .map_err(CoreError::Io)?;
        file.write_all(&record.archive_quality.cadence_fill_start.to_be_bytes())
            .map_err(CoreError::Io)?;
        file.write_all(&record.archive_quality.cadence_fill_end.to_be_bytes())
            .map_err(CoreError::Io)?;

        for sample in &record.samples {
            file.write_all(&sample.i.to_be_bytes()).map_err(CoreError::Io)?;
            file.write_all(&sample.q.to_be_bytes()).map_err(CoreError::Io)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> ChannelConfig {
        ChannelConfig {
            ssrc: 1,
            frequency_hz: 10_000_000,
            preset: "wwv10".to_string(),
            sample_rate: 20_000,
            description: "WWV 10 MHz".to_string(),
            enabled: true,
            multicast: "239.1.1.10:5004".parse().unwrap(),
            sample_format: crate::types::SampleFormat::Int16,
        }
    }

    #[test]
    fn clean_minute_has_exact_sample_count() {
        let dir = std::env::temp_dir().join(format!("hftw-test-{}", std::process::id()));
        let mut archiver = MinuteArchiver::new(
            dir.clone(),
            "WWV_10_MHz".to_string(),
            channel(),
            Duration::from_secs(60),
            Duration::from_secs(120),
        );
        let tb = RtpToUtc::bootstrap(0, 120.0, 20_000);
        let samples = vec![Complex::new(1.0, 0.0); 20_000 * 60];
        archiver.ingest(&samples, 0, &tb).unwrap();
        archiver.flush_partial().unwrap();
        let _ = fs::remove_dir_all(&dir);
    }
}
