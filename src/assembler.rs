//! C3: for one configured channel, joins the multicast group, drives the
//! resequencer and time-base, tracks cumulative stream quality, and
//! publishes sample batches to subscribers over a bounded channel.

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crossbeam_channel::{Receiver, Sender};

use crate::config::ChannelConfig;
use crate::error::CoreResult;
use crate::resequencer::{Resequencer, ResequencerConfig};
use crate::rtp::McastReceiver;
use crate::types::{RtpPacket, RtpToUtc, SampleFormat, StreamQuality};

/// One published unit: a contiguous sample batch, the stream quality
/// snapshot after it, and the time-base needed to interpret it.
pub struct AssembledBatch {
    pub batch: crate::types::SampleBatch,
    pub quality: StreamQuality,
    pub time_base: RtpToUtc,
}

pub struct StreamAssembler {
    channel: ChannelConfig,
    resequencer: Resequencer,
    time_base: Option<RtpToUtc>,
    quality: StreamQuality,
    catastrophic_gap_secs: f64,
}

impl StreamAssembler {
    pub fn new(channel: ChannelConfig, resequence_buffer_size: usize, catastrophic_gap_secs: f64) -> Self {
        let samples_per_packet = 320;
        let resequencer = Resequencer::new(ResequencerConfig {
            capacity: resequence_buffer_size,
            samples_per_packet,
            catastrophic_gap_samples: (catastrophic_gap_secs * channel.sample_rate as f64) as u32,
            holdover_deadline: Duration::from_millis(100),
        });

        Self {
            channel,
            resequencer,
            time_base: None,
            quality: StreamQuality::default(),
            catastrophic_gap_secs,
        }
    }

    /// Runs until `running` clears. Every emitted batch is pushed onto
    /// `publish`; the receive side of the RTP socket is owned internally.
    pub fn run(
        mut self,
        multicast_addr: Ipv4Addr,
        port: u16,
        sample_format: SampleFormat,
        publish: Sender<AssembledBatch>,
        running: Arc<AtomicBool>,
    ) -> CoreResult<()> {
        let (rtp_tx, rtp_rx): (Sender<RtpPacket>, Receiver<RtpPacket>) =
            crossbeam_channel::bounded(256);

        let receiver = McastReceiver::new(multicast_addr, port, self.channel.ssrc, sample_format)?;
        let recv_handle = receiver.start(rtp_tx, running.clone())?;

        while running.load(Ordering::Relaxed) {
            match rtp_rx.recv_timeout(Duration::from_millis(100)) {
                Ok(packet) => self.ingest(packet, &publish),
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                    let now = now_utc();
                    let out = self.resequencer.check_holdover(now);
                    self.account(&out.gaps, out.batches.len());
                    for batch in out.batches {
                        self.publish_batch(batch, &publish);
                    }
                }
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
            }
        }

        let _ = recv_handle.join();
        Ok(())
    }

    fn ingest(&mut self, packet: RtpPacket, publish: &Sender<AssembledBatch>) {
        let now = now_utc();

        if self.time_base.is_none() {
            self.time_base = Some(RtpToUtc::bootstrap(
                packet.rtp_ts,
                now,
                self.channel.sample_rate,
            ));
            self.quality.stream_start_utc = now;
        }

        self.quality.packets_received += 1;
        self.quality.packets_expected += 1;
        let out = self.resequencer.submit(packet, now);

        if out.stream_interrupted {
            self.time_base = Some(RtpToUtc::bootstrap(
                self.resequencer.position_samples() as u32,
                now,
                self.channel.sample_rate,
            ));
        }

        self.quality.packets_late += out.packets_late_or_duplicate as u64;
        self.account(&out.gaps, out.batches.len());

        for batch in out.batches {
            self.publish_batch(batch, publish);
        }
    }

    fn account(&mut self, gaps: &[crate::types::GapEvent], _n_batches: usize) {
        for gap in gaps {
            self.quality.gap_events += 1;
            self.quality.samples_expected += gap.duration_samples as u64;
            if gap.source == crate::types::GapSource::NetworkLoss {
                self.quality.packets_lost += 1;
            }
        }
    }

    fn publish_batch(&mut self, batch: crate::types::SampleBatch, publish: &Sender<AssembledBatch>) {
        self.quality.samples_delivered += batch.samples.len() as u64;
        self.quality.samples_expected += batch.samples.len() as u64;
        self.quality.last_packet_utc = now_utc();

        let Some(time_base) = self.time_base else {
            return;
        };

        if publish
            .send(AssembledBatch {
                batch,
                quality: self.quality.clone(),
                time_base,
            })
            .is_err()
        {
            tracing::warn!(
                ssrc = self.channel.ssrc,
                "analytics channel closed, dropping batch"
            );
        }
    }
}

fn now_utc() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
