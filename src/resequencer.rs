//! C1: recovers in-order samples from a lossy, reorderable RTP stream.
//!
//! Wraparound of the 32-bit RTP timestamp is handled exclusively by signed
//! arithmetic on the difference between an arriving packet's timestamp and
//! the timestamp we expect next: `diff = (new - expected) as i32`. The sign
//! and magnitude of `diff` alone determine whether a packet is in order,
//! reordered-but-recoverable, a duplicate/late arrival, or a catastrophic
//! interruption. The reordering buffer itself is a capacity-bounded
//! `VecDeque` indexed by that same diff, mirroring a jitter-buffer's
//! diff-indexed slot assignment.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::types::{Complex, GapEvent, GapSource, RtpPacket, SampleBatch};

pub struct ResequencerConfig {
    pub capacity: usize,
    pub samples_per_packet: u32,
    pub catastrophic_gap_samples: u32,
    pub holdover_deadline: Duration,
}

/// One position in the reorder buffer. `created_at` is stamped when the
/// position is first allocated — as an empty hole awaiting a packet, or as
/// a freshly filled slot — so `flush_one` can tell a quick reorder from a
/// hole that sat past `holdover_deadline` regardless of whether the packet
/// ever showed up.
struct Entry {
    samples: Option<Vec<Complex>>,
    created_at: Instant,
}

pub struct Resequencer {
    config: ResequencerConfig,
    buffer: VecDeque<Entry>,
    expected_next_rtp_ts: Option<u32>,
    position_samples: u64,
}

#[derive(Default)]
pub struct SubmitOutcome {
    pub batches: Vec<SampleBatch>,
    pub gaps: Vec<GapEvent>,
    /// Set when a gap exceeded the catastrophic threshold; the caller
    /// (the stream assembler) must rebootstrap its time-base.
    pub stream_interrupted: bool,
    pub packets_late_or_duplicate: u32,
}

impl Resequencer {
    pub fn new(config: ResequencerConfig) -> Self {
        let capacity = config.capacity;
        Self {
            config,
            buffer: VecDeque::with_capacity(capacity),
            expected_next_rtp_ts: None,
            position_samples: 0,
        }
    }

    pub fn position_samples(&self) -> u64 {
        self.position_samples
    }

    pub fn submit(&mut self, packet: RtpPacket, now_utc: f64) -> SubmitOutcome {
        let mut out = SubmitOutcome::default();

        if packet.samples.is_empty() {
            out.gaps.push(GapEvent {
                source: GapSource::EmptyPayload,
                position_samples: self.position_samples,
                duration_samples: self.config.samples_per_packet,
                timestamp_utc: now_utc,
                packets_affected: 1,
            });
            return out;
        }

        let Some(expected) = self.expected_next_rtp_ts else {
            // First packet of a fresh epoch.
            out.gaps.push(GapEvent {
                source: GapSource::StreamStart,
                position_samples: self.position_samples,
                duration_samples: 0,
                timestamp_utc: now_utc,
                packets_affected: 0,
            });
            self.emit(&mut out, packet.samples, packet.rtp_ts);
            return out;
        };

        let diff = (packet.rtp_ts.wrapping_sub(expected)) as i32;

        if diff.unsigned_abs() > self.config.catastrophic_gap_samples {
            out.gaps.push(GapEvent {
                source: GapSource::StreamInterruption,
                position_samples: self.position_samples,
                duration_samples: diff.unsigned_abs(),
                timestamp_utc: now_utc,
                packets_affected: 1,
            });
            self.buffer.clear();
            self.expected_next_rtp_ts = None;
            out.stream_interrupted = true;
            // The new epoch bootstraps on this very packet.
            self.emit(&mut out, packet.samples, packet.rtp_ts);
            return out;
        }

        if diff == 0 {
            self.emit(&mut out, packet.samples, packet.rtp_ts);
            self.drain_contiguous(&mut out, now_utc);
            return out;
        }

        if diff < 0 {
            // Late or duplicate: it belongs to a position we already
            // emitted or dropped. Count it, discard the samples.
            out.packets_late_or_duplicate += 1;
            return out;
        }

        // diff > 0: a forward gap. Slot it if it fits in the buffer.
        let index = (diff as u32 / self.config.samples_per_packet) as usize;

        if index >= self.config.capacity {
            // Buffer would overflow: flush the earliest pending slot (or a
            // zero-filled hole) to make room, emitting a gap for it.
            self.flush_one(&mut out, now_utc);
            // Re-submit is unnecessary: recompute against the now-advanced
            // expectation by reinserting through the same path once.
            return self.submit(packet, now_utc);
        }

        while self.buffer.len() <= index {
            self.buffer.push_back(Entry {
                samples: None,
                created_at: Instant::now(),
            });
        }
        self.buffer[index].samples = Some(packet.samples);

        self.drain_contiguous(&mut out, now_utc);
        out
    }

    /// Zero-fills any head-of-line slot that has sat past the holdover
    /// deadline. Called periodically by the owning stream assembler.
    pub fn check_holdover(&mut self, now_utc: f64) -> SubmitOutcome {
        let mut out = SubmitOutcome::default();
        while let Some(front) = self.buffer.front() {
            if front.created_at.elapsed() <= self.config.holdover_deadline {
                break;
            }
            self.flush_one(&mut out, now_utc);
        }
        out
    }

    /// Pops the head-of-line position and always emits a `GapEvent`: either
    /// the slot was genuinely unfilled (zero-filled) or it held real samples
    /// that sat past the front for long enough to be worth recording. The
    /// source is `ResequenceTimeout` if the position has existed longer than
    /// `holdover_deadline`, `NetworkLoss` if it's being forced out sooner
    /// (buffer capacity overflow).
    fn flush_one(&mut self, out: &mut SubmitOutcome, now_utc: f64) {
        let Some(expected) = self.expected_next_rtp_ts else {
            return;
        };
        let (samples, created_at) = match self.buffer.pop_front() {
            Some(entry) => (entry.samples, entry.created_at),
            None => (None, Instant::now()),
        };
        let source = if created_at.elapsed() > self.config.holdover_deadline {
            GapSource::ResequenceTimeout
        } else {
            GapSource::NetworkLoss
        };
        let samples =
            samples.unwrap_or_else(|| vec![Complex::default(); self.config.samples_per_packet as usize]);
        out.gaps.push(GapEvent {
            source,
            position_samples: self.position_samples,
            duration_samples: self.config.samples_per_packet,
            timestamp_utc: now_utc,
            packets_affected: 1,
        });
        self.emit(out, samples, expected);
    }

    fn drain_contiguous(&mut self, out: &mut SubmitOutcome, now_utc: f64) {
        while matches!(self.buffer.front(), Some(e) if e.samples.is_some()) {
            self.flush_one(out, now_utc);
        }
    }

    fn emit(&mut self, out: &mut SubmitOutcome, samples: Vec<Complex>, rtp_ts: u32) {
        let advance = samples.len() as u32;
        self.position_samples += samples.len() as u64;
        out.batches.push(SampleBatch {
            start_rtp_ts: rtp_ts,
            samples,
        });
        self.expected_next_rtp_ts = Some(rtp_ts.wrapping_add(advance));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn packet(seq: u16, rtp_ts: u32, n: usize) -> RtpPacket {
        RtpPacket {
            sequence: seq,
            rtp_ts,
            ssrc: 1,
            samples: vec![Complex::new(1.0, 0.0); n],
        }
    }

    fn make_resequencer() -> Resequencer {
        Resequencer::new(ResequencerConfig {
            capacity: 64,
            samples_per_packet: 320,
            catastrophic_gap_samples: 20_000 * 20,
            holdover_deadline: Duration::from_millis(100),
        })
    }

    #[test]
    fn in_order_stream_emits_every_packet() {
        let mut rs = make_resequencer();
        let out = rs.submit(packet(1, 0, 320), 0.0);
        assert_eq!(out.batches.len(), 1);
        let out = rs.submit(packet(2, 320, 320), 0.0);
        assert_eq!(out.batches.len(), 1);
        assert_eq!(rs.position_samples(), 640);
    }

    #[test]
    fn single_gap_is_zero_filled() {
        let mut rs = make_resequencer();
        rs.submit(packet(1, 0, 320), 0.0);
        // packet 2 lost, packet 3 arrives directly
        let out = rs.submit(packet(3, 640, 320), 0.0);
        assert_eq!(out.gaps.len(), 1);
        assert_eq!(out.gaps[0].source, GapSource::NetworkLoss);
        assert_eq!(out.gaps[0].duration_samples, 320);
        assert_eq!(out.batches.len(), 2); // zero-fill + the new packet
    }

    #[test]
    fn wrap_is_handled_via_signed_diff() {
        let mut rs = make_resequencer();
        let near_wrap = u32::MAX - 319;
        rs.submit(packet(1, near_wrap, 320), 0.0);
        let out = rs.submit(packet(2, 0, 320), 0.0); // wraps past u32::MAX
        assert_eq!(out.gaps.len(), 0);
        assert_eq!(out.batches.len(), 1);
    }

    #[test]
    fn catastrophic_gap_triggers_interruption() {
        let mut rs = make_resequencer();
        rs.submit(packet(1, 0, 320), 0.0);
        let out = rs.submit(packet(2, 1_000_000_000, 320), 0.0);
        assert!(out.stream_interrupted);
        assert_eq!(out.gaps[0].source, GapSource::StreamInterruption);
    }

    #[test]
    fn empty_payload_advances_nothing_but_reports_gap() {
        let mut rs = make_resequencer();
        rs.submit(packet(1, 0, 320), 0.0);
        let empty = RtpPacket {
            sequence: 2,
            rtp_ts: 320,
            ssrc: 1,
            samples: vec![],
        };
        let out = rs.submit(empty, 0.0);
        assert_eq!(out.gaps[0].source, GapSource::EmptyPayload);
        assert_eq!(out.batches.len(), 0);
    }
}
