//! End-to-end coverage of the ingest path: resequencer, time-base and
//! minute archiver wired together exactly as `assembler.rs`/`archiver.rs`
//! drive them, but fed synthetic packets instead of live multicast
//! traffic.

use std::time::Duration;

use hf_timewatch::archiver::MinuteArchiver;
use hf_timewatch::config::ChannelConfig;
use hf_timewatch::resequencer::{Resequencer, ResequencerConfig};
use hf_timewatch::types::{Complex, GapSource, RtpPacket, RtpToUtc, SampleFormat};

const SAMPLE_RATE: u32 = 20_000;
const SAMPLES_PER_PACKET: u32 = 320;

fn channel() -> ChannelConfig {
    ChannelConfig {
        ssrc: 7,
        frequency_hz: 10_000_000,
        preset: "wwv10".to_string(),
        sample_rate: SAMPLE_RATE,
        description: "WWV 10 MHz".to_string(),
        enabled: true,
        multicast: "239.1.1.10:5004".parse().unwrap(),
        sample_format: SampleFormat::Int16,
    }
}

fn resequencer() -> Resequencer {
    Resequencer::new(ResequencerConfig {
        capacity: 64,
        samples_per_packet: SAMPLES_PER_PACKET,
        catastrophic_gap_samples: SAMPLE_RATE * 20,
        holdover_deadline: Duration::from_millis(100),
    })
}

fn packet(rtp_ts: u32, n: usize) -> RtpPacket {
    RtpPacket {
        sequence: 0,
        rtp_ts,
        ssrc: 7,
        samples: vec![Complex::new(1.0, 0.0); n],
    }
}

#[test]
fn clean_stream_archives_one_full_minute() {
    let mut rs = resequencer();
    let tb = RtpToUtc::bootstrap(0, 0.0, SAMPLE_RATE);
    let dir = std::env::temp_dir().join(format!("hftw-it-clean-{}", std::process::id()));
    let mut archiver = MinuteArchiver::new(
        dir.clone(),
        "WWV_10_MHz".to_string(),
        channel(),
        Duration::from_secs(60),
        Duration::from_secs(120),
    );

    let packets_per_minute = (SAMPLE_RATE as usize * 60) / SAMPLES_PER_PACKET as usize;
    for i in 0..packets_per_minute {
        let rtp_ts = i as u32 * SAMPLES_PER_PACKET;
        let out = rs.submit(packet(rtp_ts, SAMPLES_PER_PACKET as usize), 0.0);
        assert!(out.gaps.is_empty());
        for batch in out.batches {
            archiver.ingest(&batch.samples, batch.start_rtp_ts, &tb).unwrap();
        }
    }
    archiver.flush_partial().unwrap();

    let archive_root = dir.join("raw_archive").join("WWV_10_MHz");
    assert!(archive_root.exists());
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn single_lost_packet_is_zero_filled_exactly_one_packet_wide() {
    let mut rs = resequencer();
    rs.submit(packet(0, SAMPLES_PER_PACKET as usize), 0.0);
    // Packet at rtp_ts=320 never arrives; the next one arrives at 640.
    let out = rs.submit(packet(2 * SAMPLES_PER_PACKET, SAMPLES_PER_PACKET as usize), 0.0);

    assert_eq!(out.gaps.len(), 1);
    assert_eq!(out.gaps[0].source, GapSource::NetworkLoss);
    assert_eq!(out.gaps[0].duration_samples, SAMPLES_PER_PACKET);

    let total_samples: usize = out.batches.iter().map(|b| b.samples.len()).sum();
    assert_eq!(total_samples, 2 * SAMPLES_PER_PACKET as usize);
}

#[test]
fn rtp_timestamp_wrap_keeps_utc_monotonic() {
    let mut rs = resequencer();
    let near_wrap = u32::MAX - (SAMPLES_PER_PACKET - 1);
    let tb = RtpToUtc::bootstrap(near_wrap, 1_000.0, SAMPLE_RATE);

    let out1 = rs.submit(packet(near_wrap, SAMPLES_PER_PACKET as usize), 1_000.0);
    let out2 = rs.submit(packet(0, SAMPLES_PER_PACKET as usize), 1_000.0); // wraps past u32::MAX

    assert!(out1.gaps.is_empty());
    assert!(out2.gaps.is_empty());

    let utc1 = tb.to_utc(out1.batches[0].start_rtp_ts);
    let utc2 = tb.to_utc(out2.batches[0].start_rtp_ts);
    assert!(utc2 > utc1);
    assert!((utc2 - utc1 - SAMPLES_PER_PACKET as f64 / SAMPLE_RATE as f64).abs() < 1e-9);
}

#[test]
fn propagation_dropout_triggers_stream_interruption_and_rebootstrap() {
    let mut rs = resequencer();
    rs.submit(packet(0, SAMPLES_PER_PACKET as usize), 0.0);

    // A gap far beyond the catastrophic threshold (20s at 20kHz).
    let out = rs.submit(packet(1_000_000_000, SAMPLES_PER_PACKET as usize), 5.0);

    assert!(out.stream_interrupted);
    assert_eq!(out.gaps[0].source, GapSource::StreamInterruption);
    // The interrupting packet itself is still delivered, under the new epoch.
    assert_eq!(out.batches.len(), 1);
    assert_eq!(out.batches[0].start_rtp_ts, 1_000_000_000);
}
