//! Core data model shared across the ingest, archiving and timing-analysis
//! stages.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// The family of timing stations that can appear on a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StationFamily {
    /// 20/25 MHz: WWV only.
    WwvOnly,
    /// 2.5/5/10/15 MHz: WWV and WWVH share the same channel.
    WwvShared,
    /// Canadian time standard, distinct frequencies.
    Chu,
}

/// One of the three timing stations a detection can be attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Station {
    Wwv,
    Wwvh,
    Chu,
}

impl StationFamily {
    /// WWV_only: 20/25 MHz. WWV_shared: 2.5/5/10/15 MHz. CHU: 3.330/7.850/
    /// 14.670 MHz. Any other configured frequency is a configuration error
    /// rather than a silent default — it would otherwise get the wrong
    /// tone template and the wrong transmitter coordinates in the solver.
    pub fn for_frequency(frequency_hz: u32) -> CoreResult<Self> {
        match frequency_hz {
            20_000_000 | 25_000_000 => Ok(StationFamily::WwvOnly),
            2_500_000 | 5_000_000 | 10_000_000 | 15_000_000 => Ok(StationFamily::WwvShared),
            3_330_000 | 7_850_000 | 14_670_000 => Ok(StationFamily::Chu),
            other => Err(CoreError::Configuration(format!(
                "{} Hz does not match any known WWV/WWVH/CHU channel frequency",
                other
            ))),
        }
    }
}

impl Station {
    pub fn as_str(&self) -> &'static str {
        match self {
            Station::Wwv => "WWV",
            Station::Wwvh => "WWVH",
            Station::Chu => "CHU",
        }
    }

    /// Whether detections of this station refine the shared `time_snap`
    /// overlay. WWVH is propagation-only: its ionosphere-dependent path
    /// makes it unsuitable as a timing reference.
    pub fn use_for_time_snap(&self) -> bool {
        !matches!(self, Station::Wwvh)
    }
}

/// Sample encoding carried in the RTP payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleFormat {
    /// Signed 16-bit interleaved I/Q, scaled by 1/32768 on decode.
    Int16,
    /// 32-bit float interleaved I/Q, used as-is.
    Float32,
}

/// A single complex baseband sample.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Complex {
    pub i: f32,
    pub q: f32,
}

impl Complex {
    pub fn new(i: f32, q: f32) -> Self {
        Self { i, q }
    }

    pub fn magnitude(&self) -> f32 {
        (self.i * self.i + self.q * self.q).sqrt()
    }
}

/// A decoded RTP packet, header fields plus complex samples.
#[derive(Debug, Clone)]
pub struct RtpPacket {
    pub sequence: u16,
    pub rtp_ts: u32,
    pub ssrc: u32,
    pub samples: Vec<Complex>,
}

/// A contiguous, ordered run of samples emitted by the resequencer.
#[derive(Debug, Clone)]
pub struct SampleBatch {
    pub start_rtp_ts: u32,
    pub samples: Vec<Complex>,
}

/// Why a `GapEvent` was emitted. Network-transient conditions never
/// surface as errors — they are recorded here instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GapSource {
    NetworkLoss,
    ResequenceTimeout,
    EmptyPayload,
    StreamStart,
    StreamInterruption,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GapEvent {
    pub source: GapSource,
    pub position_samples: u64,
    pub duration_samples: u32,
    pub timestamp_utc: f64,
    pub packets_affected: u32,
}

/// Cumulative quality counters for one stream's lifetime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamQuality {
    pub samples_delivered: u64,
    pub samples_expected: u64,
    pub gap_events: u64,
    pub packets_received: u64,
    pub packets_expected: u64,
    pub packets_lost: u64,
    pub packets_late: u64,
    pub packets_duplicate: u64,
    pub stream_start_utc: f64,
    pub last_packet_utc: f64,
}

impl StreamQuality {
    pub fn completeness_pct(&self) -> f64 {
        if self.samples_expected == 0 {
            100.0
        } else {
            100.0 * self.samples_delivered as f64 / self.samples_expected as f64
        }
    }

    pub fn packet_loss_pct(&self) -> f64 {
        if self.packets_expected == 0 {
            0.0
        } else {
            100.0 * self.packets_lost as f64 / self.packets_expected as f64
        }
    }
}

/// RTP timestamp to absolute UTC mapping for one SSRC epoch. See
/// `timebase.rs` for the wrap-safe conversion logic.
#[derive(Debug, Clone, Copy)]
pub struct RtpToUtc {
    pub anchor_rtp: u32,
    pub anchor_utc: f64,
    pub sample_rate: u32,
}

/// Archive-specific quality markers recorded alongside the raw samples
/// delivered for one minute.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArchiveQuality {
    pub cadence_fill_start: u32,
    pub cadence_fill_end: u32,
    pub late_start_delay_ms: f64,
}

#[derive(Debug, Clone)]
pub struct MinuteRecord {
    pub minute_boundary_utc: i64,
    pub ssrc: u32,
    pub frequency_hz: u32,
    pub sample_rate: u32,
    pub samples: Vec<Complex>,
    pub archive_quality: ArchiveQuality,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscriminationConfidence {
    High,
    Medium,
    Low,
}

/// Either a detected tone, or an explicit absence — absence of a
/// qualifying correlation peak is expected during fades, never an error.
#[derive(Debug, Clone)]
pub enum ToneOutcome {
    Detected(ToneDetection),
    Absent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToneDetection {
    pub station: Station,
    pub frequency_hz: u32,
    pub duration_sec: f64,
    pub timestamp_utc: f64,
    pub timing_error_ms: f64,
    pub snr_db: f64,
    pub confidence: f64,
    pub correlation_peak: f64,
    pub noise_floor: f64,
    pub tone_power_db: Option<f64>,
    pub use_for_time_snap: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DominantStation {
    Wwv,
    Wwvh,
    Balanced,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscriminationResult {
    pub minute: u8,
    pub m1_power_ratio_db: Option<f64>,
    pub m2_coherence: Option<f64>,
    pub m3_vote: Option<DominantStation>,
    pub m4_correlation_diff_ms: Option<f64>,
    pub m5_test_signal_score: Option<f64>,
    pub dominant_station: DominantStation,
    pub confidence: DiscriminationConfidence,
    pub differential_delay_ms: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropagationMode {
    /// Ground wave.
    Gw,
    /// Single-hop E-layer.
    OneE,
    /// Single-hop F-layer.
    OneF,
    /// Two-hop F-layer.
    TwoF,
    /// Three-hop F-layer.
    ThreeF,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QualityGrade {
    A,
    B,
    C,
    D,
    F,
}

impl QualityGrade {
    /// Fusion weighting factor, highest grades dominating the weighted mean.
    pub fn weight(&self) -> f64 {
        match self {
            QualityGrade::A => 1.0,
            QualityGrade::B => 0.6,
            QualityGrade::C => 0.35,
            QualityGrade::D => 0.2,
            QualityGrade::F => 0.0,
        }
    }

    pub fn usable_for_fusion(&self) -> bool {
        !matches!(self, QualityGrade::D | QualityGrade::F)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DClockMeasurement {
    pub rtp_ts: u32,
    pub arrival_utc: f64,
    pub expected_utc: f64,
    pub propagation_mode: PropagationMode,
    pub propagation_delay_ms: f64,
    pub d_clock_ms: f64,
    pub uncertainty_ms: f64,
    pub snr_db: f64,
    pub quality_grade: QualityGrade,
    pub station: Station,
    pub frequency_hz: u32,
    pub discrimination_confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationCalibration {
    pub station: Station,
    pub offset_ms: f64,
    pub n_samples: u64,
    pub alpha: f64,
}

impl StationCalibration {
    pub fn new(station: Station, alpha: f64) -> Self {
        Self {
            station,
            offset_ms: 0.0,
            n_samples: 0,
            alpha,
        }
    }

    /// EMA toward `-raw_d_clock_ms`: the calibration converges to whatever
    /// offset would have zeroed this station's recent measurements.
    pub fn update(&mut self, raw_d_clock_ms: f64) {
        let target = -raw_d_clock_ms;
        if self.n_samples == 0 {
            self.offset_ms = target;
        } else {
            self.offset_ms += self.alpha * (target - self.offset_ms);
        }
        self.n_samples += 1;
    }

    pub fn calibrate(&self, raw_d_clock_ms: f64) -> f64 {
        raw_d_clock_ms + self.offset_ms
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnchorState {
    Learn,
    Converge,
    Locked,
    Holdover,
    Anomaly,
}

/// One station's contribution to a `FusedClock` estimate: its calibrated
/// `D_clock` value and the weight it carried into the weighted mean.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationContribution {
    pub station: Station,
    pub calibrated_d_clock_ms: f64,
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusedClock {
    pub utc: f64,
    pub d_clock_fused_ms: f64,
    pub uncertainty_ms: f64,
    pub n_broadcasts: usize,
    pub per_station_breakdown: Vec<StationContribution>,
    pub anchor_state: AnchorState,
}
