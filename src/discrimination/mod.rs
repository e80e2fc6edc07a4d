//! C6: five independent per-minute analyses, each casting an independent
//! weighted vote for WWV vs WWVH, folded into one `DiscriminationResult`.
//!
//! The five analyses are interchangeable implementations of one `Method`
//! capability, collected in a fixed-order list built once at channel
//! startup — adding a sixth method never requires touching the fold.

mod m1_timing_tones;
mod m2_tick_windows;
mod m3_station_id;
mod m4_bcd_correlation;
mod m5_test_signal;

use crate::types::{
    Complex, DiscriminationConfidence, DiscriminationResult, DominantStation, ToneDetection,
};

pub struct MinuteContext<'a> {
    pub minute_of_hour: u8,
    pub sample_rate: u32,
    pub samples: &'a [Complex],
    pub tone_detections: &'a [ToneDetection],
}

#[derive(Debug, Clone, Copy)]
pub struct MethodVote {
    /// `None` when the method abstains for this minute.
    pub station: Option<DominantStation>,
    pub weight: f64,
    /// A method-specific metric worth surfacing in `DiscriminationResult`
    /// (e.g. a power ratio, a correlation offset).
    pub metric: Option<f64>,
}

impl MethodVote {
    pub fn abstain() -> Self {
        Self {
            station: None,
            weight: 0.0,
            metric: None,
        }
    }
}

pub trait Method: Send + Sync {
    fn name(&self) -> &'static str;
    fn weight(&self) -> f64;
    fn analyze(&self, ctx: &MinuteContext) -> MethodVote;
}

pub struct DiscriminationEngine {
    methods: Vec<Box<dyn Method>>,
}

impl DiscriminationEngine {
    pub fn new() -> Self {
        Self {
            methods: vec![
                Box::new(m1_timing_tones::TimingToneMethod),
                Box::new(m2_tick_windows::TickWindowMethod),
                Box::new(m3_station_id::StationIdMethod),
                Box::new(m4_bcd_correlation::BcdCorrelationMethod),
                Box::new(m5_test_signal::TestSignalMethod),
            ],
        }
    }

    pub fn evaluate(&self, ctx: &MinuteContext) -> DiscriminationResult {
        let votes: Vec<MethodVote> = self.methods.iter().map(|m| m.analyze(ctx)).collect();

        let mut wwv_weight = 0.0;
        let mut wwvh_weight = 0.0;
        for vote in &votes {
            match vote.station {
                Some(DominantStation::Wwv) => wwv_weight += vote.weight,
                Some(DominantStation::Wwvh) => wwvh_weight += vote.weight,
                _ => {}
            }
        }

        let total = wwv_weight + wwvh_weight;
        let dominant_station = if total == 0.0 {
            DominantStation::Unknown
        } else if (wwv_weight - wwvh_weight).abs() < total * 0.05 {
            DominantStation::Balanced
        } else if wwv_weight > wwvh_weight {
            DominantStation::Wwv
        } else {
            DominantStation::Wwvh
        };

        let top = wwv_weight.max(wwvh_weight);
        let confidence = if total == 0.0 {
            DiscriminationConfidence::Low
        } else if top / total >= 0.7 {
            DiscriminationConfidence::High
        } else if top / total >= 0.55 {
            DiscriminationConfidence::Medium
        } else {
            DiscriminationConfidence::Low
        };

        DiscriminationResult {
            minute: ctx.minute_of_hour,
            m1_power_ratio_db: votes[0].metric,
            m2_coherence: votes[1].metric,
            m3_vote: votes[2].station,
            m4_correlation_diff_ms: votes[3].metric,
            m5_test_signal_score: votes[4].metric,
            dominant_station,
            confidence,
            differential_delay_ms: votes[3].metric,
        }
    }
}

impl Default for DiscriminationEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Single-bin DFT power estimate (Goertzel's algorithm) — cheaper than a
/// full FFT when only a handful of known frequencies need to be probed,
/// which is the case for every discrimination method below.
pub(crate) fn goertzel_power(samples: &[f32], sample_rate: u32, target_freq: f64) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let n = samples.len();
    let k = (0.5 + n as f64 * target_freq / sample_rate as f64).floor();
    let omega = 2.0 * std::f64::consts::PI * k / n as f64;
    let coeff = 2.0 * omega.cos();

    let (mut s_prev, mut s_prev2) = (0.0f64, 0.0f64);
    for &sample in samples {
        let s = sample as f64 + coeff * s_prev - s_prev2;
        s_prev2 = s_prev;
        s_prev = s;
    }

    (s_prev2 * s_prev2 + s_prev * s_prev - coeff * s_prev * s_prev2) / n as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(freq: f64, sample_rate: u32, n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| (2.0 * std::f64::consts::PI * freq * i as f64 / sample_rate as f64).sin() as f32)
            .collect()
    }

    #[test]
    fn goertzel_peaks_at_target_frequency() {
        let sr = 3000;
        let samples = tone(1000.0, sr, 2400);
        let at_target = goertzel_power(&samples, sr, 1000.0);
        let off_target = goertzel_power(&samples, sr, 700.0);
        assert!(at_target > off_target * 5.0);
    }

    #[test]
    fn unanimous_vote_yields_high_confidence() {
        let engine = DiscriminationEngine::new();
        let ctx = MinuteContext {
            minute_of_hour: 0,
            sample_rate: 3000,
            samples: &[],
            tone_detections: &[],
        };
        // With no input all methods abstain; dominant station is Unknown.
        let result = engine.evaluate(&ctx);
        assert_eq!(result.dominant_station, DominantStation::Unknown);
    }
}
