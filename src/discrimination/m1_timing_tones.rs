//! M1: compares the 1000 Hz (WWV) vs 1200 Hz (WWVH) timing-tone powers
//! measured directly from the minute's IQ for the 800 ms tone window.
//!
//! Reads raw samples rather than C5's `ToneDetection`s: a genuine
//! single-station minute never produces a `ToneDetection` for the absent
//! station at all (C5 reports `ToneOutcome::Absent`, not a zero-power
//! detection), so gating on both stations having detections would make
//! this method abstain in exactly the case it exists to resolve.

use crate::types::DominantStation;

use super::{goertzel_power, Method, MethodVote, MinuteContext};

pub struct TimingToneMethod;

const WEIGHT: f64 = 10.0;
const RATIO_THRESHOLD_DB: f64 = 6.0;
const WWV_FREQ_HZ: f64 = 1000.0;
const WWVH_FREQ_HZ: f64 = 1200.0;
const BURST_DURATION_SEC: f64 = 0.8;

impl Method for TimingToneMethod {
    fn name(&self) -> &'static str {
        "M1_timing_tones"
    }

    fn weight(&self) -> f64 {
        WEIGHT
    }

    fn analyze(&self, ctx: &MinuteContext) -> MethodVote {
        if ctx.samples.is_empty() {
            return MethodVote::abstain();
        }

        let burst_len = ((BURST_DURATION_SEC * ctx.sample_rate as f64) as usize).min(ctx.samples.len());
        if burst_len == 0 {
            return MethodVote::abstain();
        }

        // Per-minute buffers in this codebase center the minute boundary
        // rather than index it from zero (matching `TuningFork`'s own
        // `center = audio.len() / 2` convention); the tone plays forward
        // from that boundary, so the window starts at center rather than
        // being centered on it.
        let start = ctx.samples.len() / 2;
        let end = (start + burst_len).min(ctx.samples.len());

        let window: Vec<f32> = ctx.samples[start..end].iter().map(|s| s.magnitude()).collect();
        let wwv_power = goertzel_power(&window, ctx.sample_rate, WWV_FREQ_HZ);
        let wwvh_power = goertzel_power(&window, ctx.sample_rate, WWVH_FREQ_HZ);

        if wwv_power <= 0.0 || wwvh_power <= 0.0 {
            return MethodVote::abstain();
        }

        let ratio_db = 10.0 * (wwv_power / wwvh_power).log10();

        let station = if ratio_db >= RATIO_THRESHOLD_DB {
            Some(DominantStation::Wwv)
        } else if ratio_db <= -RATIO_THRESHOLD_DB {
            Some(DominantStation::Wwvh)
        } else {
            None
        };

        MethodVote {
            station,
            weight: if station.is_some() { WEIGHT } else { 0.0 },
            metric: Some(ratio_db),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Complex;

    fn tone(freq: f64, sample_rate: u32, n: usize) -> Vec<Complex> {
        (0..n)
            .map(|i| {
                let phase = 2.0 * std::f64::consts::PI * freq * i as f64 / sample_rate as f64;
                Complex::new(phase.sin() as f32, 0.0)
            })
            .collect()
    }

    #[test]
    fn pure_1000hz_burst_votes_wwv_with_no_wwvh_detection_needed() {
        let sr = 3_000;
        let n = 60 * sr as usize;
        let mut samples = vec![Complex::default(); n];
        let burst = tone(1000.0, sr, (0.8 * sr as f64) as usize);
        let start = n / 2;
        samples[start..start + burst.len()].copy_from_slice(&burst);

        let method = TimingToneMethod;
        let ctx = MinuteContext {
            minute_of_hour: 0,
            sample_rate: sr,
            samples: &samples,
            tone_detections: &[],
        };
        let vote = method.analyze(&ctx);
        assert_eq!(vote.station, Some(DominantStation::Wwv));
        assert!(vote.metric.unwrap() > RATIO_THRESHOLD_DB);
    }

    #[test]
    fn silence_abstains() {
        let samples = vec![Complex::default(); 60 * 3_000];
        let method = TimingToneMethod;
        let ctx = MinuteContext {
            minute_of_hour: 0,
            sample_rate: 3_000,
            samples: &samples,
            tone_detections: &[],
        };
        let vote = method.analyze(&ctx);
        assert!(vote.station.is_none());
    }
}
