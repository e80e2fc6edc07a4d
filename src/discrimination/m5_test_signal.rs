//! M5: the multi-tone + chirp test signal transmitted once an hour —
//! WWV at minute 8, WWVH at minute 44. A weighted combination of
//! multi-tone presence (70%) and chirp correlation (30%) must clear 0.20
//! for the minute to count as a detection.

use crate::types::DominantStation;

use super::{goertzel_power, Method, MethodVote, MinuteContext};

pub struct TestSignalMethod;

const WEIGHT: f64 = 12.0;
const MULTI_TONE_FREQS_HZ: [f64; 3] = [500.0, 1000.0, 1500.0];
const CHIRP_START_HZ: f64 = 300.0;
const CHIRP_END_HZ: f64 = 3000.0;
const CHIRP_DURATION_SEC: f64 = 1.0;
const MULTI_TONE_WEIGHT: f64 = 0.7;
const CHIRP_WEIGHT: f64 = 0.3;
const ACCEPT_THRESHOLD: f64 = 0.20;

const WWV_MINUTE: u8 = 8;
const WWVH_MINUTE: u8 = 44;

impl Method for TestSignalMethod {
    fn name(&self) -> &'static str {
        "M5_test_signal"
    }

    fn weight(&self) -> f64 {
        WEIGHT
    }

    fn analyze(&self, ctx: &MinuteContext) -> MethodVote {
        let expected_station = match ctx.minute_of_hour {
            WWV_MINUTE => Some(DominantStation::Wwv),
            WWVH_MINUTE => Some(DominantStation::Wwvh),
            _ => None,
        };

        let Some(expected_station) = expected_station else {
            return MethodVote::abstain();
        };

        if ctx.samples.is_empty() {
            return MethodVote::abstain();
        }

        let envelope: Vec<f32> = ctx.samples.iter().map(|s| s.magnitude()).collect();
        let reference_power = envelope.iter().map(|s| s * s).sum::<f32>() as f64 / envelope.len() as f64;
        if reference_power <= 0.0 {
            return MethodVote::abstain();
        }

        let multi_tone_score = MULTI_TONE_FREQS_HZ
            .iter()
            .map(|&f| goertzel_power(&envelope, ctx.sample_rate, f) / reference_power)
            .sum::<f64>()
            / MULTI_TONE_FREQS_HZ.len() as f64;

        let chirp_score = chirp_correlation(&envelope, ctx.sample_rate, reference_power);

        let combined = MULTI_TONE_WEIGHT * multi_tone_score.min(1.0)
            + CHIRP_WEIGHT * chirp_score.min(1.0);

        if combined < ACCEPT_THRESHOLD {
            return MethodVote::abstain();
        }

        MethodVote {
            station: Some(expected_station),
            weight: WEIGHT,
            metric: Some(combined),
        }
    }
}

fn chirp_correlation(envelope: &[f32], sample_rate: u32, reference_power: f64) -> f64 {
    let n = (CHIRP_DURATION_SEC * sample_rate as f64) as usize;
    let n = n.min(envelope.len());
    if n == 0 {
        return 0.0;
    }

    let mut correlation = 0.0f64;
    for (k, &sample) in envelope[..n].iter().enumerate() {
        let t = k as f64 / sample_rate as f64;
        let instantaneous_freq =
            CHIRP_START_HZ + (CHIRP_END_HZ - CHIRP_START_HZ) * t / CHIRP_DURATION_SEC;
        let phase = 2.0 * std::f64::consts::PI * instantaneous_freq * t;
        correlation += sample as f64 * phase.sin();
    }

    (correlation / n as f64).abs() / reference_power.sqrt().max(1e-12)
}
