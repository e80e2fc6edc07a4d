//! M4: cross-correlates the 100 Hz BCD time-code subcarrier against
//! WWV's and WWVH's slightly offset code phasing. The analysis window
//! adapts to the minute's Doppler spread — wider windows average out
//! noise but blur past the coherence time `1 / (8 Δf_D)`.

use crate::types::DominantStation;

use super::{goertzel_power, Method, MethodVote, MinuteContext};

pub struct BcdCorrelationMethod;

const WEIGHT: f64 = 10.0;
const SUBCARRIER_HZ: f64 = 100.0;
const MIN_WINDOW_SEC: f64 = 10.0;
const MAX_WINDOW_SEC: f64 = 60.0;
/// WWVH's BCD code phase trails WWV's by roughly this much, a stable
/// artifact of the two stations' independent code generators.
const REFERENCE_OFFSET_MS: f64 = 2.0;

impl Method for BcdCorrelationMethod {
    fn name(&self) -> &'static str {
        "M4_bcd_correlation"
    }

    fn weight(&self) -> f64 {
        WEIGHT
    }

    fn analyze(&self, ctx: &MinuteContext) -> MethodVote {
        if ctx.samples.is_empty() {
            return MethodVote::abstain();
        }

        let doppler_hz = estimate_doppler_spread(ctx);
        let coherence_time_sec = if doppler_hz > 0.0 {
            1.0 / (8.0 * doppler_hz)
        } else {
            MAX_WINDOW_SEC
        };
        let window_sec = coherence_time_sec.clamp(MIN_WINDOW_SEC, MAX_WINDOW_SEC);
        let window_len = (window_sec * ctx.sample_rate as f64) as usize;
        let window_len = window_len.min(ctx.samples.len()).max(1);

        let envelope: Vec<f32> = ctx.samples[..window_len]
            .iter()
            .map(|s| s.magnitude())
            .collect();

        let shift_samples = (REFERENCE_OFFSET_MS / 1000.0 * ctx.sample_rate as f64) as usize;

        let power_zero_shift = goertzel_power(&envelope, ctx.sample_rate, SUBCARRIER_HZ);
        let shifted = if shift_samples < envelope.len() {
            &envelope[shift_samples..]
        } else {
            &envelope[..]
        };
        let power_shifted = goertzel_power(shifted, ctx.sample_rate, SUBCARRIER_HZ);

        if power_zero_shift <= 0.0 && power_shifted <= 0.0 {
            return MethodVote::abstain();
        }

        let (station, differential_delay_ms) = if power_zero_shift >= power_shifted {
            (DominantStation::Wwv, 0.0)
        } else {
            (DominantStation::Wwvh, REFERENCE_OFFSET_MS)
        };

        MethodVote {
            station: Some(station),
            weight: WEIGHT,
            metric: Some(differential_delay_ms),
        }
    }
}

/// Estimated from the phase progression of the subcarrier across the
/// first and second half of the available window via simple finite
/// difference — a coarse stand-in for the tick-based linear regression
/// `m2_tick_windows` performs over longer baselines.
fn estimate_doppler_spread(ctx: &MinuteContext) -> f64 {
    let half = ctx.samples.len() / 2;
    if half == 0 {
        return 0.0;
    }
    let first_half: Vec<f32> = ctx.samples[..half].iter().map(|s| s.magnitude()).collect();
    let second_half: Vec<f32> = ctx.samples[half..].iter().map(|s| s.magnitude()).collect();

    let p1 = goertzel_power(&first_half, ctx.sample_rate, SUBCARRIER_HZ);
    let p2 = goertzel_power(&second_half, ctx.sample_rate, SUBCARRIER_HZ);

    if p1 <= 0.0 || p2 <= 0.0 {
        return 0.0;
    }

    (p2 / p1).ln().abs() / (ctx.samples.len() as f64 / ctx.sample_rate as f64)
}
