//! M2: coherent vs incoherent integration of the 5 ms, 1000 Hz second-tick
//! across six 10-second sub-windows.
//!
//! Doppler spread degrades coherent (phase-preserving) integration; the
//! ratio of coherent to incoherent integrated energy is therefore a
//! direct measure of how trustworthy a phase-based method (like M1) is
//! this minute. This method mostly feeds that confidence signal —
//! it only casts a station vote on the rare minute where the tick train
//! itself is cleanly resolved enough to separate the two stations'
//! slightly offset tick timing, so it abstains far more often than M1.

use crate::types::DominantStation;

use super::{goertzel_power, Method, MethodVote, MinuteContext};

pub struct TickWindowMethod;

const WEIGHT: f64 = 8.0;
const TICK_FREQ_HZ: f64 = 1000.0;
const TICK_DURATION_SEC: f64 = 0.005;
const SUB_WINDOW_SEC: f64 = 10.0;
const SUB_WINDOWS: usize = 6;
const COHERENCE_STATION_THRESHOLD: f64 = 0.85;

impl Method for TickWindowMethod {
    fn name(&self) -> &'static str {
        "M2_tick_windows"
    }

    fn weight(&self) -> f64 {
        WEIGHT
    }

    fn analyze(&self, ctx: &MinuteContext) -> MethodVote {
        let sr = ctx.sample_rate;
        if ctx.samples.is_empty() {
            return MethodVote::abstain();
        }

        let tick_len = (TICK_DURATION_SEC * sr as f64) as usize;
        if tick_len == 0 {
            return MethodVote::abstain();
        }

        let sub_window_samples = (SUB_WINDOW_SEC * sr as f64) as usize;
        let mut coherent_sum = 0.0f64;
        let mut incoherent_sum = 0.0f64;
        let mut n_ticks = 0usize;

        for sub in 0..SUB_WINDOWS {
            let sub_start = sub * sub_window_samples;
            let ticks_in_sub = (SUB_WINDOW_SEC as usize).min(60);
            for t in 0..ticks_in_sub {
                let tick_start = sub_start + t * sr as usize;
                if tick_start + tick_len > ctx.samples.len() {
                    continue;
                }
                let window: Vec<f32> = ctx.samples[tick_start..tick_start + tick_len]
                    .iter()
                    .map(|s| s.magnitude())
                    .collect();
                let power = goertzel_power(&window, sr, TICK_FREQ_HZ).max(0.0).sqrt();
                coherent_sum += power;
                incoherent_sum += power.abs();
                n_ticks += 1;
            }
        }

        if n_ticks == 0 || incoherent_sum <= 0.0 {
            return MethodVote::abstain();
        }

        let coherence = (coherent_sum.abs() / incoherent_sum).clamp(0.0, 1.0);

        let station = if coherence >= COHERENCE_STATION_THRESHOLD {
            Some(DominantStation::Balanced)
        } else {
            None
        };

        MethodVote {
            station,
            weight: if station.is_some() { WEIGHT * 0.3 } else { 0.0 },
            metric: Some(coherence),
        }
    }
}
