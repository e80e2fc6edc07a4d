//! Ground-truth check for the WWV/WWVH discrimination engine: a genuine
//! single-station minute (only a WWV tone burst is present on the
//! channel; WWVH never transmitted anything, so C5 reports it as
//! `ToneOutcome::Absent`, not a weak detection) must still make the
//! engine attribute the minute to WWV.

use hf_timewatch::discrimination::{DiscriminationEngine, MinuteContext};
use hf_timewatch::dsp::TuningFork;
use hf_timewatch::types::{Complex, DominantStation, Station, StationFamily, ToneOutcome};

const SAMPLE_RATE: u32 = 3_000;

#[test]
fn strong_wwv_tone_outvotes_weak_wwvh_tone() {
    // Shared WWV/WWVH channel: the tuning fork carries both templates,
    // but only a WWV burst is actually synthesized onto the channel.
    let mut fork = TuningFork::new(StationFamily::WwvShared, SAMPLE_RATE);

    let n = 60 * SAMPLE_RATE as usize;
    let mut samples = vec![Complex::default(); n];
    let burst_start = n / 2;
    let burst_len = (0.8 * SAMPLE_RATE as f64) as usize;
    for k in 0..burst_len {
        let phase = 2.0 * std::f64::consts::PI * 1000.0 * k as f64 / SAMPLE_RATE as f64;
        samples[burst_start + k] = Complex::new(phase.sin() as f32, 0.0);
    }

    let outcomes = fork.detect_minute(&samples, 0.0);
    let detections: Vec<_> = outcomes
        .into_iter()
        .filter_map(|o| match o {
            ToneOutcome::Detected(d) => Some(d),
            ToneOutcome::Absent => None,
        })
        .collect();

    // WWVH never produces a detection at all — it is genuinely absent,
    // not a weak one — which is exactly the case M1 must still resolve.
    assert_eq!(detections.len(), 1);
    assert_eq!(detections[0].station, Station::Wwv);

    let engine = DiscriminationEngine::new();
    let ctx = MinuteContext {
        minute_of_hour: 0,
        sample_rate: SAMPLE_RATE,
        samples: &samples,
        tone_detections: &detections,
    };
    let result = engine.evaluate(&ctx);

    assert_eq!(result.dominant_station, DominantStation::Wwv);
    assert!(result.m1_power_ratio_db.unwrap() > 0.0);
}
