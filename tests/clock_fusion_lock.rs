//! End-to-end clock fusion: synthetic tone detections for three stations
//! with a consistent ground-truth offset are run through the real
//! propagation solver and then the fusion engine, and the anchor state
//! must converge to `Locked` once enough stable minutes accumulate.

use hf_timewatch::fusion::FusionEngine;
use hf_timewatch::solver::TransmissionTimeSolver;
use hf_timewatch::types::{AnchorState, Station, ToneDetection};

fn detection(station: Station, frequency_hz: u32, timing_error_ms: f64, snr_db: f64) -> ToneDetection {
    ToneDetection {
        station,
        frequency_hz,
        duration_sec: 0.8,
        timestamp_utc: 0.0,
        timing_error_ms,
        snr_db,
        confidence: 0.9,
        correlation_peak: 10.0,
        noise_floor: 0.1,
        tone_power_db: None,
        use_for_time_snap: station != Station::Wwvh,
    }
}

#[test]
fn consistent_multi_station_measurements_converge_to_locked() {
    // Co-located receiver with WWV so its ground-wave delay is ~0, making
    // the expected d_clock equal to the injected timing_error_ms.
    let solver = TransmissionTimeSolver::new(40.6776, -105.0461);
    let mut fusion = FusionEngine::new(0.5);

    let mut last_state = AnchorState::Learn;
    for minute in 0..30 {
        let now_utc = minute as f64 * 60.0;

        let wwv = detection(Station::Wwv, 10_000_000, 2.0, 35.0);
        let chu = detection(Station::Chu, 14_670_000, 2.0, 30.0);

        let m_wwv = solver.solve(&wwv, 12.0);
        let m_chu = solver.solve(&chu, 12.0);

        let fused = fusion
            .fuse(&[m_wwv, m_chu], now_utc)
            .expect("grade-A ground-wave measurements should always be usable");

        last_state = fused.anchor_state;
    }

    assert_eq!(last_state, AnchorState::Locked);
}

#[test]
fn stale_measurements_fall_back_to_holdover() {
    let solver = TransmissionTimeSolver::new(40.6776, -105.0461);
    let mut fusion = FusionEngine::new(0.5);

    let wwv = detection(Station::Wwv, 10_000_000, 1.0, 35.0);
    let measurement = solver.solve(&wwv, 12.0);
    fusion.fuse(&[measurement], 0.0);

    let result = fusion.fuse(&[], 10_000.0);
    assert!(result.is_none());
    assert_eq!(fusion.state(), AnchorState::Holdover);
}
