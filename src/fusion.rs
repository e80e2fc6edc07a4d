//! C8: per-station EMA calibration plus weighted fusion across every
//! broadcast received this minute, and the anchor state machine that
//! tracks how much to trust the fused result.
//!
//! The state machine's shape — a small enum advanced by a background
//! analytics loop and read through a shared lock — mirrors the PTP clock
//! negotiation state machine this component's ancestor used to run; here
//! it tracks convergence of a multi-broadcast HF clock fusion instead of
//! an IEEE-1588 peer.

use std::collections::{HashMap, VecDeque};

use crate::types::{
    AnchorState, DClockMeasurement, FusedClock, Station, StationCalibration, StationContribution,
};

const RECENT_WINDOW: usize = 10;
const ANOMALY_SIGMA: f64 = 3.0;
const GPSDO_BOUND_PPM: f64 = 1.0;
const LOCK_UNCERTAINTY_MS: f64 = 1.0;
const LOCK_STREAK_MINUTES: u32 = 5;
const MIN_SAMPLES_FOR_CONVERGE: u64 = 5;
const HOLDOVER_AFTER_SECS: f64 = 300.0;

pub struct FusionEngine {
    calibrations: HashMap<Station, StationCalibration>,
    recent: VecDeque<f64>,
    state: AnchorState,
    locked_streak: u32,
    last_measurement_utc: Option<f64>,
    last_fused_ms: Option<f64>,
    alpha: f64,
}

impl FusionEngine {
    pub fn new(alpha: f64) -> Self {
        Self {
            calibrations: HashMap::new(),
            recent: VecDeque::with_capacity(RECENT_WINDOW),
            state: AnchorState::Learn,
            locked_streak: 0,
            last_measurement_utc: None,
            last_fused_ms: None,
            alpha,
        }
    }

    pub fn state(&self) -> AnchorState {
        self.state
    }

    pub fn calibration(&self, station: Station) -> Option<&StationCalibration> {
        self.calibrations.get(&station)
    }

    /// Fold in every usable measurement observed this minute and return
    /// the fused clock estimate, or `None` if nothing was usable.
    pub fn fuse(&mut self, measurements: &[DClockMeasurement], now_utc: f64) -> Option<FusedClock> {
        let usable: Vec<&DClockMeasurement> = measurements
            .iter()
            .filter(|m| m.quality_grade.usable_for_fusion())
            .collect();

        if usable.is_empty() {
            self.advance_holdover(now_utc);
            return None;
        }

        self.last_measurement_utc = Some(now_utc);

        let mut weighted_sum = 0.0;
        let mut weight_sum = 0.0;
        let mut calibrated_values: Vec<StationContribution> = Vec::with_capacity(usable.len());

        for m in &usable {
            let cal = self
                .calibrations
                .entry(m.station)
                .or_insert_with(|| StationCalibration::new(m.station, self.alpha));
            cal.update(m.d_clock_ms);
            let calibrated = cal.calibrate(m.d_clock_ms);

            let snr_sigma = 1.0 / (1.0 + (-(m.snr_db - 10.0) / 5.0).exp());
            let weight =
                m.quality_grade.weight() * snr_sigma * (1.0 / m.uncertainty_ms.max(0.01))
                    * m.discrimination_confidence;

            weighted_sum += weight * calibrated;
            weight_sum += weight;
            calibrated_values.push(StationContribution {
                station: m.station,
                calibrated_d_clock_ms: calibrated,
                weight,
            });
        }

        if weight_sum <= 0.0 {
            return None;
        }

        let fused = weighted_sum / weight_sum;

        let residual_sq: f64 = calibrated_values
            .iter()
            .map(|c| c.weight * (c.calibrated_d_clock_ms - fused).powi(2))
            .sum();
        let uncertainty_ms =
            (residual_sq / weight_sum).sqrt() / (usable.len() as f64).sqrt();

        let anomaly = self.is_anomalous(fused, now_utc);

        self.update_state(&usable, uncertainty_ms, anomaly);

        if !anomaly {
            if self.recent.len() == RECENT_WINDOW {
                self.recent.pop_front();
            }
            self.recent.push_back(fused);
        }
        self.last_fused_ms = Some(fused);

        Some(FusedClock {
            utc: now_utc,
            d_clock_fused_ms: fused,
            uncertainty_ms,
            n_broadcasts: usable.len(),
            per_station_breakdown: calibrated_values,
            anchor_state: self.state,
        })
    }

    fn is_anomalous(&self, fused: f64, now_utc: f64) -> bool {
        if self.recent.len() >= 3 {
            let mean = self.recent.iter().sum::<f64>() / self.recent.len() as f64;
            let variance =
                self.recent.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / self.recent.len() as f64;
            let std = variance.sqrt();
            if std > 0.0 && (fused - mean).abs() > ANOMALY_SIGMA * std {
                return true;
            }
        }

        if let (Some(last), Some(last_utc)) = (self.last_fused_ms, self.last_measurement_utc) {
            let dt_sec = (now_utc - last_utc).max(1e-6);
            let rate_ppm = (fused - last).abs() / dt_sec / 1000.0 * 1_000_000.0;
            if rate_ppm > GPSDO_BOUND_PPM {
                return true;
            }
        }

        false
    }

    fn advance_holdover(&mut self, now_utc: f64) {
        if let Some(last) = self.last_measurement_utc {
            if now_utc - last > HOLDOVER_AFTER_SECS && self.state != AnchorState::Learn {
                self.state = AnchorState::Holdover;
                self.locked_streak = 0;
            }
        }
    }

    fn update_state(&mut self, usable: &[&DClockMeasurement], uncertainty_ms: f64, anomaly: bool) {
        if anomaly {
            self.state = AnchorState::Anomaly;
            self.locked_streak = 0;
            return;
        }

        let min_samples = self
            .calibrations
            .values()
            .map(|c| c.n_samples)
            .min()
            .unwrap_or(0);

        if min_samples < MIN_SAMPLES_FOR_CONVERGE || usable.is_empty() {
            self.state = AnchorState::Learn;
            self.locked_streak = 0;
            return;
        }

        if uncertainty_ms < LOCK_UNCERTAINTY_MS {
            self.locked_streak += 1;
        } else {
            self.locked_streak = 0;
        }

        self.state = if self.locked_streak >= LOCK_STREAK_MINUTES {
            AnchorState::Locked
        } else {
            AnchorState::Converge
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PropagationMode, QualityGrade};

    fn measurement(station: Station, d_clock_ms: f64, snr_db: f64) -> DClockMeasurement {
        DClockMeasurement {
            rtp_ts: 0,
            arrival_utc: 0.0,
            expected_utc: 0.0,
            propagation_mode: PropagationMode::Gw,
            propagation_delay_ms: 0.0,
            d_clock_ms,
            uncertainty_ms: 0.2,
            snr_db,
            quality_grade: QualityGrade::A,
            station,
            frequency_hz: 10_000_000,
            discrimination_confidence: 0.9,
        }
    }

    #[test]
    fn converges_toward_locked_with_stable_input() {
        let mut engine = FusionEngine::new(0.5);
        let mut last_state = AnchorState::Learn;
        for minute in 0..30 {
            let m = measurement(Station::Wwv, 2.5, 30.0);
            let m2 = measurement(Station::Wwvh, 2.5, 25.0);
            let m3 = measurement(Station::Chu, 2.5, 28.0);
            let fused = engine
                .fuse(&[m, m2, m3], minute as f64 * 60.0)
                .expect("usable measurements should fuse");
            assert!((fused.d_clock_fused_ms - 2.5).abs() < 1.0);
            last_state = fused.anchor_state;
        }
        assert_eq!(last_state, AnchorState::Locked);
    }

    #[test]
    fn no_measurements_eventually_enters_holdover() {
        let mut engine = FusionEngine::new(0.5);
        engine.fuse(&[measurement(Station::Wwv, 1.0, 30.0)], 0.0);
        let result = engine.fuse(&[], 1000.0);
        assert!(result.is_none());
        assert_eq!(engine.state(), AnchorState::Holdover);
    }
}
