//! C7: for each timing detection usable as a reference, scores the
//! candidate ionospheric propagation modes, picks the best-fit one, and
//! derives `D_clock` — the receiver's offset from UTC(NIST) once the
//! modeled propagation delay is subtracted back out.

use crate::types::{DClockMeasurement, PropagationMode, QualityGrade, Station, ToneDetection};

const SPEED_OF_LIGHT_KM_PER_MS: f64 = 299.792458;
const E_LAYER_HEIGHT_KM: f64 = 110.0;
const F_LAYER_HEIGHT_KM: f64 = 300.0;
const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Debug, Clone, Copy)]
struct ModeCandidate {
    mode: PropagationMode,
    hops: u32,
    height_km: f64,
}

const CANDIDATES: [ModeCandidate; 5] = [
    ModeCandidate {
        mode: PropagationMode::Gw,
        hops: 0,
        height_km: 0.0,
    },
    ModeCandidate {
        mode: PropagationMode::OneE,
        hops: 1,
        height_km: E_LAYER_HEIGHT_KM,
    },
    ModeCandidate {
        mode: PropagationMode::OneF,
        hops: 1,
        height_km: F_LAYER_HEIGHT_KM,
    },
    ModeCandidate {
        mode: PropagationMode::TwoF,
        hops: 2,
        height_km: F_LAYER_HEIGHT_KM,
    },
    ModeCandidate {
        mode: PropagationMode::ThreeF,
        hops: 3,
        height_km: F_LAYER_HEIGHT_KM,
    },
];

/// Transmitter site coordinates. Physically invariant, so this is the one
/// reference table the solver owns outright.
pub fn transmitter_coordinates(station: Station) -> (f64, f64) {
    match station {
        Station::Wwv => (40.6776, -105.0461), // Fort Collins, CO
        Station::Wwvh => (21.9811, -159.7650), // Kekaha, HI
        Station::Chu => (45.2980, -75.7527),   // Ottawa, ON
    }
}

pub fn great_circle_distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (lat1, lon1, lat2, lon2) = (
        lat1.to_radians(),
        lon1.to_radians(),
        lat2.to_radians(),
        lon2.to_radians(),
    );
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();
    EARTH_RADIUS_KM * c
}

fn mode_delay_ms(distance_km: f64, candidate: &ModeCandidate) -> f64 {
    if candidate.hops == 0 {
        return distance_km / SPEED_OF_LIGHT_KM_PER_MS;
    }
    let n = candidate.hops as f64;
    let slant = 2.0 * n * ((distance_km / (2.0 * n)).powi(2) + candidate.height_km.powi(2)).sqrt();
    slant / SPEED_OF_LIGHT_KM_PER_MS
}

/// `hour_utc` in [0, 24) at the receiving site, used to suppress E-layer
/// modes by day and favour multi-hop F modes by night.
fn time_of_day_factor(mode: PropagationMode, hour_utc: f64) -> f64 {
    let is_night = !(6.0..18.0).contains(&hour_utc);
    match mode {
        PropagationMode::OneE if is_night => -2.0,
        PropagationMode::TwoF | PropagationMode::ThreeF if is_night => 1.0,
        _ => 0.0,
    }
}

fn hop_snr_bias(hops: u32, snr_db: f64) -> f64 {
    // Higher SNR favours fewer hops; at low SNR the bias flattens out.
    let snr_term = (snr_db / 10.0).clamp(0.0, 4.0);
    -(hops as f64) * snr_term * 0.3
}

pub struct TransmissionTimeSolver {
    receiver_lat: f64,
    receiver_lon: f64,
}

impl TransmissionTimeSolver {
    pub fn new(receiver_lat: f64, receiver_lon: f64) -> Self {
        Self {
            receiver_lat,
            receiver_lon,
        }
    }

    pub fn solve(&self, detection: &ToneDetection, hour_utc: f64) -> DClockMeasurement {
        let (tx_lat, tx_lon) = transmitter_coordinates(detection.station);
        let distance_km =
            great_circle_distance_km(self.receiver_lat, self.receiver_lon, tx_lat, tx_lon);

        let mut scored: Vec<(ModeCandidate, f64, f64)> = CANDIDATES
            .iter()
            .map(|candidate| {
                let delay = mode_delay_ms(distance_km, candidate);
                let residual = detection.timing_error_ms - delay;
                let fit_score = -residual * residual * 0.01;
                let score = fit_score
                    + hop_snr_bias(candidate.hops, detection.snr_db)
                    + time_of_day_factor(candidate.mode, hour_utc);
                (*candidate, delay, score)
            })
            .collect();

        scored.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap());
        let (best, best_delay, best_score) = scored[0];
        let second_score = scored.get(1).map(|s| s.2).unwrap_or(best_score - 1.0);

        let score_ratio = if second_score.abs() > 1e-9 {
            (best_score / second_score).abs()
        } else {
            f64::INFINITY
        };

        let quality_grade = grade(detection.snr_db, score_ratio);

        let d_clock_ms = detection.timing_error_ms - best_delay;
        let uncertainty_ms = combined_uncertainty(detection.snr_db, score_ratio);

        DClockMeasurement {
            rtp_ts: 0,
            arrival_utc: detection.timestamp_utc,
            expected_utc: detection.timestamp_utc - detection.timing_error_ms / 1000.0,
            propagation_mode: best.mode,
            propagation_delay_ms: best_delay,
            d_clock_ms,
            uncertainty_ms,
            snr_db: detection.snr_db,
            quality_grade,
            station: detection.station,
            frequency_hz: detection.frequency_hz,
            discrimination_confidence: detection.confidence,
        }
    }
}

fn grade(snr_db: f64, score_ratio: f64) -> QualityGrade {
    if snr_db >= 30.0 && score_ratio >= 3.0 {
        QualityGrade::A
    } else if snr_db >= 20.0 && score_ratio >= 2.0 {
        QualityGrade::B
    } else if snr_db >= 10.0 {
        QualityGrade::C
    } else if snr_db > 0.0 {
        QualityGrade::D
    } else {
        QualityGrade::F
    }
}

fn combined_uncertainty(snr_db: f64, score_ratio: f64) -> f64 {
    let tone_precision_ms = 0.1;
    let mode_residual_ms = (4.0 / score_ratio.max(0.5)).min(5.0);
    let dispersion_ms = (20.0 / snr_db.max(1.0)).min(3.0);
    (tone_precision_ms.powi(2) + mode_residual_ms.powi(2) + dispersion_ms.powi(2)).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Station;

    #[test]
    fn ground_wave_delay_matches_speed_of_light() {
        let candidate = ModeCandidate {
            mode: PropagationMode::Gw,
            hops: 0,
            height_km: 0.0,
        };
        let delay = mode_delay_ms(299.792458, &candidate);
        assert!((delay - 1.0).abs() < 1e-9);
    }

    #[test]
    fn solver_picks_ground_wave_for_local_low_delay_station() {
        let solver = TransmissionTimeSolver::new(40.6776, -105.0461); // co-located with WWV
        let detection = ToneDetection {
            station: Station::Wwv,
            frequency_hz: 1000,
            duration_sec: 0.8,
            timestamp_utc: 1000.0,
            timing_error_ms: 0.01,
            snr_db: 35.0,
            confidence: 0.95,
            correlation_peak: 10.0,
            noise_floor: 0.1,
            tone_power_db: None,
            use_for_time_snap: true,
        };
        let measurement = solver.solve(&detection, 12.0);
        assert_eq!(measurement.propagation_mode, PropagationMode::Gw);
        assert_eq!(measurement.quality_grade, QualityGrade::A);
    }
}
