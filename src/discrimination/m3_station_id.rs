//! M3: the 440 Hz station-identification tone. WWVH transmits it at
//! minute 1; WWV transmits it at minute 2. Applied only on those two
//! minutes — everywhere else this method abstains outright.

use crate::types::DominantStation;

use super::{goertzel_power, Method, MethodVote, MinuteContext};

pub struct StationIdMethod;

const WEIGHT: f64 = 15.0;
const TONE_FREQ_HZ: f64 = 440.0;
const PRESENCE_THRESHOLD: f64 = 0.05;

impl Method for StationIdMethod {
    fn name(&self) -> &'static str {
        "M3_station_id_440hz"
    }

    fn weight(&self) -> f64 {
        WEIGHT
    }

    fn analyze(&self, ctx: &MinuteContext) -> MethodVote {
        let expected_station = match ctx.minute_of_hour {
            1 => Some(DominantStation::Wwvh),
            2 => Some(DominantStation::Wwv),
            _ => None,
        };

        let Some(expected_station) = expected_station else {
            return MethodVote::abstain();
        };

        if ctx.samples.is_empty() {
            return MethodVote::abstain();
        }

        let envelope: Vec<f32> = ctx.samples.iter().map(|s| s.magnitude()).collect();
        let power = goertzel_power(&envelope, ctx.sample_rate, TONE_FREQ_HZ);
        let reference_power = envelope.iter().map(|s| s * s).sum::<f32>() as f64 / envelope.len() as f64;

        if reference_power <= 0.0 || power / reference_power < PRESENCE_THRESHOLD {
            return MethodVote::abstain();
        }

        MethodVote {
            station: Some(expected_station),
            weight: WEIGHT,
            metric: Some(power),
        }
    }
}
