//! C5: phase-invariant quadrature matched filter bank.
//!
//! Each station's timing tone is matched against both a sine and a cosine
//! reference of the same frequency and duration; the vector magnitude of
//! the two correlations is insensitive to the tone's received carrier
//! phase, which otherwise drifts with propagation path length. All
//! per-minute workspaces are sized once at construction and reused every
//! call — the correlation loop itself performs no allocation.

use rubato::{Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction};

use crate::types::{Complex, Station, StationFamily, ToneDetection, ToneOutcome};

const ENVELOPE_RATE_HZ: u32 = 3_000;
const SEARCH_WINDOW_MS: f64 = 500.0;
const NOISE_FLOOR_SIGMA: f64 = 2.5;

#[derive(Debug, Clone, Copy)]
pub struct ToneTemplate {
    pub station: Station,
    pub frequency_hz: f64,
    pub nominal_duration_sec: f64,
}

fn templates_for_family(family: StationFamily) -> Vec<ToneTemplate> {
    match family {
        StationFamily::WwvOnly => vec![ToneTemplate {
            station: Station::Wwv,
            frequency_hz: 1000.0,
            nominal_duration_sec: 0.8,
        }],
        StationFamily::WwvShared => vec![
            ToneTemplate {
                station: Station::Wwv,
                frequency_hz: 1000.0,
                nominal_duration_sec: 0.8,
            },
            ToneTemplate {
                station: Station::Wwvh,
                frequency_hz: 1200.0,
                nominal_duration_sec: 0.8,
            },
        ],
        StationFamily::Chu => vec![ToneTemplate {
            station: Station::Chu,
            frequency_hz: 1000.0,
            nominal_duration_sec: 0.5,
        }],
    }
}

struct Reference {
    template: ToneTemplate,
    sin_ref: Vec<f64>,
    cos_ref: Vec<f64>,
}

/// The per-channel reusable matched-filter workspace. "Tuning fork"
/// because it is built once to one family of stations and then struck
/// once a minute.
pub struct TuningFork {
    family: StationFamily,
    references: Vec<Reference>,
    input_sample_rate: u32,
    envelope_workspace: Vec<f64>,
    resampled_workspace: Vec<f64>,
}

impl TuningFork {
    pub fn new(family: StationFamily, input_sample_rate: u32) -> Self {
        let templates = templates_for_family(family);
        let references = templates
            .into_iter()
            .map(|template| build_reference(template))
            .collect();

        Self {
            family,
            references,
            input_sample_rate,
            envelope_workspace: Vec::new(),
            resampled_workspace: Vec::new(),
        }
    }

    pub fn family(&self) -> StationFamily {
        self.family
    }

    /// Runs the matched filter bank over one minute of IQ samples and
    /// returns one outcome per template this channel family carries.
    pub fn detect_minute(
        &mut self,
        minute_samples: &[Complex],
        minute_boundary_utc: f64,
    ) -> Vec<ToneOutcome> {
        self.envelope_workspace.clear();
        self.envelope_workspace
            .extend(minute_samples.iter().map(|s| s.magnitude() as f64));
        remove_mean(&mut self.envelope_workspace);

        resample_to_envelope_rate(
            &self.envelope_workspace,
            self.input_sample_rate,
            &mut self.resampled_workspace,
        );

        let audio = &self.resampled_workspace;
        let search_half_width =
            ((SEARCH_WINDOW_MS / 1000.0) * ENVELOPE_RATE_HZ as f64).round() as usize;
        let center = audio.len() / 2; // minute boundary is centered in a one-minute buffer

        self.references
            .iter()
            .map(|reference| {
                detect_one(reference, audio, center, search_half_width, minute_boundary_utc)
            })
            .collect()
    }
}

fn build_reference(template: ToneTemplate) -> Reference {
    let n = (template.nominal_duration_sec * ENVELOPE_RATE_HZ as f64).round() as usize;
    let mut sin_ref = Vec::with_capacity(n);
    let mut cos_ref = Vec::with_capacity(n);

    let omega = 2.0 * std::f64::consts::PI * template.frequency_hz / ENVELOPE_RATE_HZ as f64;
    let window = tukey_window(n, 0.2);

    for (k, w) in window.iter().enumerate() {
        let phase = omega * k as f64;
        sin_ref.push(phase.sin() * w);
        cos_ref.push(phase.cos() * w);
    }

    normalize_energy(&mut sin_ref);
    normalize_energy(&mut cos_ref);

    Reference {
        template,
        sin_ref,
        cos_ref,
    }
}

fn detect_one(
    reference: &Reference,
    audio: &[f64],
    center: usize,
    search_half_width: usize,
    minute_boundary_utc: f64,
) -> ToneOutcome {
    let template_len = reference.sin_ref.len();
    if audio.len() < template_len {
        return ToneOutcome::Absent;
    }

    let search_start = center.saturating_sub(search_half_width);
    let search_end = (center + search_half_width).min(audio.len().saturating_sub(template_len));

    if search_start >= search_end {
        return ToneOutcome::Absent;
    }

    let mut magnitudes = Vec::with_capacity(search_end - search_start);
    for start in search_start..search_end {
        let window = &audio[start..start + template_len];
        let c_sin = correlate(window, &reference.sin_ref);
        let c_cos = correlate(window, &reference.cos_ref);
        magnitudes.push((c_sin * c_sin + c_cos * c_cos).sqrt());
    }

    let (peak_idx, &peak_val) = magnitudes
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
        .unwrap();

    let (noise_mean, noise_std) = noise_floor_outside_window(audio, reference, search_start, search_end);
    let noise_floor = noise_mean + NOISE_FLOOR_SIGMA * noise_std;

    if peak_val <= noise_floor || peak_val <= 0.0 {
        return ToneOutcome::Absent;
    }

    let refined_offset = quadratic_interpolate(&magnitudes, peak_idx);
    let peak_position = search_start as f64 + peak_idx as f64 + refined_offset;

    let timing_error_ms = (peak_position - center as f64) / ENVELOPE_RATE_HZ as f64 * 1000.0;
    let snr_db = if noise_mean > 0.0 {
        20.0 * (peak_val / noise_mean).log10()
    } else {
        60.0
    };

    ToneOutcome::Detected(ToneDetection {
        station: reference.template.station,
        frequency_hz: reference.template.frequency_hz as u32,
        duration_sec: reference.template.nominal_duration_sec,
        timestamp_utc: minute_boundary_utc,
        timing_error_ms,
        snr_db,
        confidence: (peak_val / (peak_val + noise_floor)).clamp(0.0, 1.0),
        correlation_peak: peak_val,
        noise_floor: noise_mean,
        tone_power_db: None,
        use_for_time_snap: reference.template.station.use_for_time_snap(),
    })
}

fn noise_floor_outside_window(
    audio: &[f64],
    reference: &Reference,
    search_start: usize,
    search_end: usize,
) -> (f64, f64) {
    let template_len = reference.sin_ref.len();
    let mut samples = Vec::new();
    let stride = template_len.max(1);
    let mut start = 0;
    while start + template_len <= audio.len() {
        if start < search_start || start >= search_end {
            let window = &audio[start..start + template_len];
            let c_sin = correlate(window, &reference.sin_ref);
            let c_cos = correlate(window, &reference.cos_ref);
            samples.push((c_sin * c_sin + c_cos * c_cos).sqrt());
        }
        start += stride;
    }

    if samples.is_empty() {
        return (0.0, 0.0);
    }

    let mean = samples.iter().sum::<f64>() / samples.len() as f64;
    let variance = samples.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / samples.len() as f64;
    (mean, variance.sqrt())
}

fn correlate(window: &[f64], reference: &[f64]) -> f64 {
    window
        .iter()
        .zip(reference.iter())
        .map(|(a, b)| a * b)
        .sum()
}

fn quadratic_interpolate(values: &[f64], peak_idx: usize) -> f64 {
    if peak_idx == 0 || peak_idx + 1 >= values.len() {
        return 0.0;
    }
    let (y_m1, y_0, y_p1) = (values[peak_idx - 1], values[peak_idx], values[peak_idx + 1]);
    let denom = y_m1 - 2.0 * y_0 + y_p1;
    if denom.abs() < f64::EPSILON {
        return 0.0;
    }
    0.5 * (y_m1 - y_p1) / denom
}

fn remove_mean(samples: &mut [f64]) {
    if samples.is_empty() {
        return;
    }
    let mean = samples.iter().sum::<f64>() / samples.len() as f64;
    for s in samples.iter_mut() {
        *s -= mean;
    }
}

fn normalize_energy(samples: &mut [f64]) {
    let energy: f64 = samples.iter().map(|v| v * v).sum();
    if energy > 0.0 {
        let norm = energy.sqrt();
        for s in samples.iter_mut() {
            *s /= norm;
        }
    }
}

fn tukey_window(n: usize, alpha: f64) -> Vec<f64> {
    if n == 0 {
        return vec![];
    }
    let mut w = vec![1.0; n];
    let taper = (alpha * (n as f64 - 1.0) / 2.0).floor() as usize;
    for i in 0..taper.min(n) {
        let x = std::f64::consts::PI * (2.0 * i as f64 / (alpha * (n as f64 - 1.0)) - 1.0);
        let v = 0.5 * (1.0 + x.cos());
        w[i] = v;
        w[n - 1 - i] = v;
    }
    w
}

/// Decimates the envelope from the channel's native rate down to
/// `ENVELOPE_RATE_HZ`, reusing `out` as the destination buffer. Runs once
/// per minute, never on the per-sample hot path.
fn resample_to_envelope_rate(input: &[f64], input_rate: u32, out: &mut Vec<f64>) {
    out.clear();

    if input_rate == ENVELOPE_RATE_HZ {
        out.extend_from_slice(input);
        return;
    }

    let ratio = ENVELOPE_RATE_HZ as f64 / input_rate as f64;
    let params = SincInterpolationParameters {
        sinc_len: 128,
        f_cutoff: 0.9,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 128,
        window: WindowFunction::BlackmanHarris2,
    };

    let chunk_size = input.len().max(1);
    let Ok(mut resampler) = SincFixedIn::<f64>::new(ratio, 2.0, params, chunk_size, 1) else {
        // Resampler construction failure (degenerate chunk size) falls
        // back to naive decimation rather than losing the minute.
        naive_decimate(input, input_rate, out);
        return;
    };

    match resampler.process(&[input.to_vec()], None) {
        Ok(mut channels) => {
            out.extend(channels.remove(0));
        }
        Err(_) => naive_decimate(input, input_rate, out),
    }
}

fn naive_decimate(input: &[f64], input_rate: u32, out: &mut Vec<f64>) {
    let factor = (input_rate / ENVELOPE_RATE_HZ).max(1) as usize;
    out.extend(input.iter().step_by(factor).copied());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tukey_window_is_unity_in_middle_and_tapers_at_edges() {
        let w = tukey_window(1000, 0.2);
        assert!((w[500] - 1.0).abs() < 1e-9);
        assert!(w[0] < 0.1);
        assert!(w[999] < 0.1);
    }

    #[test]
    fn quadratic_interpolation_is_zero_at_symmetric_peak() {
        let values = vec![1.0, 2.0, 1.0];
        assert!((quadratic_interpolate(&values, 1)).abs() < 1e-9);
    }

    #[test]
    fn detects_synthetic_1000hz_burst_at_high_snr() {
        let mut fork = TuningFork::new(StationFamily::WwvOnly, ENVELOPE_RATE_HZ);
        let n = 60 * ENVELOPE_RATE_HZ as usize;
        let mut samples = vec![Complex::default(); n];
        let burst_start = n / 2;
        let burst_len = (0.8 * ENVELOPE_RATE_HZ as f64) as usize;
        for k in 0..burst_len {
            let phase = 2.0 * std::f64::consts::PI * 1000.0 * k as f64 / ENVELOPE_RATE_HZ as f64;
            samples[burst_start + k] = Complex::new(phase.sin() as f32, 0.0);
        }

        let outcomes = fork.detect_minute(&samples, 0.0);
        assert_eq!(outcomes.len(), 1);
        match &outcomes[0] {
            ToneOutcome::Detected(d) => {
                assert_eq!(d.station, Station::Wwv);
                assert!(d.snr_db > 10.0);
            }
            ToneOutcome::Absent => panic!("expected a detection at high SNR"),
        }
    }

    #[test]
    fn absent_on_pure_noise() {
        let mut fork = TuningFork::new(StationFamily::WwvOnly, ENVELOPE_RATE_HZ);
        let n = 60 * ENVELOPE_RATE_HZ as usize;
        // A flat-zero "noise" minute has no correlation peak anywhere.
        let samples = vec![Complex::default(); n];
        let outcomes = fork.detect_minute(&samples, 0.0);
        assert!(matches!(outcomes[0], ToneOutcome::Absent));
    }
}
