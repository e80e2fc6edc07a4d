//! Decode RTP payload bytes into complex I/Q samples.
//!
//! Two encodings are in use on the network: signed 16-bit interleaved I/Q
//! (scaled on decode) and 32-bit float interleaved I/Q (used as-is — its
//! amplitude sits roughly 30 dB below int16 full-scale, and that is
//! expected, not a bug).

use byteorder::{BigEndian, ByteOrder};

use crate::types::{Complex, SampleFormat};

pub fn decode(data: &[u8], format: SampleFormat) -> Vec<Complex> {
    match format {
        SampleFormat::Int16 => decode_int16(data),
        SampleFormat::Float32 => decode_float32(data),
    }
}

fn decode_int16(data: &[u8]) -> Vec<Complex> {
    let pair_count = data.len() / 4;
    let mut samples = Vec::with_capacity(pair_count);

    for idx in 0..pair_count {
        let off = idx * 4;
        let i_raw = BigEndian::read_i16(&data[off..off + 2]);
        let q_raw = BigEndian::read_i16(&data[off + 2..off + 4]);
        samples.push(Complex::new(
            i_raw as f32 / 32768.0,
            q_raw as f32 / 32768.0,
        ));
    }

    samples
}

fn decode_float32(data: &[u8]) -> Vec<Complex> {
    let pair_count = data.len() / 8;
    let mut samples = Vec::with_capacity(pair_count);

    for idx in 0..pair_count {
        let off = idx * 8;
        let i = BigEndian::read_f32(&data[off..off + 4]);
        let q = BigEndian::read_f32(&data[off + 4..off + 8]);
        samples.push(Complex::new(i, q));
    }

    samples
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int16_full_scale() {
        let mut data = vec![0u8; 4];
        BigEndian::write_i16(&mut data[0..2], i16::MAX);
        BigEndian::write_i16(&mut data[2..4], i16::MIN);
        let samples = decode(&data, SampleFormat::Int16);
        assert!((samples[0].i - 0.999969).abs() < 1e-4);
        assert!((samples[0].q - (-1.0)).abs() < 1e-4);
    }

    #[test]
    fn float32_passthrough() {
        let mut data = vec![0u8; 8];
        BigEndian::write_f32(&mut data[0..4], 0.25);
        BigEndian::write_f32(&mut data[4..8], -0.5);
        let samples = decode(&data, SampleFormat::Float32);
        assert_eq!(samples[0].i, 0.25);
        assert_eq!(samples[0].q, -0.5);
    }

    #[test]
    fn truncated_tail_is_dropped() {
        let data = vec![0u8; 5];
        let samples = decode(&data, SampleFormat::Int16);
        assert_eq!(samples.len(), 1);
    }
}
