//! C2: the authoritative RTP timestamp → absolute UTC mapping for one SSRC
//! epoch.
//!
//! The anchor is set once per epoch and never adjusted; segmentation
//! boundaries derived from it therefore never jitter with wall-clock NTP
//! corrections. A stream interruption beyond the catastrophic threshold
//! discards the epoch (see `resequencer.rs`); the next packet bootstraps a
//! fresh one.

use crate::types::RtpToUtc;

impl RtpToUtc {
    pub fn bootstrap(rtp_ts: u32, sys_utc: f64, sample_rate: u32) -> Self {
        Self {
            anchor_rtp: rtp_ts,
            anchor_utc: sys_utc,
            sample_rate,
        }
    }

    pub fn to_utc(&self, rtp_ts: u32) -> f64 {
        let diff = rtp_ts.wrapping_sub(self.anchor_rtp) as i32;
        self.anchor_utc + diff as f64 / self.sample_rate as f64
    }

    /// Inverse mapping, used to align minute boundaries.
    pub fn sample_index_for_utc(&self, utc: f64) -> i64 {
        ((utc - self.anchor_utc) * self.sample_rate as f64).round() as i64
    }

    pub fn minute_boundary_utc(&self, utc: f64) -> i64 {
        (utc / 60.0).floor() as i64 * 60
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversion_is_linear_within_epoch() {
        let tb = RtpToUtc::bootstrap(1000, 100.0, 20_000);
        assert!((tb.to_utc(1000) - 100.0).abs() < 1e-9);
        assert!((tb.to_utc(21000) - 101.0).abs() < 1e-9);
    }

    #[test]
    fn conversion_is_wrap_safe() {
        let tb = RtpToUtc::bootstrap(u32::MAX - 999, 100.0, 20_000);
        let t1 = tb.to_utc(u32::MAX - 999);
        let t2 = tb.to_utc(999); // wraps past u32::MAX
        // 2000 samples later at 20kHz = 0.1s
        assert!((t2 - t1 - 0.1).abs() < 1e-6);
    }

    #[test]
    fn minute_boundaries_are_60s_aligned() {
        let tb = RtpToUtc::bootstrap(0, 125.0, 20_000);
        assert_eq!(tb.minute_boundary_utc(125.0), 120);
        assert_eq!(tb.minute_boundary_utc(180.0), 180);
    }
}
