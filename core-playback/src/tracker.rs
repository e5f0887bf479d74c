//! # Position Tracker
//!
//! Playback time is derived from PCM bytes handed to the caller, not from
//! units decoded: staged bytes have not been heard yet.
//!
//! `position = offset + bytes_delivered / (bytes_per_frame * sample_rate)`

/// Elapsed time, post-seek baseline and running bitrate of a session.
#[derive(Debug, Clone)]
pub struct PositionTracker {
    offset: f64,
    bytes_since_offset: u64,
    bytes_per_second: f64,
    total: Option<f64>,
    bitrate_kbps: f64,
}

impl PositionTracker {
    pub fn new(bytes_per_frame: usize, sample_rate: u32) -> Self {
        Self {
            offset: 0.0,
            bytes_since_offset: 0,
            bytes_per_second: (bytes_per_frame as f64) * sample_rate as f64,
            total: None,
            bitrate_kbps: 0.0,
        }
    }

    /// Upper bound for [`Self::position`].
    pub fn set_total(&mut self, total: Option<f64>) {
        self.total = total;
    }

    /// Account for one decoded unit.
    pub fn record_unit(&mut self, consumed_bytes: u64, duration: f64) {
        if duration > 0.0 {
            self.bitrate_kbps = consumed_bytes as f64 * 8.0 / duration / 1000.0;
        }
    }

    /// Account for PCM bytes copied to the caller.
    pub fn record_delivered(&mut self, bytes: usize) {
        self.bytes_since_offset += bytes as u64;
    }

    /// Current playback time in seconds.
    pub fn position(&self) -> f64 {
        let elapsed = if self.bytes_per_second > 0.0 {
            self.bytes_since_offset as f64 / self.bytes_per_second
        } else {
            0.0
        };
        let position = (self.offset + elapsed).max(0.0);
        match self.total {
            Some(total) => position.min(total),
            None => position,
        }
    }

    /// Most recent per-unit bitrate in kbit/s.
    pub fn bitrate_kbps(&self) -> f64 {
        self.bitrate_kbps
    }

    /// Start counting from `target`.
    pub fn rebase(&mut self, target: f64) {
        self.offset = target;
        self.bytes_since_offset = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_from_delivered_bytes() {
        // 16-bit stereo at 44.1 kHz: 176400 bytes per second.
        let mut tracker = PositionTracker::new(4, 44100);
        tracker.record_delivered(176_400);
        tracker.record_delivered(88_200);
        assert!((tracker.position() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_rebase() {
        let mut tracker = PositionTracker::new(4, 44100);
        tracker.record_delivered(176_400);
        tracker.record_unit(400, 0.026);

        tracker.rebase(30.0);
        assert_eq!(tracker.position(), 30.0);
        tracker.record_delivered(88_200);
        assert!((tracker.position() - 30.5).abs() < 1e-9);
    }

    #[test]
    fn test_position_clamped_to_total() {
        let mut tracker = PositionTracker::new(2, 8000);
        tracker.set_total(Some(1.0));
        tracker.record_delivered(32_000);
        assert_eq!(tracker.position(), 1.0);
    }

    #[test]
    fn test_bitrate_per_unit() {
        let mut tracker = PositionTracker::new(4, 44100);
        // 417 byte MP3 frame of 1152 samples at 44.1 kHz.
        tracker.record_unit(417, 1152.0 / 44100.0);
        assert!((tracker.bitrate_kbps() - 127.7).abs() < 0.1);
    }

    #[test]
    fn test_zero_duration_unit_keeps_bitrate() {
        let mut tracker = PositionTracker::new(4, 44100);
        tracker.record_unit(1000, 0.5);
        tracker.record_unit(50, 0.0);
        assert_eq!(tracker.bitrate_kbps(), 16.0);
    }
}
