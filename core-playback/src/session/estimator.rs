//! Length estimation for streams that do not state their duration.
//!
//! Headers are scanned until the stream ends (the sum is exact) or until the
//! configured cap; past the cap the scanned duration is extrapolated over the
//! rest of the payload:
//!
//! `total = elapsed * payload_size / payload_bytes_scanned`

use super::Decoder;
use crate::error::Result;
use crate::stream::MediaStream;
use crate::traits::DecodeMode;
use tracing::{debug, instrument, warn};

impl Decoder {
    /// Scan and rewind. Scan failures give `Ok(None)`; only a failed rewind is
    /// an error, since the session would be left mid-stream.
    #[instrument(skip(self), fields(backend = self.backend.name()))]
    pub(super) fn estimate_length(&mut self) -> Result<Option<f64>> {
        let cap = self.config.estimate_cap_secs;
        let mut elapsed = 0.0;
        let mut scanned: u64 = 0;
        let mut units: u64 = 0;

        let scan = loop {
            if elapsed >= cap {
                break Ok(false);
            }
            match self.next_unit(DecodeMode::HeadersOnly) {
                Ok(Some(unit)) => {
                    elapsed += unit.duration;
                    scanned += unit.source_bytes;
                    units += 1;
                }
                Ok(None) => break Ok(true),
                Err(e) => break Err(e),
            }
        };

        let estimate = match scan {
            Ok(true) => Some(elapsed),
            Ok(false) => self.extrapolate(elapsed, scanned),
            Err(e) => {
                warn!("Length scan failed after {} units: {}", units, e);
                None
            }
        };

        self.rewind()?;

        debug!(units, elapsed, scanned, estimate = ?estimate, "Length estimated");
        Ok(estimate)
    }

    fn extrapolate(&mut self, elapsed: f64, scanned: u64) -> Option<f64> {
        if scanned == 0 {
            return None;
        }
        let total_len = match self.stream.total_len() {
            Ok(len) => len,
            Err(e) => {
                warn!("Could not determine stream size: {}", e);
                return None;
            }
        };
        let payload = total_len.saturating_sub(self.backend.data_offset());
        Some(elapsed * payload as f64 / scanned as f64)
    }
}
