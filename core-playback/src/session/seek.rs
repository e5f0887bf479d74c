//! Seek translation: caller time to backend repositioning.

use super::{Decoder, Phase};
use crate::error::{PlaybackError, Result};
use crate::traits::SeekTarget;
use std::io::{Seek, SeekFrom};
use tracing::{debug, info, instrument, warn};

impl Decoder {
    /// Move playback to `offset` seconds, or `offset` seconds from the
    /// current time when `relative` is set. Returns the new time.
    ///
    /// On success all staged PCM and buffered input are dropped and
    /// [`Self::time`] equals the target. An ended stream can be sought again.
    ///
    /// # Errors
    ///
    /// - [`PlaybackError::OutOfRange`] for a negative or non-finite target, or
    ///   one past a known length; the session is untouched
    /// - [`PlaybackError::SessionTerminated`] after a fatal decode error
    /// - the backend's error when it cannot reposition; the stream is put
    ///   back where it was and the session is untouched
    #[instrument(skip(self), fields(backend = self.backend.name()))]
    pub fn seek(&mut self, offset: f64, relative: bool) -> Result<f64> {
        if matches!(self.phase, Phase::Fatal) {
            return Err(PlaybackError::SessionTerminated);
        }

        let target = if relative { self.time() + offset } else { offset };
        let past_end = self.total_duration.map_or(false, |total| target > total);
        if !target.is_finite() || target < 0.0 || past_end {
            debug!(target, length = ?self.total_duration, "Seek target out of range");
            return Err(PlaybackError::OutOfRange {
                target,
                length: self.total_duration,
            });
        }

        let saved = self.stream.stream_position()?;
        let native = SeekTarget::new(target, self.props.sample_rate, self.total_duration);

        if let Err(e) = self.backend.seek(&mut self.stream, native) {
            warn!(target, "Backend seek failed: {}", e);
            if let Err(restore) = self.stream.seek(SeekFrom::Start(saved)) {
                warn!("Could not restore stream position {}: {}", saved, restore);
            }
            return Err(e);
        }

        self.staging.clear();
        self.window.discard();
        self.tracker.rebase(target);
        self.phase = Phase::NeedInput;

        info!(target, frame = native.frame, "Seek completed");
        Ok(target)
    }

    /// Put the session back at the first unit, as right after open.
    pub(super) fn rewind(&mut self) -> Result<()> {
        self.backend.seek(&mut self.stream, SeekTarget::start())?;
        self.staging.clear();
        self.window.discard();
        self.tracker.rebase(0.0);
        self.phase = Phase::NeedInput;
        Ok(())
    }
}
