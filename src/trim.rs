//! Trimming - choose the active window of a track by time
//!
//! Every trim is computed against the untouched original buffer, so trims
//! never accumulate rounding and can always be undone by trimming wider.

use std::ops::Range;

use crate::audio::PlaybackEngine;
use crate::error::{EditorError, Result};
use crate::track::Track;

/// Convert a time window into a frame range over `total_frames` frames
///
/// Bounds are rounded to the nearest frame and clamped to the buffer.
///
/// # Errors
/// `InvalidRange` if the bounds are negative, not finite, out of order,
/// or round to an empty range.
pub fn frame_range(
    start_secs: f64,
    end_secs: f64,
    sample_rate: u32,
    total_frames: usize,
) -> Result<Range<usize>> {
    let invalid = || EditorError::InvalidRange {
        start: start_secs,
        end: end_secs,
    };

    if !start_secs.is_finite() || !end_secs.is_finite() {
        return Err(invalid());
    }
    if start_secs < 0.0 || end_secs < 0.0 || start_secs >= end_secs {
        return Err(invalid());
    }

    let to_frame = |secs: f64| {
        let frame = (secs * sample_rate as f64).round();
        (frame.max(0.0) as usize).min(total_frames)
    };
    let start = to_frame(start_secs);
    let end = to_frame(end_secs);

    if start >= end {
        return Err(invalid());
    }
    Ok(start..end)
}

/// Applies trims to tracks
pub struct TrimProcessor;

impl TrimProcessor {
    /// Trim a track to `[start_secs, end_secs)` of its original audio
    ///
    /// A playing track is stopped first and its device connection closed
    /// before the new range is published. The cursor goes back to 0.
    pub fn trim(
        track: &mut Track,
        engine: &mut PlaybackEngine,
        start_secs: f64,
        end_secs: f64,
    ) -> Result<Range<usize>> {
        let original = track
            .original()
            .ok_or(EditorError::NoAudioLoaded(track.index()))?;
        let range = frame_range(start_secs, end_secs, original.sample_rate(), original.frames())?;

        engine.stop(track);
        track.set_active_frames(range.clone())?;

        log::info!(
            "Track {}: trimmed to frames {}..{} ({:.3}s - {:.3}s)",
            track.index() + 1,
            range.start,
            range.end,
            start_secs,
            end_secs
        );
        Ok(range)
    }

    /// Restore the full original range
    pub fn reset(track: &mut Track, engine: &mut PlaybackEngine) -> Result<Range<usize>> {
        let frames = track
            .original()
            .ok_or(EditorError::NoAudioLoaded(track.index()))?
            .frames();

        engine.stop(track);
        track.set_active_frames(0..frames)?;
        Ok(0..frames)
    }
}
