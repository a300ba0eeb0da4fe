//! Track state - one loaded file plus its edit and playback state
//!
//! A track is split in two halves:
//! - `Track` lives on the control thread and owns the original buffer
//! - `TrackShared` is shared with the audio thread through `Arc` and only
//!   holds atomics plus the atomically swappable active range
//!
//! The audio callback never sees `Track` itself, so nothing it reads can
//! be mutated in place under it.

use std::ops::Range;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;

use crate::audio::SampleBuffer;
use crate::error::{EditorError, Result};

/// Playback state of a track
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Playing,
}

impl PlaybackState {
    pub fn is_playing(&self) -> bool {
        matches!(self, PlaybackState::Playing)
    }
}

/// The currently effective frame range of a track
///
/// Always a window over the untouched original buffer. A new range is
/// built for every load or trim and published whole.
#[derive(Clone, Debug)]
pub struct ActiveRange {
    buffer: Arc<SampleBuffer>,
    frames: Range<usize>,
}

impl ActiveRange {
    fn full(buffer: Arc<SampleBuffer>) -> Self {
        let frames = 0..buffer.frames();
        Self { buffer, frames }
    }

    /// The original buffer this range points into
    pub fn buffer(&self) -> &Arc<SampleBuffer> {
        &self.buffer
    }

    /// Frame range within the original buffer
    pub fn frame_range(&self) -> Range<usize> {
        self.frames.clone()
    }

    /// Number of frames in the range
    pub fn frames(&self) -> usize {
        self.frames.len()
    }

    pub fn channels(&self) -> u16 {
        self.buffer.channels()
    }

    pub fn sample_rate(&self) -> u32 {
        self.buffer.sample_rate()
    }

    /// Copy frames starting at `first_frame` (relative to the range) into
    /// `out`, scaled by `gain`
    ///
    /// Never reads past the end of the range; the remainder of `out` is
    /// silence. Returns the number of whole frames copied.
    pub fn read_frames(&self, first_frame: usize, out: &mut [f32], gain: f32) -> usize {
        let channels = self.channels() as usize;
        let available = self.frames().saturating_sub(first_frame);
        let wanted = (out.len() / channels).min(available);
        let samples = wanted * channels;

        let first_sample = (self.frames.start + first_frame) * channels;
        self.buffer
            .read_scaled(first_sample, &mut out[..samples], gain);
        out[samples..].fill(0.0);
        wanted
    }

    /// All samples of the range as float, scaled by `gain`
    pub fn to_f32(&self, gain: f32) -> Vec<f32> {
        let mut out = vec![0.0; self.frames() * self.channels() as usize];
        self.read_frames(0, &mut out, gain);
        out
    }
}

/// State shared between the control thread and the audio callback
///
/// Everything here is lock-free. The active range is published through a
/// single pointer swap so a reader sees either the old or the new range in
/// full.
pub struct TrackShared {
    active: ArcSwapOption<ActiveRange>,
    /// Gain stored as f32 bits
    gain: AtomicU32,
    cursor: AtomicUsize,
    playing: AtomicBool,
}

impl TrackShared {
    fn new(gain: f32) -> Self {
        Self {
            active: ArcSwapOption::empty(),
            gain: AtomicU32::new(gain.to_bits()),
            cursor: AtomicUsize::new(0),
            playing: AtomicBool::new(false),
        }
    }

    /// Current active range, loaded once
    pub fn active(&self) -> arc_swap::Guard<Option<Arc<ActiveRange>>> {
        self.active.load()
    }

    pub fn gain(&self) -> f32 {
        f32::from_bits(self.gain.load(Ordering::Relaxed))
    }

    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::Acquire)
    }

    pub(crate) fn set_cursor(&self, frame: usize) {
        self.cursor.store(frame, Ordering::Release);
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    pub(crate) fn set_playing(&self, playing: bool) {
        self.playing.store(playing, Ordering::Release);
    }
}

/// Copy of the small mutable part of a track, for undo/redo
///
/// The buffer itself is shared, not copied.
#[derive(Clone, Debug)]
pub struct TrackSnapshot {
    pub original: Option<Arc<SampleBuffer>>,
    pub trim: Option<Range<usize>>,
    pub gain: f32,
    pub cursor: usize,
}

impl PartialEq for TrackSnapshot {
    fn eq(&self, other: &Self) -> bool {
        let same_buffer = match (&self.original, &other.original) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        same_buffer && self.trim == other.trim && self.gain == other.gain && self.cursor == other.cursor
    }
}

/// One editable track
pub struct Track {
    index: usize,
    original: Option<Arc<SampleBuffer>>,
    shared: Arc<TrackShared>,
}

impl Track {
    /// Create an empty track
    pub fn new(index: usize, gain: f32) -> Self {
        Self {
            index,
            original: None,
            shared: Arc::new(TrackShared::new(clamp_gain(gain))),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Handle given to the playback engine's callback
    pub fn shared(&self) -> &Arc<TrackShared> {
        &self.shared
    }

    pub fn original(&self) -> Option<&Arc<SampleBuffer>> {
        self.original.as_ref()
    }

    pub fn has_audio(&self) -> bool {
        self.original.is_some()
    }

    /// The currently effective range, if any audio is loaded
    pub fn active(&self) -> Option<Arc<ActiveRange>> {
        self.shared.active.load_full()
    }

    pub fn state(&self) -> PlaybackState {
        if self.shared.is_playing() {
            PlaybackState::Playing
        } else {
            PlaybackState::Stopped
        }
    }

    pub fn is_playing(&self) -> bool {
        self.state().is_playing()
    }

    pub fn gain(&self) -> f32 {
        self.shared.gain()
    }

    /// Set the gain, clamped to [0.0, 1.0]
    ///
    /// Only affects samples read afterwards; stored samples never change.
    pub fn set_gain(&self, gain: f32) {
        self.shared
            .gain
            .store(clamp_gain(gain).to_bits(), Ordering::Relaxed);
    }

    pub fn cursor(&self) -> usize {
        self.shared.cursor()
    }

    pub fn sample_rate(&self) -> Option<u32> {
        self.original.as_ref().map(|b| b.sample_rate())
    }

    pub fn channels(&self) -> Option<u16> {
        self.original.as_ref().map(|b| b.channels())
    }

    /// Frames in the active range (0 when empty)
    pub fn frames(&self) -> usize {
        self.active().map(|a| a.frames()).unwrap_or(0)
    }

    /// Duration of the active range in seconds
    pub fn duration_secs(&self) -> f64 {
        match (self.active(), self.sample_rate()) {
            (Some(active), Some(rate)) => active.frames() as f64 / rate as f64,
            _ => 0.0,
        }
    }

    /// Playback position within the active range in seconds
    pub fn position_secs(&self) -> f64 {
        match self.sample_rate() {
            Some(rate) => self.cursor() as f64 / rate as f64,
            None => 0.0,
        }
    }

    /// Whether the cursor sits at the end of the active range
    pub fn at_end(&self) -> bool {
        self.has_audio() && self.cursor() >= self.frames()
    }

    /// Replace the track's audio with a freshly decoded buffer
    ///
    /// Discards any trim and resets the cursor. The track must be stopped.
    pub fn load(&mut self, buffer: SampleBuffer) -> Result<()> {
        self.ensure_stopped()?;
        if buffer.frames() == 0 {
            return Err(EditorError::InvalidAudioData("buffer is empty".to_string()));
        }

        let buffer = Arc::new(buffer);
        log::info!(
            "Track {}: loaded {} frames, {} ch @ {} Hz",
            self.index + 1,
            buffer.frames(),
            buffer.channels(),
            buffer.sample_rate()
        );
        self.publish(Some(ActiveRange::full(Arc::clone(&buffer))));
        self.original = Some(buffer);
        Ok(())
    }

    /// Publish a new active window over the original buffer
    ///
    /// The range must already be validated against the original length.
    pub(crate) fn set_active_frames(&mut self, frames: Range<usize>) -> Result<()> {
        self.ensure_stopped()?;
        let buffer = self
            .original
            .as_ref()
            .ok_or(EditorError::NoAudioLoaded(self.index))?;
        debug_assert!(frames.start < frames.end && frames.end <= buffer.frames());

        self.publish(Some(ActiveRange {
            buffer: Arc::clone(buffer),
            frames,
        }));
        Ok(())
    }

    /// Move the cursor back to the start of the active range
    pub fn rewind(&self) {
        if !self.is_playing() {
            self.shared.set_cursor(0);
        }
    }

    /// Capture the mutable state for history
    pub fn snapshot(&self) -> TrackSnapshot {
        let trim = self.active().and_then(|active| {
            let range = active.frame_range();
            let full = 0..active.buffer().frames();
            (range != full).then_some(range)
        });
        TrackSnapshot {
            original: self.original.clone(),
            trim,
            gain: self.gain(),
            cursor: self.cursor(),
        }
    }

    /// Restore a state captured by `snapshot`. The track must be stopped.
    pub fn restore(&mut self, snapshot: &TrackSnapshot) -> Result<()> {
        self.ensure_stopped()?;

        let active = snapshot.original.as_ref().map(|buffer| {
            let frames = snapshot
                .trim
                .clone()
                .filter(|r| r.start < r.end && r.end <= buffer.frames())
                .unwrap_or(0..buffer.frames());
            ActiveRange {
                buffer: Arc::clone(buffer),
                frames,
            }
        });
        let cursor = active
            .as_ref()
            .map(|a| snapshot.cursor.min(a.frames()))
            .unwrap_or(0);

        self.original = snapshot.original.clone();
        self.publish(active);
        self.shared.set_cursor(cursor);
        self.set_gain(snapshot.gain);
        Ok(())
    }

    fn ensure_stopped(&self) -> Result<()> {
        if self.is_playing() {
            Err(EditorError::AlreadyPlaying(self.index))
        } else {
            Ok(())
        }
    }

    /// Single atomic swap of the active range, then cursor reset
    fn publish(&self, active: Option<ActiveRange>) {
        self.shared.active.store(active.map(Arc::new));
        self.shared.set_cursor(0);
    }
}

fn clamp_gain(gain: f32) -> f32 {
    if gain.is_nan() {
        0.0
    } else {
        gain.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(frames: usize, channels: u16) -> SampleBuffer {
        let samples = (0..frames * channels as usize)
            .map(|i| i as f32 / 1000.0)
            .collect();
        SampleBuffer::from_f32(samples, channels, 1000).unwrap()
    }

    #[test]
    fn test_new_track_is_empty() {
        let track = Track::new(0, 1.0);
        assert!(!track.has_audio());
        assert!(track.active().is_none());
        assert_eq!(track.state(), PlaybackState::Stopped);
        assert_eq!(track.frames(), 0);
        assert!(!track.at_end());
    }

    #[test]
    fn test_load_sets_full_active_range() {
        let mut track = Track::new(0, 1.0);
        track.load(ramp(100, 2)).unwrap();

        let active = track.active().unwrap();
        assert_eq!(active.frame_range(), 0..100);
        assert_eq!(active.channels(), 2);
        assert_eq!(track.cursor(), 0);
        assert!((track.duration_secs() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_load_resets_cursor_and_trim() {
        let mut track = Track::new(0, 1.0);
        track.load(ramp(100, 1)).unwrap();
        track.set_active_frames(10..20).unwrap();
        track.shared().set_cursor(5);

        track.load(ramp(50, 1)).unwrap();

        assert_eq!(track.active().unwrap().frame_range(), 0..50);
        assert_eq!(track.cursor(), 0);
    }

    #[test]
    fn test_gain_is_clamped() {
        let track = Track::new(0, 1.0);
        track.set_gain(1.5);
        assert_eq!(track.gain(), 1.0);
        track.set_gain(-0.2);
        assert_eq!(track.gain(), 0.0);
        track.set_gain(f32::NAN);
        assert_eq!(track.gain(), 0.0);
        track.set_gain(0.25);
        assert_eq!(track.gain(), 0.25);
    }

    #[test]
    fn test_active_range_cannot_change_while_playing() {
        let mut track = Track::new(3, 1.0);
        track.load(ramp(100, 1)).unwrap();
        track.shared().set_playing(true);

        assert!(matches!(
            track.set_active_frames(0..10),
            Err(EditorError::AlreadyPlaying(3))
        ));
        assert!(matches!(
            track.load(ramp(10, 1)),
            Err(EditorError::AlreadyPlaying(3))
        ));
        assert_eq!(track.active().unwrap().frame_range(), 0..100);
    }

    #[test]
    fn test_old_range_survives_swap() {
        let mut track = Track::new(0, 1.0);
        track.load(ramp(100, 1)).unwrap();
        let held = track.shared().active();

        track.set_active_frames(50..60).unwrap();

        // A reader holding the old guard still sees the whole old range
        let old = (*held).as_ref().unwrap();
        assert_eq!(old.frames(), 100);
        assert_eq!(track.frames(), 10);
    }

    #[test]
    fn test_read_frames_stops_at_range_end() {
        let mut track = Track::new(0, 1.0);
        track.load(ramp(10, 1)).unwrap();
        track.set_active_frames(2..5).unwrap();
        let active = track.active().unwrap();

        let mut out = [9.0f32; 5];
        let frames = active.read_frames(1, &mut out, 1.0);

        assert_eq!(frames, 2);
        assert!((out[0] - 0.003).abs() < 1e-6);
        assert!((out[1] - 0.004).abs() < 1e-6);
        assert_eq!(&out[2..], &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_snapshot_restore() {
        let mut track = Track::new(0, 1.0);
        track.load(ramp(100, 1)).unwrap();
        track.set_active_frames(10..40).unwrap();
        track.set_gain(0.5);
        let snapshot = track.snapshot();
        assert_eq!(snapshot.trim, Some(10..40));

        track.load(ramp(20, 1)).unwrap();
        track.set_gain(1.0);
        track.restore(&snapshot).unwrap();

        assert_eq!(track.snapshot(), snapshot);
        assert_eq!(track.active().unwrap().frame_range(), 10..40);
        assert_eq!(track.gain(), 0.5);
    }

    #[test]
    fn test_restore_empty_snapshot_clears_track() {
        let empty = Track::new(0, 1.0).snapshot();
        let mut track = Track::new(0, 1.0);
        track.load(ramp(10, 1)).unwrap();

        track.restore(&empty).unwrap();

        assert!(!track.has_audio());
        assert!(track.active().is_none());
    }
}
