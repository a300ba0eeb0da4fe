//! Playback engine - streams one track to an output device
//!
//! The engine opens a device connection per play, hands the device a pull
//! callback, and closes the connection on stop. The callback only touches
//! the track's `TrackShared` half: it loads the active range once per
//! block, copies frames at the current gain, advances the cursor, and
//! reports end-of-stream through its return value.

use std::rc::Rc;
use std::sync::Arc;

use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use super::device::{AudioOutput, OutputConnection, PullFn, PullStatus, StreamSpec};
use crate::error::{EditorError, Result};
use crate::track::{Track, TrackShared};

/// Notifications sent from the audio thread to the control thread
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackEvent {
    /// The track played to the end of its active range and stopped
    Finished,
}

/// Room for pending events; one per play is all that is ever queued
const EVENT_QUEUE_SIZE: usize = 4;

/// Result of rendering one block
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BlockOutcome {
    /// Frames were delivered and more remain
    Rendered,
    /// The last frames were delivered; the track is now stopped
    EndOfData,
    /// The track was stopped from outside; block is silence
    Halted,
}

/// Fill one interleaved block from the track's active range
///
/// Runs on the audio thread. It never blocks, never allocates and never
/// panics: every read is bounds-checked against the range it loaded.
fn render_block(shared: &TrackShared, out: &mut [f32]) -> BlockOutcome {
    if !shared.is_playing() {
        out.fill(0.0);
        return BlockOutcome::Halted;
    }

    // One load per block: the whole block comes from a single range
    let active = shared.active();
    let Some(range) = &*active else {
        out.fill(0.0);
        shared.set_playing(false);
        return BlockOutcome::EndOfData;
    };

    let channels = range.channels() as usize;
    let frames = out.len() / channels;
    let cursor = shared.cursor().min(range.frames());

    let copied = range.read_frames(cursor, out, shared.gain());
    let new_cursor = cursor + copied;
    shared.set_cursor(new_cursor);

    if copied < frames || new_cursor >= range.frames() {
        shared.set_playing(false);
        BlockOutcome::EndOfData
    } else {
        BlockOutcome::Rendered
    }
}

/// Build the device callback for one play of a track
fn make_pull(shared: Arc<TrackShared>, mut events: HeapProd<PlaybackEvent>) -> PullFn {
    Box::new(move |out: &mut [f32]| match render_block(&shared, out) {
        BlockOutcome::Rendered => PullStatus::Continue,
        BlockOutcome::EndOfData => {
            // Queue full means a Finished is already pending
            let _ = events.try_push(PlaybackEvent::Finished);
            PullStatus::Complete
        }
        BlockOutcome::Halted => PullStatus::Complete,
    })
}

/// Owns the output connection for one track
pub struct PlaybackEngine {
    output: Rc<dyn AudioOutput>,
    block_size: u32,
    connection: Option<Box<dyn OutputConnection>>,
    events: Option<HeapCons<PlaybackEvent>>,
}

impl PlaybackEngine {
    /// Create an idle engine
    ///
    /// # Arguments
    /// * `output` - Device to open streams on
    /// * `block_size` - Frames requested per callback
    pub fn new(output: Rc<dyn AudioOutput>, block_size: u32) -> Self {
        Self {
            output,
            block_size: block_size.max(1),
            connection: None,
            events: None,
        }
    }

    /// Whether a device connection is currently held
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Start streaming a track
    ///
    /// Resumes from the current cursor, or from the start if the previous
    /// play ran to the end.
    ///
    /// # Errors
    /// `NoAudioLoaded`, `AlreadyPlaying`, or `DeviceError` if the stream
    /// cannot be opened.
    pub fn start(&mut self, track: &Track) -> Result<()> {
        let active = track
            .active()
            .ok_or(EditorError::NoAudioLoaded(track.index()))?;
        if track.is_playing() {
            return Err(EditorError::AlreadyPlaying(track.index()));
        }

        // A connection left over from a play that ran out
        self.release();

        let shared = track.shared();
        if shared.cursor() >= active.frames() {
            shared.set_cursor(0);
        }

        let spec = StreamSpec {
            sample_rate: active.sample_rate(),
            channels: active.channels(),
            block_size: self.block_size,
        };

        let (producer, consumer) = HeapRb::<PlaybackEvent>::new(EVENT_QUEUE_SIZE).split();

        // Playing before open so the first callback renders audio
        shared.set_playing(true);
        match self.output.open(spec, make_pull(Arc::clone(shared), producer)) {
            Ok(connection) => {
                self.connection = Some(connection);
                self.events = Some(consumer);
                log::info!(
                    "Track {}: playing from frame {} ({} ch @ {} Hz, block {})",
                    track.index() + 1,
                    shared.cursor(),
                    spec.channels,
                    spec.sample_rate,
                    spec.block_size
                );
                Ok(())
            }
            Err(e) => {
                shared.set_playing(false);
                log::error!("Track {}: failed to start: {}", track.index() + 1, e);
                Err(e)
            }
        }
    }

    /// Stop streaming a track
    ///
    /// Idempotent. The cursor stays where it is so the next start resumes.
    /// When this returns the device no longer calls back into the track.
    pub fn stop(&mut self, track: &Track) {
        let was_playing = track.is_playing();
        track.shared().set_playing(false);
        self.release();
        if was_playing {
            log::info!(
                "Track {}: stopped at frame {}",
                track.index() + 1,
                track.cursor()
            );
        }
    }

    /// Drain events from the audio thread
    ///
    /// Once a track has finished on its own, its connection is released
    /// here.
    pub fn poll_events(&mut self, track: &Track) -> Vec<PlaybackEvent> {
        let events: Vec<PlaybackEvent> = match self.events.as_mut() {
            Some(consumer) => std::iter::from_fn(|| consumer.try_pop()).collect(),
            None => Vec::new(),
        };

        if self.connection.is_some() && !track.is_playing() {
            self.release();
        }
        events
    }

    fn release(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.close();
        }
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{ManualOutput, SampleBuffer};
    use crate::track::PlaybackState;

    fn loaded_track(samples: Vec<f32>, channels: u16) -> Track {
        let mut track = Track::new(0, 1.0);
        track
            .load(SampleBuffer::from_f32(samples, channels, 1000).unwrap())
            .unwrap();
        track
    }

    fn engine(output: &ManualOutput, block_size: u32) -> PlaybackEngine {
        PlaybackEngine::new(Rc::new(output.clone()), block_size)
    }

    fn only_stream(output: &ManualOutput) -> usize {
        let ids = output.open_streams();
        assert_eq!(ids.len(), 1);
        ids[0]
    }

    #[test]
    fn test_start_without_audio() {
        let output = ManualOutput::new();
        let mut engine = engine(&output, 4);
        let track = Track::new(2, 1.0);

        assert!(matches!(
            engine.start(&track),
            Err(EditorError::NoAudioLoaded(2))
        ));
        assert!(output.open_streams().is_empty());
    }

    #[test]
    fn test_start_twice_is_already_playing() {
        let output = ManualOutput::new();
        let mut engine = engine(&output, 4);
        let track = loaded_track(vec![0.5; 16], 1);

        engine.start(&track).unwrap();
        assert!(matches!(
            engine.start(&track),
            Err(EditorError::AlreadyPlaying(0))
        ));
        assert_eq!(output.open_streams().len(), 1);
    }

    #[test]
    fn test_opens_stream_with_track_format() {
        let output = ManualOutput::new();
        let mut engine = engine(&output, 256);
        let track = loaded_track(vec![0.0; 20], 2);

        engine.start(&track).unwrap();

        let spec = output.spec(only_stream(&output)).unwrap();
        assert_eq!(spec.sample_rate, 1000);
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.block_size, 256);
        assert_eq!(track.state(), PlaybackState::Playing);
    }

    #[test]
    fn test_gain_applies_to_blocks() {
        let output = ManualOutput::new();
        let mut engine = engine(&output, 4);
        let track = loaded_track(vec![1.0; 16], 1);

        engine.start(&track).unwrap();
        let id = only_stream(&output);
        let (full, _) = output.pull(id, 4).unwrap();

        track.set_gain(0.5);
        let (half, _) = output.pull(id, 4).unwrap();

        assert_eq!(full, vec![1.0; 4]);
        assert_eq!(half, vec![0.5; 4]);
        for (h, f) in half.iter().zip(&full) {
            assert_eq!(*h, *f * 0.5);
        }
    }

    #[test]
    fn test_end_of_stream_pads_and_stops() {
        let output = ManualOutput::new();
        let mut engine = engine(&output, 4);
        let track = loaded_track(vec![1.0; 6], 1);

        engine.start(&track).unwrap();
        let id = only_stream(&output);

        let (block, status) = output.pull(id, 4).unwrap();
        assert_eq!(block, vec![1.0; 4]);
        assert_eq!(status, PullStatus::Continue);

        let (block, status) = output.pull(id, 4).unwrap();
        assert_eq!(block, vec![1.0, 1.0, 0.0, 0.0]);
        assert_eq!(status, PullStatus::Complete);
        assert_eq!(track.state(), PlaybackState::Stopped);
        assert_eq!(track.cursor(), 6);

        let events = engine.poll_events(&track);
        assert_eq!(events, vec![PlaybackEvent::Finished]);
        assert!(!engine.is_connected());
        assert!(output.open_streams().is_empty());
    }

    #[test]
    fn test_exact_fit_block_finishes() {
        let output = ManualOutput::new();
        let mut engine = engine(&output, 4);
        let track = loaded_track(vec![1.0; 4], 1);

        engine.start(&track).unwrap();
        let (block, status) = output.pull(only_stream(&output), 4).unwrap();

        assert_eq!(block, vec![1.0; 4]);
        assert_eq!(status, PullStatus::Complete);
        assert!(!track.is_playing());
    }

    #[test]
    fn test_stop_keeps_cursor_and_resumes() {
        let output = ManualOutput::new();
        let mut engine = engine(&output, 2);
        let samples: Vec<f32> = (0..8).map(|i| i as f32 / 10.0).collect();
        let track = loaded_track(samples, 1);

        engine.start(&track).unwrap();
        output.pull(only_stream(&output), 2).unwrap();
        engine.stop(&track);
        engine.stop(&track);

        assert_eq!(track.cursor(), 2);
        assert!(output.open_streams().is_empty());
        assert!(engine.poll_events(&track).is_empty());

        engine.start(&track).unwrap();
        let (block, _) = output.pull(only_stream(&output), 2).unwrap();
        assert!((block[0] - 0.2).abs() < 1e-6);
        assert!((block[1] - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_start_after_finish_restarts() {
        let output = ManualOutput::new();
        let mut engine = engine(&output, 4);
        let track = loaded_track(vec![1.0, 0.5], 1);

        engine.start(&track).unwrap();
        output.pull(only_stream(&output), 4).unwrap();
        assert!(track.at_end());

        // No poll in between: start must release the finished connection
        engine.start(&track).unwrap();
        assert_eq!(track.cursor(), 0);
        let (block, _) = output.pull(only_stream(&output), 4).unwrap();
        assert_eq!(block, vec![1.0, 0.5, 0.0, 0.0]);
    }

    #[test]
    fn test_halted_stream_outputs_silence_without_event() {
        let output = ManualOutput::new();
        let mut engine = engine(&output, 4);
        let track = loaded_track(vec![1.0; 16], 1);

        engine.start(&track).unwrap();
        let id = only_stream(&output);
        track.shared().set_playing(false);

        let (block, status) = output.pull(id, 4).unwrap();
        assert_eq!(block, vec![0.0; 4]);
        assert_eq!(status, PullStatus::Complete);
        assert_eq!(track.cursor(), 0);
        assert!(engine.poll_events(&track).is_empty());
    }

    #[test]
    fn test_int_pcm_is_normalized_before_gain() {
        use crate::audio::SampleData;

        let output = ManualOutput::new();
        let mut engine = engine(&output, 2);
        let mut track = Track::new(0, 0.5);
        let data = SampleData::Int {
            samples: vec![32767, 32767, 32767],
            bits_per_sample: 16,
        };
        track
            .load(SampleBuffer::new(data, 1, 8000).unwrap())
            .unwrap();

        engine.start(&track).unwrap();
        let (block, _) = output.pull(only_stream(&output), 2).unwrap();
        assert!((block[0] - 0.5).abs() < 1e-6);
        assert!((block[1] - 0.5).abs() < 1e-6);
    }
}
