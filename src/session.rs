//! Editing session - the command surface used by a front end
//!
//! Owns the tracks, their playback engines, the codec and the undo
//! history. Every command is addressed by track index and reports failures
//! as `EditorError`; nothing here panics on bad input.

use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use crate::audio::{AudioOutput, Codec, PlaybackEvent, SampleBuffer};
use crate::error::{EditorError, Result};
use crate::history::HistoryManager;
use crate::mix::MixExporter;
use crate::settings::EngineSettings;
use crate::track::{PlaybackState, Track, TrackSnapshot};
use crate::transport::{TransportAction, TransportController};
use crate::trim::TrimProcessor;

/// Something the front end should react to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackEvent {
    /// Track reached the end of its active range and stopped
    Finished(usize),
}

/// A set of tracks plus everything needed to play and export them
pub struct Session {
    tracks: Vec<Track>,
    transport: TransportController,
    codec: Box<dyn Codec>,
    history: HistoryManager<Vec<TrackSnapshot>>,
    /// Track whose gain slider is being moved since the last recorded step
    gain_edit: Option<usize>,
    block_size: u32,
}

impl Session {
    /// Create a session with empty tracks
    pub fn new(
        settings: &EngineSettings,
        output: Rc<dyn AudioOutput>,
        codec: Box<dyn Codec>,
    ) -> Self {
        let tracks = (0..settings.track_count)
            .map(|i| Track::new(i, settings.default_gain))
            .collect();
        Self {
            tracks,
            transport: TransportController::new(output, settings.track_count, settings.block_size),
            codec,
            history: HistoryManager::new(settings.history_limit),
            gain_edit: None,
            block_size: settings.block_size.max(1),
        }
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Track by index, for rendering its waveform and state
    pub fn track(&self, index: usize) -> Result<&Track> {
        self.tracks.get(index).ok_or(EditorError::UnknownTrack(index))
    }

    /// Decode a file into a track
    ///
    /// Replaces whatever the track held before; stops it first if playing.
    pub fn load(&mut self, index: usize, path: &Path) -> Result<()> {
        self.track(index)?;
        let buffer = self.codec.decode(path)?;
        self.load_buffer(index, buffer)
    }

    /// Put an already decoded buffer into a track
    pub fn load_buffer(&mut self, index: usize, buffer: SampleBuffer) -> Result<()> {
        self.track(index)?;
        self.record();

        let engine = self.transport.engine_mut(index)?;
        let track = &mut self.tracks[index];
        engine.stop(track);
        track.load(buffer)
    }

    /// Set a track's gain from a 0-100 slider value
    ///
    /// Consecutive changes to the same track form one undo step.
    pub fn set_gain(&mut self, index: usize, percent: f32) -> Result<()> {
        self.track(index)?;
        if self.gain_edit != Some(index) {
            self.record();
            self.gain_edit = Some(index);
        }

        let track = &self.tracks[index];
        track.set_gain(percent / 100.0);
        log::debug!("Track {}: gain {:.2}", index + 1, track.gain());
        Ok(())
    }

    /// Trim a track to a time window of its original audio
    pub fn trim(&mut self, index: usize, start_secs: f64, end_secs: f64) -> Result<()> {
        let track = self.track(index)?;
        let original = track
            .original()
            .ok_or(EditorError::NoAudioLoaded(index))?;
        // Validate before recording so a rejected trim leaves no history
        crate::trim::frame_range(start_secs, end_secs, original.sample_rate(), original.frames())?;
        self.record();

        let engine = self.transport.engine_mut(index)?;
        TrimProcessor::trim(&mut self.tracks[index], engine, start_secs, end_secs)?;
        Ok(())
    }

    /// Undo a trim, going back to the full original
    pub fn reset_trim(&mut self, index: usize) -> Result<()> {
        let track = self.track(index)?;
        let frames = track
            .original()
            .ok_or(EditorError::NoAudioLoaded(index))?
            .frames();
        let trimmed = track
            .active()
            .is_some_and(|active| active.frame_range() != (0..frames));
        if trimmed {
            self.record();
        }

        let engine = self.transport.engine_mut(index)?;
        TrimProcessor::reset(&mut self.tracks[index], engine)?;
        Ok(())
    }

    /// Play/pause button of one track
    pub fn play_pause(&mut self, index: usize) -> Result<PlaybackState> {
        let track = self.tracks.get(index).ok_or(EditorError::UnknownTrack(index))?;
        self.transport.play_pause_one(track)
    }

    /// The "play all" button
    pub fn play_pause_all(&mut self) -> Result<TransportAction> {
        self.transport.play_pause_all(&self.tracks)
    }

    pub fn stop_all(&mut self) {
        self.transport.stop_all(&self.tracks);
    }

    /// Whether any track is playing
    pub fn is_playing(&self) -> bool {
        self.tracks.iter().any(Track::is_playing)
    }

    /// Write the normalized mixdown of all loaded tracks
    pub fn export_mix(&self, path: &Path) -> Result<SampleBuffer> {
        MixExporter::export_mix(&self.tracks, self.codec.as_ref(), path)
    }

    /// End-of-track notifications since the last poll
    pub fn poll_events(&mut self) -> Vec<TrackEvent> {
        self.transport
            .poll_events(&self.tracks)
            .into_iter()
            .map(|(index, event)| match event {
                PlaybackEvent::Finished => TrackEvent::Finished(index),
            })
            .collect()
    }

    /// Block until no track is playing
    ///
    /// Waits one more block so the last rendered audio reaches the device
    /// before the connections close, then returns every end-of-track event.
    pub fn wait_until_stopped(&mut self, poll_interval: Duration) -> Vec<TrackEvent> {
        while self.is_playing() {
            std::thread::sleep(poll_interval);
        }
        std::thread::sleep(self.block_duration());
        self.poll_events()
    }

    /// Play time of one output block at the slowest loaded sample rate
    pub fn block_duration(&self) -> Duration {
        match self.tracks.iter().filter_map(Track::sample_rate).min() {
            Some(rate) if rate > 0 => {
                Duration::from_secs_f64(self.block_size as f64 / rate as f64)
            }
            _ => Duration::ZERO,
        }
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Step back one edit. Stops playback.
    pub fn undo(&mut self) -> Result<()> {
        if !self.history.can_undo() {
            return Ok(());
        }
        self.stop_all();
        let current = self.snapshots();
        let restored = self.history.undo(current);
        self.apply(&restored)
    }

    /// Step forward one edit. Stops playback.
    pub fn redo(&mut self) -> Result<()> {
        if !self.history.can_redo() {
            return Ok(());
        }
        self.stop_all();
        let current = self.snapshots();
        let restored = self.history.redo(current);
        self.apply(&restored)
    }

    fn snapshots(&self) -> Vec<TrackSnapshot> {
        self.tracks.iter().map(Track::snapshot).collect()
    }

    fn record(&mut self) {
        let state = self.snapshots();
        self.history.snapshot(&state);
        self.gain_edit = None;
    }

    fn apply(&mut self, state: &[TrackSnapshot]) -> Result<()> {
        self.gain_edit = None;
        for (track, snapshot) in self.tracks.iter_mut().zip(state) {
            track.restore(snapshot)?;
        }
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop_all();
    }
}
