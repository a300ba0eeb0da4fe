//! Transport - play/pause for one track or all of them
//!
//! Holds one `PlaybackEngine` per track, all opening streams on the same
//! output device. Engines are independent: nothing keeps their cursors in
//! step.

use std::rc::Rc;

use crate::audio::{AudioOutput, PlaybackEngine, PlaybackEvent};
use crate::error::{EditorError, Result};
use crate::track::{PlaybackState, Track};

/// What a "play all" press did
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportAction {
    /// At least one track was playing, so every track was stopped
    StoppedAll,
    /// Nothing was playing; this many tracks were started
    Started(usize),
}

/// Coordinates start/stop across tracks
pub struct TransportController {
    engines: Vec<PlaybackEngine>,
}

impl TransportController {
    /// Create engines for `track_count` tracks on one output device
    pub fn new(output: Rc<dyn AudioOutput>, track_count: usize, block_size: u32) -> Self {
        let engines = (0..track_count)
            .map(|_| PlaybackEngine::new(Rc::clone(&output), block_size))
            .collect();
        Self { engines }
    }

    /// Engine for a track index
    pub fn engine_mut(&mut self, index: usize) -> Result<&mut PlaybackEngine> {
        self.engines
            .get_mut(index)
            .ok_or(EditorError::UnknownTrack(index))
    }

    /// Toggle one track between playing and stopped
    ///
    /// # Returns
    /// The track's state after the toggle
    pub fn play_pause_one(&mut self, track: &Track) -> Result<PlaybackState> {
        let engine = self.engine_mut(track.index())?;
        if track.is_playing() {
            engine.stop(track);
        } else {
            engine.start(track)?;
        }
        Ok(track.state())
    }

    /// One switch for every track
    ///
    /// If any track is playing, all tracks are stopped. Otherwise every
    /// track with audio is started. The decision is taken once, from the
    /// states at the time of the call.
    ///
    /// # Errors
    /// A failure to start one track does not prevent starting the others;
    /// the first failure is returned after all were attempted.
    pub fn play_pause_all(&mut self, tracks: &[Track]) -> Result<TransportAction> {
        let states: Vec<PlaybackState> = tracks.iter().map(Track::state).collect();

        if states.iter().any(PlaybackState::is_playing) {
            self.stop_all(tracks);
            log::info!("Transport: stopped all tracks");
            return Ok(TransportAction::StoppedAll);
        }

        let mut started = 0;
        let mut first_error = None;
        for track in tracks.iter().filter(|t| t.has_audio()) {
            let result = self
                .engine_mut(track.index())
                .and_then(|engine| engine.start(track));
            match result {
                Ok(()) => started += 1,
                Err(e) => {
                    log::warn!("Transport: track {} did not start: {}", track.index() + 1, e);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                log::info!("Transport: started {} track(s)", started);
                Ok(TransportAction::Started(started))
            }
        }
    }

    /// Stop every track
    pub fn stop_all(&mut self, tracks: &[Track]) {
        for track in tracks {
            if let Some(engine) = self.engines.get_mut(track.index()) {
                engine.stop(track);
            }
        }
    }

    /// Collect end-of-track events from every engine
    pub fn poll_events(&mut self, tracks: &[Track]) -> Vec<(usize, PlaybackEvent)> {
        let mut events = Vec::new();
        for track in tracks {
            if let Some(engine) = self.engines.get_mut(track.index()) {
                events.extend(
                    engine
                        .poll_events(track)
                        .into_iter()
                        .map(|event| (track.index(), event)),
                );
            }
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{ManualOutput, SampleBuffer};

    fn tracks_with_audio(count: usize, loaded: &[usize]) -> Vec<Track> {
        (0..count)
            .map(|i| {
                let mut track = Track::new(i, 1.0);
                if loaded.contains(&i) {
                    track
                        .load(SampleBuffer::from_f32(vec![0.25; 64], 1, 1000).unwrap())
                        .unwrap();
                }
                track
            })
            .collect()
    }

    fn transport(output: &ManualOutput, count: usize) -> TransportController {
        TransportController::new(Rc::new(output.clone()), count, 16)
    }

    #[test]
    fn test_play_pause_one_toggles() {
        let output = ManualOutput::new();
        let mut transport = transport(&output, 2);
        let tracks = tracks_with_audio(2, &[0, 1]);

        assert_eq!(
            transport.play_pause_one(&tracks[1]).unwrap(),
            PlaybackState::Playing
        );
        assert_eq!(output.open_streams().len(), 1);
        assert_eq!(
            transport.play_pause_one(&tracks[1]).unwrap(),
            PlaybackState::Stopped
        );
        assert!(output.open_streams().is_empty());
    }

    #[test]
    fn test_play_pause_one_empty_track() {
        let output = ManualOutput::new();
        let mut transport = transport(&output, 2);
        let tracks = tracks_with_audio(2, &[]);

        assert!(matches!(
            transport.play_pause_one(&tracks[0]),
            Err(EditorError::NoAudioLoaded(0))
        ));
    }

    #[test]
    fn test_play_all_starts_only_loaded_tracks() {
        let output = ManualOutput::new();
        let mut transport = transport(&output, 3);
        let tracks = tracks_with_audio(3, &[0, 2]);

        let action = transport.play_pause_all(&tracks).unwrap();

        assert_eq!(action, TransportAction::Started(2));
        assert!(tracks[0].is_playing());
        assert!(!tracks[1].is_playing());
        assert!(tracks[2].is_playing());
        assert_eq!(output.open_streams().len(), 2);
    }

    #[test]
    fn test_play_all_stops_everything_if_any_playing() {
        let output = ManualOutput::new();
        let mut transport = transport(&output, 2);
        let tracks = tracks_with_audio(2, &[0, 1]);
        transport.play_pause_one(&tracks[0]).unwrap();

        let action = transport.play_pause_all(&tracks).unwrap();

        assert_eq!(action, TransportAction::StoppedAll);
        assert!(!tracks[0].is_playing());
        // The stopped track is never started by this press
        assert!(!tracks[1].is_playing());
        assert!(output.open_streams().is_empty());
    }

    #[test]
    fn test_play_all_twice_toggles_back() {
        let output = ManualOutput::new();
        let mut transport = transport(&output, 2);
        let tracks = tracks_with_audio(2, &[0, 1]);

        transport.play_pause_all(&tracks).unwrap();
        transport.play_pause_all(&tracks).unwrap();

        assert!(tracks.iter().all(|t| !t.is_playing()));
    }

    #[test]
    fn test_poll_events_reports_finished_track() {
        let output = ManualOutput::new();
        let mut transport = transport(&output, 2);
        let tracks = tracks_with_audio(2, &[0, 1]);
        transport.play_pause_all(&tracks).unwrap();

        let ids = output.open_streams();
        output.pull(ids[1], 128).unwrap();

        let events = transport.poll_events(&tracks);
        assert_eq!(events, vec![(1, PlaybackEvent::Finished)]);
        assert!(tracks[0].is_playing());
        assert_eq!(output.open_streams(), vec![ids[0]]);
    }
}
