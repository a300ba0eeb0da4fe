//! samplifast - multi-track sample playback, trimming and mixdown
//!
//! A small editing engine: decode audio files into tracks, trim them by
//! time, play them on an output device at an adjustable gain, and export
//! a normalized mixdown. Edits can be undone and redone.

pub mod audio;
pub mod error;
pub mod history;
pub mod mix;
pub mod session;
pub mod settings;
pub mod track;
pub mod transport;
pub mod trim;

pub use audio::{Codec, FileCodec, SampleBuffer};
pub use error::{EditorError, Result};
pub use session::{Session, TrackEvent};
pub use settings::EngineSettings;
pub use track::{PlaybackState, Track};
