//! Error kinds reported by the editor engine
//!
//! Every load/trim/transport/export operation returns one of these.
//! None of them is fatal: the caller shows the message and carries on.

use thiserror::Error;

/// Errors that can occur while editing, playing or exporting tracks
#[derive(Error, Debug)]
pub enum EditorError {
    #[error("Invalid audio data: {0}")]
    InvalidAudioData(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to decode audio: {0}")]
    DecodeError(String),

    #[error("Invalid trim range: {start}s to {end}s")]
    InvalidRange { start: f64, end: f64 },

    #[error("Track {0} has no audio loaded")]
    NoAudioLoaded(usize),

    #[error("Track {0} is already playing")]
    AlreadyPlaying(usize),

    #[error("Audio device error: {0}")]
    DeviceError(String),

    #[error("Nothing to export - load at least one track")]
    NothingToExport,

    #[error("Failed to encode audio: {0}")]
    EncodeError(String),

    #[error("Tracks cannot be mixed: {0}")]
    UnsupportedMix(String),

    #[error("No track with index {0}")]
    UnknownTrack(usize),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, EditorError>;
