//! Audio module - sample storage, file codecs and live output
//!
//! This module provides:
//! - Immutable sample buffers shared between threads
//! - File decoding/encoding (hound for WAV, symphonia for the rest)
//! - Output devices (cpal, or a manually pulled device)
//! - The per-track playback engine

mod buffer;
mod codec;
mod device;
mod engine;

// Re-export public types
pub use buffer::{SampleBuffer, SampleData};
pub use codec::{Codec, ExportFormat, FileCodec};
pub use device::{
    AudioOutput, CpalOutput, ManualOutput, OutputConnection, PullFn, PullStatus, StreamSpec,
};
pub use engine::{PlaybackEngine, PlaybackEvent};
