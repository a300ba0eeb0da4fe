//! Mixdown export - sum every track into one normalized buffer
//!
//! Export only reads track state; it never touches cursors, play state or
//! the active ranges themselves.

use std::path::Path;

use crate::audio::{Codec, SampleBuffer};
use crate::error::{EditorError, Result};
use crate::track::Track;

/// One track's contribution, already gain-scaled
struct Stem {
    index: usize,
    samples: Vec<f32>,
    channels: u16,
    sample_rate: u32,
}

impl Stem {
    fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }
}

/// Combines tracks into a single file
pub struct MixExporter;

impl MixExporter {
    /// Build the normalized mixdown of all loaded tracks
    ///
    /// Shorter tracks are padded with trailing silence to the longest one,
    /// samples are summed, and the sum is divided by its peak magnitude
    /// (an all-silent mix is left as is).
    ///
    /// # Errors
    /// `NothingToExport` if no track has audio, `UnsupportedMix` if the
    /// tracks disagree on sample rate or on channel layout (mono tracks are
    /// spread across all channels of a multi-channel mix).
    pub fn mixdown(tracks: &[Track]) -> Result<SampleBuffer> {
        let stems: Vec<Stem> = tracks
            .iter()
            .filter_map(|track| {
                let active = track.active()?;
                Some(Stem {
                    index: track.index(),
                    samples: active.to_f32(track.gain()),
                    channels: active.channels(),
                    sample_rate: active.sample_rate(),
                })
            })
            .collect();

        let first = stems.first().ok_or(EditorError::NothingToExport)?;
        let sample_rate = first.sample_rate;
        let channels = stems.iter().map(|s| s.channels).max().unwrap_or(1);

        for stem in &stems {
            if stem.sample_rate != sample_rate {
                return Err(EditorError::UnsupportedMix(format!(
                    "track {} is {} Hz but track {} is {} Hz",
                    stem.index + 1,
                    stem.sample_rate,
                    first.index + 1,
                    sample_rate
                )));
            }
            if stem.channels != channels && stem.channels != 1 {
                return Err(EditorError::UnsupportedMix(format!(
                    "track {} has {} channels, mix has {}",
                    stem.index + 1,
                    stem.channels,
                    channels
                )));
            }
        }

        let frames = stems.iter().map(Stem::frames).max().unwrap_or(0);
        let width = channels as usize;
        let mut mix = vec![0.0f32; frames * width];

        for stem in &stems {
            if stem.channels == channels {
                for (dst, &src) in mix.iter_mut().zip(&stem.samples) {
                    *dst += src;
                }
            } else {
                // Mono into a wider mix: same sample on every channel
                for (frame, &src) in mix.chunks_mut(width).zip(&stem.samples) {
                    for dst in frame {
                        *dst += src;
                    }
                }
            }
        }

        let peak = mix.iter().fold(0.0f32, |peak, s| peak.max(s.abs()));
        if peak > 0.0 {
            for s in &mut mix {
                *s /= peak;
            }
        }

        SampleBuffer::from_f32(mix, channels, sample_rate)
    }

    /// Mix all loaded tracks and hand the result to the codec
    pub fn export_mix<C: Codec + ?Sized>(
        tracks: &[Track],
        codec: &C,
        path: &Path,
    ) -> Result<SampleBuffer> {
        let mix = Self::mixdown(tracks)?;
        codec.encode(&mix, path)?;
        log::info!(
            "Exported mix of {} frames to {}",
            mix.frames(),
            path.display()
        );
        Ok(mix)
    }
}
