//! Sample storage for loaded audio
//!
//! A `SampleBuffer` holds the decoded samples of one file exactly as the
//! codec produced them. It is immutable once built and shared through
//! `Arc`, so the audio thread, history snapshots and the mix exporter can
//! all hold it without copying.
//!
//! ## Design Notes
//!
//! Integer PCM stays integer in memory. Conversion to float happens at
//! read time, one sample at a time, straight into the caller's output
//! slice. That keeps the read path allocation-free for the audio thread.

use crate::error::{EditorError, Result};

/// Decoded sample data, interleaved when there is more than one channel
#[derive(Clone, Debug, PartialEq)]
pub enum SampleData {
    /// Floating point samples, nominally in [-1.0, 1.0]
    Float(Vec<f32>),
    /// Integer PCM samples with their original bit depth
    Int {
        samples: Vec<i32>,
        bits_per_sample: u16,
    },
}

impl SampleData {
    /// Number of individual samples (not frames)
    pub fn len(&self) -> usize {
        match self {
            SampleData::Float(samples) => samples.len(),
            SampleData::Int { samples, .. } => samples.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Largest positive value representable at the given integer bit depth
fn int_full_scale(bits_per_sample: u16) -> f32 {
    let bits = bits_per_sample.clamp(2, 32) as u32;
    ((1i64 << (bits - 1)) - 1) as f32
}

/// Immutable audio data plus its format
#[derive(Clone, Debug, PartialEq)]
pub struct SampleBuffer {
    data: SampleData,
    channels: u16,
    sample_rate: u32,
}

impl SampleBuffer {
    /// Build a buffer, validating that it can be played
    ///
    /// # Errors
    /// `InvalidAudioData` if the data is empty, the rate or channel count
    /// is zero, or the sample count is not a whole number of frames.
    pub fn new(data: SampleData, channels: u16, sample_rate: u32) -> Result<Self> {
        if data.is_empty() {
            return Err(EditorError::InvalidAudioData("buffer is empty".to_string()));
        }
        if sample_rate == 0 {
            return Err(EditorError::InvalidAudioData(
                "sample rate must be positive".to_string(),
            ));
        }
        if channels == 0 {
            return Err(EditorError::InvalidAudioData(
                "channel count must be positive".to_string(),
            ));
        }
        if data.len() % channels as usize != 0 {
            return Err(EditorError::InvalidAudioData(format!(
                "{} samples do not divide into {} channels",
                data.len(),
                channels
            )));
        }
        if let SampleData::Int { bits_per_sample, .. } = data {
            if !(2..=32).contains(&bits_per_sample) {
                return Err(EditorError::InvalidAudioData(format!(
                    "unsupported bit depth {}",
                    bits_per_sample
                )));
            }
        }

        Ok(Self {
            data,
            channels,
            sample_rate,
        })
    }

    /// Convenience constructor for float samples
    pub fn from_f32(samples: Vec<f32>, channels: u16, sample_rate: u32) -> Result<Self> {
        Self::new(SampleData::Float(samples), channels, sample_rate)
    }

    pub fn data(&self) -> &SampleData {
        &self.data
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of frames (one sample per channel)
    pub fn frames(&self) -> usize {
        self.data.len() / self.channels as usize
    }

    /// Length in seconds
    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Read one sample as float in [-1.0, 1.0]
    ///
    /// Integer PCM is divided by the format's maximum positive magnitude.
    /// Returns silence for out-of-range indices.
    pub fn sample_f32(&self, index: usize) -> f32 {
        match &self.data {
            SampleData::Float(samples) => samples.get(index).copied().unwrap_or(0.0),
            SampleData::Int {
                samples,
                bits_per_sample,
            } => samples
                .get(index)
                .map(|&s| (s as f32 / int_full_scale(*bits_per_sample)).clamp(-1.0, 1.0))
                .unwrap_or(0.0),
        }
    }

    /// Copy samples starting at `first_sample` into `out`, scaled by `gain`
    ///
    /// Called from the audio thread: no allocation, no locking. Any part
    /// of `out` past the end of the data is filled with silence.
    ///
    /// # Returns
    /// The number of samples actually copied from the buffer
    pub fn read_scaled(&self, first_sample: usize, out: &mut [f32], gain: f32) -> usize {
        let copied = match &self.data {
            SampleData::Float(samples) => {
                let src = samples.get(first_sample..).unwrap_or(&[]);
                let n = src.len().min(out.len());
                for (dst, &s) in out[..n].iter_mut().zip(src) {
                    *dst = s * gain;
                }
                n
            }
            SampleData::Int {
                samples,
                bits_per_sample,
            } => {
                let scale = int_full_scale(*bits_per_sample);
                let src = samples.get(first_sample..).unwrap_or(&[]);
                let n = src.len().min(out.len());
                for (dst, &s) in out[..n].iter_mut().zip(src) {
                    *dst = (s as f32 / scale).clamp(-1.0, 1.0) * gain;
                }
                n
            }
        };

        out[copied..].fill(0.0);
        copied
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_empty_and_bad_format() {
        assert!(matches!(
            SampleBuffer::from_f32(Vec::new(), 1, 44100),
            Err(EditorError::InvalidAudioData(_))
        ));
        assert!(matches!(
            SampleBuffer::from_f32(vec![0.0; 4], 1, 0),
            Err(EditorError::InvalidAudioData(_))
        ));
        assert!(matches!(
            SampleBuffer::from_f32(vec![0.0; 3], 2, 44100),
            Err(EditorError::InvalidAudioData(_))
        ));
    }

    #[test]
    fn test_frames_and_duration() {
        let buffer = SampleBuffer::from_f32(vec![0.0; 2000], 2, 1000).unwrap();
        assert_eq!(buffer.frames(), 1000);
        assert!((buffer.duration_secs() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_int_samples_normalize_to_unit_range() {
        let data = SampleData::Int {
            samples: vec![32767, -32768, 0, 16384],
            bits_per_sample: 16,
        };
        let buffer = SampleBuffer::new(data, 1, 8000).unwrap();

        assert!((buffer.sample_f32(0) - 1.0).abs() < 1e-6);
        // Most negative value slightly exceeds full scale and is clamped
        assert!((buffer.sample_f32(1) + 1.0).abs() < 1e-6);
        assert_eq!(buffer.sample_f32(2), 0.0);
        assert!((buffer.sample_f32(3) - 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_read_scaled_pads_with_silence() {
        let buffer = SampleBuffer::from_f32(vec![1.0, 1.0, 1.0], 1, 8000).unwrap();
        let mut out = [9.0f32; 5];

        let copied = buffer.read_scaled(1, &mut out, 0.5);

        assert_eq!(copied, 2);
        assert_eq!(out, [0.5, 0.5, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_read_scaled_past_end() {
        let buffer = SampleBuffer::from_f32(vec![1.0; 4], 1, 8000).unwrap();
        let mut out = [1.0f32; 3];
        assert_eq!(buffer.read_scaled(10, &mut out, 1.0), 0);
        assert_eq!(out, [0.0; 3]);
    }
}
