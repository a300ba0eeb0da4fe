//! Audio output devices
//!
//! The playback engine talks to an output device through `AudioOutput`.
//! A device is opened with a pull callback: whenever it needs more audio it
//! calls the callback with an interleaved f32 block to fill, and the
//! callback answers whether more data will follow.
//!
//! Two devices are provided:
//! - `CpalOutput` - the system's default output device through cpal
//! - `ManualOutput` - a headless device whose blocks are pulled by the
//!   caller, for offline rendering and tests

use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};

use crate::error::{EditorError, Result};

/// Answer of a pull callback for one block
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PullStatus {
    /// More blocks will follow
    Continue,
    /// This was the last block; the device should halt after it
    Complete,
}

/// Callback that fills one interleaved block of f32 samples
pub type PullFn = Box<dyn FnMut(&mut [f32]) -> PullStatus + Send + 'static>;

/// Parameters for opening an output stream
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamSpec {
    pub sample_rate: u32,
    pub channels: u16,
    /// Preferred number of frames per callback
    pub block_size: u32,
}

/// A live connection to an output device
pub trait OutputConnection {
    /// Release the device. No callback runs after this returns.
    fn close(self: Box<Self>);
}

/// Something that can open output streams
pub trait AudioOutput {
    /// Open a stream and start pulling blocks from `pull`
    fn open(&self, spec: StreamSpec, pull: PullFn) -> Result<Box<dyn OutputConnection>>;
}

/// System audio output through cpal
pub struct CpalOutput {
    host: cpal::Host,
}

impl CpalOutput {
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
        }
    }
}

impl Default for CpalOutput {
    fn default() -> Self {
        Self::new()
    }
}

/// Preference order when a device offers several sample formats
fn format_rank(format: cpal::SampleFormat) -> u8 {
    match format {
        cpal::SampleFormat::F32 => 4,
        cpal::SampleFormat::I32 => 3,
        cpal::SampleFormat::I16 => 2,
        cpal::SampleFormat::U16 => 1,
        _ => 0,
    }
}

impl AudioOutput for CpalOutput {
    fn open(&self, spec: StreamSpec, pull: PullFn) -> Result<Box<dyn OutputConnection>> {
        let device = self
            .host
            .default_output_device()
            .ok_or_else(|| EditorError::DeviceError("No output device found".to_string()))?;

        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        log::info!("Using output device: {}", device_name);

        let supported = device
            .supported_output_configs()
            .map_err(|e| EditorError::DeviceError(format!("Failed to query configs: {}", e)))?
            .filter(|range| {
                range.channels() == spec.channels
                    && range.min_sample_rate().0 <= spec.sample_rate
                    && spec.sample_rate <= range.max_sample_rate().0
            })
            .max_by_key(|range| format_rank(range.sample_format()))
            .ok_or_else(|| {
                EditorError::DeviceError(format!(
                    "{} does not support {} ch @ {} Hz",
                    device_name, spec.channels, spec.sample_rate
                ))
            })?;

        let buffer_size = match supported.buffer_size() {
            cpal::SupportedBufferSize::Range { min, max }
                if (*min..=*max).contains(&spec.block_size) =>
            {
                cpal::BufferSize::Fixed(spec.block_size)
            }
            _ => cpal::BufferSize::Default,
        };

        let config = cpal::StreamConfig {
            channels: spec.channels,
            sample_rate: cpal::SampleRate(spec.sample_rate),
            buffer_size,
        };

        let sample_format = supported.sample_format();
        log::info!("Audio config: {:?}, format {:?}", config, sample_format);

        let stream = match sample_format {
            cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, spec, pull)?,
            cpal::SampleFormat::I32 => build_stream::<i32>(&device, &config, spec, pull)?,
            cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, spec, pull)?,
            cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config, spec, pull)?,
            format => {
                return Err(EditorError::DeviceError(format!(
                    "Unsupported sample format: {:?}",
                    format
                )));
            }
        };

        stream
            .play()
            .map_err(|e| EditorError::DeviceError(format!("Error starting stream: {}", e)))?;

        Ok(Box::new(CpalConnection { stream }))
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    spec: StreamSpec,
    mut pull: PullFn,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    // Allocated once here, reused by every callback
    let mut scratch = vec![0.0f32; spec.block_size.max(1) as usize * spec.channels as usize];
    let mut complete = false;

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                write_audio_samples(data, &mut scratch, &mut pull, &mut complete);
            },
            |err| log::error!("Audio stream error: {}", err),
            None,
        )
        .map_err(|e| EditorError::DeviceError(format!("Error building stream: {}", e)))
}

/// Fill a device buffer of any sample format from the pull callback
///
/// Once the callback reports `Complete`, the rest of the stream is silence
/// and the callback is no longer invoked.
fn write_audio_samples<T: Sample + FromSample<f32>>(
    data: &mut [T],
    scratch: &mut [f32],
    pull: &mut PullFn,
    complete: &mut bool,
) {
    for chunk in data.chunks_mut(scratch.len()) {
        if *complete {
            chunk.fill(T::EQUILIBRIUM);
            continue;
        }

        let block = &mut scratch[..chunk.len()];
        if pull(block) == PullStatus::Complete {
            *complete = true;
        }
        for (dst, &src) in chunk.iter_mut().zip(block.iter()) {
            *dst = T::from_sample(src);
        }
    }
}

struct CpalConnection {
    stream: cpal::Stream,
}

impl OutputConnection for CpalConnection {
    fn close(self: Box<Self>) {
        if let Err(e) = self.stream.pause() {
            log::warn!("Failed to pause stream before closing: {}", e);
        }
        // Dropping the stream tears down the callback thread
        drop(self.stream);
    }
}

struct ManualStream {
    id: usize,
    spec: StreamSpec,
    pull: PullFn,
}

#[derive(Default)]
struct ManualInner {
    streams: Vec<ManualStream>,
    next_id: usize,
}

/// A device driven by its owner instead of a hardware clock
///
/// Every `open` registers a stream; `pull` renders one block from it on the
/// calling thread. Cloning shares the same set of streams.
#[derive(Clone, Default)]
pub struct ManualOutput {
    inner: Arc<Mutex<ManualInner>>,
}

impl ManualOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids of the currently open streams, oldest first
    pub fn open_streams(&self) -> Vec<usize> {
        self.lock().streams.iter().map(|s| s.id).collect()
    }

    /// Spec a stream was opened with
    pub fn spec(&self, id: usize) -> Option<StreamSpec> {
        self.lock().streams.iter().find(|s| s.id == id).map(|s| s.spec)
    }

    /// Render `frames` frames from the stream with the given id
    ///
    /// Returns `None` if that stream is not open.
    pub fn pull(&self, id: usize, frames: usize) -> Option<(Vec<f32>, PullStatus)> {
        let mut inner = self.lock();
        let stream = inner.streams.iter_mut().find(|s| s.id == id)?;
        let mut block = vec![0.0; frames * stream.spec.channels as usize];
        let status = (stream.pull)(&mut block);
        Some((block, status))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualInner> {
        // A panicking test thread must not take the device down with it
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl AudioOutput for ManualOutput {
    fn open(&self, spec: StreamSpec, pull: PullFn) -> Result<Box<dyn OutputConnection>> {
        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.streams.push(ManualStream { id, spec, pull });

        Ok(Box::new(ManualConnection {
            id,
            inner: Arc::clone(&self.inner),
        }))
    }
}

struct ManualConnection {
    id: usize,
    inner: Arc<Mutex<ManualInner>>,
}

impl OutputConnection for ManualConnection {
    fn close(self: Box<Self>) {
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        inner.streams.retain(|s| s.id != self.id);
    }
}
