//! File codec - turns files into sample buffers and back
//!
//! WAV goes through hound in both directions and keeps integer PCM as
//! integers. Everything else (MP3, FLAC, OGG/Vorbis, AIFF) is decode-only
//! through symphonia and comes out as interleaved f32.

use std::fs::File;
use std::path::Path;

use serde::{Deserialize, Serialize};
use symphonia::core::audio::SampleBuffer as DecodedSamples;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::buffer::{SampleBuffer, SampleData};
use crate::error::{EditorError, Result};

/// Something that can read and write audio files
pub trait Codec {
    /// Decode a file into a sample buffer
    fn decode(&self, path: &Path) -> Result<SampleBuffer>;

    /// Encode a buffer into a file at `path`
    fn encode(&self, buffer: &SampleBuffer, path: &Path) -> Result<()>;
}

/// Sample format used when writing WAV files
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// 32-bit IEEE float
    #[default]
    Float32,
    /// 16-bit signed PCM
    Pcm16,
    /// 24-bit signed PCM
    Pcm24,
}

impl ExportFormat {
    fn wav_spec(&self, channels: u16, sample_rate: u32) -> hound::WavSpec {
        let (bits_per_sample, sample_format) = match self {
            ExportFormat::Float32 => (32, hound::SampleFormat::Float),
            ExportFormat::Pcm16 => (16, hound::SampleFormat::Int),
            ExportFormat::Pcm24 => (24, hound::SampleFormat::Int),
        };
        hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample,
            sample_format,
        }
    }
}

/// Codec backed by the local file system
#[derive(Clone, Debug, Default)]
pub struct FileCodec {
    pub export_format: ExportFormat,
}

impl FileCodec {
    pub fn new(export_format: ExportFormat) -> Self {
        Self { export_format }
    }
}

fn is_wav(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("wav") || e.eq_ignore_ascii_case("wave"))
        .unwrap_or(false)
}

impl Codec for FileCodec {
    fn decode(&self, path: &Path) -> Result<SampleBuffer> {
        let buffer = if is_wav(path) {
            decode_wav(path)?
        } else {
            decode_compressed(path)?
        };
        log::info!(
            "Decoded {}: {} frames, {} ch @ {} Hz",
            path.display(),
            buffer.frames(),
            buffer.channels(),
            buffer.sample_rate()
        );
        Ok(buffer)
    }

    fn encode(&self, buffer: &SampleBuffer, path: &Path) -> Result<()> {
        if !is_wav(path) {
            return Err(EditorError::UnsupportedFormat(format!(
                "{}: only WAV can be written",
                path.display()
            )));
        }

        let spec = self
            .export_format
            .wav_spec(buffer.channels(), buffer.sample_rate());
        let encode_err = |e: hound::Error| EditorError::EncodeError(format!("{}: {}", path.display(), e));

        let mut writer = hound::WavWriter::create(path, spec).map_err(encode_err)?;
        let total = buffer.data().len();
        match self.export_format {
            ExportFormat::Float32 => {
                for i in 0..total {
                    writer.write_sample(buffer.sample_f32(i)).map_err(encode_err)?;
                }
            }
            ExportFormat::Pcm16 => {
                for i in 0..total {
                    let s = (buffer.sample_f32(i) * i16::MAX as f32).round() as i16;
                    writer.write_sample(s).map_err(encode_err)?;
                }
            }
            ExportFormat::Pcm24 => {
                const FULL_SCALE_24: f32 = 8_388_607.0;
                for i in 0..total {
                    let s = (buffer.sample_f32(i) * FULL_SCALE_24).round() as i32;
                    writer.write_sample(s).map_err(encode_err)?;
                }
            }
        }
        writer.finalize().map_err(encode_err)?;

        log::info!(
            "Encoded {} ({} frames, {:?})",
            path.display(),
            buffer.frames(),
            self.export_format
        );
        Ok(())
    }
}

fn decode_wav(path: &Path) -> Result<SampleBuffer> {
    let decode_err = |e: hound::Error| match e {
        hound::Error::IoError(io) => {
            EditorError::DecodeError(format!("{}: {}", path.display(), io))
        }
        hound::Error::Unsupported => {
            EditorError::UnsupportedFormat(format!("{}: unsupported WAV encoding", path.display()))
        }
        other => EditorError::DecodeError(format!("{}: {}", path.display(), other)),
    };

    let reader = hound::WavReader::open(path).map_err(decode_err)?;
    let spec = reader.spec();

    let data = match spec.sample_format {
        hound::SampleFormat::Float => SampleData::Float(
            reader
                .into_samples::<f32>()
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(decode_err)?,
        ),
        hound::SampleFormat::Int => SampleData::Int {
            samples: reader
                .into_samples::<i32>()
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(decode_err)?,
            bits_per_sample: spec.bits_per_sample,
        },
    };

    SampleBuffer::new(data, spec.channels, spec.sample_rate)
}

fn decode_compressed(path: &Path) -> Result<SampleBuffer> {
    let file = File::open(path)
        .map_err(|e| EditorError::DecodeError(format!("{}: {}", path.display(), e)))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| match e {
            SymphoniaError::Unsupported(what) => {
                EditorError::UnsupportedFormat(format!("{}: {}", path.display(), what))
            }
            other => EditorError::DecodeError(format!("{}: {}", path.display(), other)),
        })?;

    let mut format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| {
            EditorError::UnsupportedFormat(format!("{}: no audio track", path.display()))
        })?;

    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut channels = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(0);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| EditorError::UnsupportedFormat(format!("{}: {}", path.display(), e)))?;

    let mut samples: Vec<f32> = Vec::new();
    let mut decoded_buf: Option<DecodedSamples<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(EditorError::DecodeError(format!("{}: {}", path.display(), e))),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            // Corrupt packet: skip it and keep going
            Err(SymphoniaError::DecodeError(e)) => {
                log::warn!("{}: skipping bad packet ({})", path.display(), e);
                continue;
            }
            Err(e) => return Err(EditorError::DecodeError(format!("{}: {}", path.display(), e))),
        };

        let spec = *decoded.spec();
        sample_rate = spec.rate;
        channels = spec.channels.count() as u16;

        let buf = decoded_buf
            .get_or_insert_with(|| DecodedSamples::<f32>::new(decoded.capacity() as u64, spec));
        if buf.capacity() < decoded.capacity() * spec.channels.count() {
            *buf = DecodedSamples::<f32>::new(decoded.capacity() as u64, spec);
        }
        buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buf.samples());
    }

    SampleBuffer::from_f32(samples, channels, sample_rate)
}
