//! Owned mono sample buffers and WAV conversion

use std::io::Cursor;
use std::path::Path;

use super::resampler::resample_mono;
use crate::core::error::{AudioOperation, Result, ResultExt, TtsError};

/// Mono f32 samples in [-1, 1] at a fixed sample rate
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// `len` zero samples
    pub fn silence(len: usize, sample_rate: u32) -> Self {
        Self::new(vec![0.0; len], sample_rate)
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Always 1; buffers are down-mixed on decode
    pub fn channels(&self) -> u16 {
        1
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Decode a WAV payload, down-mix to mono and resample to `target_rate`
    ///
    /// Accepts 8/16/24/32-bit integer PCM and 32-bit float.
    pub fn from_wav_bytes(bytes: &[u8], target_rate: u32) -> Result<Self> {
        let reader = hound::WavReader::new(Cursor::new(bytes))?;
        let spec = reader.spec();

        if spec.channels == 0 {
            return Err(TtsError::audio(AudioOperation::Decoding, "WAV declares zero channels"));
        }

        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<std::result::Result<_, _>>()?,
            hound::SampleFormat::Int => {
                if spec.bits_per_sample == 0 || spec.bits_per_sample > 32 {
                    return Err(TtsError::audio(
                        AudioOperation::Decoding,
                        format!("Unsupported bit depth: {}", spec.bits_per_sample),
                    ));
                }
                let max_value = (1u64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / max_value))
                    .collect::<std::result::Result<_, _>>()?
            }
        };

        let mono: Vec<f32> = if spec.channels > 1 {
            interleaved
                .chunks(spec.channels as usize)
                .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
                .collect()
        } else {
            interleaved
        };

        if spec.sample_rate == target_rate {
            return Ok(Self::new(mono, target_rate));
        }

        tracing::debug!("Resampling {} Hz -> {} Hz", spec.sample_rate, target_rate);
        let resampled = resample_mono(&mono, spec.sample_rate, target_rate)?;
        Ok(Self::new(resampled, target_rate))
    }

    /// Encode as 16-bit PCM WAV in memory
    pub fn to_wav_bytes(&self) -> Result<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, pcm16_spec(self.sample_rate))
                .audio_op(AudioOperation::Encoding)?;
            for &sample in &self.samples {
                writer
                    .write_sample(to_i16(sample))
                    .audio_op(AudioOperation::Encoding)?;
            }
            writer.finalize().audio_op(AudioOperation::Encoding)?;
        }
        Ok(cursor.into_inner())
    }

    /// Save as a 16-bit PCM WAV file
    pub fn save_wav(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut writer = hound::WavWriter::create(path, pcm16_spec(self.sample_rate))
            .io_at("Failed to create WAV file", path)?;

        for &sample in &self.samples {
            writer
                .write_sample(to_i16(sample))
                .audio_op(AudioOperation::Saving)?;
        }

        writer.finalize().audio_op(AudioOperation::Saving)?;
        Ok(())
    }
}

fn pcm16_spec(sample_rate: u32) -> hound::WavSpec {
    hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

fn to_i16(sample: f32) -> i16 {
    (sample * 32767.0).clamp(-32768.0, 32767.0) as i16
}
