//! Final artifact encoding
//!
//! The compressed target is AAC in an `.m4a` container, produced by an
//! external `ffmpeg`. Any failure of that step falls back to 16-bit PCM WAV
//! and the downgrade is reported on the result. Intermediate files live in a
//! temporary directory that is removed on every exit path.

use std::fmt;
use std::process::Stdio;

use serde::{Deserialize, Serialize};
use tokio::process::Command;

use super::buffer::AudioBuffer;
use crate::config::EncodingSettings;
use crate::core::error::{Result, TtsError};

/// Container/codec of the final artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputEncoding {
    /// AAC in MP4 via ffmpeg
    #[default]
    M4a,
    /// 16-bit PCM WAV
    Wav,
}

impl OutputEncoding {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputEncoding::M4a => "m4a",
            OutputEncoding::Wav => "wav",
        }
    }
}

impl fmt::Display for OutputEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Encoded bytes plus what was actually produced
#[derive(Debug, Clone)]
pub struct EncodedAudio {
    pub bytes: Vec<u8>,
    pub encoding: OutputEncoding,
    /// Set when the requested encoding failed and WAV was produced instead
    pub downgrade: Option<TtsError>,
}

impl EncodedAudio {
    pub fn is_degraded(&self) -> bool {
        self.downgrade.is_some()
    }
}

/// Encodes assembled audio according to [`EncodingSettings`]
#[derive(Debug, Clone)]
pub struct AudioEncoder {
    settings: EncodingSettings,
}

impl AudioEncoder {
    pub fn new(settings: EncodingSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &EncodingSettings {
        &self.settings
    }

    /// Encode, falling back to WAV when the compressed path fails
    pub async fn encode(&self, audio: &AudioBuffer) -> Result<EncodedAudio> {
        match self.settings.format {
            OutputEncoding::Wav => Ok(EncodedAudio {
                bytes: audio.to_wav_bytes()?,
                encoding: OutputEncoding::Wav,
                downgrade: None,
            }),
            OutputEncoding::M4a => match self.encode_m4a(audio).await {
                Ok(bytes) => Ok(EncodedAudio {
                    bytes,
                    encoding: OutputEncoding::M4a,
                    downgrade: None,
                }),
                Err(e) => {
                    tracing::warn!("Degraded output: {}. Falling back to WAV", e);
                    Ok(EncodedAudio {
                        bytes: audio.to_wav_bytes()?,
                        encoding: OutputEncoding::Wav,
                        downgrade: Some(e),
                    })
                }
            },
        }
    }

    async fn encode_m4a(&self, audio: &AudioBuffer) -> Result<Vec<u8>> {
        let encoder = self.settings.ffmpeg_path.display().to_string();
        let failure = |message: String| TtsError::EncodeFailure {
            encoder: encoder.clone(),
            message,
        };

        let scratch = tempfile::Builder::new()
            .prefix("sentiovox-")
            .tempdir()
            .map_err(|e| failure(format!("cannot create scratch dir: {}", e)))?;
        let input = scratch.path().join("input.wav");
        let output = scratch.path().join("output.m4a");

        tokio::fs::write(&input, audio.to_wav_bytes()?)
            .await
            .map_err(|e| failure(format!("cannot write intermediate WAV: {}", e)))?;

        let mut command = Command::new(&self.settings.ffmpeg_path);
        command
            .arg("-y")
            .args(["-loglevel", "error"])
            .arg("-i")
            .arg(&input)
            .args(["-c:a", "aac", "-b:a", self.settings.bitrate.as_str()])
            .arg(&output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let timeout = self.settings.timeout();
        let result = tokio::time::timeout(timeout, command.output())
            .await
            .map_err(|_| failure(format!("timed out after {}ms", timeout.as_millis())))?
            .map_err(|e| failure(format!("cannot run: {}", e)))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(failure(format!(
                "exited with {}: {}",
                result.status,
                stderr.trim()
            )));
        }

        let bytes = tokio::fs::read(&output)
            .await
            .map_err(|e| failure(format!("no output produced: {}", e)))?;
        if bytes.is_empty() {
            return Err(failure("empty output".to_string()));
        }

        tracing::debug!("Encoded {} bytes of m4a", bytes.len());
        Ok(bytes)
    }
}
