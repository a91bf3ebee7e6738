//! AivisSpeech synthesis client
//!
//! One attempt is the VOICEVOX-style two-step exchange:
//! 1. `POST /audio_query?text=..&speaker=..` returns a JSON query
//! 2. the six control parameters are merged into it and it is posted to
//!    `POST /synthesis?speaker=..`, which answers with WAV bytes
//!
//! A failure in either step fails the whole attempt, and retries repeat both.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::error::EngineCallError;
use super::text::preprocess_text;
use crate::audio::AudioBuffer;
use crate::config::ClientSettings;
use crate::core::error::{Result, TtsError};
use crate::core::retry::{RetryFailure, RetryPolicy};
use crate::emotion::SynthesisParameters;
use crate::engine::{ProcessSupervisor, SynthesisBackend};
use crate::pipeline::Segment;

/// HTTP client for an AivisSpeech (VOICEVOX-compatible) engine
pub struct AivisClient {
    supervisor: Arc<ProcessSupervisor>,
    http: reqwest::Client,
    settings: ClientSettings,
    retry: RetryPolicy,
    sample_rate: u32,
    startup_timeout: Duration,
}

impl AivisClient {
    /// Create a client bound to `supervisor`'s engine
    pub fn new(
        supervisor: Arc<ProcessSupervisor>,
        settings: ClientSettings,
        sample_rate: u32,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| TtsError::Internal {
                message: format!("Failed to build HTTP client: {}", e),
                location: Some("AivisClient::new".to_string()),
            })?;
        let startup_timeout = supervisor.settings().startup_timeout();

        Ok(Self {
            supervisor,
            http,
            retry: settings.retry_policy(),
            settings,
            sample_rate,
            startup_timeout,
        })
    }

    /// Override the retry policy built from the settings
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn supervisor(&self) -> &Arc<ProcessSupervisor> {
        &self.supervisor
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Engine version string from `GET /version`
    pub async fn engine_version(&self) -> Result<String> {
        let url = format!("{}/version", self.supervisor.base_url());
        let response = self
            .http
            .get(&url)
            .timeout(self.settings.request_timeout())
            .send()
            .await
            .map_err(|e| TtsError::Io {
                message: format!("Engine unreachable: {}", e),
                path: None,
            })?;
        let body = response.text().await.map_err(|e| TtsError::Io {
            message: format!("Failed to read engine version: {}", e),
            path: None,
        })?;
        Ok(body.trim().trim_matches('"').to_string())
    }

    /// Synthesize one segment, retrying transient failures
    pub async fn synthesize_segment(&self, segment: &Segment) -> Result<AudioBuffer> {
        let index = segment.index();
        let text = preprocess_text(segment.text());
        if text.is_empty() {
            return Err(TtsError::InvalidSynthesisRequest {
                index,
                status: None,
                message: "text is empty after preprocessing".to_string(),
            });
        }
        let length = text.chars().count();
        if length > self.settings.max_text_length {
            return Err(TtsError::InvalidSynthesisRequest {
                index,
                status: None,
                message: format!(
                    "text has {} characters, limit is {}",
                    length, self.settings.max_text_length
                ),
            });
        }

        if !self.supervisor.probe().await {
            self.supervisor.ensure_ready(self.startup_timeout).await?;
        }

        let query_text: &str = &text;
        let wav = self
            .retry
            .run(|attempt| {
                tracing::debug!(
                    "Segment {}: attempt {} (style {})",
                    index,
                    attempt,
                    segment.style_id()
                );
                self.attempt(query_text, segment.style_id(), segment.parameters())
            })
            .await
            .map_err(|failure| {
                tracing::warn!(
                    "Segment {}: giving up after {} attempt(s)",
                    index,
                    failure.attempts()
                );
                into_segment_error(index, failure)
            })?;

        AudioBuffer::from_wav_bytes(&wav, self.sample_rate).map_err(|e| {
            TtsError::MalformedSynthesisResponse {
                index,
                message: e.to_string(),
            }
        })
    }

    async fn attempt(
        &self,
        text: &str,
        style_id: u32,
        params: &SynthesisParameters,
    ) -> std::result::Result<Vec<u8>, EngineCallError> {
        let base = self.supervisor.base_url();
        let speaker = style_id.to_string();
        let timeout = self.settings.request_timeout();

        let response = self
            .http
            .post(format!("{}/audio_query", base))
            .query(&[("text", text), ("speaker", speaker.as_str())])
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| EngineCallError::from_reqwest("audio_query", &e))?;
        let response = check_status("audio_query", response).await?;

        let mut query: Value = response
            .json()
            .await
            .map_err(|e| EngineCallError::from_reqwest("audio_query", &e))?;
        let fields = query
            .as_object_mut()
            .ok_or_else(|| EngineCallError::response("audio_query", "query is not a JSON object"))?;
        self.merge_parameters(fields, params);

        let response = self
            .http
            .post(format!("{}/synthesis", base))
            .query(&[("speaker", speaker.as_str())])
            .header(reqwest::header::ACCEPT, "audio/wav")
            .json(&query)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| EngineCallError::from_reqwest("synthesis", &e))?;
        let response = check_status("synthesis", response).await?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| EngineCallError::from_reqwest("synthesis", &e))?;
        Ok(bytes.to_vec())
    }

    fn merge_parameters(&self, fields: &mut Map<String, Value>, params: &SynthesisParameters) {
        for (key, value) in &self.settings.query_extras {
            fields.insert(key.clone(), value.clone());
        }
        fields.insert("intonationScale".into(), json!(params.intonation_scale));
        fields.insert("tempoDynamicsScale".into(), json!(params.tempo_dynamics_scale));
        fields.insert("speedScale".into(), json!(params.speed_scale));
        fields.insert("pitchScale".into(), json!(params.pitch_scale));
        fields.insert("volumeScale".into(), json!(params.volume_scale));
        fields.insert("prePhonemeLength".into(), json!(params.pre_phoneme_length));
        fields.insert(
            "postPhonemeLength".into(),
            json!(self.settings.post_phoneme_length),
        );
        fields.insert("outputSamplingRate".into(), json!(self.sample_rate));
        fields.insert("outputStereo".into(), json!(false));
    }
}

async fn check_status(
    endpoint: &str,
    response: reqwest::Response,
) -> std::result::Result<reqwest::Response, EngineCallError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(EngineCallError::status(endpoint, status.as_u16(), body))
}

fn into_segment_error(index: usize, failure: RetryFailure<EngineCallError>) -> TtsError {
    match failure {
        RetryFailure::Exhausted { attempts, last } => TtsError::SynthesisUnavailable {
            index,
            attempts,
            cause: last.to_string(),
        },
        RetryFailure::NonRetryable { attempts, error } => match error {
            EngineCallError::Status {
                status_code,
                message,
                ..
            } => TtsError::InvalidSynthesisRequest {
                index,
                status: Some(status_code),
                message,
            },
            EngineCallError::Response { message, .. } => {
                TtsError::MalformedSynthesisResponse { index, message }
            }
            // network errors are always retryable
            other => TtsError::SynthesisUnavailable {
                index,
                attempts,
                cause: other.to_string(),
            },
        },
    }
}

#[async_trait]
impl SynthesisBackend for AivisClient {
    fn name(&self) -> &str {
        "aivis"
    }

    async fn is_ready(&self) -> bool {
        self.supervisor.probe().await
    }

    async fn ensure_ready(&self) -> Result<()> {
        self.supervisor.ensure_ready(self.startup_timeout).await
    }

    async fn synthesize(&self, segment: &Segment) -> Result<AudioBuffer> {
        self.synthesize_segment(segment).await
    }

    async fn shutdown(&self) -> Result<()> {
        self.supervisor.shutdown().await
    }
}
