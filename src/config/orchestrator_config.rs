//! Orchestrator configuration
//!
//! Every field has a default, so an empty file (or no file) is a valid
//! configuration. Durations are stored as integer milliseconds.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::audio::encoder::OutputEncoding;
use crate::audio::processor::FadeCurve;
use crate::core::error::{Result, ResultExt, TtsError};
use crate::core::retry::RetryPolicy;
use crate::emotion::VoiceMap;
use crate::pipeline::orchestrator::FailurePolicy;

/// Root configuration for one orchestration session
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OrchestratorConfig {
    /// Engine process supervision
    #[serde(default)]
    pub engine: EngineSettings,
    /// Synthesis client and retry policy
    #[serde(default)]
    pub client: ClientSettings,
    /// Emotion parameter mapping
    #[serde(default)]
    pub mapper: MapperSettings,
    /// Per-speaker styles for multi-character scripts
    #[serde(default, skip_serializing_if = "VoiceMap::is_empty")]
    pub voices: VoiceMap,
    /// Per-segment processing and concatenation
    #[serde(default)]
    pub assembly: AssemblySettings,
    /// Final encode step
    #[serde(default)]
    pub encoding: EncodingSettings,
    /// Run-level behaviour
    #[serde(default)]
    pub run: RunSettings,
    /// Logging
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Engine process supervision settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Executable that starts the engine
    #[serde(default = "default_engine_command")]
    pub command: PathBuf,
    /// Extra command-line arguments
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment variables for the engine process
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Working directory for the engine process
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// Base URL of the engine HTTP API
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_startup_timeout_ms")]
    pub startup_timeout_ms: u64,
    #[serde(default = "default_probe_interval_ms")]
    pub probe_interval_ms: u64,
    /// Timeout of a single liveness probe
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    /// Wait after SIGTERM before the process is killed
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

/// Synthesis client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSettings {
    /// Attempts per segment, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Timeout of each HTTP call within an attempt
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Trailing silence requested from the engine (seconds)
    #[serde(default = "default_post_phoneme_length")]
    pub post_phoneme_length: f64,
    /// Longest text accepted for one segment, in characters
    #[serde(default = "default_max_text_length")]
    pub max_text_length: usize,
    /// Extra fields merged into every audio query (e.g. `noiseScale`)
    #[serde(default = "default_query_extras")]
    pub query_extras: BTreeMap<String, serde_json::Value>,
}

/// Emotion parameter mapping settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapperSettings {
    /// Scores below this are ignored for parameter purposes
    #[serde(default = "default_activation_threshold")]
    pub activation_threshold: f32,
    /// Optional parameter table file (TOML, YAML or JSON)
    #[serde(default)]
    pub table_path: Option<PathBuf>,
}

/// Per-segment processing and concatenation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblySettings {
    /// Output sample rate in Hz
    #[serde(default = "default_sample_rate")]
    pub target_sample_rate: u32,
    #[serde(default = "default_true")]
    pub remove_dc: bool,
    /// Absolute amplitude at or below which edge samples count as silence
    #[serde(default = "default_silence_threshold")]
    pub silence_threshold: f32,
    /// Samples kept on either side of the detected speech
    #[serde(default = "default_trim_margin")]
    pub trim_margin_samples: usize,
    #[serde(default = "default_true")]
    pub apply_fade: bool,
    #[serde(default = "default_fade_samples")]
    pub fade_samples: usize,
    #[serde(default)]
    pub fade_curve: FadeCurve,
    #[serde(default = "default_true")]
    pub normalize: bool,
    /// Per-segment RMS loudness target
    #[serde(default = "default_target_dbfs")]
    pub target_dbfs: f32,
    /// Silence inserted between consecutive segments (seconds)
    #[serde(default = "default_gap_seconds")]
    pub gap_seconds: f64,
}

/// Final encode settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodingSettings {
    #[serde(default)]
    pub format: OutputEncoding,
    /// Path or name of the ffmpeg executable
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,
    #[serde(default = "default_bitrate")]
    pub bitrate: String,
    #[serde(default = "default_encode_timeout_ms")]
    pub timeout_ms: u64,
}

/// Run-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSettings {
    /// Concurrent synthesis workers
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Default filter when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_engine_command() -> PathBuf {
    PathBuf::from("AivisSpeech-Engine/run")
}

fn default_base_url() -> String {
    crate::DEFAULT_ENGINE_URL.to_string()
}

fn default_startup_timeout_ms() -> u64 {
    30_000
}

fn default_probe_interval_ms() -> u64 {
    500
}

fn default_probe_timeout_ms() -> u64 {
    2_000
}

fn default_shutdown_grace_ms() -> u64 {
    5_000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    1_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_backoff_ms() -> u64 {
    10_000
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_post_phoneme_length() -> f64 {
    0.1
}

fn default_max_text_length() -> usize {
    1000
}

fn default_query_extras() -> BTreeMap<String, serde_json::Value> {
    let mut extras = BTreeMap::new();
    extras.insert("noiseScale".to_string(), serde_json::json!(0.4));
    extras.insert("modelTruncation".to_string(), serde_json::json!(0.8));
    extras
}

fn default_activation_threshold() -> f32 {
    0.05
}

fn default_sample_rate() -> u32 {
    crate::DEFAULT_SAMPLE_RATE
}

fn default_true() -> bool {
    true
}

fn default_silence_threshold() -> f32 {
    0.01
}

fn default_trim_margin() -> usize {
    100
}

fn default_fade_samples() -> usize {
    100
}

fn default_target_dbfs() -> f32 {
    -20.0
}

fn default_gap_seconds() -> f64 {
    800.0 / crate::DEFAULT_SAMPLE_RATE as f64
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_bitrate() -> String {
    "192k".to_string()
}

fn default_encode_timeout_ms() -> u64 {
    30_000
}

fn default_workers() -> usize {
    3
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            command: default_engine_command(),
            args: Vec::new(),
            env: BTreeMap::new(),
            working_dir: None,
            base_url: default_base_url(),
            startup_timeout_ms: default_startup_timeout_ms(),
            probe_interval_ms: default_probe_interval_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

impl EngineSettings {
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_backoff_ms: default_max_backoff_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            post_phoneme_length: default_post_phoneme_length(),
            max_text_length: default_max_text_length(),
            query_extras: default_query_extras(),
        }
    }
}

impl ClientSettings {
    /// Build the retry policy described by these settings
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_delay: Duration::from_millis(self.initial_backoff_ms),
            backoff_multiplier: self.backoff_multiplier,
            max_delay: Duration::from_millis(self.max_backoff_ms),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for MapperSettings {
    fn default() -> Self {
        Self {
            activation_threshold: default_activation_threshold(),
            table_path: None,
        }
    }
}

impl Default for AssemblySettings {
    fn default() -> Self {
        Self {
            target_sample_rate: default_sample_rate(),
            remove_dc: true,
            silence_threshold: default_silence_threshold(),
            trim_margin_samples: default_trim_margin(),
            apply_fade: true,
            fade_samples: default_fade_samples(),
            fade_curve: FadeCurve::default(),
            normalize: true,
            target_dbfs: default_target_dbfs(),
            gap_seconds: default_gap_seconds(),
        }
    }
}

impl AssemblySettings {
    /// Inter-segment gap in samples at the target rate
    pub fn gap_samples(&self) -> usize {
        (self.gap_seconds * self.target_sample_rate as f64).round() as usize
    }
}

impl Default for EncodingSettings {
    fn default() -> Self {
        Self {
            format: OutputEncoding::default(),
            ffmpeg_path: default_ffmpeg_path(),
            bitrate: default_bitrate(),
            timeout_ms: default_encode_timeout_ms(),
        }
    }
}

impl EncodingSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            failure_policy: FailurePolicy::default(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl OrchestratorConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).io_at("Failed to read config file", path)?;

        let config: Self = toml::from_str(&content).map_err(|e| TtsError::Config {
            message: format!("Failed to parse config file: {}", e),
            path: Some(path.to_path_buf()),
        })?;

        config.validate().map_err(|e| match e {
            TtsError::Config { message, .. } => TtsError::Config {
                message,
                path: Some(path.to_path_buf()),
            },
            other => other,
        })?;

        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| TtsError::Config {
            message: format!("Failed to serialize config: {}", e),
            path: None,
        })?;

        std::fs::write(path.as_ref(), content).io_at("Failed to write config file", path.as_ref())?;

        Ok(())
    }

    /// Reject values no run could work with
    pub fn validate(&self) -> Result<()> {
        let engine = &self.engine;
        if engine.base_url.trim().is_empty() {
            return Err(TtsError::config("engine.base_url must not be empty"));
        }
        if !engine.base_url.starts_with("http://") && !engine.base_url.starts_with("https://") {
            return Err(TtsError::config(format!(
                "engine.base_url must be an http(s) URL, got '{}'",
                engine.base_url
            )));
        }
        if engine.startup_timeout_ms == 0 {
            return Err(TtsError::config("engine.startup_timeout_ms must be positive"));
        }
        if engine.probe_interval_ms == 0 || engine.probe_timeout_ms == 0 {
            return Err(TtsError::config("engine probe interval and timeout must be positive"));
        }

        let client = &self.client;
        if client.max_attempts == 0 {
            return Err(TtsError::config("client.max_attempts must be at least 1"));
        }
        if !client.backoff_multiplier.is_finite() || client.backoff_multiplier < 1.0 {
            return Err(TtsError::config("client.backoff_multiplier must be >= 1.0"));
        }
        if client.request_timeout_ms == 0 {
            return Err(TtsError::config("client.request_timeout_ms must be positive"));
        }
        if client.max_text_length == 0 {
            return Err(TtsError::config("client.max_text_length must be positive"));
        }

        let threshold = self.mapper.activation_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(TtsError::config(format!(
                "mapper.activation_threshold must lie in [0, 1], got {}",
                threshold
            )));
        }

        let assembly = &self.assembly;
        if assembly.target_sample_rate == 0 {
            return Err(TtsError::config("assembly.target_sample_rate must be positive"));
        }
        if !(0.0..1.0).contains(&assembly.silence_threshold) {
            return Err(TtsError::config("assembly.silence_threshold must lie in [0, 1)"));
        }
        if !assembly.gap_seconds.is_finite() || assembly.gap_seconds < 0.0 {
            return Err(TtsError::config("assembly.gap_seconds must be non-negative"));
        }
        if !assembly.target_dbfs.is_finite() || assembly.target_dbfs > 0.0 {
            return Err(TtsError::config("assembly.target_dbfs must be <= 0"));
        }

        if self.encoding.timeout_ms == 0 {
            return Err(TtsError::config("encoding.timeout_ms must be positive"));
        }
        if self.run.workers == 0 {
            return Err(TtsError::config("run.workers must be at least 1"));
        }

        Ok(())
    }
}
