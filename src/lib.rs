//! # SentioVox - Emotion-aware speech synthesis orchestration
//!
//! SentioVox drives a locally hosted AivisSpeech (VOICEVOX-compatible) engine
//! to turn a list of `(text, emotion scores)` segments into one spoken audio
//! file.
//!
//! ## Features
//!
//! - **Engine Supervision**: Launch, probe, adopt and terminate the engine process
//! - **Resilient Synthesis**: Two-step query/synthesis exchange with bounded retry
//! - **Emotion Mapping**: Eight emotion scores blended onto voice parameters and styles
//! - **Concurrent Runs**: Bounded worker pool with in-order assembly
//! - **Clean Output**: Trim, fade and loudness-normalize, then encode to m4a (WAV fallback)
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use sentiovox::{AivisClient, OrchestratorConfig, ProcessSupervisor, SegmentInput, SynthesisOrchestrator};
//! use tokio_util::sync::CancellationToken;
//!
//! let config = OrchestratorConfig::load("sentiovox.toml")?;
//! let supervisor = Arc::new(ProcessSupervisor::new(config.engine.clone())?);
//! let client = AivisClient::new(supervisor, config.client.clone(), config.assembly.target_sample_rate)?;
//! let orchestrator = SynthesisOrchestrator::from_config(Arc::new(client), &config)?;
//!
//! let inputs = SegmentInput::load("script.json")?;
//! let report = orchestrator.run(inputs, CancellationToken::new()).await?;
//! report.artifact.write_to("output.m4a")?;
//! ```

pub mod audio;
pub mod client;
pub mod config;
pub mod core;
pub mod emotion;
pub mod engine;
pub mod pipeline;

// Core re-exports
pub use crate::core::{
    error::{ErrorKind, Result, ResultExt, TtsError},
    retry::{RetryFailure, RetryPolicy, Retryable},
};

pub use audio::{AudioBuffer, AudioEncoder, OutputEncoding, SegmentBoundary};
pub use client::{AivisClient, EngineCallError};
pub use config::OrchestratorConfig;
pub use emotion::{
    CharacterVoice, EmotionLabel, EmotionParameterMapper, EmotionVector, SynthesisParameters,
    VoiceMap,
};
pub use engine::{EngineProcessState, ProcessSupervisor, SynthesisBackend};
pub use pipeline::{
    select_range, FailurePolicy, FinalArtifact, RunReport, Segment, SegmentFailure, SegmentInput,
    SynthesisOrchestrator,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Framework name
pub const FRAMEWORK_NAME: &str = "SentioVox";

/// Default sample rate for output audio (24000 Hz)
pub const DEFAULT_SAMPLE_RATE: u32 = 24000;

/// Default AivisSpeech engine address
pub const DEFAULT_ENGINE_URL: &str = "http://127.0.0.1:10101";

/// Install the global tracing subscriber
///
/// `RUST_LOG` takes precedence over `level`. Calling this more than once is
/// harmless.
pub fn init_logging(level: &str) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = fmt()
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_env_filter(filter)
        .try_init();
}
