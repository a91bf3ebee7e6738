//! Structured error handling for the orchestration engine
//!
//! One error type covers the whole run. Variants fall into three groups:
//! - Supervisor-level failures, fatal to a run
//! - Per-segment failures, collected into the run report
//! - Ambient failures (configuration, I/O, audio, encode)

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Result type alias with TtsError
pub type Result<T> = std::result::Result<T, TtsError>;

/// Main error type for the orchestration engine
#[derive(Error, Debug, Clone)]
pub enum TtsError {
    /// The engine executable could not be located or launched
    #[error("Engine binary not found or not launchable ({path}): {message}")]
    EngineBinaryNotFound { path: PathBuf, message: String },

    /// The engine port is held by something that is not a live engine
    #[error("Engine port {port} on {host} is already in use by another process")]
    EnginePortConflict { host: String, port: u16 },

    /// The engine did not answer its liveness probe before the deadline
    #[error("Engine did not become ready within {}ms", .timeout.as_millis())]
    EngineStartupTimeout { timeout: Duration },

    /// The engine process exited while it was starting up
    #[error("Engine process exited during startup ({status})")]
    EngineExited { status: String },

    /// The engine rejected the request (4xx); retrying cannot help
    #[error("Segment {index}: invalid synthesis request{}: {message}", fmt_status(.status))]
    InvalidSynthesisRequest {
        index: usize,
        status: Option<u16>,
        message: String,
    },

    /// Every attempt failed with a transient error
    #[error("Segment {index}: synthesis unavailable after {attempts} attempt(s): {cause}")]
    SynthesisUnavailable {
        index: usize,
        attempts: u32,
        cause: String,
    },

    /// The engine answered, but the payload could not be decoded
    #[error("Segment {index}: malformed synthesis response: {message}")]
    MalformedSynthesisResponse { index: usize, message: String },

    /// The compressed encoder failed; the caller falls back to WAV
    #[error("Encode failure ({encoder}): {message}")]
    EncodeFailure { encoder: String, message: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        path: Option<PathBuf>,
    },

    /// Audio processing errors
    #[error("Audio processing error ({operation}): {message}")]
    Audio {
        message: String,
        operation: AudioOperation,
    },

    /// I/O errors
    #[error("I/O error: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
    },

    /// The run was cancelled before this work could complete
    #[error("Cancelled: {message}")]
    Cancelled { message: String },

    /// Internal/bug errors
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        location: Option<String>,
    },
}

fn fmt_status(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" (HTTP {})", code),
        None => String::new(),
    }
}

/// Coarse classification of a [`TtsError`] for programmatic handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    EngineBinaryNotFound,
    EnginePortConflict,
    EngineStartupTimeout,
    EngineExited,
    InvalidSynthesisRequest,
    SynthesisUnavailable,
    MalformedSynthesisResponse,
    EncodeFailure,
    Config,
    Audio,
    Io,
    Cancelled,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::EngineBinaryNotFound => "engine_binary_not_found",
            ErrorKind::EnginePortConflict => "engine_port_conflict",
            ErrorKind::EngineStartupTimeout => "engine_startup_timeout",
            ErrorKind::EngineExited => "engine_exited",
            ErrorKind::InvalidSynthesisRequest => "invalid_synthesis_request",
            ErrorKind::SynthesisUnavailable => "synthesis_unavailable",
            ErrorKind::MalformedSynthesisResponse => "malformed_synthesis_response",
            ErrorKind::EncodeFailure => "encode_failure",
            ErrorKind::Config => "config",
            ErrorKind::Audio => "audio",
            ErrorKind::Io => "io",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Internal => "internal",
        };
        f.write_str(name)
    }
}

impl TtsError {
    /// Get the error kind
    pub fn kind(&self) -> ErrorKind {
        match self {
            TtsError::EngineBinaryNotFound { .. } => ErrorKind::EngineBinaryNotFound,
            TtsError::EnginePortConflict { .. } => ErrorKind::EnginePortConflict,
            TtsError::EngineStartupTimeout { .. } => ErrorKind::EngineStartupTimeout,
            TtsError::EngineExited { .. } => ErrorKind::EngineExited,
            TtsError::InvalidSynthesisRequest { .. } => ErrorKind::InvalidSynthesisRequest,
            TtsError::SynthesisUnavailable { .. } => ErrorKind::SynthesisUnavailable,
            TtsError::MalformedSynthesisResponse { .. } => ErrorKind::MalformedSynthesisResponse,
            TtsError::EncodeFailure { .. } => ErrorKind::EncodeFailure,
            TtsError::Config { .. } => ErrorKind::Config,
            TtsError::Audio { .. } => ErrorKind::Audio,
            TtsError::Io { .. } => ErrorKind::Io,
            TtsError::Cancelled { .. } => ErrorKind::Cancelled,
            TtsError::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Segment index this error belongs to, if it is a per-segment failure
    pub fn segment_index(&self) -> Option<usize> {
        match self {
            TtsError::InvalidSynthesisRequest { index, .. }
            | TtsError::SynthesisUnavailable { index, .. }
            | TtsError::MalformedSynthesisResponse { index, .. } => Some(*index),
            _ => None,
        }
    }

    /// Supervisor-level failures: no segment can succeed without a live engine
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::EngineBinaryNotFound
                | ErrorKind::EnginePortConflict
                | ErrorKind::EngineStartupTimeout
                | ErrorKind::EngineExited
        )
    }

    /// Per-segment failures that the run collects instead of aborting
    pub fn is_segment_failure(&self) -> bool {
        self.segment_index().is_some()
    }

    /// Shorthand for a configuration error without a path
    pub fn config(message: impl Into<String>) -> Self {
        TtsError::Config {
            message: message.into(),
            path: None,
        }
    }

    /// Shorthand for an audio error
    pub fn audio(operation: AudioOperation, message: impl Into<String>) -> Self {
        TtsError::Audio {
            message: message.into(),
            operation,
        }
    }
}

/// Audio operation types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioOperation {
    Decoding,
    Resampling,
    Processing,
    Assembling,
    Encoding,
    Saving,
}

impl fmt::Display for AudioOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioOperation::Decoding => write!(f, "decoding"),
            AudioOperation::Resampling => write!(f, "resampling"),
            AudioOperation::Processing => write!(f, "processing"),
            AudioOperation::Assembling => write!(f, "assembling"),
            AudioOperation::Encoding => write!(f, "encoding"),
            AudioOperation::Saving => write!(f, "saving"),
        }
    }
}

/// Attach a [`TtsError`] variant to foreign errors
pub trait ResultExt<T> {
    /// Report the error as a failed audio operation
    fn audio_op(self, operation: AudioOperation) -> Result<T>;

    /// Report the error as an I/O failure on `path`
    fn io_at(self, action: &str, path: &Path) -> Result<T>;
}

impl<T, E: fmt::Display> ResultExt<T> for std::result::Result<T, E> {
    fn audio_op(self, operation: AudioOperation) -> Result<T> {
        self.map_err(|e| TtsError::audio(operation, e.to_string()))
    }

    fn io_at(self, action: &str, path: &Path) -> Result<T> {
        self.map_err(|e| TtsError::Io {
            message: format!("{}: {}", action, e),
            path: Some(path.to_path_buf()),
        })
    }
}

/// Convert from std::io::Error
impl From<std::io::Error> for TtsError {
    fn from(err: std::io::Error) -> Self {
        TtsError::Io {
            message: err.to_string(),
            path: None,
        }
    }
}

impl From<hound::Error> for TtsError {
    fn from(err: hound::Error) -> Self {
        TtsError::Audio {
            message: err.to_string(),
            operation: AudioOperation::Decoding,
        }
    }
}
