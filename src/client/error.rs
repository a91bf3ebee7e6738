//! Per-attempt engine call errors
//!
//! One [`EngineCallError`] describes why a single HTTP exchange with the
//! engine failed. The client retries retryable ones and converts the final
//! error into a per-segment [`TtsError`](crate::core::error::TtsError).

use std::fmt;

use crate::core::retry::Retryable;

/// Engine call error types
#[derive(Debug, Clone)]
pub enum EngineCallError {
    /// Connection refused, reset, or timed out
    Network { endpoint: String, message: String },
    /// The engine answered with a non-success status
    Status {
        endpoint: String,
        status_code: u16,
        message: String,
    },
    /// The engine answered 2xx but the body was unusable
    Response { endpoint: String, message: String },
}

impl fmt::Display for EngineCallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network { endpoint, message } => {
                write!(f, "[{}] Network error: {}", endpoint, message)
            }
            Self::Status {
                endpoint,
                status_code,
                message,
            } => write!(f, "[{}] HTTP {}: {}", endpoint, status_code, message),
            Self::Response { endpoint, message } => {
                write!(f, "[{}] Response parsing failed: {}", endpoint, message)
            }
        }
    }
}

impl std::error::Error for EngineCallError {}

impl EngineCallError {
    /// Create network error
    pub fn network(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Network {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Create status error
    pub fn status(endpoint: impl Into<String>, status_code: u16, message: impl Into<String>) -> Self {
        Self::Status {
            endpoint: endpoint.into(),
            status_code,
            message: message.into(),
        }
    }

    /// Create response error
    pub fn response(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Response {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Classify a transport error from reqwest
    pub fn from_reqwest(endpoint: impl Into<String>, err: &reqwest::Error) -> Self {
        let endpoint = endpoint.into();
        match err.status() {
            Some(status) => Self::status(endpoint, status.as_u16(), err.to_string()),
            None if err.is_decode() => Self::response(endpoint, err.to_string()),
            None => Self::network(endpoint, err.to_string()),
        }
    }

    /// HTTP status code, when the engine answered
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }

    pub fn endpoint(&self) -> &str {
        match self {
            Self::Network { endpoint, .. } => endpoint,
            Self::Status { endpoint, .. } => endpoint,
            Self::Response { endpoint, .. } => endpoint,
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } => true,
            // 5xx errors are retryable
            Self::Status { status_code, .. } => *status_code >= 500,
            Self::Response { .. } => false,
        }
    }
}

impl Retryable for EngineCallError {
    fn is_retryable(&self) -> bool {
        EngineCallError::is_retryable(self)
    }
}
