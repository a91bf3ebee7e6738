//! Core abstractions shared by every component
//!
//! # Modules
//!
//! - `error`: Structured error taxonomy for supervisor, segment and ambient failures
//! - `retry`: Bounded retry with exponential backoff

pub mod error;
pub mod retry;

pub use error::{AudioOperation, ErrorKind, Result, ResultExt, TtsError};
pub use retry::{RetryFailure, RetryPolicy, Retryable};
