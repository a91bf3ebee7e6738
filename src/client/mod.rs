//! Synthesis client for the AivisSpeech engine
//!
//! - `aivis`: two-step query/synthesis exchange with retry
//! - `error`: per-attempt call errors and their retry classification
//! - `text`: text normalization before synthesis

pub mod aivis;
pub mod error;
pub mod text;

pub use aivis::AivisClient;
pub use error::EngineCallError;
pub use text::preprocess_text;
