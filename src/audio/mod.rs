//! Audio handling
//!
//! - WAV decoding with down-mix and resampling into mono buffers
//! - Per-segment trim, fade and loudness normalization
//! - Ordered concatenation with inter-segment silence
//! - Final encode to AAC/m4a with WAV fallback

pub mod assembler;
pub mod buffer;
pub mod encoder;
pub mod processor;
mod resampler;

pub use assembler::{AssembledStream, AudioAssembler, ReorderBuffer, SegmentBoundary, SegmentOutcome};
pub use buffer::AudioBuffer;
pub use encoder::{AudioEncoder, EncodedAudio, OutputEncoding};
pub use processor::{FadeCurve, ProcessingOptions, SegmentProcessor};
pub use resampler::resample_mono;
