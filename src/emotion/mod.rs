//! Emotion scores and their mapping onto synthesis parameters
//!
//! - Eight-label emotion vectors with English and Japanese label names
//! - Additive blending of per-emotion voice presets onto a neutral baseline
//! - Style selection from the dominant emotion, optionally per speaker
//! - Parameter tables loadable from TOML, YAML or JSON

pub mod mapper;
pub mod vector;
pub mod voices;

pub use mapper::{
    Bound, EmotionParameterMapper, ParameterBounds, ParameterDelta, ParameterTable,
    SynthesisParameters, NEUTRAL_STYLE_ID,
};
pub use vector::{EmotionLabel, EmotionVector, EMOTION_COUNT};
pub use voices::{CharacterVoice, VoiceMap};
