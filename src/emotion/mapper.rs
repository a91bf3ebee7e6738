//! Emotion → synthesis parameter mapping
//!
//! Blending is additive: the neutral baseline plus `score × delta` for every
//! active emotion, clamped per dimension to the engine's accepted range.
//! A delta is an emotion's voice preset minus the neutral preset.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::vector::{EmotionLabel, EmotionVector};
use crate::core::error::{Result, ResultExt, TtsError};

/// Engine control parameters for one segment
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisParameters {
    /// Pitch contour strength
    pub intonation_scale: f64,
    /// Rhythmic variation
    pub tempo_dynamics_scale: f64,
    /// Speaking rate
    pub speed_scale: f64,
    /// Pitch offset
    pub pitch_scale: f64,
    /// Output gain
    pub volume_scale: f64,
    /// Leading silence before the first phoneme (seconds)
    pub pre_phoneme_length: f64,
}

impl SynthesisParameters {
    /// The neutral voice preset
    pub const NEUTRAL: SynthesisParameters = SynthesisParameters {
        intonation_scale: 1.0,
        tempo_dynamics_scale: 1.0,
        speed_scale: 1.0,
        pitch_scale: 0.0,
        volume_scale: 1.0,
        pre_phoneme_length: 0.1,
    };

    fn add_scaled(&mut self, delta: &ParameterDelta, weight: f64) {
        self.intonation_scale += weight * delta.intonation_scale;
        self.tempo_dynamics_scale += weight * delta.tempo_dynamics_scale;
        self.speed_scale += weight * delta.speed_scale;
        self.pitch_scale += weight * delta.pitch_scale;
        self.volume_scale += weight * delta.volume_scale;
        self.pre_phoneme_length += weight * delta.pre_phoneme_length;
    }
}

impl Default for SynthesisParameters {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

/// Per-label offset from the neutral baseline
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ParameterDelta {
    #[serde(default)]
    pub intonation_scale: f64,
    #[serde(default)]
    pub tempo_dynamics_scale: f64,
    #[serde(default)]
    pub speed_scale: f64,
    #[serde(default)]
    pub pitch_scale: f64,
    #[serde(default)]
    pub volume_scale: f64,
    #[serde(default)]
    pub pre_phoneme_length: f64,
}

impl ParameterDelta {
    /// Delta that moves the neutral preset onto `preset`
    pub fn from_preset(preset: &SynthesisParameters) -> Self {
        let n = SynthesisParameters::NEUTRAL;
        Self {
            intonation_scale: preset.intonation_scale - n.intonation_scale,
            tempo_dynamics_scale: preset.tempo_dynamics_scale - n.tempo_dynamics_scale,
            speed_scale: preset.speed_scale - n.speed_scale,
            pitch_scale: preset.pitch_scale - n.pitch_scale,
            volume_scale: preset.volume_scale - n.volume_scale,
            pre_phoneme_length: preset.pre_phoneme_length - n.pre_phoneme_length,
        }
    }

    fn is_finite(&self) -> bool {
        [
            self.intonation_scale,
            self.tempo_dynamics_scale,
            self.speed_scale,
            self.pitch_scale,
            self.volume_scale,
            self.pre_phoneme_length,
        ]
        .iter()
        .all(|v| v.is_finite())
    }
}

/// Inclusive range
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bound {
    pub min: f64,
    pub max: f64,
}

impl Bound {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn clamp(&self, value: f64) -> f64 {
        if value.is_nan() {
            return self.min;
        }
        value.clamp(self.min, self.max)
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Engine-accepted range for each parameter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParameterBounds {
    pub intonation_scale: Bound,
    pub tempo_dynamics_scale: Bound,
    pub speed_scale: Bound,
    pub pitch_scale: Bound,
    pub volume_scale: Bound,
    pub pre_phoneme_length: Bound,
}

impl Default for ParameterBounds {
    fn default() -> Self {
        Self {
            intonation_scale: Bound::new(0.0, 2.0),
            tempo_dynamics_scale: Bound::new(0.0, 2.0),
            speed_scale: Bound::new(0.5, 2.0),
            pitch_scale: Bound::new(-0.15, 0.15),
            volume_scale: Bound::new(0.0, 2.0),
            pre_phoneme_length: Bound::new(0.0, 1.5),
        }
    }
}

impl ParameterBounds {
    /// Clamp every field of `params` into range
    pub fn clamp(&self, params: &SynthesisParameters) -> SynthesisParameters {
        SynthesisParameters {
            intonation_scale: self.intonation_scale.clamp(params.intonation_scale),
            tempo_dynamics_scale: self.tempo_dynamics_scale.clamp(params.tempo_dynamics_scale),
            speed_scale: self.speed_scale.clamp(params.speed_scale),
            pitch_scale: self.pitch_scale.clamp(params.pitch_scale),
            volume_scale: self.volume_scale.clamp(params.volume_scale),
            pre_phoneme_length: self.pre_phoneme_length.clamp(params.pre_phoneme_length),
        }
    }

    /// Whether every field of `params` is in range
    pub fn contains(&self, params: &SynthesisParameters) -> bool {
        self.intonation_scale.contains(params.intonation_scale)
            && self.tempo_dynamics_scale.contains(params.tempo_dynamics_scale)
            && self.speed_scale.contains(params.speed_scale)
            && self.pitch_scale.contains(params.pitch_scale)
            && self.volume_scale.contains(params.volume_scale)
            && self.pre_phoneme_length.contains(params.pre_phoneme_length)
    }

    fn named(&self) -> [(&'static str, Bound); 6] {
        [
            ("intonation_scale", self.intonation_scale),
            ("tempo_dynamics_scale", self.tempo_dynamics_scale),
            ("speed_scale", self.speed_scale),
            ("pitch_scale", self.pitch_scale),
            ("volume_scale", self.volume_scale),
            ("pre_phoneme_length", self.pre_phoneme_length),
        ]
    }
}

/// Neutral AivisSpeech style id
pub const NEUTRAL_STYLE_ID: u32 = 888753761;

/// Voice preset and style id for each label
fn preset(label: EmotionLabel) -> (SynthesisParameters, u32) {
    let p = |intonation, tempo, speed, pitch, volume, pre| SynthesisParameters {
        intonation_scale: intonation,
        tempo_dynamics_scale: tempo,
        speed_scale: speed,
        pitch_scale: pitch,
        volume_scale: volume,
        pre_phoneme_length: pre,
    };
    match label {
        EmotionLabel::Joy => (p(1.2, 1.15, 1.1, 0.03, 1.1, 0.1), 888753764),
        EmotionLabel::Sadness => (p(0.7, 0.85, 0.9, -0.02, 0.9, 0.2), 888753765),
        EmotionLabel::Anticipation => (p(1.05, 1.1, 1.05, 0.02, 1.05, 0.1), 888753762),
        EmotionLabel::Surprise => (p(1.3, 1.2, 1.15, 0.05, 1.2, 0.1), 888753762),
        EmotionLabel::Anger => (p(1.3, 1.2, 1.05, 0.04, 1.3, 0.1), 888753765),
        EmotionLabel::Fear => (p(1.1, 1.1, 1.1, 0.03, 0.9, 0.2), 888753763),
        EmotionLabel::Disgust => (p(1.15, 1.05, 0.95, 0.02, 1.1, 0.2), 888753765),
        EmotionLabel::Trust => (p(1.02, 1.0, 0.95, 0.01, 1.0, 0.1), 888753763),
    }
}

fn default_deltas() -> BTreeMap<EmotionLabel, ParameterDelta> {
    EmotionLabel::ALL
        .iter()
        .map(|&label| (label, ParameterDelta::from_preset(&preset(label).0)))
        .collect()
}

fn default_style_ids() -> BTreeMap<EmotionLabel, u32> {
    EmotionLabel::ALL
        .iter()
        .map(|&label| (label, preset(label).1))
        .collect()
}

fn default_neutral_style_id() -> u32 {
    NEUTRAL_STYLE_ID
}

/// Label → delta / style table, loadable from a file
///
/// Sections omitted from a file keep their defaults. Labels missing from a
/// provided `deltas` or `style_ids` section fall back to a zero delta and the
/// neutral style.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterTable {
    #[serde(default)]
    pub baseline: SynthesisParameters,
    #[serde(default)]
    pub bounds: ParameterBounds,
    #[serde(default = "default_deltas")]
    pub deltas: BTreeMap<EmotionLabel, ParameterDelta>,
    #[serde(default = "default_neutral_style_id")]
    pub neutral_style_id: u32,
    #[serde(default = "default_style_ids")]
    pub style_ids: BTreeMap<EmotionLabel, u32>,
}

impl Default for ParameterTable {
    fn default() -> Self {
        Self {
            baseline: SynthesisParameters::NEUTRAL,
            bounds: ParameterBounds::default(),
            deltas: default_deltas(),
            neutral_style_id: NEUTRAL_STYLE_ID,
            style_ids: default_style_ids(),
        }
    }
}

impl ParameterTable {
    /// Load a table from TOML, YAML or JSON, chosen by file extension
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).io_at("Failed to read parameter table", path)?;

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        let parse_err = |e: String| TtsError::Config {
            message: format!("Failed to parse parameter table: {}", e),
            path: Some(path.to_path_buf()),
        };

        let table: Self = match ext.as_str() {
            "toml" => toml::from_str(&content).map_err(|e| parse_err(e.to_string()))?,
            "yaml" | "yml" => serde_yaml::from_str(&content).map_err(|e| parse_err(e.to_string()))?,
            "json" => serde_json::from_str(&content).map_err(|e| parse_err(e.to_string()))?,
            other => {
                return Err(TtsError::Config {
                    message: format!("Unsupported parameter table format: '{}'", other),
                    path: Some(path.to_path_buf()),
                })
            }
        };

        table.validate()?;
        Ok(table)
    }

    /// Check bounds are ordered and every value is finite
    pub fn validate(&self) -> Result<()> {
        for (name, bound) in self.bounds.named() {
            if !bound.min.is_finite() || !bound.max.is_finite() || bound.min > bound.max {
                return Err(TtsError::config(format!(
                    "Invalid bound for {}: [{}, {}]",
                    name, bound.min, bound.max
                )));
            }
        }
        for (label, delta) in &self.deltas {
            if !delta.is_finite() {
                return Err(TtsError::config(format!("Non-finite delta for {}", label)));
            }
        }
        Ok(())
    }

    pub fn delta(&self, label: EmotionLabel) -> ParameterDelta {
        self.deltas.get(&label).copied().unwrap_or_default()
    }

    pub fn style_id(&self, label: EmotionLabel) -> u32 {
        self.style_ids
            .get(&label)
            .copied()
            .unwrap_or(self.neutral_style_id)
    }
}

/// Pure mapping from emotion scores to engine parameters
#[derive(Debug, Clone)]
pub struct EmotionParameterMapper {
    table: ParameterTable,
    threshold: f32,
}

impl Default for EmotionParameterMapper {
    fn default() -> Self {
        Self::new(ParameterTable::default(), 0.05)
    }
}

impl EmotionParameterMapper {
    pub fn new(table: ParameterTable, threshold: f32) -> Self {
        Self { table, threshold }
    }

    pub fn table(&self) -> &ParameterTable {
        &self.table
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Blend active emotions onto the baseline and clamp
    pub fn map(&self, emotions: &EmotionVector) -> SynthesisParameters {
        let mut params = self.table.baseline;
        for (label, score) in emotions.active(self.threshold) {
            params.add_scaled(&self.table.delta(label), score as f64);
        }
        self.table.bounds.clamp(&params)
    }

    /// Style id of the dominant active emotion, or the neutral style
    pub fn style_for(&self, emotions: &EmotionVector) -> u32 {
        match emotions.dominant(self.threshold) {
            Some((label, _)) => self.table.style_id(label),
            None => self.table.neutral_style_id,
        }
    }
}
