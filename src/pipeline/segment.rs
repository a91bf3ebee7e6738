//! Caller input and prepared segments

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::core::error::{Result, ResultExt, TtsError};
use crate::emotion::{EmotionLabel, EmotionParameterMapper, EmotionVector, SynthesisParameters};

/// One `(text, emotion scores)` item supplied by the caller
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentInput {
    pub text: String,
    pub emotions: EmotionVector,
    /// Character speaking this line, looked up in the voice map
    pub speaker: Option<String>,
}

/// Emotion scores as they appear in input files
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawScores {
    /// `{"joy": 0.8}` or `{"喜び": 0.8}`
    Named(BTreeMap<String, f32>),
    /// Eight scores in label order
    Positional(Vec<f32>),
}

#[derive(Debug, Clone, Deserialize)]
struct RawSegment {
    text: String,
    #[serde(default)]
    emotions: Option<RawScores>,
    #[serde(default)]
    speaker: Option<String>,
}

impl SegmentInput {
    pub fn new(text: impl Into<String>, emotions: EmotionVector) -> Self {
        Self {
            text: text.into(),
            emotions,
            speaker: None,
        }
    }

    pub fn with_speaker(mut self, speaker: impl Into<String>) -> Self {
        self.speaker = Some(speaker.into());
        self
    }

    /// Parse a JSON array of `{"text": .., "emotions": .., "speaker": ..}` objects
    pub fn parse_json(json: &str) -> Result<Vec<Self>> {
        let raw: Vec<RawSegment> = serde_json::from_str(json).map_err(|e| TtsError::Config {
            message: format!("Invalid input JSON: {}", e),
            path: None,
        })?;

        raw.into_iter()
            .enumerate()
            .map(|(i, item)| {
                let emotions = match item.emotions {
                    None => EmotionVector::new(),
                    Some(RawScores::Positional(scores)) => EmotionVector::from_slice(&scores)?,
                    Some(RawScores::Named(scores)) => {
                        let mut vector = EmotionVector::new();
                        for (name, score) in scores {
                            let label: EmotionLabel = name.parse().map_err(|e: TtsError| {
                                TtsError::config(format!("Input item {}: {}", i, e))
                            })?;
                            vector.set(label, score);
                        }
                        vector
                    }
                };
                Ok(Self {
                    text: item.text,
                    emotions,
                    speaker: item.speaker.filter(|s| !s.trim().is_empty()),
                })
            })
            .collect()
    }

    /// Read and parse an input file
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Vec<Self>> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).io_at("Failed to read input file", path)?;
        Self::parse_json(&content).map_err(|e| match e {
            TtsError::Config { message, .. } => TtsError::Config {
                message,
                path: Some(path.to_path_buf()),
            },
            other => other,
        })
    }
}

/// Keep the inclusive index range `from..=to` of a script
///
/// Missing bounds mean the start and the end; `to` past the end is clipped.
/// A range that selects nothing is a configuration error.
pub fn select_range(
    inputs: Vec<SegmentInput>,
    from: Option<usize>,
    to: Option<usize>,
) -> Result<Vec<SegmentInput>> {
    if from.is_none() && to.is_none() {
        return Ok(inputs);
    }
    let len = inputs.len();
    let start = from.unwrap_or(0);
    let end = to.unwrap_or(usize::MAX).min(len.saturating_sub(1));
    if len == 0 || start > end {
        return Err(TtsError::config(format!(
            "Segment range {}..={} selects nothing from {} segment(s)",
            start,
            to.map(|t| t.to_string()).unwrap_or_else(|| "end".to_string()),
            len
        )));
    }
    Ok(inputs.into_iter().skip(start).take(end - start + 1).collect())
}

/// A unit of synthesis work, fixed once prepared
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    index: usize,
    text: String,
    emotions: EmotionVector,
    speaker: Option<String>,
    parameters: SynthesisParameters,
    style_id: u32,
}

impl Segment {
    /// Prepare a segment, deriving parameters and style from `mapper`
    pub fn new(
        index: usize,
        text: impl Into<String>,
        emotions: EmotionVector,
        mapper: &EmotionParameterMapper,
    ) -> Self {
        Self {
            index,
            text: text.into(),
            speaker: None,
            parameters: mapper.map(&emotions),
            style_id: mapper.style_for(&emotions),
            emotions,
        }
    }

    /// Attribute the segment to `speaker`, speaking with `style_id`
    pub fn with_voice(mut self, speaker: impl Into<String>, style_id: u32) -> Self {
        self.speaker = Some(speaker.into());
        self.style_id = style_id;
        self
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn emotions(&self) -> &EmotionVector {
        &self.emotions
    }

    pub fn speaker(&self) -> Option<&str> {
        self.speaker.as_deref()
    }

    pub fn parameters(&self) -> &SynthesisParameters {
        &self.parameters
    }

    pub fn style_id(&self) -> u32 {
        self.style_id
    }

    /// Whether there is nothing to speak
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}
