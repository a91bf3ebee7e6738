//! Per-speaker voice selection
//!
//! Scripts with several characters name a speaker on each segment. A speaker
//! has a default style and may override it for particular dominant emotions.
//! Segments without a speaker, or with a speaker missing from the map, use the
//! emotion style table.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::vector::{EmotionLabel, EmotionVector};

/// Styles for one speaker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterVoice {
    /// Style used unless an emotion override applies
    pub style_id: u32,
    /// Style overrides keyed by dominant emotion
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub emotions: BTreeMap<EmotionLabel, u32>,
}

impl CharacterVoice {
    pub fn new(style_id: u32) -> Self {
        Self {
            style_id,
            emotions: BTreeMap::new(),
        }
    }

    /// Builder-style emotion override
    pub fn with_emotion(mut self, label: EmotionLabel, style_id: u32) -> Self {
        self.emotions.insert(label, style_id);
        self
    }
}

/// Speaker name → voice table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoiceMap {
    speakers: BTreeMap<String, CharacterVoice>,
}

impl VoiceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, speaker: impl Into<String>, voice: CharacterVoice) {
        self.speakers.insert(speaker.into(), voice);
    }

    pub fn with(mut self, speaker: impl Into<String>, voice: CharacterVoice) -> Self {
        self.insert(speaker, voice);
        self
    }

    pub fn get(&self, speaker: &str) -> Option<&CharacterVoice> {
        self.speakers.get(speaker)
    }

    pub fn len(&self) -> usize {
        self.speakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.speakers.is_empty()
    }

    /// Style for `speaker` given the segment's emotions
    ///
    /// The speaker's override for the dominant emotion wins over its default
    /// style. `None` when the speaker is unknown.
    pub fn style_for(&self, speaker: &str, emotions: &EmotionVector, threshold: f32) -> Option<u32> {
        let voice = self.speakers.get(speaker)?;
        let style = emotions
            .dominant(threshold)
            .and_then(|(label, _)| voice.emotions.get(&label).copied())
            .unwrap_or(voice.style_id);
        Some(style)
    }
}
