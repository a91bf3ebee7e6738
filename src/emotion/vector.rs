//! Emotion labels and score vectors
//!
//! The label set is the eight Plutchik basic emotions, in the order the
//! upstream classifier emits them:
//!
//! | Index | Label | Japanese |
//! |-------|-------|----------|
//! | 0 | joy | 喜び |
//! | 1 | sadness | 悲しみ |
//! | 2 | anticipation | 期待 |
//! | 3 | surprise | 驚き |
//! | 4 | anger | 怒り |
//! | 5 | fear | 恐れ |
//! | 6 | disgust | 嫌悪 |
//! | 7 | trust | 信頼 |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::error::TtsError;

/// Number of emotion labels
pub const EMOTION_COUNT: usize = 8;

/// Closed set of emotion labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmotionLabel {
    Joy,
    Sadness,
    Anticipation,
    Surprise,
    Anger,
    Fear,
    Disgust,
    Trust,
}

impl EmotionLabel {
    /// All labels in index order
    pub const ALL: [EmotionLabel; EMOTION_COUNT] = [
        EmotionLabel::Joy,
        EmotionLabel::Sadness,
        EmotionLabel::Anticipation,
        EmotionLabel::Surprise,
        EmotionLabel::Anger,
        EmotionLabel::Fear,
        EmotionLabel::Disgust,
        EmotionLabel::Trust,
    ];

    /// English name
    pub fn name(&self) -> &'static str {
        match self {
            EmotionLabel::Joy => "joy",
            EmotionLabel::Sadness => "sadness",
            EmotionLabel::Anticipation => "anticipation",
            EmotionLabel::Surprise => "surprise",
            EmotionLabel::Anger => "anger",
            EmotionLabel::Fear => "fear",
            EmotionLabel::Disgust => "disgust",
            EmotionLabel::Trust => "trust",
        }
    }

    /// Japanese name used by the classifier
    pub fn japanese_name(&self) -> &'static str {
        match self {
            EmotionLabel::Joy => "喜び",
            EmotionLabel::Sadness => "悲しみ",
            EmotionLabel::Anticipation => "期待",
            EmotionLabel::Surprise => "驚き",
            EmotionLabel::Anger => "怒り",
            EmotionLabel::Fear => "恐れ",
            EmotionLabel::Disgust => "嫌悪",
            EmotionLabel::Trust => "信頼",
        }
    }

    /// Position in a score array
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Label at a score array position
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

impl fmt::Display for EmotionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EmotionLabel {
    type Err = TtsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let lower = trimmed.to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|label| label.name() == lower || label.japanese_name() == trimmed)
            .ok_or_else(|| TtsError::config(format!("Unknown emotion label: '{}'", s)))
    }
}

/// Emotion scores in [0, 1], one per label
///
/// Scores do not need to sum to 1. Values outside [0, 1] are clamped and NaN
/// becomes 0.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EmotionVector {
    scores: [f32; EMOTION_COUNT],
}

fn sanitize(score: f32) -> f32 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}

impl EmotionVector {
    /// All-zero vector
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from scores in label index order
    pub fn from_array(scores: [f32; EMOTION_COUNT]) -> Self {
        Self {
            scores: scores.map(sanitize),
        }
    }

    /// Build from a slice in label index order; extra entries are an error
    pub fn from_slice(scores: &[f32]) -> crate::core::error::Result<Self> {
        if scores.len() > EMOTION_COUNT {
            return Err(TtsError::config(format!(
                "Emotion score array has {} entries, expected at most {}",
                scores.len(),
                EMOTION_COUNT
            )));
        }
        let mut vector = Self::new();
        for (i, &score) in scores.iter().enumerate() {
            vector.scores[i] = sanitize(score);
        }
        Ok(vector)
    }

    /// Builder-style setter
    pub fn with(mut self, label: EmotionLabel, score: f32) -> Self {
        self.set(label, score);
        self
    }

    pub fn set(&mut self, label: EmotionLabel, score: f32) {
        self.scores[label.index()] = sanitize(score);
    }

    pub fn get(&self, label: EmotionLabel) -> f32 {
        self.scores[label.index()]
    }

    /// Raw scores in label index order
    pub fn scores(&self) -> &[f32; EMOTION_COUNT] {
        &self.scores
    }

    /// Every (label, score) pair in label order, including zeros
    pub fn iter(&self) -> impl Iterator<Item = (EmotionLabel, f32)> + '_ {
        EmotionLabel::ALL.iter().map(move |&label| (label, self.get(label)))
    }

    /// Labels whose score reaches `threshold`, in label order
    pub fn active(&self, threshold: f32) -> impl Iterator<Item = (EmotionLabel, f32)> + '_ {
        self.iter()
            .filter(move |&(_, score)| score > 0.0 && score >= threshold)
    }

    /// Highest-scoring active label; ties go to the earlier label
    pub fn dominant(&self, threshold: f32) -> Option<(EmotionLabel, f32)> {
        self.active(threshold).fold(None, |best, (label, score)| match best {
            Some((_, best_score)) if best_score >= score => best,
            _ => Some((label, score)),
        })
    }
}

impl fmt::Display for EmotionVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (label, score) in self.iter().filter(|&(_, s)| s > 0.0) {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{}={:.2}", label, score)?;
            first = false;
        }
        if first {
            f.write_str("neutral")?;
        }
        Ok(())
    }
}
