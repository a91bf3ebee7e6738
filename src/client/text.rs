//! Text normalization before synthesis

/// Sentence endings the engine handles without an added full stop
const TERMINATORS: [char; 7] = ['。', '！', '？', '、', '.', '!', '?'];

/// Trim, collapse whitespace runs and make sure the text ends a sentence
///
/// Returns an empty string when nothing speakable remains.
pub fn preprocess_text(text: &str) -> String {
    let mut normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalized.is_empty() {
        return normalized;
    }
    if !normalized.ends_with(&TERMINATORS[..]) {
        normalized.push('。');
    }
    normalized
}
