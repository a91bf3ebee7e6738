//! Per-segment post-processing
//!
//! Applied to each synthesized segment, in order:
//! 1. DC offset removal
//! 2. Edge silence trim
//! 3. Fade in/out
//! 4. RMS loudness normalization
//! 5. Hard limit to [-1, 1]

use serde::{Deserialize, Serialize};

use crate::config::AssemblySettings;

/// Fade gain curve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FadeCurve {
    #[default]
    Linear,
    EqualPower,
}

impl FadeCurve {
    /// Gain at position `t` in [0, 1] of a fade-in
    fn gain(&self, t: f32) -> f32 {
        match self {
            FadeCurve::Linear => t,
            FadeCurve::EqualPower => (t * std::f32::consts::FRAC_PI_2).sin(),
        }
    }
}

/// Options for [`SegmentProcessor`]
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingOptions {
    pub remove_dc: bool,
    pub silence_threshold: f32,
    pub trim_margin: usize,
    pub apply_fade: bool,
    pub fade_samples: usize,
    pub fade_curve: FadeCurve,
    pub normalize: bool,
    pub target_dbfs: f32,
}

impl Default for ProcessingOptions {
    fn default() -> Self {
        Self::from(&AssemblySettings::default())
    }
}

impl From<&AssemblySettings> for ProcessingOptions {
    fn from(settings: &AssemblySettings) -> Self {
        Self {
            remove_dc: settings.remove_dc,
            silence_threshold: settings.silence_threshold,
            trim_margin: settings.trim_margin_samples,
            apply_fade: settings.apply_fade,
            fade_samples: settings.fade_samples,
            fade_curve: settings.fade_curve,
            normalize: settings.normalize,
            target_dbfs: settings.target_dbfs,
        }
    }
}

/// Stateless segment post-processor
#[derive(Debug, Clone, Default)]
pub struct SegmentProcessor {
    options: ProcessingOptions,
}

impl SegmentProcessor {
    pub fn new(options: ProcessingOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ProcessingOptions {
        &self.options
    }

    /// Run the full chain over one segment's samples
    pub fn process(&self, mut samples: Vec<f32>) -> Vec<f32> {
        let o = &self.options;

        if o.remove_dc {
            remove_dc(&mut samples);
        }

        let mut samples = trim_silence(&samples, o.silence_threshold, o.trim_margin).to_vec();

        if o.apply_fade {
            apply_fade(&mut samples, o.fade_samples, o.fade_curve);
        }

        if o.normalize {
            normalize_rms(&mut samples, o.target_dbfs);
        }

        for s in samples.iter_mut() {
            *s = s.clamp(-1.0, 1.0);
        }

        samples
    }
}

/// Subtract the mean
pub fn remove_dc(samples: &mut [f32]) {
    if samples.is_empty() {
        return;
    }
    let mean = samples.iter().map(|&s| s as f64).sum::<f64>() / samples.len() as f64;
    let mean = mean as f32;
    for s in samples.iter_mut() {
        *s -= mean;
    }
}

/// Drop leading and trailing samples at or below `threshold`, keeping
/// `margin` samples of context; an all-silent input trims to empty
pub fn trim_silence(samples: &[f32], threshold: f32, margin: usize) -> &[f32] {
    let first = samples.iter().position(|s| s.abs() > threshold);
    let last = samples.iter().rposition(|s| s.abs() > threshold);

    match (first, last) {
        (Some(first), Some(last)) => {
            let start = first.saturating_sub(margin);
            let end = (last + 1 + margin).min(samples.len());
            &samples[start..end]
        }
        _ => &[],
    }
}

/// Fade both edges over `fade_samples` (shortened for very short input)
pub fn apply_fade(samples: &mut [f32], fade_samples: usize, curve: FadeCurve) {
    let len = samples.len();
    let n = fade_samples.min(len / 2);
    if n < 2 {
        return;
    }

    let denom = (n - 1) as f32;
    for i in 0..n {
        let gain = curve.gain(i as f32 / denom);
        samples[i] *= gain;
        samples[len - 1 - i] *= gain;
    }
}

/// Root mean square
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum / samples.len() as f64).sqrt() as f32
}

/// Scale to `target_dbfs` RMS; silence is left untouched
pub fn normalize_rms(samples: &mut [f32], target_dbfs: f32) {
    let current = rms(samples);
    if current <= 1e-9 {
        return;
    }
    let current_db = 20.0 * current.log10();
    let gain = 10f32.powf((target_dbfs - current_db) / 20.0);
    for s in samples.iter_mut() {
        *s *= gain;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(len: usize, amplitude: f32) -> Vec<f32> {
        (0..len)
            .map(|i| amplitude * (2.0 * std::f32::consts::PI * 220.0 * i as f32 / 24000.0).sin())
            .collect()
    }

    #[test]
    fn test_remove_dc() {
        let mut samples = vec![0.6, 0.4, 0.6, 0.4];
        remove_dc(&mut samples);
        let mean: f32 = samples.iter().sum::<f32>() / 4.0;
        assert!(mean.abs() < 1e-6);
    }

    #[test]
    fn test_trim_keeps_margin() {
        let mut samples = vec![0.0; 1000];
        for s in &mut samples[400..500] {
            *s = 0.5;
        }
        let trimmed = trim_silence(&samples, 0.01, 100);
        // 300..600: 100 samples of context on both sides
        assert_eq!(trimmed.len(), 300);
        assert_eq!(trimmed[100], 0.5);
        assert_eq!(trimmed[199], 0.5);
        assert_eq!(trimmed[200], 0.0);
    }

    #[test]
    fn test_trim_margin_clipped_at_edges() {
        let mut samples = vec![0.0; 50];
        samples[2] = 0.5;
        samples[47] = 0.5;
        assert_eq!(trim_silence(&samples, 0.01, 100).len(), 50);

        let single = [0.0, 0.0, 0.9, 0.0, 0.0];
        assert_eq!(trim_silence(&single, 0.01, 1), &[0.0, 0.9, 0.0]);
    }

    #[test]
    fn test_threshold_is_absolute_amplitude() {
        // a quiet peak does not scale the threshold down
        let samples = [0.005, 0.005, 0.1, 0.005];
        assert_eq!(trim_silence(&samples, 0.01, 0), &[0.1]);
        assert_eq!(trim_silence(&[0.01, 0.02, 0.01], 0.01, 0), &[0.02]);
    }

    #[test]
    fn test_trim_all_silent_is_empty() {
        let samples = vec![0.005; 500];
        assert!(trim_silence(&samples, 0.01, 100).is_empty());
    }

    #[test]
    fn test_linear_fade_edges() {
        let mut samples = vec![1.0; 1000];
        apply_fade(&mut samples, 100, FadeCurve::Linear);
        assert_eq!(samples[0], 0.0);
        assert_eq!(samples[999], 0.0);
        assert!((samples[99] - 1.0).abs() < 1e-6);
        assert!((samples[50] - 50.0 / 99.0).abs() < 1e-6);
        assert_eq!(samples[500], 1.0);
    }

    #[test]
    fn test_equal_power_fade() {
        let mut samples = vec![1.0; 1000];
        apply_fade(&mut samples, 100, FadeCurve::EqualPower);
        assert_eq!(samples[0], 0.0);
        assert!(samples[50] > 50.0 / 99.0);
    }

    #[test]
    fn test_normalize_hits_target() {
        let mut samples = tone(24000, 0.05);
        normalize_rms(&mut samples, -20.0);
        let db = 20.0 * rms(&samples).log10();
        assert!((db + 20.0).abs() < 0.01);
    }

    #[test]
    fn test_normalize_silence_is_noop() {
        let mut samples = vec![0.0; 100];
        normalize_rms(&mut samples, -20.0);
        assert!(samples.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_process_chain_limits_output() {
        let mut samples = vec![0.0; 200];
        samples.extend(tone(4800, 0.9));
        samples.extend(vec![0.0; 200]);
        let processor = SegmentProcessor::new(ProcessingOptions {
            target_dbfs: 0.0,
            ..Default::default()
        });
        let out = processor.process(samples);
        assert!(out.len() < 5200);
        assert!(out.iter().all(|s| (-1.0..=1.0).contains(s)));
        assert_eq!(out[0], 0.0);
    }
}
