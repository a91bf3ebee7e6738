//! Sample rate conversion for engine output
//!
//! Only used when the engine ignores `outputSamplingRate`. The converter's
//! group delay is flushed and dropped, so the output starts aligned with the
//! input and holds `round(len * to / from)` samples.

use rubato::{
    calculate_cutoff, Resampler as _, SincFixedIn, SincInterpolationParameters,
    SincInterpolationType, WindowFunction,
};

use crate::core::error::{AudioOperation, Result, ResultExt, TtsError};

/// Input frames fed to the converter per call
const BLOCK: usize = 1024;

const SINC_LEN: usize = 128;

/// Convert mono `samples` from `from_rate` to `to_rate`
pub fn resample_mono(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if from_rate == 0 || to_rate == 0 {
        return Err(TtsError::audio(
            AudioOperation::Resampling,
            format!("invalid rates {} -> {}", from_rate, to_rate),
        ));
    }
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let ratio = to_rate as f64 / from_rate as f64;
    let window = WindowFunction::BlackmanHarris2;
    let block = samples.len().min(BLOCK);
    let mut converter = SincFixedIn::<f32>::new(
        ratio,
        1.0,
        SincInterpolationParameters {
            sinc_len: SINC_LEN,
            f_cutoff: calculate_cutoff(SINC_LEN, window),
            interpolation: SincInterpolationType::Cubic,
            oversampling_factor: 128,
            window,
        },
        block,
        1,
    )
    .audio_op(AudioOperation::Resampling)?;

    let wanted = (samples.len() as f64 * ratio).round() as usize;
    let delay = converter.output_delay();
    let mut converted = Vec::with_capacity(wanted + delay);

    for piece in samples.chunks(block) {
        let out = if piece.len() == block {
            converter.process(&[piece], None)
        } else {
            converter.process_partial(Some(&[piece][..]), None)
        }
        .audio_op(AudioOperation::Resampling)?;
        converted.extend_from_slice(&out[0]);
    }

    // push zeros through until the delayed tail has come out
    while converted.len() < wanted + delay {
        let out = converter
            .process_partial::<Vec<f32>>(None, None)
            .audio_op(AudioOperation::Resampling)?;
        if out[0].is_empty() {
            break;
        }
        converted.extend_from_slice(&out[0]);
    }

    converted.drain(..delay.min(converted.len()));
    converted.truncate(wanted);
    Ok(converted)
}
