//! Per-segment audio post-processing
//!
//! - Volume: linear gain with hard clipping to [-1, 1]
//! - Speed: sinc time-scaling for engines that cannot change speaking rate
//!   themselves. The output keeps the engine's sample rate; pitch shifts
//!   along with tempo.

use rubato::{
    calculate_cutoff, Resampler as RubatoResampler, SincFixedIn, SincInterpolationParameters,
    SincInterpolationType, WindowFunction,
};

use crate::core::error::{Result, TtsError};

/// Frames fed to the resampler per call
const CHUNK_SIZE: usize = 1024;

const SINC_LEN: usize = 128;

/// Scale samples by `gain`, clipping instead of wrapping
pub fn apply_gain(samples: &mut [f32], gain: f32) {
    for sample in samples.iter_mut() {
        let scaled = *sample * gain;
        *sample = if scaled.is_nan() { 0.0 } else { scaled.clamp(-1.0, 1.0) };
    }
}

/// Change duration by `1 / speed` without changing the sample rate
pub fn time_scale(samples: &[f32], speed: f32) -> Result<Vec<f32>> {
    if !speed.is_finite() || speed <= 0.0 {
        return Err(TtsError::invalid("speed", format!("cannot time-scale by {}", speed)));
    }
    if samples.is_empty() || speed == 1.0 {
        return Ok(samples.to_vec());
    }

    let ratio = 1.0 / speed as f64;
    let expected = (samples.len() as f64 * ratio).round() as usize;
    let delay = ((SINC_LEN as f64 / 2.0) * ratio) as usize;

    let window = WindowFunction::Blackman2;
    let params = SincInterpolationParameters {
        sinc_len: SINC_LEN,
        f_cutoff: calculate_cutoff(SINC_LEN, window),
        interpolation: SincInterpolationType::Quadratic,
        oversampling_factor: 256,
        window,
    };
    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.1, params, CHUNK_SIZE, 1)
        .map_err(|e| TtsError::internal(format!("cannot create time-scaler: {}", e)))?;

    // Trailing silence flushes the filter so the tail is not lost
    let mut input = samples.to_vec();
    input.resize(samples.len() + SINC_LEN, 0.0);

    let mut output = Vec::with_capacity(expected + delay + CHUNK_SIZE);
    let mut pos = 0;
    while pos + CHUNK_SIZE <= input.len() {
        let chunk: [&[f32]; 1] = [&input[pos..pos + CHUNK_SIZE]];
        let processed = resampler
            .process(&chunk[..], None)
            .map_err(|e| TtsError::internal(format!("time-scaling failed: {}", e)))?;
        output.extend(processed.into_iter().next().unwrap_or_default());
        pos += CHUNK_SIZE;
    }
    if pos < input.len() {
        let chunk: [&[f32]; 1] = [&input[pos..]];
        let processed = resampler
            .process_partial(Some(&chunk[..]), None)
            .map_err(|e| TtsError::internal(format!("time-scaling failed: {}", e)))?;
        output.extend(processed.into_iter().next().unwrap_or_default());
    }

    output.drain(..delay.min(output.len()));
    output.resize(expected, 0.0);
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| 0.5 * (2.0 * std::f32::consts::PI * 220.0 * i as f32 / 16000.0).sin())
            .collect()
    }

    #[test]
    fn test_gain_clamps() {
        let mut samples = vec![0.25, -0.25, 0.6, -0.9, f32::NAN];
        apply_gain(&mut samples, 2.0);
        assert_eq!(samples, vec![0.5, -0.5, 1.0, -1.0, 0.0]);
    }

    #[test]
    fn test_unit_gain_is_identity_in_range() {
        let original = sine(500);
        let mut samples = original.clone();
        apply_gain(&mut samples, 1.0);
        assert_eq!(samples, original);
    }

    #[test]
    fn test_unit_speed_is_identity() {
        let samples = sine(3000);
        assert_eq!(time_scale(&samples, 1.0).unwrap(), samples);
        assert!(time_scale(&[], 1.7).unwrap().is_empty());
    }

    #[test]
    fn test_faster_is_shorter() {
        let samples = sine(8000);
        assert_eq!(time_scale(&samples, 2.0).unwrap().len(), 4000);
        assert_eq!(time_scale(&samples, 1.5).unwrap().len(), 5333);
    }

    #[test]
    fn test_slower_is_longer() {
        let samples = sine(1000);
        let slowed = time_scale(&samples, 0.5).unwrap();
        assert_eq!(slowed.len(), 2000);
        assert!(slowed.iter().any(|s| s.abs() > 0.1));
    }

    #[test]
    fn test_rejects_bad_speed() {
        assert!(time_scale(&[0.1], 0.0).is_err());
        assert!(time_scale(&[0.1], f32::NAN).is_err());
    }
}
