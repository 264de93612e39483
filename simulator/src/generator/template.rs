use std::f32::consts::PI;

/// Sine of `frequency` Hz sampled at `sample_rate`.
pub fn sine_wave(length: usize, sample_rate: u32, frequency: f32, amplitude: f32) -> Vec<f32> {
    let rate = sample_rate.max(1) as f32;
    (0..length)
        .map(|i| amplitude * (2.0 * PI * frequency * i as f32 / rate).sin())
        .collect()
}

/// Gaussian bump centred on `center`, evaluated at `x`.
pub fn bump(x: f32, center: f32, width: f32) -> f32 {
    if width <= 0.0 {
        return 0.0;
    }
    (-((x - center) / width).powi(2)).exp()
}

/// Rescale per-frame gains so their RMS is one, keeping overall loudness.
pub fn normalized_gains(gains: &[f32]) -> Vec<f32> {
    let rms = (gains.iter().map(|g| g * g).sum::<f32>() / gains.len().max(1) as f32).sqrt();
    if rms <= f32::EPSILON {
        return gains.to_vec();
    }
    gains.iter().map(|g| g / rms).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sine_wave_has_expected_rms() {
        let wave = sine_wave(8000, 8000, 50.0, 1.0);
        let rms = (wave.iter().map(|v| v * v).sum::<f32>() / wave.len() as f32).sqrt();
        assert!((rms - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-3);
    }

    #[test]
    fn gains_are_normalized() {
        let gains = normalized_gains(&[1.0, 0.6, 1.0, 0.6]);
        let rms = (gains.iter().map(|g| g * g).sum::<f32>() / 4.0).sqrt();
        assert!((rms - 1.0).abs() < 1e-5);
        assert_eq!(bump(3.0, 3.0, 1.0), 1.0);
    }
}
