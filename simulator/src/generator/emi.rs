use std::sync::Mutex;

use async_trait::async_trait;
use minercore::analysis::signatures::EMI_PROFILES;
use minercore::interface::{EmiSweep, RawSample, SignalPattern};
use minercore::prelude::{AcquireRequest, AcquisitionError, Modality, SignalSource};
use minercore::session::ProgressReporter;
use ndarray::Array2;
use rand::{rngs::StdRng, Rng};

use crate::generator::profile::GeneratorConfig;
use crate::generator::template::bump;

/// Sensor floor plus uniform noise in `0..AMBIENT_NOISE`.
const AMBIENT_FLOOR: f32 = 20.0;
const AMBIENT_NOISE: f32 = 10.0;
const BUMP_WIDTH_KHZ: f32 = 8.0;
const PEAK_SPACING_KHZ: f32 = 35.0;

/// Directional EMI probe stand-in sweeping the compass in equal steps.
pub struct SyntheticEmiProbe {
    config: GeneratorConfig,
    rng: Mutex<StdRng>,
}

impl SyntheticEmiProbe {
    pub fn new(config: GeneratorConfig) -> Self {
        let rng = config.rng_for(Modality::Emi);
        Self {
            config,
            rng: Mutex::new(rng),
        }
    }

    fn directions(&self) -> usize {
        self.config.emi_directions.max(1)
    }

    pub fn sweep(&self) -> Result<EmiSweep, AcquisitionError> {
        let mut rng = self
            .rng
            .lock()
            .map_err(|_| AcquisitionError::Unavailable("EMI probe state poisoned".into()))?;
        let directions = self.directions();
        let bins = self.config.emi_bins.max(2);
        let (low, high) = self.config.emi_range_khz;
        if low >= high {
            return Err(AcquisitionError::Unavailable(format!(
                "probe cannot sweep {low}-{high} kHz"
            )));
        }
        let khz_of = |bin: usize| low + bin as f32 / bins as f32 * (high - low);

        let mut readings = Array2::from_shape_fn((directions, bins), |_| {
            AMBIENT_FLOOR + rng.gen_range(0.0..AMBIENT_NOISE)
        });

        if rng.gen_bool(self.config.miner_probability()) {
            let profile = &EMI_PROFILES[rng.gen_range(0..EMI_PROFILES.len())];
            let center = rng.gen_range(profile.frequency_khz.0..profile.frequency_khz.1);
            let peaks = match profile.pattern {
                SignalPattern::Pulsed => 2,
                SignalPattern::Modulated => 3,
                _ => 1,
            };
            let bearing = rng.gen_range(0..directions);
            let gains: Vec<f32> = (0..directions)
                .map(|d| {
                    let distance = d.abs_diff(bearing).min(directions - d.abs_diff(bearing));
                    match distance {
                        0 => 1.0,
                        1 => 0.6,
                        _ => 0.25,
                    }
                })
                .collect();
            let mean_gain = gains.iter().sum::<f32>() / directions as f32;

            // Peak-to-median ratio chosen to land inside the profile's strength band.
            let strength = (rng.gen_range(profile.strength.0..profile.strength.1) / 100.0).min(0.9);
            let ambient = AMBIENT_FLOOR + AMBIENT_NOISE / 2.0;
            let amplitude = ambient * strength / (1.0 - strength) / mean_gain;

            for ((direction, bin), value) in readings.indexed_iter_mut() {
                let khz = khz_of(bin);
                let signal: f32 = (0..peaks)
                    .map(|peak| {
                        let scale = if peak == 0 { 1.0 } else { 0.8 };
                        scale * bump(khz, center + peak as f32 * PEAK_SPACING_KHZ, BUMP_WIDTH_KHZ)
                    })
                    .sum();
                *value += amplitude * gains[direction] * signal;
            }
        }

        Ok(EmiSweep {
            range_khz: (low, high),
            step_deg: 360.0 / directions as f32,
            readings,
        })
    }
}

#[async_trait]
impl SignalSource for SyntheticEmiProbe {
    fn modality(&self) -> Modality {
        Modality::Emi
    }

    async fn acquire(
        &self,
        _request: &AcquireRequest,
        progress: &ProgressReporter,
    ) -> Result<RawSample, AcquisitionError> {
        let directions = self.directions();
        let step = 360.0 / directions as f32;
        for direction in 0..directions {
            progress.note(&format!("sweeping bearing {:.0} deg", direction as f32 * step));
            tokio::time::sleep(self.config.step_delay()).await;
            progress.report(((direction + 1) * 100 / directions) as u8);
        }
        self.sweep().map(RawSample::Emi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use minercore::analysis::EmiAnalyzer;

    fn probe(miner_probability: f64) -> SyntheticEmiProbe {
        SyntheticEmiProbe::new(GeneratorConfig {
            miner_probability,
            step_delay_ms: 0,
            ..GeneratorConfig::default()
        })
    }

    #[test]
    fn sweep_covers_every_direction() {
        let sweep = probe(0.0).sweep().unwrap();
        assert_eq!(sweep.directions(), 8);
        assert_eq!(sweep.bins(), 500);
        assert_eq!(sweep.step_deg, 45.0);
    }

    #[test]
    fn miner_emission_is_detected() {
        let probe = probe(1.0);
        let analyzer = EmiAnalyzer::default();
        for _ in 0..4 {
            let result = analyzer.evaluate(&probe.sweep().unwrap()).unwrap();
            assert!(result.detected, "confidence {}", result.confidence);
        }
    }

    #[test]
    fn ambient_noise_is_not_detected() {
        let result = EmiAnalyzer::default()
            .evaluate(&probe(0.0).sweep().unwrap())
            .unwrap();
        assert!(!result.detected);
    }
}
