use async_trait::async_trait;

use crate::analysis::signatures::{range_score, EmiProfile, EMI_PROFILES};
use crate::analysis::{run_blocking, to_percent};
use crate::interface::{EmiFindings, EmiSweep, Findings, MethodResult, RawSample, SignalPattern};
use crate::math::{MatrixHelper, StatsHelper};
use crate::prelude::{AnalysisError, Analyzer, DeviceType, Modality};

#[derive(Debug, Clone)]
pub struct EmiConfig {
    pub detection_floor: u8,
    /// Strength below which a spectrum is treated as ambient noise.
    pub min_strength: u8,
    pub smoothing_window: usize,
    /// Secondary peaks must reach this fraction of the main peak to count.
    pub peak_ratio: f32,
}

impl Default for EmiConfig {
    fn default() -> Self {
        Self {
            detection_floor: 50,
            min_strength: 30,
            smoothing_window: 5,
            peak_ratio: 0.6,
        }
    }
}

/// Locates the dominant emission band of a directional sweep and ranks
/// known device profiles against it.
#[derive(Debug, Clone)]
pub struct EmiAnalyzer {
    config: EmiConfig,
    profiles: &'static [EmiProfile],
}

impl Default for EmiAnalyzer {
    fn default() -> Self {
        Self::new(EmiConfig::default())
    }
}

impl EmiAnalyzer {
    pub fn new(config: EmiConfig) -> Self {
        Self {
            config,
            profiles: EMI_PROFILES,
        }
    }

    pub fn evaluate(&self, sweep: &EmiSweep) -> Result<MethodResult, AnalysisError> {
        if sweep.directions() == 0 || sweep.bins() == 0 {
            return Err(AnalysisError::InvalidSample("EMI sweep has no readings".into()));
        }
        if sweep.range_khz.0 >= sweep.range_khz.1 {
            return Err(AnalysisError::InvalidSample(format!(
                "frequency range {:?} is empty",
                sweep.range_khz
            )));
        }
        if sweep.readings.iter().any(|v| !v.is_finite()) {
            return Err(AnalysisError::InvalidSample(
                "EMI sweep contains non-finite readings".into(),
            ));
        }

        let spectrum = MatrixHelper::column_means(sweep.readings.view());
        let direction_energy = MatrixHelper::row_means(sweep.readings.view());
        let bearing_deg =
            StatsHelper::argmax(&direction_energy).unwrap_or(0) as f32 * sweep.step_deg;

        let peak_bin = StatsHelper::argmax(&spectrum).unwrap_or(0);
        let peak = spectrum[peak_bin];
        let median = StatsHelper::median(&spectrum);
        let signal_strength = if peak > 0.0 {
            to_percent(100.0 * (1.0 - median / peak))
        } else {
            0
        };

        let dominant_frequency = sweep.frequency_of_bin(peak_bin);
        let band_khz = half_max_band(&spectrum, peak_bin, sweep);
        let signal_pattern = self.spectral_pattern(&spectrum, signal_strength);

        let mut ranked: Vec<(&EmiProfile, f32)> = self
            .profiles
            .iter()
            .map(|profile| {
                let score = 60.0 * range_score(dominant_frequency, profile.frequency_khz, 40.0)
                    + if profile.pattern == signal_pattern { 15.0 } else { 0.0 }
                    + 25.0 * range_score(signal_strength as f32, profile.strength, 20.0);
                (profile, score)
            })
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

        let confidence = ranked.first().map(|(_, score)| to_percent(*score)).unwrap_or(0);
        let detected =
            confidence >= self.config.detection_floor && signal_strength >= self.config.min_strength;

        let (possible_devices, device_type) = if detected {
            let devices = ranked
                .iter()
                .filter(|(_, score)| to_percent(*score) >= self.config.detection_floor)
                .map(|(profile, _)| profile.device.to_string())
                .collect();
            (devices, ranked[0].0.device_type)
        } else {
            (Vec::new(), DeviceType::Unknown)
        };

        Ok(MethodResult {
            modality: Modality::Emi,
            detected,
            confidence,
            findings: Findings::Emi(EmiFindings {
                dominant_frequency,
                band_khz,
                signal_strength,
                signal_pattern,
                bearing_deg,
                possible_devices,
                device_type,
            }),
        })
    }

    fn spectral_pattern(&self, spectrum: &[f32], strength: u8) -> SignalPattern {
        if strength < self.config.min_strength {
            return SignalPattern::Variable;
        }

        let smoothed = StatsHelper::smooth(spectrum, self.config.smoothing_window.max(1));
        let top = smoothed.iter().cloned().fold(0.0_f32, f32::max);
        let min_separation = (smoothed.len() / 20).max(1);

        let mut peaks = 0;
        let mut last_peak: Option<usize> = None;
        for idx in 1..smoothed.len().saturating_sub(1) {
            let value = smoothed[idx];
            let is_local_max = value > smoothed[idx - 1] && value >= smoothed[idx + 1];
            if !is_local_max || value < self.config.peak_ratio * top {
                continue;
            }
            if last_peak.map_or(true, |last| idx - last >= min_separation) {
                peaks += 1;
                last_peak = Some(idx);
            }
        }

        match peaks {
            0 | 1 => SignalPattern::Continuous,
            2 => SignalPattern::Pulsed,
            _ => SignalPattern::Modulated,
        }
    }
}

/// Contiguous band around the peak where the spectrum stays at or above half its height.
fn half_max_band(spectrum: &[f32], peak_bin: usize, sweep: &EmiSweep) -> (f32, f32) {
    let threshold = spectrum[peak_bin] * 0.5;
    let mut low = peak_bin;
    while low > 0 && spectrum[low - 1] >= threshold {
        low -= 1;
    }
    let mut high = peak_bin;
    while high + 1 < spectrum.len() && spectrum[high + 1] >= threshold {
        high += 1;
    }
    (sweep.frequency_of_bin(low), sweep.frequency_of_bin(high + 1))
}

#[async_trait]
impl Analyzer for EmiAnalyzer {
    fn modality(&self) -> Modality {
        Modality::Emi
    }

    async fn analyze(&self, sample: RawSample) -> Result<MethodResult, AnalysisError> {
        let sweep = match sample {
            RawSample::Emi(sweep) => sweep,
            other => {
                return Err(AnalysisError::ModalityMismatch {
                    expected: Modality::Emi,
                    found: other.modality(),
                })
            }
        };
        let analyzer = self.clone();
        run_blocking(move || analyzer.evaluate(&sweep)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn sweep(peaks: &[(usize, f32)], hot_direction: usize) -> EmiSweep {
        let readings = Array2::from_shape_fn((8, 500), |(direction, bin)| {
            let gain = if direction == hot_direction { 1.5 } else { 1.0 };
            let emission: f32 = peaks
                .iter()
                .map(|&(center, amplitude)| {
                    let offset = bin as f32 - center as f32;
                    amplitude * (-(offset * offset) / 50.0).exp()
                })
                .sum();
            5.0 + gain * emission
        });
        EmiSweep {
            range_khz: (0.0, 500.0),
            step_deg: 45.0,
            readings,
        }
    }

    fn findings(result: &MethodResult) -> &EmiFindings {
        match &result.findings {
            Findings::Emi(findings) => findings,
            other => panic!("unexpected findings {:?}", other),
        }
    }

    #[test]
    fn single_strong_band_matches_continuous_profile() {
        let result = EmiAnalyzer::default().evaluate(&sweep(&[(200, 30.0)], 2)).unwrap();
        let findings = findings(&result);

        assert!(result.detected);
        assert_eq!(result.confidence, 100);
        assert_eq!(findings.dominant_frequency, 200.0);
        assert_eq!(findings.bearing_deg, 90.0);
        assert_eq!(findings.signal_pattern, SignalPattern::Continuous);
        assert_eq!(findings.signal_strength, 86);
        assert_eq!(
            findings.possible_devices,
            vec!["Whatsminer M30S", "Antminer S19", "Avalon A1246"]
        );
        assert_eq!(findings.device_type, DeviceType::Asic);
        assert!(findings.band_khz.0 < 200.0 && findings.band_khz.1 > 200.0);
    }

    #[test]
    fn twin_peaks_read_as_pulsed_antminer() {
        let result = EmiAnalyzer::default()
            .evaluate(&sweep(&[(200, 30.0), (235, 24.0)], 5))
            .unwrap();
        let findings = findings(&result);

        assert_eq!(findings.signal_pattern, SignalPattern::Pulsed);
        assert_eq!(findings.possible_devices[0], "Antminer S19");
        assert_eq!(findings.bearing_deg, 225.0);
        assert_eq!(result.confidence, 99);
    }

    #[test]
    fn flat_spectrum_is_ambient_noise() {
        let result = EmiAnalyzer::default().evaluate(&sweep(&[], 0)).unwrap();
        let findings = findings(&result);
        assert!(!result.detected);
        assert_eq!(findings.signal_strength, 0);
        assert_eq!(findings.signal_pattern, SignalPattern::Variable);
        assert!(findings.possible_devices.is_empty());
    }

    #[test]
    fn empty_sweep_is_rejected() {
        let empty = EmiSweep {
            range_khz: (0.0, 500.0),
            step_deg: 45.0,
            readings: Array2::zeros((0, 0)),
        };
        assert!(matches!(
            EmiAnalyzer::default().evaluate(&empty),
            Err(AnalysisError::InvalidSample(_))
        ));
    }

    #[tokio::test]
    async fn async_entry_point_matches_direct_evaluation() {
        let analyzer = EmiAnalyzer::default();
        let input = sweep(&[(120, 18.0)], 1);
        let direct = analyzer.evaluate(&input).unwrap();
        let via_trait = analyzer.analyze(RawSample::Emi(input)).await.unwrap();
        assert_eq!(direct, via_trait);
    }
}
