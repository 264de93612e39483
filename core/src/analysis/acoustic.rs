use async_trait::async_trait;

use crate::analysis::signatures::{range_score, AcousticSignature, ACOUSTIC_SIGNATURES};
use crate::analysis::{run_blocking, to_percent};
use crate::interface::{AcousticFindings, AudioBuffer, Findings, MethodResult, RawSample, SignalPattern};
use crate::math::{FftHelper, StatsHelper};
use crate::prelude::{AnalysisError, Analyzer, DeviceType, Modality};

#[derive(Debug, Clone)]
pub struct AcousticConfig {
    /// Envelope frames used to classify the pattern.
    pub frame_count: usize,
    /// Band searched for the dominant hum.
    pub min_frequency_hz: f32,
    pub max_frequency_hz: f32,
    /// dB SPL of a full-scale RMS of 1.0.
    pub calibration_db: f32,
    /// Captures quieter than this never count as detections.
    pub noise_floor_db: f32,
    pub detection_floor: u8,
    pub max_fft_len: usize,
}

impl Default for AcousticConfig {
    fn default() -> Self {
        Self {
            frame_count: 20,
            min_frequency_hz: 20.0,
            max_frequency_hz: 500.0,
            calibration_db: 94.0,
            noise_floor_db: 50.0,
            detection_floor: 50,
            max_fft_len: 1 << 16,
        }
    }
}

/// Scores a capture against known acoustic signatures.
///
/// Frequency match weighs 50 points, loudness 30 and envelope pattern 20.
#[derive(Debug, Clone)]
pub struct AcousticAnalyzer {
    config: AcousticConfig,
    signatures: &'static [AcousticSignature],
}

impl Default for AcousticAnalyzer {
    fn default() -> Self {
        Self::new(AcousticConfig::default())
    }
}

impl AcousticAnalyzer {
    pub fn new(config: AcousticConfig) -> Self {
        Self {
            config,
            signatures: ACOUSTIC_SIGNATURES,
        }
    }

    pub fn with_signatures(mut self, signatures: &'static [AcousticSignature]) -> Self {
        self.signatures = signatures;
        self
    }

    pub fn evaluate(&self, buffer: &AudioBuffer) -> Result<MethodResult, AnalysisError> {
        if buffer.sample_rate == 0 {
            return Err(AnalysisError::InvalidSample("sample rate is zero".into()));
        }
        if buffer.samples.is_empty() {
            return Err(AnalysisError::InvalidSample("audio buffer is empty".into()));
        }
        if buffer.samples.iter().any(|v| !v.is_finite()) {
            return Err(AnalysisError::InvalidSample(
                "audio buffer contains non-finite samples".into(),
            ));
        }

        let rms = StatsHelper::rms(&buffer.samples);
        let decibels = if rms > 0.0 {
            (self.config.calibration_db + 20.0 * rms.log10()).max(0.0)
        } else {
            0.0
        };
        let dominant_frequency = self.dominant_frequency(buffer);
        let pattern = self.envelope_pattern(&buffer.samples);

        let best = self
            .signatures
            .iter()
            .map(|signature| {
                let tonal = range_score(dominant_frequency, signature.frequency_hz, 15.0);
                let score = 50.0 * tonal
                    + 30.0 * range_score(decibels, signature.decibels, 10.0)
                    + if signature.pattern == pattern { 20.0 } else { 0.0 };
                (signature, score, tonal)
            })
            .fold(None, |best: Option<(&AcousticSignature, f32, f32)>, candidate| match best {
                Some((_, score, _)) if candidate.1 <= score => best,
                _ => Some(candidate),
            });

        let confidence = best.map(|(_, score, _)| to_percent(score)).unwrap_or(0);
        let audible = decibels >= self.config.noise_floor_db;
        // Loudness and envelope alone never identify a miner; the hum must be near a signature band.
        let tonal_match = best.is_some_and(|(_, _, tonal)| tonal >= 0.5);
        let detected = audible && tonal_match && confidence >= self.config.detection_floor;
        let (possible_device, device_type) = match best {
            Some((signature, _, _)) if detected => {
                (Some(signature.device.to_string()), signature.device_type)
            }
            _ => (None, DeviceType::Unknown),
        };

        Ok(MethodResult {
            modality: Modality::Acoustic,
            detected,
            confidence,
            findings: Findings::Acoustic(AcousticFindings {
                dominant_frequency,
                decibels,
                pattern,
                possible_device,
                device_type,
            }),
        })
    }

    fn dominant_frequency(&self, buffer: &AudioBuffer) -> f32 {
        let size = buffer.samples.len().min(self.config.max_fft_len);
        let fft = FftHelper::new(size);
        let spectrum = fft.magnitude_spectrum(&buffer.samples);
        let resolution = buffer.sample_rate as f32 / size as f32;

        let low = ((self.config.min_frequency_hz / resolution).ceil() as usize).max(1);
        let high = ((self.config.max_frequency_hz / resolution).floor() as usize)
            .min(spectrum.len().saturating_sub(1));
        if low > high {
            return 0.0;
        }

        let band = &spectrum[low..=high];
        if band.iter().all(|&m| m <= f32::EPSILON) {
            return 0.0;
        }
        StatsHelper::argmax(band)
            .map(|idx| (low + idx) as f32 * resolution)
            .unwrap_or(0.0)
    }

    fn envelope_pattern(&self, samples: &[f32]) -> SignalPattern {
        let frames = self.config.frame_count.max(2);
        let frame_len = samples.len() / frames;
        if frame_len == 0 {
            return SignalPattern::Variable;
        }

        let envelope: Vec<f32> = samples
            .chunks_exact(frame_len)
            .take(frames)
            .map(StatsHelper::rms)
            .collect();
        let mean = StatsHelper::mean(&envelope);
        if mean <= f32::EPSILON {
            return SignalPattern::Continuous;
        }

        let variation = StatsHelper::std_dev(&envelope) / mean;
        let crossings = envelope
            .windows(2)
            .filter(|pair| (pair[0] - mean).signum() != (pair[1] - mean).signum())
            .count();

        if variation < 0.1 {
            SignalPattern::Continuous
        } else if variation >= 0.45 {
            SignalPattern::Variable
        } else if crossings * 2 >= envelope.len() {
            SignalPattern::Pulsating
        } else {
            SignalPattern::Rhythmic
        }
    }
}

#[async_trait]
impl Analyzer for AcousticAnalyzer {
    fn modality(&self) -> Modality {
        Modality::Acoustic
    }

    async fn analyze(&self, sample: RawSample) -> Result<MethodResult, AnalysisError> {
        let buffer = match sample {
            RawSample::Audio(buffer) => buffer,
            other => {
                return Err(AnalysisError::ModalityMismatch {
                    expected: Modality::Acoustic,
                    found: other.modality(),
                })
            }
        };
        let analyzer = self.clone();
        run_blocking(move || analyzer.evaluate(&buffer)).await
    }
}
