use std::sync::Mutex;

use async_trait::async_trait;
use minercore::analysis::signatures::ACOUSTIC_SIGNATURES;
use minercore::interface::{AudioBuffer, RawSample, SignalPattern};
use minercore::prelude::{AcquireRequest, AcquisitionError, Modality, SignalSource};
use minercore::session::ProgressReporter;
use rand::{rngs::StdRng, Rng};

use crate::generator::profile::GeneratorConfig;
use crate::generator::template::{normalized_gains, sine_wave};

const CHUNKS: usize = 10;
const FRAMES: usize = 20;
/// Must match the analyzer's calibration: RMS 1.0 reads as 94 dB.
const CALIBRATION_DB: f32 = 94.0;

/// Microphone stand-in: a fixed-length capture of ambient noise, with a
/// miner-like hum mixed in at the configured probability.
pub struct SyntheticMicrophone {
    config: GeneratorConfig,
    rng: Mutex<StdRng>,
}

impl SyntheticMicrophone {
    pub fn new(config: GeneratorConfig) -> Self {
        let rng = config.rng_for(Modality::Acoustic);
        Self {
            config,
            rng: Mutex::new(rng),
        }
    }

    pub fn capture(&self) -> Result<AudioBuffer, AcquisitionError> {
        let mut rng = self
            .rng
            .lock()
            .map_err(|_| AcquisitionError::Unavailable("microphone state poisoned".into()))?;
        let len = self.config.audio_len();
        let sample_rate = self.config.sample_rate;

        let mut samples: Vec<f32> = (0..len).map(|_| rng.gen_range(-0.01..0.01)).collect();
        for (sample, hum) in samples.iter_mut().zip(sine_wave(len, sample_rate, 120.0, 0.004)) {
            *sample += hum;
        }

        if rng.gen_bool(self.config.miner_probability()) {
            let signature = &ACOUSTIC_SIGNATURES[rng.gen_range(0..ACOUSTIC_SIGNATURES.len())];
            let frequency = rng.gen_range(signature.frequency_hz.0..signature.frequency_hz.1);
            let decibels = rng.gen_range(signature.decibels.0..signature.decibels.1);
            let amplitude = 10f32.powf((decibels - CALIBRATION_DB) / 20.0) * std::f32::consts::SQRT_2;
            let gains = normalized_gains(&frame_gains(signature.pattern, &mut rng));
            let frame_len = (len / FRAMES).max(1);
            for (i, (sample, tone)) in samples
                .iter_mut()
                .zip(sine_wave(len, sample_rate, frequency, amplitude))
                .enumerate()
            {
                let gain = gains[(i / frame_len).min(FRAMES - 1)];
                *sample += tone * gain;
            }
        }

        Ok(AudioBuffer {
            sample_rate,
            samples,
        })
    }
}

fn frame_gains(pattern: SignalPattern, rng: &mut StdRng) -> Vec<f32> {
    (0..FRAMES)
        .map(|frame| match pattern {
            SignalPattern::Pulsating => {
                if frame % 2 == 0 {
                    1.0
                } else {
                    0.6
                }
            }
            SignalPattern::Rhythmic => {
                if frame < FRAMES / 2 {
                    1.0
                } else {
                    0.6
                }
            }
            SignalPattern::Variable => rng.gen_range(0.05..1.0),
            _ => 1.0,
        })
        .collect()
}

#[async_trait]
impl SignalSource for SyntheticMicrophone {
    fn modality(&self) -> Modality {
        Modality::Acoustic
    }

    async fn acquire(
        &self,
        _request: &AcquireRequest,
        progress: &ProgressReporter,
    ) -> Result<RawSample, AcquisitionError> {
        progress.note("recording ambient audio");
        for chunk in 1..=CHUNKS {
            tokio::time::sleep(self.config.step_delay()).await;
            progress.report((chunk * 100 / CHUNKS) as u8);
        }
        self.capture().map(RawSample::Audio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use minercore::analysis::AcousticAnalyzer;

    fn microphone(miner_probability: f64) -> SyntheticMicrophone {
        SyntheticMicrophone::new(GeneratorConfig {
            miner_probability,
            step_delay_ms: 0,
            ..GeneratorConfig::default()
        })
    }

    #[test]
    fn miner_hum_is_detected() {
        let microphone = microphone(1.0);
        let analyzer = AcousticAnalyzer::default();
        for _ in 0..4 {
            let result = analyzer.evaluate(&microphone.capture().unwrap()).unwrap();
            assert!(result.detected, "confidence {}", result.confidence);
        }
    }

    #[test]
    fn quiet_room_is_not_detected() {
        let microphone = microphone(0.0);
        let result = AcousticAnalyzer::default()
            .evaluate(&microphone.capture().unwrap())
            .unwrap();
        assert!(!result.detected);
    }

    #[tokio::test]
    async fn acquisition_returns_full_length_capture() {
        let microphone = microphone(0.5);
        let request = AcquireRequest {
            scan_id: "scan".into(),
            location: minercore::prelude::Coordinates::new(33.6, 46.4),
            radius_m: 500,
        };
        let sample = microphone
            .acquire(&request, &ProgressReporter::detached())
            .await
            .unwrap();
        match sample {
            RawSample::Audio(buffer) => assert_eq!(buffer.samples.len(), 16000),
            other => panic!("unexpected sample {:?}", other.modality()),
        }
    }
}
