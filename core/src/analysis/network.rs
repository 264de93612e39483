use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::analysis::signatures::{is_asic_vendor, is_stratum_port, match_pool};
use crate::analysis::run_blocking;
use crate::interface::{
    DeviceAssessment, DeviceObservation, Findings, MethodResult, NetworkFindings,
    NetworkSnapshot, RawSample, SuspiciousConnection,
};
use crate::math::StatsHelper;
use crate::prelude::{AnalysisError, Analyzer, DeviceType, Modality};

#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Devices scoring above this are flagged.
    pub flag_threshold: u8,
    /// Per-device confidence is capped here; traffic alone never proves a miner.
    pub max_device_confidence: u8,
    pub connection_floor: usize,
    pub bandwidth_floor_kbps: u32,
    pub outlier_sigma: f32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            flag_threshold: 50,
            max_device_confidence: 95,
            connection_floor: 10,
            bandwidth_floor_kbps: 500,
            outlier_sigma: 2.0,
        }
    }
}

const POOL_POINTS: u32 = 35;
const POOL_POINTS_CAP: u32 = 70;
const STRATUM_POINTS: u32 = 15;
const OUTLIER_POINTS: u32 = 10;

/// Scores every device on a local network for mining-pool traffic.
#[derive(Debug, Clone, Default)]
pub struct NetworkAnalyzer {
    config: NetworkConfig,
}

struct Baseline {
    mean: f32,
    std_dev: f32,
}

impl Baseline {
    fn of(values: &[f32]) -> Self {
        Self {
            mean: StatsHelper::mean(values),
            std_dev: StatsHelper::std_dev(values),
        }
    }

    fn is_outlier(&self, value: f32, sigma: f32) -> bool {
        self.std_dev > 0.0 && value > self.mean + sigma * self.std_dev
    }
}

impl NetworkAnalyzer {
    pub fn new(config: NetworkConfig) -> Self {
        Self { config }
    }

    pub fn evaluate(&self, snapshot: &NetworkSnapshot) -> Result<MethodResult, AnalysisError> {
        let mut seen = BTreeSet::new();
        for device in &snapshot.devices {
            if !seen.insert(device.id.as_str()) {
                return Err(AnalysisError::InvalidSample(format!(
                    "device id {} appears twice",
                    device.id
                )));
            }
        }

        let connection_counts: Vec<f32> = snapshot
            .devices
            .iter()
            .map(|device| snapshot.connections_from(&device.id).count() as f32)
            .collect();
        let bandwidths: Vec<f32> = snapshot
            .devices
            .iter()
            .map(|device| device.bandwidth_kbps as f32)
            .collect();
        let connection_baseline = Baseline::of(&connection_counts);
        let bandwidth_baseline = Baseline::of(&bandwidths);

        let devices: Vec<DeviceAssessment> = snapshot
            .devices
            .iter()
            .map(|device| {
                self.assess(snapshot, device, &connection_baseline, &bandwidth_baseline)
            })
            .collect();

        let suspicious_connections = snapshot
            .connections
            .iter()
            .filter_map(|connection| {
                match_pool(&connection.target).map(|pool| SuspiciousConnection {
                    source: connection.source.clone(),
                    target: connection.target.clone(),
                    pool: pool.name.to_string(),
                    port: connection.port,
                    protocol: connection.protocol,
                })
            })
            .collect();

        let detected = devices.iter().any(|device| device.flagged);
        let confidence = devices
            .iter()
            .map(|device| device.confidence)
            .max()
            .unwrap_or(0);

        Ok(MethodResult {
            modality: Modality::Network,
            detected,
            confidence,
            findings: Findings::Network(NetworkFindings {
                devices,
                suspicious_connections,
            }),
        })
    }

    fn assess(
        &self,
        snapshot: &NetworkSnapshot,
        device: &DeviceObservation,
        connection_baseline: &Baseline,
        bandwidth_baseline: &Baseline,
    ) -> DeviceAssessment {
        let connections: Vec<_> = snapshot.connections_from(&device.id).collect();
        let pools: BTreeSet<&'static str> = connections
            .iter()
            .filter_map(|connection| match_pool(&connection.target))
            .map(|pool| pool.name)
            .collect();
        let stratum = connections
            .iter()
            .any(|connection| is_stratum_port(connection.port))
            || device.open_ports.iter().any(|&port| is_stratum_port(port));

        let connection_count = connections.len();
        let busy = connection_count >= self.config.connection_floor
            || connection_baseline.is_outlier(connection_count as f32, self.config.outlier_sigma);
        let heavy = device.bandwidth_kbps >= self.config.bandwidth_floor_kbps
            || bandwidth_baseline.is_outlier(device.bandwidth_kbps as f32, self.config.outlier_sigma);

        let mut score = (pools.len() as u32 * POOL_POINTS).min(POOL_POINTS_CAP);
        if stratum {
            score += STRATUM_POINTS;
        }
        if busy {
            score += OUTLIER_POINTS;
        }
        if heavy {
            score += OUTLIER_POINTS;
        }
        let suspicious_score = score.min(100) as u8;
        let flagged = suspicious_score > self.config.flag_threshold;

        let probable_type = if flagged && is_asic_vendor(&device.manufacturer) {
            DeviceType::Asic
        } else {
            DeviceType::Unknown
        };

        DeviceAssessment {
            device_id: device.id.clone(),
            ip_address: device.ip_address.clone(),
            manufacturer: device.manufacturer.clone(),
            model: device.model.clone(),
            suspicious_score,
            confidence: suspicious_score.min(self.config.max_device_confidence),
            flagged,
            pools: pools.into_iter().map(str::to_string).collect(),
            connections: connection_count,
            bandwidth_kbps: device.bandwidth_kbps,
            probable_type,
        }
    }
}

#[async_trait]
impl Analyzer for NetworkAnalyzer {
    fn modality(&self) -> Modality {
        Modality::Network
    }

    async fn analyze(&self, sample: RawSample) -> Result<MethodResult, AnalysisError> {
        let snapshot = match sample {
            RawSample::Network(snapshot) => snapshot,
            other => {
                return Err(AnalysisError::ModalityMismatch {
                    expected: Modality::Network,
                    found: other.modality(),
                })
            }
        };
        let analyzer = self.clone();
        run_blocking(move || analyzer.evaluate(&snapshot)).await
    }
}
