use std::sync::Mutex;

use async_trait::async_trait;
use minercore::analysis::signatures::MINING_POOLS;
use minercore::interface::{
    ConnectionObservation, DeviceObservation, NetworkSnapshot, Protocol, RawSample,
};
use minercore::prelude::{AcquireRequest, AcquisitionError, Modality, SignalSource};
use minercore::session::ProgressReporter;
use rand::{rngs::StdRng, Rng};

use crate::generator::profile::GeneratorConfig;

const STAGES: &[&str] = &[
    "discovering devices",
    "probing open ports",
    "sampling traffic",
    "matching mining pools",
];
const VENDORS: &[&str] = &["Apple", "Samsung", "Xiaomi", "Huawei", "Asus"];
const MODELS: &[&str] = &["Laptop", "Phone", "Smart TV", "Router", "Tablet"];
const BENIGN_TARGETS: &[&str] = &[
    "cdn.example.com",
    "api.service.com",
    "update.system.net",
    "time.server.org",
];
const BENIGN_PORTS: &[u16] = &[80, 443, 53, 123];
const STRATUM_PROXY_PORT: u16 = 3333;

/// Local-network scanner stand-in producing a device and connection inventory.
pub struct SyntheticNetworkScanner {
    config: GeneratorConfig,
    rng: Mutex<StdRng>,
}

impl SyntheticNetworkScanner {
    pub fn new(config: GeneratorConfig) -> Self {
        let rng = config.rng_for(Modality::Network);
        Self {
            config,
            rng: Mutex::new(rng),
        }
    }

    pub fn inventory(&self, network_name: &str) -> Result<NetworkSnapshot, AcquisitionError> {
        let mut rng = self
            .rng
            .lock()
            .map_err(|_| AcquisitionError::Unavailable("scanner state poisoned".into()))?;
        let has_miners = rng.gen_bool(self.config.miner_probability());
        let (low, high) = self.config.device_range();
        let total = rng.gen_range(low..=high);

        let mut snapshot = NetworkSnapshot {
            network_name: network_name.to_string(),
            ..NetworkSnapshot::default()
        };
        for index in 0..total {
            let id = format!("device-{}", index + 1);
            let is_miner = has_miners && (index == 0 || rng.gen_bool(0.3));
            let mac_address = (0..6)
                .map(|_| format!("{:02x}", rng.gen::<u8>()))
                .collect::<Vec<_>>()
                .join(":");

            let device = if is_miner {
                let pool_count = rng.gen_range(1..=2);
                let pools: Vec<_> = (0..pool_count)
                    .map(|_| &MINING_POOLS[rng.gen_range(0..MINING_POOLS.len())])
                    .collect();
                let connections = rng.gen_range(10..30);
                for n in 0..connections {
                    let pool = pools[n % pools.len()];
                    snapshot.connections.push(ConnectionObservation {
                        source: id.clone(),
                        target: format!("stratum+tcp://btc.{}", pool.host_suffix),
                        port: pool.ports[0],
                        protocol: Protocol::Tcp,
                        bandwidth_kbps: rng.gen_range(10..110),
                    });
                }
                DeviceObservation {
                    id: id.clone(),
                    ip_address: format!("192.168.1.{}", 10 + index),
                    mac_address,
                    manufacturer: "Bitmain".into(),
                    model: "Antminer S19".into(),
                    open_ports: vec![80, STRATUM_PROXY_PORT, 4028],
                    bandwidth_kbps: rng.gen_range(500..2000),
                }
            } else {
                let connections = rng.gen_range(1..=5);
                for _ in 0..connections {
                    snapshot.connections.push(ConnectionObservation {
                        source: id.clone(),
                        target: BENIGN_TARGETS[rng.gen_range(0..BENIGN_TARGETS.len())].into(),
                        port: BENIGN_PORTS[rng.gen_range(0..BENIGN_PORTS.len())],
                        protocol: if rng.gen_bool(0.7) {
                            Protocol::Tcp
                        } else {
                            Protocol::Udp
                        },
                        bandwidth_kbps: rng.gen_range(10..110),
                    });
                }
                DeviceObservation {
                    id: id.clone(),
                    ip_address: format!("192.168.1.{}", 10 + index),
                    mac_address,
                    manufacturer: VENDORS[rng.gen_range(0..VENDORS.len())].into(),
                    model: MODELS[rng.gen_range(0..MODELS.len())].into(),
                    open_ports: vec![80, 443],
                    bandwidth_kbps: rng.gen_range(10..210),
                }
            };
            snapshot.devices.push(device);
        }
        Ok(snapshot)
    }
}

#[async_trait]
impl SignalSource for SyntheticNetworkScanner {
    fn modality(&self) -> Modality {
        Modality::Network
    }

    async fn acquire(
        &self,
        request: &AcquireRequest,
        progress: &ProgressReporter,
    ) -> Result<RawSample, AcquisitionError> {
        for (stage, label) in STAGES.iter().enumerate() {
            progress.note(label);
            tokio::time::sleep(self.config.step_delay()).await;
            progress.report(((stage + 1) * 100 / STAGES.len()) as u8);
        }
        let short: String = request.scan_id.chars().take(8).collect();
        let name = format!("field-net-{short}");
        self.inventory(&name).map(RawSample::Network)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use minercore::analysis::NetworkAnalyzer;
    use minercore::interface::Findings;

    fn scanner(miner_probability: f64) -> SyntheticNetworkScanner {
        SyntheticNetworkScanner::new(GeneratorConfig {
            miner_probability,
            step_delay_ms: 0,
            ..GeneratorConfig::default()
        })
    }

    #[test]
    fn inventory_size_respects_configured_range() {
        let scanner = scanner(0.5);
        for _ in 0..10 {
            let snapshot = scanner.inventory("lab").unwrap();
            assert!((5..=14).contains(&snapshot.devices.len()));
        }
    }

    #[test]
    fn miners_are_flagged_by_the_analyzer() {
        let snapshot = scanner(1.0).inventory("lab").unwrap();
        let result = NetworkAnalyzer::default().evaluate(&snapshot).unwrap();
        assert!(result.detected);
        let Findings::Network(findings) = result.findings else {
            panic!("expected network findings");
        };
        let flagged: Vec<_> = findings.devices.iter().filter(|d| d.flagged).collect();
        assert!(!flagged.is_empty());
        assert!(flagged.iter().all(|d| d.manufacturer == "Bitmain"));
    }

    #[test]
    fn clean_network_is_not_flagged() {
        let snapshot = scanner(0.0).inventory("lab").unwrap();
        let result = NetworkAnalyzer::default().evaluate(&snapshot).unwrap();
        assert!(!result.detected);
    }
}
