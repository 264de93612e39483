use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use minercore::prelude::{Coordinates, Modality, Sensitivity};
use minercore::{ScanRequest, SessionSettings};
use serde::{Deserialize, Serialize};

use crate::generator::GeneratorConfig;
use crate::geocode::GeocoderConfig;

/// What to scan and how strictly to judge it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSection {
    pub methods: Vec<Modality>,
    pub sensitivity: u8,
    pub radius_m: u32,
    pub location: Option<Coordinates>,
    pub operator: String,
}

impl Default for ScanSection {
    fn default() -> Self {
        Self {
            methods: Modality::ALL.to_vec(),
            sensitivity: Sensitivity::DEFAULT,
            radius_m: 1000,
            location: Some(Coordinates::new(33.638, 46.4153)),
            operator: "field operator".into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutSection {
    pub acquisition_ms: u64,
    pub analysis_ms: u64,
    pub geocode_ms: u64,
}

impl Default for TimeoutSection {
    fn default() -> Self {
        Self {
            acquisition_ms: 30_000,
            analysis_ms: 5_000,
            geocode_ms: 5_000,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub scan: ScanSection,
    pub timeouts: TimeoutSection,
    pub poll_interval_ms: u64,
    pub generator: GeneratorConfig,
    pub geocoder: GeocoderConfig,
    /// JSON file with `detections` and `history`; built-in sample data otherwise.
    pub seed_data: Option<PathBuf>,
    pub bind: SocketAddr,
    /// Offline runs append a one-line summary here.
    pub report: Option<PathBuf>,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            scan: ScanSection::default(),
            timeouts: TimeoutSection::default(),
            poll_interval_ms: 1000,
            generator: GeneratorConfig::default(),
            geocoder: GeocoderConfig::default(),
            seed_data: None,
            bind: SocketAddr::from(([127, 0, 0, 1], 9000)),
            report: None,
        }
    }
}

impl WorkflowConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading workflow config {}", path_ref.display()))?;
        let config: WorkflowConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing workflow config {}", path_ref.display()))?;
        config
            .validate()
            .with_context(|| format!("validating workflow config {}", path_ref.display()))?;
        Ok(config)
    }

    pub fn from_args(
        methods: Vec<Modality>,
        sensitivity: u8,
        location: Coordinates,
        radius_m: u32,
        seed: u64,
    ) -> Self {
        let defaults = Self::default();
        Self {
            scan: ScanSection {
                methods,
                sensitivity,
                radius_m,
                location: Some(location),
                ..defaults.scan
            },
            generator: GeneratorConfig {
                seed,
                ..defaults.generator
            },
            ..defaults
        }
    }

    /// Reject settings a scan would refuse anyway, before anything starts.
    pub fn validate(&self) -> anyhow::Result<()> {
        Sensitivity::new(self.scan.sensitivity)?;
        if let Some(location) = self.scan.location {
            location.validate()?;
        }
        anyhow::ensure!(
            self.poll_interval_ms > 0,
            "poll_interval_ms must be greater than zero"
        );
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn scan_request(&self) -> ScanRequest {
        ScanRequest {
            location: self.scan.location,
            radius_m: Some(self.scan.radius_m),
            methods: self.scan.methods.clone(),
            sensitivity: self.scan.sensitivity,
            operator: Some(self.scan.operator.clone()),
        }
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            acquisition_timeout: Duration::from_millis(self.timeouts.acquisition_ms),
            analysis_timeout: Duration::from_millis(self.timeouts.analysis_ms),
            geocode_timeout: Duration::from_millis(self.timeouts.geocode_ms),
            default_radius_m: self.scan.radius_m,
            operator: self.scan.operator.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn config_from_args_produces_session_settings() {
        let cfg = WorkflowConfig::from_args(
            vec![Modality::Acoustic],
            80,
            Coordinates::new(33.6, 46.4),
            500,
            11,
        );
        let settings = cfg.session_settings();
        assert_eq!(settings.default_radius_m, 500);
        assert_eq!(settings.analysis_timeout, Duration::from_secs(5));
        assert_eq!(cfg.generator.seed, 11);
        assert_eq!(cfg.scan_request().sensitivity, 80);
    }

    #[test]
    fn config_load_reads_yaml() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(
            b"scan:\n  methods: [acoustic, emi]\n  sensitivity: 85\ntimeouts:\n  analysis_ms: 250\ngeocoder:\n  kind: nominatim\n",
        )
        .unwrap();
        let path = temp.into_temp_path();
        let cfg = WorkflowConfig::load(&path).unwrap();
        assert_eq!(cfg.scan.methods, vec![Modality::Acoustic, Modality::Emi]);
        assert_eq!(cfg.scan.radius_m, 1000);
        assert_eq!(cfg.session_settings().analysis_timeout, Duration::from_millis(250));
        assert!(matches!(cfg.geocoder, GeocoderConfig::Nominatim { .. }));
    }

    #[test]
    fn out_of_range_sensitivity_is_rejected_on_load() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(b"scan:\n  sensitivity: 30\n").unwrap();
        let path = temp.into_temp_path();
        let err = WorkflowConfig::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("sensitivity 30"));
    }
}
