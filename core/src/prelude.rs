use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::interface::{MethodResult, RawSample, SessionStatus};
use crate::session::ProgressReporter;

/// A sensing modality a scan can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Acoustic,
    Network,
    Emi,
}

impl Modality {
    pub const ALL: [Modality; 3] = [Modality::Acoustic, Modality::Network, Modality::Emi];

    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::Acoustic => "acoustic",
            Modality::Network => "network",
            Modality::Emi => "emi",
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Modality {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "acoustic" => Ok(Modality::Acoustic),
            "network" => Ok(Modality::Network),
            "emi" => Ok(Modality::Emi),
            other => Err(format!("unknown detection method '{other}'")),
        }
    }
}

/// How a persisted detection was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMethod {
    Acoustic,
    Network,
    Emi,
    Combined,
}

impl DetectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionMethod::Acoustic => "acoustic",
            DetectionMethod::Network => "network",
            DetectionMethod::Emi => "emi",
            DetectionMethod::Combined => "combined",
        }
    }
}

impl From<Modality> for DetectionMethod {
    fn from(modality: Modality) -> Self {
        match modality {
            Modality::Acoustic => DetectionMethod::Acoustic,
            Modality::Network => DetectionMethod::Network,
            Modality::Emi => DetectionMethod::Emi,
        }
    }
}

impl fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed device-type vocabulary for detections.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeviceType {
    Asic,
    Gpu,
    Cpu,
    Fpga,
    #[default]
    Unknown,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Asic => "ASIC",
            DeviceType::Gpu => "GPU",
            DeviceType::Cpu => "CPU",
            DeviceType::Fpga => "FPGA",
            DeviceType::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn validate(&self) -> Result<(), ScanError> {
        if !self.lat.is_finite() || !self.lng.is_finite() {
            return Err(ScanError::InvalidLocation(
                "coordinates are not finite numbers".into(),
            ));
        }
        if !(-90.0..=90.0).contains(&self.lat) || !(-180.0..=180.0).contains(&self.lng) {
            return Err(ScanError::InvalidLocation(format!(
                "{:.5}, {:.5} is outside latitude -90..90 or longitude -180..180",
                self.lat, self.lng
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.5}, {:.5}", self.lat, self.lng)
    }
}

/// Minimum confidence a result needs to become a detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Sensitivity(u8);

impl Sensitivity {
    pub const MIN: u8 = 50;
    pub const MAX: u8 = 95;
    pub const DEFAULT: u8 = 70;

    pub fn new(value: u8) -> Result<Self, ScanError> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(ScanError::InvalidSensitivity(value))
        }
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl Default for Sensitivity {
    fn default() -> Self {
        Self(Self::DEFAULT)
    }
}

impl TryFrom<u8> for Sensitivity {
    type Error = ScanError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Sensitivity::new(value)
    }
}

impl From<Sensitivity> for u8 {
    fn from(value: Sensitivity) -> Self {
        value.0
    }
}

/// Display bands for confidence values.
pub const CONFIDENCE_LOW: u8 = 50;
pub const CONFIDENCE_MEDIUM: u8 = 70;
pub const CONFIDENCE_HIGH: u8 = 85;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceBand {
    Low,
    Medium,
    High,
}

impl ConfidenceBand {
    pub fn of(confidence: u8) -> Self {
        if confidence >= CONFIDENCE_HIGH {
            ConfidenceBand::High
        } else if confidence >= CONFIDENCE_MEDIUM {
            ConfidenceBand::Medium
        } else {
            ConfidenceBand::Low
        }
    }
}

/// Errors raised while starting or addressing a scan session.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ScanError {
    #[error("scan location is missing: {0}")]
    MissingLocation(String),
    #[error("scan location is invalid: {0}")]
    InvalidLocation(String),
    #[error("no detection methods were requested; choose at least one of acoustic, network or emi")]
    NoMethods,
    #[error("sensitivity {0} is outside the supported range {}-{}", Sensitivity::MIN, Sensitivity::MAX)]
    InvalidSensitivity(u8),
    #[error("no signal source is registered for the {0} method")]
    UnsupportedMethod(Modality),
    #[error("signal source for {acquires} cannot be paired with an analyzer for {analyzes}")]
    MismatchedPipeline { acquires: Modality, analyzes: Modality },
    #[error("scan {0} is still running; cancel it before starting another")]
    SessionActive(String),
    #[error("scan {0} was not found")]
    UnknownScan(String),
    #[error("scan cannot move from {from} to {to}")]
    InvalidTransition {
        from: SessionStatus,
        to: SessionStatus,
    },
}

impl ScanError {
    /// Errors raised by request validation before any acquisition starts.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ScanError::MissingLocation(_)
                | ScanError::InvalidLocation(_)
                | ScanError::NoMethods
                | ScanError::InvalidSensitivity(_)
                | ScanError::UnsupportedMethod(_)
        )
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum AcquisitionError {
    #[error("signal source unavailable: {0}")]
    Unavailable(String),
    #[error("acquisition interrupted: {0}")]
    Interrupted(String),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("sample rejected: {0}")]
    InvalidSample(String),
    #[error("analyzer for {expected} received a {found} sample")]
    ModalityMismatch { expected: Modality, found: Modality },
    #[error("analyzer failure: {0}")]
    Internal(String),
}

/// Failure of one modality inside a session. Never aborts sibling methods.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum MethodError {
    #[error("{modality} signal acquisition timed out after {after:?}")]
    AcquisitionTimeout { modality: Modality, after: Duration },
    #[error("{modality} signal acquisition failed: {source}")]
    Acquisition {
        modality: Modality,
        source: AcquisitionError,
    },
    #[error("{modality} analysis timed out after {after:?}")]
    AnalysisTimeout { modality: Modality, after: Duration },
    #[error("{modality} analysis failed: {source}")]
    Analysis {
        modality: Modality,
        source: AnalysisError,
    },
}

impl MethodError {
    pub fn modality(&self) -> Modality {
        match self {
            MethodError::AcquisitionTimeout { modality, .. }
            | MethodError::Acquisition { modality, .. }
            | MethodError::AnalysisTimeout { modality, .. }
            | MethodError::Analysis { modality, .. } => *modality,
        }
    }

    /// Fatal failures end the session as `failed` once siblings finish.
    /// Timeouts and interruptions only drop this method's contribution.
    pub fn is_fatal(&self) -> bool {
        match self {
            MethodError::AcquisitionTimeout { .. } | MethodError::AnalysisTimeout { .. } => false,
            MethodError::Acquisition { source, .. } => {
                matches!(source, AcquisitionError::Unavailable(_))
            }
            MethodError::Analysis { .. } => true,
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum GeoError {
    #[error("reverse geocoding timed out after {0:?}")]
    Timeout(Duration),
    #[error("reverse geocoding request failed: {0}")]
    Transport(String),
    #[error("no address found for {0}")]
    NotFound(Coordinates),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("could not sync with the detection service: {0}")]
    Sync(String),
    #[error("detection rejected: {0}")]
    InvalidDetection(String),
}

/// Where and how far a source should look.
#[derive(Debug, Clone)]
pub struct AcquireRequest {
    pub scan_id: String,
    pub location: Coordinates,
    pub radius_m: u32,
}

/// One sensing modality's sample producer.
#[async_trait]
pub trait SignalSource: Send + Sync {
    fn modality(&self) -> Modality;

    async fn acquire(
        &self,
        request: &AcquireRequest,
        progress: &ProgressReporter,
    ) -> Result<RawSample, AcquisitionError>;
}

/// Converts a raw sample into a normalised result.
///
/// Implementations must be deterministic for identical samples.
#[async_trait]
pub trait Analyzer: Send + Sync {
    fn modality(&self) -> Modality;

    async fn analyze(&self, sample: RawSample) -> Result<MethodResult, AnalysisError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sensitivity_is_bounded() {
        assert!(Sensitivity::new(49).is_err());
        assert!(Sensitivity::new(96).is_err());
        assert_eq!(Sensitivity::new(50).unwrap().value(), 50);
        assert_eq!(Sensitivity::new(95).unwrap().value(), 95);
        assert_eq!(Sensitivity::default().value(), 70);
    }

    #[test]
    fn sensitivity_deserializes_through_bounds_check() {
        let ok: Sensitivity = serde_json::from_str("75").unwrap();
        assert_eq!(ok.value(), 75);
        assert!(serde_json::from_str::<Sensitivity>("30").is_err());
    }

    #[test]
    fn modality_parses_case_insensitively() {
        assert_eq!("EMI".parse::<Modality>().unwrap(), Modality::Emi);
        assert!("thermal".parse::<Modality>().is_err());
    }

    #[test]
    fn coordinates_reject_out_of_range_positions() {
        assert!(Coordinates::new(33.638, 46.4153).validate().is_ok());
        assert!(matches!(
            Coordinates::new(91.0, 0.0).validate(),
            Err(ScanError::InvalidLocation(_))
        ));
        let err = Coordinates::new(f64::NAN, 0.0).validate().unwrap_err();
        assert!(err.is_validation());
        assert_eq!(
            err.to_string(),
            "scan location is invalid: coordinates are not finite numbers"
        );
    }

    #[test]
    fn timeouts_are_not_fatal_but_analyzer_faults_are() {
        let timeout = MethodError::AnalysisTimeout {
            modality: Modality::Emi,
            after: Duration::from_secs(5),
        };
        let fault = MethodError::Analysis {
            modality: Modality::Emi,
            source: AnalysisError::Internal("boom".into()),
        };
        let unavailable = MethodError::Acquisition {
            modality: Modality::Acoustic,
            source: AcquisitionError::Unavailable("no microphone".into()),
        };
        assert!(!timeout.is_fatal());
        assert!(fault.is_fatal());
        assert!(unavailable.is_fatal());
        assert_eq!(
            timeout.to_string(),
            "emi analysis timed out after 5s"
        );
    }

    #[test]
    fn confidence_bands_follow_thresholds() {
        assert_eq!(ConfidenceBand::of(49), ConfidenceBand::Low);
        assert_eq!(ConfidenceBand::of(70), ConfidenceBand::Medium);
        assert_eq!(ConfidenceBand::of(85), ConfidenceBand::High);
    }
}
