use std::fmt;

use serde::{Deserialize, Serialize};

use crate::interface::detection::{
    AudioProfile, DetectionInput, EmiSignature, Location, NetworkActivity, Signature,
};
use crate::interface::sample::Protocol;
use crate::interface::local_timestamp;
use crate::prelude::{DeviceType, Modality};

/// Qualitative shape of a signal envelope or spectrum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalPattern {
    Continuous,
    Pulsating,
    Rhythmic,
    Pulsed,
    Modulated,
    Variable,
}

impl SignalPattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalPattern::Continuous => "continuous",
            SignalPattern::Pulsating => "pulsating",
            SignalPattern::Rhythmic => "rhythmic",
            SignalPattern::Pulsed => "pulsed",
            SignalPattern::Modulated => "modulated",
            SignalPattern::Variable => "variable",
        }
    }
}

impl fmt::Display for SignalPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcousticFindings {
    pub dominant_frequency: f32,
    pub decibels: f32,
    pub pattern: SignalPattern,
    pub possible_device: Option<String>,
    pub device_type: DeviceType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmiFindings {
    pub dominant_frequency: f32,
    pub band_khz: (f32, f32),
    pub signal_strength: u8,
    pub signal_pattern: SignalPattern,
    pub bearing_deg: f32,
    pub possible_devices: Vec<String>,
    pub device_type: DeviceType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceAssessment {
    pub device_id: String,
    pub ip_address: String,
    pub manufacturer: String,
    pub model: String,
    pub suspicious_score: u8,
    pub confidence: u8,
    pub flagged: bool,
    pub pools: Vec<String>,
    pub connections: usize,
    pub bandwidth_kbps: u32,
    pub probable_type: DeviceType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuspiciousConnection {
    pub source: String,
    pub target: String,
    pub pool: String,
    pub port: u16,
    pub protocol: Protocol,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkFindings {
    pub devices: Vec<DeviceAssessment>,
    pub suspicious_connections: Vec<SuspiciousConnection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Findings {
    Acoustic(AcousticFindings),
    Emi(EmiFindings),
    Network(NetworkFindings),
}

/// Normalised output of one analyzer invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodResult {
    pub modality: Modality,
    pub detected: bool,
    pub confidence: u8,
    pub findings: Findings,
}

/// A single detection-worthy finding inside a result.
///
/// Acoustic and EMI results yield one candidate; network results yield one
/// per assessed device, each carrying its own sub-confidence.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub modality: Modality,
    pub detected: bool,
    pub confidence: u8,
    pub device_type: DeviceType,
    pub device_info: String,
    pub signature: Signature,
}

impl Candidate {
    pub fn into_input(self, location: Location, scan_id: Option<String>) -> DetectionInput {
        DetectionInput {
            timestamp: local_timestamp(),
            location,
            confidence: self.confidence.min(100),
            device_type: self.device_type,
            detection_method: self.modality.into(),
            device_info: self.device_info,
            signature: Some(self.signature),
            scan_id,
        }
    }
}

const UNKNOWN_DEVICE: &str = "unidentified device";

impl MethodResult {
    pub fn candidates(&self) -> Vec<Candidate> {
        match &self.findings {
            Findings::Acoustic(findings) => vec![Candidate {
                modality: self.modality,
                detected: self.detected,
                confidence: self.confidence,
                device_type: findings.device_type,
                device_info: findings
                    .possible_device
                    .clone()
                    .unwrap_or_else(|| UNKNOWN_DEVICE.to_string()),
                signature: Signature::Audio(AudioProfile {
                    frequency: findings.dominant_frequency,
                    pattern: findings.pattern.to_string(),
                    decibels: findings.decibels,
                }),
            }],
            Findings::Emi(findings) => vec![Candidate {
                modality: self.modality,
                detected: self.detected,
                confidence: self.confidence,
                device_type: findings.device_type,
                device_info: if findings.possible_devices.is_empty() {
                    UNKNOWN_DEVICE.to_string()
                } else {
                    findings.possible_devices.join(", ")
                },
                signature: Signature::Emi(EmiSignature {
                    strength: findings.signal_strength,
                    frequency: findings.dominant_frequency,
                    pattern: findings.signal_pattern.to_string(),
                }),
            }],
            Findings::Network(findings) => findings
                .devices
                .iter()
                .map(|device| Candidate {
                    modality: self.modality,
                    detected: device.flagged,
                    confidence: device.confidence,
                    device_type: device.probable_type,
                    device_info: format!("{} {}", device.manufacturer, device.model)
                        .trim()
                        .to_string(),
                    signature: Signature::Network(NetworkActivity {
                        pools: device.pools.clone(),
                        connections: device.connections,
                        bandwidth: device.bandwidth_kbps,
                    }),
                })
                .collect(),
        }
    }
}
