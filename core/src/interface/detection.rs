use serde::{Deserialize, Serialize};

use crate::prelude::{DetectionMethod, DeviceType, StoreError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioProfile {
    pub frequency: f32,
    pub pattern: String,
    pub decibels: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkActivity {
    pub pools: Vec<String>,
    pub connections: usize,
    pub bandwidth: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmiSignature {
    pub strength: u8,
    pub frequency: f32,
    pub pattern: String,
}

/// Method-specific attribute bag carried by a detection.
#[derive(Debug, Clone, PartialEq)]
pub enum Signature {
    Audio(AudioProfile),
    Network(NetworkActivity),
    Emi(EmiSignature),
}

impl Signature {
    pub fn method(&self) -> DetectionMethod {
        match self {
            Signature::Audio(_) => DetectionMethod::Acoustic,
            Signature::Network(_) => DetectionMethod::Network,
            Signature::Emi(_) => DetectionMethod::Emi,
        }
    }
}

/// A persisted detection. Immutable once the store has assigned its id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Detection {
    pub id: u64,
    pub timestamp: String,
    pub location: Location,
    pub confidence: u8,
    #[serde(rename = "type")]
    pub device_type: DeviceType,
    pub detection_method: DetectionMethod,
    #[serde(default)]
    pub device_info: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_profile: Option<AudioProfile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_activity: Option<NetworkActivity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emi_signature: Option<EmiSignature>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_id: Option<String>,
}

impl Detection {
    pub fn signature(&self) -> Option<Signature> {
        if let Some(profile) = &self.audio_profile {
            return Some(Signature::Audio(profile.clone()));
        }
        if let Some(activity) = &self.network_activity {
            return Some(Signature::Network(activity.clone()));
        }
        self.emi_signature.clone().map(Signature::Emi)
    }
}

/// Everything a detection needs except the id the store assigns.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionInput {
    pub timestamp: String,
    pub location: Location,
    pub confidence: u8,
    pub device_type: DeviceType,
    pub detection_method: DetectionMethod,
    pub device_info: String,
    pub signature: Option<Signature>,
    pub scan_id: Option<String>,
}

impl DetectionInput {
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.confidence > 100 {
            return Err(StoreError::InvalidDetection(format!(
                "confidence {} exceeds 100",
                self.confidence
            )));
        }
        if !self.location.lat.is_finite() || !self.location.lng.is_finite() {
            return Err(StoreError::InvalidDetection(
                "location is not a finite coordinate".into(),
            ));
        }
        match (&self.signature, self.detection_method) {
            (None, DetectionMethod::Combined) => Ok(()),
            (Some(signature), method) if signature.method() == method => Ok(()),
            (Some(signature), method) => Err(StoreError::InvalidDetection(format!(
                "{} attributes attached to a {} detection",
                signature.method(),
                method
            ))),
            (None, method) => Err(StoreError::InvalidDetection(format!(
                "{} detection is missing its signal attributes",
                method
            ))),
        }
    }

    pub(crate) fn into_detection(self, id: u64) -> Detection {
        let mut detection = Detection {
            id,
            timestamp: self.timestamp,
            location: self.location,
            confidence: self.confidence,
            device_type: self.device_type,
            detection_method: self.detection_method,
            device_info: self.device_info,
            audio_profile: None,
            network_activity: None,
            emi_signature: None,
            scan_id: self.scan_id,
        };
        match self.signature {
            Some(Signature::Audio(profile)) => detection.audio_profile = Some(profile),
            Some(Signature::Network(activity)) => detection.network_activity = Some(activity),
            Some(Signature::Emi(signature)) => detection.emi_signature = Some(signature),
            None => {}
        }
        detection
    }
}
