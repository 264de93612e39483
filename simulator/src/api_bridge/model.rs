use minercore::prelude::{Coordinates, DetectionMethod, DeviceType};
use minercore::Detection;
use serde::{Deserialize, Serialize};

/// What a map front-end needs to draw: one pin per detection and the scan area.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapView {
    pub markers: Vec<Marker>,
    pub scan_circle: Option<ScanCircle>,
    pub selected: Option<Coordinates>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Marker {
    pub id: u64,
    pub lat: f64,
    pub lng: f64,
    pub confidence: u8,
    #[serde(rename = "type")]
    pub device_type: DeviceType,
    pub method: DetectionMethod,
    pub address: String,
}

impl From<&Detection> for Marker {
    fn from(detection: &Detection) -> Self {
        Self {
            id: detection.id,
            lat: detection.location.lat,
            lng: detection.location.lng,
            confidence: detection.confidence,
            device_type: detection.device_type,
            method: detection.detection_method,
            address: detection.location.address.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanCircle {
    pub center: Coordinates,
    pub radius_m: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Started {
    pub scan_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Cancelled {
    pub cancelled: bool,
}
