use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::interface::detection::Detection;
use crate::interface::result::MethodResult;
use crate::prelude::{Coordinates, DeviceType, Modality, Sensitivity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Initializing,
    Scanning,
    Analyzing,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Failed)
    }

    /// `initializing -> scanning -> analyzing -> completed`, with `failed`
    /// reachable from every non-terminal state.
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        match (self, next) {
            (Initializing, Scanning) | (Scanning, Analyzing) | (Analyzing, Completed) => true,
            (Initializing | Scanning | Analyzing, Failed) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Initializing => "initializing",
            SessionStatus::Scanning => "scanning",
            SessionStatus::Analyzing => "analyzing",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a session ended in `failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    Cancelled,
    MethodFailed,
    NoResults,
}

impl FailureReason {
    pub fn describe(&self) -> &'static str {
        match self {
            FailureReason::Cancelled => "scan was cancelled by the operator",
            FailureReason::MethodFailed => "a detection method failed; partial results were kept",
            FailureReason::NoResults => "no detection method produced a result",
        }
    }
}

fn default_sensitivity() -> u8 {
    Sensitivity::DEFAULT
}

/// Parameters of a scan as submitted by a caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRequest {
    #[serde(default)]
    pub location: Option<Coordinates>,
    #[serde(default, alias = "radius")]
    pub radius_m: Option<u32>,
    #[serde(default)]
    pub methods: Vec<Modality>,
    #[serde(default = "default_sensitivity")]
    pub sensitivity: u8,
    #[serde(default)]
    pub operator: Option<String>,
}

impl ScanRequest {
    pub fn new(location: Coordinates, methods: Vec<Modality>, sensitivity: u8) -> Self {
        Self {
            location: Some(location),
            radius_m: None,
            methods,
            sensitivity,
            operator: None,
        }
    }
}

/// Copy of a session's observable state at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSnapshot {
    pub scan_id: String,
    pub status: SessionStatus,
    pub progress: u8,
    pub methods: Vec<Modality>,
    pub current_method: Option<Modality>,
    pub location: Coordinates,
    pub detections: Vec<Detection>,
    pub results: Vec<MethodResult>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub failure: Option<FailureReason>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub logs: Vec<String>,
}

impl ScanSnapshot {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn was_cancelled(&self) -> bool {
        self.failure == Some(FailureReason::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryStatus {
    Completed,
    Failed,
    Partial,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanHistory {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_id: Option<String>,
    pub date: String,
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radius_m: Option<u32>,
    pub detected_miners: usize,
    /// Seconds.
    pub duration: u64,
    pub operator: String,
    #[serde(default)]
    pub methods: Vec<Modality>,
    pub status: HistoryStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryInput {
    pub scan_id: Option<String>,
    pub date: String,
    pub location: String,
    pub coordinates: Option<Coordinates>,
    pub radius_m: Option<u32>,
    pub detected_miners: usize,
    pub duration: u64,
    pub operator: String,
    pub methods: Vec<Modality>,
    pub status: HistoryStatus,
}

impl HistoryInput {
    pub(crate) fn into_history(self, id: u64) -> ScanHistory {
        ScanHistory {
            id,
            scan_id: self.scan_id,
            date: self.date,
            location: self.location,
            coordinates: self.coordinates,
            radius_m: self.radius_m,
            detected_miners: self.detected_miners,
            duration: self.duration,
            operator: self.operator,
            methods: self.methods,
            status: self.status,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MethodCounts {
    pub acoustic: usize,
    pub network: usize,
    pub emi: usize,
    pub combined: usize,
}

/// Aggregate statistics, always derived from the store's collections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total_scans: usize,
    pub total_detections: usize,
    pub average_confidence: u8,
    pub last_scan_date: Option<String>,
    pub scans_by_method: MethodCounts,
    pub detections_by_type: BTreeMap<DeviceType, usize>,
    pub success_rate: f64,
    pub average_scan_duration: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_machine_allows_only_forward_edges() {
        use SessionStatus::*;
        assert!(Initializing.can_transition_to(Scanning));
        assert!(Scanning.can_transition_to(Analyzing));
        assert!(Analyzing.can_transition_to(Completed));
        assert!(Scanning.can_transition_to(Failed));
        assert!(!Scanning.can_transition_to(Completed));
        assert!(!Initializing.can_transition_to(Analyzing));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Scanning));
    }

    #[test]
    fn scan_request_accepts_wire_shape() {
        let request: ScanRequest = serde_json::from_str(
            r#"{"location":{"lat":33.6,"lng":46.4},"radius":500,"methods":["acoustic","emi"]}"#,
        )
        .unwrap();
        assert_eq!(request.radius_m, Some(500));
        assert_eq!(request.methods, vec![Modality::Acoustic, Modality::Emi]);
        assert_eq!(request.sensitivity, Sensitivity::DEFAULT);
    }
}
