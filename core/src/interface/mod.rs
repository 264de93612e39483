pub mod detection;
pub mod result;
pub mod sample;
pub mod scan;

pub use detection::{
    AudioProfile, Detection, DetectionInput, EmiSignature, Location, NetworkActivity, Signature,
};
pub use result::{
    AcousticFindings, Candidate, DeviceAssessment, EmiFindings, Findings, MethodResult,
    NetworkFindings, SignalPattern, SuspiciousConnection,
};
pub use sample::{
    AudioBuffer, ConnectionObservation, DeviceObservation, EmiSweep, NetworkSnapshot, Protocol,
    RawSample,
};
pub use scan::{
    FailureReason, HistoryInput, HistoryStatus, MethodCounts, ScanHistory, ScanRequest,
    ScanSnapshot, SessionStatus, Stats,
};

/// Locale-style wall clock timestamp used on persisted records.
pub fn local_timestamp() -> String {
    chrono::Local::now().format("%Y/%m/%d %H:%M:%S").to_string()
}
