//! Scan orchestration and confidence-fusion core for field detection of
//! cryptocurrency-mining hardware.
//!
//! Independent sensing modalities (acoustic, EMI, network) are driven
//! concurrently by a [`ScanManager`], their analyses are normalised into
//! [`MethodResult`]s, passed through the [`ConfidenceGate`] and persisted as
//! geolocated detections in the [`DetectionStore`].

pub mod analysis;
pub mod gate;
pub mod geo;
pub mod interface;
pub mod map;
pub mod math;
pub mod prelude;
pub mod session;
pub mod store;
pub mod telemetry;

pub use gate::{ConfidenceGate, Verdict};
pub use interface::{Detection, MethodResult, RawSample, ScanRequest, ScanSnapshot};
pub use prelude::{Analyzer, Modality, Sensitivity, SignalSource};
pub use session::{ScanManager, SessionSettings};
pub use store::DetectionStore;
