//! Analyzers turning raw samples into [`MethodResult`]s.
//!
//! Each analyzer is a pure function of its sample. The async [`Analyzer`]
//! entry point moves the computation onto the blocking pool so a session's
//! timeout can fire while it runs.

pub mod acoustic;
pub mod emi;
pub mod network;
pub mod signatures;

use std::sync::Arc;

pub use acoustic::{AcousticAnalyzer, AcousticConfig};
pub use emi::{EmiAnalyzer, EmiConfig};
pub use network::{NetworkAnalyzer, NetworkConfig};

use crate::interface::MethodResult;
use crate::prelude::{AnalysisError, Analyzer};

pub(crate) async fn run_blocking<F>(job: F) -> Result<MethodResult, AnalysisError>
where
    F: FnOnce() -> Result<MethodResult, AnalysisError> + Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await
        .map_err(|err| AnalysisError::Internal(format!("analysis task aborted: {err}")))?
}

/// The built-in analyzer for every modality, with default tuning.
pub fn default_analyzers() -> Vec<Arc<dyn Analyzer>> {
    vec![
        Arc::new(AcousticAnalyzer::default()),
        Arc::new(NetworkAnalyzer::default()),
        Arc::new(EmiAnalyzer::default()),
    ]
}

/// Round and clamp a 0-100 score.
pub(crate) fn to_percent(score: f32) -> u8 {
    if score.is_nan() {
        return 0;
    }
    score.round().clamp(0.0, 100.0) as u8
}
