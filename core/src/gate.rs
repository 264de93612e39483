//! Threshold decision turning analyzer output into detections.

use crate::interface::{Candidate, MethodResult};
use crate::prelude::Sensitivity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Reject,
}

pub struct ConfidenceGate;

impl ConfidenceGate {
    /// Accept iff the result is a detection at or above the sensitivity.
    pub fn evaluate(result: &MethodResult, sensitivity: Sensitivity) -> Verdict {
        Self::evaluate_score(result.detected, result.confidence, sensitivity)
    }

    pub fn evaluate_score(detected: bool, confidence: u8, sensitivity: Sensitivity) -> Verdict {
        if detected && confidence >= sensitivity.value() {
            Verdict::Accept
        } else {
            Verdict::Reject
        }
    }

    /// Candidates of an accepted result that individually clear the gate.
    ///
    /// Network results carry one candidate per device; each device is judged
    /// on its own sub-confidence.
    pub fn admit(result: &MethodResult, sensitivity: Sensitivity) -> Vec<Candidate> {
        if Self::evaluate(result, sensitivity) == Verdict::Reject {
            return Vec::new();
        }
        result
            .candidates()
            .into_iter()
            .filter(|candidate| {
                Self::evaluate_score(candidate.detected, candidate.confidence, sensitivity)
                    == Verdict::Accept
            })
            .collect()
    }
}
