use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, OnceCell};

use crate::interface::{
    Detection, FailureReason, HistoryInput, HistoryStatus, MethodResult, ScanRequest,
    ScanSnapshot, SessionStatus,
};
use crate::prelude::{Coordinates, Modality, ScanError, Sensitivity};
use crate::telemetry::LogManager;

/// Share of a method's progress range reached when acquisition ends.
pub(crate) const ACQUIRED_PERCENT: u8 = 60;
/// Share reached once its analysis result is recorded.
pub(crate) const ANALYZED_PERCENT: u8 = 90;

/// Apportions 0-100 across methods. Each method only ever moves forward.
#[derive(Debug, Clone)]
pub(crate) struct ProgressTracker {
    shares: Vec<u8>,
    reached: Vec<u8>,
}

impl ProgressTracker {
    pub(crate) fn new(methods: usize) -> Self {
        let methods = methods.max(1);
        let base = (100 / methods) as u8;
        let remainder = 100 % methods;
        let shares = (0..methods)
            .map(|i| if i < remainder { base + 1 } else { base })
            .collect();
        Self {
            shares,
            reached: vec![0; methods],
        }
    }

    /// Move method `index` to `percent` of its own range.
    pub(crate) fn advance(&mut self, index: usize, percent: u8) {
        if let Some(reached) = self.reached.get_mut(index) {
            *reached = (*reached).max(percent.min(100));
        }
    }

    pub(crate) fn complete_all(&mut self) {
        self.reached.iter_mut().for_each(|reached| *reached = 100);
    }

    pub(crate) fn total(&self) -> u8 {
        self.shares
            .iter()
            .zip(&self.reached)
            .map(|(share, reached)| u32::from(*share) * u32::from(*reached) / 100)
            .sum::<u32>()
            .min(100) as u8
    }
}

pub(crate) struct SessionState {
    pub(crate) status: SessionStatus,
    pub(crate) progress: ProgressTracker,
    pub(crate) running: Vec<Modality>,
    pub(crate) pending_acquisitions: usize,
    pub(crate) detections: Vec<Detection>,
    pub(crate) results: Vec<MethodResult>,
    pub(crate) errors: Vec<String>,
    pub(crate) fatal: bool,
    pub(crate) warnings: Vec<String>,
    pub(crate) failure: Option<FailureReason>,
    pub(crate) started_at: DateTime<Utc>,
    pub(crate) finished_at: Option<DateTime<Utc>>,
    pub(crate) finished: Option<Instant>,
    pub(crate) logs: Vec<String>,
    started: Instant,
    logger: LogManager,
}

impl SessionState {
    fn new(methods: usize, logger: LogManager) -> Self {
        Self {
            status: SessionStatus::Initializing,
            progress: ProgressTracker::new(methods),
            running: Vec::new(),
            pending_acquisitions: methods,
            detections: Vec::new(),
            results: Vec::new(),
            errors: Vec::new(),
            fatal: false,
            warnings: Vec::new(),
            failure: None,
            started_at: Utc::now(),
            finished_at: None,
            finished: None,
            logs: Vec::new(),
            started: Instant::now(),
            logger,
        }
    }

    pub(crate) fn log(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.logger.record(&message);
        self.logs.push(message);
    }

    pub(crate) fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.logger.warn(&message);
        self.logs.push(message.clone());
        self.warnings.push(message);
    }

    /// Record a per-method failure.
    pub(crate) fn error(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.logger.warn(&message);
        self.logs.push(message.clone());
        self.errors.push(message);
    }

    pub(crate) fn transition(&mut self, next: SessionStatus) -> Result<(), ScanError> {
        if !self.status.can_transition_to(next) {
            return Err(ScanError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        let previous = self.status;
        self.status = next;
        if next.is_terminal() {
            self.finished_at = Some(Utc::now());
            self.finished = Some(Instant::now());
            self.running.clear();
        }
        self.log(format!("status {previous} -> {next}"));
        Ok(())
    }

    pub(crate) fn elapsed_secs(&self) -> u64 {
        self.finished
            .unwrap_or_else(Instant::now)
            .duration_since(self.started)
            .as_secs()
    }
}

/// Everything one session's tasks share.
pub(crate) struct SessionShared {
    pub(crate) scan_id: String,
    pub(crate) request: ScanRequest,
    pub(crate) methods: Vec<Modality>,
    pub(crate) location: Coordinates,
    pub(crate) radius_m: u32,
    pub(crate) sensitivity: Sensitivity,
    pub(crate) operator: String,
    pub(crate) address: OnceCell<String>,
    cancel: watch::Sender<bool>,
    state: Mutex<SessionState>,
}

impl SessionShared {
    pub(crate) fn new(
        scan_id: String,
        request: ScanRequest,
        methods: Vec<Modality>,
        location: Coordinates,
        radius_m: u32,
        sensitivity: Sensitivity,
        operator: String,
    ) -> Self {
        let (cancel, _) = watch::channel(false);
        let state = SessionState::new(methods.len(), LogManager::scoped(scan_id.clone()));
        Self {
            scan_id,
            request,
            methods,
            location,
            radius_m,
            sensitivity,
            operator,
            address: OnceCell::new(),
            cancel,
            state: Mutex::new(state),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn signal_cancel(&self) {
        self.cancel.send_replace(true);
    }

    /// Resolves once the session has been cancelled.
    pub(crate) async fn cancelled(&self) {
        let mut receiver = self.cancel.subscribe();
        if receiver.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    pub(crate) fn is_terminal(&self) -> bool {
        self.lock().status.is_terminal()
    }

    /// History record for the session's terminal state.
    pub(crate) fn history_input(&self, state: &SessionState) -> HistoryInput {
        let status = match state.status {
            SessionStatus::Completed if state.errors.is_empty() => HistoryStatus::Completed,
            SessionStatus::Completed => HistoryStatus::Partial,
            _ => HistoryStatus::Failed,
        };
        HistoryInput {
            scan_id: Some(self.scan_id.clone()),
            date: crate::interface::local_timestamp(),
            location: self
                .address
                .get()
                .cloned()
                .unwrap_or_else(|| self.location.to_string()),
            coordinates: Some(self.location),
            radius_m: Some(self.radius_m),
            detected_miners: state.detections.len(),
            duration: state.elapsed_secs(),
            operator: self.operator.clone(),
            methods: self.methods.clone(),
            status,
        }
    }

    pub(crate) fn snapshot(&self) -> ScanSnapshot {
        let state = self.lock();
        ScanSnapshot {
            scan_id: self.scan_id.clone(),
            status: state.status,
            progress: state.progress.total(),
            methods: self.methods.clone(),
            current_method: state.running.last().copied(),
            location: self.location,
            detections: state.detections.clone(),
            results: state.results.clone(),
            errors: state.errors.clone(),
            warnings: state.warnings.clone(),
            failure: state.failure,
            started_at: state.started_at,
            finished_at: state.finished_at,
            logs: state.logs.clone(),
        }
    }
}

/// Handle a [`crate::SignalSource`] uses to report acquisition progress.
#[derive(Clone, Default)]
pub struct ProgressReporter {
    inner: Option<(Arc<SessionShared>, usize)>,
}

impl ProgressReporter {
    /// Reporter bound to no session; every call is a no-op.
    pub fn detached() -> Self {
        Self { inner: None }
    }

    pub(crate) fn attached(shared: Arc<SessionShared>, index: usize) -> Self {
        Self {
            inner: Some((shared, index)),
        }
    }

    /// Acquisition progress for this method, 0-100.
    pub fn report(&self, percent: u8) {
        if let Some((shared, index)) = &self.inner {
            let mut state = shared.lock();
            if !state.status.is_terminal() {
                let scaled = u16::from(percent.min(100)) * u16::from(ACQUIRED_PERCENT) / 100;
                state.progress.advance(*index, scaled as u8);
            }
        }
    }

    /// Append a line to the session log.
    pub fn note(&self, message: &str) {
        if let Some((shared, _)) = &self.inner {
            let mut state = shared.lock();
            if !state.status.is_terminal() {
                state.log(message);
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner
            .as_ref()
            .map(|(shared, _)| shared.is_terminal())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shared(methods: Vec<Modality>) -> Arc<SessionShared> {
        let location = Coordinates::new(33.638, 46.4153);
        Arc::new(SessionShared::new(
            "scan-test".into(),
            ScanRequest::new(location, methods.clone(), 70),
            methods,
            location,
            1000,
            Sensitivity::default(),
            "operator".into(),
        ))
    }

    #[test]
    fn shares_cover_exactly_one_hundred() {
        let mut tracker = ProgressTracker::new(3);
        assert_eq!(tracker.shares, vec![34, 33, 33]);
        tracker.complete_all();
        assert_eq!(tracker.total(), 100);
    }

    #[test]
    fn progress_never_moves_backwards() {
        let mut tracker = ProgressTracker::new(2);
        tracker.advance(0, 90);
        let before = tracker.total();
        tracker.advance(0, 20);
        assert_eq!(tracker.total(), before);
        assert_eq!(before, 45);
    }

    #[test]
    fn illegal_transition_is_refused() {
        let shared = shared(vec![Modality::Acoustic]);
        let mut state = shared.lock();
        assert!(matches!(
            state.transition(SessionStatus::Completed),
            Err(ScanError::InvalidTransition { .. })
        ));
        state.transition(SessionStatus::Scanning).unwrap();
        state.transition(SessionStatus::Failed).unwrap();
        assert!(state.finished_at.is_some());
        assert!(state.transition(SessionStatus::Failed).is_err());
    }

    #[test]
    fn reporter_scales_into_acquisition_range() {
        let shared = shared(vec![Modality::Acoustic]);
        let reporter = ProgressReporter::attached(Arc::clone(&shared), 0);
        reporter.report(100);
        assert_eq!(shared.snapshot().progress, ACQUIRED_PERCENT);
        reporter.note("sampling microphone");
        assert_eq!(shared.snapshot().logs, vec!["sampling microphone".to_string()]);

        ProgressReporter::detached().report(50);
        assert!(!ProgressReporter::detached().is_cancelled());
    }

    #[test]
    fn completed_with_errors_is_recorded_as_partial() {
        let shared = shared(vec![Modality::Acoustic, Modality::Emi]);
        let mut state = shared.lock();
        state.transition(SessionStatus::Scanning).unwrap();
        state.transition(SessionStatus::Analyzing).unwrap();
        state.errors.push("emi analysis timed out after 5s".into());
        state.transition(SessionStatus::Completed).unwrap();
        let history = shared.history_input(&state);
        assert_eq!(history.status, HistoryStatus::Partial);
        assert_eq!(history.location, "33.63800, 46.41530");
    }
}
